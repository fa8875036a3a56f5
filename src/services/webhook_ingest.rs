use crate::database::webhook_event_repository::{NewWebhookEvent, WebhookEventRepository};
use crate::error::{AppError, AppErrorKind, AppResult, ValidationError};
use crate::providers::{ProviderName, ProviderRegistry};
use crate::services::reconciliation::{ReconcileOutcome, ReconciliationEngine};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Verified, applied, and marked processed.
    Processed,
    /// A redelivery of an event that was already applied.
    Duplicate,
    /// Verified but no matching record yet; kept for the replay worker.
    Unmatched,
    /// Applied against a record that now disagrees between sources; the
    /// record is flagged and the event will not be replayed.
    Conflict,
}

/// Inbound webhook pipeline: verify the signature over the raw bytes, store
/// the event, then hand it to reconciliation. Unverifiable payloads are
/// stored for audit but never applied.
pub struct WebhookIngest {
    registry: Arc<ProviderRegistry>,
    events: WebhookEventRepository,
    engine: Arc<ReconciliationEngine>,
}

impl WebhookIngest {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        events: WebhookEventRepository,
        engine: Arc<ReconciliationEngine>,
    ) -> Self {
        Self {
            registry,
            events,
            engine,
        }
    }

    pub async fn ingest(
        &self,
        provider_name: &str,
        signature: Option<&str>,
        raw: &[u8],
    ) -> AppResult<IngestOutcome> {
        let provider = ProviderName::from_str(provider_name).map_err(|_| {
            AppError::new(AppErrorKind::Validation(ValidationError::UnknownProvider {
                provider: provider_name.to_string(),
            }))
        })?;
        let adapter = self.registry.get(provider)?;

        let verification = adapter.verify_webhook(raw, signature);
        if !verification.valid {
            error!(
                provider = %provider,
                reason = ?verification.reason,
                "webhook signature verification failed"
            );
            // Keep the rejected payload for audit. verified stays false so
            // nothing will ever apply it.
            let payload = serde_json::from_slice(raw)
                .unwrap_or_else(|_| serde_json::json!({ "raw": String::from_utf8_lossy(raw) }));
            if let Err(e) = self
                .events
                .log_event(NewWebhookEvent {
                    event_id: &format!("{}:rejected:{}", provider, Uuid::new_v4()),
                    provider: provider.as_str(),
                    payload,
                    signature,
                    verified: false,
                    provider_ref: None,
                    external_ref: None,
                })
                .await
            {
                warn!(provider = %provider, error = %e, "failed to store rejected webhook for audit");
            }
            return Err(AppError::new(AppErrorKind::Validation(
                ValidationError::InvalidSignature {
                    provider: provider.to_string(),
                },
            )));
        }

        let parsed = adapter.parse_webhook(raw)?;
        let event_id = Self::event_id(provider, &parsed.provider_ref, &parsed.external_ref, raw);

        let (event, is_new) = self
            .events
            .log_event(NewWebhookEvent {
                event_id: &event_id,
                provider: provider.as_str(),
                payload: parsed.payload.clone(),
                signature,
                verified: true,
                provider_ref: parsed.provider_ref.as_deref(),
                external_ref: parsed.external_ref.as_deref(),
            })
            .await?;

        if !is_new && event.processed {
            info!(event_id = %event_id, "duplicate webhook delivery, already applied");
            return Ok(IngestOutcome::Duplicate);
        }

        match self.engine.apply_webhook(&parsed).await {
            Ok(ReconcileOutcome::Unmatched) => {
                self.events
                    .record_failure(event.id, "no matching payment request")
                    .await?;
                Ok(IngestOutcome::Unmatched)
            }
            Ok(_) => {
                self.events.mark_processed(event.id).await?;
                info!(event_id = %event_id, provider = %provider, "webhook processed");
                Ok(IngestOutcome::Processed)
            }
            Err(e) if matches!(e.kind, AppErrorKind::Domain(crate::error::DomainError::TerminalConflict { .. })) => {
                // The record is flagged for review; replaying the event
                // cannot resolve the disagreement.
                warn!(event_id = %event_id, error = %e, "webhook outcome conflicts with stored state");
                self.events.mark_processed(event.id).await?;
                Ok(IngestOutcome::Conflict)
            }
            Err(e) => {
                self.events.record_failure(event.id, &e.to_string()).await?;
                Err(e)
            }
        }
    }

    /// Replays verified-but-unapplied events, picking up webhooks that
    /// arrived before their payment record or failed transiently.
    pub async fn replay_unprocessed(&self, max_attempts: i32, limit: i64) -> AppResult<usize> {
        let pending = self.events.find_unprocessed(max_attempts, limit).await?;
        let mut applied = 0;

        for event in pending {
            let provider = match ProviderName::from_str(&event.provider) {
                Ok(p) => p,
                Err(_) => continue,
            };
            let adapter = match self.registry.get(provider) {
                Ok(a) => a,
                Err(_) => continue,
            };

            let raw = serde_json::to_vec(&event.payload).unwrap_or_default();
            let parsed = match adapter.parse_webhook(&raw) {
                Ok(p) => p,
                Err(e) => {
                    self.events.record_failure(event.id, &e.to_string()).await?;
                    continue;
                }
            };

            match self.engine.apply_webhook(&parsed).await {
                Ok(ReconcileOutcome::Unmatched) => {
                    self.events
                        .record_failure(event.id, "no matching payment request")
                        .await?;
                }
                Ok(_) => {
                    if self.events.mark_processed(event.id).await? {
                        applied += 1;
                    }
                }
                Err(e) => {
                    warn!(event_id = %event.event_id, error = %e, "webhook replay failed");
                    self.events.record_failure(event.id, &e.to_string()).await?;
                }
            }
        }

        Ok(applied)
    }

    /// Stable identity for a delivery. Providers redeliver the same
    /// correlation id with the same status; including both collapses those
    /// duplicates while letting a later status change through.
    fn event_id(
        provider: ProviderName,
        provider_ref: &Option<String>,
        external_ref: &Option<String>,
        raw: &[u8],
    ) -> String {
        let reference = provider_ref
            .as_deref()
            .or(external_ref.as_deref())
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        // Fold the payload into the identity so a status-change redelivery
        // is a distinct event.
        let digest = {
            use sha2::{Digest, Sha256};
            let mut hasher = Sha256::new();
            hasher.update(raw);
            hex::encode(&hasher.finalize()[..8])
        };

        format!("{}:{}:{}", provider, reference, digest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_id_is_stable_for_identical_deliveries() {
        let payload = br#"{"referenceId":"r1","status":"SUCCESSFUL"}"#;
        let a = WebhookIngest::event_id(
            ProviderName::Mtn,
            &Some("r1".to_string()),
            &None,
            payload,
        );
        let b = WebhookIngest::event_id(
            ProviderName::Mtn,
            &Some("r1".to_string()),
            &None,
            payload,
        );
        assert_eq!(a, b);
    }

    #[test]
    fn event_id_differs_when_payload_changes() {
        let a = WebhookIngest::event_id(
            ProviderName::Mtn,
            &Some("r1".to_string()),
            &None,
            br#"{"referenceId":"r1","status":"PENDING"}"#,
        );
        let b = WebhookIngest::event_id(
            ProviderName::Mtn,
            &Some("r1".to_string()),
            &None,
            br#"{"referenceId":"r1","status":"SUCCESSFUL"}"#,
        );
        assert_ne!(a, b);
    }

    #[test]
    fn event_id_differs_across_providers() {
        let payload = br#"{"status":"SUCCESS"}"#;
        let a = WebhookIngest::event_id(
            ProviderName::Mtn,
            &Some("r1".to_string()),
            &None,
            payload,
        );
        let b = WebhookIngest::event_id(
            ProviderName::Vodafone,
            &Some("r1".to_string()),
            &None,
            payload,
        );
        assert_ne!(a, b);
    }
}
