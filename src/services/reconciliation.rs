use crate::database::payment_request_repository::PaymentRequestRow;
use crate::error::{AppError, AppErrorKind, AppResult, DomainError};
use crate::providers::{ParsedWebhook, ProviderName, ProviderRegistry, SettlementStatus};
use crate::tracker::{RequestStatus, TerminalOutcome, TrackerError, TransactionTracker};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};

/// Result of one reconciliation pass over a record or event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// A terminal transition was applied now.
    Applied,
    /// The record was already in the reported terminal state.
    AlreadyTerminal,
    /// A pending record was promoted to submitted; no terminal outcome yet.
    Acknowledged,
    /// Provider still reports the payment in flight; nothing to do.
    NoChange,
    /// No payment record matches the event; it is retained for manual
    /// linkage, never discarded.
    Unmatched,
    /// The record was flagged for manual review.
    Flagged,
}

/// Cross-checks tracker records against provider-reported truth. The push
/// path (verified webhooks) and the pull path (active status polls) both
/// land here, converging on the tracker's guarded terminal transition, which
/// is what makes running them concurrently safe.
pub struct ReconciliationEngine {
    tracker: Arc<TransactionTracker>,
    registry: Arc<ProviderRegistry>,
}

impl ReconciliationEngine {
    pub fn new(tracker: Arc<TransactionTracker>, registry: Arc<ProviderRegistry>) -> Self {
        Self { tracker, registry }
    }

    /// Push path: applies a verified, parsed provider callback.
    pub async fn apply_webhook(&self, parsed: &ParsedWebhook) -> AppResult<ReconcileOutcome> {
        let Some(row) = self.locate(parsed).await? else {
            info!(
                provider = %parsed.provider,
                provider_ref = ?parsed.provider_ref,
                external_ref = ?parsed.external_ref,
                "webhook has no matching payment request, retained for linkage"
            );
            return Ok(ReconcileOutcome::Unmatched);
        };

        // A callback can beat the submission acknowledgment. Promote the
        // record through submitted first so the terminal guard can fire.
        if row.status == "pending" {
            let provider_ref = parsed
                .provider_ref
                .as_deref()
                .or(row.provider_ref.as_deref());
            if let Some(provider_ref) = provider_ref {
                self.tracker.mark_submitted(row.id, provider_ref).await?;
            }
        }

        match parsed.status {
            Some(SettlementStatus::Succeeded) => {
                self.apply_terminal(
                    &row,
                    RequestStatus::Succeeded,
                    parsed.financial_txn_id.as_deref(),
                    None,
                )
                .await
            }
            Some(SettlementStatus::Failed) => {
                self.apply_terminal(
                    &row,
                    RequestStatus::Failed,
                    None,
                    parsed
                        .failure_reason
                        .as_deref()
                        .or(Some("provider reported failure")),
                )
                .await
            }
            Some(SettlementStatus::Pending) => {
                if row.status == "pending" {
                    Ok(ReconcileOutcome::Acknowledged)
                } else {
                    Ok(ReconcileOutcome::NoChange)
                }
            }
            Some(SettlementStatus::Unknown) | None => Ok(ReconcileOutcome::NoChange),
        }
    }

    /// Pull path: actively queries the provider for a submitted record and
    /// applies the answer through the same terminal transition.
    pub async fn reconcile_record(&self, row: &PaymentRequestRow) -> AppResult<ReconcileOutcome> {
        let provider = ProviderName::from_str(&row.provider)?;
        let Some(provider_ref) = row.provider_ref.as_deref() else {
            // Submitted without a correlation id should be impossible.
            self.tracker
                .flag_for_review(row.id, "submitted record has no provider correlation id")
                .await?;
            return Ok(ReconcileOutcome::Flagged);
        };

        let adapter = self.registry.get(provider)?;
        let status = match adapter.query_status(provider_ref).await {
            Ok(status) => status,
            Err(e) if e.is_retryable() => {
                warn!(
                    external_ref = %row.external_ref,
                    provider = %provider,
                    error = %e,
                    "status poll failed transiently, will retry next sweep"
                );
                return Ok(ReconcileOutcome::NoChange);
            }
            Err(e) => {
                warn!(
                    external_ref = %row.external_ref,
                    provider = %provider,
                    error = %e,
                    "status poll failed permanently, flagging for review"
                );
                self.tracker
                    .flag_for_review(row.id, &format!("status poll failed: {}", e))
                    .await?;
                return Ok(ReconcileOutcome::Flagged);
            }
        };

        match status.status {
            SettlementStatus::Succeeded => {
                self.apply_terminal(
                    row,
                    RequestStatus::Succeeded,
                    status.financial_txn_id.as_deref(),
                    None,
                )
                .await
            }
            SettlementStatus::Failed => {
                self.apply_terminal(
                    row,
                    RequestStatus::Failed,
                    None,
                    status
                        .failure_reason
                        .as_deref()
                        .or(Some("provider reported failure")),
                )
                .await
            }
            SettlementStatus::Pending => Ok(ReconcileOutcome::NoChange),
            SettlementStatus::Unknown => {
                self.tracker
                    .flag_for_review(row.id, "provider reports an unrecognized status")
                    .await?;
                Ok(ReconcileOutcome::Flagged)
            }
        }
    }

    async fn apply_terminal(
        &self,
        row: &PaymentRequestRow,
        target: RequestStatus,
        financial_txn_id: Option<&str>,
        failure_reason: Option<&str>,
    ) -> AppResult<ReconcileOutcome> {
        match self
            .tracker
            .mark_terminal(row.id, target, financial_txn_id, failure_reason)
            .await
        {
            Ok(TerminalOutcome::Applied) => {
                info!(
                    external_ref = %row.external_ref,
                    status = %target,
                    "reconciliation resolved payment request"
                );
                Ok(ReconcileOutcome::Applied)
            }
            Ok(TerminalOutcome::AlreadyTerminal) => Ok(ReconcileOutcome::AlreadyTerminal),
            Err(TrackerError::Conflict { message }) => {
                // The tracker already flagged the record. Surface the
                // disagreement; never auto-correct financial state.
                Err(AppError::new(AppErrorKind::Domain(
                    DomainError::TerminalConflict { message },
                )))
            }
            Err(other) => Err(other.into()),
        }
    }

    async fn locate(&self, parsed: &ParsedWebhook) -> AppResult<Option<PaymentRequestRow>> {
        if let Some(external_ref) = parsed.external_ref.as_deref() {
            if let Ok(row) = self.tracker.get(external_ref).await {
                return Ok(Some(row));
            }
        }
        if let Some(provider_ref) = parsed.provider_ref.as_deref() {
            return Ok(self
                .tracker
                .find_by_provider_ref(parsed.provider, provider_ref)
                .await?);
        }
        Ok(None)
    }
}
