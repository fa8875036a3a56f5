//! System of record for payment requests. Every status mutation in the
//! gateway flows through the tracker, which enforces the transition table
//! and the idempotency rules on top of conditionally-guarded SQL updates.

pub mod phone;
pub mod state;

pub use state::RequestStatus;

use crate::database::error::DatabaseError;
use crate::database::payment_request_repository::{
    NewPaymentRequest, PaymentRequestRepository, PaymentRequestRow,
};
use crate::providers::{Direction, ProviderName};
use bigdecimal::BigDecimal;
use sqlx::PgPool;
use std::str::FromStr;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("validation failed: {message}")]
    Validation { message: String },

    #[error("payment request not found: {reference}")]
    NotFound { reference: String },

    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("terminal state conflict: {message}")]
    Conflict { message: String },

    #[error("database error: {0}")]
    Database(#[from] DatabaseError),
}

/// Caller-facing creation input. The external reference is optional; when
/// absent the tracker mints one.
#[derive(Debug, Clone)]
pub struct CreateRequest {
    pub provider: ProviderName,
    pub direction: Direction,
    pub amount: String,
    pub currency: String,
    pub phone: String,
    pub external_ref: Option<String>,
    pub note: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ValidatedRequest {
    pub provider: ProviderName,
    pub direction: Direction,
    pub amount: BigDecimal,
    pub currency: String,
    pub phone: String,
    pub external_ref: String,
    pub note: Option<String>,
}

/// Checks the creation input without touching the store. The external
/// reference is assigned here, exactly once per request.
pub fn validate_create(req: CreateRequest) -> Result<ValidatedRequest, TrackerError> {
    let amount = BigDecimal::from_str(req.amount.trim()).map_err(|_| TrackerError::Validation {
        message: format!("invalid decimal amount: {}", req.amount),
    })?;
    if amount <= BigDecimal::from(0) {
        return Err(TrackerError::Validation {
            message: "amount must be greater than zero".to_string(),
        });
    }

    let currency = req.currency.trim().to_uppercase();
    if currency.len() != 3 {
        return Err(TrackerError::Validation {
            message: format!("invalid currency code: {}", req.currency),
        });
    }

    let phone = phone::normalize_msisdn(&req.phone)
        .map_err(|message| TrackerError::Validation { message })?;

    let external_ref = match req.external_ref {
        Some(reference) if !reference.trim().is_empty() => reference.trim().to_string(),
        _ => format!("momo_{}", Uuid::new_v4().simple()),
    };

    Ok(ValidatedRequest {
        provider: req.provider,
        direction: req.direction,
        amount,
        currency,
        phone,
        external_ref,
        note: req.note,
    })
}

/// Outcome of a terminal transition attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalOutcome {
    /// The record moved into the target state now.
    Applied,
    /// The record was already in the target state; nothing changed,
    /// including `updated_at`.
    AlreadyTerminal,
}

pub struct TransactionTracker {
    repo: PaymentRequestRepository,
}

impl TransactionTracker {
    pub fn new(pool: PgPool) -> Self {
        Self {
            repo: PaymentRequestRepository::new(pool),
        }
    }

    /// Idempotent create. A second call with the same (provider, direction,
    /// external_ref) tuple returns the original record; the boolean is true
    /// only for the call that actually inserted.
    pub async fn create(
        &self,
        req: ValidatedRequest,
    ) -> Result<(PaymentRequestRow, bool), TrackerError> {
        let (row, created) = self
            .repo
            .insert_pending(NewPaymentRequest {
                external_ref: &req.external_ref,
                provider: req.provider.as_str(),
                direction: req.direction.as_str(),
                amount: req.amount.clone(),
                currency: &req.currency,
                phone: &req.phone,
                note: req.note.as_deref(),
            })
            .await?;

        if created {
            info!(
                external_ref = %row.external_ref,
                provider = %row.provider,
                direction = %row.direction,
                "payment request created"
            );
        } else {
            info!(
                external_ref = %row.external_ref,
                status = %row.status,
                "duplicate create returned existing record"
            );
        }

        Ok((row, created))
    }

    pub async fn get(&self, external_ref: &str) -> Result<PaymentRequestRow, TrackerError> {
        self.repo
            .find_by_external_ref(external_ref)
            .await?
            .ok_or_else(|| TrackerError::NotFound {
                reference: external_ref.to_string(),
            })
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<PaymentRequestRow, TrackerError> {
        self.repo
            .find_by_id(id)
            .await?
            .ok_or_else(|| TrackerError::NotFound {
                reference: id.to_string(),
            })
    }

    pub async fn find_by_provider_ref(
        &self,
        provider: ProviderName,
        provider_ref: &str,
    ) -> Result<Option<PaymentRequestRow>, TrackerError> {
        Ok(self
            .repo
            .find_by_provider_ref(provider.as_str(), provider_ref)
            .await?)
    }

    /// pending -> submitted. Duplicate acknowledgments are expected under
    /// retry; a record that already left pending is logged and left alone.
    pub async fn mark_submitted(
        &self,
        id: Uuid,
        provider_ref: &str,
    ) -> Result<bool, TrackerError> {
        let moved = self.repo.mark_submitted(id, provider_ref).await?;
        if moved {
            info!(%id, provider_ref, "payment request submitted");
        } else {
            info!(%id, provider_ref, "duplicate submission acknowledgment ignored");
        }
        Ok(moved)
    }

    /// submitted -> succeeded|failed. Idempotent for repeat deliveries of
    /// the same outcome; a contradictory outcome flags the record for manual
    /// review instead of overwriting it.
    pub async fn mark_terminal(
        &self,
        id: Uuid,
        target: RequestStatus,
        financial_txn_id: Option<&str>,
        failure_reason: Option<&str>,
    ) -> Result<TerminalOutcome, TrackerError> {
        if !target.is_terminal() {
            return Err(TrackerError::Validation {
                message: format!("{} is not a terminal state", target),
            });
        }

        let applied = self
            .repo
            .complete_submitted(id, target.as_db_status(), financial_txn_id, failure_reason)
            .await?;
        if applied {
            info!(%id, status = %target, "payment request resolved");
            return Ok(TerminalOutcome::Applied);
        }

        // Guard did not fire. Find out what state the record is actually in.
        let row = self.get_by_id(id).await?;
        let current =
            RequestStatus::from_db_status(&row.status).ok_or_else(|| TrackerError::Validation {
                message: format!("unrecognized stored status: {}", row.status),
            })?;

        if current == target {
            return Ok(TerminalOutcome::AlreadyTerminal);
        }

        if current.is_terminal() {
            let message = format!(
                "record {} already {} but provider now reports {}",
                row.external_ref, current, target
            );
            warn!(%id, external_ref = %row.external_ref, %current, %target, "terminal state conflict");
            self.repo.flag_for_review(id, &message).await?;
            return Err(TrackerError::Conflict { message });
        }

        Err(TrackerError::InvalidTransition {
            from: current.to_string(),
            to: target.to_string(),
        })
    }

    /// Cancellation is only possible while still pending. A submitted
    /// record must wait for the provider's terminal outcome.
    pub async fn cancel(&self, external_ref: &str) -> Result<PaymentRequestRow, TrackerError> {
        let row = self.get(external_ref).await?;
        let cancelled = self.repo.fail_pending(row.id, "cancelled by caller").await?;
        if !cancelled {
            let current = self.get_by_id(row.id).await?;
            return Err(TrackerError::InvalidTransition {
                from: current.status,
                to: "failed".to_string(),
            });
        }
        info!(external_ref, "payment request cancelled");
        self.get_by_id(row.id).await
    }

    /// Books the next retry slot and bumps the attempt counter. Only the
    /// retry scheduler calls this.
    pub async fn schedule_retry(
        &self,
        id: Uuid,
        next_retry_at: chrono::DateTime<chrono::Utc>,
    ) -> Result<bool, TrackerError> {
        Ok(self.repo.schedule_retry(id, next_retry_at).await?)
    }

    /// pending -> failed once the attempt ceiling is reached.
    pub async fn fail_max_retries(&self, id: Uuid) -> Result<bool, TrackerError> {
        let failed = self.repo.fail_pending(id, "max retries exceeded").await?;
        if failed {
            warn!(%id, "payment request failed after exhausting retries");
            self.repo
                .flag_for_review(id, "max retries exceeded")
                .await?;
        }
        Ok(failed)
    }

    /// pending -> failed for a permanent provider rejection.
    pub async fn fail_permanent(&self, id: Uuid, reason: &str) -> Result<bool, TrackerError> {
        let failed = self.repo.fail_pending(id, reason).await?;
        if failed {
            info!(%id, reason, "payment request failed permanently");
        }
        Ok(failed)
    }

    pub async fn flag_for_review(&self, id: Uuid, reason: &str) -> Result<(), TrackerError> {
        Ok(self.repo.flag_for_review(id, reason).await?)
    }

    pub async fn due_retries(&self, limit: i64) -> Result<Vec<PaymentRequestRow>, TrackerError> {
        Ok(self.repo.find_due_retries(limit).await?)
    }

    pub async fn stale_pending(
        &self,
        older_than_secs: i32,
        limit: i64,
    ) -> Result<Vec<PaymentRequestRow>, TrackerError> {
        Ok(self.repo.find_stale_pending(older_than_secs, limit).await?)
    }

    pub async fn stale_submitted(
        &self,
        older_than_secs: i32,
        limit: i64,
    ) -> Result<Vec<PaymentRequestRow>, TrackerError> {
        Ok(self
            .repo
            .find_stale_submitted(older_than_secs, limit)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_request() -> CreateRequest {
        CreateRequest {
            provider: ProviderName::Mtn,
            direction: Direction::Collection,
            amount: "100.00".to_string(),
            currency: "ghs".to_string(),
            phone: "0241234567".to_string(),
            external_ref: None,
            note: None,
        }
    }

    #[test]
    fn validate_assigns_an_external_ref() {
        let validated = validate_create(base_request()).unwrap();
        assert!(validated.external_ref.starts_with("momo_"));
        assert_eq!(validated.currency, "GHS");
        assert_eq!(validated.phone, "+233241234567");
    }

    #[test]
    fn validate_keeps_a_caller_supplied_ref() {
        let mut req = base_request();
        req.external_ref = Some("order-881".to_string());
        let validated = validate_create(req).unwrap();
        assert_eq!(validated.external_ref, "order-881");
    }

    #[test]
    fn blank_external_ref_is_replaced() {
        let mut req = base_request();
        req.external_ref = Some("   ".to_string());
        let validated = validate_create(req).unwrap();
        assert!(validated.external_ref.starts_with("momo_"));
    }

    #[test]
    fn zero_amount_is_rejected() {
        let mut req = base_request();
        req.amount = "0.00".to_string();
        assert!(matches!(
            validate_create(req),
            Err(TrackerError::Validation { .. })
        ));
    }

    #[test]
    fn garbage_amount_is_rejected() {
        let mut req = base_request();
        req.amount = "ten cedis".to_string();
        assert!(validate_create(req).is_err());
    }

    #[test]
    fn bad_currency_is_rejected() {
        let mut req = base_request();
        req.currency = "CEDI".to_string();
        assert!(validate_create(req).is_err());
    }

    #[test]
    fn bad_phone_is_rejected() {
        let mut req = base_request();
        req.phone = "12345".to_string();
        assert!(validate_create(req).is_err());
    }
}
