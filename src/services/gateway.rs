use crate::database::payment_request_repository::PaymentRequestRow;
use crate::error::AppResult;
use crate::providers::{
    Direction, Money, PaymentOrder, ProviderName, ProviderRegistry, SettlementStatus,
};
use crate::tracker::{validate_create, CreateRequest, RequestStatus, TransactionTracker};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, info, warn};

/// What happened to a single submission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Provider acknowledged; the record is now submitted (or already
    /// terminal if the provider settled instantly).
    Submitted,
    /// Permanent rejection; the record was marked failed.
    FailedPermanently,
    /// Transient failure; the record stays pending for the retry scheduler.
    Deferred,
}

/// Front door for outbound payments. Creates the tracked record first, then
/// makes exactly one provider call; everything after that is driven by
/// webhooks, the reconciliation sweep, and the retry scheduler.
pub struct PaymentGateway {
    tracker: Arc<TransactionTracker>,
    registry: Arc<ProviderRegistry>,
}

impl PaymentGateway {
    pub fn new(tracker: Arc<TransactionTracker>, registry: Arc<ProviderRegistry>) -> Self {
        Self { tracker, registry }
    }

    /// Creates (or returns) the payment record and attempts one submission.
    /// The response is always the current best-known state; callers never
    /// wait for provider confirmation.
    pub async fn create_and_submit(&self, req: CreateRequest) -> AppResult<PaymentRequestRow> {
        let validated = validate_create(req)?;

        // Fail fast on an unconfigured provider before writing anything.
        self.registry.get(validated.provider)?;

        let (row, created) = self.tracker.create(validated).await?;
        if !created {
            // Idempotent create: the original record answers; no second
            // provider call is made.
            return Ok(row);
        }

        self.submit(&row).await?;
        Ok(self.tracker.get_by_id(row.id).await?)
    }

    /// One submission attempt for a pending record. Used both inline at
    /// creation and by the retry scheduler, always with the record's
    /// original external reference.
    pub async fn submit(&self, row: &PaymentRequestRow) -> AppResult<SubmitOutcome> {
        let provider = ProviderName::from_str(&row.provider)?;
        let direction = Direction::from_str(&row.direction)?;
        let adapter = self.registry.get(provider)?;

        let order = PaymentOrder {
            amount: Money {
                amount: row.amount.to_string(),
                currency: row.currency.clone(),
            },
            phone: row.phone.clone(),
            external_ref: row.external_ref.clone(),
            note: row.note.clone(),
        };

        let result = match direction {
            Direction::Collection => adapter.request_collection(&order).await,
            Direction::Disbursement => adapter.request_disbursement(&order).await,
        };

        match result {
            Ok(acceptance) => {
                self.tracker
                    .mark_submitted(row.id, &acceptance.provider_ref)
                    .await?;

                // Some networks settle synchronously.
                match acceptance.status {
                    SettlementStatus::Succeeded => {
                        self.tracker
                            .mark_terminal(row.id, RequestStatus::Succeeded, None, None)
                            .await?;
                    }
                    SettlementStatus::Failed => {
                        self.tracker
                            .mark_terminal(
                                row.id,
                                RequestStatus::Failed,
                                None,
                                Some("rejected at submission"),
                            )
                            .await?;
                    }
                    SettlementStatus::Pending | SettlementStatus::Unknown => {}
                }
                Ok(SubmitOutcome::Submitted)
            }
            Err(e) if e.is_auth_failure() => {
                // A bad credential breaks every request to this network.
                error!(
                    provider = %provider,
                    external_ref = %row.external_ref,
                    error = %e,
                    "provider authentication failure"
                );
                Ok(SubmitOutcome::Deferred)
            }
            Err(e) if e.is_retryable() => {
                warn!(
                    provider = %provider,
                    external_ref = %row.external_ref,
                    error = %e,
                    "transient submission failure, leaving record pending"
                );
                Ok(SubmitOutcome::Deferred)
            }
            Err(e) => {
                info!(
                    provider = %provider,
                    external_ref = %row.external_ref,
                    error = %e,
                    "permanent submission failure"
                );
                self.tracker
                    .fail_permanent(row.id, &e.user_message())
                    .await?;
                Ok(SubmitOutcome::FailedPermanently)
            }
        }
    }

    pub async fn status(&self, external_ref: &str) -> AppResult<PaymentRequestRow> {
        Ok(self.tracker.get(external_ref).await?)
    }

    pub async fn cancel(&self, external_ref: &str) -> AppResult<PaymentRequestRow> {
        Ok(self.tracker.cancel(external_ref).await?)
    }

    pub async fn provider_balance(&self, provider: ProviderName) -> AppResult<Money> {
        let adapter = self.registry.get(provider)?;
        Ok(adapter.account_balance().await?)
    }

    pub async fn validate_counterparty(
        &self,
        provider: ProviderName,
        phone: &str,
    ) -> AppResult<bool> {
        let normalized = crate::tracker::phone::normalize_msisdn(phone).map_err(|reason| {
            crate::error::AppError::new(crate::error::AppErrorKind::Validation(
                crate::error::ValidationError::InvalidPhone {
                    phone: phone.to_string(),
                    reason,
                },
            ))
        })?;
        let adapter = self.registry.get(provider)?;
        Ok(adapter.validate_counterparty(&normalized).await?)
    }
}
