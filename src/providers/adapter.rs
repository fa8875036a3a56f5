use crate::providers::error::AdapterResult;
use crate::providers::types::{
    Money, ParsedWebhook, PaymentOrder, ProviderAcceptance, ProviderName, ProviderStatus,
    VerificationResult,
};
use async_trait::async_trait;

/// Uniform surface over the three mobile-money networks. Each call performs
/// at most one outbound request against the provider; callers that need
/// retries go through the scheduler.
#[async_trait]
pub trait PaymentAdapter: Send + Sync {
    fn name(&self) -> ProviderName;

    /// Asks the subscriber's wallet to approve a charge. Acceptance means the
    /// provider queued the request, not that money moved.
    async fn request_collection(&self, order: &PaymentOrder) -> AdapterResult<ProviderAcceptance>;

    /// Pushes money to the subscriber's wallet.
    async fn request_disbursement(&self, order: &PaymentOrder) -> AdapterResult<ProviderAcceptance>;

    /// Actively queries the provider for the current state of a submitted
    /// transaction, keyed by the reference returned at submission.
    async fn query_status(&self, provider_ref: &str) -> AdapterResult<ProviderStatus>;

    /// Fetches the float balance of the configured wallet.
    async fn account_balance(&self) -> AdapterResult<Money>;

    /// Asks the provider whether the wallet behind `phone` exists and can
    /// transact on its network.
    async fn validate_counterparty(&self, phone: &str) -> AdapterResult<bool>;

    /// Checks the callback signature against the raw payload bytes. Never
    /// errors; an unverifiable payload is simply invalid.
    fn verify_webhook(&self, payload: &[u8], signature: Option<&str>) -> VerificationResult;

    /// Extracts the correlation fields from a callback body. Verification is
    /// the caller's job; parsing never implies trust.
    fn parse_webhook(&self, payload: &[u8]) -> AdapterResult<ParsedWebhook>;
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use crate::providers::error::AdapterError;
    use crate::providers::types::SettlementStatus;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// In-memory adapter for exercising the tracker and workers without a
    /// network. Behavior is switched per scenario.
    pub struct MockAdapter {
        pub provider: ProviderName,
        pub scenario: MockScenario,
        pub calls: AtomicUsize,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum MockScenario {
        AcceptPending,
        AcceptSucceeded,
        Decline,
        NetworkDown,
        StatusSucceeded,
        StatusFailed,
    }

    impl MockAdapter {
        pub fn new(provider: ProviderName, scenario: MockScenario) -> Self {
            Self {
                provider,
                scenario,
                calls: AtomicUsize::new(0),
            }
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn accept(&self, order: &PaymentOrder) -> AdapterResult<ProviderAcceptance> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.scenario {
                MockScenario::AcceptPending => Ok(ProviderAcceptance {
                    provider_ref: format!("mock-{}", order.external_ref),
                    status: SettlementStatus::Pending,
                }),
                MockScenario::AcceptSucceeded | MockScenario::StatusSucceeded => {
                    Ok(ProviderAcceptance {
                        provider_ref: format!("mock-{}", order.external_ref),
                        status: SettlementStatus::Succeeded,
                    })
                }
                MockScenario::Decline => Err(AdapterError::DeclinedError {
                    message: "insufficient balance".to_string(),
                    provider_code: Some("DECLINED".to_string()),
                }),
                MockScenario::NetworkDown => Err(AdapterError::NetworkError {
                    message: "connection refused".to_string(),
                }),
                MockScenario::StatusFailed => Err(AdapterError::NetworkError {
                    message: "connection refused".to_string(),
                }),
            }
        }
    }

    #[async_trait]
    impl PaymentAdapter for MockAdapter {
        fn name(&self) -> ProviderName {
            self.provider
        }

        async fn request_collection(
            &self,
            order: &PaymentOrder,
        ) -> AdapterResult<ProviderAcceptance> {
            self.accept(order)
        }

        async fn request_disbursement(
            &self,
            order: &PaymentOrder,
        ) -> AdapterResult<ProviderAcceptance> {
            self.accept(order)
        }

        async fn query_status(&self, provider_ref: &str) -> AdapterResult<ProviderStatus> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.scenario {
                MockScenario::StatusSucceeded | MockScenario::AcceptSucceeded => {
                    Ok(ProviderStatus {
                        status: SettlementStatus::Succeeded,
                        amount: None,
                        financial_txn_id: Some(format!("fin-{}", provider_ref)),
                        failure_reason: None,
                    })
                }
                MockScenario::StatusFailed => Ok(ProviderStatus {
                    status: SettlementStatus::Failed,
                    amount: None,
                    financial_txn_id: None,
                    failure_reason: Some("payer rejected".to_string()),
                }),
                MockScenario::AcceptPending => Ok(ProviderStatus {
                    status: SettlementStatus::Pending,
                    amount: None,
                    financial_txn_id: None,
                    failure_reason: None,
                }),
                _ => Err(AdapterError::NetworkError {
                    message: "connection refused".to_string(),
                }),
            }
        }

        async fn account_balance(&self) -> AdapterResult<Money> {
            Ok(Money {
                amount: "5000.00".to_string(),
                currency: "GHS".to_string(),
            })
        }

        async fn validate_counterparty(&self, phone: &str) -> AdapterResult<bool> {
            Ok(phone.starts_with("+233"))
        }

        fn verify_webhook(&self, _payload: &[u8], signature: Option<&str>) -> VerificationResult {
            VerificationResult {
                valid: signature == Some("valid"),
                reason: None,
            }
        }

        fn parse_webhook(&self, payload: &[u8]) -> AdapterResult<ParsedWebhook> {
            let value: serde_json::Value =
                serde_json::from_slice(payload).map_err(|e| AdapterError::ValidationError {
                    message: format!("invalid json: {}", e),
                    field: None,
                })?;
            Ok(ParsedWebhook {
                provider: self.provider,
                provider_ref: value["ref"].as_str().map(str::to_string),
                external_ref: value["external_ref"].as_str().map(str::to_string),
                status: None,
                financial_txn_id: None,
                failure_reason: None,
                payload: value,
                received_at: chrono::Utc::now().to_rfc3339(),
            })
        }
    }
}
