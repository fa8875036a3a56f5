use crate::providers::adapter::PaymentAdapter;
use crate::providers::error::{AdapterError, AdapterResult};
use crate::providers::http::ProviderHttpClient;
use crate::providers::signature::verify_hmac_sha256_hex;
use crate::providers::token::TokenCache;
use crate::providers::types::{
    Money, ParsedWebhook, PaymentOrder, ProviderAcceptance, ProviderName, ProviderStatus,
    ProviderToken, SettlementStatus, VerificationResult,
};
use async_trait::async_trait;
use base64::Engine;
use reqwest::Method;
use serde::Deserialize;
use serde_json::json;
use std::env;
use std::time::Duration;
use tracing::info;

/// MTN-style network. Auth is a basic-auth token exchange gated by a
/// subscription key; the submission reference we generate doubles as the
/// provider correlation id, so an identically-referenced resubmission is
/// idempotent on their side.
pub struct MtnAdapter {
    config: MtnConfig,
    http: ProviderHttpClient,
    tokens: TokenCache,
}

#[derive(Debug, Clone)]
pub struct MtnConfig {
    pub base_url: String,
    pub api_user: String,
    pub api_key: String,
    pub subscription_key: String,
    pub target_environment: String,
    pub webhook_secret: String,
    pub callback_url: String,
    pub timeout_secs: u64,
}

impl MtnConfig {
    pub fn from_env() -> AdapterResult<Self> {
        Ok(Self {
            base_url: env::var("MTN_BASE_URL")
                .unwrap_or_else(|_| "https://sandbox.momodeveloper.mtn.com".to_string()),
            api_user: require_env("MTN_API_USER")?,
            api_key: require_env("MTN_API_KEY")?,
            subscription_key: require_env("MTN_SUBSCRIPTION_KEY")?,
            target_environment: env::var("MTN_TARGET_ENVIRONMENT")
                .unwrap_or_else(|_| "sandbox".to_string()),
            webhook_secret: require_env("MTN_WEBHOOK_SECRET")?,
            callback_url: env::var("MTN_CALLBACK_URL").unwrap_or_default(),
            timeout_secs: env::var("MTN_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(15),
        })
    }
}

fn require_env(name: &str) -> AdapterResult<String> {
    env::var(name).map_err(|_| AdapterError::ValidationError {
        message: format!("missing environment variable: {}", name),
        field: Some(name.to_string()),
    })
}

// --- wire shapes -----------------------------------------------------------

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Deserialize, Default)]
struct SubmitResponse {}

#[derive(Debug, Deserialize)]
struct TransactionResponse {
    status: String,
    amount: Option<String>,
    currency: Option<String>,
    #[serde(rename = "financialTransactionId")]
    financial_transaction_id: Option<String>,
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BalanceResponse {
    #[serde(rename = "availableBalance")]
    available_balance: String,
    currency: String,
}

#[derive(Debug, Deserialize)]
struct AccountHolderResponse {
    result: bool,
}

#[derive(Debug, Deserialize)]
struct CallbackBody {
    #[serde(rename = "referenceId")]
    reference_id: Option<String>,
    #[serde(rename = "externalId")]
    external_id: Option<String>,
    status: Option<String>,
    #[serde(rename = "financialTransactionId")]
    financial_transaction_id: Option<String>,
    reason: Option<String>,
}

impl MtnAdapter {
    pub fn new(config: MtnConfig) -> AdapterResult<Self> {
        let http = ProviderHttpClient::new("mtn", Duration::from_secs(config.timeout_secs))?;
        Ok(Self {
            config,
            http,
            tokens: TokenCache::from_env(),
        })
    }

    pub fn from_env() -> AdapterResult<Self> {
        Self::new(MtnConfig::from_env()?)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn bearer(&self) -> AdapterResult<String> {
        let http = self.http.clone();
        let url = self.endpoint("v1_0/token");
        let basic = base64::engine::general_purpose::STANDARD
            .encode(format!("{}:{}", self.config.api_user, self.config.api_key));
        let subscription_key = self.config.subscription_key.clone();

        self.tokens
            .get_or_refresh(move || async move {
                let resp: TokenResponse = http
                    .request_json(
                        Method::POST,
                        &url,
                        None,
                        &[
                            ("Authorization", format!("Basic {}", basic)),
                            ("Ocp-Apim-Subscription-Key", subscription_key),
                        ],
                        None,
                    )
                    .await
                    .map_err(|e| match e {
                        // The token endpoint failing means every call to this
                        // network is broken, not just this one.
                        AdapterError::NetworkError { message } => AdapterError::AuthError {
                            provider: "mtn".to_string(),
                            message: format!("token exchange unreachable: {}", message),
                        },
                        other => other,
                    })?;
                Ok(ProviderToken::from_expires_in(
                    resp.access_token,
                    resp.expires_in,
                ))
            })
            .await
    }

    async fn submit(&self, path: &str, order: &PaymentOrder, party: &str) -> AdapterResult<ProviderAcceptance> {
        order.amount.validate_positive("amount")?;
        let token = self.bearer().await?;
        let body = json!({
            "amount": order.amount.amount,
            "currency": order.amount.currency,
            "externalId": order.external_ref,
            party: {
                "partyIdType": "MSISDN",
                "partyId": order.phone,
            },
            "payerMessage": order.note.clone().unwrap_or_default(),
            "payeeNote": order.note.clone().unwrap_or_default(),
        });

        let _: SubmitResponse = self
            .http
            .request_json(
                Method::POST,
                &self.endpoint(path),
                Some(&token),
                &[
                    ("X-Reference-Id", order.external_ref.clone()),
                    ("X-Target-Environment", self.config.target_environment.clone()),
                    ("X-Callback-Url", self.config.callback_url.clone()),
                    ("Ocp-Apim-Subscription-Key", self.config.subscription_key.clone()),
                ],
                Some(&body),
            )
            .await?;

        info!(
            provider = "mtn",
            external_ref = %order.external_ref,
            "provider accepted submission"
        );

        // The network echoes our reference back as its correlation id.
        Ok(ProviderAcceptance {
            provider_ref: order.external_ref.clone(),
            status: SettlementStatus::Pending,
        })
    }

    fn map_status(word: &str) -> SettlementStatus {
        match word.to_uppercase().as_str() {
            "SUCCESSFUL" => SettlementStatus::Succeeded,
            "FAILED" | "REJECTED" | "TIMEOUT" => SettlementStatus::Failed,
            "PENDING" | "ACCEPTED" | "ONGOING" => SettlementStatus::Pending,
            _ => SettlementStatus::Unknown,
        }
    }
}

#[async_trait]
impl PaymentAdapter for MtnAdapter {
    fn name(&self) -> ProviderName {
        ProviderName::Mtn
    }

    async fn request_collection(&self, order: &PaymentOrder) -> AdapterResult<ProviderAcceptance> {
        self.submit("collection/v1_0/requesttopay", order, "payer").await
    }

    async fn request_disbursement(&self, order: &PaymentOrder) -> AdapterResult<ProviderAcceptance> {
        self.submit("disbursement/v1_0/transfer", order, "payee").await
    }

    async fn query_status(&self, provider_ref: &str) -> AdapterResult<ProviderStatus> {
        let token = self.bearer().await?;
        let resp: TransactionResponse = self
            .http
            .request_json(
                Method::GET,
                &self.endpoint(&format!("v1_0/transactions/{}", provider_ref)),
                Some(&token),
                &[
                    ("X-Target-Environment", self.config.target_environment.clone()),
                    ("Ocp-Apim-Subscription-Key", self.config.subscription_key.clone()),
                ],
                None,
            )
            .await?;

        let amount = match (resp.amount, resp.currency) {
            (Some(amount), Some(currency)) => Some(Money { amount, currency }),
            _ => None,
        };

        Ok(ProviderStatus {
            status: Self::map_status(&resp.status),
            amount,
            financial_txn_id: resp.financial_transaction_id,
            failure_reason: resp.reason,
        })
    }

    async fn account_balance(&self) -> AdapterResult<Money> {
        let token = self.bearer().await?;
        let resp: BalanceResponse = self
            .http
            .request_json(
                Method::GET,
                &self.endpoint("v1_0/account/balance"),
                Some(&token),
                &[
                    ("X-Target-Environment", self.config.target_environment.clone()),
                    ("Ocp-Apim-Subscription-Key", self.config.subscription_key.clone()),
                ],
                None,
            )
            .await?;
        Ok(Money {
            amount: resp.available_balance,
            currency: resp.currency,
        })
    }

    async fn validate_counterparty(&self, phone: &str) -> AdapterResult<bool> {
        let token = self.bearer().await?;
        let resp: AccountHolderResponse = self
            .http
            .request_json(
                Method::GET,
                &self.endpoint(&format!("v1_0/accountholder/msisdn/{}/active", phone)),
                Some(&token),
                &[
                    ("X-Target-Environment", self.config.target_environment.clone()),
                    ("Ocp-Apim-Subscription-Key", self.config.subscription_key.clone()),
                ],
                None,
            )
            .await?;
        Ok(resp.result)
    }

    fn verify_webhook(&self, payload: &[u8], signature: Option<&str>) -> VerificationResult {
        let Some(signature) = signature else {
            return VerificationResult {
                valid: false,
                reason: Some("missing signature header".to_string()),
            };
        };
        if verify_hmac_sha256_hex(&self.config.webhook_secret, payload, signature) {
            VerificationResult { valid: true, reason: None }
        } else {
            VerificationResult {
                valid: false,
                reason: Some("signature mismatch".to_string()),
            }
        }
    }

    fn parse_webhook(&self, payload: &[u8]) -> AdapterResult<ParsedWebhook> {
        let raw: serde_json::Value =
            serde_json::from_slice(payload).map_err(|e| AdapterError::ValidationError {
                message: format!("callback body is not valid json: {}", e),
                field: None,
            })?;
        let body: CallbackBody =
            serde_json::from_value(raw.clone()).map_err(|e| AdapterError::ValidationError {
                message: format!("unrecognized callback shape: {}", e),
                field: None,
            })?;

        Ok(ParsedWebhook {
            provider: ProviderName::Mtn,
            provider_ref: body.reference_id,
            external_ref: body.external_id,
            status: body.status.as_deref().map(Self::map_status),
            financial_txn_id: body.financial_transaction_id,
            failure_reason: body.reason,
            payload: raw,
            received_at: chrono::Utc::now().to_rfc3339(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    fn test_adapter() -> MtnAdapter {
        MtnAdapter::new(MtnConfig {
            base_url: "https://sandbox.momodeveloper.mtn.com".to_string(),
            api_user: "user".to_string(),
            api_key: "key".to_string(),
            subscription_key: "sub".to_string(),
            target_environment: "sandbox".to_string(),
            webhook_secret: "whsec_mtn".to_string(),
            callback_url: "https://gateway.example.com/webhooks/mtn".to_string(),
            timeout_secs: 15,
        })
        .unwrap()
    }

    fn sign(secret: &str, payload: &[u8]) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(payload);
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn status_words_map_to_settlement_states() {
        assert_eq!(MtnAdapter::map_status("SUCCESSFUL"), SettlementStatus::Succeeded);
        assert_eq!(MtnAdapter::map_status("failed"), SettlementStatus::Failed);
        assert_eq!(MtnAdapter::map_status("TIMEOUT"), SettlementStatus::Failed);
        assert_eq!(MtnAdapter::map_status("PENDING"), SettlementStatus::Pending);
        assert_eq!(MtnAdapter::map_status("weird"), SettlementStatus::Unknown);
    }

    #[test]
    fn webhook_verification_accepts_signed_payload() {
        let adapter = test_adapter();
        let payload = br#"{"referenceId":"ref-1","externalId":"ext-1","status":"SUCCESSFUL"}"#;
        let sig = sign("whsec_mtn", payload);
        assert!(adapter.verify_webhook(payload, Some(&sig)).valid);
        assert!(!adapter.verify_webhook(payload, Some("deadbeef")).valid);
        assert!(!adapter.verify_webhook(payload, None).valid);
    }

    #[test]
    fn parse_webhook_extracts_correlation_fields() {
        let adapter = test_adapter();
        let payload = br#"{
            "referenceId": "ref-9",
            "externalId": "ext-9",
            "status": "SUCCESSFUL",
            "financialTransactionId": "fin-9"
        }"#;
        let parsed = adapter.parse_webhook(payload).unwrap();
        assert_eq!(parsed.provider_ref.as_deref(), Some("ref-9"));
        assert_eq!(parsed.external_ref.as_deref(), Some("ext-9"));
        assert_eq!(parsed.status, Some(SettlementStatus::Succeeded));
        assert_eq!(parsed.financial_txn_id.as_deref(), Some("fin-9"));
    }

    #[test]
    fn parse_webhook_rejects_non_json() {
        let adapter = test_adapter();
        assert!(adapter.parse_webhook(b"not json").is_err());
    }
}
