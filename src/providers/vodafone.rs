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
use reqwest::Method;
use serde::Deserialize;
use serde_json::json;
use std::env;
use std::time::Duration;
use tracing::info;

/// Vodafone-style network. Everything rides in a `{status, message, data}`
/// envelope, auth is a client-credentials exchange, and the provider mints
/// its own transaction id at submission.
pub struct VodafoneAdapter {
    config: VodafoneConfig,
    http: ProviderHttpClient,
    tokens: TokenCache,
}

#[derive(Debug, Clone)]
pub struct VodafoneConfig {
    pub base_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub merchant_id: String,
    pub webhook_secret: String,
    pub callback_url: String,
    pub timeout_secs: u64,
}

impl VodafoneConfig {
    pub fn from_env() -> AdapterResult<Self> {
        Ok(Self {
            base_url: env::var("VODAFONE_BASE_URL")
                .unwrap_or_else(|_| "https://api.vodafone-cash.example.com".to_string()),
            client_id: require_env("VODAFONE_CLIENT_ID")?,
            client_secret: require_env("VODAFONE_CLIENT_SECRET")?,
            merchant_id: require_env("VODAFONE_MERCHANT_ID")?,
            webhook_secret: require_env("VODAFONE_WEBHOOK_SECRET")?,
            callback_url: env::var("VODAFONE_CALLBACK_URL").unwrap_or_default(),
            timeout_secs: env::var("VODAFONE_TIMEOUT_SECS")
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
struct Envelope<T> {
    status: String,
    message: Option<String>,
    data: Option<T>,
}

impl<T> Envelope<T> {
    fn into_data(self, provider: &str) -> AdapterResult<T> {
        if self.status.to_lowercase() != "success" {
            return Err(AdapterError::ProviderError {
                provider: provider.to_string(),
                message: self
                    .message
                    .unwrap_or_else(|| "provider returned failure envelope".to_string()),
                provider_code: Some(self.status),
                retryable: false,
            });
        }
        self.data.ok_or_else(|| AdapterError::ProviderError {
            provider: provider.to_string(),
            message: "success envelope carried no data".to_string(),
            provider_code: None,
            retryable: false,
        })
    }
}

#[derive(Debug, Deserialize)]
struct TokenData {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Deserialize)]
struct PaymentData {
    #[serde(rename = "transactionId")]
    transaction_id: String,
    status: String,
    #[serde(rename = "networkTransactionId")]
    network_transaction_id: Option<String>,
    amount: Option<String>,
    currency: Option<String>,
    #[serde(rename = "failureReason")]
    failure_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BalanceData {
    balance: String,
    currency: String,
}

#[derive(Debug, Deserialize)]
struct CustomerData {
    active: bool,
}

#[derive(Debug, Deserialize)]
struct CallbackBody {
    #[serde(rename = "transactionId")]
    transaction_id: Option<String>,
    #[serde(rename = "clientReference")]
    client_reference: Option<String>,
    status: Option<String>,
    #[serde(rename = "networkTransactionId")]
    network_transaction_id: Option<String>,
    #[serde(rename = "failureReason")]
    failure_reason: Option<String>,
}

impl VodafoneAdapter {
    pub fn new(config: VodafoneConfig) -> AdapterResult<Self> {
        let http = ProviderHttpClient::new("vodafone", Duration::from_secs(config.timeout_secs))?;
        Ok(Self {
            config,
            http,
            tokens: TokenCache::from_env(),
        })
    }

    pub fn from_env() -> AdapterResult<Self> {
        Self::new(VodafoneConfig::from_env()?)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn bearer(&self) -> AdapterResult<String> {
        let http = self.http.clone();
        let url = self.endpoint("oauth/token");
        let body = json!({
            "clientId": self.config.client_id,
            "clientSecret": self.config.client_secret,
            "grantType": "client_credentials",
        });

        self.tokens
            .get_or_refresh(move || async move {
                let resp: Envelope<TokenData> = http
                    .request_json(Method::POST, &url, None, &[], Some(&body))
                    .await?;
                let data = resp.into_data("vodafone")?;
                Ok(ProviderToken::from_expires_in(
                    data.access_token,
                    data.expires_in,
                ))
            })
            .await
    }

    async fn submit(&self, path: &str, order: &PaymentOrder) -> AdapterResult<ProviderAcceptance> {
        order.amount.validate_positive("amount")?;
        let token = self.bearer().await?;
        let body = json!({
            "merchantId": self.config.merchant_id,
            "amount": order.amount.amount,
            "currency": order.amount.currency,
            "msisdn": order.phone,
            "clientReference": order.external_ref,
            "description": order.note.clone().unwrap_or_default(),
            "callbackUrl": self.config.callback_url,
        });

        let resp: Envelope<PaymentData> = self
            .http
            .request_json(Method::POST, &self.endpoint(path), Some(&token), &[], Some(&body))
            .await?;
        let data = resp.into_data("vodafone")?;

        info!(
            provider = "vodafone",
            external_ref = %order.external_ref,
            provider_ref = %data.transaction_id,
            "provider accepted submission"
        );

        Ok(ProviderAcceptance {
            provider_ref: data.transaction_id,
            status: Self::map_status(&data.status),
        })
    }

    fn map_status(word: &str) -> SettlementStatus {
        match word.to_lowercase().as_str() {
            "success" | "successful" | "completed" => SettlementStatus::Succeeded,
            "failed" | "declined" | "expired" => SettlementStatus::Failed,
            "pending" | "processing" | "initiated" => SettlementStatus::Pending,
            _ => SettlementStatus::Unknown,
        }
    }
}

#[async_trait]
impl PaymentAdapter for VodafoneAdapter {
    fn name(&self) -> ProviderName {
        ProviderName::Vodafone
    }

    async fn request_collection(&self, order: &PaymentOrder) -> AdapterResult<ProviderAcceptance> {
        self.submit("api/v1/collections", order).await
    }

    async fn request_disbursement(&self, order: &PaymentOrder) -> AdapterResult<ProviderAcceptance> {
        self.submit("api/v1/disbursements", order).await
    }

    async fn query_status(&self, provider_ref: &str) -> AdapterResult<ProviderStatus> {
        let token = self.bearer().await?;
        let resp: Envelope<PaymentData> = self
            .http
            .request_json(
                Method::GET,
                &self.endpoint(&format!("api/v1/payments/{}", provider_ref)),
                Some(&token),
                &[],
                None,
            )
            .await?;
        let data = resp.into_data("vodafone")?;

        let amount = match (data.amount, data.currency) {
            (Some(amount), Some(currency)) => Some(Money { amount, currency }),
            _ => None,
        };

        Ok(ProviderStatus {
            status: Self::map_status(&data.status),
            amount,
            financial_txn_id: data.network_transaction_id,
            failure_reason: data.failure_reason,
        })
    }

    async fn account_balance(&self) -> AdapterResult<Money> {
        let token = self.bearer().await?;
        let resp: Envelope<BalanceData> = self
            .http
            .request_json(
                Method::GET,
                &self.endpoint("api/v1/account/balance"),
                Some(&token),
                &[],
                None,
            )
            .await?;
        let data = resp.into_data("vodafone")?;
        Ok(Money {
            amount: data.balance,
            currency: data.currency,
        })
    }

    async fn validate_counterparty(&self, phone: &str) -> AdapterResult<bool> {
        let token = self.bearer().await?;
        let body = json!({ "msisdn": phone });
        let resp: Envelope<CustomerData> = self
            .http
            .request_json(
                Method::POST,
                &self.endpoint("api/v1/customers/validate"),
                Some(&token),
                &[],
                Some(&body),
            )
            .await?;
        Ok(resp.into_data("vodafone")?.active)
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
            provider: ProviderName::Vodafone,
            provider_ref: body.transaction_id,
            external_ref: body.client_reference,
            status: body.status.as_deref().map(Self::map_status),
            financial_txn_id: body.network_transaction_id,
            failure_reason: body.failure_reason,
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

    fn test_adapter() -> VodafoneAdapter {
        VodafoneAdapter::new(VodafoneConfig {
            base_url: "https://api.vodafone-cash.example.com".to_string(),
            client_id: "cid".to_string(),
            client_secret: "secret".to_string(),
            merchant_id: "merchant-1".to_string(),
            webhook_secret: "whsec_voda".to_string(),
            callback_url: "https://gateway.example.com/webhooks/vodafone".to_string(),
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
        assert_eq!(VodafoneAdapter::map_status("SUCCESS"), SettlementStatus::Succeeded);
        assert_eq!(VodafoneAdapter::map_status("declined"), SettlementStatus::Failed);
        assert_eq!(VodafoneAdapter::map_status("processing"), SettlementStatus::Pending);
        assert_eq!(VodafoneAdapter::map_status("???"), SettlementStatus::Unknown);
    }

    #[test]
    fn failure_envelope_surfaces_provider_message() {
        let envelope: Envelope<PaymentData> = serde_json::from_str(
            r#"{"status":"error","message":"insufficient wallet balance","data":null}"#,
        )
        .unwrap();
        let err = envelope.into_data("vodafone").unwrap_err();
        assert!(err.to_string().contains("insufficient wallet balance"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn webhook_verification_accepts_signed_payload() {
        let adapter = test_adapter();
        let payload = br#"{"transactionId":"VF-1","clientReference":"ext-1","status":"success"}"#;
        let sig = sign("whsec_voda", payload);
        assert!(adapter.verify_webhook(payload, Some(&sig)).valid);
        assert!(!adapter.verify_webhook(br#"{"tampered":true}"#, Some(&sig)).valid);
    }

    #[test]
    fn parse_webhook_extracts_correlation_fields() {
        let adapter = test_adapter();
        let payload = br#"{
            "transactionId": "VF-7",
            "clientReference": "ext-7",
            "status": "failed",
            "failureReason": "payer cancelled authorization"
        }"#;
        let parsed = adapter.parse_webhook(payload).unwrap();
        assert_eq!(parsed.provider_ref.as_deref(), Some("VF-7"));
        assert_eq!(parsed.external_ref.as_deref(), Some("ext-7"));
        assert_eq!(parsed.status, Some(SettlementStatus::Failed));
        assert_eq!(
            parsed.failure_reason.as_deref(),
            Some("payer cancelled authorization")
        );
    }
}
