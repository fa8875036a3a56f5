use crate::providers::adapter::PaymentAdapter;
use crate::providers::error::{AdapterError, AdapterResult};
use crate::providers::http::ProviderHttpClient;
use crate::providers::signature::verify_hmac_sha512_hex;
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

/// AirtelTigo-style network. Flat response bodies with an `errorCode` field
/// instead of an envelope, token validity reported as an absolute length,
/// and SHA-512 webhook signatures.
pub struct AirtelTigoAdapter {
    config: AirtelTigoConfig,
    http: ProviderHttpClient,
    tokens: TokenCache,
}

#[derive(Debug, Clone)]
pub struct AirtelTigoConfig {
    pub base_url: String,
    pub api_key: String,
    pub api_secret: String,
    pub webhook_secret: String,
    pub callback_url: String,
    pub timeout_secs: u64,
}

impl AirtelTigoConfig {
    pub fn from_env() -> AdapterResult<Self> {
        Ok(Self {
            base_url: env::var("AIRTELTIGO_BASE_URL")
                .unwrap_or_else(|_| "https://api.airteltigo.example.com".to_string()),
            api_key: require_env("AIRTELTIGO_API_KEY")?,
            api_secret: require_env("AIRTELTIGO_API_SECRET")?,
            webhook_secret: require_env("AIRTELTIGO_WEBHOOK_SECRET")?,
            callback_url: env::var("AIRTELTIGO_CALLBACK_URL").unwrap_or_default(),
            timeout_secs: env::var("AIRTELTIGO_TIMEOUT_SECS")
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
    token: String,
    #[serde(rename = "validitySeconds")]
    validity_seconds: i64,
}

#[derive(Debug, Deserialize)]
struct TxnResponse {
    txnid: Option<String>,
    status: Option<String>,
    #[serde(rename = "settlementId")]
    settlement_id: Option<String>,
    amount: Option<String>,
    currency: Option<String>,
    #[serde(rename = "errorCode")]
    error_code: Option<String>,
    #[serde(rename = "errorMessage")]
    error_message: Option<String>,
}

impl TxnResponse {
    /// Declines come back as HTTP 200 with an error code set.
    fn check_error(self, provider: &str) -> AdapterResult<Self> {
        if let Some(code) = &self.error_code {
            if code != "0" && !code.is_empty() {
                return Err(AdapterError::DeclinedError {
                    message: self
                        .error_message
                        .unwrap_or_else(|| "provider declined transaction".to_string()),
                    provider_code: Some(code.clone()),
                });
            }
        }
        let _ = provider;
        Ok(self)
    }
}

#[derive(Debug, Deserialize)]
struct BalanceResponse {
    balance: String,
    currency: String,
}

#[derive(Debug, Deserialize)]
struct SubscriberResponse {
    registered: bool,
}

#[derive(Debug, Deserialize)]
struct CallbackBody {
    txnid: Option<String>,
    reference: Option<String>,
    status: Option<String>,
    #[serde(rename = "settlementId")]
    settlement_id: Option<String>,
    #[serde(rename = "errorMessage")]
    error_message: Option<String>,
}

impl AirtelTigoAdapter {
    pub fn new(config: AirtelTigoConfig) -> AdapterResult<Self> {
        let http = ProviderHttpClient::new("airteltigo", Duration::from_secs(config.timeout_secs))?;
        Ok(Self {
            config,
            http,
            tokens: TokenCache::from_env(),
        })
    }

    pub fn from_env() -> AdapterResult<Self> {
        Self::new(AirtelTigoConfig::from_env()?)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn bearer(&self) -> AdapterResult<String> {
        let http = self.http.clone();
        let url = self.endpoint("v2/auth/token");
        let body = json!({
            "apiKey": self.config.api_key,
            "apiSecret": self.config.api_secret,
        });

        self.tokens
            .get_or_refresh(move || async move {
                let resp: TokenResponse = http
                    .request_json(Method::POST, &url, None, &[], Some(&body))
                    .await?;
                Ok(ProviderToken::from_expires_in(resp.token, resp.validity_seconds))
            })
            .await
    }

    async fn submit(&self, path: &str, order: &PaymentOrder) -> AdapterResult<ProviderAcceptance> {
        order.amount.validate_positive("amount")?;
        let token = self.bearer().await?;
        let body = json!({
            "msisdn": order.phone,
            "amount": order.amount.amount,
            "currency": order.amount.currency,
            "reference": order.external_ref,
            "narration": order.note.clone().unwrap_or_default(),
            "callbackUrl": self.config.callback_url,
        });

        let resp: TxnResponse = self
            .http
            .request_json(Method::POST, &self.endpoint(path), Some(&token), &[], Some(&body))
            .await?;
        let resp = resp.check_error("airteltigo")?;

        let txnid = resp.txnid.ok_or_else(|| AdapterError::ProviderError {
            provider: "airteltigo".to_string(),
            message: "acceptance response missing txnid".to_string(),
            provider_code: None,
            retryable: false,
        })?;

        info!(
            provider = "airteltigo",
            external_ref = %order.external_ref,
            provider_ref = %txnid,
            "provider accepted submission"
        );

        Ok(ProviderAcceptance {
            provider_ref: txnid,
            status: resp
                .status
                .as_deref()
                .map(Self::map_status)
                .unwrap_or(SettlementStatus::Pending),
        })
    }

    fn map_status(word: &str) -> SettlementStatus {
        match word.to_uppercase().as_str() {
            "SUCCESS" | "SETTLED" => SettlementStatus::Succeeded,
            "FAIL" | "FAILED" | "REVERSED" => SettlementStatus::Failed,
            "INPROGRESS" | "QUEUED" | "PENDING" => SettlementStatus::Pending,
            _ => SettlementStatus::Unknown,
        }
    }
}

#[async_trait]
impl PaymentAdapter for AirtelTigoAdapter {
    fn name(&self) -> ProviderName {
        ProviderName::AirtelTigo
    }

    async fn request_collection(&self, order: &PaymentOrder) -> AdapterResult<ProviderAcceptance> {
        self.submit("v2/payments/debit", order).await
    }

    async fn request_disbursement(&self, order: &PaymentOrder) -> AdapterResult<ProviderAcceptance> {
        self.submit("v2/payments/credit", order).await
    }

    async fn query_status(&self, provider_ref: &str) -> AdapterResult<ProviderStatus> {
        let token = self.bearer().await?;
        let resp: TxnResponse = self
            .http
            .request_json(
                Method::GET,
                &self.endpoint(&format!("v2/payments/{}", provider_ref)),
                Some(&token),
                &[],
                None,
            )
            .await?;

        let amount = match (resp.amount.clone(), resp.currency.clone()) {
            (Some(amount), Some(currency)) => Some(Money { amount, currency }),
            _ => None,
        };

        Ok(ProviderStatus {
            status: resp
                .status
                .as_deref()
                .map(Self::map_status)
                .unwrap_or(SettlementStatus::Unknown),
            amount,
            financial_txn_id: resp.settlement_id,
            failure_reason: resp.error_message,
        })
    }

    async fn account_balance(&self) -> AdapterResult<Money> {
        let token = self.bearer().await?;
        let resp: BalanceResponse = self
            .http
            .request_json(Method::GET, &self.endpoint("v2/account/balance"), Some(&token), &[], None)
            .await?;
        Ok(Money {
            amount: resp.balance,
            currency: resp.currency,
        })
    }

    async fn validate_counterparty(&self, phone: &str) -> AdapterResult<bool> {
        let token = self.bearer().await?;
        let resp: SubscriberResponse = self
            .http
            .request_json(
                Method::GET,
                &self.endpoint(&format!("v2/subscribers/{}", phone)),
                Some(&token),
                &[],
                None,
            )
            .await?;
        Ok(resp.registered)
    }

    fn verify_webhook(&self, payload: &[u8], signature: Option<&str>) -> VerificationResult {
        let Some(signature) = signature else {
            return VerificationResult {
                valid: false,
                reason: Some("missing signature header".to_string()),
            };
        };
        if verify_hmac_sha512_hex(&self.config.webhook_secret, payload, signature) {
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
            provider: ProviderName::AirtelTigo,
            provider_ref: body.txnid,
            external_ref: body.reference,
            status: body.status.as_deref().map(Self::map_status),
            financial_txn_id: body.settlement_id,
            failure_reason: body.error_message,
            payload: raw,
            received_at: chrono::Utc::now().to_rfc3339(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hmac::{Hmac, Mac};
    use sha2::Sha512;

    fn test_adapter() -> AirtelTigoAdapter {
        AirtelTigoAdapter::new(AirtelTigoConfig {
            base_url: "https://api.airteltigo.example.com".to_string(),
            api_key: "key".to_string(),
            api_secret: "secret".to_string(),
            webhook_secret: "whsec_at".to_string(),
            callback_url: "https://gateway.example.com/webhooks/airteltigo".to_string(),
            timeout_secs: 15,
        })
        .unwrap()
    }

    fn sign(secret: &str, payload: &[u8]) -> String {
        let mut mac = Hmac::<Sha512>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(payload);
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn status_words_map_to_settlement_states() {
        assert_eq!(AirtelTigoAdapter::map_status("SUCCESS"), SettlementStatus::Succeeded);
        assert_eq!(AirtelTigoAdapter::map_status("reversed"), SettlementStatus::Failed);
        assert_eq!(AirtelTigoAdapter::map_status("INPROGRESS"), SettlementStatus::Pending);
        assert_eq!(AirtelTigoAdapter::map_status("other"), SettlementStatus::Unknown);
    }

    #[test]
    fn embedded_error_code_becomes_a_decline() {
        let resp: TxnResponse = serde_json::from_str(
            r#"{"txnid":"AT-1","errorCode":"E42","errorMessage":"wallet barred"}"#,
        )
        .unwrap();
        let err = resp.check_error("airteltigo").unwrap_err();
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("wallet barred"));
    }

    #[test]
    fn zero_error_code_is_not_a_decline() {
        let resp: TxnResponse =
            serde_json::from_str(r#"{"txnid":"AT-2","status":"INPROGRESS","errorCode":"0"}"#)
                .unwrap();
        assert!(resp.check_error("airteltigo").is_ok());
    }

    #[test]
    fn webhook_verification_uses_sha512() {
        let adapter = test_adapter();
        let payload = br#"{"txnid":"AT-3","reference":"ext-3","status":"SUCCESS"}"#;
        let sig = sign("whsec_at", payload);
        assert!(adapter.verify_webhook(payload, Some(&sig)).valid);
        assert!(!adapter.verify_webhook(payload, Some(&sig[..64])).valid);
    }

    #[test]
    fn parse_webhook_extracts_correlation_fields() {
        let adapter = test_adapter();
        let payload = br#"{
            "txnid": "AT-5",
            "reference": "ext-5",
            "status": "FAIL",
            "errorMessage": "subscriber timeout"
        }"#;
        let parsed = adapter.parse_webhook(payload).unwrap();
        assert_eq!(parsed.provider_ref.as_deref(), Some("AT-5"));
        assert_eq!(parsed.external_ref.as_deref(), Some("ext-5"));
        assert_eq!(parsed.status, Some(SettlementStatus::Failed));
        assert_eq!(parsed.failure_reason.as_deref(), Some("subscriber timeout"));
    }
}
