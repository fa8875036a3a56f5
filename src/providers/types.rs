use crate::providers::error::AdapterError;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ProviderName {
    Mtn,
    Vodafone,
    AirtelTigo,
}

impl ProviderName {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderName::Mtn => "mtn",
            ProviderName::Vodafone => "vodafone",
            ProviderName::AirtelTigo => "airteltigo",
        }
    }

    pub fn all() -> [ProviderName; 3] {
        [
            ProviderName::Mtn,
            ProviderName::Vodafone,
            ProviderName::AirtelTigo,
        ]
    }
}

impl std::fmt::Display for ProviderName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ProviderName {
    type Err = AdapterError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "mtn" | "mtn-momo" => Ok(ProviderName::Mtn),
            "vodafone" | "vodafone-cash" => Ok(ProviderName::Vodafone),
            "airteltigo" | "airtel-tigo" => Ok(ProviderName::AirtelTigo),
            _ => Err(AdapterError::ValidationError {
                message: format!("unsupported provider: {}", value),
                field: Some("provider".to_string()),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Collection,
    Disbursement,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Collection => "collection",
            Direction::Disbursement => "disbursement",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Direction {
    type Err = AdapterError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "collection" => Ok(Direction::Collection),
            "disbursement" => Ok(Direction::Disbursement),
            _ => Err(AdapterError::ValidationError {
                message: format!("unsupported direction: {}", value),
                field: Some("direction".to_string()),
            }),
        }
    }
}

/// Amount carried as a string and validated through `BigDecimal`, so wire
/// payloads never go through a lossy float.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Money {
    pub amount: String,
    pub currency: String,
}

impl Money {
    pub fn validate_positive(&self, field: &str) -> Result<(), AdapterError> {
        let parsed =
            BigDecimal::from_str(&self.amount).map_err(|_| AdapterError::ValidationError {
                message: format!("invalid decimal amount: {}", self.amount),
                field: Some(field.to_string()),
            })?;
        if parsed <= BigDecimal::from(0) {
            return Err(AdapterError::ValidationError {
                message: "amount must be greater than zero".to_string(),
                field: Some(field.to_string()),
            });
        }
        if self.currency.trim().is_empty() {
            return Err(AdapterError::ValidationError {
                message: "currency is required".to_string(),
                field: Some("currency".to_string()),
            });
        }
        Ok(())
    }
}

/// Provider-reported settlement state of a single money movement.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SettlementStatus {
    Pending,
    Succeeded,
    Failed,
    Unknown,
}

/// Pre-validated order handed to an adapter. The tracker guarantees the
/// amount is positive and the phone is in international format before any
/// adapter sees it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentOrder {
    pub amount: Money,
    pub phone: String,
    pub external_ref: String,
    pub note: Option<String>,
}

/// Returned when a provider accepts a collection or disbursement request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderAcceptance {
    pub provider_ref: String,
    pub status: SettlementStatus,
}

/// Result of an active status query against the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderStatus {
    pub status: SettlementStatus,
    pub amount: Option<Money>,
    pub financial_txn_id: Option<String>,
    pub failure_reason: Option<String>,
}

/// A short-lived bearer credential. Replaced on refresh, never mutated.
#[derive(Debug, Clone)]
pub struct ProviderToken {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

impl ProviderToken {
    pub fn from_expires_in(access_token: String, expires_in_secs: i64) -> Self {
        Self {
            access_token,
            expires_at: Utc::now() + Duration::seconds(expires_in_secs),
        }
    }

    /// Still usable after accounting for the safety margin (clock skew plus
    /// in-flight request duration).
    pub fn valid_for(&self, safety_margin: std::time::Duration) -> bool {
        let margin = Duration::from_std(safety_margin).unwrap_or_else(|_| Duration::seconds(60));
        Utc::now() + margin < self.expires_at
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationResult {
    pub valid: bool,
    pub reason: Option<String>,
}

/// A provider callback after signature verification and shape extraction.
/// Correlation fields differ per provider; each adapter owns the mapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedWebhook {
    pub provider: ProviderName,
    pub provider_ref: Option<String>,
    pub external_ref: Option<String>,
    pub status: Option<SettlementStatus>,
    pub financial_txn_id: Option<String>,
    pub failure_reason: Option<String>,
    pub payload: JsonValue,
    pub received_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_name_parsing_works() {
        assert!(matches!(ProviderName::from_str("mtn"), Ok(ProviderName::Mtn)));
        assert!(matches!(
            ProviderName::from_str("Vodafone-Cash"),
            Ok(ProviderName::Vodafone)
        ));
        assert!(matches!(
            ProviderName::from_str("airteltigo"),
            Ok(ProviderName::AirtelTigo)
        ));
        assert!(ProviderName::from_str("orange").is_err());
    }

    #[test]
    fn money_rejects_non_positive_amounts() {
        let zero = Money {
            amount: "0".to_string(),
            currency: "GHS".to_string(),
        };
        assert!(zero.validate_positive("amount").is_err());

        let negative = Money {
            amount: "-5.00".to_string(),
            currency: "GHS".to_string(),
        };
        assert!(negative.validate_positive("amount").is_err());

        let valid = Money {
            amount: "100.00".to_string(),
            currency: "GHS".to_string(),
        };
        assert!(valid.validate_positive("amount").is_ok());
    }

    #[test]
    fn money_requires_currency() {
        let missing = Money {
            amount: "10".to_string(),
            currency: " ".to_string(),
        };
        assert!(missing.validate_positive("amount").is_err());
    }

    #[test]
    fn token_validity_honours_safety_margin() {
        let token =
            ProviderToken::from_expires_in("tok".to_string(), 3600);
        assert!(token.valid_for(std::time::Duration::from_secs(60)));

        let expiring = ProviderToken::from_expires_in("tok".to_string(), 30);
        assert!(!expiring.valid_for(std::time::Duration::from_secs(60)));
    }

    #[test]
    fn payment_order_serializes_to_json() {
        let order = PaymentOrder {
            amount: Money {
                amount: "100.00".to_string(),
                currency: "GHS".to_string(),
            },
            phone: "+233241234567".to_string(),
            external_ref: "ref_1".to_string(),
            note: Some("order 42".to_string()),
        };
        let json = serde_json::to_value(&order).expect("serialization should succeed");
        assert_eq!(json["amount"]["currency"], "GHS");
        assert_eq!(json["external_ref"], "ref_1");
    }
}
