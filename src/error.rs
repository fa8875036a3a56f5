//! Unified error handling for the gateway.
//!
//! Errors are classified into four kinds with proper HTTP status mapping,
//! user-facing messages, and structured error codes for client handling.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error codes for programmatic client handling
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorCode {
    // Domain errors (4xx)
    #[serde(rename = "TRANSACTION_NOT_FOUND")]
    TransactionNotFound,
    #[serde(rename = "DUPLICATE_TRANSACTION")]
    DuplicateTransaction,
    #[serde(rename = "INVALID_TRANSITION")]
    InvalidTransition,
    #[serde(rename = "TERMINAL_STATE_CONFLICT")]
    TerminalStateConflict,
    #[serde(rename = "PAYMENT_DECLINED")]
    PaymentDeclined,

    // Infrastructure errors (5xx)
    #[serde(rename = "DATABASE_ERROR")]
    DatabaseError,
    #[serde(rename = "CONFIGURATION_ERROR")]
    ConfigurationError,

    // External errors (502, 503, 504)
    #[serde(rename = "PAYMENT_PROVIDER_ERROR")]
    PaymentProviderError,
    #[serde(rename = "PROVIDER_AUTH_ERROR")]
    ProviderAuthError,
    #[serde(rename = "RATE_LIMIT_ERROR")]
    RateLimitError,
    #[serde(rename = "EXTERNAL_SERVICE_TIMEOUT")]
    ExternalServiceTimeout,

    // Generic
    #[serde(rename = "INTERNAL_ERROR")]
    InternalError,
    #[serde(rename = "VALIDATION_ERROR")]
    ValidationError,
    #[serde(rename = "INVALID_SIGNATURE")]
    InvalidSignature,
}

/// Domain-specific business logic errors
#[derive(Debug, Clone)]
pub enum DomainError {
    /// Payment request with the given reference doesn't exist
    TransactionNotFound { reference: String },
    /// Duplicate submission for an existing (provider, direction, ref) tuple
    DuplicateTransaction { reference: String },
    /// The state machine forbids this transition
    InvalidTransition { from: String, to: String },
    /// Push and pull reconciliation disagree on the terminal outcome
    TerminalConflict { message: String },
    /// Provider permanently declined the payment
    PaymentDeclined { reason: String },
}

/// Infrastructure-level errors (database, configuration)
#[derive(Debug, Clone)]
pub enum InfrastructureError {
    /// Database connection or query failure
    Database { message: String, is_retryable: bool },
    /// Missing or invalid configuration
    Configuration { message: String },
}

/// External service errors (the mobile-money networks)
#[derive(Debug, Clone)]
pub enum ExternalError {
    /// Provider-side error
    PaymentProvider {
        provider: String,
        message: String,
        is_retryable: bool,
    },
    /// Credential rejected by the provider; affects every request to that
    /// network, alarmed distinctly from a single failed call
    ProviderAuth { provider: String, message: String },
    /// Rate limit exceeded
    RateLimit {
        service: String,
        retry_after: Option<u64>,
    },
    /// External service timeout
    Timeout { service: String, timeout_secs: u64 },
}

/// Input validation errors
#[derive(Debug, Clone)]
pub enum ValidationError {
    /// Invalid phone number format
    InvalidPhone { phone: String, reason: String },
    /// Unsupported or invalid currency
    InvalidCurrency { currency: String, reason: String },
    /// Invalid amount (format or value)
    InvalidAmount { amount: String, reason: String },
    /// Required field missing
    MissingField { field: String },
    /// Unknown or unconfigured provider
    UnknownProvider { provider: String },
    /// Webhook signature failed verification
    InvalidSignature { provider: String },
    /// Anything else the caller got wrong
    Other { message: String },
}

/// Unified application error type
#[derive(Debug, Clone)]
pub struct AppError {
    pub kind: AppErrorKind,
    pub request_id: Option<String>,
    pub context: Option<String>,
}

#[derive(Debug, Clone)]
pub enum AppErrorKind {
    Domain(DomainError),
    Infrastructure(InfrastructureError),
    External(ExternalError),
    Validation(ValidationError),
}

impl AppError {
    pub fn new(kind: AppErrorKind) -> Self {
        Self {
            kind,
            request_id: None,
            context: None,
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Map error to HTTP status code
    pub fn status_code(&self) -> u16 {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::TransactionNotFound { .. } => 404,
                DomainError::DuplicateTransaction { .. } => 409,
                DomainError::InvalidTransition { .. } => 409,
                DomainError::TerminalConflict { .. } => 409,
                DomainError::PaymentDeclined { .. } => 422,
            },
            AppErrorKind::Infrastructure(_) => 500,
            AppErrorKind::External(err) => match err {
                ExternalError::PaymentProvider { .. } => 502,
                ExternalError::ProviderAuth { .. } => 502,
                ExternalError::RateLimit { .. } => 429,
                ExternalError::Timeout { .. } => 504,
            },
            AppErrorKind::Validation(err) => match err {
                ValidationError::InvalidSignature { .. } => 401,
                _ => 400,
            },
        }
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> ErrorCode {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::TransactionNotFound { .. } => ErrorCode::TransactionNotFound,
                DomainError::DuplicateTransaction { .. } => ErrorCode::DuplicateTransaction,
                DomainError::InvalidTransition { .. } => ErrorCode::InvalidTransition,
                DomainError::TerminalConflict { .. } => ErrorCode::TerminalStateConflict,
                DomainError::PaymentDeclined { .. } => ErrorCode::PaymentDeclined,
            },
            AppErrorKind::Infrastructure(err) => match err {
                InfrastructureError::Database { .. } => ErrorCode::DatabaseError,
                InfrastructureError::Configuration { .. } => ErrorCode::ConfigurationError,
            },
            AppErrorKind::External(err) => match err {
                ExternalError::PaymentProvider { .. } => ErrorCode::PaymentProviderError,
                ExternalError::ProviderAuth { .. } => ErrorCode::ProviderAuthError,
                ExternalError::RateLimit { .. } => ErrorCode::RateLimitError,
                ExternalError::Timeout { .. } => ErrorCode::ExternalServiceTimeout,
            },
            AppErrorKind::Validation(err) => match err {
                ValidationError::InvalidSignature { .. } => ErrorCode::InvalidSignature,
                _ => ErrorCode::ValidationError,
            },
        }
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::TransactionNotFound { reference } => {
                    format!("Transaction '{}' not found", reference)
                }
                DomainError::DuplicateTransaction { reference } => {
                    format!("Transaction '{}' already exists", reference)
                }
                DomainError::InvalidTransition { from, to } => {
                    format!("Cannot move transaction from {} to {}", from, to)
                }
                DomainError::TerminalConflict { .. } => {
                    "Transaction outcome is in dispute and queued for manual review".to_string()
                }
                DomainError::PaymentDeclined { reason } => {
                    format!("Payment was declined: {}", reason)
                }
            },
            AppErrorKind::Infrastructure(_) => {
                "Service temporarily unavailable. Please try again later".to_string()
            }
            AppErrorKind::External(err) => match err {
                ExternalError::PaymentProvider {
                    provider,
                    is_retryable,
                    ..
                } => {
                    if *is_retryable {
                        format!(
                            "Payment provider ({}) is temporarily unavailable. Please try again",
                            provider
                        )
                    } else {
                        "Payment processing failed. Please contact support".to_string()
                    }
                }
                ExternalError::ProviderAuth { provider, .. } => {
                    format!(
                        "Payment provider ({}) is temporarily unavailable. Please try again",
                        provider
                    )
                }
                ExternalError::RateLimit {
                    service,
                    retry_after,
                } => {
                    if let Some(secs) = retry_after {
                        format!(
                            "Rate limit exceeded for {}. Please try again in {} seconds",
                            service, secs
                        )
                    } else {
                        format!("Rate limit exceeded for {}. Please try again later", service)
                    }
                }
                ExternalError::Timeout {
                    service,
                    timeout_secs,
                } => {
                    format!(
                        "{} request timed out after {} seconds. Please try again",
                        service, timeout_secs
                    )
                }
            },
            AppErrorKind::Validation(err) => match err {
                ValidationError::InvalidPhone { phone, reason } => {
                    format!("Invalid phone number '{}': {}", phone, reason)
                }
                ValidationError::InvalidCurrency { currency, reason } => {
                    format!("Invalid currency '{}': {}", currency, reason)
                }
                ValidationError::InvalidAmount { amount, reason } => {
                    format!("Invalid amount '{}': {}", amount, reason)
                }
                ValidationError::MissingField { field } => {
                    format!("Required field '{}' is missing", field)
                }
                ValidationError::UnknownProvider { provider } => {
                    format!("Unknown payment provider '{}'", provider)
                }
                ValidationError::InvalidSignature { provider } => {
                    format!("Webhook signature verification failed for '{}'", provider)
                }
                ValidationError::Other { message } => message.clone(),
            },
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        match &self.kind {
            AppErrorKind::Domain(_) => false,
            AppErrorKind::Infrastructure(err) => match err {
                InfrastructureError::Database { is_retryable, .. } => *is_retryable,
                InfrastructureError::Configuration { .. } => false,
            },
            AppErrorKind::External(err) => match err {
                ExternalError::PaymentProvider { is_retryable, .. } => *is_retryable,
                ExternalError::ProviderAuth { .. } => true,
                ExternalError::RateLimit { .. } => true,
                ExternalError::Timeout { .. } => true,
            },
            AppErrorKind::Validation(_) => false,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.user_message())
    }
}

impl std::error::Error for AppError {}

impl From<crate::database::error::DatabaseError> for AppError {
    fn from(err: crate::database::error::DatabaseError) -> Self {
        use crate::database::error::DatabaseErrorKind;

        let kind = match err.kind() {
            DatabaseErrorKind::ConnectionFailed { message } => {
                AppErrorKind::Infrastructure(InfrastructureError::Database {
                    message: message.clone(),
                    is_retryable: true,
                })
            }
            DatabaseErrorKind::UniqueConstraintViolation { constraint } => {
                AppErrorKind::Domain(DomainError::DuplicateTransaction {
                    reference: constraint.clone(),
                })
            }
            DatabaseErrorKind::RowNotFound => {
                AppErrorKind::Domain(DomainError::TransactionNotFound {
                    reference: "unknown".to_string(),
                })
            }
            DatabaseErrorKind::QueryFailed { message } | DatabaseErrorKind::Unknown { message } => {
                AppErrorKind::Infrastructure(InfrastructureError::Database {
                    message: message.clone(),
                    is_retryable: false,
                })
            }
        };

        AppError::new(kind)
    }
}

impl From<crate::tracker::TrackerError> for AppError {
    fn from(err: crate::tracker::TrackerError) -> Self {
        use crate::tracker::TrackerError;

        match err {
            TrackerError::Validation { message } => {
                AppError::new(AppErrorKind::Validation(ValidationError::Other { message }))
            }
            TrackerError::NotFound { reference } => AppError::new(AppErrorKind::Domain(
                DomainError::TransactionNotFound { reference },
            )),
            TrackerError::InvalidTransition { from, to } => {
                AppError::new(AppErrorKind::Domain(DomainError::InvalidTransition {
                    from,
                    to,
                }))
            }
            TrackerError::Conflict { message } => {
                AppError::new(AppErrorKind::Domain(DomainError::TerminalConflict { message }))
            }
            TrackerError::Database(db) => db.into(),
        }
    }
}

/// Result type for operations that can fail with AppError
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_error() {
        let error = AppError::new(AppErrorKind::Domain(DomainError::TransactionNotFound {
            reference: "momo_abc".to_string(),
        }));

        assert_eq!(error.status_code(), 404);
        assert_eq!(error.error_code(), ErrorCode::TransactionNotFound);
        assert!(error.user_message().contains("momo_abc"));
        assert!(!error.is_retryable());
    }

    #[test]
    fn test_terminal_conflict_error() {
        let error = AppError::new(AppErrorKind::Domain(DomainError::TerminalConflict {
            message: "webhook said succeeded, poll said failed".to_string(),
        }));

        assert_eq!(error.status_code(), 409);
        assert_eq!(error.error_code(), ErrorCode::TerminalStateConflict);
        assert!(!error.is_retryable());
    }

    #[test]
    fn test_rate_limit_error() {
        let error = AppError::new(AppErrorKind::External(ExternalError::RateLimit {
            service: "mtn".to_string(),
            retry_after: Some(60),
        }));

        assert_eq!(error.status_code(), 429);
        assert_eq!(error.error_code(), ErrorCode::RateLimitError);
        assert!(error.is_retryable());
    }

    #[test]
    fn test_provider_auth_is_retryable_but_distinct() {
        let error = AppError::new(AppErrorKind::External(ExternalError::ProviderAuth {
            provider: "vodafone".to_string(),
            message: "credentials rejected".to_string(),
        }));

        assert_eq!(error.status_code(), 502);
        assert_eq!(error.error_code(), ErrorCode::ProviderAuthError);
        assert!(error.is_retryable());
    }

    #[test]
    fn test_invalid_signature_maps_to_401() {
        let error = AppError::new(AppErrorKind::Validation(ValidationError::InvalidSignature {
            provider: "mtn".to_string(),
        }));

        assert_eq!(error.status_code(), 401);
        assert_eq!(error.error_code(), ErrorCode::InvalidSignature);
        assert!(!error.is_retryable());
    }
}
