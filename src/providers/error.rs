use thiserror::Error;

pub type AdapterResult<T> = Result<T, AdapterError>;

/// Errors produced by the provider adapters.
///
/// The taxonomy drives retry policy upstream: the adapter itself never
/// retries, it only classifies. Authentication failures are kept distinct
/// from plain network errors because they indicate a credential problem
/// affecting every request to that provider.
#[derive(Debug, Clone, Error)]
pub enum AdapterError {
    #[error("Validation error: {message}")]
    ValidationError {
        message: String,
        field: Option<String>,
    },

    #[error("Authentication failed for {provider}: {message}")]
    AuthError { provider: String, message: String },

    #[error("Request declined: {message}")]
    DeclinedError {
        message: String,
        provider_code: Option<String>,
    },

    #[error("Network error: {message}")]
    NetworkError { message: String },

    #[error("Rate limit exceeded: {message}")]
    RateLimitError {
        message: String,
        retry_after_seconds: Option<u64>,
    },

    #[error("Webhook verification failed: {message}")]
    WebhookVerificationError { message: String },

    #[error("Provider error: provider={provider}, message={message}")]
    ProviderError {
        provider: String,
        message: String,
        provider_code: Option<String>,
        retryable: bool,
    },
}

impl AdapterError {
    pub fn is_retryable(&self) -> bool {
        match self {
            AdapterError::ValidationError { .. } => false,
            AdapterError::AuthError { .. } => true,
            AdapterError::DeclinedError { .. } => false,
            AdapterError::NetworkError { .. } => true,
            AdapterError::RateLimitError { .. } => true,
            AdapterError::WebhookVerificationError { .. } => false,
            AdapterError::ProviderError { retryable, .. } => *retryable,
        }
    }

    /// Credential problems are retryable at the request level but are alarmed
    /// separately, since they affect the whole provider rather than one call.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, AdapterError::AuthError { .. })
    }

    pub fn user_message(&self) -> String {
        match self {
            AdapterError::ValidationError { message, .. } => message.clone(),
            AdapterError::AuthError { .. } => {
                "Payment provider rejected our credentials".to_string()
            }
            AdapterError::DeclinedError { .. } => {
                "Request was declined by the provider".to_string()
            }
            AdapterError::NetworkError { .. } => {
                "Payment provider is temporarily unavailable".to_string()
            }
            AdapterError::RateLimitError { .. } => {
                "Too many requests to payment provider. Please retry shortly".to_string()
            }
            AdapterError::WebhookVerificationError { .. } => {
                "Invalid webhook signature".to_string()
            }
            AdapterError::ProviderError { .. } => "Payment provider returned an error".to_string(),
        }
    }
}

impl From<AdapterError> for crate::error::AppError {
    fn from(err: AdapterError) -> Self {
        use crate::error::{
            AppError, AppErrorKind, DomainError, ExternalError, ValidationError,
        };

        let kind = match err {
            AdapterError::ValidationError { message, .. } => {
                AppErrorKind::Validation(ValidationError::Other { message })
            }
            AdapterError::AuthError { provider, message } => {
                AppErrorKind::External(ExternalError::ProviderAuth { provider, message })
            }
            AdapterError::DeclinedError { message, .. } => {
                AppErrorKind::Domain(DomainError::PaymentDeclined { reason: message })
            }
            AdapterError::RateLimitError {
                retry_after_seconds,
                ..
            } => AppErrorKind::External(ExternalError::RateLimit {
                service: "momo".to_string(),
                retry_after: retry_after_seconds,
            }),
            AdapterError::WebhookVerificationError { .. } => {
                AppErrorKind::Validation(ValidationError::InvalidSignature {
                    provider: "momo".to_string(),
                })
            }
            AdapterError::NetworkError { message } => {
                AppErrorKind::External(ExternalError::PaymentProvider {
                    provider: "momo".to_string(),
                    message,
                    is_retryable: true,
                })
            }
            AdapterError::ProviderError {
                provider,
                message,
                retryable,
                ..
            } => AppErrorKind::External(ExternalError::PaymentProvider {
                provider,
                message,
                is_retryable: retryable,
            }),
        };

        AppError::new(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_flags_are_set() {
        assert!(AdapterError::NetworkError {
            message: "timeout".to_string()
        }
        .is_retryable());
        assert!(AdapterError::RateLimitError {
            message: "limited".to_string(),
            retry_after_seconds: Some(30)
        }
        .is_retryable());
        assert!(!AdapterError::DeclinedError {
            message: "declined".to_string(),
            provider_code: None
        }
        .is_retryable());
        assert!(!AdapterError::ValidationError {
            message: "bad phone".to_string(),
            field: Some("phone".to_string())
        }
        .is_retryable());
    }

    #[test]
    fn auth_failures_are_distinct_and_retryable() {
        let err = AdapterError::AuthError {
            provider: "mtn".to_string(),
            message: "invalid subscription key".to_string(),
        };
        assert!(err.is_auth_failure());
        assert!(err.is_retryable());
        assert!(!AdapterError::NetworkError {
            message: "timeout".to_string()
        }
        .is_auth_failure());
    }
}
