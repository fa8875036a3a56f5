use crate::providers::error::{AdapterError, AdapterResult};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::time::Duration;
use tracing::{debug, warn};

/// Thin wrapper over `reqwest` that performs exactly one request per call.
/// Retry policy lives in the scheduler, not here; a network or 5xx failure
/// surfaces immediately as a retryable error and the caller's record stays
/// queued for the next attempt.
#[derive(Debug, Clone)]
pub struct ProviderHttpClient {
    client: Client,
    provider: &'static str,
}

impl ProviderHttpClient {
    pub fn new(provider: &'static str, timeout: Duration) -> AdapterResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AdapterError::NetworkError {
                message: format!("failed to build http client: {}", e),
            })?;
        Ok(Self { client, provider })
    }

    /// Issues one request and decodes the JSON body into `T`.
    /// Maps transport and status failures onto the adapter error taxonomy.
    pub async fn request_json<T: DeserializeOwned>(
        &self,
        method: Method,
        url: &str,
        bearer: Option<&str>,
        headers: &[(&str, String)],
        body: Option<&JsonValue>,
    ) -> AdapterResult<T> {
        let mut req = self.client.request(method.clone(), url);
        if let Some(token) = bearer {
            req = req.bearer_auth(token);
        }
        for (name, value) in headers {
            req = req.header(*name, value);
        }
        if let Some(json) = body {
            req = req.json(json);
        }

        debug!(provider = self.provider, %method, url, "provider request");

        let resp = req.send().await.map_err(|e| {
            warn!(provider = self.provider, url, error = %e, "provider request failed");
            if e.is_timeout() {
                AdapterError::NetworkError {
                    message: format!("request to {} timed out", self.provider),
                }
            } else {
                AdapterError::NetworkError {
                    message: format!("request to {} failed: {}", self.provider, e),
                }
            }
        })?;

        let status = resp.status();
        let retry_after = retry_after_seconds(&resp);
        let text = resp.text().await.map_err(|e| AdapterError::NetworkError {
            message: format!("failed reading {} response body: {}", self.provider, e),
        })?;

        if !status.is_success() {
            return Err(self.map_error_status(status, retry_after, &text));
        }

        if text.trim().is_empty() {
            // Some provider endpoints (MTN request-to-pay) return 202 with no
            // body. Decode from an empty object so callers can use structs
            // whose fields are all optional.
            return serde_json::from_value(JsonValue::Object(Default::default())).map_err(|e| {
                AdapterError::ProviderError {
                    provider: self.provider.to_string(),
                    message: format!("empty response body could not satisfy decoder: {}", e),
                    provider_code: None,
                    retryable: false,
                }
            });
        }

        serde_json::from_str(&text).map_err(|e| AdapterError::ProviderError {
            provider: self.provider.to_string(),
            message: format!("malformed response body: {}", e),
            provider_code: None,
            retryable: false,
        })
    }

    fn map_error_status(
        &self,
        status: StatusCode,
        retry_after: Option<u64>,
        body: &str,
    ) -> AdapterError {
        let snippet = truncate_body(body);
        warn!(
            provider = self.provider,
            status = status.as_u16(),
            body = %snippet,
            "provider returned error status"
        );

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => AdapterError::AuthError {
                provider: self.provider.to_string(),
                message: format!("provider rejected credentials (HTTP {})", status.as_u16()),
            },
            StatusCode::TOO_MANY_REQUESTS => AdapterError::RateLimitError {
                message: format!("{} rate limit exceeded", self.provider),
                retry_after_seconds: retry_after,
            },
            s if s.is_server_error() => AdapterError::ProviderError {
                provider: self.provider.to_string(),
                message: format!("provider error (HTTP {}): {}", s.as_u16(), snippet),
                provider_code: None,
                retryable: true,
            },
            s => AdapterError::ProviderError {
                provider: self.provider.to_string(),
                message: format!("provider rejected request (HTTP {}): {}", s.as_u16(), snippet),
                provider_code: None,
                retryable: false,
            },
        }
    }
}

fn retry_after_seconds(resp: &reqwest::Response) -> Option<u64> {
    resp.headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 256;
    if body.len() <= MAX {
        return body.to_string();
    }
    // Back off to a character boundary so multibyte bodies cannot panic
    // the slice.
    let mut cut = MAX;
    while !body.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}...", &body[..cut])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_body_keeps_short_bodies() {
        assert_eq!(truncate_body("ok"), "ok");
    }

    #[test]
    fn truncate_body_shortens_long_bodies() {
        let long = "x".repeat(1000);
        let out = truncate_body(&long);
        assert!(out.len() < long.len());
        assert!(out.ends_with("..."));
    }

    #[test]
    fn truncate_body_respects_multibyte_boundaries() {
        // 3-byte characters straddle the cut point.
        let long = "€".repeat(100);
        let out = truncate_body(&long);
        assert!(out.ends_with("..."));
        assert!(out.trim_end_matches("...").chars().all(|c| c == '€'));
    }
}
