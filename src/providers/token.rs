use crate::providers::error::AdapterResult;
use crate::providers::types::ProviderToken;
use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

/// Default validity margin. A token within this window of expiry is treated
/// as already expired so an in-flight request never carries a credential the
/// provider is about to reject.
pub const DEFAULT_SAFETY_MARGIN: Duration = Duration::from_secs(60);

/// Per-provider token slot with single-flight refresh. The slot mutex is held
/// across the refresh call, so concurrent callers that find a stale token
/// queue behind one network request instead of stampeding the auth endpoint.
#[derive(Debug)]
pub struct TokenCache {
    slot: Mutex<Option<ProviderToken>>,
    safety_margin: Duration,
}

impl Default for TokenCache {
    fn default() -> Self {
        Self::new(DEFAULT_SAFETY_MARGIN)
    }
}

impl TokenCache {
    pub fn new(safety_margin: Duration) -> Self {
        Self {
            slot: Mutex::new(None),
            safety_margin,
        }
    }

    /// Builds a cache with the margin from `TOKEN_SAFETY_MARGIN_SECS`,
    /// falling back to the default. All providers share the one knob.
    pub fn from_env() -> Self {
        let margin = std::env::var("TOKEN_SAFETY_MARGIN_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_SAFETY_MARGIN);
        Self::new(margin)
    }

    pub fn safety_margin(&self) -> Duration {
        self.safety_margin
    }

    /// Returns the cached token if still valid, otherwise runs `refresh`
    /// exactly once and caches its result. A failed refresh leaves the slot
    /// empty so the next caller retries.
    pub async fn get_or_refresh<F, Fut>(&self, refresh: F) -> AdapterResult<String>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = AdapterResult<ProviderToken>>,
    {
        let mut slot = self.slot.lock().await;
        if let Some(token) = slot.as_ref() {
            if token.valid_for(self.safety_margin) {
                return Ok(token.access_token.clone());
            }
            debug!("cached provider token expired, refreshing");
        }

        *slot = None;
        let token = refresh().await?;
        let access = token.access_token.clone();
        *slot = Some(token);
        Ok(access)
    }

    /// Drops the cached token. Used after the provider rejects a credential
    /// mid-lifetime (revocation, key rotation).
    pub async fn invalidate(&self) {
        let mut slot = self.slot.lock().await;
        *slot = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::error::AdapterError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn env_margin_overrides_default() {
        std::env::set_var("TOKEN_SAFETY_MARGIN_SECS", "120");
        let cache = TokenCache::from_env();
        assert_eq!(cache.safety_margin(), Duration::from_secs(120));

        std::env::remove_var("TOKEN_SAFETY_MARGIN_SECS");
        let cache = TokenCache::from_env();
        assert_eq!(cache.safety_margin(), DEFAULT_SAFETY_MARGIN);
    }

    #[tokio::test]
    async fn caches_token_across_calls() {
        let cache = TokenCache::default();
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let calls = calls.clone();
            let token = cache
                .get_or_refresh(move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(ProviderToken::from_expires_in("tok_a".to_string(), 3600))
                })
                .await
                .unwrap();
            assert_eq!(token, "tok_a");
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn refreshes_when_inside_safety_margin() {
        let cache = TokenCache::default();
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let calls = calls.clone();
            // 30s lifetime sits inside the 60s margin, so every call refreshes.
            cache
                .get_or_refresh(move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(ProviderToken::from_expires_in("tok".to_string(), 30))
                })
                .await
                .unwrap();
        }

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn concurrent_callers_trigger_one_refresh() {
        let cache = Arc::new(TokenCache::default());
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_refresh(move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                        Ok(ProviderToken::from_expires_in("tok_c".to_string(), 3600))
                    })
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), "tok_c");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_refresh_leaves_slot_empty() {
        let cache = TokenCache::default();

        let err = cache
            .get_or_refresh(|| async {
                Err(AdapterError::AuthError {
                    provider: "mtn".to_string(),
                    message: "bad key".to_string(),
                })
            })
            .await;
        assert!(err.is_err());

        // Next caller gets a fresh attempt, not a poisoned slot.
        let token = cache
            .get_or_refresh(|| async {
                Ok(ProviderToken::from_expires_in("tok_d".to_string(), 3600))
            })
            .await
            .unwrap();
        assert_eq!(token, "tok_d");
    }

    #[tokio::test]
    async fn invalidate_forces_refresh() {
        let cache = TokenCache::default();
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let calls = calls.clone();
            cache
                .get_or_refresh(move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(ProviderToken::from_expires_in("tok".to_string(), 3600))
                })
                .await
                .unwrap();
            cache.invalidate().await;
        }

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
