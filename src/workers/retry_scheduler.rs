use crate::services::gateway::{PaymentGateway, SubmitOutcome};
use crate::tracker::TransactionTracker;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RetrySchedulerConfig {
    /// How often the worker wakes up to look for work.
    pub poll_interval: Duration,
    /// First-retry delay; attempt n waits base * 2^(n-1).
    pub base_delay: Duration,
    /// Cap on any single backoff interval.
    pub max_delay: Duration,
    /// Attempt ceiling; after this many retries the record is failed.
    pub max_attempts: u32,
    /// Records stuck pending longer than this get their first retry booked.
    pub pending_stale_after: Duration,
    /// Maximum rows fetched per cycle.
    pub batch_size: i64,
}

impl Default for RetrySchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(15),
            base_delay: Duration::from_secs(30),
            max_delay: Duration::from_secs(900),
            max_attempts: 5,
            pending_stale_after: Duration::from_secs(120),
            batch_size: 100,
        }
    }
}

impl RetrySchedulerConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        cfg.poll_interval = env_secs("RETRY_POLL_SECS", cfg.poll_interval);
        cfg.base_delay = env_secs("RETRY_BASE_SECS", cfg.base_delay);
        cfg.max_delay = env_secs("RETRY_MAX_SECS", cfg.max_delay);
        cfg.max_attempts = std::env::var("RETRY_MAX_ATTEMPTS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(cfg.max_attempts);
        cfg.pending_stale_after = env_secs("PENDING_STALE_SECS", cfg.pending_stale_after);
        cfg
    }
}

fn env_secs(name: &str, default: Duration) -> Duration {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

/// Delay before retry attempt `n` (1-based): base * 2^(n-1), capped.
pub fn backoff_delay(attempt: u32, base: Duration, cap: Duration) -> Duration {
    if attempt == 0 {
        return base.min(cap);
    }
    let factor = 2u64.saturating_pow(attempt.saturating_sub(1).min(32));
    let delay = base.as_secs().saturating_mul(factor);
    Duration::from_secs(delay).min(cap)
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

/// Re-attempts pending records that never got a provider acknowledgment.
/// Each retry reuses the record's original external reference so the
/// provider can deduplicate; after the attempt ceiling the record is failed
/// with "max retries exceeded" and surfaced for manual intervention.
pub struct RetrySchedulerWorker {
    gateway: Arc<PaymentGateway>,
    tracker: Arc<TransactionTracker>,
    config: RetrySchedulerConfig,
}

impl RetrySchedulerWorker {
    pub fn new(
        gateway: Arc<PaymentGateway>,
        tracker: Arc<TransactionTracker>,
        config: RetrySchedulerConfig,
    ) -> Self {
        Self {
            gateway,
            tracker,
            config,
        }
    }

    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(
            poll_interval_secs = self.config.poll_interval.as_secs(),
            base_delay_secs = self.config.base_delay.as_secs(),
            max_attempts = self.config.max_attempts,
            "retry scheduler worker started"
        );

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("retry scheduler worker stopping");
                        break;
                    }
                }
                _ = tokio::time::sleep(self.config.poll_interval) => {
                    if let Err(e) = self.run_cycle().await {
                        warn!(error = %e, "retry scheduler cycle failed");
                    }
                }
            }
        }

        info!("retry scheduler worker stopped");
    }

    async fn run_cycle(&self) -> anyhow::Result<()> {
        self.escalate_stale_pending().await?;
        self.process_due_retries().await?;
        Ok(())
    }

    /// Books the first retry slot for records stuck pending with no
    /// acknowledgment and no retry scheduled yet.
    async fn escalate_stale_pending(&self) -> anyhow::Result<()> {
        let stale = self
            .tracker
            .stale_pending(
                self.config.pending_stale_after.as_secs() as i32,
                self.config.batch_size,
            )
            .await?;

        for row in stale {
            let next_attempt = row.attempt_count as u32 + 1;
            if next_attempt > self.config.max_attempts {
                self.tracker.fail_max_retries(row.id).await?;
                continue;
            }

            let delay = backoff_delay(next_attempt, self.config.base_delay, self.config.max_delay);
            let due_at = chrono::Utc::now()
                + chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::seconds(30));
            if self.tracker.schedule_retry(row.id, due_at).await? {
                info!(
                    external_ref = %row.external_ref,
                    attempt = next_attempt,
                    delay_secs = delay.as_secs(),
                    "booked retry for stale pending record"
                );
            }
        }

        Ok(())
    }

    /// Re-submits records whose retry slot has come due.
    async fn process_due_retries(&self) -> anyhow::Result<()> {
        let due = self.tracker.due_retries(self.config.batch_size).await?;

        for row in due {
            info!(
                external_ref = %row.external_ref,
                attempt = row.attempt_count,
                "re-submitting payment request"
            );

            match self.gateway.submit(&row).await {
                Ok(SubmitOutcome::Submitted) | Ok(SubmitOutcome::FailedPermanently) => {
                    // Record left the pending set either way.
                }
                Ok(SubmitOutcome::Deferred) => {
                    let next_attempt = row.attempt_count as u32 + 1;
                    if next_attempt > self.config.max_attempts {
                        self.tracker.fail_max_retries(row.id).await?;
                    } else {
                        let delay = backoff_delay(
                            next_attempt,
                            self.config.base_delay,
                            self.config.max_delay,
                        );
                        let due_at = chrono::Utc::now()
                            + chrono::Duration::from_std(delay)
                                .unwrap_or(chrono::Duration::seconds(30));
                        self.tracker.schedule_retry(row.id, due_at).await?;
                    }
                }
                Err(e) => {
                    warn!(
                        external_ref = %row.external_ref,
                        error = %e,
                        "retry submission errored"
                    );
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: Duration = Duration::from_secs(30);
    const CAP: Duration = Duration::from_secs(900);

    #[test]
    fn backoff_doubles_per_attempt() {
        assert_eq!(backoff_delay(1, BASE, CAP), Duration::from_secs(30));
        assert_eq!(backoff_delay(2, BASE, CAP), Duration::from_secs(60));
        assert_eq!(backoff_delay(3, BASE, CAP), Duration::from_secs(120));
        assert_eq!(backoff_delay(4, BASE, CAP), Duration::from_secs(240));
        assert_eq!(backoff_delay(5, BASE, CAP), Duration::from_secs(480));
    }

    #[test]
    fn backoff_is_capped() {
        assert_eq!(backoff_delay(6, BASE, CAP), CAP);
        assert_eq!(backoff_delay(20, BASE, CAP), CAP);
        assert_eq!(backoff_delay(u32::MAX, BASE, CAP), CAP);
    }

    #[test]
    fn backoff_is_strictly_monotonic_until_the_cap() {
        let mut previous = Duration::ZERO;
        for attempt in 1..=5 {
            let delay = backoff_delay(attempt, BASE, CAP);
            assert!(delay > previous, "attempt {} did not grow", attempt);
            previous = delay;
        }
    }

    #[test]
    fn zero_attempt_falls_back_to_base() {
        assert_eq!(backoff_delay(0, BASE, CAP), BASE);
    }

    #[test]
    fn config_defaults_are_modest() {
        let cfg = RetrySchedulerConfig::default();
        assert_eq!(cfg.max_attempts, 5);
        assert!(cfg.base_delay < cfg.max_delay);
    }
}
