use crate::services::reconciliation::{ReconcileOutcome, ReconciliationEngine};
use crate::tracker::TransactionTracker;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct ReconciliationSweepConfig {
    /// How often the sweep runs.
    pub poll_interval: Duration,
    /// Submitted records younger than this are left alone; providers need a
    /// moment to settle before we start polling them.
    pub submitted_grace: Duration,
    /// Submitted records older than this with still no terminal outcome are
    /// escalated to manual review.
    pub escalate_after: Duration,
    /// Maximum rows fetched per cycle.
    pub batch_size: i64,
}

impl Default for ReconciliationSweepConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
            submitted_grace: Duration::from_secs(300),
            escalate_after: Duration::from_secs(3600),
            batch_size: 100,
        }
    }
}

impl ReconciliationSweepConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        cfg.poll_interval = env_secs("RECON_POLL_SECS", cfg.poll_interval);
        cfg.submitted_grace = env_secs("SUBMITTED_GRACE_SECS", cfg.submitted_grace);
        cfg.escalate_after = env_secs("SUBMITTED_ESCALATE_SECS", cfg.escalate_after);
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

/// Pull-path reconciliation: periodically polls providers for submitted
/// records past the grace period and applies the reported outcome. Safe to
/// run alongside webhook delivery because both paths go through the same
/// guarded terminal transition.
pub struct ReconciliationSweepWorker {
    engine: Arc<ReconciliationEngine>,
    tracker: Arc<TransactionTracker>,
    config: ReconciliationSweepConfig,
}

impl ReconciliationSweepWorker {
    pub fn new(
        engine: Arc<ReconciliationEngine>,
        tracker: Arc<TransactionTracker>,
        config: ReconciliationSweepConfig,
    ) -> Self {
        Self {
            engine,
            tracker,
            config,
        }
    }

    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(
            poll_interval_secs = self.config.poll_interval.as_secs(),
            submitted_grace_secs = self.config.submitted_grace.as_secs(),
            "reconciliation sweep worker started"
        );

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("reconciliation sweep worker stopping");
                        break;
                    }
                }
                _ = tokio::time::sleep(self.config.poll_interval) => {
                    if let Err(e) = self.run_cycle().await {
                        warn!(error = %e, "reconciliation sweep cycle failed");
                    }
                }
            }
        }

        info!("reconciliation sweep worker stopped");
    }

    async fn run_cycle(&self) -> anyhow::Result<()> {
        let stale = self
            .tracker
            .stale_submitted(
                self.config.submitted_grace.as_secs() as i32,
                self.config.batch_size,
            )
            .await?;

        if stale.is_empty() {
            return Ok(());
        }

        info!(count = stale.len(), "polling providers for stale submitted records");

        let mut resolved = 0;
        for row in stale {
            match self.engine.reconcile_record(&row).await {
                Ok(ReconcileOutcome::Applied) | Ok(ReconcileOutcome::AlreadyTerminal) => {
                    resolved += 1;
                }
                Ok(ReconcileOutcome::NoChange) => {
                    // The provider still says in flight. If it has been in
                    // flight for far too long, hand it to an operator.
                    let age = chrono::Utc::now().signed_duration_since(row.updated_at);
                    if age.to_std().unwrap_or_default() > self.config.escalate_after {
                        warn!(
                            external_ref = %row.external_ref,
                            age_secs = age.num_seconds(),
                            "submitted record unresolved past escalation deadline"
                        );
                        self.tracker
                            .flag_for_review(row.id, "no terminal outcome after extended polling")
                            .await?;
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    // Conflicts are already flagged by the tracker; anything
                    // else is logged and retried next sweep.
                    warn!(external_ref = %row.external_ref, error = %e, "reconciliation failed");
                }
            }
        }

        if resolved > 0 {
            info!(resolved, "reconciliation sweep resolved records");
        }
        Ok(())
    }
}
