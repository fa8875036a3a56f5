use crate::services::webhook_ingest::WebhookIngest;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};

/// Re-applies verified webhook events that could not be applied on receipt,
/// typically because the callback arrived before the payment record was
/// visible or a transient database error interrupted processing.
pub struct WebhookReplayWorker {
    ingest: Arc<WebhookIngest>,
    interval: Duration,
    max_attempts: i32,
    batch_size: i64,
}

impl WebhookReplayWorker {
    pub fn new(ingest: Arc<WebhookIngest>, interval: Duration) -> Self {
        Self {
            ingest,
            interval,
            max_attempts: 5,
            batch_size: 50,
        }
    }

    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(
            interval_secs = self.interval.as_secs(),
            "webhook replay worker started"
        );

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("webhook replay worker stopping");
                        break;
                    }
                }
                _ = tokio::time::sleep(self.interval) => {
                    match self
                        .ingest
                        .replay_unprocessed(self.max_attempts, self.batch_size)
                        .await
                    {
                        Ok(count) if count > 0 => {
                            info!(applied = count, "replayed webhook events");
                        }
                        Ok(_) => {}
                        Err(e) => {
                            error!(error = %e, "webhook replay cycle failed");
                        }
                    }
                }
            }
        }

        info!("webhook replay worker stopped");
    }
}
