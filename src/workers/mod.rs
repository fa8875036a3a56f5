//! Background workers. Each runs as an independent task coordinated only
//! through the persisted tracker state, then shuts down when the watch
//! channel flips.

pub mod reconciliation_sweep;
pub mod retry_scheduler;
pub mod webhook_replay;

pub use reconciliation_sweep::{ReconciliationSweepConfig, ReconciliationSweepWorker};
pub use retry_scheduler::{RetrySchedulerConfig, RetrySchedulerWorker};
pub use webhook_replay::WebhookReplayWorker;
