//! Service layer: the payment gateway front door, the reconciliation
//! engine, and webhook ingestion.

pub mod gateway;
pub mod reconciliation;
pub mod webhook_ingest;

pub use gateway::{PaymentGateway, SubmitOutcome};
pub use reconciliation::{ReconcileOutcome, ReconciliationEngine};
pub use webhook_ingest::{IngestOutcome, WebhookIngest};
