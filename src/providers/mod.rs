//! Provider adapters for the three mobile-money networks, plus the shared
//! plumbing they ride on: the single-shot HTTP client, the per-provider
//! token cache, and webhook signature verification.

pub mod adapter;
pub mod airteltigo;
pub mod error;
pub mod http;
pub mod mtn;
pub mod registry;
pub mod signature;
pub mod token;
pub mod types;
pub mod vodafone;

pub use adapter::PaymentAdapter;
pub use error::{AdapterError, AdapterResult};
pub use registry::ProviderRegistry;
pub use types::{
    Direction, Money, ParsedWebhook, PaymentOrder, ProviderAcceptance, ProviderName,
    ProviderStatus, ProviderToken, SettlementStatus, VerificationResult,
};
