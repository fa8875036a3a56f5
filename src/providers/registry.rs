use crate::providers::adapter::PaymentAdapter;
use crate::providers::airteltigo::AirtelTigoAdapter;
use crate::providers::error::{AdapterError, AdapterResult};
use crate::providers::mtn::MtnAdapter;
use crate::providers::types::ProviderName;
use crate::providers::vodafone::VodafoneAdapter;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Holds one long-lived adapter per configured network. Adapters are
/// singletons so their token caches are shared by every request; building a
/// fresh adapter per call would defeat the cache entirely.
pub struct ProviderRegistry {
    adapters: HashMap<ProviderName, Arc<dyn PaymentAdapter>>,
}

impl ProviderRegistry {
    /// Builds adapters for every network whose credentials are present in the
    /// environment. A gateway with zero configured networks is a deployment
    /// mistake and refuses to start.
    pub fn from_env() -> AdapterResult<Self> {
        let mut adapters: HashMap<ProviderName, Arc<dyn PaymentAdapter>> = HashMap::new();

        match MtnAdapter::from_env() {
            Ok(adapter) => {
                adapters.insert(ProviderName::Mtn, Arc::new(adapter));
            }
            Err(e) => info!(provider = "mtn", reason = %e, "provider not configured, skipping"),
        }
        match VodafoneAdapter::from_env() {
            Ok(adapter) => {
                adapters.insert(ProviderName::Vodafone, Arc::new(adapter));
            }
            Err(e) => info!(provider = "vodafone", reason = %e, "provider not configured, skipping"),
        }
        match AirtelTigoAdapter::from_env() {
            Ok(adapter) => {
                adapters.insert(ProviderName::AirtelTigo, Arc::new(adapter));
            }
            Err(e) => {
                info!(provider = "airteltigo", reason = %e, "provider not configured, skipping")
            }
        }

        if adapters.is_empty() {
            return Err(AdapterError::ValidationError {
                message: "no payment provider is configured".to_string(),
                field: None,
            });
        }

        info!(count = adapters.len(), "provider registry initialized");
        Ok(Self { adapters })
    }

    pub fn get(&self, provider: ProviderName) -> AdapterResult<Arc<dyn PaymentAdapter>> {
        self.adapters
            .get(&provider)
            .cloned()
            .ok_or_else(|| AdapterError::ValidationError {
                message: format!("provider {} is not configured", provider),
                field: Some("provider".to_string()),
            })
    }

    pub fn configured(&self) -> Vec<ProviderName> {
        self.adapters.keys().copied().collect()
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use crate::providers::adapter::mock::{MockAdapter, MockScenario};

    /// Registry with a mock adapter behind every network name.
    pub fn mock_registry(scenario: MockScenario) -> ProviderRegistry {
        let mut adapters: HashMap<ProviderName, Arc<dyn PaymentAdapter>> = HashMap::new();
        for provider in ProviderName::all() {
            adapters.insert(provider, Arc::new(MockAdapter::new(provider, scenario)));
        }
        ProviderRegistry { adapters }
    }

    /// Registry wrapping caller-supplied adapters, for tests that need to
    /// inspect call counts on a specific mock.
    pub fn registry_with(
        entries: Vec<(ProviderName, Arc<dyn PaymentAdapter>)>,
    ) -> ProviderRegistry {
        ProviderRegistry {
            adapters: entries.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::mock_registry;
    use super::*;
    use crate::providers::adapter::mock::MockScenario;

    #[test]
    fn lookup_returns_the_named_adapter() {
        let registry = mock_registry(MockScenario::AcceptPending);
        let adapter = registry.get(ProviderName::Vodafone).unwrap();
        assert_eq!(adapter.name(), ProviderName::Vodafone);
    }

    #[test]
    fn configured_lists_all_networks() {
        let registry = mock_registry(MockScenario::AcceptPending);
        let mut names = registry.configured();
        names.sort_by_key(|n| n.as_str());
        assert_eq!(names.len(), 3);
    }
}
