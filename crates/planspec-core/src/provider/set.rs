use std::collections::BTreeMap;
use std::sync::Arc;

use crate::provider::{PluginConnector, ProviderError, ProviderInterceptor};
use crate::registry::Registry;

/// The interceptors of one test case, keyed by provider configuration
/// (`aws`, or `aws.east` for an aliased configuration).
///
/// All interceptors share the case's mock and expect registries.
pub struct ProviderSet {
    mocks: Arc<Registry>,
    expects: Arc<Registry>,
    providers: BTreeMap<String, Arc<ProviderInterceptor>>,
}

impl ProviderSet {
    pub fn new() -> Self {
        Self::with_registries(Arc::new(Registry::mocks()), Arc::new(Registry::expects()))
    }

    pub fn with_registries(mocks: Arc<Registry>, expects: Arc<Registry>) -> Self {
        Self {
            mocks,
            expects,
            providers: BTreeMap::new(),
        }
    }

    /// Registers a provider configuration. `alias` scopes fixture lookups
    /// and makes the configuration reachable as `name.alias`.
    pub fn register(&mut self, name: &str, alias: Option<&str>, connector: Arc<dyn PluginConnector>) {
        let mut interceptor = ProviderInterceptor::new(
            name,
            connector,
            Arc::clone(&self.mocks),
            Arc::clone(&self.expects),
        );
        let key = match alias {
            Some(alias) => {
                interceptor = interceptor.with_alias(alias);
                format!("{}.{}", name, alias)
            }
            None => name.to_string(),
        };
        tracing::debug!(provider = %key, "provider registered");
        self.providers.insert(key, Arc::new(interceptor));
    }

    /// Returns the interceptor for a provider configuration.
    pub fn get(&self, config: &str) -> Result<Arc<ProviderInterceptor>, ProviderError> {
        self.providers
            .get(config)
            .map(Arc::clone)
            .ok_or_else(|| ProviderError::UnknownProvider(config.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.providers.keys().map(String::as_str)
    }

    pub fn mocks(&self) -> &Arc<Registry> {
        &self.mocks
    }

    pub fn expects(&self) -> &Arc<Registry> {
        &self.expects
    }

    /// Closes every interceptor.
    pub fn close_all(&self) {
        for interceptor in self.providers.values() {
            interceptor.close();
        }
    }
}

impl Default for ProviderSet {
    fn default() -> Self {
        Self::new()
    }
}
