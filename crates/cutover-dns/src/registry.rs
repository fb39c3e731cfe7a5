//! Explicit provider registry, injected into the engine at construction.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::change::DnsChange;
use crate::error::{DnsError, DnsResult};
use crate::manual::{ManualProvider, MANUAL_PROVIDER};
use crate::provider::DnsProvider;

/// Name → provider map.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<String, Arc<dyn DnsProvider>>,
}

impl ProviderRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the manual provider pre-registered.
    pub fn with_manual() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(ManualProvider::new()));
        registry
    }

    /// Register `provider` under its own name, replacing any previous entry.
    pub fn register(&mut self, provider: Arc<dyn DnsProvider>) {
        self.providers.insert(provider.name().to_string(), provider);
    }

    pub fn get(&self, name: &str) -> DnsResult<Arc<dyn DnsProvider>> {
        self.providers
            .get(name)
            .cloned()
            .ok_or_else(|| DnsError::ProviderNotFound {
                name: name.to_string(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.providers.contains_key(name)
    }

    /// Registered provider names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }

    /// Name of the provider that would handle `change`.
    ///
    /// Precedence: explicit override, then the change's recorded provider,
    /// then `manual`.
    pub fn provider_name_for<'a>(override_name: Option<&'a str>, change: &'a DnsChange) -> &'a str {
        override_name
            .or(change.provider.as_deref())
            .filter(|name| !name.is_empty())
            .unwrap_or(MANUAL_PROVIDER)
    }

    /// Resolve the provider that handles `change`.
    pub fn resolve(
        &self,
        override_name: Option<&str>,
        change: &DnsChange,
    ) -> DnsResult<Arc<dyn DnsProvider>> {
        self.get(Self::provider_name_for(override_name, change))
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::RecordType;
    use crate::fakes::RecordingProvider;

    fn change() -> DnsChange {
        DnsChange::new("c", "example.com", RecordType::A, "@", "1.1.1.1", "2.2.2.2")
    }

    #[test]
    fn test_with_manual_registers_manual() {
        let registry = ProviderRegistry::with_manual();
        assert!(registry.contains("manual"));
        assert_eq!(registry.names(), vec!["manual".to_string()]);
    }

    #[test]
    fn test_resolution_precedence() {
        let c = change().with_provider("cloudflare");
        assert_eq!(ProviderRegistry::provider_name_for(Some("route53"), &c), "route53");
        assert_eq!(ProviderRegistry::provider_name_for(None, &c), "cloudflare");
        assert_eq!(ProviderRegistry::provider_name_for(None, &change()), "manual");
    }

    #[test]
    fn test_resolve_unknown_provider_fails() {
        let registry = ProviderRegistry::with_manual();
        let c = change().with_provider("route53");
        let err = match registry.resolve(None, &c) {
            Err(e) => e,
            Ok(_) => panic!("expected provider lookup to fail"),
        };
        assert!(matches!(err, DnsError::ProviderNotFound { ref name } if name == "route53"));
    }

    #[test]
    fn test_register_replaces_by_name() {
        let mut registry = ProviderRegistry::with_manual();
        registry.register(Arc::new(RecordingProvider::new("fake")));
        registry.register(Arc::new(RecordingProvider::new("fake")));
        assert_eq!(registry.names(), vec!["fake".to_string(), "manual".to_string()]);
        assert_eq!(registry.resolve(Some("fake"), &change()).unwrap().name(), "fake");
    }
}
