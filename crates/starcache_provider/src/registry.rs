//! Named discovery of provider implementations.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{ProviderError, ProviderResult};
use crate::provider::CacheProvider;

type ProviderFactory = Box<dyn Fn() -> Arc<dyn CacheProvider> + Send + Sync>;

/// A registry of named cache-provider factories.
///
/// Deployments register one factory per implementation. When a provider
/// is needed, an explicitly configured name wins; with no configured name
/// the first registered factory is used, which is a non-deterministic
/// choice when several implementations are present. One provider instance
/// is created per server.
#[derive(Default)]
pub struct ProviderRegistry {
    factories: Mutex<Vec<(String, ProviderFactory)>>,
}

impl ProviderRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory under `name`. A later registration under the
    /// same name replaces the earlier one.
    pub fn register<F>(&self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Arc<dyn CacheProvider> + Send + Sync + 'static,
    {
        let name = name.into();
        let mut factories = self.factories.lock();
        factories.retain(|(n, _)| *n != name);
        factories.push((name, Box::new(factory)));
    }

    /// Instantiates a provider.
    ///
    /// With `Some(name)`, resolves that name or fails with
    /// [`ProviderError::UnknownProvider`]. With `None`, uses the first
    /// registered factory, or returns `Ok(None)` when no implementation
    /// is registered (running without an external cache is normal).
    pub fn create(
        &self,
        name: Option<&str>,
    ) -> ProviderResult<Option<Arc<dyn CacheProvider>>> {
        let factories = self.factories.lock();
        match name {
            Some(name) => factories
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, f)| Some(f()))
                .ok_or_else(|| ProviderError::UnknownProvider {
                    name: name.to_owned(),
                }),
            None => Ok(factories.first().map(|(_, f)| f())),
        }
    }

    /// Names of all registered implementations, in registration order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.factories
            .lock()
            .iter()
            .map(|(n, _)| n.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryCacheProvider;

    #[test]
    fn configured_name_wins() {
        let registry = ProviderRegistry::new();
        registry.register("memory", || Arc::new(MemoryCacheProvider::new()));
        registry.register("other", || Arc::new(MemoryCacheProvider::new()));

        assert!(registry.create(Some("other")).unwrap().is_some());
        assert!(matches!(
            registry.create(Some("missing")),
            Err(ProviderError::UnknownProvider { .. })
        ));
    }

    #[test]
    fn first_registered_is_the_default() {
        let registry = ProviderRegistry::new();
        assert!(registry.create(None).unwrap().is_none());
        registry.register("memory", || Arc::new(MemoryCacheProvider::new()));
        assert!(registry.create(None).unwrap().is_some());
        assert_eq!(registry.names(), vec!["memory"]);
    }
}
