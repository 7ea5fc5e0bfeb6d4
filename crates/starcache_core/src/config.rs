//! Cache engine configuration.

use std::time::Duration;

/// Configuration for a cache manager and its index.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Name of the external provider implementation to use, overriding
    /// registry discovery. `None` selects the first registered provider.
    pub provider_impl: Option<String>,

    /// Budget for fetching a segment body from a provider.
    pub read_timeout: Duration,

    /// Budget for a containment check against a provider.
    pub lookup_timeout: Duration,

    /// Budget for writing or removing a segment in a provider.
    pub write_timeout: Duration,

    /// Budget for enumerating a provider's headers.
    pub scan_timeout: Duration,

    /// Rollup bodies below this populated fraction are stored sparse.
    pub rollup_density_threshold: f64,

    /// Upper bound on headers held in the index (None = unbounded).
    /// When exceeded, a deterministically random entry is evicted.
    pub max_index_headers: Option<usize>,

    /// Seed for the eviction RNG; a fixed seed makes eviction
    /// reproducible for a given insertion sequence.
    pub eviction_seed: u64,

    /// Depth of the manager's bounded event queue.
    pub queue_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            provider_impl: None,
            read_timeout: Duration::from_secs(5),
            lookup_timeout: Duration::from_secs(2),
            write_timeout: Duration::from_secs(30),
            scan_timeout: Duration::from_secs(5),
            rollup_density_threshold: 0.5,
            max_index_headers: None,
            eviction_seed: 0,
            queue_capacity: 1000,
        }
    }
}

impl CacheConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the provider implementation name.
    #[must_use]
    pub fn with_provider_impl(mut self, name: impl Into<String>) -> Self {
        self.provider_impl = Some(name.into());
        self
    }

    /// Sets the read timeout.
    #[must_use]
    pub const fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Sets the lookup timeout.
    #[must_use]
    pub const fn with_lookup_timeout(mut self, timeout: Duration) -> Self {
        self.lookup_timeout = timeout;
        self
    }

    /// Sets the write timeout.
    #[must_use]
    pub const fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Sets the scan timeout.
    #[must_use]
    pub const fn with_scan_timeout(mut self, timeout: Duration) -> Self {
        self.scan_timeout = timeout;
        self
    }

    /// Sets the sparse-versus-dense rollup threshold. Clamped to [0, 1].
    #[must_use]
    pub fn with_rollup_density_threshold(mut self, threshold: f64) -> Self {
        self.rollup_density_threshold = threshold.clamp(0.0, 1.0);
        self
    }

    /// Bounds the number of headers in the index.
    #[must_use]
    pub const fn with_max_index_headers(mut self, max: usize) -> Self {
        self.max_index_headers = Some(max);
        self
    }

    /// Sets the eviction RNG seed.
    #[must_use]
    pub const fn with_eviction_seed(mut self, seed: u64) -> Self {
        self.eviction_seed = seed;
        self
    }

    /// Sets the manager queue depth.
    #[must_use]
    pub const fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = CacheConfig::default();
        assert!(config.provider_impl.is_none());
        assert!(config.max_index_headers.is_none());
        assert_eq!(config.rollup_density_threshold, 0.5);
    }

    #[test]
    fn builder_pattern() {
        let config = CacheConfig::new()
            .with_provider_impl("memory")
            .with_write_timeout(Duration::from_millis(50))
            .with_rollup_density_threshold(1.5)
            .with_max_index_headers(10);

        assert_eq!(config.provider_impl.as_deref(), Some("memory"));
        assert_eq!(config.write_timeout, Duration::from_millis(50));
        assert_eq!(config.rollup_density_threshold, 1.0);
        assert_eq!(config.max_index_headers, Some(10));
    }
}
