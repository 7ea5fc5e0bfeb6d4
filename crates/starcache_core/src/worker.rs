//! Timeout-bounded synchronous facade over one cache provider.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, warn};

use starcache_model::{SegmentBody, SegmentHeader};
use starcache_provider::{CacheProvider, ProviderError};

use crate::config::CacheConfig;
use crate::error::CoreResult;

/// Wraps an asynchronous [`CacheProvider`] behind synchronous calls, each
/// bounded by its configured budget.
///
/// Timeouts and provider failures are logged and surfaced as recoverable
/// errors; the caller's index state is never rolled back on a provider
/// failure, so consistency with the external cache is eventual.
pub struct CacheWorker {
    provider: Arc<dyn CacheProvider>,
    read_timeout: Duration,
    lookup_timeout: Duration,
    write_timeout: Duration,
    scan_timeout: Duration,
}

impl CacheWorker {
    /// Creates a worker over `provider` with the budgets of `config`.
    #[must_use]
    pub fn new(provider: Arc<dyn CacheProvider>, config: &CacheConfig) -> Self {
        debug!(
            rich_index = provider.supports_rich_index(),
            "segment cache provider initialized"
        );
        if !provider.supports_rich_index() {
            warn!(
                "cache provider has no rich index; partial invalidation \
                 against it is not possible"
            );
        }
        Self {
            provider,
            read_timeout: config.read_timeout,
            lookup_timeout: config.lookup_timeout,
            write_timeout: config.write_timeout,
            scan_timeout: config.scan_timeout,
        }
    }

    /// Fetches the body cached for `header`, if any.
    pub fn get(&self, header: &SegmentHeader) -> CoreResult<Option<SegmentBody>> {
        self.provider
            .get(header)
            .wait_timeout(self.read_timeout, "read")
            .map_err(|e| {
                error!(error = %e, "failed to load segment from cache");
                e.into()
            })
    }

    /// Returns whether a body is cached for `header`.
    pub fn contains(&self, header: &SegmentHeader) -> CoreResult<bool> {
        self.provider
            .contains(header)
            .wait_timeout(self.lookup_timeout, "lookup")
            .map_err(|e| {
                error!(error = %e, "failed to look up segment in cache");
                e.into()
            })
    }

    /// Stores a body under `header`.
    pub fn put(&self, header: &SegmentHeader, body: &SegmentBody) -> CoreResult<()> {
        let stored = self
            .provider
            .put(header, body)
            .wait_timeout(self.write_timeout, "write")
            .map_err(|e| {
                error!(error = %e, "failed to save segment to cache");
                e
            })?;
        if stored {
            Ok(())
        } else {
            let e = ProviderError::failed("provider rejected the segment write");
            error!(error = %e, "failed to save segment to cache");
            Err(e.into())
        }
    }

    /// Removes the entry for `header`. Returns whether it was present.
    pub fn remove(&self, header: &SegmentHeader) -> CoreResult<bool> {
        self.provider
            .remove(header)
            .wait_timeout(self.write_timeout, "write")
            .map_err(|e| {
                error!(error = %e, "failed to remove segment from cache");
                e.into()
            })
    }

    /// Lists every header in the provider.
    pub fn segment_headers(&self) -> CoreResult<Vec<SegmentHeader>> {
        self.provider
            .segment_headers()
            .wait_timeout(self.scan_timeout, "scan")
            .map_err(|e| {
                error!(error = %e, "failed to scan cache headers");
                e.into()
            })
    }

    /// Whether the provider keeps an enumerable header index.
    #[must_use]
    pub fn supports_rich_index(&self) -> bool {
        self.provider.supports_rich_index()
    }

    /// Releases the provider's resources.
    pub fn tear_down(&self) {
        self.provider.tear_down();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use starcache_model::{
        BitKey, BodyAxis, CellValue, SchemaChecksum, SegmentColumn, SegmentProvenance, ValueSet,
    };
    use starcache_provider::{CacheFuture, CacheListener, MemoryCacheProvider};

    fn header() -> SegmentHeader {
        SegmentHeader::new(
            SegmentProvenance {
                schema_name: "FoodMart".into(),
                schema_checksum: SchemaChecksum::of("<schema/>"),
                cube_name: "Sales".into(),
                measure_name: "Unit Sales".into(),
                fact_table: "sales_fact".into(),
            },
            vec![SegmentColumn::new(
                "state",
                Some(ValueSet::from_values(vec![CellValue::from("CA")])),
            )],
            Vec::new(),
            BitKey::of([0]),
            Vec::new(),
        )
    }

    fn body() -> SegmentBody {
        SegmentBody::dense_object(
            vec![BodyAxis::new(
                ValueSet::from_values(vec![CellValue::from("CA")]),
                false,
            )],
            vec![CellValue::Int(3)],
        )
    }

    #[test]
    fn roundtrip_through_memory_provider() {
        let worker = CacheWorker::new(
            Arc::new(MemoryCacheProvider::new()),
            &CacheConfig::default(),
        );
        let h = header();
        assert_eq!(worker.get(&h).unwrap(), None);
        worker.put(&h, &body()).unwrap();
        assert!(worker.contains(&h).unwrap());
        assert_eq!(worker.get(&h).unwrap(), Some(body()));
        assert_eq!(worker.segment_headers().unwrap().len(), 1);
        assert!(worker.remove(&h).unwrap());
    }

    /// A provider whose futures never complete.
    struct StalledProvider;

    impl CacheProvider for StalledProvider {
        fn contains(&self, _: &SegmentHeader) -> CacheFuture<bool> {
            CacheFuture::pending().0
        }
        fn get(&self, _: &SegmentHeader) -> CacheFuture<Option<SegmentBody>> {
            CacheFuture::pending().0
        }
        fn put(&self, _: &SegmentHeader, _: &SegmentBody) -> CacheFuture<bool> {
            CacheFuture::pending().0
        }
        fn remove(&self, _: &SegmentHeader) -> CacheFuture<bool> {
            CacheFuture::pending().0
        }
        fn segment_headers(&self) -> CacheFuture<Vec<SegmentHeader>> {
            CacheFuture::pending().0
        }
        fn add_listener(&self, _: Arc<dyn CacheListener>) {}
        fn remove_listener(&self, _: &Arc<dyn CacheListener>) {}
        fn supports_rich_index(&self) -> bool {
            true
        }
        fn tear_down(&self) {}
    }

    #[test]
    fn stalled_provider_times_out() {
        let config = CacheConfig::default()
            .with_read_timeout(Duration::from_millis(5))
            .with_write_timeout(Duration::from_millis(5));
        let worker = CacheWorker::new(Arc::new(StalledProvider), &config);
        let h = header();

        let err = worker.get(&h).unwrap_err();
        assert!(matches!(
            err,
            crate::error::CoreError::Provider(ProviderError::Timeout { .. })
        ));
        let err = worker.put(&h, &body()).unwrap_err();
        assert!(matches!(
            err,
            crate::error::CoreError::Provider(ProviderError::Timeout { .. })
        ));
    }
}
