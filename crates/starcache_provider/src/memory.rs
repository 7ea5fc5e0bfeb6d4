//! In-memory cache provider.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use starcache_model::{SegmentBody, SegmentHeader, SegmentId};

use crate::error::ProviderError;
use crate::event::{CacheEvent, CacheListener};
use crate::future::CacheFuture;
use crate::provider::CacheProvider;

/// A [`CacheProvider`] that stores segments in process memory.
///
/// Suitable for single-node deployments and for tests. All operations
/// complete immediately. Every put and remove fires a local
/// [`CacheEvent`] to attached listeners.
#[derive(Default)]
pub struct MemoryCacheProvider {
    entries: RwLock<HashMap<SegmentId, (SegmentHeader, SegmentBody)>>,
    listeners: RwLock<Vec<Arc<dyn CacheListener>>>,
    torn_down: AtomicBool,
}

impl MemoryCacheProvider {
    /// Creates an empty provider.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached segments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true when nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn torn_down(&self) -> bool {
        self.torn_down.load(Ordering::Acquire)
    }

    fn fire(&self, event: CacheEvent) {
        let listeners = self.listeners.read().clone();
        for listener in listeners {
            listener.handle(&event);
        }
    }
}

impl CacheProvider for MemoryCacheProvider {
    fn contains(&self, header: &SegmentHeader) -> CacheFuture<bool> {
        if self.torn_down() {
            return CacheFuture::failed(ProviderError::TornDown);
        }
        CacheFuture::completed(self.entries.read().contains_key(&header.unique_id()))
    }

    fn get(&self, header: &SegmentHeader) -> CacheFuture<Option<SegmentBody>> {
        if self.torn_down() {
            return CacheFuture::failed(ProviderError::TornDown);
        }
        let body = self
            .entries
            .read()
            .get(&header.unique_id())
            .map(|(_, body)| body.clone());
        CacheFuture::completed(body)
    }

    fn put(&self, header: &SegmentHeader, body: &SegmentBody) -> CacheFuture<bool> {
        if self.torn_down() {
            return CacheFuture::failed(ProviderError::TornDown);
        }
        self.entries
            .write()
            .insert(header.unique_id(), (header.clone(), body.clone()));
        self.fire(CacheEvent::created(header.clone(), true));
        CacheFuture::completed(true)
    }

    fn remove(&self, header: &SegmentHeader) -> CacheFuture<bool> {
        if self.torn_down() {
            return CacheFuture::failed(ProviderError::TornDown);
        }
        let removed = self.entries.write().remove(&header.unique_id()).is_some();
        if removed {
            self.fire(CacheEvent::deleted(header.clone(), true));
        }
        CacheFuture::completed(removed)
    }

    fn segment_headers(&self) -> CacheFuture<Vec<SegmentHeader>> {
        if self.torn_down() {
            return CacheFuture::failed(ProviderError::TornDown);
        }
        let headers = self
            .entries
            .read()
            .values()
            .map(|(header, _)| header.clone())
            .collect();
        CacheFuture::completed(headers)
    }

    fn add_listener(&self, listener: Arc<dyn CacheListener>) {
        self.listeners.write().push(listener);
    }

    fn remove_listener(&self, listener: &Arc<dyn CacheListener>) {
        self.listeners
            .write()
            .retain(|l| !Arc::ptr_eq(l, listener));
    }

    fn supports_rich_index(&self) -> bool {
        true
    }

    fn tear_down(&self) {
        self.torn_down.store(true, Ordering::Release);
        self.entries.write().clear();
        self.listeners.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::CacheEventKind;
    use parking_lot::Mutex;
    use starcache_model::{
        BitKey, BodyAxis, CellValue, SchemaChecksum, SegmentColumn, SegmentProvenance, ValueSet,
    };
    use std::time::Duration;

    fn header(measure: &str) -> SegmentHeader {
        SegmentHeader::new(
            SegmentProvenance {
                schema_name: "FoodMart".into(),
                schema_checksum: SchemaChecksum::of("<schema/>"),
                cube_name: "Sales".into(),
                measure_name: measure.into(),
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
            vec![CellValue::Int(12)],
        )
    }

    fn wait<T: Clone>(future: CacheFuture<T>) -> Result<T, ProviderError> {
        future.wait_timeout(Duration::from_secs(1), "test")
    }

    struct Recorder(Mutex<Vec<(CacheEventKind, bool)>>);

    impl CacheListener for Recorder {
        fn handle(&self, event: &CacheEvent) {
            self.0.lock().push((event.kind, event.is_local));
        }
    }

    #[test]
    fn put_get_remove() {
        let cache = MemoryCacheProvider::new();
        let h = header("Unit Sales");
        assert!(!wait(cache.contains(&h)).unwrap());
        assert!(wait(cache.put(&h, &body())).unwrap());
        assert!(wait(cache.contains(&h)).unwrap());
        assert_eq!(wait(cache.get(&h)).unwrap(), Some(body()));
        assert_eq!(wait(cache.segment_headers()).unwrap(), vec![h.clone()]);
        assert!(wait(cache.remove(&h)).unwrap());
        assert!(!wait(cache.remove(&h)).unwrap());
        assert_eq!(wait(cache.get(&h)).unwrap(), None);
    }

    #[test]
    fn events_are_local() {
        let cache = MemoryCacheProvider::new();
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        cache.add_listener(recorder.clone());

        let h = header("Unit Sales");
        wait(cache.put(&h, &body())).unwrap();
        wait(cache.remove(&h)).unwrap();

        let seen = recorder.0.lock().clone();
        assert_eq!(
            seen,
            vec![
                (CacheEventKind::EntryCreated, true),
                (CacheEventKind::EntryDeleted, true),
            ]
        );

        let listener: Arc<dyn CacheListener> = recorder.clone();
        cache.remove_listener(&listener);
        wait(cache.put(&h, &body())).unwrap();
        // No further events after removal.
        assert_eq!(recorder.0.lock().len(), 2);
    }

    #[test]
    fn tear_down_fails_everything() {
        let cache = MemoryCacheProvider::new();
        let h = header("Unit Sales");
        wait(cache.put(&h, &body())).unwrap();
        cache.tear_down();
        assert!(matches!(
            wait(cache.get(&h)),
            Err(ProviderError::TornDown)
        ));
        assert!(matches!(
            wait(cache.put(&h, &body())),
            Err(ProviderError::TornDown)
        ));
    }
}
