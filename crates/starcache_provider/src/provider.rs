//! The cache provider SPI.

use std::sync::Arc;

use starcache_model::{SegmentBody, SegmentHeader};

use crate::event::CacheListener;
use crate::future::CacheFuture;

/// An external segment cache.
///
/// Lookups are performed with [`SegmentHeader`]s; payloads are
/// [`SegmentBody`]s. Both are immutable and serializable, and the header's
/// unique id is the storage key, so any store that can hold bytes can back
/// this trait.
///
/// # Invariants
///
/// - Data operations (`get`, `put`, `remove`, `contains`,
///   `segment_headers`) are called from a single thread at a time; the
///   cache manager guarantees this. Implementations need not add locking
///   for them.
/// - Absence is a normal result, never an error.
/// - Listener callbacks may fire from any thread the provider owns, and
///   must only describe changes a listener did not itself cause on this
///   node (`is_local` distinguishes the rest).
/// - After [`CacheProvider::tear_down`], every operation fails.
///
/// # Implementors
///
/// - [`crate::MemoryCacheProvider`] - in-process reference implementation
pub trait CacheProvider: Send + Sync {
    /// Returns whether a body is cached for `header`.
    fn contains(&self, header: &SegmentHeader) -> CacheFuture<bool>;

    /// Fetches the body cached for `header`, if any.
    fn get(&self, header: &SegmentHeader) -> CacheFuture<Option<SegmentBody>>;

    /// Stores a body under `header`. Returns whether the store succeeded.
    fn put(&self, header: &SegmentHeader, body: &SegmentBody) -> CacheFuture<bool>;

    /// Removes the entry for `header`. Returns whether it was present.
    fn remove(&self, header: &SegmentHeader) -> CacheFuture<bool>;

    /// Lists every header currently in the cache.
    fn segment_headers(&self) -> CacheFuture<Vec<SegmentHeader>>;

    /// Attaches a listener for cache change events.
    fn add_listener(&self, listener: Arc<dyn CacheListener>);

    /// Detaches a previously attached listener.
    fn remove_listener(&self, listener: &Arc<dyn CacheListener>);

    /// Whether this provider stores headers in a form it can enumerate
    /// and inspect. When false, the manager treats the provider as opaque
    /// bulk storage and cannot perform partial invalidation against it.
    fn supports_rich_index(&self) -> bool;

    /// Releases all resources. Subsequent operations fail.
    fn tear_down(&self);
}
