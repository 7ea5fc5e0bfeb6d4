//! Cache change events and listeners.

use starcache_model::SegmentHeader;

/// What happened to a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheEventKind {
    /// A segment was stored in the cache.
    EntryCreated,
    /// A segment was removed from the cache.
    EntryDeleted,
}

/// A change to the contents of an external cache.
///
/// Events exist so that a node can learn about segments created or
/// deleted by *other* nodes sharing the same cache. `is_local` is true
/// when the change originated on this node; providers that cannot tell
/// report `false`.
#[derive(Debug, Clone)]
pub struct CacheEvent {
    /// What happened.
    pub kind: CacheEventKind,
    /// The header of the affected segment.
    pub source: SegmentHeader,
    /// Whether the change originated on this node.
    pub is_local: bool,
}

impl CacheEvent {
    /// An entry-created event.
    #[must_use]
    pub fn created(source: SegmentHeader, is_local: bool) -> Self {
        Self {
            kind: CacheEventKind::EntryCreated,
            source,
            is_local,
        }
    }

    /// An entry-deleted event.
    #[must_use]
    pub fn deleted(source: SegmentHeader, is_local: bool) -> Self {
        Self {
            kind: CacheEventKind::EntryDeleted,
            source,
            is_local,
        }
    }
}

/// Receives [`CacheEvent`]s from a provider.
///
/// Handlers run on the provider's thread and must be non-blocking and
/// thread-safe. The cache manager's own listener simply enqueues the
/// event and returns.
pub trait CacheListener: Send + Sync {
    /// Handles one event.
    fn handle(&self, event: &CacheEvent);
}
