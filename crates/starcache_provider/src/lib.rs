//! # StarCache Provider
//!
//! Pluggable external cache SPI for StarCache.
//!
//! An external cache stores segment headers and bodies outside the query
//! engine's process - a distributed cache, a disk store, or plain process
//! memory. This crate defines:
//! - [`CacheProvider`] - the SPI every cache implementation fulfils
//! - [`CacheFuture`] - the asynchronous result every operation returns
//! - [`CacheEvent`]/[`CacheListener`] - change notifications across nodes
//! - [`MemoryCacheProvider`] - the in-process reference implementation
//! - [`ProviderRegistry`] - named discovery of provider implementations
//!
//! Providers are **not** assumed thread-safe for data operations; the
//! cache manager serializes all access on its own worker. Listener
//! callbacks, in contrast, arrive on the provider's thread and must be
//! non-blocking.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod event;
mod future;
mod memory;
mod provider;
mod registry;

pub use error::{ProviderError, ProviderResult};
pub use event::{CacheEvent, CacheEventKind, CacheListener};
pub use future::{CacheFuture, CachePromise};
pub use memory::MemoryCacheProvider;
pub use provider::CacheProvider;
pub use registry::ProviderRegistry;
