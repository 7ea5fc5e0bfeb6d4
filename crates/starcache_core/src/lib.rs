//! # StarCache Core
//!
//! Segment cache engine for StarCache.
//!
//! This crate provides:
//! - `SegmentCacheIndex` - the in-memory index of known segment headers,
//!   answering exact lookups, region intersections, and rollup-candidate
//!   queries
//! - `rollup` - building a reduced-dimensionality segment out of
//!   compatible cached segments
//! - `CacheManager` - the single-writer actor that owns the index and all
//!   traffic to external cache providers
//! - `CacheWorker` - the timeout-bounded synchronous facade over one
//!   asynchronous provider
//!
//! All index mutations happen on the manager's dedicated thread; headers
//! and bodies are immutable and flow freely between threads.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod agg;
mod axis;
mod builder;
mod config;
mod dataset;
mod error;
mod index;
mod manager;
mod poset;
mod segment;
mod worker;

pub use agg::Aggregator;
pub use axis::{ColumnPredicate, SegmentAxis};
pub use builder::rollup;
pub use config::CacheConfig;
pub use dataset::SegmentDataset;
pub use error::{CoreError, CoreResult};
pub use index::{CellRequest, SegmentCacheIndex};
pub use manager::CacheManager;
pub use poset::BitKeyPoset;
pub use segment::{ExcludedRegion, Segment, SegmentWithData};
pub use worker::CacheWorker;
