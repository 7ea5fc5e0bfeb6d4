//! # StarCache Model
//!
//! Immutable segment model for StarCache.
//!
//! This crate provides the value and key types that identify and carry
//! pre-aggregated OLAP segments:
//! - `CellValue` - the closed domain of cell and coordinate values
//! - `ValueSet` - immutable sorted value sets with merge algebra
//! - `BitKey` - dimensionality bitmaps over a star's columns
//! - `SegmentColumn` - a constrained column (expression + value predicate)
//! - `SegmentHeader` - the content-addressed identity of a segment
//! - `SegmentBody` - the cell payload in one of four storage variants
//!
//! Everything here is immutable once constructed and serializable, so
//! headers and bodies can round-trip through external cache providers and
//! be shared across threads without locking.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod bits;
mod body;
mod cell_key;
mod column;
mod hash;
mod header;
mod sorted;
mod value;

pub use bits::{BitKey, NullMask};
pub use body::{BodyAxis, CellStorage, SegmentBody};
pub use cell_key::CellKey;
pub use column::SegmentColumn;
pub use header::{SchemaChecksum, SegmentHeader, SegmentId, SegmentProvenance};
pub use sorted::ValueSet;
pub use value::CellValue;
