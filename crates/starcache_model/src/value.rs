//! Cell and coordinate values.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// A value stored in a segment cell or constraining a segment column.
///
/// This is the closed domain of types the cache can hold: booleans,
/// integers, doubles, strings, and the SQL NULL sentinel. All variants
/// compare, hash, and serialize deterministically, which is what makes
/// content-addressed headers possible.
///
/// # Ordering
///
/// Values order first by type (Bool < Int < Double < Str), then by natural
/// order within the type. `Null` sorts after every other value, matching
/// the NULLs-last convention used when axis keys are materialized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CellValue {
    /// The SQL NULL sentinel.
    Null,
    /// Boolean value.
    Bool(bool),
    /// 64-bit signed integer.
    Int(i64),
    /// 64-bit IEEE float. Ordered by `f64::total_cmp`.
    Double(f64),
    /// UTF-8 string.
    Str(String),
}

impl CellValue {
    /// Returns true if this is the NULL sentinel.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    /// Rank used for cross-type ordering. `Null` is greatest.
    fn type_rank(&self) -> u8 {
        match self {
            CellValue::Bool(_) => 0,
            CellValue::Int(_) => 1,
            CellValue::Double(_) => 2,
            CellValue::Str(_) => 3,
            CellValue::Null => 4,
        }
    }
}

impl Ord for CellValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (CellValue::Bool(a), CellValue::Bool(b)) => a.cmp(b),
            (CellValue::Int(a), CellValue::Int(b)) => a.cmp(b),
            (CellValue::Double(a), CellValue::Double(b)) => a.total_cmp(b),
            (CellValue::Str(a), CellValue::Str(b)) => a.cmp(b),
            _ => self.type_rank().cmp(&other.type_rank()),
        }
    }
}

impl PartialOrd for CellValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for CellValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for CellValue {}

impl Hash for CellValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u8(self.type_rank());
        match self {
            CellValue::Null => {}
            CellValue::Bool(b) => state.write_u8(u8::from(*b)),
            CellValue::Int(n) => state.write_i64(*n),
            CellValue::Double(d) => state.write_u64(d.to_bits()),
            CellValue::Str(s) => state.write(s.as_bytes()),
        }
    }
}

impl fmt::Display for CellValue {
    /// The textual form, also used as header digest material.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Null => write!(f, "#null"),
            CellValue::Bool(b) => write!(f, "{b}"),
            CellValue::Int(n) => write!(f, "{n}"),
            CellValue::Double(d) => write!(f, "{d}"),
            CellValue::Str(s) => write!(f, "{s}"),
        }
    }
}

impl From<bool> for CellValue {
    fn from(value: bool) -> Self {
        CellValue::Bool(value)
    }
}

impl From<i64> for CellValue {
    fn from(value: i64) -> Self {
        CellValue::Int(value)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Double(value)
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Str(value.to_owned())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::Str(value)
    }
}
