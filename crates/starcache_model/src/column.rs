//! Constrained columns.

use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::hash::Fnv64;
use crate::sorted::ValueSet;

/// A constrained column within a segment.
///
/// Each segment constrains one column per axis, to a set of values
/// (similar to a SQL `IN` predicate) or to the wildcard, meaning the
/// column is not constrained at all. Columns are immutable, serializable,
/// and precompute their hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "ColumnRepr", into = "ColumnRepr")]
pub struct SegmentColumn {
    column_expression: String,
    values: Option<ValueSet>,
    hash: u64,
}

impl SegmentColumn {
    /// Creates a column constrained to `values`, or a wildcard when
    /// `values` is `None`.
    #[must_use]
    pub fn new(column_expression: impl Into<String>, values: Option<ValueSet>) -> Self {
        let column_expression = column_expression.into();
        let mut fnv = Fnv64::new();
        column_expression.hash(&mut fnv);
        if let Some(set) = &values {
            for value in set.iter() {
                value.hash(&mut fnv);
            }
        }
        Self {
            hash: fnv.finish(),
            column_expression,
            values,
        }
    }

    /// Creates an unconstrained (wildcard) column.
    #[must_use]
    pub fn wildcard(column_expression: impl Into<String>) -> Self {
        Self::new(column_expression, None)
    }

    /// The column expression, as defined in the schema.
    #[must_use]
    pub fn column_expression(&self) -> &str {
        &self.column_expression
    }

    /// The predicate values, or `None` for the wildcard.
    #[must_use]
    pub fn values(&self) -> Option<&ValueSet> {
        self.values.as_ref()
    }

    /// Returns true when the column is unconstrained.
    #[must_use]
    pub fn is_wildcard(&self) -> bool {
        self.values.is_none()
    }

    /// Merges two constraints on the same column into a superset of both.
    ///
    /// If either side is the wildcard, the merged result is the wildcard;
    /// otherwise the value sets are unioned. Both columns must have the
    /// same expression.
    #[must_use]
    pub fn merge(&self, other: &SegmentColumn) -> SegmentColumn {
        debug_assert_eq!(self.column_expression, other.column_expression);
        match (&self.values, &other.values) {
            (Some(a), Some(b)) => {
                SegmentColumn::new(self.column_expression.clone(), Some(a.union(b)))
            }
            _ => SegmentColumn::wildcard(self.column_expression.clone()),
        }
    }
}

impl PartialEq for SegmentColumn {
    fn eq(&self, other: &Self) -> bool {
        self.column_expression == other.column_expression && self.values == other.values
    }
}

impl Eq for SegmentColumn {}

impl Hash for SegmentColumn {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

#[derive(Serialize, Deserialize)]
struct ColumnRepr {
    column_expression: String,
    values: Option<ValueSet>,
}

impl From<ColumnRepr> for SegmentColumn {
    fn from(repr: ColumnRepr) -> Self {
        SegmentColumn::new(repr.column_expression, repr.values)
    }
}

impl From<SegmentColumn> for ColumnRepr {
    fn from(column: SegmentColumn) -> Self {
        ColumnRepr {
            column_expression: column.column_expression,
            values: column.values,
        }
    }
}
