//! Materialized segment axes.

use std::collections::HashMap;

use starcache_model::{CellValue, ValueSet};

/// The residual predicate a live segment holds for one column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnPredicate {
    /// The column is unconstrained; every value passes.
    Wildcard,
    /// The column is constrained to a set of values.
    In(ValueSet),
}

impl ColumnPredicate {
    /// Returns whether `value` passes this predicate.
    #[must_use]
    pub fn admits(&self, value: &CellValue) -> bool {
        match self {
            ColumnPredicate::Wildcard => true,
            ColumnPredicate::In(values) => values.contains(value),
        }
    }

    /// The value set, or `None` for the wildcard.
    #[must_use]
    pub fn values(&self) -> Option<&ValueSet> {
        match self {
            ColumnPredicate::Wildcard => None,
            ColumnPredicate::In(values) => Some(values),
        }
    }
}

/// Collection of key values of one of the columns that parameterizes a
/// segment.
///
/// Keys are kept sorted; when the axis carries a NULL coordinate, the
/// NULL key occupies the final slot. A key that passes the predicate but
/// is absent from the key array denotes a cell whose value is NULL.
#[derive(Debug, Clone)]
pub struct SegmentAxis {
    predicate: ColumnPredicate,
    keys: Vec<CellValue>,
    offsets: HashMap<CellValue, usize>,
}

impl SegmentAxis {
    /// Creates an axis from a sorted key set, appending the NULL slot
    /// when `has_null`.
    #[must_use]
    pub fn new(predicate: ColumnPredicate, key_set: &ValueSet, has_null: bool) -> Self {
        let mut keys: Vec<CellValue> = key_set.iter().cloned().collect();
        if has_null {
            keys.push(CellValue::Null);
        }
        let offsets = keys
            .iter()
            .enumerate()
            .map(|(i, k)| (k.clone(), i))
            .collect();
        Self {
            predicate,
            keys,
            offsets,
        }
    }

    /// The predicate constraining this axis.
    #[must_use]
    pub fn predicate(&self) -> &ColumnPredicate {
        &self.predicate
    }

    /// The key values, NULL slot included.
    #[must_use]
    pub fn keys(&self) -> &[CellValue] {
        &self.keys
    }

    /// Number of keys on this axis.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns true when the axis has no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Ordinal of `key` on this axis, if present.
    #[must_use]
    pub fn offset_of(&self, key: &CellValue) -> Option<usize> {
        self.offsets.get(key).copied()
    }

    /// The key at `ordinal`.
    #[must_use]
    pub fn key_at(&self, ordinal: usize) -> Option<&CellValue> {
        self.keys.get(ordinal)
    }

    /// Returns whether this axis contains `key`, or would contain it if
    /// it existed. An unconstrained axis would contain any value.
    #[must_use]
    pub fn would_contain(&self, key: &CellValue) -> bool {
        self.predicate.admits(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(names: &[&str]) -> ValueSet {
        names.iter().map(|n| CellValue::from(*n)).collect()
    }

    #[test]
    fn offsets_follow_sorted_order() {
        let axis = SegmentAxis::new(
            ColumnPredicate::In(values(&["CA", "OR", "WA"])),
            &values(&["CA", "OR", "WA"]),
            false,
        );
        assert_eq!(axis.len(), 3);
        assert_eq!(axis.offset_of(&CellValue::from("OR")), Some(1));
        assert_eq!(axis.offset_of(&CellValue::from("TX")), None);
    }

    #[test]
    fn null_takes_the_last_slot() {
        let axis = SegmentAxis::new(
            ColumnPredicate::Wildcard,
            &values(&["CA", "OR"]),
            true,
        );
        assert_eq!(axis.len(), 3);
        assert_eq!(axis.offset_of(&CellValue::Null), Some(2));
        assert_eq!(axis.key_at(2), Some(&CellValue::Null));
    }

    #[test]
    fn wildcard_would_contain_anything() {
        let axis = SegmentAxis::new(ColumnPredicate::Wildcard, &values(&["CA"]), false);
        assert!(axis.would_contain(&CellValue::from("TX")));

        let constrained = SegmentAxis::new(
            ColumnPredicate::In(values(&["CA"])),
            &values(&["CA"]),
            false,
        );
        assert!(!constrained.would_contain(&CellValue::from("TX")));
    }
}
