//! Immutable sorted value sets.

use serde::{Deserialize, Serialize};

use crate::value::CellValue;

/// An immutable, sorted, deduplicated set of values, backed by an array.
///
/// Value sets carry the predicate of a constrained column and the key
/// domain of a segment axis. Membership is a binary search; union and
/// intersection are linear merges. The NULLs-last ordering of
/// [`CellValue`] applies throughout.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValueSet {
    values: Vec<CellValue>,
}

impl ValueSet {
    /// Creates a set from arbitrary values, sorting and deduplicating.
    #[must_use]
    pub fn from_values(mut values: Vec<CellValue>) -> Self {
        values.sort();
        values.dedup();
        Self { values }
    }

    /// Creates an empty set.
    #[must_use]
    pub fn empty() -> Self {
        Self { values: Vec::new() }
    }

    /// Number of values in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if the set holds no values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Membership test by binary search.
    #[must_use]
    pub fn contains(&self, value: &CellValue) -> bool {
        self.values.binary_search(value).is_ok()
    }

    /// Ordinal of `value` within the set, if present.
    #[must_use]
    pub fn position(&self, value: &CellValue) -> Option<usize> {
        self.values.binary_search(value).ok()
    }

    /// Value at ordinal `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&CellValue> {
        self.values.get(index)
    }

    /// Read-only view of the sorted values.
    #[must_use]
    pub fn as_slice(&self) -> &[CellValue] {
        &self.values
    }

    /// Iterates the values in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &CellValue> {
        self.values.iter()
    }

    /// Set union, preserving sorted order.
    #[must_use]
    pub fn union(&self, other: &ValueSet) -> ValueSet {
        let mut merged = Vec::with_capacity(self.len() + other.len());
        let (mut i, mut j) = (0, 0);
        while i < self.values.len() && j < other.values.len() {
            match self.values[i].cmp(&other.values[j]) {
                std::cmp::Ordering::Less => {
                    merged.push(self.values[i].clone());
                    i += 1;
                }
                std::cmp::Ordering::Greater => {
                    merged.push(other.values[j].clone());
                    j += 1;
                }
                std::cmp::Ordering::Equal => {
                    merged.push(self.values[i].clone());
                    i += 1;
                    j += 1;
                }
            }
        }
        merged.extend_from_slice(&self.values[i..]);
        merged.extend_from_slice(&other.values[j..]);
        ValueSet { values: merged }
    }

    /// Set intersection, preserving sorted order.
    #[must_use]
    pub fn intersect(&self, other: &ValueSet) -> ValueSet {
        let mut common = Vec::new();
        let (mut i, mut j) = (0, 0);
        while i < self.values.len() && j < other.values.len() {
            match self.values[i].cmp(&other.values[j]) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    common.push(self.values[i].clone());
                    i += 1;
                    j += 1;
                }
            }
        }
        ValueSet { values: common }
    }
}

impl FromIterator<CellValue> for ValueSet {
    fn from_iter<T: IntoIterator<Item = CellValue>>(iter: T) -> Self {
        Self::from_values(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn states(names: &[&str]) -> ValueSet {
        names.iter().map(|s| CellValue::from(*s)).collect()
    }

    #[test]
    fn sorts_and_dedups() {
        let set = states(&["WA", "CA", "WA", "OR"]);
        assert_eq!(set.len(), 3);
        assert_eq!(set.get(0), Some(&CellValue::from("CA")));
        assert_eq!(set.position(&CellValue::from("WA")), Some(2));
    }

    #[test]
    fn null_lands_at_the_tail() {
        let set = ValueSet::from_values(vec![
            CellValue::Null,
            CellValue::from("CA"),
            CellValue::from("OR"),
        ]);
        assert_eq!(set.get(2), Some(&CellValue::Null));
        assert!(set.contains(&CellValue::Null));
    }

    #[test]
    fn union_and_intersect() {
        let a = states(&["CA", "OR"]);
        let b = states(&["OR", "WA"]);
        assert_eq!(a.union(&b), states(&["CA", "OR", "WA"]));
        assert_eq!(a.intersect(&b), states(&["OR"]));
        assert_eq!(a.union(&b), b.union(&a));
    }

    #[test]
    fn intersect_disjoint_is_empty() {
        let a = states(&["CA"]);
        let b = states(&["WA"]);
        assert!(a.intersect(&b).is_empty());
    }
}
