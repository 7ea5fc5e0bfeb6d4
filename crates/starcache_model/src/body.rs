//! Segment bodies: the immutable cell payload.

use serde::{Deserialize, Serialize};

use crate::bits::NullMask;
use crate::cell_key::CellKey;
use crate::sorted::ValueSet;
use crate::value::CellValue;

/// One axis of a segment body: the sorted key values actually observed,
/// plus whether the source data contained a NULL coordinate. When
/// `has_null` is set, the axis has one extra trailing slot for the NULL
/// key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BodyAxis {
    /// Sorted distinct key values on this axis, NULL excluded.
    pub values: ValueSet,
    /// Whether the axis also carries the NULL coordinate.
    pub has_null: bool,
}

impl BodyAxis {
    /// Creates an axis.
    #[must_use]
    pub fn new(values: ValueSet, has_null: bool) -> Self {
        Self { values, has_null }
    }

    /// Number of slots on this axis, including the NULL slot.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len() + usize::from(self.has_null)
    }

    /// Returns true when the axis has no slots at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The key at `ordinal`: a value from the set, or NULL for the
    /// trailing slot.
    #[must_use]
    pub fn key_at(&self, ordinal: usize) -> Option<CellValue> {
        if ordinal < self.values.len() {
            self.values.get(ordinal).cloned()
        } else if self.has_null && ordinal == self.values.len() {
            Some(CellValue::Null)
        } else {
            None
        }
    }
}

/// Cell storage of a segment body.
///
/// Dense variants lay cells out in row-major linear order (last axis
/// fastest); the sparse variant keys each populated cell explicitly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CellStorage {
    /// Dense array of doubles with a null mask.
    DenseDouble {
        /// Cell values by linear index.
        values: Vec<f64>,
        /// Cells that hold NULL rather than a value.
        nulls: NullMask,
    },
    /// Dense array of integers with a null mask.
    DenseInt {
        /// Cell values by linear index.
        values: Vec<i64>,
        /// Cells that hold NULL rather than a value.
        nulls: NullMask,
    },
    /// Dense array of arbitrary values; `CellValue::Null` marks an empty
    /// cell.
    DenseObject {
        /// Cell values by linear index.
        values: Vec<CellValue>,
    },
    /// Sparse cell map, sorted by key for deterministic equality.
    Sparse {
        /// Populated cells only.
        cells: Vec<(CellKey, CellValue)>,
    },
}

/// The immutable cell payload of a segment.
///
/// Bodies are what external cache providers store; they carry the axis
/// value sets alongside the cells so that a body can be re-attached to a
/// live segment without consulting anything else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentBody {
    axes: Vec<BodyAxis>,
    cells: CellStorage,
}

impl SegmentBody {
    /// Creates a dense double body. `values` and `nulls` must cover the
    /// full axis capacity.
    #[must_use]
    pub fn dense_double(axes: Vec<BodyAxis>, values: Vec<f64>, nulls: NullMask) -> Self {
        debug_assert_eq!(values.len(), capacity_of(&axes));
        debug_assert_eq!(nulls.len(), values.len());
        Self {
            axes,
            cells: CellStorage::DenseDouble { values, nulls },
        }
    }

    /// Creates a dense integer body.
    #[must_use]
    pub fn dense_int(axes: Vec<BodyAxis>, values: Vec<i64>, nulls: NullMask) -> Self {
        debug_assert_eq!(values.len(), capacity_of(&axes));
        debug_assert_eq!(nulls.len(), values.len());
        Self {
            axes,
            cells: CellStorage::DenseInt { values, nulls },
        }
    }

    /// Creates a dense object body.
    #[must_use]
    pub fn dense_object(axes: Vec<BodyAxis>, values: Vec<CellValue>) -> Self {
        debug_assert_eq!(values.len(), capacity_of(&axes));
        Self {
            axes,
            cells: CellStorage::DenseObject { values },
        }
    }

    /// Creates a sparse body from populated cells.
    #[must_use]
    pub fn sparse(axes: Vec<BodyAxis>, mut cells: Vec<(CellKey, CellValue)>) -> Self {
        cells.sort_by(|a, b| a.0.cmp(&b.0));
        Self {
            axes,
            cells: CellStorage::Sparse { cells },
        }
    }

    /// The per-axis metadata.
    #[must_use]
    pub fn axes(&self) -> &[BodyAxis] {
        &self.axes
    }

    /// The cell storage variant.
    #[must_use]
    pub fn cells(&self) -> &CellStorage {
        &self.cells
    }

    /// Per-axis observed value sets (NULL slot excluded).
    pub fn axis_value_sets(&self) -> impl Iterator<Item = &ValueSet> {
        self.axes.iter().map(|a| &a.values)
    }

    /// Per-axis NULL-coordinate flags.
    pub fn null_axis_flags(&self) -> impl Iterator<Item = bool> + '_ {
        self.axes.iter().map(|a| a.has_null)
    }

    /// Total cell capacity: the product of axis lengths.
    #[must_use]
    pub fn capacity(&self) -> usize {
        capacity_of(&self.axes)
    }

    /// Number of populated (non-NULL) cells.
    #[must_use]
    pub fn populated_count(&self) -> usize {
        match &self.cells {
            CellStorage::DenseDouble { values, nulls } => values.len() - nulls.cardinality(),
            CellStorage::DenseInt { values, nulls } => values.len() - nulls.cardinality(),
            CellStorage::DenseObject { values } => {
                values.iter().filter(|v| !v.is_null()).count()
            }
            CellStorage::Sparse { cells } => cells.len(),
        }
    }

    /// Looks up one cell. `None` means the cell is empty/NULL.
    #[must_use]
    pub fn cell(&self, key: &CellKey) -> Option<CellValue> {
        match &self.cells {
            CellStorage::DenseDouble { values, nulls } => {
                let index = self.linear_index(key)?;
                (!nulls.get(index)).then(|| CellValue::Double(values[index]))
            }
            CellStorage::DenseInt { values, nulls } => {
                let index = self.linear_index(key)?;
                (!nulls.get(index)).then(|| CellValue::Int(values[index]))
            }
            CellStorage::DenseObject { values } => {
                let index = self.linear_index(key)?;
                let value = values.get(index)?;
                (!value.is_null()).then(|| value.clone())
            }
            CellStorage::Sparse { cells } => cells
                .binary_search_by(|(k, _)| k.cmp(key))
                .ok()
                .map(|i| cells[i].1.clone()),
        }
    }

    /// Iterates every populated cell as `(key, value)` pairs, regardless
    /// of storage variant. This is the sparse view the rollup reads.
    pub fn cell_iter(&self) -> Box<dyn Iterator<Item = (CellKey, CellValue)> + '_> {
        match &self.cells {
            CellStorage::DenseDouble { values, nulls } => Box::new(
                values
                    .iter()
                    .enumerate()
                    .filter(move |(i, _)| !nulls.get(*i))
                    .map(move |(i, v)| (self.decode_index(i), CellValue::Double(*v))),
            ),
            CellStorage::DenseInt { values, nulls } => Box::new(
                values
                    .iter()
                    .enumerate()
                    .filter(move |(i, _)| !nulls.get(*i))
                    .map(move |(i, v)| (self.decode_index(i), CellValue::Int(*v))),
            ),
            CellStorage::DenseObject { values } => Box::new(
                values
                    .iter()
                    .enumerate()
                    .filter(|(_, v)| !v.is_null())
                    .map(move |(i, v)| (self.decode_index(i), v.clone())),
            ),
            CellStorage::Sparse { cells } => {
                Box::new(cells.iter().map(|(k, v)| (k.clone(), v.clone())))
            }
        }
    }

    /// Row-major linear index of `key`, or `None` when out of range.
    fn linear_index(&self, key: &CellKey) -> Option<usize> {
        if key.arity() != self.axes.len() {
            return None;
        }
        let mut index = 0usize;
        for (axis, &ordinal) in self.axes.iter().zip(key.ordinals()) {
            let ordinal = ordinal as usize;
            if ordinal >= axis.len() {
                return None;
            }
            index = index * axis.len() + ordinal;
        }
        Some(index)
    }

    /// Inverse of [`Self::linear_index`].
    fn decode_index(&self, mut index: usize) -> CellKey {
        let mut ordinals = vec![0u32; self.axes.len()];
        for (slot, axis) in ordinals.iter_mut().zip(&self.axes).rev() {
            let len = axis.len();
            *slot = (index % len) as u32;
            index /= len;
        }
        CellKey::new(ordinals)
    }
}

fn capacity_of(axes: &[BodyAxis]) -> usize {
    axes.iter().map(BodyAxis::len).product()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn axis(values: &[&str], has_null: bool) -> BodyAxis {
        BodyAxis::new(
            values.iter().map(|v| CellValue::from(*v)).collect(),
            has_null,
        )
    }

    fn key(ordinals: &[u32]) -> CellKey {
        CellKey::new(ordinals.to_vec())
    }

    #[test]
    fn dense_double_linear_layout() {
        // 2 states x 2 genders, row-major: (CA,F) (CA,M) (OR,F) (OR,M).
        let body = SegmentBody::dense_double(
            vec![axis(&["CA", "OR"], false), axis(&["F", "M"], false)],
            vec![1.0, 2.0, 3.0, 4.0],
            NullMask::new(4),
        );
        assert_eq!(body.capacity(), 4);
        assert_eq!(body.populated_count(), 4);
        assert_eq!(body.cell(&key(&[0, 1])), Some(CellValue::Double(2.0)));
        assert_eq!(body.cell(&key(&[1, 0])), Some(CellValue::Double(3.0)));
        assert_eq!(body.cell(&key(&[2, 0])), None);
    }

    #[test]
    fn null_mask_hides_cells() {
        let mut nulls = NullMask::new(4);
        nulls.set(3, true);
        let body = SegmentBody::dense_int(
            vec![axis(&["CA", "OR"], false), axis(&["F", "M"], false)],
            vec![1, 2, 3, 0],
            nulls,
        );
        assert_eq!(body.populated_count(), 3);
        assert_eq!(body.cell(&key(&[1, 1])), None);
        let cells: Vec<_> = body.cell_iter().collect();
        assert_eq!(cells.len(), 3);
    }

    #[test]
    fn null_axis_slot_is_addressable() {
        // One axis with CA, OR plus the NULL slot.
        let body = SegmentBody::dense_double(
            vec![axis(&["CA", "OR"], true)],
            vec![1.0, 2.0, 5.0],
            NullMask::new(3),
        );
        assert_eq!(body.capacity(), 3);
        assert_eq!(body.cell(&key(&[2])), Some(CellValue::Double(5.0)));
        assert_eq!(body.axes()[0].key_at(2), Some(CellValue::Null));
    }

    #[test]
    fn sparse_lookup_and_iteration() {
        let body = SegmentBody::sparse(
            vec![axis(&["CA", "OR"], false)],
            vec![
                (key(&[1]), CellValue::Int(7)),
                (key(&[0]), CellValue::Int(3)),
            ],
        );
        assert_eq!(body.cell(&key(&[0])), Some(CellValue::Int(3)));
        assert_eq!(body.cell(&key(&[1])), Some(CellValue::Int(7)));
        // Sorted on construction.
        let cells: Vec<_> = body.cell_iter().collect();
        assert_eq!(cells[0].0, key(&[0]));
    }

    #[test]
    fn dense_iter_decodes_keys() {
        let body = SegmentBody::dense_object(
            vec![axis(&["CA", "OR"], false), axis(&["F", "M"], false)],
            vec![
                CellValue::Int(1),
                CellValue::Null,
                CellValue::Int(3),
                CellValue::Int(4),
            ],
        );
        let cells: Vec<_> = body.cell_iter().collect();
        assert_eq!(cells.len(), 3);
        assert_eq!(cells[1], (key(&[1, 0]), CellValue::Int(3)));
    }

    #[test]
    fn serde_roundtrip_cell_for_cell() {
        let mut nulls = NullMask::new(4);
        nulls.set(1, true);
        let body = SegmentBody::dense_double(
            vec![axis(&["CA", "OR"], false), axis(&["F", "M"], false)],
            vec![1.0, 0.0, 3.0, 4.0],
            nulls,
        );
        let json = serde_json::to_string(&body).unwrap();
        let back: SegmentBody = serde_json::from_str(&json).unwrap();
        assert_eq!(body, back);
        for (k, v) in body.cell_iter() {
            assert_eq!(back.cell(&k), Some(v));
        }
    }
}
