//! In-memory cell datasets.

use std::collections::HashMap;

use starcache_model::{CellKey, CellStorage, CellValue, NullMask, SegmentBody};

/// The in-memory mirror of a segment body, optimized for cell lookup.
///
/// Datasets are built once when a body is attached to a live segment.
/// Dense variants address cells by row-major linear index; the sparse
/// variant uses a hash map.
#[derive(Debug, Clone)]
pub enum SegmentDataset {
    /// Dense doubles with a null mask.
    DenseDouble {
        /// Cell values by linear index.
        values: Vec<f64>,
        /// Cells holding NULL.
        nulls: NullMask,
        /// Axis lengths for linear addressing.
        axis_lens: Vec<usize>,
    },
    /// Dense integers with a null mask.
    DenseInt {
        /// Cell values by linear index.
        values: Vec<i64>,
        /// Cells holding NULL.
        nulls: NullMask,
        /// Axis lengths for linear addressing.
        axis_lens: Vec<usize>,
    },
    /// Dense arbitrary values.
    DenseObject {
        /// Cell values by linear index; `Null` marks an empty cell.
        values: Vec<CellValue>,
        /// Axis lengths for linear addressing.
        axis_lens: Vec<usize>,
    },
    /// Sparse cell map.
    Sparse {
        /// Populated cells only.
        cells: HashMap<CellKey, CellValue>,
    },
}

impl SegmentDataset {
    /// Builds the dataset mirroring `body`.
    #[must_use]
    pub fn from_body(body: &SegmentBody) -> Self {
        let axis_lens: Vec<usize> = body.axes().iter().map(|a| a.len()).collect();
        match body.cells() {
            CellStorage::DenseDouble { values, nulls } => SegmentDataset::DenseDouble {
                values: values.clone(),
                nulls: nulls.clone(),
                axis_lens,
            },
            CellStorage::DenseInt { values, nulls } => SegmentDataset::DenseInt {
                values: values.clone(),
                nulls: nulls.clone(),
                axis_lens,
            },
            CellStorage::DenseObject { values } => SegmentDataset::DenseObject {
                values: values.clone(),
                axis_lens,
            },
            CellStorage::Sparse { cells } => SegmentDataset::Sparse {
                cells: cells.iter().cloned().collect(),
            },
        }
    }

    /// Looks up one cell. `None` means the cell is empty/NULL.
    #[must_use]
    pub fn cell(&self, key: &CellKey) -> Option<CellValue> {
        match self {
            SegmentDataset::DenseDouble {
                values,
                nulls,
                axis_lens,
            } => {
                let index = linear_index(axis_lens, key)?;
                (!nulls.get(index)).then(|| CellValue::Double(values[index]))
            }
            SegmentDataset::DenseInt {
                values,
                nulls,
                axis_lens,
            } => {
                let index = linear_index(axis_lens, key)?;
                (!nulls.get(index)).then(|| CellValue::Int(values[index]))
            }
            SegmentDataset::DenseObject { values, axis_lens } => {
                let index = linear_index(axis_lens, key)?;
                let value = values.get(index)?;
                (!value.is_null()).then(|| value.clone())
            }
            SegmentDataset::Sparse { cells } => cells.get(key).cloned(),
        }
    }

    /// Number of populated cells.
    #[must_use]
    pub fn populated_count(&self) -> usize {
        match self {
            SegmentDataset::DenseDouble { values, nulls, .. } => {
                values.len() - nulls.cardinality()
            }
            SegmentDataset::DenseInt { values, nulls, .. } => {
                values.len() - nulls.cardinality()
            }
            SegmentDataset::DenseObject { values, .. } => {
                values.iter().filter(|v| !v.is_null()).count()
            }
            SegmentDataset::Sparse { cells } => cells.len(),
        }
    }
}

fn linear_index(axis_lens: &[usize], key: &CellKey) -> Option<usize> {
    if key.arity() != axis_lens.len() {
        return None;
    }
    let mut index = 0usize;
    for (&len, &ordinal) in axis_lens.iter().zip(key.ordinals()) {
        let ordinal = ordinal as usize;
        if ordinal >= len {
            return None;
        }
        index = index * len + ordinal;
    }
    Some(index)
}
