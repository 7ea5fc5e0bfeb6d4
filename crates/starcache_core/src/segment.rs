//! Live segments bound to a star and measure.

use starcache_model::{
    BitKey, CellKey, CellValue, SegmentBody, SegmentColumn, SegmentHeader, SegmentProvenance,
};

use crate::axis::{ColumnPredicate, SegmentAxis};
use crate::dataset::SegmentDataset;
use crate::error::{CoreError, CoreResult};

/// A sub-rectangle punched out of a segment by an earlier flush.
///
/// A cell whose coordinates fall inside any excluded column's value set
/// (or inside a wildcard-excluded column) is treated as absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExcludedRegion {
    columns: Vec<SegmentColumn>,
}

impl ExcludedRegion {
    /// Creates a region from its constrained columns.
    #[must_use]
    pub fn new(columns: Vec<SegmentColumn>) -> Self {
        Self { columns }
    }

    /// The region's columns.
    #[must_use]
    pub fn columns(&self) -> &[SegmentColumn] {
        &self.columns
    }

    /// Returns whether a cell at the given per-axis keys falls inside
    /// this region. `column_expressions` names each key's column.
    #[must_use]
    pub fn would_contain(&self, column_expressions: &[String], keys: &[CellValue]) -> bool {
        debug_assert_eq!(column_expressions.len(), keys.len());
        for (expr, key) in column_expressions.iter().zip(keys) {
            let Some(column) = self
                .columns
                .iter()
                .find(|c| c.column_expression() == expr.as_str())
            else {
                continue;
            };
            match column.values() {
                None => return true,
                Some(values) if values.contains(key) => return true,
                Some(_) => {}
            }
        }
        false
    }
}

/// A segment bound to a star and measure at runtime.
///
/// The runtime counterpart of a [`SegmentHeader`]: same provenance and
/// dimensionality, but predicates live as evaluatable
/// [`ColumnPredicate`]s and flush holes as [`ExcludedRegion`]s. Segments
/// are immutable; data arrives by constructing a [`SegmentWithData`].
#[derive(Debug, Clone)]
pub struct Segment {
    provenance: SegmentProvenance,
    bit_key: BitKey,
    column_expressions: Vec<String>,
    predicates: Vec<ColumnPredicate>,
    compound_predicates: Vec<String>,
    excluded_regions: Vec<ExcludedRegion>,
}

impl Segment {
    /// Creates a segment. `column_expressions` and `predicates` are
    /// aligned and ordered by the bit key's natural order.
    #[must_use]
    pub fn new(
        provenance: SegmentProvenance,
        bit_key: BitKey,
        column_expressions: Vec<String>,
        predicates: Vec<ColumnPredicate>,
        compound_predicates: Vec<String>,
        excluded_regions: Vec<ExcludedRegion>,
    ) -> Self {
        debug_assert_eq!(column_expressions.len(), predicates.len());
        Self {
            provenance,
            bit_key,
            column_expressions,
            predicates,
            compound_predicates,
            excluded_regions,
        }
    }

    /// Reconstructs a live segment from a header. Wildcard columns become
    /// wildcard predicates; value lists become `In` predicates; excluded
    /// regions carry over as one region.
    #[must_use]
    pub fn from_header(header: &SegmentHeader) -> Self {
        let mut column_expressions = Vec::with_capacity(header.arity());
        let mut predicates = Vec::with_capacity(header.arity());
        for column in header.constrained_columns() {
            column_expressions.push(column.column_expression().to_owned());
            predicates.push(match column.values() {
                None => ColumnPredicate::Wildcard,
                Some(values) => ColumnPredicate::In(values.clone()),
            });
        }
        let excluded_regions = if header.excluded_regions().is_empty() {
            Vec::new()
        } else {
            vec![ExcludedRegion::new(header.excluded_regions().to_vec())]
        };
        Self {
            provenance: header.provenance().clone(),
            bit_key: header.bit_key().clone(),
            column_expressions,
            predicates,
            compound_predicates: header.compound_predicates().to_vec(),
            excluded_regions,
        }
    }

    /// Derives the content-addressed header describing this segment.
    #[must_use]
    pub fn to_header(&self) -> SegmentHeader {
        let columns = self
            .column_expressions
            .iter()
            .zip(&self.predicates)
            .map(|(expr, predicate)| {
                SegmentColumn::new(expr.clone(), predicate.values().cloned())
            })
            .collect();
        SegmentHeader::new(
            self.provenance.clone(),
            columns,
            self.compound_predicates.clone(),
            self.bit_key.clone(),
            Vec::new(),
        )
    }

    /// The provenance scoping this segment.
    #[must_use]
    pub fn provenance(&self) -> &SegmentProvenance {
        &self.provenance
    }

    /// The dimensionality bitmap.
    #[must_use]
    pub fn bit_key(&self) -> &BitKey {
        &self.bit_key
    }

    /// The constrained column expressions, in bit-key order.
    #[must_use]
    pub fn column_expressions(&self) -> &[String] {
        &self.column_expressions
    }

    /// The per-column predicates, aligned with the expressions.
    #[must_use]
    pub fn predicates(&self) -> &[ColumnPredicate] {
        &self.predicates
    }

    /// The verbatim compound predicate texts.
    #[must_use]
    pub fn compound_predicates(&self) -> &[String] {
        &self.compound_predicates
    }

    /// The regions flushed out of this segment.
    #[must_use]
    pub fn excluded_regions(&self) -> &[ExcludedRegion] {
        &self.excluded_regions
    }

    /// Returns whether a cell at the given keys falls in any excluded
    /// region.
    #[must_use]
    pub fn is_excluded(&self, keys: &[CellValue]) -> bool {
        self.excluded_regions
            .iter()
            .any(|r| r.would_contain(&self.column_expressions, keys))
    }
}

/// A segment with its axes materialized and its cells loaded.
#[derive(Debug, Clone)]
pub struct SegmentWithData {
    segment: Segment,
    axes: Vec<SegmentAxis>,
    dataset: SegmentDataset,
}

impl SegmentWithData {
    /// Attaches a body to a segment, materializing one axis per
    /// predicate from the body's axis value sets.
    ///
    /// # Errors
    ///
    /// Returns an invariant violation when the body's arity does not
    /// match the segment's.
    pub fn attach(segment: Segment, body: &SegmentBody) -> CoreResult<Self> {
        if body.axes().len() != segment.predicates().len() {
            return Err(CoreError::invariant_violation(format!(
                "segment arity {} does not match body arity {}",
                segment.predicates().len(),
                body.axes().len()
            )));
        }
        let axes = segment
            .predicates()
            .iter()
            .zip(body.axes())
            .map(|(predicate, body_axis)| {
                SegmentAxis::new(predicate.clone(), &body_axis.values, body_axis.has_null)
            })
            .collect();
        Ok(Self {
            dataset: SegmentDataset::from_body(body),
            segment,
            axes,
        })
    }

    /// The underlying segment.
    #[must_use]
    pub fn segment(&self) -> &Segment {
        &self.segment
    }

    /// The materialized axes.
    #[must_use]
    pub fn axes(&self) -> &[SegmentAxis] {
        &self.axes
    }

    /// The loaded dataset.
    #[must_use]
    pub fn dataset(&self) -> &SegmentDataset {
        &self.dataset
    }

    /// Looks up the cell at the given per-axis keys.
    ///
    /// `None` means the cell is NULL, outside the segment, or inside an
    /// excluded region.
    #[must_use]
    pub fn cell_value(&self, keys: &[CellValue]) -> Option<CellValue> {
        if keys.len() != self.axes.len() || self.segment.is_excluded(keys) {
            return None;
        }
        let mut ordinals = Vec::with_capacity(keys.len());
        for (axis, key) in self.axes.iter().zip(keys) {
            ordinals.push(axis.offset_of(key)? as u32);
        }
        self.dataset.cell(&CellKey::new(ordinals))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use starcache_model::{BodyAxis, NullMask, SchemaChecksum, ValueSet};

    fn provenance() -> SegmentProvenance {
        SegmentProvenance {
            schema_name: "FoodMart".into(),
            schema_checksum: SchemaChecksum::of("<schema/>"),
            cube_name: "Sales".into(),
            measure_name: "Unit Sales".into(),
            fact_table: "sales_fact".into(),
        }
    }

    fn values(names: &[&str]) -> ValueSet {
        names.iter().map(|n| CellValue::from(*n)).collect()
    }

    fn two_axis_segment() -> Segment {
        Segment::new(
            provenance(),
            BitKey::of([0, 1]),
            vec!["state".into(), "gender".into()],
            vec![
                ColumnPredicate::In(values(&["CA", "OR"])),
                ColumnPredicate::Wildcard,
            ],
            Vec::new(),
            Vec::new(),
        )
    }

    fn two_axis_body() -> SegmentBody {
        SegmentBody::dense_double(
            vec![
                BodyAxis::new(values(&["CA", "OR"]), false),
                BodyAxis::new(values(&["F", "M"]), false),
            ],
            vec![1.0, 2.0, 3.0, 4.0],
            NullMask::new(4),
        )
    }

    #[test]
    fn header_roundtrip_preserves_identity() {
        let segment = two_axis_segment();
        let header = segment.to_header();
        let back = Segment::from_header(&header);
        assert_eq!(back.to_header(), header);
        assert_eq!(back.column_expressions(), segment.column_expressions());
    }

    #[test]
    fn attach_and_read_cells() {
        let with_data = SegmentWithData::attach(two_axis_segment(), &two_axis_body()).unwrap();
        assert_eq!(
            with_data.cell_value(&[CellValue::from("CA"), CellValue::from("M")]),
            Some(CellValue::Double(2.0))
        );
        assert_eq!(
            with_data.cell_value(&[CellValue::from("TX"), CellValue::from("M")]),
            None
        );
    }

    #[test]
    fn attach_rejects_arity_mismatch() {
        let body = SegmentBody::dense_object(
            vec![BodyAxis::new(values(&["CA"]), false)],
            vec![CellValue::Int(1)],
        );
        assert!(matches!(
            SegmentWithData::attach(two_axis_segment(), &body),
            Err(CoreError::InvariantViolation { .. })
        ));
    }

    #[test]
    fn excluded_region_hides_cells() {
        let mut segment = two_axis_segment();
        segment.excluded_regions = vec![ExcludedRegion::new(vec![SegmentColumn::new(
            "state",
            Some(values(&["CA"])),
        )])];
        let with_data = SegmentWithData::attach(segment, &two_axis_body()).unwrap();
        assert_eq!(
            with_data.cell_value(&[CellValue::from("CA"), CellValue::from("F")]),
            None
        );
        assert_eq!(
            with_data.cell_value(&[CellValue::from("OR"), CellValue::from("F")]),
            Some(CellValue::Double(3.0))
        );
    }
}
