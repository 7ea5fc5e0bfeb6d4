//! Building reduced-dimensionality segments from cached ones.

use std::collections::{BTreeMap, BTreeSet};

use starcache_model::{
    BitKey, BodyAxis, CellKey, CellValue, NullMask, SegmentBody, SegmentColumn, SegmentHeader,
    ValueSet,
};

use crate::agg::Aggregator;
use crate::error::{CoreError, CoreResult};

struct AxisInfo {
    column: SegmentColumn,
    requested: Option<ValueSet>,
    value_set: Option<ValueSet>,
    has_null: bool,
    src: usize,
    lost_predicate: bool,
}

/// Rolls a set of segments of one dimensionality up into a segment of
/// reduced dimensionality.
///
/// All inputs must share provenance and dimensionality. `keep_columns`
/// names the axes that survive; every other axis is aggregated away with
/// `aggregator`. The result's axes are the intersection of the inputs'
/// axes; when inputs requested incompatible predicates for a kept
/// column, the predicate demotes to the observed value set.
///
/// The body is stored sparse when the populated fraction falls below
/// `density_threshold`, otherwise in the dense variant matching the
/// aggregated value type.
///
/// # Errors
///
/// Fails when `inputs` is empty, or when a kept column is missing from
/// an input header.
pub fn rollup(
    inputs: &[(SegmentHeader, SegmentBody)],
    keep_columns: &BTreeSet<String>,
    target_bit_key: BitKey,
    aggregator: Aggregator,
    density_threshold: f64,
) -> CoreResult<(SegmentHeader, SegmentBody)> {
    let (first_header, _) = inputs
        .first()
        .ok_or_else(|| CoreError::rollup("rollup requires at least one input segment"))?;

    let axes = reconcile_axes(inputs, first_header, keep_columns)?;
    let cell_values = accumulate_cells(inputs, first_header, keep_columns, &axes)?;

    let body_axes: Vec<BodyAxis> = axes
        .iter()
        .map(|axis| {
            BodyAxis::new(
                axis.value_set.clone().unwrap_or_else(ValueSet::empty),
                axis.has_null,
            )
        })
        .collect();
    let body = build_body(cell_values, body_axes, aggregator, density_threshold);

    // Target predicates: preserved where the inputs agreed, demoted to
    // the observed value set where they did not.
    let columns = axes
        .iter()
        .map(|axis| {
            let values = if axis.lost_predicate {
                axis.value_set.clone()
            } else {
                axis.requested.clone()
            };
            SegmentColumn::new(axis.column.column_expression().to_owned(), values)
        })
        .collect();
    let header = SegmentHeader::new(
        first_header.provenance().clone(),
        columns,
        first_header.compound_predicates().to_vec(),
        target_bit_key,
        Vec::new(),
    );
    Ok((header, body))
}

/// Picks the kept axes from the first header and intersects every
/// input's observed values into them.
fn reconcile_axes(
    inputs: &[(SegmentHeader, SegmentBody)],
    first_header: &SegmentHeader,
    keep_columns: &BTreeSet<String>,
) -> CoreResult<Vec<AxisInfo>> {
    let mut axes: Vec<AxisInfo> = Vec::with_capacity(keep_columns.len());
    for (src, column) in first_header.constrained_columns().iter().enumerate() {
        if keep_columns.contains(column.column_expression()) {
            axes.push(AxisInfo {
                column: column.clone(),
                requested: column.values().cloned(),
                value_set: None,
                has_null: false,
                src,
                lost_predicate: false,
            });
        }
    }
    if axes.len() != keep_columns.len() {
        return Err(CoreError::rollup(
            "kept column missing from the input dimensionality",
        ));
    }

    for (header, body) in inputs {
        let value_sets: Vec<&ValueSet> = body.axis_value_sets().collect();
        let null_flags: Vec<bool> = body.null_axis_flags().collect();
        for axis in &mut axes {
            let expr = axis.column.column_expression();
            let observed = value_sets.get(axis.src).copied().ok_or_else(|| {
                CoreError::rollup(format!("input body has no axis for column '{expr}'"))
            })?;
            let has_null = null_flags.get(axis.src).copied().unwrap_or(false);
            let requested = header
                .constrained_column(expr)
                .ok_or_else(|| {
                    CoreError::rollup(format!("input header does not constrain column '{expr}'"))
                })?
                .values()
                .cloned();

            match &axis.value_set {
                None => {
                    axis.value_set = Some(observed.clone());
                    axis.has_null = has_null;
                    axis.requested = requested;
                }
                Some(running) => {
                    axis.value_set = Some(running.intersect(observed));
                    axis.has_null = axis.has_null && has_null;
                    if axis.requested != requested {
                        match &axis.requested {
                            // Downgrade from wildcard to a specific list.
                            None => axis.requested = requested,
                            // Incompatible predicates. Best we can say is
                            // "we must have asked for the values that came
                            // back".
                            Some(_) => axis.lost_predicate = true,
                        }
                    }
                }
            }
        }
    }
    Ok(axes)
}

/// Reads every input cell through the sparse view, translates its kept
/// ordinals into target ordinals, and groups values per target cell.
fn accumulate_cells(
    inputs: &[(SegmentHeader, SegmentBody)],
    first_header: &SegmentHeader,
    keep_columns: &BTreeSet<String>,
    axes: &[AxisInfo],
) -> CoreResult<BTreeMap<CellKey, Vec<CellValue>>> {
    let kept: Vec<bool> = first_header
        .constrained_columns()
        .iter()
        .map(|c| keep_columns.contains(c.column_expression()))
        .collect();

    let mut cell_values: BTreeMap<CellKey, Vec<CellValue>> = BTreeMap::new();
    for (_, body) in inputs {
        let source_axes: Vec<(&ValueSet, bool)> = body
            .axis_value_sets()
            .zip(body.null_axis_flags())
            .collect();
        if source_axes.len() != kept.len() {
            return Err(CoreError::rollup(
                "input body arity does not match the input dimensionality",
            ));
        }

        'cells: for (key, value) in body.cell_iter() {
            let mut pos = Vec::with_capacity(axes.len());
            let mut z = 0;
            for (i, &ordinal) in key.ordinals().iter().enumerate() {
                if !kept[i] {
                    continue;
                }
                let (values, has_null) = source_axes[i];
                let ordinal = ordinal as usize;
                let source_key = if ordinal < values.len() {
                    values.get(ordinal).cloned()
                } else if has_null && ordinal == values.len() {
                    Some(CellValue::Null)
                } else {
                    None
                };
                let Some(source_key) = source_key else {
                    continue 'cells;
                };

                let axis = &axes[z];
                let target_set = axis.value_set.as_ref();
                let target_ordinal = if source_key.is_null() {
                    // The NULL coordinate maps to the trailing slot.
                    if !axis.has_null {
                        continue 'cells;
                    }
                    target_set.map_or(0, ValueSet::len)
                } else {
                    match target_set.and_then(|set| set.position(&source_key)) {
                        Some(ordinal) => ordinal,
                        // Outside the reconciled intersection: the target
                        // does not cover this coordinate.
                        None => continue 'cells,
                    }
                };
                pos.push(target_ordinal as u32);
                z += 1;
            }
            debug_assert_eq!(z, axes.len());
            cell_values.entry(CellKey::new(pos)).or_default().push(value);
        }
    }
    Ok(cell_values)
}

/// Aggregates each target cell and picks the body variant: sparse below
/// the density threshold, otherwise the dense variant matching the
/// observed value type.
fn build_body(
    cell_values: BTreeMap<CellKey, Vec<CellValue>>,
    body_axes: Vec<BodyAxis>,
    aggregator: Aggregator,
    density_threshold: f64,
) -> SegmentBody {
    let capacity: usize = body_axes.iter().map(BodyAxis::len).product();
    if cell_values.is_empty() {
        return SegmentBody::dense_object(body_axes, vec![CellValue::Null; capacity]);
    }

    let aggregated: BTreeMap<CellKey, CellValue> = cell_values
        .into_iter()
        .map(|(key, values)| (key, aggregator.aggregate(&values)))
        .filter(|(_, value)| !value.is_null())
        .collect();

    let density = if capacity == 0 {
        0.0
    } else {
        aggregated.len() as f64 / capacity as f64
    };
    if density < density_threshold {
        return SegmentBody::sparse(body_axes, aggregated.into_iter().collect());
    }

    let all_int = aggregated.values().all(|v| matches!(v, CellValue::Int(_)));
    let all_double = aggregated
        .values()
        .all(|v| matches!(v, CellValue::Double(_)));

    let linear = |key: &CellKey| -> usize {
        let mut index = 0;
        for (axis, &ordinal) in body_axes.iter().zip(key.ordinals()) {
            index = index * axis.len() + ordinal as usize;
        }
        index
    };

    if all_double {
        let mut values = vec![0.0; capacity];
        let mut nulls = NullMask::new(capacity);
        for i in 0..capacity {
            nulls.set(i, true);
        }
        for (key, value) in &aggregated {
            if let CellValue::Double(d) = value {
                let at = linear(key);
                values[at] = *d;
                nulls.set(at, false);
            }
        }
        SegmentBody::dense_double(body_axes, values, nulls)
    } else if all_int {
        let mut values = vec![0; capacity];
        let mut nulls = NullMask::new(capacity);
        for i in 0..capacity {
            nulls.set(i, true);
        }
        for (key, value) in &aggregated {
            if let CellValue::Int(n) = value {
                let at = linear(key);
                values[at] = *n;
                nulls.set(at, false);
            }
        }
        SegmentBody::dense_int(body_axes, values, nulls)
    } else {
        let mut values = vec![CellValue::Null; capacity];
        for (key, value) in &aggregated {
            values[linear(key)] = value.clone();
        }
        SegmentBody::dense_object(body_axes, values)
    }
}
