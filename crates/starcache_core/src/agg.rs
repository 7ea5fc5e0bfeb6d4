//! Rollup aggregators.

use starcache_model::CellValue;

/// How cell values combine when a rollup folds several source cells into
/// one target cell.
///
/// NULL handling follows SQL: NULL inputs are ignored; an all-NULL (or
/// empty) input aggregates to NULL, except for `Count` which yields 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregator {
    /// Sum of the values. Integer sums that overflow fall back to
    /// doubles, so the result is deterministic rather than wrapping.
    Sum,
    /// Count of non-NULL values.
    Count,
    /// Minimum value.
    Min,
    /// Maximum value.
    Max,
}

impl Aggregator {
    /// Aggregates a multiset of cell values.
    #[must_use]
    pub fn aggregate(&self, values: &[CellValue]) -> CellValue {
        let present: Vec<&CellValue> = values.iter().filter(|v| !v.is_null()).collect();
        match self {
            Aggregator::Count => CellValue::Int(present.len() as i64),
            _ if present.is_empty() => CellValue::Null,
            Aggregator::Min => present
                .iter()
                .min()
                .map_or(CellValue::Null, |v| (*v).clone()),
            Aggregator::Max => present
                .iter()
                .max()
                .map_or(CellValue::Null, |v| (*v).clone()),
            Aggregator::Sum => sum(&present),
        }
    }
}

fn sum(values: &[&CellValue]) -> CellValue {
    let mut int_acc: i64 = 0;
    let mut double_acc: f64 = 0.0;
    let mut as_double = false;
    for value in values {
        match value {
            CellValue::Int(n) => {
                if as_double {
                    double_acc += *n as f64;
                } else {
                    match int_acc.checked_add(*n) {
                        Some(next) => int_acc = next,
                        None => {
                            as_double = true;
                            double_acc = int_acc as f64 + *n as f64;
                        }
                    }
                }
            }
            CellValue::Double(d) => {
                if !as_double {
                    as_double = true;
                    double_acc = int_acc as f64;
                }
                double_acc += d;
            }
            // Booleans and strings do not sum; keep the sum numeric by
            // ignoring them, as SQL would reject the query upstream.
            _ => {}
        }
    }
    if as_double {
        CellValue::Double(double_acc)
    } else {
        CellValue::Int(int_acc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ints(values: &[i64]) -> Vec<CellValue> {
        values.iter().map(|&v| CellValue::Int(v)).collect()
    }

    #[test]
    fn sum_of_ints() {
        assert_eq!(
            Aggregator::Sum.aggregate(&ints(&[1, 2, 4])),
            CellValue::Int(7)
        );
    }

    #[test]
    fn sum_promotes_to_double() {
        let mixed = vec![CellValue::Int(1), CellValue::Double(0.5)];
        assert_eq!(Aggregator::Sum.aggregate(&mixed), CellValue::Double(1.5));
    }

    #[test]
    fn sum_overflow_falls_back_to_double() {
        let huge = vec![CellValue::Int(i64::MAX), CellValue::Int(1)];
        assert_eq!(
            Aggregator::Sum.aggregate(&huge),
            CellValue::Double(i64::MAX as f64 + 1.0)
        );
    }

    #[test]
    fn nulls_are_ignored() {
        let values = vec![CellValue::Null, CellValue::Int(3), CellValue::Null];
        assert_eq!(Aggregator::Sum.aggregate(&values), CellValue::Int(3));
        assert_eq!(Aggregator::Count.aggregate(&values), CellValue::Int(1));
        assert_eq!(Aggregator::Min.aggregate(&values), CellValue::Int(3));
    }

    #[test]
    fn all_null_input() {
        let values = vec![CellValue::Null, CellValue::Null];
        assert_eq!(Aggregator::Sum.aggregate(&values), CellValue::Null);
        assert_eq!(Aggregator::Count.aggregate(&values), CellValue::Int(0));
        assert_eq!(Aggregator::Max.aggregate(&values), CellValue::Null);
    }

    #[test]
    fn min_max_over_strings() {
        let values = vec![CellValue::from("OR"), CellValue::from("CA")];
        assert_eq!(Aggregator::Min.aggregate(&values), CellValue::from("CA"));
        assert_eq!(Aggregator::Max.aggregate(&values), CellValue::from("OR"));
    }
}
