use std::collections::HashMap;

use millstone::{Field, FieldType, Tuple, TupleDesc};

use crate::errors::ExecutionError;
use crate::executor::OpIterator;
use crate::quern_debug_log;

/// The aggregation operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateOp {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl std::fmt::Display for AggregateOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            AggregateOp::Count => "count",
            AggregateOp::Sum => "sum",
            AggregateOp::Avg => "avg",
            AggregateOp::Min => "min",
            AggregateOp::Max => "max",
        };
        write!(f, "{label}")
    }
}

/// Which field groups the input, and its declared type. Aggregators with no
/// grouping collapse the whole input into one group.
#[derive(Debug, Clone, Copy)]
pub struct GroupBy {
    pub field: usize,
    pub field_type: FieldType,
}

fn group_key(
    grouping: Option<GroupBy>,
    tuple: &Tuple,
) -> Result<Option<Field>, ExecutionError> {
    let Some(group) = grouping else {
        return Ok(None);
    };
    let field = tuple.field(group.field).ok_or_else(|| {
        ExecutionError::InvalidArgument(format!(
            "tuple has no group-by field at index {}",
            group.field
        ))
    })?;
    if field.field_type() != group.field_type {
        return Err(ExecutionError::InvalidArgument(format!(
            "group-by field {} is {:?}, declared {:?}",
            group.field,
            field.field_type(),
            group.field_type
        )));
    }
    Ok(Some(field.clone()))
}

fn output_desc(grouping: Option<GroupBy>) -> TupleDesc {
    match grouping {
        Some(group) => TupleDesc::new(vec![group.field_type, FieldType::Int]),
        None => TupleDesc::new(vec![FieldType::Int]),
    }
}

fn output_tuple(
    desc: &TupleDesc,
    key: &Option<Field>,
    aggregate: i32,
) -> Result<Tuple, ExecutionError> {
    let fields = match key {
        Some(group_value) => vec![group_value.clone(), Field::Int(aggregate)],
        None => vec![Field::Int(aggregate)],
    };
    Ok(Tuple::new(desc.clone(), fields)?)
}

/// Computes COUNT, SUM, AVG, MIN, or MAX over an integer field, optionally
/// grouped by another field.
///
/// Merging buffers every value per group; `iterator` snapshots one output
/// tuple per group, so rewinding an iterator replays the identical sequence
/// even while merging continues.
pub struct IntegerAggregator {
    grouping: Option<GroupBy>,
    agg_field: usize,
    op: AggregateOp,
    groups: HashMap<Option<Field>, Vec<i32>>,
}

impl IntegerAggregator {
    pub fn new(grouping: Option<GroupBy>, agg_field: usize, op: AggregateOp) -> Self {
        IntegerAggregator {
            grouping,
            agg_field,
            op,
            groups: HashMap::new(),
        }
    }

    /// Folds one tuple into its group.
    pub fn merge(&mut self, tuple: &Tuple) -> Result<(), ExecutionError> {
        let value = match tuple.field(self.agg_field) {
            Some(Field::Int(v)) => *v,
            Some(other) => {
                return Err(ExecutionError::InvalidArgument(format!(
                    "aggregate field {} is {:?}, expected an integer",
                    self.agg_field,
                    other.field_type()
                )))
            }
            None => {
                return Err(ExecutionError::InvalidArgument(format!(
                    "tuple has no aggregate field at index {}",
                    self.agg_field
                )))
            }
        };
        let key = group_key(self.grouping, tuple)?;
        self.groups.entry(key).or_default().push(value);
        Ok(())
    }

    /// One output tuple per group: (group value, aggregate) when grouping,
    /// (aggregate) otherwise.
    pub fn iterator(&self) -> Result<AggregateIter, ExecutionError> {
        let desc = output_desc(self.grouping);
        let mut rows = Vec::with_capacity(self.groups.len());
        for (key, values) in &self.groups {
            rows.push(output_tuple(&desc, key, apply(self.op, values))?);
        }
        quern_debug_log!(
            "[IntegerAggregator::iterator] {} snapshot of {} groups",
            self.op,
            rows.len()
        );
        Ok(AggregateIter::new(desc, rows))
    }
}

fn apply(op: AggregateOp, values: &[i32]) -> i32 {
    // A group exists iff at least one tuple was merged into it, so `values`
    // is never empty here. Sums wrap silently; callers keep them in range.
    let sum = || values.iter().fold(0i32, |acc, v| acc.wrapping_add(*v));
    match op {
        AggregateOp::Count => values.len() as i32,
        AggregateOp::Sum => sum(),
        AggregateOp::Avg => sum() / values.len() as i32,
        AggregateOp::Min => values.iter().copied().min().unwrap_or(0),
        AggregateOp::Max => values.iter().copied().max().unwrap_or(0),
    }
}

/// Counts string values, optionally grouped. COUNT is the only operator a
/// string field supports.
pub struct StringAggregator {
    grouping: Option<GroupBy>,
    agg_field: usize,
    groups: HashMap<Option<Field>, Vec<String>>,
}

impl StringAggregator {
    pub fn new(
        grouping: Option<GroupBy>,
        agg_field: usize,
        op: AggregateOp,
    ) -> Result<Self, ExecutionError> {
        if op != AggregateOp::Count {
            return Err(ExecutionError::InvalidArgument(format!(
                "string aggregation supports only count, got {op}"
            )));
        }
        Ok(StringAggregator {
            grouping,
            agg_field,
            groups: HashMap::new(),
        })
    }

    pub fn merge(&mut self, tuple: &Tuple) -> Result<(), ExecutionError> {
        let value = match tuple.field(self.agg_field) {
            Some(Field::Text(v)) => v.clone(),
            Some(other) => {
                return Err(ExecutionError::InvalidArgument(format!(
                    "aggregate field {} is {:?}, expected text",
                    self.agg_field,
                    other.field_type()
                )))
            }
            None => {
                return Err(ExecutionError::InvalidArgument(format!(
                    "tuple has no aggregate field at index {}",
                    self.agg_field
                )))
            }
        };
        let key = group_key(self.grouping, tuple)?;
        self.groups.entry(key).or_default().push(value);
        Ok(())
    }

    pub fn iterator(&self) -> Result<AggregateIter, ExecutionError> {
        let desc = output_desc(self.grouping);
        let mut rows = Vec::with_capacity(self.groups.len());
        for (key, values) in &self.groups {
            rows.push(output_tuple(&desc, key, values.len() as i32)?);
        }
        Ok(AggregateIter::new(desc, rows))
    }
}

/// A materialized iterator over aggregate results. Rewinding replays the
/// same rows in the same order.
pub struct AggregateIter {
    desc: TupleDesc,
    rows: Vec<Tuple>,
    cursor: usize,
    is_open: bool,
}

impl AggregateIter {
    fn new(desc: TupleDesc, rows: Vec<Tuple>) -> Self {
        AggregateIter {
            desc,
            rows,
            cursor: 0,
            is_open: false,
        }
    }
}

impl OpIterator for AggregateIter {
    fn open(&mut self) -> Result<(), ExecutionError> {
        self.is_open = true;
        self.cursor = 0;
        Ok(())
    }

    fn has_next(&mut self) -> Result<bool, ExecutionError> {
        Ok(self.is_open && self.cursor < self.rows.len())
    }

    fn next(&mut self) -> Result<Tuple, ExecutionError> {
        if !self.is_open || self.cursor >= self.rows.len() {
            return Err(ExecutionError::NoSuchElement);
        }
        let tuple = self.rows[self.cursor].clone();
        self.cursor += 1;
        Ok(tuple)
    }

    fn rewind(&mut self) -> Result<(), ExecutionError> {
        self.close();
        self.open()
    }

    fn tuple_desc(&self) -> TupleDesc {
        self.desc.clone()
    }

    fn close(&mut self) {
        self.is_open = false;
        self.cursor = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_int_desc() -> TupleDesc {
        TupleDesc::new(vec![FieldType::Text, FieldType::Int])
    }

    fn row(group: &str, value: i32) -> Tuple {
        Tuple::new(
            text_int_desc(),
            vec![Field::Text(group.to_string()), Field::Int(value)],
        )
        .unwrap()
    }

    fn grouped_by_text() -> Option<GroupBy> {
        Some(GroupBy {
            field: 0,
            field_type: FieldType::Text,
        })
    }

    fn collect(iter: &mut AggregateIter) -> Vec<Vec<Field>> {
        iter.open().unwrap();
        let mut rows = Vec::new();
        while iter.has_next().unwrap() {
            rows.push(iter.next().unwrap().fields().to_vec());
        }
        rows
    }

    #[test]
    fn grouped_avg_truncates_toward_zero() {
        let mut agg = IntegerAggregator::new(grouped_by_text(), 1, AggregateOp::Avg);
        for (group, value) in [("a", 2), ("a", 4), ("b", 6), ("b", -7)] {
            agg.merge(&row(group, value)).unwrap();
        }

        let mut rows = collect(&mut agg.iterator().unwrap());
        rows.sort_by(|a, b| format!("{:?}", a).cmp(&format!("{:?}", b)));
        assert_eq!(
            rows,
            vec![
                vec![Field::Text("a".to_string()), Field::Int(3)],
                // (6 + -7) / 2 = -1 / 2 truncates to 0.
                vec![Field::Text("b".to_string()), Field::Int(0)],
            ]
        );
    }

    #[test]
    fn ungrouped_sum_and_count_collapse_to_one_row() {
        let mut sum = IntegerAggregator::new(None, 1, AggregateOp::Sum);
        let mut count = IntegerAggregator::new(None, 1, AggregateOp::Count);
        for value in [2, 4, 6] {
            sum.merge(&row("ignored", value)).unwrap();
            count.merge(&row("ignored", value)).unwrap();
        }

        assert_eq!(
            collect(&mut sum.iterator().unwrap()),
            vec![vec![Field::Int(12)]]
        );
        assert_eq!(
            collect(&mut count.iterator().unwrap()),
            vec![vec![Field::Int(3)]]
        );
    }

    #[test]
    fn min_and_max_pick_the_extremes() {
        let mut min = IntegerAggregator::new(None, 1, AggregateOp::Min);
        let mut max = IntegerAggregator::new(None, 1, AggregateOp::Max);
        for value in [5, -3, 9] {
            min.merge(&row("g", value)).unwrap();
            max.merge(&row("g", value)).unwrap();
        }
        assert_eq!(collect(&mut min.iterator().unwrap()), vec![vec![Field::Int(-3)]]);
        assert_eq!(collect(&mut max.iterator().unwrap()), vec![vec![Field::Int(9)]]);
    }

    #[test]
    fn sum_wraps_silently() {
        let mut agg = IntegerAggregator::new(None, 1, AggregateOp::Sum);
        agg.merge(&row("g", i32::MAX)).unwrap();
        agg.merge(&row("g", 1)).unwrap();
        assert_eq!(
            collect(&mut agg.iterator().unwrap()),
            vec![vec![Field::Int(i32::MIN)]]
        );
    }

    #[test]
    fn merging_a_text_field_as_integer_is_rejected() {
        let mut agg = IntegerAggregator::new(None, 0, AggregateOp::Sum);
        assert!(matches!(
            agg.merge(&row("not-an-int", 1)),
            Err(ExecutionError::InvalidArgument(_))
        ));
    }

    #[test]
    fn rewind_replays_the_same_snapshot() {
        let mut agg = IntegerAggregator::new(grouped_by_text(), 1, AggregateOp::Count);
        for group in ["a", "b", "c"] {
            agg.merge(&row(group, 1)).unwrap();
        }

        let mut iter = agg.iterator().unwrap();
        let first = collect(&mut iter);
        iter.rewind().unwrap();
        let mut second = Vec::new();
        while iter.has_next().unwrap() {
            second.push(iter.next().unwrap().fields().to_vec());
        }
        assert_eq!(first, second);

        iter.close();
        assert!(!iter.has_next().unwrap());
        assert!(matches!(iter.next(), Err(ExecutionError::NoSuchElement)));
    }

    #[test]
    fn string_aggregator_counts_per_group() {
        let mut agg =
            StringAggregator::new(grouped_by_text(), 0, AggregateOp::Count).unwrap();
        for group in ["a", "a", "b"] {
            agg.merge(&row(group, 0)).unwrap();
        }

        let mut rows = collect(&mut agg.iterator().unwrap());
        rows.sort_by(|a, b| format!("{:?}", a).cmp(&format!("{:?}", b)));
        assert_eq!(
            rows,
            vec![
                vec![Field::Text("a".to_string()), Field::Int(2)],
                vec![Field::Text("b".to_string()), Field::Int(1)],
            ]
        );
    }

    #[test]
    fn string_aggregator_rejects_everything_but_count() {
        for op in [
            AggregateOp::Sum,
            AggregateOp::Avg,
            AggregateOp::Min,
            AggregateOp::Max,
        ] {
            assert!(matches!(
                StringAggregator::new(None, 0, op),
                Err(ExecutionError::InvalidArgument(_))
            ));
        }
    }

    #[test]
    fn output_schema_follows_the_grouping() {
        let grouped = IntegerAggregator::new(grouped_by_text(), 1, AggregateOp::Sum);
        assert_eq!(
            grouped.iterator().unwrap().tuple_desc(),
            TupleDesc::new(vec![FieldType::Text, FieldType::Int])
        );

        let flat = IntegerAggregator::new(None, 1, AggregateOp::Sum);
        assert_eq!(
            flat.iterator().unwrap().tuple_desc(),
            TupleDesc::new(vec![FieldType::Int])
        );
    }
}
