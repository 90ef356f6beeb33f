use crate::arena::SlotId;
use crate::bitmap::BitVec;
use crate::error::IndexResult;
use crate::group::GroupId;
use crate::record::{ColumnRef, RowRecord};
use crate::selection::{FilterPlan, FilterSelection};
use crate::value::Value;
use std::fmt;
use std::sync::Arc;

type ProjectFn = Arc<dyn Fn(&RowRecord) -> Value + Send + Sync>;

/// Handle to a dimension owned by a [`DimensionalIndex`](crate::DimensionalIndex).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DimensionId(pub(crate) SlotId);

/// Maps a record to its dimension key. Must be a pure function of the record.
#[derive(Clone)]
pub enum Projector {
    Column(ColumnRef),
    Function(ProjectFn),
}

impl Projector {
    pub fn column(column: impl Into<ColumnRef>) -> Self {
        Projector::Column(column.into())
    }

    pub fn function(f: impl Fn(&RowRecord) -> Value + Send + Sync + 'static) -> Self {
        Projector::Function(Arc::new(f))
    }

    pub(crate) fn bind(&self, columns: &[String]) -> IndexResult<BoundProjector> {
        Ok(match self {
            Projector::Column(column) => BoundProjector::Position(column.position_in(columns)?),
            Projector::Function(f) => BoundProjector::Function(Arc::clone(f)),
        })
    }
}

impl fmt::Debug for Projector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Projector::Column(column) => f.debug_tuple("Column").field(column).finish(),
            Projector::Function(_) => f.write_str("Function"),
        }
    }
}

#[derive(Clone)]
pub(crate) enum BoundProjector {
    Position(usize),
    Function(ProjectFn),
}

impl BoundProjector {
    pub(crate) fn project(&self, record: &RowRecord) -> Value {
        match self {
            BoundProjector::Position(idx) => record.at(*idx).clone(),
            BoundProjector::Function(f) => f(record),
        }
    }
}

/// Index-internal state of one dimension.
pub(crate) struct DimensionState {
    /// Bit reserved in the index's per-record rejection masks.
    pub(crate) bit: u8,
    projector: BoundProjector,
    /// Key of every record, by record position.
    pub(crate) keys: Vec<Value>,
    /// Record positions ordered by key (ties by position).
    sorted: Vec<usize>,
    pub(crate) passes: BitVec,
    pub(crate) selection: FilterSelection,
    pub(crate) groups: Vec<GroupId>,
}

impl DimensionState {
    pub(crate) fn build(bit: u8, projector: BoundProjector, records: &[RowRecord]) -> Self {
        let keys: Vec<Value> = records.iter().map(|r| projector.project(r)).collect();
        let mut sorted: Vec<usize> = (0..keys.len()).collect();
        sorted.sort_by(|&a, &b| keys[a].cmp(&keys[b]).then(a.cmp(&b)));

        Self {
            bit,
            projector,
            passes: BitVec::with_len_all_true(keys.len()),
            keys,
            sorted,
            selection: FilterSelection::new(),
            groups: Vec::new(),
        }
    }

    pub(crate) fn mask(&self) -> u64 {
        1u64 << self.bit
    }

    /// Project newly appended records and evaluate the current selection on them.
    pub(crate) fn extend(&mut self, records: &[RowRecord]) {
        let start = self.keys.len();
        for record in records {
            let key = self.projector.project(record);
            self.passes.push(self.selection.matches(&key));
            self.keys.push(key);
        }
        self.sorted.extend(start..self.keys.len());
        let keys = &self.keys;
        self.sorted
            .sort_by(|&a, &b| keys[a].cmp(&keys[b]).then(a.cmp(&b)));
    }

    /// Which records pass `selection` on this dimension alone.
    pub(crate) fn evaluate(&self, selection: &FilterSelection) -> BitVec {
        let len = self.keys.len();
        match selection.plan() {
            FilterPlan::All => BitVec::with_len_all_true(len),
            FilterPlan::Exact(value) => {
                let lo = self.sorted.partition_point(|&i| &self.keys[i] < value);
                let hi = self.sorted.partition_point(|&i| &self.keys[i] <= value);
                self.mark(lo..hi)
            }
            FilterPlan::Range { lower, upper } => {
                let lo = self.sorted.partition_point(|&i| &self.keys[i] < lower);
                let hi = self.sorted.partition_point(|&i| &self.keys[i] < upper);
                self.mark(lo..hi.max(lo))
            }
            FilterPlan::AnyOf(selection) => {
                let mut passes = BitVec::with_len_all_false(len);
                let mut start = 0;
                while start < len {
                    let key = &self.keys[self.sorted[start]];
                    let mut end = start + 1;
                    while end < len && &self.keys[self.sorted[end]] == key {
                        end += 1;
                    }
                    if selection.matches(key) {
                        for &record in &self.sorted[start..end] {
                            passes.set(record, true);
                        }
                    }
                    start = end;
                }
                passes
            }
        }
    }

    fn mark(&self, sorted_range: std::ops::Range<usize>) -> BitVec {
        let mut passes = BitVec::with_len_all_false(self.keys.len());
        for &record in &self.sorted[sorted_range] {
            passes.set(record, true);
        }
        passes
    }

    /// Distinct keys in ascending order.
    pub(crate) fn distinct_keys(&self) -> Vec<Value> {
        let mut out: Vec<Value> = Vec::new();
        for &record in &self.sorted {
            let key = &self.keys[record];
            if out.last() != Some(key) {
                out.push(key.clone());
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::ResultData;
    use crate::selection::FilterKey;

    fn records() -> Vec<RowRecord> {
        ResultData::new(
            vec!["n"],
            vec![
                vec![Value::from(3.0)],
                vec![Value::from(1.0)],
                vec![Value::from(2.0)],
                vec![Value::from(1.0)],
                vec![Value::Null],
            ],
        )
        .into_records()
        .unwrap()
    }

    fn state() -> DimensionState {
        let records = records();
        let projector = Projector::column("n").bind(records[0].columns()).unwrap();
        DimensionState::build(0, projector, &records)
    }

    fn ones(bits: &BitVec) -> Vec<usize> {
        bits.iter_ones().collect()
    }

    #[test]
    fn exact_uses_sorted_run() {
        let dim = state();
        let selection = FilterSelection::from_keys([FilterKey::exact(1.0)]);
        assert_eq!(ones(&dim.evaluate(&selection)), vec![1, 3]);
    }

    #[test]
    fn range_is_half_open() {
        let dim = state();
        let selection = FilterSelection::from_keys([FilterKey::range(1.0, 3.0).unwrap()]);
        assert_eq!(ones(&dim.evaluate(&selection)), vec![1, 2, 3]);
    }

    #[test]
    fn any_of_unions_entries() {
        let dim = state();
        let selection = FilterSelection::from_keys([FilterKey::exact(3.0), FilterKey::exact(Value::Null)]);
        assert_eq!(ones(&dim.evaluate(&selection)), vec![0, 4]);
    }

    #[test]
    fn distinct_keys_are_sorted() {
        let dim = state();
        assert_eq!(
            dim.distinct_keys(),
            vec![Value::Null, Value::from(1.0), Value::from(2.0), Value::from(3.0)]
        );
    }
}
