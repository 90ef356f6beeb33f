use crate::arena::Arena;
use crate::dimension::{DimensionId, DimensionState, Projector};
use crate::error::{IndexError, IndexResult};
use crate::group::{GroupEntry, GroupId, GroupScope, GroupState};
use crate::record::{ResultData, RowRecord};
use crate::reducer::Reducer;
use crate::selection::FilterSelection;
use crate::value::Value;
use std::fmt;
use std::sync::Arc;

/// Upper bound on live dimensions per index (one rejection bit each).
pub const MAX_DIMENSIONS: usize = 64;

/// An in-memory multidimensional index over row records.
///
/// The index owns every dimension and group derived from it. Each record carries a bitmask of
/// the dimensions whose filter currently rejects it; a group folds a record into its aggregates
/// when none of the dimensions it observes reject it. Filter changes only touch the records
/// whose pass/fail state flipped, so groups are maintained incrementally.
pub struct DimensionalIndex {
    columns: Arc<[String]>,
    records: Vec<RowRecord>,
    rejected: Vec<u64>,
    dimensions: Arena<DimensionState>,
    groups: Arena<GroupState>,
    used_bits: u64,
    dimension_limit: usize,
}

impl fmt::Debug for DimensionalIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DimensionalIndex")
            .field("columns", &self.columns)
            .field("records", &self.records.len())
            .field("dimensions", &self.dimensions.len())
            .field("groups", &self.groups.len())
            .finish()
    }
}

impl DimensionalIndex {
    /// Build an index over `records`, all of which must have `columns.len()` values. O(n).
    pub fn new(columns: impl Into<Arc<[String]>>, records: Vec<RowRecord>) -> IndexResult<Self> {
        let columns = columns.into();
        for record in &records {
            if record.values().len() != columns.len() {
                return Err(IndexError::SchemaMismatch {
                    expected: columns.len(),
                    actual: record.values().len(),
                });
            }
        }

        Ok(Self {
            columns,
            rejected: vec![0; records.len()],
            records,
            dimensions: Arena::default(),
            groups: Arena::default(),
            used_bits: 0,
            dimension_limit: MAX_DIMENSIONS,
        })
    }

    /// Normalize a query result into records and index them.
    pub fn from_result(data: ResultData) -> IndexResult<Self> {
        let columns: Arc<[String]> = Arc::from(data.columns.clone());
        let records = data.into_records()?;
        Self::new(columns, records)
    }

    /// Index records that share one column list (the first record's).
    pub fn from_records(records: Vec<RowRecord>) -> IndexResult<Self> {
        let columns = records
            .first()
            .map(|r| Arc::clone(r.shared_columns()))
            .unwrap_or_else(|| Arc::from(Vec::<String>::new()));
        Self::new(columns, records)
    }

    /// Lower the live-dimension cap (clamped to [`MAX_DIMENSIONS`]).
    pub fn with_dimension_limit(mut self, limit: usize) -> Self {
        self.dimension_limit = limit.min(MAX_DIMENSIONS);
        self
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn size(&self) -> usize {
        self.records.len()
    }

    pub fn records(&self) -> &[RowRecord] {
        &self.records
    }

    pub fn live_dimensions(&self) -> usize {
        self.dimensions.len()
    }

    pub fn live_groups(&self) -> usize {
        self.groups.len()
    }

    /// Number of records that pass every active filter.
    pub fn filtered_len(&self) -> usize {
        self.rejected.iter().filter(|mask| **mask == 0).count()
    }

    /// Records that pass every active filter, in insertion order.
    pub fn filtered_records(&self) -> Vec<&RowRecord> {
        self.records
            .iter()
            .zip(&self.rejected)
            .filter(|(_, mask)| **mask == 0)
            .map(|(record, _)| record)
            .collect()
    }

    /// Derive a new dimension. Equivalent projectors still produce independent dimensions.
    pub fn dimension(&mut self, projector: Projector) -> IndexResult<DimensionId> {
        let projector = projector.bind(&self.columns)?;
        if self.dimensions.len() >= self.dimension_limit {
            return Err(IndexError::DimensionLimit {
                limit: self.dimension_limit,
            });
        }
        let bit = (!self.used_bits).trailing_zeros() as u8;
        self.used_bits |= 1u64 << bit;

        let state = DimensionState::build(bit, projector, &self.records);
        let id = DimensionId(self.dimensions.insert(state));
        log::debug!("created dimension {id:?} (bit {bit}) over {} records", self.records.len());
        Ok(id)
    }

    pub fn is_live_dimension(&self, dimension: DimensionId) -> bool {
        self.dimensions.contains(dimension.0)
    }

    pub fn is_live_group(&self, group: GroupId) -> bool {
        self.groups.contains(group.0)
    }

    /// Derive a group over `dimension` with the default scope ([`GroupScope::AllFilters`]).
    pub fn group(&mut self, dimension: DimensionId, reducer: Reducer) -> IndexResult<GroupId> {
        self.group_with_scope(dimension, reducer, GroupScope::default())
    }

    pub fn group_with_scope(
        &mut self,
        dimension: DimensionId,
        reducer: Reducer,
        scope: GroupScope,
    ) -> IndexResult<GroupId> {
        let reducer = reducer.bind(&self.columns)?;
        let dim = self
            .dimensions
            .get(dimension.0)
            .ok_or_else(IndexError::disposed_dimension)?;

        let mut state = GroupState::new(dimension, dim.mask(), reducer, scope);
        for ((record, key), rejected) in self.records.iter().zip(&dim.keys).zip(&self.rejected) {
            if state.admits(*rejected) {
                state.fold_in(key, record);
            } else {
                state.ensure_bin(key);
            }
        }

        let id = GroupId(self.groups.insert(state));
        if let Some(dim) = self.dimensions.get_mut(dimension.0) {
            dim.groups.push(id);
        }
        Ok(id)
    }

    /// Current selection of `dimension`.
    pub fn selection(&self, dimension: DimensionId) -> IndexResult<&FilterSelection> {
        self.dimensions
            .get(dimension.0)
            .map(|dim| &dim.selection)
            .ok_or_else(IndexError::disposed_dimension)
    }

    /// Apply `selection` to `dimension`; an empty selection clears the filter.
    ///
    /// Returns how many records changed pass/fail state on this dimension.
    pub fn filter(&mut self, dimension: DimensionId, selection: &FilterSelection) -> IndexResult<usize> {
        let dim = self
            .dimensions
            .get(dimension.0)
            .ok_or_else(IndexError::disposed_dimension)?;
        let passes = dim.evaluate(selection);
        let mask = dim.mask();

        let changed: Vec<usize> = dim.passes.iter_changed(&passes).collect();
        for &row in &changed {
            let before = self.rejected[row];
            let after = before ^ mask;
            self.rejected[row] = after;

            let record = &self.records[row];
            for (_, group) in self.groups.iter_mut() {
                let Some(group_dim) = self.dimensions.get(group.dimension.0) else {
                    continue;
                };
                let key = &group_dim.keys[row];
                group.update(key, record, before, after);
            }
        }

        if let Some(dim) = self.dimensions.get_mut(dimension.0) {
            dim.passes = passes;
            dim.selection = selection.clone();
        }
        log::trace!("filter on {dimension:?} flipped {} records", changed.len());
        Ok(changed.len())
    }

    pub fn clear_filter(&mut self, dimension: DimensionId) -> IndexResult<usize> {
        self.filter(dimension, &FilterSelection::new())
    }

    /// Release a dimension: its filter is cleared and every group built on it is disposed.
    pub fn dispose_dimension(&mut self, dimension: DimensionId) -> IndexResult<()> {
        self.clear_filter(dimension)?;
        let Some(dim) = self.dimensions.remove(dimension.0) else {
            return Err(IndexError::disposed_dimension());
        };
        for group in &dim.groups {
            self.groups.remove(group.0);
        }
        self.used_bits &= !dim.mask();
        log::debug!(
            "disposed dimension {dimension:?} with {} group(s)",
            dim.groups.len()
        );
        Ok(())
    }

    pub fn dispose_group(&mut self, group: GroupId) -> IndexResult<()> {
        let state = self
            .groups
            .remove(group.0)
            .ok_or_else(IndexError::disposed_group)?;
        if let Some(dim) = self.dimensions.get_mut(state.dimension.0) {
            dim.groups.retain(|g| *g != group);
        }
        Ok(())
    }

    /// Dispose every dimension (and with them every group).
    pub fn dispose_all(&mut self) {
        for id in self.dimensions.ids() {
            if let Err(err) = self.dispose_dimension(DimensionId(id)) {
                log::warn!("failed to dispose dimension {id:?}: {err}");
            }
        }
    }

    /// Every key of the group's dimension with its aggregate, ordered by key. Keys with no
    /// passing record report the reducer's initial value.
    pub fn all(&self, group: GroupId) -> IndexResult<Vec<GroupEntry>> {
        Ok(self.group_state(group)?.entries())
    }

    /// Like [`all`](Self::all), restricted to keys with at least one passing record.
    pub fn non_empty(&self, group: GroupId) -> IndexResult<Vec<GroupEntry>> {
        let state = self.group_state(group)?;
        Ok(state
            .bins
            .iter()
            .filter(|(_, bin)| bin.count > 0)
            .map(|(key, bin)| GroupEntry {
                key: key.clone(),
                value: bin.value.clone(),
            })
            .collect())
    }

    /// The `k` entries with the largest aggregates; ties keep key order.
    pub fn top(&self, group: GroupId, k: usize) -> IndexResult<Vec<GroupEntry>> {
        let mut entries = self.all(group)?;
        entries.sort_by(|a, b| b.value.cmp(&a.value));
        entries.truncate(k);
        Ok(entries)
    }

    pub fn value(&self, group: GroupId, key: &Value) -> IndexResult<Option<Value>> {
        let state = self.group_state(group)?;
        Ok(state.bins.get(key).map(|bin| bin.value.clone()))
    }

    /// Number of distinct keys in the group.
    pub fn group_size(&self, group: GroupId) -> IndexResult<usize> {
        Ok(self.group_state(group)?.bins.len())
    }

    /// Distinct keys of a dimension in ascending order.
    pub fn keys(&self, dimension: DimensionId) -> IndexResult<Vec<Value>> {
        self.dimensions
            .get(dimension.0)
            .map(|dim| dim.distinct_keys())
            .ok_or_else(IndexError::disposed_dimension)
    }

    /// Append records. Every dimension evaluates its current selection on them and every group
    /// folds them in.
    pub fn add(&mut self, records: Vec<RowRecord>) -> IndexResult<()> {
        for record in &records {
            if record.values().len() != self.columns.len() {
                return Err(IndexError::SchemaMismatch {
                    expected: self.columns.len(),
                    actual: record.values().len(),
                });
            }
        }

        let start = self.records.len();
        for (_, dim) in self.dimensions.iter_mut() {
            dim.extend(&records);
        }
        self.records.extend(records);

        for row in start..self.records.len() {
            let mut mask = 0u64;
            for (_, dim) in self.dimensions.iter() {
                if !dim.passes.get(row) {
                    mask |= dim.mask();
                }
            }
            self.rejected.push(mask);

            let record = &self.records[row];
            for (_, group) in self.groups.iter_mut() {
                let Some(dim) = self.dimensions.get(group.dimension.0) else {
                    continue;
                };
                let key = &dim.keys[row];
                if group.admits(mask) {
                    group.fold_in(key, record);
                } else {
                    group.ensure_bin(key);
                }
            }
        }
        log::debug!("added {} records to index", self.records.len() - start);
        Ok(())
    }

    fn group_state(&self, group: GroupId) -> IndexResult<&GroupState> {
        self.groups
            .get(group.0)
            .ok_or_else(IndexError::disposed_group)
    }
}
