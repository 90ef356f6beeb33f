use crate::arena::SlotId;
use crate::dimension::DimensionId;
use crate::record::RowRecord;
use crate::reducer::BoundReducer;
use crate::value::Value;
use serde::Serialize;
use std::collections::BTreeMap;

/// Handle to a group owned by a [`DimensionalIndex`](crate::DimensionalIndex).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupId(pub(crate) SlotId);

/// Which dimension filters a group observes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum GroupScope {
    /// Every filter on the index, including the one on the group's own dimension.
    #[default]
    AllFilters,
    /// Every filter except the group's own dimension, so the source chart keeps showing all of
    /// its keys while other charts narrow down.
    IgnoreOwnFilter,
}

/// One `(key, aggregate)` pair of a group.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GroupEntry {
    pub key: Value,
    pub value: Value,
}

#[derive(Clone, Debug)]
pub(crate) struct Bin {
    /// Records currently folded into `value`.
    pub(crate) count: usize,
    pub(crate) value: Value,
}

pub(crate) struct GroupState {
    pub(crate) dimension: DimensionId,
    reducer: BoundReducer,
    /// Rejection bits this group observes.
    observed: u64,
    pub(crate) bins: BTreeMap<Value, Bin>,
}

impl GroupState {
    pub(crate) fn new(
        dimension: DimensionId,
        dimension_mask: u64,
        reducer: BoundReducer,
        scope: GroupScope,
    ) -> Self {
        let observed = match scope {
            GroupScope::AllFilters => u64::MAX,
            GroupScope::IgnoreOwnFilter => !dimension_mask,
        };
        Self {
            dimension,
            reducer,
            observed,
            bins: BTreeMap::new(),
        }
    }

    /// Whether a record with the given rejection mask counts toward this group.
    pub(crate) fn admits(&self, rejected: u64) -> bool {
        rejected & self.observed == 0
    }

    /// Make sure `key` has a bin, even when none of its records currently count.
    pub(crate) fn ensure_bin(&mut self, key: &Value) {
        if !self.bins.contains_key(key) {
            self.bins.insert(
                key.clone(),
                Bin {
                    count: 0,
                    value: self.reducer.initial(),
                },
            );
        }
    }

    pub(crate) fn fold_in(&mut self, key: &Value, record: &RowRecord) {
        self.ensure_bin(key);
        if let Some(bin) = self.bins.get_mut(key) {
            let acc = std::mem::take(&mut bin.value);
            bin.value = self.reducer.add(acc, record);
            bin.count += 1;
        }
    }

    pub(crate) fn fold_out(&mut self, key: &Value, record: &RowRecord) {
        let Some(bin) = self.bins.get_mut(key) else {
            debug_assert!(false, "fold_out on a key without a bin");
            return;
        };
        if bin.count == 0 {
            debug_assert!(false, "fold_out on an empty bin");
            return;
        }
        bin.count -= 1;
        if bin.count == 0 {
            // An empty bin always holds the initial value.
            bin.value = self.reducer.initial();
        } else {
            let acc = std::mem::take(&mut bin.value);
            bin.value = self.reducer.remove(acc, record);
        }
    }

    /// Re-evaluate one record after its rejection mask changed.
    pub(crate) fn update(&mut self, key: &Value, record: &RowRecord, before: u64, after: u64) {
        match (self.admits(before), self.admits(after)) {
            (true, false) => self.fold_out(key, record),
            (false, true) => self.fold_in(key, record),
            _ => {}
        }
    }

    pub(crate) fn entries(&self) -> Vec<GroupEntry> {
        self.bins
            .iter()
            .map(|(key, bin)| GroupEntry {
                key: key.clone(),
                value: bin.value.clone(),
            })
            .collect()
    }
}
