use crate::error::{IndexError, IndexResult};
use crate::value::Value;
use std::fmt;
use std::sync::Arc;

type KeyTest = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// One entry of a [`FilterSelection`].
#[derive(Clone)]
pub enum FilterKey {
    /// Matches keys equal to the value.
    Exact(Value),
    /// Matches keys in the half-open interval `lower <= key < upper`.
    Range { lower: Value, upper: Value },
    /// Matches keys accepted by `test`. Two predicates are the same entry when their labels are
    /// equal.
    Predicate { label: Arc<str>, test: KeyTest },
}

impl FilterKey {
    pub fn exact(value: impl Into<Value>) -> Self {
        FilterKey::Exact(value.into())
    }

    pub fn range(lower: impl Into<Value>, upper: impl Into<Value>) -> IndexResult<Self> {
        let lower = lower.into();
        let upper = upper.into();
        if lower > upper {
            return Err(IndexError::InvalidRange { lower, upper });
        }
        Ok(FilterKey::Range { lower, upper })
    }

    pub fn predicate(
        label: impl Into<Arc<str>>,
        test: impl Fn(&Value) -> bool + Send + Sync + 'static,
    ) -> Self {
        FilterKey::Predicate {
            label: label.into(),
            test: Arc::new(test),
        }
    }

    pub fn matches(&self, key: &Value) -> bool {
        match self {
            FilterKey::Exact(value) => value == key,
            FilterKey::Range { lower, upper } => lower <= key && key < upper,
            FilterKey::Predicate { test, .. } => test(key),
        }
    }
}

impl PartialEq for FilterKey {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (FilterKey::Exact(a), FilterKey::Exact(b)) => a == b,
            (
                FilterKey::Range { lower, upper },
                FilterKey::Range {
                    lower: other_lower,
                    upper: other_upper,
                },
            ) => lower == other_lower && upper == other_upper,
            (FilterKey::Predicate { label, .. }, FilterKey::Predicate { label: other, .. }) => {
                label == other
            }
            _ => false,
        }
    }
}

impl fmt::Debug for FilterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterKey::Exact(value) => f.debug_tuple("Exact").field(value).finish(),
            FilterKey::Range { lower, upper } => f
                .debug_struct("Range")
                .field("lower", lower)
                .field("upper", upper)
                .finish(),
            FilterKey::Predicate { label, .. } => {
                f.debug_struct("Predicate").field("label", label).finish()
            }
        }
    }
}

impl From<Value> for FilterKey {
    fn from(value: Value) -> Self {
        FilterKey::Exact(value)
    }
}

/// How a selection is evaluated against a sorted dimension.
#[derive(Debug)]
pub(crate) enum FilterPlan<'a> {
    All,
    Exact(&'a Value),
    Range { lower: &'a Value, upper: &'a Value },
    AnyOf(&'a FilterSelection),
}

/// An ordered set of selected keys applied to a dimension.
///
/// An empty selection is "no filter". A non-empty selection matches a key when *any* entry
/// matches it; multiple entries are never intersected.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FilterSelection {
    entries: Vec<FilterKey>,
}

impl FilterSelection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_keys(keys: impl IntoIterator<Item = FilterKey>) -> Self {
        let mut selection = Self::new();
        for key in keys {
            selection.insert(key);
        }
        selection
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[FilterKey] {
        &self.entries
    }

    pub fn contains(&self, key: &FilterKey) -> bool {
        self.entries.contains(key)
    }

    /// Whether `value` itself is selected as an exact entry. Ranges containing the value do not
    /// count: only a click on that exact key selects it.
    pub fn contains_value(&self, value: &Value) -> bool {
        self.entries
            .iter()
            .any(|entry| matches!(entry, FilterKey::Exact(v) if v == value))
    }

    /// Add `key` unless an equal entry is already present. Returns whether it was added.
    pub fn insert(&mut self, key: FilterKey) -> bool {
        if self.contains(&key) {
            return false;
        }
        self.entries.push(key);
        true
    }

    pub fn remove(&mut self, key: &FilterKey) -> bool {
        match self.entries.iter().position(|entry| entry == key) {
            Some(idx) => {
                self.entries.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Remove `key` if present, add it otherwise. Returns whether it is selected afterwards.
    pub fn toggle(&mut self, key: FilterKey) -> bool {
        if self.remove(&key) {
            return false;
        }
        self.entries.push(key);
        true
    }

    /// Toggle each key in order.
    pub fn toggle_all(&mut self, keys: impl IntoIterator<Item = FilterKey>) {
        for key in keys {
            self.toggle(key);
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Existential match: exact entries are consulted first, then ranges, then predicates.
    pub fn matches(&self, key: &Value) -> bool {
        if self.entries.is_empty() {
            return true;
        }
        if self.contains_value(key) {
            return true;
        }
        self.entries
            .iter()
            .any(|entry| !matches!(entry, FilterKey::Exact(_)) && entry.matches(key))
    }

    pub(crate) fn plan(&self) -> FilterPlan<'_> {
        match self.entries.as_slice() {
            [] => FilterPlan::All,
            [FilterKey::Exact(value)] => FilterPlan::Exact(value),
            [FilterKey::Range { lower, upper }] => FilterPlan::Range { lower, upper },
            _ => FilterPlan::AnyOf(self),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toggle_twice_restores_selection() {
        let mut selection = FilterSelection::new();
        assert!(selection.toggle(FilterKey::exact("West")));
        assert!(!selection.toggle(FilterKey::exact("West")));
        assert!(selection.is_empty());
    }

    #[test]
    fn predicates_compare_by_label() {
        let a = FilterKey::predicate("even", |v| v.as_number().is_some_and(|n| n % 2.0 == 0.0));
        let b = FilterKey::predicate("even", |_| false);
        assert_eq!(a, b);
        let mut selection = FilterSelection::from_keys([a]);
        assert!(!selection.insert(b));
    }

    #[test]
    fn inverted_range_is_rejected() {
        assert!(matches!(
            FilterKey::range(5, 1),
            Err(IndexError::InvalidRange { .. })
        ));
    }

    #[test]
    fn plans_pick_fast_paths() {
        let single = FilterSelection::from_keys([FilterKey::exact(1)]);
        assert!(matches!(single.plan(), FilterPlan::Exact(_)));
        let range = FilterSelection::from_keys([FilterKey::range(1, 3).unwrap()]);
        assert!(matches!(range.plan(), FilterPlan::Range { .. }));
        let many = FilterSelection::from_keys([FilterKey::exact(1), FilterKey::exact(2)]);
        assert!(matches!(many.plan(), FilterPlan::AnyOf(_)));
        assert!(matches!(FilterSelection::new().plan(), FilterPlan::All));
    }
}
