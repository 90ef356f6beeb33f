use crate::config::WidgetId;
use crossfilter_index::{FilterKey, FilterSelection, Value};

/// Lifecycle of the source widget's filter state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CoordinatorState {
    /// No shared dimension registered yet; selections are rejected.
    Unbound,
    /// Bound to the shared dimension with an empty selection.
    Idle,
    /// Bound with at least one selected key.
    Filtering,
}

/// Filter state of one cross-filter source widget.
///
/// The coordinator only tracks the selection; the registry applies it to the shared dimension
/// after every change.
#[derive(Clone, Debug)]
pub struct FilterCoordinator {
    widget: WidgetId,
    selection: FilterSelection,
    bound: bool,
}

impl FilterCoordinator {
    pub fn new(widget: WidgetId) -> Self {
        Self {
            widget,
            selection: FilterSelection::new(),
            bound: false,
        }
    }

    pub fn widget(&self) -> WidgetId {
        self.widget
    }

    pub fn state(&self) -> CoordinatorState {
        match (self.bound, self.selection.is_empty()) {
            (false, _) => CoordinatorState::Unbound,
            (true, true) => CoordinatorState::Idle,
            (true, false) => CoordinatorState::Filtering,
        }
    }

    pub fn selection(&self) -> &FilterSelection {
        &self.selection
    }

    pub(crate) fn bind(&mut self) {
        self.bound = true;
    }

    /// Back to `Unbound`; the selection is dropped with the dimension it applied to.
    pub(crate) fn unbind(&mut self) {
        self.bound = false;
        self.selection.clear();
    }

    /// Toggle `key`. Returns whether it is selected afterwards.
    pub(crate) fn toggle(&mut self, key: FilterKey) -> bool {
        self.selection.toggle(key)
    }

    pub(crate) fn toggle_all(&mut self, keys: impl IntoIterator<Item = FilterKey>) {
        self.selection.toggle_all(keys);
    }

    pub(crate) fn reset(&mut self) {
        self.selection.clear();
    }

    /// With no key: is any filter active. With a key: is that exact key selected.
    pub fn has_filter(&self, key: Option<&Value>) -> bool {
        match key {
            None => !self.selection.is_empty(),
            Some(key) => self.selection.contains_value(key),
        }
    }

    /// Whether the chart should offer a reset control.
    pub fn show_reset(&self) -> bool {
        self.state() == CoordinatorState::Filtering
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn states_follow_binding_and_selection() {
        let mut coordinator = FilterCoordinator::new(WidgetId(1));
        assert_eq!(coordinator.state(), CoordinatorState::Unbound);
        coordinator.bind();
        assert_eq!(coordinator.state(), CoordinatorState::Idle);
        coordinator.toggle(FilterKey::exact("West"));
        assert_eq!(coordinator.state(), CoordinatorState::Filtering);
        assert!(coordinator.show_reset());
        coordinator.unbind();
        assert_eq!(coordinator.state(), CoordinatorState::Unbound);
        assert!(!coordinator.has_filter(None));
    }

    #[test]
    fn has_filter_distinguishes_any_and_specific_keys() {
        let mut coordinator = FilterCoordinator::new(WidgetId(1));
        coordinator.bind();
        coordinator.toggle_all([FilterKey::exact("West"), FilterKey::exact("East")]);
        assert!(coordinator.has_filter(None));
        assert!(coordinator.has_filter(Some(&Value::from("East"))));
        assert!(!coordinator.has_filter(Some(&Value::from("North"))));
        coordinator.reset();
        assert_eq!(coordinator.state(), CoordinatorState::Idle);
    }
}
