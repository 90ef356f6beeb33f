use crate::broadcast::{Generation, RedrawBroadcaster, RedrawEvent, RenderStamp, SubscriptionId};
use crate::config::{ChartBinding, CrossFilterParameter, DashboardConfig, SessionOptions, WidgetId};
use crate::error::{CrossFilterError, CrossFilterResult};
use crate::identity::{IdentityResolver, QueryCatalog, QueryIdentity};
use crate::registry::{
    CrossFilterGroup, FetchTicket, GroupEpoch, GroupRegistry, ReconcileReport,
};
use crossfilter_index::{
    DimensionalIndex, FilterKey, GroupId, GroupScope, ResultData, Value, MAX_DIMENSIONS,
};
use std::fmt;

/// A widget's reference to a group: the identity plus the incarnation it was resolved against.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroupHandle {
    pub identity: QueryIdentity,
    pub epoch: GroupEpoch,
}

/// How a widget takes part in cross-filtering, resolved once per render pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum WidgetRole {
    /// Builds the shared index and owns the filter selection.
    Source(GroupHandle),
    /// Reads the shared index of a group it does not control.
    Consumer(GroupHandle),
    /// Renders from its own data only.
    #[default]
    Unbound,
}

impl WidgetRole {
    pub fn handle(&self) -> Option<&GroupHandle> {
        match self {
            WidgetRole::Source(handle) | WidgetRole::Consumer(handle) => Some(handle),
            WidgetRole::Unbound => None,
        }
    }

    pub fn is_source(&self) -> bool {
        matches!(self, WidgetRole::Source(_))
    }
}

/// Cross-filter state of one mounted dashboard.
///
/// Created on dashboard mount and torn down on unmount. Sessions share nothing, so any number
/// of dashboards (or tests) can run side by side.
pub struct CrossFilterSession {
    catalog: Box<dyn QueryCatalog>,
    resolver: IdentityResolver,
    registry: GroupRegistry,
    broadcaster: RedrawBroadcaster,
    options: SessionOptions,
    active: Option<QueryIdentity>,
}

impl fmt::Debug for CrossFilterSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrossFilterSession")
            .field("registry", &self.registry)
            .field("broadcaster", &self.broadcaster)
            .field("options", &self.options)
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}

impl CrossFilterSession {
    pub fn new(catalog: impl QueryCatalog + 'static, options: SessionOptions) -> Self {
        let limit = options.max_dimensions_per_index.min(MAX_DIMENSIONS);
        Self {
            catalog: Box::new(catalog),
            resolver: IdentityResolver::new(options.normalize_whitespace),
            registry: GroupRegistry::new(limit),
            broadcaster: RedrawBroadcaster::new(),
            options,
            active: None,
        }
    }

    /// A session for `config`, already reconciled against every card it lists.
    pub fn from_config(config: DashboardConfig, options: SessionOptions) -> Self {
        let mut session = Self::new(DashboardConfig::default(), options);
        session.reconcile_dashboard(config);
        session
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Scope of the group a source widget registers.
    pub fn source_scope(&self) -> GroupScope {
        if self.options.source_observes_own_filter {
            GroupScope::AllFilters
        } else {
            GroupScope::IgnoreOwnFilter
        }
    }

    /// Replace the query metadata used for identity resolution. Takes effect on the next
    /// reconcile.
    pub fn set_catalog(&mut self, catalog: impl QueryCatalog + 'static) {
        self.catalog = Box::new(catalog);
    }

    pub fn identity_of(&self, widget: WidgetId) -> Option<QueryIdentity> {
        self.resolver.resolve(self.catalog.as_ref(), widget)
    }

    /// Bring groups in line with the current parameters and mounted widgets. Must run on every
    /// dashboard change; repeated calls with unchanged inputs mutate nothing.
    pub fn reconcile(
        &mut self,
        parameters: &[CrossFilterParameter],
        widgets: &[WidgetId],
    ) -> ReconcileReport {
        let catalog = self.catalog.as_ref();
        let resolver = &self.resolver;
        let report = self
            .registry
            .reconcile(parameters, widgets, |widget| resolver.resolve(catalog, widget));

        for identity in &report.removed {
            self.broadcaster.forget_identity(identity);
            if self.active.as_ref() == Some(identity) {
                self.active = None;
            }
        }
        report
    }

    /// Reconcile against a full dashboard definition: its cards become both the catalog and
    /// the mounted widget roster.
    pub fn reconcile_dashboard(&mut self, config: DashboardConfig) -> ReconcileReport {
        let parameters = config.crossfilter_parameters();
        let widgets: Vec<WidgetId> = config.cards.iter().map(|card| card.id).collect();
        self.set_catalog(config);
        self.reconcile(&parameters, &widgets)
    }

    pub fn is_source(&self, widget: WidgetId) -> bool {
        self.registry.is_source(widget)
    }

    pub fn role_of(&self, widget: WidgetId) -> WidgetRole {
        let Some(group) = self.registry.group_of(widget) else {
            return WidgetRole::Unbound;
        };
        let handle = GroupHandle {
            identity: group.identity().clone(),
            epoch: group.epoch(),
        };
        if group.source() == widget {
            WidgetRole::Source(handle)
        } else {
            WidgetRole::Consumer(handle)
        }
    }

    pub fn get_group(&self, identity: &QueryIdentity) -> Option<&CrossFilterGroup> {
        self.registry.get_group(identity)
    }

    /// The shared index of a ready or building group.
    pub fn index(&self, identity: &QueryIdentity) -> Option<&DimensionalIndex> {
        self.registry.get_group(identity)?.index()
    }

    pub fn registry(&self) -> &GroupRegistry {
        &self.registry
    }

    pub fn begin_fetch(&mut self, widget: WidgetId) -> Option<FetchTicket> {
        self.registry.begin_fetch(widget)
    }

    pub fn fetch_failed(&mut self, ticket: &FetchTicket) {
        self.registry.fetch_failed(ticket);
    }

    pub fn build_index(&mut self, ticket: &FetchTicket, data: ResultData) -> CrossFilterResult<bool> {
        self.registry.build_index(ticket, data)
    }

    /// Build and publish the source's dimension and group, then redraw so consumers switch to
    /// them. Returns whether a new view was registered.
    pub fn register_dimension_and_group(
        &mut self,
        identity: &QueryIdentity,
        widget: WidgetId,
        binding: &ChartBinding,
    ) -> CrossFilterResult<bool> {
        let scope = self.source_scope();
        let registered = self
            .registry
            .register_dimension_and_group(identity, widget, binding, scope)?;
        if registered {
            self.broadcast_redraw(identity)?;
        }
        Ok(registered)
    }

    /// The group a member widget should read for `binding`.
    pub fn consumer_group(
        &mut self,
        widget: WidgetId,
        identity: &QueryIdentity,
        binding: &ChartBinding,
    ) -> CrossFilterResult<GroupId> {
        self.registry.consumer_group(identity, widget, binding)
    }

    /// Toggle `key` in the source's selection. Returns whether the key is selected afterwards.
    pub fn on_user_select(
        &mut self,
        widget: WidgetId,
        key: impl Into<FilterKey>,
    ) -> CrossFilterResult<bool> {
        let key = key.into();
        let mut selected = false;
        let identity = self
            .registry
            .apply_selection(widget, |coordinator| selected = coordinator.toggle(key))?;
        self.after_selection(identity)?;
        Ok(selected)
    }

    /// Replace the source's selection with the half-open range `lower..upper` (brush).
    pub fn on_user_select_range(
        &mut self,
        widget: WidgetId,
        lower: impl Into<Value>,
        upper: impl Into<Value>,
    ) -> CrossFilterResult<()> {
        let key = FilterKey::range(lower, upper)?;
        let identity = self.registry.apply_selection(widget, |coordinator| {
            coordinator.reset();
            coordinator.toggle(key);
        })?;
        self.after_selection(identity)
    }

    /// Toggle each key in order.
    pub fn on_user_select_all(
        &mut self,
        widget: WidgetId,
        keys: impl IntoIterator<Item = FilterKey>,
    ) -> CrossFilterResult<()> {
        let identity = self
            .registry
            .apply_selection(widget, |coordinator| coordinator.toggle_all(keys))?;
        self.after_selection(identity)
    }

    /// Clear the selection of the group `widget` is the source of.
    pub fn on_reset(&mut self, widget: WidgetId) -> CrossFilterResult<()> {
        let identity = self
            .registry
            .apply_selection(widget, |coordinator| coordinator.reset())?;
        self.after_selection(identity)
    }

    /// Clear every active selection on the dashboard.
    pub fn on_reset_all(&mut self) {
        for widget in self.registry.source_widgets() {
            if !self.has_filter(widget, None) {
                continue;
            }
            if let Err(err) = self.on_reset(widget) {
                debug_assert!(!err.is_disposed_handle(), "reset hit a disposed handle: {err}");
                log::warn!("resetting filter of {widget}: {err}");
            }
        }
        self.active = None;
    }

    fn after_selection(&mut self, identity: QueryIdentity) -> CrossFilterResult<()> {
        self.broadcast_redraw(&identity)?;
        self.active = Some(identity);
        Ok(())
    }

    /// With no key: does `widget`'s group have an active filter. With a key: is it selected.
    pub fn has_filter(&self, widget: WidgetId, key: Option<&Value>) -> bool {
        self.registry
            .coordinator(widget)
            .is_some_and(|coordinator| coordinator.has_filter(key))
    }

    pub fn show_reset(&self, widget: WidgetId) -> bool {
        self.registry
            .coordinator(widget)
            .is_some_and(|coordinator| coordinator.show_reset())
    }

    pub fn subscribe_redraw(
        &mut self,
        identity: QueryIdentity,
        callback: impl FnMut(&RedrawEvent) + 'static,
    ) -> SubscriptionId {
        self.broadcaster.subscribe(identity, callback)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.broadcaster.unsubscribe(id)
    }

    /// Advance the group's generation and notify its subscribers.
    pub fn broadcast_redraw(&mut self, identity: &QueryIdentity) -> CrossFilterResult<Generation> {
        let event = self.registry.broadcast_redraw(identity)?;
        self.broadcaster.notify(&event);
        Ok(event.stamp.generation)
    }

    /// Identity of the most recently filtered group.
    pub fn active_group(&self) -> Option<&QueryIdentity> {
        self.active.as_ref()
    }

    pub fn mark_rendered(&mut self, widget: WidgetId, identity: QueryIdentity, stamp: RenderStamp) {
        self.broadcaster.mark_seen(widget, identity, stamp);
    }

    /// Members of the group that have not rendered its current stamp.
    pub fn stale_widgets(&self, identity: &QueryIdentity) -> CrossFilterResult<Vec<WidgetId>> {
        let group = self
            .registry
            .get_group(identity)
            .ok_or_else(|| CrossFilterError::UnknownGroup(identity.clone()))?;
        Ok(self
            .broadcaster
            .stale_widgets(group.members(), group.stamp()))
    }

    /// A widget left the dashboard.
    pub fn unmount_widget(&mut self, widget: WidgetId) {
        let changed = self.registry.unmount(widget);
        self.broadcaster.forget_widget(widget);
        if !changed.is_empty() {
            log::debug!("{widget} unmounted from {} group(s)", changed.len());
        }
    }

    /// Dispose every group (dashboard unmount).
    pub fn teardown(&mut self) {
        for identity in self.registry.identities() {
            self.broadcaster.forget_identity(&identity);
        }
        self.registry.teardown();
        self.active = None;
    }
}

impl Drop for CrossFilterSession {
    fn drop(&mut self) {
        if !self.registry.is_empty() {
            self.teardown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::CardQuery;
    use std::collections::HashMap;

    fn catalog() -> HashMap<WidgetId, CardQuery> {
        HashMap::from([
            (WidgetId(1), CardQuery::native("SELECT region, sales FROM t")),
            (WidgetId(2), CardQuery::native("select region, sales from t")),
        ])
    }

    #[test]
    fn roles_follow_registry() {
        let mut session = CrossFilterSession::new(catalog(), SessionOptions::default());
        let parameters = [CrossFilterParameter::new("p", WidgetId(1))];
        session.reconcile(&parameters, &[WidgetId(1), WidgetId(2)]);

        assert!(session.role_of(WidgetId(1)).is_source());
        // Identity is case sensitive, so widget 2 is in no group.
        assert_eq!(session.role_of(WidgetId(2)), WidgetRole::Unbound);
        assert_eq!(session.role_of(WidgetId(3)), WidgetRole::Unbound);
    }

    #[test]
    fn source_scope_follows_options() {
        let options = SessionOptions {
            source_observes_own_filter: false,
            ..SessionOptions::default()
        };
        let session = CrossFilterSession::new(catalog(), options);
        assert_eq!(session.source_scope(), GroupScope::IgnoreOwnFilter);
    }
}
