//! The cross-filter group registry.
//!
//! The registry is the only owner of shared indexes, dimensions and groups. Widgets refer to a
//! group by its [`QueryIdentity`] and go through the registry for every read and write, so a
//! torn-down group can never be reached through a handle a widget forgot to release.

use crate::broadcast::{Generation, RedrawEvent, RenderStamp};
use crate::config::{ChartBinding, CrossFilterParameter, ParameterId, WidgetId};
use crate::coordinator::FilterCoordinator;
use crate::error::{CrossFilterError, CrossFilterResult};
use crate::identity::QueryIdentity;
use crossfilter_index::{
    DimensionId, DimensionalIndex, GroupId, GroupScope, Projector, ResultData, MAX_DIMENSIONS,
};
use std::collections::{BTreeSet, HashMap};

/// Incarnation counter: a group recreated under the same identity gets a new epoch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupEpoch(pub u64);

/// Proof that a source widget started loading data for a specific group incarnation.
///
/// Only the most recent ticket of a live group is honored by
/// [`GroupRegistry::build_index`]; anything else is a stale completion.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchTicket {
    identity: QueryIdentity,
    epoch: GroupEpoch,
    widget: WidgetId,
    serial: u64,
}

impl FetchTicket {
    pub fn identity(&self) -> &QueryIdentity {
        &self.identity
    }

    pub fn widget(&self) -> WidgetId {
        self.widget
    }

    pub fn epoch(&self) -> GroupEpoch {
        self.epoch
    }
}

/// The dimension and group a source widget registered on the shared index.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceView {
    pub dimension: DimensionId,
    pub group: GroupId,
    pub binding: ChartBinding,
    pub scope: GroupScope,
}

/// What a [`GroupRegistry::reconcile`] call changed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub created: Vec<QueryIdentity>,
    pub removed: Vec<QueryIdentity>,
    pub membership_changed: Vec<QueryIdentity>,
    /// Groups kept under a different parameter id (same identity and source).
    pub rebound: Vec<QueryIdentity>,
    /// Parameters whose source widget has no filterable query.
    pub unfilterable: Vec<ParameterId>,
}

impl ReconcileReport {
    /// True when nothing in the registry was mutated.
    pub fn is_noop(&self) -> bool {
        self.created.is_empty()
            && self.removed.is_empty()
            && self.membership_changed.is_empty()
            && self.rebound.is_empty()
    }
}

/// One shared data universe: every widget whose query resolves to `identity`.
#[derive(Debug)]
pub struct CrossFilterGroup {
    identity: QueryIdentity,
    epoch: GroupEpoch,
    parameter: ParameterId,
    source: WidgetId,
    members: BTreeSet<WidgetId>,
    generation: Generation,
    index: Option<DimensionalIndex>,
    shared: Option<SourceView>,
    /// Per-consumer dimensions for widgets that group by something other than the source.
    views: HashMap<WidgetId, (ChartBinding, DimensionId, GroupId)>,
    coordinator: FilterCoordinator,
    pending_fetch: Option<u64>,
}

impl CrossFilterGroup {
    fn new(identity: QueryIdentity, epoch: GroupEpoch, parameter: ParameterId, source: WidgetId) -> Self {
        Self {
            identity,
            epoch,
            parameter,
            source,
            members: BTreeSet::new(),
            generation: Generation::default(),
            index: None,
            shared: None,
            views: HashMap::new(),
            coordinator: FilterCoordinator::new(source),
            pending_fetch: None,
        }
    }

    pub fn identity(&self) -> &QueryIdentity {
        &self.identity
    }

    pub fn epoch(&self) -> GroupEpoch {
        self.epoch
    }

    pub fn parameter(&self) -> &ParameterId {
        &self.parameter
    }

    pub fn source(&self) -> WidgetId {
        self.source
    }

    pub fn members(&self) -> &BTreeSet<WidgetId> {
        &self.members
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn stamp(&self) -> RenderStamp {
        RenderStamp {
            epoch: self.epoch,
            generation: self.generation,
        }
    }

    pub fn index(&self) -> Option<&DimensionalIndex> {
        self.index.as_ref()
    }

    pub fn dimension(&self) -> Option<DimensionId> {
        self.shared.as_ref().map(|view| view.dimension)
    }

    pub fn group(&self) -> Option<GroupId> {
        self.shared.as_ref().map(|view| view.group)
    }

    pub fn source_view(&self) -> Option<&SourceView> {
        self.shared.as_ref()
    }

    /// Index built and the source's dimension/group registered. Until then consumers render
    /// their own unfiltered data.
    pub fn is_ready(&self) -> bool {
        self.index.is_some() && self.shared.is_some()
    }

    pub fn coordinator(&self) -> &FilterCoordinator {
        &self.coordinator
    }

    pub fn consumer_views(&self) -> usize {
        self.views.len()
    }

    fn release_view(&mut self, widget: WidgetId) {
        let Some((_, dimension, _)) = self.views.remove(&widget) else {
            return;
        };
        if let Some(index) = self.index.as_mut() {
            if let Err(err) = index.dispose_dimension(dimension) {
                debug_assert!(!err.is_disposed_handle(), "view of {widget} disposed twice");
                log::warn!("releasing view of {widget} in {}: {err}", self.identity);
            }
        }
    }

    /// Dispose every dimension and group, then drop the index.
    fn dispose(&mut self) {
        let widgets: Vec<WidgetId> = self.views.keys().copied().collect();
        for widget in widgets {
            self.release_view(widget);
        }
        if let Some(mut index) = self.index.take() {
            if let Some(shared) = self.shared.take() {
                if let Err(err) = index.dispose_dimension(shared.dimension) {
                    debug_assert!(!err.is_disposed_handle(), "shared dimension disposed twice");
                    log::warn!("disposing shared dimension of {}: {err}", self.identity);
                }
            }
            index.dispose_all();
            debug_assert_eq!(index.live_dimensions(), 0);
        }
        self.shared = None;
        self.pending_fetch = None;
        self.coordinator.unbind();
        log::debug!("tore down cross-filter group for {}", self.identity);
    }
}

#[derive(Debug)]
pub struct GroupRegistry {
    groups: HashMap<QueryIdentity, CrossFilterGroup>,
    sources: HashMap<WidgetId, QueryIdentity>,
    mounted: BTreeSet<WidgetId>,
    next_epoch: u64,
    next_fetch: u64,
    dimension_limit: usize,
}

impl Default for GroupRegistry {
    fn default() -> Self {
        Self::new(MAX_DIMENSIONS)
    }
}

impl GroupRegistry {
    pub fn new(dimension_limit: usize) -> Self {
        Self {
            groups: HashMap::new(),
            sources: HashMap::new(),
            mounted: BTreeSet::new(),
            next_epoch: 0,
            next_fetch: 0,
            dimension_limit,
        }
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Identities of live groups, sorted.
    pub fn identities(&self) -> Vec<QueryIdentity> {
        let mut out: Vec<QueryIdentity> = self.groups.keys().cloned().collect();
        out.sort();
        out
    }

    /// Bring the registry in line with the dashboard's current cross-filter parameters and
    /// mounted widgets.
    ///
    /// Creates an empty group for each new identity, tears down groups whose identity (or source
    /// widget) is gone, and recomputes membership. Calling it again with the same inputs
    /// mutates nothing.
    pub fn reconcile(
        &mut self,
        parameters: &[CrossFilterParameter],
        widgets: &[WidgetId],
        resolve: impl Fn(WidgetId) -> Option<QueryIdentity>,
    ) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        let mut desired: Vec<(QueryIdentity, &CrossFilterParameter)> = Vec::new();
        for parameter in parameters {
            let Some(identity) = resolve(parameter.card_id) else {
                let err = CrossFilterError::UnresolvableQuery {
                    widget: parameter.card_id,
                };
                log::warn!("skipping crossfilter parameter {}: {err}", parameter.id);
                report.unfilterable.push(parameter.id.clone());
                continue;
            };
            if let Some((_, first)) = desired.iter().find(|(id, _)| *id == identity) {
                if first.card_id != parameter.card_id {
                    log::debug!(
                        "parameter {} shares {identity} with parameter {}; {} stays the source",
                        parameter.id,
                        first.id,
                        first.card_id
                    );
                }
                continue;
            }
            desired.push((identity, parameter));
        }

        let mut stale: Vec<QueryIdentity> = self
            .groups
            .iter()
            .filter(|(identity, group)| {
                !desired
                    .iter()
                    .any(|(id, p)| id == *identity && p.card_id == group.source)
            })
            .map(|(identity, _)| identity.clone())
            .collect();
        stale.sort();
        for identity in stale {
            if let Some(mut group) = self.groups.remove(&identity) {
                group.dispose();
                report.removed.push(identity);
            }
        }

        for (identity, parameter) in &desired {
            match self.groups.get_mut(identity) {
                Some(group) => {
                    if group.parameter != parameter.id {
                        group.parameter = parameter.id.clone();
                        report.rebound.push(identity.clone());
                    }
                }
                None => {
                    let epoch = GroupEpoch(self.next_epoch);
                    self.next_epoch += 1;
                    log::debug!(
                        "created cross-filter group for {identity} with source {}",
                        parameter.card_id
                    );
                    self.groups.insert(
                        identity.clone(),
                        CrossFilterGroup::new(
                            identity.clone(),
                            epoch,
                            parameter.id.clone(),
                            parameter.card_id,
                        ),
                    );
                    report.created.push(identity.clone());
                }
            }
        }

        self.sources = desired
            .iter()
            .map(|(identity, parameter)| (parameter.card_id, identity.clone()))
            .collect();

        let mut members: HashMap<QueryIdentity, BTreeSet<WidgetId>> = HashMap::new();
        for widget in widgets {
            let Some(identity) = resolve(*widget) else {
                continue;
            };
            if self.groups.contains_key(&identity) {
                members.entry(identity).or_default().insert(*widget);
            }
        }
        for (identity, group) in self.groups.iter_mut() {
            let next = members.remove(identity).unwrap_or_default();
            if next == group.members {
                continue;
            }
            let departed: Vec<WidgetId> = group.members.difference(&next).copied().collect();
            for widget in departed {
                group.release_view(widget);
            }
            if !next.contains(&group.source) {
                group.pending_fetch = None;
            }
            group.members = next;
            report.membership_changed.push(identity.clone());
        }
        report.membership_changed.sort();
        self.mounted = widgets.iter().copied().collect();

        if !report.is_noop() {
            log::debug!(
                "reconciled cross-filter groups: {} created, {} removed, {} membership change(s)",
                report.created.len(),
                report.removed.len(),
                report.membership_changed.len()
            );
        }
        report
    }

    pub fn get_group(&self, identity: &QueryIdentity) -> Option<&CrossFilterGroup> {
        self.groups.get(identity)
    }

    /// The group `widget` belongs to, as source or member.
    pub fn group_of(&self, widget: WidgetId) -> Option<&CrossFilterGroup> {
        if let Some(identity) = self.sources.get(&widget) {
            return self.groups.get(identity);
        }
        self.groups
            .values()
            .find(|group| group.members.contains(&widget))
    }

    /// True iff `widget` is the designated source of a live group.
    pub fn is_source(&self, widget: WidgetId) -> bool {
        self.sources.contains_key(&widget)
    }

    /// Source widgets of every live group, sorted.
    pub fn source_widgets(&self) -> Vec<WidgetId> {
        let mut out: Vec<WidgetId> = self.sources.keys().copied().collect();
        out.sort();
        out
    }

    /// Start a data load for `widget`. Only the mounted source of a live group gets a ticket.
    pub fn begin_fetch(&mut self, widget: WidgetId) -> Option<FetchTicket> {
        if !self.mounted.contains(&widget) {
            return None;
        }
        let identity = self.sources.get(&widget)?;
        let group = self.groups.get_mut(identity)?;
        let serial = self.next_fetch;
        self.next_fetch += 1;
        group.pending_fetch = Some(serial);
        Some(FetchTicket {
            identity: identity.clone(),
            epoch: group.epoch,
            widget,
            serial,
        })
    }

    /// The load behind `ticket` failed; the group stays without an index.
    pub fn fetch_failed(&mut self, ticket: &FetchTicket) {
        if let Some(group) = self.groups.get_mut(&ticket.identity) {
            if group.epoch == ticket.epoch && group.pending_fetch == Some(ticket.serial) {
                group.pending_fetch = None;
            }
        }
        log::warn!("data load for {} failed; {} stays unfiltered", ticket.widget, ticket.identity);
    }

    /// Build the shared index from the source's loaded rows.
    ///
    /// Returns `Ok(false)` without rebuilding when the group already has an index. A ticket
    /// for a torn-down, recreated or superseded group is rejected as a stale completion.
    pub fn build_index(&mut self, ticket: &FetchTicket, data: ResultData) -> CrossFilterResult<bool> {
        let stale = || CrossFilterError::StaleAsyncCompletion {
            widget: ticket.widget,
            identity: ticket.identity.clone(),
        };
        let group = self.groups.get_mut(&ticket.identity).ok_or_else(stale)?;
        if group.epoch != ticket.epoch
            || group.source != ticket.widget
            || group.pending_fetch != Some(ticket.serial)
        {
            return Err(stale());
        }
        group.pending_fetch = None;

        if group.index.is_some() {
            log::debug!("index for {} already built; keeping it", ticket.identity);
            return Ok(false);
        }

        let index = DimensionalIndex::from_result(data)?.with_dimension_limit(self.dimension_limit);
        log::debug!(
            "built shared index for {} with {} rows",
            ticket.identity,
            index.size()
        );
        group.index = Some(index);
        Ok(true)
    }

    fn source_group_mut(
        &mut self,
        identity: &QueryIdentity,
        widget: WidgetId,
    ) -> CrossFilterResult<&mut CrossFilterGroup> {
        let group = self
            .groups
            .get_mut(identity)
            .ok_or_else(|| CrossFilterError::UnknownGroup(identity.clone()))?;
        if group.source != widget {
            return Err(CrossFilterError::PrematureMutation { widget });
        }
        Ok(group)
    }

    /// Build the source's dimension and group on the shared index and publish them to
    /// consumers. Returns `Ok(false)` when the group already publishes a view with the same
    /// binding and scope.
    ///
    /// A view with another binding replaces the previous one: its dimension (with its filter and
    /// every group on it) is disposed and the selection starts empty.
    pub fn register_dimension_and_group(
        &mut self,
        identity: &QueryIdentity,
        widget: WidgetId,
        binding: &ChartBinding,
        scope: GroupScope,
    ) -> CrossFilterResult<bool> {
        let group = self.source_group_mut(identity, widget)?;
        let index = group
            .index
            .as_mut()
            .ok_or_else(|| CrossFilterError::GroupNotReady(identity.clone()))?;

        if let Some(shared) = &group.shared {
            if shared.binding == *binding && shared.scope == scope {
                return Ok(false);
            }
        }

        let dimension = index.dimension(Projector::Column(binding.dimension.clone()))?;
        let view = match index.group_with_scope(dimension, binding.reducer(), scope) {
            Ok(view) => view,
            Err(err) => {
                index.dispose_dimension(dimension)?;
                return Err(err.into());
            }
        };

        if let Some(previous) = group.shared.take() {
            index.dispose_dimension(previous.dimension)?;
            group.coordinator.unbind();
            log::debug!("replaced source view for {identity}");
        }
        group.shared = Some(SourceView {
            dimension,
            group: view,
            binding: binding.clone(),
            scope,
        });
        group.coordinator.bind();
        log::debug!("registered source view for {identity}");
        Ok(true)
    }

    /// Let the source's coordinator change its selection, then apply it to the shared
    /// dimension. Returns the identity of the affected group.
    pub fn apply_selection(
        &mut self,
        widget: WidgetId,
        change: impl FnOnce(&mut FilterCoordinator),
    ) -> CrossFilterResult<QueryIdentity> {
        let identity = self
            .sources
            .get(&widget)
            .cloned()
            .ok_or(CrossFilterError::PrematureMutation { widget })?;
        let group = self.source_group_mut(&identity, widget)?;
        let (Some(index), Some(shared)) = (group.index.as_mut(), group.shared.as_ref()) else {
            return Err(CrossFilterError::GroupNotReady(identity));
        };

        let mut next = group.coordinator.clone();
        change(&mut next);
        let flipped = index.filter(shared.dimension, next.selection())?;
        log::debug!(
            "{widget} now selects {} key(s) in {identity}; {flipped} row(s) changed",
            next.selection().len()
        );
        group.coordinator = next;
        Ok(identity)
    }

    /// The source coordinator of the group `widget` is the source of.
    pub fn coordinator(&self, widget: WidgetId) -> Option<&FilterCoordinator> {
        let identity = self.sources.get(&widget)?;
        self.groups.get(identity).map(|group| &group.coordinator)
    }

    /// Group a member should read: the shared group when its binding matches the source's (and,
    /// for consumers, the shared group narrows under the source's own filter), otherwise a
    /// per-consumer group on the shared index.
    pub fn consumer_group(
        &mut self,
        identity: &QueryIdentity,
        widget: WidgetId,
        binding: &ChartBinding,
    ) -> CrossFilterResult<GroupId> {
        let group = self
            .groups
            .get_mut(identity)
            .ok_or_else(|| CrossFilterError::UnknownGroup(identity.clone()))?;
        let (Some(index), Some(shared)) = (group.index.as_mut(), group.shared.as_ref()) else {
            return Err(CrossFilterError::GroupNotReady(identity.clone()));
        };
        let shareable = widget == group.source || shared.scope == GroupScope::AllFilters;
        if shared.binding == *binding && shareable {
            return Ok(shared.group);
        }
        if let Some((existing, _, view)) = group.views.get(&widget) {
            if existing == binding {
                return Ok(*view);
            }
        }
        if let Some((_, dimension, _)) = group.views.remove(&widget) {
            index.dispose_dimension(dimension)?;
        }

        let dimension = index.dimension(Projector::Column(binding.dimension.clone()))?;
        let view = match index.group(dimension, binding.reducer()) {
            Ok(view) => view,
            Err(err) => {
                index.dispose_dimension(dimension)?;
                return Err(err.into());
            }
        };
        group
            .views
            .insert(widget, (binding.clone(), dimension, view));
        log::debug!("created consumer view for {widget} in {identity}");
        Ok(view)
    }

    /// Advance the group's generation.
    pub fn broadcast_redraw(&mut self, identity: &QueryIdentity) -> CrossFilterResult<RedrawEvent> {
        let group = self
            .groups
            .get_mut(identity)
            .ok_or_else(|| CrossFilterError::UnknownGroup(identity.clone()))?;
        group.generation = group.generation.next();
        Ok(RedrawEvent {
            identity: identity.clone(),
            stamp: group.stamp(),
        })
    }

    /// Forget a widget that left the dashboard. Returns the identities whose membership changed.
    pub fn unmount(&mut self, widget: WidgetId) -> Vec<QueryIdentity> {
        self.mounted.remove(&widget);
        let mut changed = Vec::new();
        for (identity, group) in self.groups.iter_mut() {
            let was_member = group.members.remove(&widget);
            group.release_view(widget);
            if group.source == widget {
                group.pending_fetch = None;
            }
            if was_member {
                changed.push(identity.clone());
            }
        }
        changed.sort();
        changed
    }

    /// Dispose every group (dashboard unmount).
    pub fn teardown(&mut self) {
        for (_, mut group) in self.groups.drain() {
            group.dispose();
        }
        self.sources.clear();
        self.mounted.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{CardQuery, IdentityResolver};
    use crossfilter_index::{FilterKey, Value};

    const SOURCE: WidgetId = WidgetId(1);

    fn ready_registry() -> (GroupRegistry, QueryIdentity) {
        let identity = IdentityResolver::default()
            .resolve_query(&CardQuery::native("SELECT region, sales FROM t"))
            .unwrap();
        let mut registry = GroupRegistry::default();
        let resolved = identity.clone();
        registry.reconcile(
            &[CrossFilterParameter::new("region", SOURCE)],
            &[SOURCE],
            |_| Some(resolved.clone()),
        );

        let ticket = registry.begin_fetch(SOURCE).unwrap();
        let data = ResultData::new(
            vec!["region", "sales"],
            vec![
                vec![Value::from("West"), Value::from(3.0)],
                vec![Value::from("East"), Value::from(4.0)],
            ],
        );
        assert!(registry.build_index(&ticket, data).unwrap());
        let binding = ChartBinding::sum("region", "sales");
        assert!(registry
            .register_dimension_and_group(&identity, SOURCE, &binding, GroupScope::AllFilters)
            .unwrap());
        (registry, identity)
    }

    #[test]
    fn failed_filter_leaves_the_selection_untouched() {
        let (mut registry, identity) = ready_registry();
        let group = registry.groups.get_mut(&identity).unwrap();
        let dimension = group.dimension().unwrap();
        group
            .index
            .as_mut()
            .unwrap()
            .dispose_dimension(dimension)
            .unwrap();

        let err = registry
            .apply_selection(SOURCE, |coordinator| {
                coordinator.toggle(FilterKey::exact("West"));
            })
            .unwrap_err();
        assert!(err.is_disposed_handle());
        let coordinator = registry.coordinator(SOURCE).unwrap();
        assert!(coordinator.selection().is_empty());
        assert!(!coordinator.has_filter(None));
    }

    #[test]
    fn registering_the_same_view_twice_is_a_no_op() {
        let (mut registry, identity) = ready_registry();
        let binding = ChartBinding::sum("region", "sales");
        assert!(!registry
            .register_dimension_and_group(&identity, SOURCE, &binding, GroupScope::AllFilters)
            .unwrap());
        let index = registry.get_group(&identity).unwrap().index().unwrap();
        assert_eq!(index.live_dimensions(), 1);
        assert_eq!(index.live_groups(), 1);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "shared dimension disposed twice")]
    fn disposing_a_freed_shared_dimension_panics_in_debug() {
        let (mut registry, identity) = ready_registry();
        let group = registry.groups.get_mut(&identity).unwrap();
        let dimension = group.dimension().unwrap();
        group
            .index
            .as_mut()
            .unwrap()
            .dispose_dimension(dimension)
            .unwrap();
        group.dispose();
    }
}
