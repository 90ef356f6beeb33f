//! Redraw notifications keyed by query identity.
//!
//! Every cross-filter group carries a generation counter that moves forward on each redraw.
//! Widgets remember the [`RenderStamp`] they last rendered; a widget is stale exactly when its
//! stamp differs from the group's current one.

use crate::config::WidgetId;
use crate::identity::QueryIdentity;
use crate::registry::GroupEpoch;
use std::collections::HashMap;
use std::fmt;

/// Monotonic per-group redraw counter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Generation(pub u64);

impl Generation {
    pub(crate) fn next(self) -> Self {
        Generation(self.0 + 1)
    }
}

/// Which incarnation of a group, and which redraw of it, a widget rendered.
///
/// The epoch changes when a group is torn down and recreated under the same identity, so stamps
/// from the old group never compare equal to the new one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RenderStamp {
    pub epoch: GroupEpoch,
    pub generation: Generation,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RedrawEvent {
    pub identity: QueryIdentity,
    pub stamp: RenderStamp,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type RedrawCallback = Box<dyn FnMut(&RedrawEvent)>;

#[derive(Default)]
pub struct RedrawBroadcaster {
    subscriptions: HashMap<QueryIdentity, Vec<(SubscriptionId, RedrawCallback)>>,
    last_seen: HashMap<WidgetId, (QueryIdentity, RenderStamp)>,
    next_id: u64,
}

impl fmt::Debug for RedrawBroadcaster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedrawBroadcaster")
            .field("identities", &self.subscriptions.len())
            .field("subscriptions", &self.subscription_count())
            .field("tracked_widgets", &self.last_seen.len())
            .finish()
    }
}

impl RedrawBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(
        &mut self,
        identity: QueryIdentity,
        callback: impl FnMut(&RedrawEvent) + 'static,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.subscriptions
            .entry(identity)
            .or_default()
            .push((id, Box::new(callback)));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let mut removed = false;
        self.subscriptions.retain(|_, subs| {
            let before = subs.len();
            subs.retain(|(sub_id, _)| *sub_id != id);
            removed |= subs.len() < before;
            !subs.is_empty()
        });
        removed
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.values().map(Vec::len).sum()
    }

    /// Record that `widget` rendered `identity` at `stamp`.
    pub fn mark_seen(&mut self, widget: WidgetId, identity: QueryIdentity, stamp: RenderStamp) {
        self.last_seen.insert(widget, (identity, stamp));
    }

    pub fn last_seen(&self, widget: WidgetId) -> Option<RenderStamp> {
        self.last_seen.get(&widget).map(|(_, stamp)| *stamp)
    }

    /// Members whose last rendered stamp differs from `current`.
    pub fn stale_widgets<'a>(
        &self,
        members: impl IntoIterator<Item = &'a WidgetId>,
        current: RenderStamp,
    ) -> Vec<WidgetId> {
        members
            .into_iter()
            .filter(|widget| self.last_seen(**widget) != Some(current))
            .copied()
            .collect()
    }

    /// Run every callback subscribed to the event's identity.
    pub fn notify(&mut self, event: &RedrawEvent) {
        let Some(subs) = self.subscriptions.get_mut(&event.identity) else {
            return;
        };
        log::trace!(
            "redraw {} at generation {} for {} subscriber(s)",
            event.identity,
            event.stamp.generation.0,
            subs.len()
        );
        for (_, callback) in subs.iter_mut() {
            callback(event);
        }
    }

    /// Drop render stamps for an identity whose group was torn down. Subscriptions stay: they
    /// are keyed by identity and resume if a group for it is created again.
    pub fn forget_identity(&mut self, identity: &QueryIdentity) {
        self.last_seen.retain(|_, (seen, _)| seen != identity);
    }

    pub fn forget_widget(&mut self, widget: WidgetId) {
        self.last_seen.remove(&widget);
    }
}
