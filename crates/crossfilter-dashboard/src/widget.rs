//! Chart widget adapter.
//!
//! A [`ChartWidget`] is what a chart component holds: its card id, its column binding and its own
//! loaded data. It talks to the shared state only through the [`CrossFilterSession`] passed into
//! each call, resolves its [`WidgetRole`] once per render pass and caches its visible rows by
//! render stamp.

use crate::broadcast::RenderStamp;
use crate::config::{ChartBinding, WidgetId};
use crate::error::CrossFilterResult;
use crate::identity::QueryIdentity;
use crate::registry::{CrossFilterGroup, FetchTicket};
use crate::session::{CrossFilterSession, GroupHandle, WidgetRole};
use crossfilter_index::{
    DimensionalIndex, FilterKey, GroupEntry, Projector, ResultData, RowRecord, Value,
};

/// What a widget should draw on this pass.
#[derive(Clone, Debug, PartialEq)]
pub enum RenderFrame {
    /// Aggregates from the shared, possibly filtered, index.
    Shared {
        rows: Vec<GroupEntry>,
        stamp: RenderStamp,
        filter_active: bool,
    },
    /// Aggregates of the widget's own unfiltered data.
    Independent { rows: Vec<GroupEntry> },
    /// Nothing loaded yet.
    Loading,
}

impl RenderFrame {
    pub fn rows(&self) -> &[GroupEntry] {
        match self {
            RenderFrame::Shared { rows, .. } | RenderFrame::Independent { rows } => rows,
            RenderFrame::Loading => &[],
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CacheKey {
    Shared(RenderStamp),
    Independent(u64),
}

#[derive(Debug)]
pub struct ChartWidget {
    id: WidgetId,
    binding: ChartBinding,
    role: WidgetRole,
    own_data: Option<ResultData>,
    data_revision: u64,
    pending: Option<FetchTicket>,
    cache: Option<(CacheKey, Vec<GroupEntry>)>,
    recomputed: u64,
}

impl ChartWidget {
    pub fn new(id: WidgetId, binding: ChartBinding) -> Self {
        Self {
            id,
            binding,
            role: WidgetRole::Unbound,
            own_data: None,
            data_revision: 0,
            pending: None,
            cache: None,
            recomputed: 0,
        }
    }

    pub fn id(&self) -> WidgetId {
        self.id
    }

    pub fn binding(&self) -> &ChartBinding {
        &self.binding
    }

    /// Role as of the last [`resolve_role`](Self::resolve_role) or render.
    pub fn role(&self) -> &WidgetRole {
        &self.role
    }

    /// How many times the visible rows were recomputed rather than served from cache.
    pub fn recompute_count(&self) -> u64 {
        self.recomputed
    }

    pub fn resolve_role(&mut self, session: &CrossFilterSession) -> &WidgetRole {
        self.role = session.role_of(self.id);
        &self.role
    }

    /// Called when the widget starts loading its query result. A source widget receives a
    /// ticket that lets the result build the shared index.
    pub fn begin_fetch(&mut self, session: &mut CrossFilterSession) {
        self.pending = session.begin_fetch(self.id);
    }

    /// The query result arrived. A source with a current ticket builds the shared index and
    /// publishes its dimension and group; every widget keeps the rows for independent rendering.
    pub fn on_data_loaded(&mut self, session: &mut CrossFilterSession, data: ResultData) {
        let ticket = self.pending.take();
        self.own_data = Some(data.clone());
        self.data_revision += 1;

        let Some(ticket) = ticket else {
            return;
        };
        match session.build_index(&ticket, data) {
            Ok(_) => {
                if let Err(err) = self.install_source_view(session, ticket.identity()) {
                    debug_assert!(!err.is_disposed_handle(), "{err}");
                    log::warn!("{} could not publish its cross-filter group: {err}", self.id);
                }
            }
            Err(err) => log::warn!("{err}"),
        }
    }

    /// The query failed. The group stays without an index and members render what they have.
    pub fn on_fetch_failed(&mut self, session: &mut CrossFilterSession) {
        if let Some(ticket) = self.pending.take() {
            session.fetch_failed(&ticket);
        }
    }

    fn install_source_view(
        &self,
        session: &mut CrossFilterSession,
        identity: &QueryIdentity,
    ) -> CrossFilterResult<()> {
        if session
            .get_group(identity)
            .is_some_and(CrossFilterGroup::is_ready)
        {
            return Ok(());
        }
        session.register_dimension_and_group(identity, self.id, &self.binding)?;
        Ok(())
    }

    /// Rows to draw. Served from cache unless the group's stamp (or the widget's own data)
    /// changed since the last pass.
    pub fn render(&mut self, session: &mut CrossFilterSession) -> RenderFrame {
        self.resolve_role(session);
        if let Some(handle) = self.role.handle().cloned() {
            if let Some(frame) = self.render_shared(session, &handle) {
                return frame;
            }
        }
        self.render_independent()
    }

    fn render_shared(
        &mut self,
        session: &mut CrossFilterSession,
        handle: &GroupHandle,
    ) -> Option<RenderFrame> {
        let group = session.get_group(&handle.identity)?;
        if !group.is_ready() {
            return None;
        }
        let stamp = group.stamp();
        let filter_active = group.coordinator().has_filter(None);

        if let Some((CacheKey::Shared(cached), rows)) = &self.cache {
            if *cached == stamp {
                return Some(RenderFrame::Shared {
                    rows: rows.clone(),
                    stamp,
                    filter_active,
                });
            }
        }

        let view = match session.consumer_group(self.id, &handle.identity, &self.binding) {
            Ok(view) => view,
            Err(err) => {
                debug_assert!(!err.is_disposed_handle(), "{err}");
                log::warn!("{} falls back to its own data: {err}", self.id);
                return None;
            }
        };
        let rows = match session.index(&handle.identity)?.non_empty(view) {
            Ok(rows) => rows,
            Err(err) => {
                debug_assert!(!err.is_disposed_handle(), "{err}");
                log::warn!("{} falls back to its own data: {err}", self.id);
                return None;
            }
        };

        self.recomputed += 1;
        self.cache = Some((CacheKey::Shared(stamp), rows.clone()));
        session.mark_rendered(self.id, handle.identity.clone(), stamp);
        Some(RenderFrame::Shared {
            rows,
            stamp,
            filter_active,
        })
    }

    fn render_independent(&mut self) -> RenderFrame {
        let Some(data) = &self.own_data else {
            return RenderFrame::Loading;
        };
        if let Some((CacheKey::Independent(revision), rows)) = &self.cache {
            if *revision == self.data_revision {
                return RenderFrame::Independent { rows: rows.clone() };
            }
        }

        let rows = match independent_rows(data, &self.binding) {
            Ok(rows) => rows,
            Err(err) => {
                log::warn!("{} cannot aggregate its own data: {err}", self.id);
                Vec::new()
            }
        };
        self.recomputed += 1;
        self.cache = Some((CacheKey::Independent(self.data_revision), rows.clone()));
        RenderFrame::Independent { rows }
    }

    /// A bar or slice with dimension `key` was clicked. Non-source widgets ignore clicks.
    pub fn on_click(&mut self, session: &mut CrossFilterSession, key: impl Into<Value>) -> bool {
        self.select(session, FilterKey::Exact(key.into()))
    }

    /// Click on a full data row; the key is the row's value in the bound dimension column.
    pub fn on_click_row(&mut self, session: &mut CrossFilterSession, row: &RowRecord) -> bool {
        let key = row.get(&self.binding.dimension).clone();
        self.select(session, FilterKey::Exact(key))
    }

    fn select(&mut self, session: &mut CrossFilterSession, key: FilterKey) -> bool {
        match session.on_user_select(self.id, key) {
            Ok(selected) => selected,
            Err(err) => {
                debug_assert!(!err.is_disposed_handle(), "{err}");
                log::warn!("ignoring selection on {}: {err}", self.id);
                false
            }
        }
    }

    /// Brush selection of `lower..upper`.
    pub fn on_brush(
        &mut self,
        session: &mut CrossFilterSession,
        lower: impl Into<Value>,
        upper: impl Into<Value>,
    ) {
        if let Err(err) = session.on_user_select_range(self.id, lower, upper) {
            debug_assert!(!err.is_disposed_handle(), "{err}");
            log::warn!("ignoring brush on {}: {err}", self.id);
        }
    }

    /// The chart's reset control.
    pub fn on_reset(&mut self, session: &mut CrossFilterSession) {
        if let Err(err) = session.on_reset(self.id) {
            debug_assert!(!err.is_disposed_handle(), "{err}");
            log::warn!("ignoring reset on {}: {err}", self.id);
        }
    }

    pub fn show_reset(&self, session: &CrossFilterSession) -> bool {
        session.show_reset(self.id)
    }

    pub fn has_filter(&self, session: &CrossFilterSession, key: Option<&Value>) -> bool {
        session.has_filter(self.id, key)
    }

    /// The widget left the dashboard; any in-flight fetch is abandoned.
    pub fn unmount(self, session: &mut CrossFilterSession) {
        session.unmount_widget(self.id);
    }
}

/// Aggregate `data` on a private index that is dropped right after reading.
fn independent_rows(data: &ResultData, binding: &ChartBinding) -> CrossFilterResult<Vec<GroupEntry>> {
    let mut index = DimensionalIndex::from_result(data.clone())?;
    let dimension = index.dimension(Projector::Column(binding.dimension.clone()))?;
    let group = index.group(dimension, binding.reducer())?;
    let rows = index.non_empty(group)?;
    index.dispose_dimension(dimension)?;
    Ok(rows)
}
