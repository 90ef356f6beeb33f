//! Cross-filter coordination for dashboards.
//!
//! Widgets whose underlying queries normalize to the same [`QueryIdentity`] share one
//! [`DimensionalIndex`](crossfilter_index::DimensionalIndex). The designated source widget of a
//! cross-filter parameter builds that index from its loaded rows and owns the filter selection;
//! every other widget of the same identity reads the filtered aggregates and re-renders when the
//! group's generation moves.
//!
//! All shared state lives in a [`CrossFilterSession`]: one per mounted dashboard, nothing global.

mod broadcast;
mod config;
mod coordinator;
mod error;
mod identity;
mod registry;
mod session;
mod widget;

pub use crate::broadcast::{Generation, RedrawBroadcaster, RedrawEvent, RenderStamp, SubscriptionId};
pub use crate::config::{
    ChartBinding, CrossFilterParameter, DashboardConfig, DashboardParameter, ParameterId,
    SessionOptions, WidgetId, CROSSFILTER_PARAMETER_TYPE,
};
pub use crate::coordinator::{CoordinatorState, FilterCoordinator};
pub use crate::error::{CrossFilterError, CrossFilterResult};
pub use crate::identity::{CardDefinition, CardQuery, IdentityResolver, QueryCatalog, QueryIdentity};
pub use crate::registry::{
    CrossFilterGroup, FetchTicket, GroupEpoch, GroupRegistry, ReconcileReport, SourceView,
};
pub use crate::session::{CrossFilterSession, GroupHandle, WidgetRole};
pub use crate::widget::{ChartWidget, RenderFrame};
