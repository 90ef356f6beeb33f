use crate::config::WidgetId;
use crate::identity::QueryIdentity;
use crossfilter_index::IndexError;

pub type CrossFilterResult<T> = Result<T, CrossFilterError>;

#[derive(Debug, thiserror::Error)]
pub enum CrossFilterError {
    #[error("widget {widget} has no filterable query")]
    UnresolvableQuery { widget: WidgetId },

    #[error("widget {widget} is not the cross-filter source of its group")]
    PrematureMutation { widget: WidgetId },

    #[error("discarding stale data for widget {widget} ({identity})")]
    StaleAsyncCompletion {
        widget: WidgetId,
        identity: QueryIdentity,
    },

    #[error("no cross-filter group for {0}")]
    UnknownGroup(QueryIdentity),

    #[error("cross-filter group {0} has no shared index yet")]
    GroupNotReady(QueryIdentity),

    #[error("invalid dashboard configuration: {0}")]
    Config(#[from] serde_json::Error),

    #[error(transparent)]
    Index(#[from] IndexError),
}

impl CrossFilterError {
    /// A dimension or group handle was used after the registry disposed it.
    pub fn is_disposed_handle(&self) -> bool {
        matches!(self, CrossFilterError::Index(err) if err.is_disposed_handle())
    }
}
