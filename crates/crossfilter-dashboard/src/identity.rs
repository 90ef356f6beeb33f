//! Query identity: which widgets read the same underlying data.

use crate::config::{DashboardConfig, WidgetId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Normalized text of a native query. Two widgets belong to the same cross-filter group iff
/// their identities are equal.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryIdentity(Arc<str>);

impl QueryIdentity {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueryIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const MAX: usize = 48;
        match self.0.char_indices().nth(MAX) {
            Some((cut, _)) => write!(f, "query `{}…`", &self.0[..cut]),
            None => write!(f, "query `{}`", self.0),
        }
    }
}

/// The query behind a card.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CardQuery {
    /// Literal query text.
    Native { native: NativeQuery },
    /// Built with the structured query builder; never shared.
    Query {
        #[serde(default)]
        query: serde_json::Value,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NativeQuery {
    pub query: String,
}

impl CardQuery {
    pub fn native(query: impl Into<String>) -> Self {
        CardQuery::Native {
            native: NativeQuery {
                query: query.into(),
            },
        }
    }

    pub fn structured(query: serde_json::Value) -> Self {
        CardQuery::Query { query }
    }
}

/// A card as listed in the dashboard definition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CardDefinition {
    pub id: WidgetId,
    pub dataset_query: CardQuery,
}

/// Looks up the query behind a widget.
pub trait QueryCatalog {
    fn card_query(&self, widget: WidgetId) -> Option<&CardQuery>;
}

impl QueryCatalog for HashMap<WidgetId, CardQuery> {
    fn card_query(&self, widget: WidgetId) -> Option<&CardQuery> {
        self.get(&widget)
    }
}

impl QueryCatalog for DashboardConfig {
    fn card_query(&self, widget: WidgetId) -> Option<&CardQuery> {
        self.cards
            .iter()
            .find(|card| card.id == widget)
            .map(|card| &card.dataset_query)
    }
}

/// Computes [`QueryIdentity`] values for widgets.
#[derive(Clone, Debug)]
pub struct IdentityResolver {
    normalize_whitespace: bool,
}

impl Default for IdentityResolver {
    fn default() -> Self {
        Self::new(true)
    }
}

impl IdentityResolver {
    pub fn new(normalize_whitespace: bool) -> Self {
        Self {
            normalize_whitespace,
        }
    }

    /// `None` when the widget is unknown or cannot take part in cross-filtering.
    pub fn resolve(&self, catalog: &dyn QueryCatalog, widget: WidgetId) -> Option<QueryIdentity> {
        self.resolve_query(catalog.card_query(widget)?)
    }

    /// Only literal native queries are filterable. Native queries that embed other saved
    /// questions (`{{#123}}` references) are composed and excluded, as are structured queries.
    pub fn resolve_query(&self, query: &CardQuery) -> Option<QueryIdentity> {
        let CardQuery::Native { native } = query else {
            return None;
        };
        if native.query.contains("{{#") {
            return None;
        }

        let trimmed = native.query.trim().trim_end_matches(';').trim_end();
        if trimmed.is_empty() {
            return None;
        }

        let text = if self.normalize_whitespace {
            collapse_whitespace(trimmed)
        } else {
            trimmed.to_string()
        };
        Some(QueryIdentity(Arc::from(text)))
    }
}

/// Replace whitespace runs outside quoted literals with a single space.
fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut quote: Option<char> = None;
    let mut pending_space = false;

    for ch in text.chars() {
        if let Some(q) = quote {
            out.push(ch);
            if ch == q {
                quote = None;
            }
            continue;
        }
        if ch.is_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space {
            out.push(' ');
            pending_space = false;
        }
        if ch == '\'' || ch == '"' {
            quote = Some(ch);
        }
        out.push(ch);
    }
    out
}
