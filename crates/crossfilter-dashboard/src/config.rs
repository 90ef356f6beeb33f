//! Dashboard-side inputs: parameters, chart bindings and session options.

use crate::error::CrossFilterResult;
use crate::identity::CardDefinition;
use crossfilter_index::{ColumnRef, Reducer, MAX_DIMENSIONS};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const CROSSFILTER_PARAMETER_TYPE: &str = "crossfilter";

/// A mounted chart widget, identified by its card id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WidgetId(pub u64);

impl fmt::Display for WidgetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "card {}", self.0)
    }
}

pub type ParameterId = String;

/// A dashboard parameter as stored in the dashboard definition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DashboardParameter {
    pub id: ParameterId,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub card_id: Option<WidgetId>,
}

impl DashboardParameter {
    pub fn is_crossfilter(&self) -> bool {
        self.kind == CROSSFILTER_PARAMETER_TYPE
    }
}

/// A cross-filter parameter naming the widget whose clicks drive the filter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CrossFilterParameter {
    pub id: ParameterId,
    pub card_id: WidgetId,
}

impl CrossFilterParameter {
    pub fn new(id: impl Into<ParameterId>, card_id: WidgetId) -> Self {
        Self {
            id: id.into(),
            card_id,
        }
    }
}

/// The slice of a dashboard definition the cross-filter engine reads.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DashboardConfig {
    #[serde(default)]
    pub parameters: Vec<DashboardParameter>,
    #[serde(default)]
    pub cards: Vec<CardDefinition>,
}

impl DashboardConfig {
    pub fn from_json(json: &str) -> CrossFilterResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Parameters of type `crossfilter`, in declaration order. Parameters without a source card
    /// are skipped.
    pub fn crossfilter_parameters(&self) -> Vec<CrossFilterParameter> {
        self.parameters
            .iter()
            .filter(|p| p.is_crossfilter())
            .filter_map(|p| match p.card_id {
                Some(card_id) => Some(CrossFilterParameter::new(p.id.clone(), card_id)),
                None => {
                    log::warn!("crossfilter parameter {} names no source card", p.id);
                    None
                }
            })
            .collect()
    }
}

/// Which columns a chart groups by and aggregates.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChartBinding {
    pub dimension: ColumnRef,
    /// Summed per key; `None` counts rows instead.
    pub metric: Option<ColumnRef>,
}

impl ChartBinding {
    pub fn sum(dimension: impl Into<ColumnRef>, metric: impl Into<ColumnRef>) -> Self {
        Self {
            dimension: dimension.into(),
            metric: Some(metric.into()),
        }
    }

    pub fn count(dimension: impl Into<ColumnRef>) -> Self {
        Self {
            dimension: dimension.into(),
            metric: None,
        }
    }

    pub fn reducer(&self) -> Reducer {
        match &self.metric {
            Some(metric) => Reducer::sum(metric.clone()),
            None => Reducer::count(),
        }
    }

    /// Read the binding from visualization settings (`graph.dimensions`/`graph.metrics`, or
    /// `pie.dimension`/`pie.metric`). Only the first dimension and metric are used.
    pub fn from_settings(settings: &serde_json::Value) -> Option<Self> {
        fn first_name(value: Option<&serde_json::Value>) -> Option<String> {
            match value? {
                serde_json::Value::String(s) => Some(s.clone()),
                serde_json::Value::Array(items) => items
                    .iter()
                    .find_map(|item| item.as_str().map(str::to_string)),
                _ => None,
            }
        }

        let dimension = first_name(settings.get("graph.dimensions"))
            .or_else(|| first_name(settings.get("pie.dimension")))?;
        let metric = first_name(settings.get("graph.metrics"))
            .or_else(|| first_name(settings.get("pie.metric")));

        Some(Self {
            dimension: ColumnRef::Name(dimension),
            metric: metric.map(ColumnRef::Name),
        })
    }
}

/// Knobs for a [`CrossFilterSession`](crate::CrossFilterSession).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionOptions {
    /// Whether the source widget's shared group narrows under its own selection. When `false`
    /// the source keeps every key visible and only consumers narrow.
    pub source_observes_own_filter: bool,
    /// Cap on live dimensions per shared index (at most [`MAX_DIMENSIONS`]).
    pub max_dimensions_per_index: usize,
    /// Collapse whitespace runs outside string literals when computing query identities.
    pub normalize_whitespace: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            source_observes_own_filter: true,
            max_dimensions_per_index: MAX_DIMENSIONS,
            normalize_whitespace: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn crossfilter_parameters_are_filtered_by_type() {
        let config = DashboardConfig::from_json(
            r#"{
                "parameters": [
                    {"id": "a", "type": "crossfilter", "card_id": 1},
                    {"id": "b", "type": "date/single"},
                    {"id": "c", "type": "crossfilter"},
                    {"id": "d", "type": "crossfilter", "card_id": 4, "dashcard_id": 9}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(
            config.crossfilter_parameters(),
            vec![
                CrossFilterParameter::new("a", WidgetId(1)),
                CrossFilterParameter::new("d", WidgetId(4)),
            ]
        );
    }

    #[test]
    fn bindings_come_from_graph_or_pie_settings() {
        let graph = json!({"graph.dimensions": ["region", null], "graph.metrics": ["sales"]});
        assert_eq!(
            ChartBinding::from_settings(&graph),
            Some(ChartBinding::sum("region", "sales"))
        );

        let pie = json!({"pie.dimension": "product"});
        assert_eq!(ChartBinding::from_settings(&pie), Some(ChartBinding::count("product")));

        assert_eq!(ChartBinding::from_settings(&json!({})), None);
    }

    #[test]
    fn malformed_json_is_a_config_error() {
        let err = DashboardConfig::from_json("{\"parameters\": 3}").unwrap_err();
        assert!(matches!(err, crate::CrossFilterError::Config(_)));
    }
}
