#![allow(dead_code)]

use crossfilter_dashboard::{
    CardQuery, ChartBinding, ChartWidget, CrossFilterParameter, CrossFilterSession,
    IdentityResolver, QueryIdentity, SessionOptions, WidgetId,
};
use crossfilter_index::{GroupEntry, ResultData, Value};
use std::collections::HashMap;

pub const SALES_QUERY: &str = "SELECT region, product, sales FROM t";

pub const SOURCE: WidgetId = WidgetId(1);
pub const CONSUMER: WidgetId = WidgetId(2);
/// Same query as `SOURCE`, written with different spacing.
pub const RESPACED: WidgetId = WidgetId(3);
pub const OTHER: WidgetId = WidgetId(4);
pub const COMPOSED: WidgetId = WidgetId(5);
pub const STRUCTURED: WidgetId = WidgetId(6);

pub fn catalog() -> HashMap<WidgetId, CardQuery> {
    HashMap::from([
        (SOURCE, CardQuery::native(SALES_QUERY)),
        (CONSUMER, CardQuery::native(SALES_QUERY)),
        (
            RESPACED,
            CardQuery::native("SELECT region,  product, sales\n  FROM t;"),
        ),
        (OTHER, CardQuery::native("SELECT region, sales FROM other")),
        (COMPOSED, CardQuery::native("SELECT * FROM {{#1}} WHERE sales > 2")),
        (
            STRUCTURED,
            CardQuery::structured(serde_json::json!({"source-table": 7})),
        ),
    ])
}

pub fn session() -> CrossFilterSession {
    CrossFilterSession::new(catalog(), SessionOptions::default())
}

pub fn parameter(id: &str, card: WidgetId) -> CrossFilterParameter {
    CrossFilterParameter::new(id, card)
}

pub fn sales_identity() -> QueryIdentity {
    IdentityResolver::default()
        .resolve_query(&CardQuery::native(SALES_QUERY))
        .unwrap()
}

pub fn sales_result() -> ResultData {
    let rows = [
        ("West", "Gizmo", 10.0),
        ("East", "Gizmo", 4.0),
        ("West", "Widget", 6.0),
        ("North", "Widget", 3.0),
        ("East", "Doohickey", 8.0),
        ("South", "Gizmo", 2.0),
        ("West", "Doohickey", 1.0),
        ("North", "Gizmo", 7.0),
    ];
    ResultData::new(
        vec!["region", "product", "sales"],
        rows.iter()
            .map(|(region, product, sales)| {
                vec![Value::from(*region), Value::from(*product), Value::from(*sales)]
            })
            .collect(),
    )
}

pub fn by_region() -> ChartBinding {
    ChartBinding::sum("region", "sales")
}

pub fn by_product() -> ChartBinding {
    ChartBinding::sum("product", "sales")
}

pub fn entries(pairs: &[(&str, f64)]) -> Vec<GroupEntry> {
    pairs
        .iter()
        .map(|(key, value)| GroupEntry {
            key: Value::from(*key),
            value: Value::from(*value),
        })
        .collect()
}

pub fn all_regions() -> Vec<GroupEntry> {
    entries(&[("East", 12.0), ("North", 10.0), ("South", 2.0), ("West", 17.0)])
}

/// One cross-filter parameter on `SOURCE`, with `SOURCE` and `CONSUMER` mounted and loaded.
pub fn loaded_dashboard() -> (CrossFilterSession, ChartWidget, ChartWidget) {
    let mut session = session();
    session.reconcile(&[parameter("region", SOURCE)], &[SOURCE, CONSUMER]);

    let mut source = ChartWidget::new(SOURCE, by_region());
    let mut consumer = ChartWidget::new(CONSUMER, by_region());
    source.begin_fetch(&mut session);
    consumer.begin_fetch(&mut session);
    source.on_data_loaded(&mut session, sales_result());
    consumer.on_data_loaded(&mut session, sales_result());
    (session, source, consumer)
}
