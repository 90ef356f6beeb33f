#![allow(dead_code)]

use crossfilter_index::{DimensionalIndex, ResultData, Value};

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

pub fn sales_index() -> DimensionalIndex {
    DimensionalIndex::from_result(sales_result()).unwrap()
}

/// Brute-force sum of `sales` per `key_column` over rows accepted by `keep`.
pub fn expected_sums(
    data: &ResultData,
    key_column: &str,
    keep: impl Fn(&[Value]) -> bool,
) -> Vec<(Value, Value)> {
    let key_idx = data.column_position(key_column).unwrap();
    let sales_idx = data.column_position("sales").unwrap();
    let mut out: std::collections::BTreeMap<Value, f64> = Default::default();
    for row in &data.rows {
        if keep(row) {
            *out.entry(row[key_idx].clone()).or_default() += row[sales_idx].as_number().unwrap();
        }
    }
    out.into_iter().map(|(k, v)| (k, Value::from(v))).collect()
}
