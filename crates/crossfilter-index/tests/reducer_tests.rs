mod common;

use common::sales_index;
use crossfilter_index::{
    CustomReducer, FilterKey, FilterSelection, Projector, Reducer, RowRecord, Value,
};
use pretty_assertions::assert_eq;

/// Tracks sum of squares of `sales`, which exercises a non-trivial reversible reduction.
fn sum_of_squares() -> Reducer {
    fn square(record: &RowRecord) -> f64 {
        let v = record.by_name("sales").as_number().unwrap_or(0.0);
        v * v
    }
    Reducer::from_fns(
        || Value::from(0.0),
        |acc, r| Value::from(acc.as_number().unwrap_or(0.0) + square(r)),
        |acc, r| Value::from(acc.as_number().unwrap_or(0.0) - square(r)),
    )
}

#[test]
fn custom_reducer_remove_undoes_add() {
    let index = sales_index();
    let records = index.records();
    let reducer = sum_of_squares();
    let Reducer::Custom(custom) = &reducer else {
        panic!("expected a custom reducer");
    };

    for record in records {
        for seed in [0.0, 3.0, -12.5] {
            let acc = Value::from(seed);
            let added = custom.add(acc.clone(), record);
            assert_eq!(custom.remove(added, record), acc);
        }
    }
}

#[test]
fn custom_reducer_is_maintained_across_filter_changes() {
    let mut index = sales_index();
    let region = index.dimension(Projector::column("region")).unwrap();
    let product = index.dimension(Projector::column("product")).unwrap();
    let squares = index.group(product, sum_of_squares()).unwrap();
    let before = index.all(squares).unwrap();

    for keys in [vec!["West"], vec!["West", "North"], vec!["South"], vec![]] {
        let selection = FilterSelection::from_keys(keys.into_iter().map(FilterKey::exact));
        index.filter(region, &selection).unwrap();
    }

    assert_eq!(index.all(squares).unwrap(), before);
    assert_eq!(
        index.value(squares, &Value::from("Gizmo")).unwrap(),
        Some(Value::from(100.0 + 16.0 + 4.0 + 49.0))
    );
}

#[test]
fn count_and_sum_agree_with_filtered_records() {
    let mut index = sales_index();
    let region = index.dimension(Projector::column("region")).unwrap();
    let product = index.dimension(Projector::column("product")).unwrap();
    let counts = index.group(product, Reducer::count()).unwrap();

    index
        .filter(region, &FilterSelection::from_keys([FilterKey::exact("West")]))
        .unwrap();

    let total: f64 = index
        .non_empty(counts)
        .unwrap()
        .iter()
        .map(|e| e.value.as_number().unwrap())
        .sum();
    assert_eq!(total as usize, index.filtered_records().len());
}
