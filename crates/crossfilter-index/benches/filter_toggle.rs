use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use crossfilter_index::{
    DimensionalIndex, FilterKey, FilterSelection, Projector, Reducer, ResultData, Value,
};
use std::time::Duration;

fn bench_rows() -> usize {
    std::env::var("CROSSFILTER_BENCH_ROWS")
        .ok()
        .and_then(|v| v.replace('_', "").parse::<usize>().ok())
        .filter(|&v| (10_000..=5_000_000).contains(&v))
        .unwrap_or(250_000)
}

fn build_index(rows: usize) -> DimensionalIndex {
    let regions = ["West", "East", "North", "South", "Central"];
    let data = ResultData::new(
        vec!["region", "product", "sales"],
        (0..rows)
            .map(|i| {
                vec![
                    Value::from(regions[i % regions.len()]),
                    Value::from((i % 97) as f64),
                    Value::from((i % 100) as f64),
                ]
            })
            .collect(),
    );
    DimensionalIndex::from_result(data).unwrap()
}

fn bench_filter_toggle(c: &mut Criterion) {
    let rows = bench_rows();
    let mut index = build_index(rows);
    let region = index.dimension(Projector::column("region")).unwrap();
    let product = index.dimension(Projector::column("product")).unwrap();
    let by_product = index.group(product, Reducer::sum("sales")).unwrap();

    let mut group = c.benchmark_group("filter_toggle");
    group.measurement_time(Duration::from_secs(10));
    group.throughput(Throughput::Elements(rows as u64));

    for selected in [1usize, 2, 4] {
        let keys = ["West", "East", "North", "South"];
        let selection =
            FilterSelection::from_keys(keys[..selected].iter().map(|k| FilterKey::exact(*k)));
        group.bench_with_input(
            BenchmarkId::new("select_then_clear", selected),
            &selection,
            |b, selection| {
                b.iter(|| {
                    index.filter(region, selection).unwrap();
                    black_box(index.non_empty(by_product).unwrap());
                    index.clear_filter(region).unwrap();
                })
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_filter_toggle);
criterion_main!(benches);
