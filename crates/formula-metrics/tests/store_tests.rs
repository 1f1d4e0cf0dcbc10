use formula_metrics::{
    MethodOutput, MetricsError, MetricsStore, ResultData, ResultKey, Series, StoreQuery,
    TypedResult, Value, ValueType,
};
use pretty_assertions::assert_eq;
use serde_json::json;

fn by_site(metric: &str, method: &str, sites: &[(&str, f64)]) -> TypedResult {
    TypedResult::new(
        metric,
        method,
        ResultData::vector(
            "site",
            sites
                .iter()
                .map(|(site, v)| (Value::from(*site), Value::from(*v)))
                .collect::<Vec<_>>(),
        ),
    )
}

fn populated() -> MetricsStore {
    let mut store = MetricsStore::new();
    store.add(TypedResult::scalar("visits", "count", 12.0));
    store.add(by_site("visits", "by_site", &[("s1", 5.0), ("s2", 7.0)]));
    store.add(by_site("revenue", "by_site", &[("s2", 100.0), ("s3", 50.0)]));
    store.add(TypedResult::scalar("revenue", "total", 150.0));
    store
}

fn keys(store: &MetricsStore) -> Vec<(String, String)> {
    store
        .keys()
        .map(|k| (k.metric.clone(), k.method.clone()))
        .collect()
}

fn pair(metric: &str, method: &str) -> (String, String) {
    (metric.to_string(), method.to_string())
}

#[test]
fn add_and_get() {
    let store = populated();
    assert_eq!(store.len(), 4);
    assert!(store.contains("visits", "count"));
    assert_eq!(
        store.value("visits", "count").unwrap(),
        &ResultData::Scalar(Value::from(12.0))
    );
    assert!(store.get("visits", "median").is_none());
    assert!(matches!(
        store.result("visits", "median"),
        Err(MetricsError::ResultNotFound { .. })
    ));
}

#[test]
fn insertion_order_is_kept() {
    let store = populated();
    assert_eq!(
        keys(&store),
        vec![
            pair("visits", "count"),
            pair("visits", "by_site"),
            pair("revenue", "by_site"),
            pair("revenue", "total"),
        ]
    );
    assert_eq!(store.metrics(), vec!["revenue", "visits"]);
    assert_eq!(store.methods(None), vec!["by_site", "count", "total"]);
    assert_eq!(store.methods(Some("revenue")), vec!["by_site", "total"]);
}

#[test]
fn dimension_lookup() {
    let store = populated();
    assert_eq!(
        keys(&store.by_dimension("site", "s2")),
        vec![pair("visits", "by_site"), pair("revenue", "by_site")]
    );
    assert_eq!(
        keys(&store.by_dimension("site", "s3")),
        vec![pair("revenue", "by_site")]
    );
    assert!(store.by_dimension("site", "s9").is_empty());
    assert!(store.by_dimension("region", "s1").is_empty());
}

#[test]
fn filter_combines_criteria() {
    let store = populated();

    let query = StoreQuery::new()
        .dimension("site", "s2")
        .metric("revenue");
    assert_eq!(keys(&store.filter(&query)), vec![pair("revenue", "by_site")]);

    let query = StoreQuery::new()
        .dimension("site", "s1")
        .dimension("site", "s2");
    assert_eq!(keys(&store.filter(&query)), vec![pair("visits", "by_site")]);

    let query = StoreQuery::new().value_type(ValueType::Scalar);
    assert_eq!(
        keys(&store.filter(&query)),
        vec![pair("visits", "count"), pair("revenue", "total")]
    );

    let query = StoreQuery::new().method("count").method("total");
    assert_eq!(store.filter(&query).len(), 2);

    assert_eq!(store.filter(&StoreQuery::new()), store);
    assert_eq!(keys(&store.by_metric("visits")).len(), 2);
    assert_eq!(keys(&store.by_method("by_site")).len(), 2);
}

#[test]
fn overwrite_drops_stale_index_entries() {
    let mut store = populated();
    store.add(by_site("visits", "by_site", &[("s4", 1.0)]));

    assert_eq!(store.len(), 4);
    assert_eq!(keys(&store)[1], pair("visits", "by_site"));
    assert_eq!(
        keys(&store.by_dimension("site", "s1")),
        Vec::<(String, String)>::new()
    );
    assert_eq!(
        keys(&store.by_dimension("site", "s2")),
        vec![pair("revenue", "by_site")]
    );
    assert_eq!(
        keys(&store.by_dimension("site", "s4")),
        vec![pair("visits", "by_site")]
    );
}

#[test]
fn variant_iterators() {
    let store = populated();
    assert_eq!(store.scalars().count(), 2);
    assert_eq!(store.vectors().count(), 2);
    assert_eq!(store.tables().count(), 0);
    assert_eq!(store.all().count(), 4);
}

#[test]
fn add_from_output_normalizes() {
    let mut store = MetricsStore::new();
    let series = Series::named("cat", vec![(Value::from("A"), Value::from(2.0))]);
    let result = store
        .add_from_output("m", "counts", MethodOutput::from(series), None)
        .unwrap();
    assert_eq!(result.value_type(), ValueType::Vector);
    assert_eq!(store.by_dimension("cat", "A").len(), 1);

    let bad = MethodOutput::mapping([("oops", MethodOutput::from(1i64))]);
    assert!(store.add_from_output("m", "bad", bad, None).is_err());
    assert_eq!(store.len(), 1);
}

#[test]
fn records_export() {
    let store = populated();
    let records = store.to_records();
    assert_eq!(records.len(), 6);
    assert_eq!(records[0].metric, "visits");
    assert!(records[0].dimensions.is_empty());
    assert_eq!(records[2].dimension("site"), Some(&Value::from("s2")));

    let json_records = store.to_json_records(false);
    assert_eq!(
        json_records[1],
        json!({"metric": "visits", "method": "by_site", "site": "s1", "value": 5})
    );

    let with_meta = store.to_json_records(true);
    assert_eq!(
        with_meta[0],
        json!({
            "metric": "visits",
            "method": "count",
            "value": 12,
            "value_type": "scalar",
            "dimensions": [],
            "n_dimensions": 0
        })
    );
}

#[test]
fn nested_exports() {
    let store = populated();
    assert_eq!(
        store.to_nested_json(),
        json!({
            "visits": {"count": 12, "by_site": {"s1": 5, "s2": 7}},
            "revenue": {"by_site": {"s2": 100, "s3": 50}, "total": 150}
        })
    );
    assert_eq!(
        store.to_nested_json_by_method(),
        json!({
            "count": {"visits": 12},
            "by_site": {"visits": {"s1": 5, "s2": 7}, "revenue": {"s2": 100, "s3": 50}},
            "total": {"revenue": 150}
        })
    );
}

#[test]
fn summary_lists_every_result() {
    let store = populated();
    let summary = store.summary();
    assert_eq!(summary.len(), 4);
    assert_eq!(summary[1].value_type, ValueType::Vector);
    assert_eq!(summary[1].dimensions, vec!["site".to_string()]);
    assert_eq!(summary[1].n_dimensions, 1);
    assert_eq!(
        serde_json::to_value(&summary[0]).unwrap(),
        json!({
            "metric": "visits",
            "method": "count",
            "value_type": "scalar",
            "dimensions": [],
            "n_dimensions": 0
        })
    );
}

#[test]
fn tidy_table_export() {
    let store = populated();
    let table = store.to_table().unwrap();
    assert_eq!(table.columns(), ["metric", "method", "site", "value"]);
    assert_eq!(table.row_count(), 6);
    assert_eq!(table.value(0, "site"), Some(&Value::Blank));
    assert_eq!(table.value(5, "metric"), Some(&Value::from("revenue")));
    assert_eq!(table.value(5, "value"), Some(&Value::from(150.0)));

    assert_eq!(MetricsStore::new().to_table().unwrap().row_count(), 0);
}

#[test]
fn collects_from_iterator() {
    let store: MetricsStore = vec![
        TypedResult::scalar("a", "x", 1.0),
        TypedResult::scalar("a", "x", 2.0),
    ]
    .into_iter()
    .collect();
    assert_eq!(store.len(), 1);
    assert_eq!(
        store.keys().next(),
        Some(&ResultKey::new("a", "x"))
    );
    assert_eq!(
        store.value("a", "x").unwrap().as_scalar(),
        Some(&Value::from(2.0))
    );
}
