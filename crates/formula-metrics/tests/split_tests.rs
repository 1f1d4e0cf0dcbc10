mod common;

use common::{registry, sample_table, visits_table};
use formula_metrics::{
    combine_split_results, normalize_split_by, resolve_methods, split_and_combine, MethodSpec,
    MetricsError, Params, ResultData, Table, TypedResult, Value, ValueType,
};
use pretty_assertions::assert_eq;
use serde_json::json;

fn run(table: &Table, split: &[&str], specs: Vec<MethodSpec>) -> Result<Vec<TypedResult>, MetricsError> {
    let registry = registry();
    let methods = resolve_methods(&specs, &registry)?;
    let split: Vec<String> = split.iter().map(|s| s.to_string()).collect();
    split_and_combine(table, &split, &methods, "metric")
}

#[test]
fn scalar_with_one_column_becomes_vector() {
    let results = run(
        &sample_table(),
        &["cat"],
        vec![MethodSpec::new("count_records"), MethodSpec::new("sum_values")],
    )
    .unwrap();
    assert_eq!(results.len(), 2);

    assert_eq!(
        results[0].data,
        ResultData::vector(
            "cat",
            vec![
                (Value::from("A"), Value::from(2usize)),
                (Value::from("B"), Value::from(1usize)),
            ]
        )
    );
    assert_eq!(results[1].method, "sum_values");
    assert_eq!(results[1].data.get(&Value::from("A")), Some(&Value::from(40.0)));
    assert_eq!(results[1].data.get(&Value::from("B")), Some(&Value::from(20.0)));
}

#[test]
fn scalar_with_many_columns_becomes_table() {
    let results = run(
        &visits_table(),
        &["region", "status"],
        vec![MethodSpec::new("count_records")],
    )
    .unwrap();
    let result = &results[0];
    assert_eq!(result.value_type(), ValueType::Table);
    assert_eq!(
        result.dimensions(),
        vec!["region".to_string(), "status".to_string()]
    );

    let data = result.data.as_table().unwrap();
    assert_eq!(data.value_column(), "value");
    // Keys come out sorted; the blank region sorts last.
    assert_eq!(
        data.column("region").unwrap(),
        vec![
            Value::from("north"),
            Value::from("north"),
            Value::from("south"),
            Value::Blank,
        ]
    );
    assert_eq!(
        data.lookup(&[Value::from("south"), Value::from("open")]),
        Some(&Value::from(2usize))
    );
    assert_eq!(
        data.lookup(&[Value::from("south"), Value::from("closed")]),
        None
    );
}

#[test]
fn vector_gains_split_dimensions() {
    let spec = MethodSpec::with_params("value_counts", Params::new().with("column", "status"));
    let results = run(&visits_table(), &["region"], vec![spec]).unwrap();
    let result = &results[0];
    assert_eq!(
        result.dimensions(),
        vec!["region".to_string(), "status".to_string()]
    );
    let data = result.data.as_table().unwrap();
    assert_eq!(data.columns(), ["region", "status", "value"]);
    assert_eq!(
        data.lookup(&[Value::from("north"), Value::from("closed")]),
        Some(&Value::from(1usize))
    );
    assert_eq!(
        data.lookup(&[Value::from("south"), Value::from("open")]),
        Some(&Value::from(2usize))
    );
    assert_eq!(data.rows().len(), 4);
}

#[test]
fn table_gets_split_columns_appended() {
    let table = Table::from_rows(
        vec!["cat", "val", "year"],
        vec![
            vec![Value::from("A"), Value::from(10.0), Value::from(2023i64)],
            vec![Value::from("B"), Value::from(20.0), Value::from(2023i64)],
            vec![Value::from("A"), Value::from(30.0), Value::from(2024i64)],
        ],
    )
    .unwrap();
    let results = run(&table, &["year"], vec![MethodSpec::new("totals_by_cat")]).unwrap();
    let data = results[0].data.as_table().unwrap();

    assert_eq!(data.columns(), ["total", "category", "year"]);
    assert_eq!(data.value_column(), "total");
    assert_eq!(
        results[0].dimensions(),
        vec!["category".to_string(), "year".to_string()]
    );
    assert_eq!(
        data.lookup(&[Value::from("A"), Value::from(2024i64)]),
        Some(&Value::from(30.0))
    );
    assert_eq!(data.rows().len(), 3);
}

#[test]
fn missing_split_columns_fail_before_grouping() {
    let err = run(&sample_table(), &["cat", "region"], vec![MethodSpec::new("explode")]).unwrap_err();
    match err {
        MetricsError::MissingSplitColumns { metric, missing } => {
            assert_eq!(metric, "metric");
            assert_eq!(missing, vec!["region".to_string()]);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn empty_table_yields_no_results() {
    let empty = Table::new(vec!["cat", "val"]);
    let results = run(&empty, &["cat"], vec![MethodSpec::new("count_records")]).unwrap();
    assert!(results.is_empty());
}

#[test]
fn single_group_still_promotes() {
    let table = Table::from_rows(
        vec!["cat", "val"],
        vec![vec![Value::from("A"), Value::from(1.0)]],
    )
    .unwrap();
    let results = run(&table, &["cat"], vec![MethodSpec::new("count_records")]).unwrap();
    assert_eq!(results[0].value_type(), ValueType::Vector);
}

#[test]
fn mixed_variants_are_rejected() {
    let groups = vec![
        (vec![Value::from("A")], TypedResult::scalar("m", "x", 1.0)),
        (
            vec![Value::from("B")],
            TypedResult::new(
                "m",
                "x",
                ResultData::vector("k", vec![(Value::from(1.0), Value::from(2.0))]),
            ),
        ),
    ];
    let err = combine_split_results(groups, &["cat".to_string()], "m", "x").unwrap_err();
    match err {
        MetricsError::MixedSplitResults { found, .. } => {
            assert_eq!(found, vec![ValueType::Scalar, ValueType::Vector]);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn vectors_with_different_dimension_names_are_rejected() {
    let vector = |dimension: &str| {
        TypedResult::new(
            "m",
            "x",
            ResultData::vector(dimension, vec![(Value::from(1.0), Value::from(2.0))]),
        )
    };
    let groups = vec![
        (vec![Value::from("A")], vector("day")),
        (vec![Value::from("B")], vector("week")),
    ];
    let err = combine_split_results(groups, &["cat".to_string()], "m", "x").unwrap_err();
    match err {
        MetricsError::InconsistentSplitResults { what, found, .. } => {
            assert_eq!(what, "dimension names");
            assert_eq!(found, vec!["day".to_string(), "week".to_string()]);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn tables_with_different_value_columns_are_rejected() {
    let table = |value_column: &str| {
        let table = Table::from_rows(
            vec!["day", value_column],
            vec![vec![Value::from(1.0), Value::from(2.0)]],
        )
        .unwrap();
        TypedResult::new("m", "x", ResultData::from_table(table, Some(value_column)).unwrap())
    };
    let groups = vec![
        (vec![Value::from("A")], table("total")),
        (vec![Value::from("B")], table("count")),
    ];
    let err = combine_split_results(groups, &["cat".to_string()], "m", "x").unwrap_err();
    assert!(matches!(
        err,
        MetricsError::InconsistentSplitResults { what: "value columns", .. }
    ));
}

#[test]
fn blank_split_key_sorts_last() {
    let results = run(&visits_table(), &["region"], vec![MethodSpec::new("count_records")]).unwrap();
    let ResultData::Vector { entries, .. } = &results[0].data else {
        panic!("expected a vector result");
    };
    let keys: Vec<&Value> = entries.iter().map(|(k, _)| k).collect();
    assert_eq!(keys, vec![&Value::from("north"), &Value::from("south"), &Value::Blank]);
}

#[test]
fn method_error_inside_group_aborts() {
    let err = run(&sample_table(), &["cat"], vec![MethodSpec::new("explode")]).unwrap_err();
    assert!(matches!(err, MetricsError::MethodExecution(_)));
}

#[test]
fn split_spec_normalization() {
    assert_eq!(normalize_split_by(&json!(null)).unwrap(), None);
    assert_eq!(normalize_split_by(&json!([])).unwrap(), None);
    assert_eq!(
        normalize_split_by(&json!("cat")).unwrap(),
        Some(vec!["cat".to_string()])
    );
    assert_eq!(
        normalize_split_by(&json!(["b", "a"])).unwrap(),
        Some(vec!["b".to_string(), "a".to_string()])
    );
    assert!(normalize_split_by(&json!(["a", 1])).is_err());
    assert!(normalize_split_by(&json!(3)).is_err());
}
