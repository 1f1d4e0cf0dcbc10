#![allow(dead_code)]

use formula_metrics::{
    MethodMetadata, MethodOutput, MethodRegistry, Params, Series, Table, Value,
};
use std::collections::BTreeMap;

/// `cat`/`val` rows: (A, 10), (B, 20), (A, 30).
pub fn sample_table() -> Table {
    Table::from_rows(
        vec!["cat", "val"],
        vec![
            vec![Value::from("A"), Value::from(10.0)],
            vec![Value::from("B"), Value::from(20.0)],
            vec![Value::from("A"), Value::from(30.0)],
        ],
    )
    .unwrap()
}

/// Visits by region/site/status, with one blank region.
pub fn visits_table() -> Table {
    let rows = [
        ("north", "s1", "open", 5.0),
        ("north", "s2", "closed", 7.0),
        ("south", "s1", "open", 1.0),
        ("south", "s3", "open", 4.0),
        ("", "s2", "closed", 2.0),
    ];
    Table::from_rows(
        vec!["region", "site", "status", "visits"],
        rows.iter().map(|(region, site, status, visits)| {
            let region = if region.is_empty() {
                Value::Blank
            } else {
                Value::from(*region)
            };
            vec![region, Value::from(*site), Value::from(*status), Value::from(*visits)]
        }),
    )
    .unwrap()
}

fn column_sum(table: &Table, column: &str) -> f64 {
    table
        .column_values(column)
        .map(|values| values.filter_map(Value::as_f64).sum())
        .unwrap_or(0.0)
}

/// Registry with the methods the integration tests share.
pub fn registry() -> MethodRegistry {
    let registry = MethodRegistry::new();

    registry
        .register_fn("count_records", |table, _| Ok(table.row_count().into()))
        .unwrap();

    registry
        .register_fn("sum_values", |table, params: &Params| {
            let column = params.get_str("column").unwrap_or("val");
            Ok(column_sum(table, column).into())
        })
        .unwrap();

    registry
        .register_fn("value_counts", |table, params: &Params| {
            let column = params.require_str("column")?;
            let mut counts: BTreeMap<Value, usize> = BTreeMap::new();
            for value in table
                .column_values(column)
                .ok_or_else(|| format!("no column '{column}'"))?
            {
                *counts.entry(value.clone()).or_default() += 1;
            }
            Ok(Series::named(
                column,
                counts.into_iter().map(|(k, n)| (k, Value::from(n))),
            )
            .into())
        })
        .unwrap();

    registry
        .register(
            "totals_by_cat",
            |table, _| {
                let mut totals: BTreeMap<Value, f64> = BTreeMap::new();
                for row in table.rows() {
                    *totals.entry(row[0].clone()).or_default() += row[1].as_f64().unwrap_or(0.0);
                }
                let out = Table::from_rows(
                    vec!["total", "category"],
                    totals
                        .into_iter()
                        .map(|(cat, total)| vec![Value::from(total), cat]),
                )?;
                Ok(out.into())
            },
            MethodMetadata::value_column("total"),
        )
        .unwrap();

    registry
        .register_fn("wrapped_count", |table, _| {
            Ok(MethodOutput::mapping([(
                "value",
                MethodOutput::from(table.row_count()),
            )]))
        })
        .unwrap();

    registry
        .register_fn("explode", |_, _| Err("method exploded".into()))
        .unwrap();

    registry
}
