//! In-process interpreter for compiled pipeline stages

use serde_json::{json, Value};
use std::collections::HashMap;

use super::aggregates::{create_accumulator, Accumulator, ExtremeAccumulator};
use super::filter::matches;
use super::StorageError;
use crate::data::{
    as_number, coerce_numeric, compare_values, format_number, get_path, is_present, number,
    round_to, set_path, Coercion, Document,
};
use crate::query::{
    GroupSpec, NumericField, Predicate, ProjectExpr, Projection, Stage,
};

/// Run every stage in order over a collection snapshot
pub fn run_pipeline(docs: Vec<Document>, stages: &[Stage]) -> Result<Vec<Document>, StorageError> {
    let mut rows = docs;

    for stage in stages {
        let before = rows.len();
        rows = apply_stage(rows, stage)?;
        tracing::trace!(stage = stage.name(), before, after = rows.len(), "Applied stage");
    }

    Ok(rows)
}

fn apply_stage(rows: Vec<Document>, stage: &Stage) -> Result<Vec<Document>, StorageError> {
    match stage {
        Stage::Match(predicate) => filter_rows(rows, predicate),
        Stage::AddNumericField(field) => Ok(add_numeric_field(rows, field)),
        Stage::Group(spec) => Ok(group_rows(&rows, spec)),
        Stage::Project(projections) => Ok(rows.iter().map(|r| project_row(r, projections)).collect()),
        Stage::Sort { key, descending } => Ok(sort_rows(rows, key, *descending)),
        Stage::BucketAuto { field, buckets } => bucket_auto(&rows, field, *buckets),
        Stage::Limit(n) => Ok(rows.into_iter().take(*n).collect()),
        Stage::Count(name) => Ok(count_rows(&rows, name)),
    }
}

fn filter_rows(rows: Vec<Document>, predicate: &Predicate) -> Result<Vec<Document>, StorageError> {
    let mut kept = Vec::with_capacity(rows.len());

    for row in rows {
        let passes = match predicate {
            Predicate::Filter(filter) => matches(&row, filter.as_json())?,
            Predicate::Present { fields, reject_empty } => fields.iter().all(|field| {
                let value = get_path(&row, field);
                is_present(value) && !(*reject_empty && value == Some(&Value::String(String::new())))
            }),
        };
        if passes {
            kept.push(row);
        }
    }

    Ok(kept)
}

fn add_numeric_field(mut rows: Vec<Document>, field: &NumericField) -> Vec<Document> {
    for row in rows.iter_mut() {
        let converted = get_path(row, &field.source)
            .and_then(|v| coerce_numeric(v, field.coercion))
            .map(number)
            .unwrap_or(Value::Null);
        set_path(row, &field.target, converted);
    }
    rows
}

/// Group rows by key in first-seen order
fn group_rows(rows: &[Document], spec: &GroupSpec) -> Vec<Document> {
    let mut order: Vec<Value> = Vec::new();
    let mut groups: HashMap<String, Box<dyn Accumulator>> = HashMap::new();

    for row in rows {
        let key = spec
            .key
            .as_deref()
            .and_then(|k| get_path(row, k))
            .cloned()
            .unwrap_or(Value::Null);
        let slot = group_slot(&key);

        let acc = groups.entry(slot).or_insert_with(|| {
            order.push(key.clone());
            create_accumulator(spec.function)
        });

        let input = match spec.source.as_deref() {
            None => Value::Null,
            Some(source) => {
                let raw = get_path(row, source).unwrap_or(&Value::Null);
                if spec.coerce {
                    number(coerce_numeric(raw, Coercion::Trimmed).unwrap_or(0.0))
                } else {
                    raw.clone()
                }
            }
        };
        acc.accumulate(&input);
    }

    order
        .into_iter()
        .filter_map(|key| {
            let acc = groups.get(&group_slot(&key))?;
            let mut out = Document::new();
            out.insert("_id".to_string(), key);
            out.insert(spec.output.clone(), acc.result());
            Some(out)
        })
        .collect()
}

/// Hash slot for a group key; numerically equal keys (`1`, `1.0`) share one
fn group_slot(key: &Value) -> String {
    canonical(key).to_string()
}

fn canonical(value: &Value) -> Value {
    match value {
        Value::Number(n) => n.as_f64().map(number).unwrap_or_else(|| value.clone()),
        Value::Array(items) => Value::Array(items.iter().map(canonical).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), canonical(v)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn project_row(row: &Document, projections: &[Projection]) -> Document {
    let mut out = Document::new();

    for p in projections {
        let value = match &p.expr {
            ProjectExpr::Field(source) => get_path(row, source).cloned(),
            ProjectExpr::Rounded { field, digits } => get_path(row, field)
                .and_then(as_number)
                .map(|v| number(round_to(v, *digits))),
            ProjectExpr::RangeLabel { min, max, digits } => {
                let lo = get_path(row, min).and_then(as_number);
                let hi = get_path(row, max).and_then(as_number);
                match (lo, hi) {
                    (Some(lo), Some(hi)) => Some(Value::String(format!(
                        "{} - {}",
                        format_number(round_to(lo, *digits)),
                        format_number(round_to(hi, *digits))
                    ))),
                    _ => Some(Value::Null),
                }
            }
        };

        // Missing fields are left out rather than projected as null
        if let Some(value) = value {
            out.insert(p.name.clone(), value);
        }
    }

    out
}

fn sort_rows(mut rows: Vec<Document>, key: &str, descending: bool) -> Vec<Document> {
    rows.sort_by(|a, b| {
        let left = get_path(a, key).unwrap_or(&Value::Null);
        let right = get_path(b, key).unwrap_or(&Value::Null);
        let ord = compare_values(left, right);
        if descending {
            ord.reverse()
        } else {
            ord
        }
    });
    rows
}

fn count_rows(rows: &[Document], name: &str) -> Vec<Document> {
    if rows.is_empty() {
        return Vec::new();
    }
    let mut out = Document::new();
    out.insert(name.to_string(), json!(rows.len()));
    vec![out]
}

/// Equal-frequency bucketing over the numeric values of `field`.
///
/// Buckets never split a run of equal values, so fewer buckets than
/// requested come back when there are few distinct values.
fn bucket_auto(rows: &[Document], field: &str, buckets: usize) -> Result<Vec<Document>, StorageError> {
    if buckets == 0 {
        return Err(StorageError::InvalidStage(
            "bucket_auto requires at least one bucket".into(),
        ));
    }

    let mut values: Vec<Value> = rows
        .iter()
        .filter_map(|row| get_path(row, field))
        .filter(|v| as_number(v).is_some())
        .cloned()
        .collect();
    values.sort_by(compare_values);

    let mut ranges: Vec<(usize, usize)> = Vec::new();
    let mut start = 0;
    while start < values.len() {
        let remaining_buckets = buckets.saturating_sub(ranges.len()).max(1);
        let remaining = values.len() - start;
        let size = remaining.div_ceil(remaining_buckets);

        let mut end = start + size;
        while end < values.len() && compare_values(&values[end], &values[end - 1]).is_eq() {
            end += 1;
        }
        ranges.push((start, end));
        start = end;
    }

    let mut out = Vec::with_capacity(ranges.len());
    for (i, &(start, end)) in ranges.iter().enumerate() {
        let members = &values[start..end];
        let upper = match ranges.get(i + 1) {
            Some(&(next, _)) => values[next].clone(),
            None => values[end - 1].clone(),
        };

        let mut min = ExtremeAccumulator::min();
        let mut max = ExtremeAccumulator::max();
        for v in members {
            min.accumulate(v);
            max.accumulate(v);
        }

        let mut doc = Document::new();
        doc.insert("_id".into(), json!({"min": values[start].clone(), "max": upper}));
        doc.insert("count".into(), json!(members.len()));
        doc.insert("min".into(), min.result());
        doc.insert("max".into(), max.result());
        out.push(doc);
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{compile_chart_config, AggregateFunction, Filter};

    fn docs(values: Vec<Value>) -> Vec<Document> {
        values
            .into_iter()
            .map(|v| v.as_object().cloned().unwrap())
            .collect()
    }

    #[test]
    fn test_group_and_sort() {
        let rows = docs(vec![
            json!({"country": "NO"}),
            json!({"country": "SE"}),
            json!({"country": "NO"}),
            json!({}),
        ]);
        let stages = vec![
            Stage::Group(GroupSpec {
                key: Some("country".into()),
                function: AggregateFunction::Count,
                source: None,
                output: "count".into(),
                coerce: false,
            }),
            Stage::Sort {
                key: "count".into(),
                descending: true,
            },
        ];
        let out = run_pipeline(rows, &stages).unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(Value::Object(out[0].clone()), json!({"_id": "NO", "count": 2}));
        // ties keep first-seen order
        assert_eq!(out[1].get("_id"), Some(&json!("SE")));
        assert_eq!(out[2].get("_id"), Some(&Value::Null));
    }

    #[test]
    fn test_numerically_equal_keys_share_a_group() {
        let rows = docs(vec![
            json!({"size": 1}),
            json!({"size": 1.0}),
            json!({"size": 2.5}),
            json!({"size": {"w": 3.0}}),
            json!({"size": {"w": 3}}),
        ]);
        let stages = vec![Stage::Group(GroupSpec {
            key: Some("size".into()),
            function: AggregateFunction::Count,
            source: None,
            output: "count".into(),
            coerce: false,
        })];
        let out = run_pipeline(rows, &stages).unwrap();
        let counts: Vec<_> = out.iter().map(|r| r["count"].clone()).collect();
        assert_eq!(counts, vec![json!(2), json!(1), json!(2)]);
        // first-seen key is kept
        assert_eq!(out[0]["_id"], json!(1));
    }

    #[test]
    fn test_coerced_group_rejects_inner_whitespace() {
        let rows = docs(vec![
            json!({"region": "north", "sales": "1 200"}),
            json!({"region": "north", "sales": " 7 "}),
        ]);
        let stages = compile_chart_config(
            "bar_chart",
            &json!({"x_axis": "region", "y_axis": "sum(sales)"})
                .as_object()
                .cloned()
                .unwrap(),
        )
        .unwrap();
        let out = run_pipeline(rows, &stages).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].get("value"), Some(&json!(7)));
    }

    #[test]
    fn test_coerced_group_substitutes_zero() {
        let rows = docs(vec![
            json!({"region": "north", "sales": "1,000"}),
            json!({"region": "north", "sales": "n/a"}),
            json!({"region": "south", "sales": 5}),
        ]);
        let stages = compile_chart_config(
            "bar_chart",
            &json!({"x_axis": "region", "y_axis": "sum(sales)"})
                .as_object()
                .cloned()
                .unwrap(),
        )
        .unwrap();
        let out = run_pipeline(rows, &stages).unwrap();
        assert_eq!(
            out.into_iter().map(Value::Object).collect::<Vec<_>>(),
            vec![
                json!({"region": "north", "value": 1000}),
                json!({"region": "south", "value": 5}),
            ]
        );
    }

    #[test]
    fn test_histogram_feeds_only_numeric_values() {
        let rows = docs(vec![
            json!({"price": "10"}),
            json!({"price": "20,000"}),
            json!({"price": "bad"}),
            json!({"price": 30}),
        ]);
        let stages = compile_chart_config(
            "histogram",
            &json!({"field": "price", "bins": 5}).as_object().cloned().unwrap(),
        )
        .unwrap();
        let out = run_pipeline(rows, &stages).unwrap();

        let total: i64 = out.iter().filter_map(|r| r.get("count")?.as_i64()).sum();
        assert_eq!(total, 3);
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].get("range"), Some(&json!("10 - 30")));
        assert_eq!(out[2].get("range"), Some(&json!("20000 - 20000")));
        assert_eq!(out[2].get("value"), Some(&json!(1)));
    }

    #[test]
    fn test_bucket_auto_keeps_ties_together() {
        let rows = docs(
            [1, 1, 1, 2, 3, 4]
                .iter()
                .map(|v| json!({"v": v}))
                .collect(),
        );
        let out = bucket_auto(&rows, "v", 3).unwrap();
        let counts: Vec<_> = out.iter().map(|r| r["count"].clone()).collect();
        assert_eq!(counts, vec![json!(3), json!(2), json!(1)]);
        assert_eq!(out[0]["_id"], json!({"min": 1, "max": 2}));
        assert_eq!(out[2]["_id"], json!({"min": 4, "max": 4}));
    }

    #[test]
    fn test_scatter_caps_and_drops_non_numeric() {
        let rows = docs(vec![
            json!({"h": "1 200", "w": 3}),
            json!({"h": "tall", "w": 4}),
            json!({"h": 5, "w": ""}),
        ]);
        let stages = compile_chart_config(
            "scatter_plot",
            &json!({"x_axis": "h", "y_axis": "w"}).as_object().cloned().unwrap(),
        )
        .unwrap();
        let out = run_pipeline(rows, &stages).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(Value::Object(out[0].clone()), json!({"h": 1200, "w": 3}));
    }

    #[test]
    fn test_count_and_limit() {
        let rows = docs(vec![json!({"a": 1}), json!({"a": 2}), json!({"a": 3})]);
        let filter = Filter::from_json(json!({"a": {"$gte": 2}})).unwrap();
        let stages = vec![
            Stage::Match(Predicate::Filter(filter)),
            Stage::Count("total".into()),
        ];
        let out = run_pipeline(rows.clone(), &stages).unwrap();
        assert_eq!(Value::Object(out[0].clone()), json!({"total": 2}));

        assert!(run_pipeline(Vec::new(), &[Stage::Count("total".into())])
            .unwrap()
            .is_empty());
        assert_eq!(run_pipeline(rows, &[Stage::Limit(2)]).unwrap().len(), 2);
    }

    #[test]
    fn test_invalid_filter_surfaces() {
        let rows = docs(vec![json!({"a": 1})]);
        let filter = Filter::from_json(json!({"a": {"$bogus": 1}})).unwrap();
        let result = run_pipeline(rows, &[Stage::Match(Predicate::Filter(filter))]);
        assert!(matches!(result, Err(StorageError::InvalidFilter(_))));
    }
}
