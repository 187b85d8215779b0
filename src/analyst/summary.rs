use serde_json::Value;

use super::context::{DataStatistics, ProjectProfile, QueryType};
use crate::data::ResultRow;
use crate::gateway::Prompt;
use crate::query::{Operation, QueryPlan};

pub const SUMMARY_TEMPLATE: &str = "analyst_summary";

/// Groups listed in a group_by_count digest
const TOP_GROUPS: usize = 3;

/// Short textual digest of a result set, handed to the summarizer
pub fn prepare_result_summary(rows: &[ResultRow], plan: &QueryPlan) -> String {
    let Some(first) = rows.first() else {
        return "No data found matching the query criteria.".to_string();
    };

    match &plan.operation {
        Operation::Aggregate { .. } => {
            format!("Result: {}", display_value(first.get("value")))
        }
        Operation::Count => {
            let total = first.get("total").and_then(Value::as_i64).unwrap_or(0);
            format!("Total count: {} records", with_thousands(total))
        }
        Operation::GroupByCount { .. } => {
            let total: i64 = rows
                .iter()
                .filter_map(|r| r.get("count").and_then(Value::as_i64))
                .sum();
            let mut summary = format!(
                "Found {} distinct groups, {} total records.\nTop {}:\n",
                rows.len(),
                with_thousands(total),
                TOP_GROUPS
            );
            for row in rows.iter().take(TOP_GROUPS) {
                let group = match row.get("_id") {
                    None | Some(Value::Null) => "Unknown".to_string(),
                    other => display_value(other),
                };
                let count = row.get("count").and_then(Value::as_i64).unwrap_or(0);
                summary.push_str(&format!("  • {}: {}\n", group, with_thousands(count)));
            }
            summary
        }
        Operation::FilterOnly { .. } => format!("Returned {} results", rows.len()),
    }
}

fn display_value(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => "null".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// 1234567 -> "1,234,567"
fn with_thousands(n: i64) -> String {
    let digits = n.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    if n < 0 {
        out.insert(0, '-');
    }
    out
}

pub fn summary_prompt(
    question: &str,
    query_type: QueryType,
    plan: &QueryPlan,
    rows: &[ResultRow],
    stats: &DataStatistics,
    profile: &ProjectProfile,
) -> Prompt {
    let result: Vec<Value> = rows.iter().cloned().map(Value::Object).collect();

    Prompt::new(SUMMARY_TEMPLATE)
        .with_var("user_query", question)
        .with_var("query_type", query_type.as_str())
        .with_var("query_plan", plan.to_json())
        .with_var("result", result)
        .with_var("result_summary", prepare_result_summary(rows, plan))
        .with_var("project_name", profile.name.as_str())
        .with_var("project_domain", profile.domain.as_str())
        .with_var("total_documents", stats.total_documents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::NumericOperation;
    use serde_json::json;

    fn plan(operation: Operation) -> QueryPlan {
        QueryPlan {
            operation,
            filter: None,
            limit: None,
        }
    }

    fn rows(values: Vec<Value>) -> Vec<ResultRow> {
        values
            .into_iter()
            .map(|v| v.as_object().cloned().unwrap())
            .collect()
    }

    #[test]
    fn test_empty_result() {
        assert_eq!(
            prepare_result_summary(&[], &plan(Operation::Count)),
            "No data found matching the query criteria."
        );
    }

    #[test]
    fn test_scalar_and_count() {
        let sum = plan(Operation::Aggregate {
            op: NumericOperation::Sum,
            field: "revenue".into(),
        });
        assert_eq!(
            prepare_result_summary(&rows(vec![json!({"_id": null, "value": 12345.6})]), &sum),
            "Result: 12345.6"
        );
        assert_eq!(
            prepare_result_summary(&rows(vec![json!({"total": 1234567})]), &plan(Operation::Count)),
            "Total count: 1,234,567 records"
        );
    }

    #[test]
    fn test_group_digest() {
        let grouped = rows(vec![
            json!({"_id": "NO", "count": 1200}),
            json!({"_id": "SE", "count": 30}),
            json!({"_id": null, "count": 2}),
            json!({"_id": "DK", "count": 1}),
        ]);
        let summary = prepare_result_summary(
            &grouped,
            &plan(Operation::GroupByCount {
                field: "country".into(),
            }),
        );
        assert!(summary.starts_with("Found 4 distinct groups, 1,233 total records."));
        assert!(summary.contains("  • NO: 1,200\n"));
        assert!(summary.contains("  • Unknown: 2\n"));
        assert!(!summary.contains("DK"));
    }

    #[test]
    fn test_filter_only_digest() {
        let out = prepare_result_summary(
            &rows(vec![json!({"a": 1}), json!({"a": 2})]),
            &plan(Operation::FilterOnly {
                field: "a".into(),
            }),
        );
        assert_eq!(out, "Returned 2 results");
    }

    #[test]
    fn test_thousands() {
        assert_eq!(with_thousands(0), "0");
        assert_eq!(with_thousands(999), "999");
        assert_eq!(with_thousands(1000), "1,000");
        assert_eq!(with_thousands(-12345), "-12,345");
    }
}
