use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::expression::AggregateFunction;

/// Operation names accepted in a plan, in the order they are reported
pub const SUPPORTED_OPERATIONS: [&str; 7] = [
    "group_by_count",
    "avg",
    "sum",
    "max",
    "min",
    "count",
    "filter_only",
];

/// Opaque datastore predicate, forwarded untouched to the datastore
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Filter(Value);

impl Filter {
    /// Wrap a predicate; null and empty objects mean "no filter"
    pub fn from_json(value: Value) -> Option<Self> {
        match &value {
            Value::Null => None,
            Value::Object(map) if map.is_empty() => None,
            _ => Some(Self(value)),
        }
    }

    pub fn as_json(&self) -> &Value {
        &self.0
    }
}

/// A plan as extracted from free text, before validation.
///
/// The operation stays a plain string so that unsupported names reach the
/// validator and are reported there.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanRequest {
    pub operation: String,
    pub field: Option<String>,
    pub filter: Option<Filter>,
    pub limit: Option<usize>,
}

impl PlanRequest {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            field: None,
            filter: None,
            limit: None,
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn with_filter(mut self, filter: Value) -> Self {
        self.filter = Filter::from_json(filter);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = (limit > 0).then_some(limit);
        self
    }

    /// Build a request from a decoded JSON object
    pub fn from_json(value: &Value) -> Result<Self, PlanError> {
        let obj = value.as_object().ok_or(PlanError::NotAnObject)?;

        let operation = match obj.get("operation") {
            Some(Value::String(op)) => op.trim().to_lowercase(),
            Some(Value::Null) | None => return Err(PlanError::MissingKey("operation")),
            Some(other) => return Err(PlanError::InvalidKey("operation", other.to_string())),
        };

        let field = match obj.get("field") {
            Some(Value::String(f)) if !f.trim().is_empty() => Some(f.trim().to_string()),
            Some(Value::String(_)) | Some(Value::Null) | None => None,
            Some(other) => return Err(PlanError::InvalidKey("field", other.to_string())),
        };

        let filter = obj.get("filter").cloned().and_then(Filter::from_json);

        let limit = match obj.get("limit") {
            None | Some(Value::Null) => None,
            Some(Value::Number(n)) => match n.as_u64() {
                Some(0) => None,
                Some(v) => Some(v as usize),
                None => return Err(PlanError::InvalidLimit(n.to_string())),
            },
            Some(other) => return Err(PlanError::InvalidLimit(other.to_string())),
        };

        Ok(Self {
            operation,
            field,
            filter,
            limit,
        })
    }
}

/// Remove an optional Markdown code fence around model output
pub fn strip_code_fence(text: &str) -> &str {
    let mut body = text.trim();
    if let Some(rest) = body.strip_prefix("```json") {
        body = rest;
    } else if let Some(rest) = body.strip_prefix("```") {
        body = rest;
    }
    if let Some(rest) = body.strip_suffix("```") {
        body = rest;
    }
    body.trim()
}

/// Decode a plan from language-model output, tolerating a code fence wrapper
pub fn extract_plan(text: &str) -> Result<PlanRequest, PlanError> {
    let body = strip_code_fence(text);
    let value: Value = serde_json::from_str(body)?;
    PlanRequest::from_json(&value)
}

/// Numeric operations over a single field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericOperation {
    Avg,
    Sum,
    Max,
    Min,
}

impl NumericOperation {
    pub fn function(&self) -> AggregateFunction {
        match self {
            NumericOperation::Avg => AggregateFunction::Avg,
            NumericOperation::Sum => AggregateFunction::Sum,
            NumericOperation::Max => AggregateFunction::Max,
            NumericOperation::Min => AggregateFunction::Min,
        }
    }
}

/// Validated operation; each variant carries exactly what it needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    GroupByCount { field: String },
    Aggregate { op: NumericOperation, field: String },
    Count,
    FilterOnly { field: String },
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::GroupByCount { .. } => "group_by_count",
            Operation::Aggregate { op, .. } => op.function().as_str(),
            Operation::Count => "count",
            Operation::FilterOnly { .. } => "filter_only",
        }
    }
}

/// A plan that passed validation against a schema catalog
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    pub operation: Operation,
    pub filter: Option<Filter>,
    pub limit: Option<usize>,
}

impl QueryPlan {
    /// JSON view of the plan, as handed to summarization
    pub fn to_json(&self) -> Value {
        let field = match &self.operation {
            Operation::GroupByCount { field }
            | Operation::Aggregate { field, .. }
            | Operation::FilterOnly { field } => Value::String(field.clone()),
            Operation::Count => Value::Null,
        };
        serde_json::json!({
            "operation": self.operation.name(),
            "field": field,
            "filter": self.filter.as_ref().map(|f| f.as_json().clone()),
            "limit": self.limit,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("Plan is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Plan must be a JSON object")]
    NotAnObject,

    #[error("Plan is missing required key '{0}'")]
    MissingKey(&'static str),

    #[error("Plan key '{0}' has an invalid value: {1}")]
    InvalidKey(&'static str, String),

    #[error("Plan limit must be a positive integer, got {0}")]
    InvalidLimit(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_plain_json() {
        let plan = extract_plan(r#"{"operation": "avg", "field": "age"}"#).unwrap();
        assert_eq!(plan.operation, "avg");
        assert_eq!(plan.field.as_deref(), Some("age"));
        assert!(plan.filter.is_none());
        assert!(plan.limit.is_none());
    }

    #[test]
    fn test_extract_fenced_json() {
        let text = "```json\n{\"operation\": \"group_by_count\", \"field\": \"country\", \"limit\": 5}\n```";
        let plan = extract_plan(text).unwrap();
        assert_eq!(plan.operation, "group_by_count");
        assert_eq!(plan.limit, Some(5));

        let bare = "```\n{\"operation\": \"count\"}\n```";
        assert_eq!(extract_plan(bare).unwrap().operation, "count");
    }

    #[test]
    fn test_extract_rejects_other_wrapping() {
        assert!(matches!(
            extract_plan("Here is the plan: {\"operation\": \"count\"}"),
            Err(PlanError::Json(_))
        ));
        assert!(matches!(extract_plan("[1, 2]"), Err(PlanError::NotAnObject)));
        assert!(matches!(
            extract_plan(r#"{"field": "age"}"#),
            Err(PlanError::MissingKey("operation"))
        ));
        assert!(matches!(
            extract_plan(r#"{"operation": "count", "limit": -3}"#),
            Err(PlanError::InvalidLimit(_))
        ));
    }

    #[test]
    fn test_empty_filter_and_zero_limit_are_absent() {
        let plan = PlanRequest::from_json(&json!({
            "operation": "filter_only",
            "filter": {},
            "limit": 0
        }))
        .unwrap();
        assert!(plan.filter.is_none());
        assert!(plan.limit.is_none());

        let plan = PlanRequest::from_json(&json!({
            "operation": "filter_only",
            "filter": {"country": "NO"}
        }))
        .unwrap();
        assert_eq!(plan.filter.unwrap().as_json(), &json!({"country": "NO"}));
    }

    #[test]
    fn test_plan_json_view() {
        let plan = QueryPlan {
            operation: Operation::Aggregate {
                op: NumericOperation::Sum,
                field: "revenue".into(),
            },
            filter: None,
            limit: Some(3),
        };
        assert_eq!(
            plan.to_json(),
            json!({"operation": "sum", "field": "revenue", "filter": null, "limit": 3})
        );
    }
}
