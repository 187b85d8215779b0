use super::plan::{NumericOperation, Operation, PlanRequest, QueryPlan, SUPPORTED_OPERATIONS};
use crate::data::SchemaCatalog;

/// Maximum number of suggested fields carried by a validation error
const MAX_SIMILAR_FIELDS: usize = 5;
/// Fields listed when nothing similar to an unknown field exists
const MAX_LISTED_FIELDS: usize = 10;

/// Check a plan request against the schema catalog.
///
/// Rules apply in order and the first failure wins:
/// 1. the operation must be supported;
/// 2. a field, when given for anything but `count`, must exist;
/// 3. every operation but `count` needs a field;
/// 4. numeric operations need a field declared `integer`, `float`, `number`
///    or `numeric`.
///
/// `count` ignores its field entirely.
pub fn validate(request: &PlanRequest, catalog: &SchemaCatalog) -> Result<QueryPlan, ValidationError> {
    let op = request.operation.as_str();

    if !SUPPORTED_OPERATIONS.contains(&op) {
        return Err(ValidationError::UnsupportedOperation {
            operation: request.operation.clone(),
            supported: SUPPORTED_OPERATIONS.to_vec(),
        });
    }

    if op != "count" {
        if let Some(field) = &request.field {
            if !catalog.contains(field) {
                return Err(unknown_field(field, catalog));
            }
        }
    }

    let operation = match op {
        "count" => Operation::Count,
        "filter_only" => Operation::FilterOnly {
            field: require_field(request)?,
        },
        "group_by_count" => Operation::GroupByCount {
            field: require_field(request)?,
        },
        numeric => {
            let numeric_op = match numeric {
                "avg" => NumericOperation::Avg,
                "sum" => NumericOperation::Sum,
                "max" => NumericOperation::Max,
                _ => NumericOperation::Min,
            };
            let field = require_field(request)?;
            let declared = catalog.declared_type(&field);
            if !declared.map(|t| t.is_numeric()).unwrap_or(false) {
                return Err(ValidationError::TypeMismatch {
                    declared: catalog
                        .field(&field)
                        .map(|f| f.raw_type.clone())
                        .unwrap_or_else(|| "unknown".to_string()),
                    field,
                    operation: numeric.to_string(),
                    numeric_fields: catalog
                        .numeric_fields()
                        .into_iter()
                        .take(MAX_SIMILAR_FIELDS)
                        .collect(),
                });
            }
            Operation::Aggregate {
                op: numeric_op,
                field,
            }
        }
    };

    Ok(QueryPlan {
        operation,
        filter: request.filter.clone(),
        limit: request.limit,
    })
}

fn require_field(request: &PlanRequest) -> Result<String, ValidationError> {
    request
        .field
        .clone()
        .ok_or_else(|| ValidationError::MissingField {
            operation: request.operation.clone(),
        })
}

fn unknown_field(field: &str, catalog: &SchemaCatalog) -> ValidationError {
    let similar = catalog.similar_fields(field);
    let (suggestions, similar) = if similar.is_empty() {
        let listed = catalog.field_names().into_iter().take(MAX_LISTED_FIELDS).collect();
        (listed, false)
    } else {
        (similar.into_iter().take(MAX_SIMILAR_FIELDS).collect(), true)
    };

    ValidationError::UnknownField {
        field: field.to_string(),
        suggestions,
        similar,
        available: catalog.len(),
    }
}

/// User-correctable plan problems; messages are shown to the caller verbatim
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Operation '{operation}' is not supported. Supported operations: {}", .supported.join(", "))]
    UnsupportedOperation {
        operation: String,
        supported: Vec<&'static str>,
    },

    #[error(
        "Field '{field}' does not exist in the dataset. {}: {}",
        suggestion_label(.similar),
        .suggestions.join(", ")
    )]
    UnknownField {
        field: String,
        suggestions: Vec<String>,
        /// Whether `suggestions` are name matches rather than a plain listing
        similar: bool,
        available: usize,
    },

    #[error(
        "Field '{field}' is type '{declared}', not numeric. Cannot perform {operation} operation.{}",
        numeric_hint(.numeric_fields)
    )]
    TypeMismatch {
        field: String,
        declared: String,
        operation: String,
        numeric_fields: Vec<String>,
    },

    #[error("Operation '{operation}' requires a field")]
    MissingField { operation: String },
}

fn suggestion_label(similar: &bool) -> &'static str {
    if *similar {
        "Did you mean one of these"
    } else {
        "Available fields"
    }
}

fn numeric_hint(fields: &[String]) -> String {
    if fields.is_empty() {
        " No numeric fields found in this dataset.".to_string()
    } else {
        format!(" Try one of these numeric fields instead: {}", fields.join(", "))
    }
}
