pub mod chart;
pub mod compiler;
pub mod executor;
pub mod expression;
pub mod plan;
pub mod stage;
pub mod validator;

pub use chart::{ChartKind, ChartRecord, ChartSpec, DEFAULT_HISTOGRAM_BINS};
pub use compiler::{compile_chart, compile_chart_config, compile_plan, CompileError};
pub use executor::{execute, execute_chart, ChartStatus, ExecuteError, MaterializedChart};
pub use expression::{parse_expression, AggregateExpression, AggregateFunction, ExpressionError};
pub use plan::{
    extract_plan, Filter, NumericOperation, Operation, PlanError, PlanRequest, QueryPlan,
    SUPPORTED_OPERATIONS,
};
pub use stage::{pipeline_json, GroupSpec, NumericField, Predicate, ProjectExpr, Projection, Stage};
pub use validator::{validate, ValidationError};

use crate::data::{ResultRow, SchemaCatalog};
use crate::storage::Datastore;

/// Convenience function to validate, compile, and execute a plan request
pub fn run_plan(
    store: &dyn Datastore,
    collection: &str,
    catalog: &SchemaCatalog,
    request: &PlanRequest,
) -> Result<Vec<ResultRow>, QueryError> {
    let plan = validate(request, catalog)?;
    let stages = compile_plan(&plan);
    let rows = execute(store, collection, &stages)?;
    Ok(rows)
}

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("Expression error: {0}")]
    Expression(#[from] ExpressionError),

    #[error("Plan error: {0}")]
    Plan(#[from] PlanError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Compile error: {0}")]
    Compile(#[from] CompileError),

    #[error("Execute error: {0}")]
    Execute(#[from] ExecuteError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::SchemaRecord;
    use crate::storage::MemoryStore;
    use serde_json::json;

    fn catalog() -> SchemaCatalog {
        SchemaCatalog::from_records(&[
            SchemaRecord {
                attribute: "country".into(),
                data_type: "string".into(),
            },
            SchemaRecord {
                attribute: "revenue".into(),
                data_type: "float".into(),
            },
        ])
    }

    fn store() -> MemoryStore {
        let store = MemoryStore::new();
        for (country, revenue) in [("NO", 10.5), ("SE", 4.0), ("NO", 1.0)] {
            let doc = json!({"country": country, "revenue": revenue});
            store
                .insert("p_data", doc.as_object().cloned().unwrap())
                .unwrap();
        }
        store
    }

    #[test]
    fn test_run_plan_group_by_count() {
        let request = PlanRequest::new("group_by_count").with_field("country");
        let rows = run_plan(&store(), "p_data", &catalog(), &request).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("_id"), Some(&json!("NO")));
        assert_eq!(rows[0].get("count"), Some(&json!(2)));
    }

    #[test]
    fn test_run_plan_filtered_sum() {
        let request = PlanRequest::new("sum")
            .with_field("revenue")
            .with_filter(json!({"country": "NO"}));
        let rows = run_plan(&store(), "p_data", &catalog(), &request).unwrap();
        assert_eq!(rows[0].get("value"), Some(&json!(11.5)));
    }

    #[test]
    fn test_run_plan_surfaces_validation() {
        let request = PlanRequest::new("avg").with_field("country");
        let err = run_plan(&store(), "p_data", &catalog(), &request).unwrap_err();
        assert!(matches!(err, QueryError::Validation(ValidationError::TypeMismatch { .. })));
    }
}
