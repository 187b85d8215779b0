use super::chart::{ChartKind, ChartSpec};
use super::expression::{AggregateFunction, ExpressionError};
use super::plan::{Operation, QueryPlan};
use super::stage::{GroupSpec, NumericField, Predicate, ProjectExpr, Projection, Stage};
use crate::data::Coercion;

/// Cap on scatter plot points, whatever the requested scope
pub const SCATTER_POINT_LIMIT: usize = 10_000;
/// Field holding the coerced histogram value
pub const HISTOGRAM_VALUE_FIELD: &str = "numeric_value";
/// Decimal places kept on histogram bucket bounds
const BUCKET_ROUND_DIGITS: u32 = 2;

/// Output field of scalar aggregates and chart values
pub const VALUE_FIELD: &str = "value";
/// Output field of group counts
pub const COUNT_FIELD: &str = "count";
/// Output field of the count operation
pub const TOTAL_FIELD: &str = "total";

/// Compile a validated plan into pipeline stages
pub fn compile_plan(plan: &QueryPlan) -> Vec<Stage> {
    let mut stages = Vec::new();

    if let Some(filter) = &plan.filter {
        stages.push(Stage::Match(Predicate::Filter(filter.clone())));
    }

    match &plan.operation {
        Operation::GroupByCount { field } => {
            stages.push(Stage::Group(GroupSpec {
                key: Some(field.clone()),
                function: AggregateFunction::Count,
                source: None,
                output: COUNT_FIELD.to_string(),
                coerce: false,
            }));
            stages.push(Stage::Sort {
                key: COUNT_FIELD.to_string(),
                descending: true,
            });
        }
        Operation::Aggregate { op, field } => {
            stages.push(Stage::Group(GroupSpec {
                key: None,
                function: op.function(),
                source: Some(field.clone()),
                output: VALUE_FIELD.to_string(),
                coerce: false,
            }));
        }
        Operation::Count => stages.push(Stage::Count(TOTAL_FIELD.to_string())),
        Operation::FilterOnly { .. } => {}
    }

    if let Some(limit) = plan.limit {
        stages.push(Stage::Limit(limit));
    }

    tracing::debug!(
        operation = plan.operation.name(),
        stages = stages.len(),
        "Compiled query plan"
    );
    stages
}

/// Compile a typed chart specification into pipeline stages
pub fn compile_chart(spec: &ChartSpec) -> Vec<Stage> {
    let stages = match spec {
        ChartSpec::Grouped {
            group_key, value, ..
        } => grouped_stages(group_key, value.function(), value.source()),
        ChartSpec::Histogram { field, bins } => histogram_stages(field, *bins),
        ChartSpec::Scatter { x_field, y_field } => scatter_stages(x_field, y_field),
    };

    tracing::debug!(chart = %spec.kind(), stages = stages.len(), "Compiled chart");
    stages
}

/// Compile a chart straight from its stored type name and config map.
///
/// Any problem yields an error and never a partial pipeline.
pub fn compile_chart_config(
    chart_type: &str,
    config: &serde_json::Map<String, serde_json::Value>,
) -> Result<Vec<Stage>, CompileError> {
    let spec = ChartSpec::from_config(chart_type, config)?;
    Ok(compile_chart(&spec))
}

/// Bar, pie, line and geo charts: one aggregated value per group, largest first
fn grouped_stages(group_key: &str, function: AggregateFunction, source: Option<&str>) -> Vec<Stage> {
    let mut stages = vec![Stage::Match(Predicate::non_empty(vec![group_key.to_string()]))];

    if let Some(source) = source {
        stages.push(Stage::Match(Predicate::present(source)));
    }

    stages.push(Stage::Group(GroupSpec {
        key: Some(group_key.to_string()),
        function,
        source: source.map(str::to_string),
        output: VALUE_FIELD.to_string(),
        coerce: true,
    }));
    stages.push(Stage::Project(vec![
        Projection::field(group_key, "_id"),
        Projection::field(VALUE_FIELD, VALUE_FIELD),
    ]));
    stages.push(Stage::Sort {
        key: VALUE_FIELD.to_string(),
        descending: true,
    });

    stages
}

/// Equal-frequency histogram over a field holding numbers or numeric text
fn histogram_stages(field: &str, bins: usize) -> Vec<Stage> {
    vec![
        Stage::Match(Predicate::non_empty(vec![field.to_string()])),
        Stage::AddNumericField(NumericField {
            source: field.to_string(),
            target: HISTOGRAM_VALUE_FIELD.to_string(),
            coercion: Coercion::LeadingToken,
        }),
        Stage::Match(Predicate::present(HISTOGRAM_VALUE_FIELD)),
        Stage::BucketAuto {
            field: HISTOGRAM_VALUE_FIELD.to_string(),
            buckets: bins,
        },
        Stage::Project(vec![
            Projection {
                name: "range".to_string(),
                expr: ProjectExpr::RangeLabel {
                    min: "_id.min".to_string(),
                    max: "_id.max".to_string(),
                    digits: BUCKET_ROUND_DIGITS,
                },
            },
            Projection::rounded("min", "_id.min", BUCKET_ROUND_DIGITS),
            Projection::rounded("max", "_id.max", BUCKET_ROUND_DIGITS),
            Projection::field(COUNT_FIELD, COUNT_FIELD),
            Projection::field(VALUE_FIELD, COUNT_FIELD),
        ]),
    ]
}

/// Raw numeric pairs, capped at [`SCATTER_POINT_LIMIT`]
fn scatter_stages(x_field: &str, y_field: &str) -> Vec<Stage> {
    let x_numeric = format!("{}_numeric", x_field);
    let y_numeric = format!("{}_numeric", y_field);

    vec![
        Stage::Match(Predicate::non_empty(vec![
            x_field.to_string(),
            y_field.to_string(),
        ])),
        Stage::AddNumericField(NumericField {
            source: x_field.to_string(),
            target: x_numeric.clone(),
            coercion: Coercion::Compact,
        }),
        Stage::AddNumericField(NumericField {
            source: y_field.to_string(),
            target: y_numeric.clone(),
            coercion: Coercion::Compact,
        }),
        Stage::Match(Predicate::Present {
            fields: vec![x_numeric.clone(), y_numeric.clone()],
            reject_empty: false,
        }),
        Stage::Project(vec![
            Projection::field(x_field, x_numeric),
            Projection::field(y_field, y_numeric),
        ]),
        Stage::Limit(SCATTER_POINT_LIMIT),
    ]
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompileError {
    #[error("Chart '{chart}' is missing required config keys: {}", .missing.join(", "))]
    IncompleteConfig {
        chart: ChartKind,
        missing: Vec<&'static str>,
    },

    #[error(transparent)]
    InvalidExpression(#[from] ExpressionError),

    #[error("Unsupported chart type: '{0}'")]
    UnsupportedChart(String),

    #[error("Histogram bins must be a positive integer, got '{0}'")]
    InvalidBins(String),
}

impl CompileError {
    pub(crate) fn incomplete(chart: ChartKind, missing: Vec<&'static str>) -> Self {
        CompileError::IncompleteConfig { chart, missing }
    }
}
