//! Session context handed to the plan-extraction prompt

use serde::Serialize;
use serde_json::{Map, Value};

use crate::data::SchemaCatalog;
use crate::gateway::Prompt;
use crate::storage::Datastore;

pub const PLAN_TEMPLATE: &str = "analyst_plan";

/// Coarse intent of a question, used as a hint for plan extraction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryType {
    Counting,
    Statistical,
    Aggregation,
    Filtering,
    General,
}

impl QueryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryType::Counting => "counting",
            QueryType::Statistical => "statistical",
            QueryType::Aggregation => "aggregation",
            QueryType::Filtering => "filtering",
            QueryType::General => "general",
        }
    }
}

impl std::fmt::Display for QueryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

const KEYWORDS: [(QueryType, &[&str]); 4] = [
    (
        QueryType::Counting,
        &["how many", "count", "number of", "total number"],
    ),
    (
        QueryType::Statistical,
        &[
            "average", "mean", "median", "sum", "total", "maximum", "max", "minimum", "min",
            "highest", "lowest",
        ],
    ),
    (
        QueryType::Aggregation,
        &[
            "group by", "breakdown", "distribution", "by category", "per", "each", "top",
            "bottom",
        ],
    ),
    (
        QueryType::Filtering,
        &["show", "list", "find", "get", "where", "filter"],
    ),
];

/// Classify a question by substring keywords; the first matching class wins
pub fn classify_query(question: &str) -> QueryType {
    let lower = question.to_lowercase();
    KEYWORDS
        .iter()
        .find(|(_, words)| words.iter().any(|w| lower.contains(w)))
        .map(|(kind, _)| *kind)
        .unwrap_or(QueryType::General)
}

/// Shape of the dataset as seen by the analyst
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DataStatistics {
    pub total_documents: usize,
    pub total_fields: usize,
    pub numeric_fields: Vec<String>,
    pub categorical_fields: Vec<String>,
    pub date_fields: Vec<String>,
}

impl DataStatistics {
    /// Gather statistics; a failing document count is logged and reported as 0
    pub fn collect(store: &dyn Datastore, collection: &str, catalog: &SchemaCatalog) -> Self {
        let total_documents = store.count(collection).unwrap_or_else(|e| {
            tracing::error!(collection, "Failed to count documents: {}", e);
            0
        });

        let stats = Self {
            total_documents,
            total_fields: catalog.len(),
            numeric_fields: catalog.numeric_fields(),
            categorical_fields: catalog.categorical_fields(),
            date_fields: catalog.date_fields(),
        };

        tracing::info!(
            documents = stats.total_documents,
            numeric = stats.numeric_fields.len(),
            categorical = stats.categorical_fields.len(),
            date = stats.date_fields.len(),
            "Collected data statistics"
        );
        stats
    }
}

/// Human-facing project description
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectProfile {
    pub name: String,
    pub domain: String,
}

impl ProjectProfile {
    pub fn new(name: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            domain: domain.into(),
        }
    }
}

pub fn plan_prompt(
    question: &str,
    query_type: QueryType,
    catalog: &SchemaCatalog,
    stats: &DataStatistics,
    profile: &ProjectProfile,
) -> Prompt {
    let field_types: Map<String, Value> = catalog
        .fields()
        .iter()
        .map(|f| (f.name.clone(), Value::String(f.raw_type.clone())))
        .collect();

    Prompt::new(PLAN_TEMPLATE)
        .with_var("user_query", question)
        .with_var("query_type", query_type.as_str())
        .with_var("available_fields", catalog.field_names())
        .with_var("field_types", Value::Object(field_types))
        .with_var("project_name", profile.name.as_str())
        .with_var("project_domain", profile.domain.as_str())
        .with_var("total_documents", stats.total_documents)
        .with_var("numeric_fields", stats.numeric_fields.clone())
        .with_var("categorical_fields", stats.categorical_fields.clone())
        .with_var("date_fields", stats.date_fields.clone())
}
