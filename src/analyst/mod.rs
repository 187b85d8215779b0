//! Analyst workflow
//!
//! Turns a free-text question into an answer:
//! `Idle -> PlanExtracted -> Validated -> Compiled -> Executed -> Summarized`,
//! or `Failed` when the plan cannot be extracted or does not validate.
//! Execution errors degrade to an empty result and summarization errors to a
//! raw-rows answer; neither ends the session in `Failed`.

pub mod context;
pub mod summary;

pub use context::{classify_query, plan_prompt, DataStatistics, ProjectProfile, QueryType};
pub use summary::{prepare_result_summary, summary_prompt};

use std::sync::Arc;

use crate::config::ProjectCollections;
use crate::data::{ResultRow, SchemaCatalog};
use crate::gateway::LanguageModel;
use crate::query::{
    compile_plan, execute, extract_plan, validate, PlanRequest, QueryPlan, Stage, ValidationError,
};
use crate::storage::{Datastore, StorageError};

const DEFAULT_DOMAIN: &str = "general";

/// What the session hands back once summarization has been attempted
#[derive(Debug, Clone, PartialEq)]
pub enum Answer {
    /// Prose produced by the summarizer
    Summary(String),
    /// Summarization failed; the rows are returned as-is
    Raw { reason: String, rows: Vec<ResultRow> },
}

impl std::fmt::Display for Answer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Answer::Summary(text) => f.write_str(text),
            Answer::Raw { reason, rows } => {
                let raw = serde_json::to_string_pretty(rows).map_err(|_| std::fmt::Error)?;
                write!(
                    f,
                    "Analysis completed but error generating summary: {}\n\nRaw results: {}",
                    reason, raw
                )
            }
        }
    }
}

/// Terminal failures of a session
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Failure {
    #[error(
        "I couldn't understand your analytical query. Please rephrase it or try asking: \
         'What is the average [field]?', 'How many records are there?', \
         'Show me the top 10 [field]'"
    )]
    PlanExtraction { cause: String },

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

#[derive(Debug, Clone, PartialEq)]
pub enum AnalystState {
    Idle,
    PlanExtracted {
        request: PlanRequest,
    },
    Validated {
        plan: QueryPlan,
    },
    Compiled {
        plan: QueryPlan,
        stages: Vec<Stage>,
    },
    Executed {
        plan: QueryPlan,
        rows: Vec<ResultRow>,
    },
    Summarized {
        plan: QueryPlan,
        rows: Vec<ResultRow>,
        answer: Answer,
    },
    Failed(Failure),
}

impl AnalystState {
    pub fn name(&self) -> &'static str {
        match self {
            AnalystState::Idle => "idle",
            AnalystState::PlanExtracted { .. } => "plan_extracted",
            AnalystState::Validated { .. } => "validated",
            AnalystState::Compiled { .. } => "compiled",
            AnalystState::Executed { .. } => "executed",
            AnalystState::Summarized { .. } => "summarized",
            AnalystState::Failed(_) => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AnalystState::Summarized { .. } | AnalystState::Failed(_))
    }

    /// User-facing text of a terminal state
    pub fn message(&self) -> Option<String> {
        match self {
            AnalystState::Summarized { answer, .. } => Some(answer.to_string()),
            AnalystState::Failed(failure) => Some(failure.to_string()),
            _ => None,
        }
    }
}

/// Answers questions about one project's dataset.
///
/// The schema catalog and statistics are loaded once at construction and
/// shared read-only by every session.
pub struct Analyst<M> {
    store: Arc<dyn Datastore>,
    model: M,
    collections: ProjectCollections,
    catalog: SchemaCatalog,
    stats: DataStatistics,
    profile: ProjectProfile,
}

impl<M: LanguageModel> Analyst<M> {
    pub fn new(
        store: Arc<dyn Datastore>,
        model: M,
        collections: ProjectCollections,
    ) -> Result<Self, StorageError> {
        let catalog = SchemaCatalog::load(store.as_ref(), &collections.schema)?;
        let stats = DataStatistics::collect(store.as_ref(), &collections.data, &catalog);
        let profile = ProjectProfile::new(collections.project.clone(), DEFAULT_DOMAIN);

        Ok(Self {
            store,
            model,
            collections,
            catalog,
            stats,
            profile,
        })
    }

    pub fn with_profile(mut self, profile: ProjectProfile) -> Self {
        self.profile = profile;
        self
    }

    pub fn catalog(&self) -> &SchemaCatalog {
        &self.catalog
    }

    pub fn statistics(&self) -> &DataStatistics {
        &self.stats
    }

    /// Drive one question through the workflow to a terminal state
    pub async fn ask(&self, question: &str) -> AnalystState {
        let query_type = classify_query(question);
        tracing::info!(%query_type, project = %self.profile.name, "Analyst question received");

        let mut state = AnalystState::Idle;
        while !state.is_terminal() {
            state = self.step(question, query_type, state).await;
            tracing::debug!(state = state.name(), "Analyst transition");
        }

        if let AnalystState::Failed(failure) = &state {
            tracing::warn!("Analyst session failed: {:?}", failure);
        }
        state
    }

    async fn step(&self, question: &str, query_type: QueryType, state: AnalystState) -> AnalystState {
        match state {
            AnalystState::Idle => self.extract(question, query_type).await,

            AnalystState::PlanExtracted { request } => match validate(&request, &self.catalog) {
                Ok(plan) => AnalystState::Validated { plan },
                Err(e) => AnalystState::Failed(Failure::Validation(e)),
            },

            AnalystState::Validated { plan } => {
                let stages = compile_plan(&plan);
                AnalystState::Compiled { plan, stages }
            }

            AnalystState::Compiled { plan, stages } => {
                let rows = execute(self.store.as_ref(), &self.collections.data, &stages)
                    .unwrap_or_else(|e| {
                        tracing::warn!("Execution failed, continuing with no rows: {}", e);
                        Vec::new()
                    });
                AnalystState::Executed { plan, rows }
            }

            AnalystState::Executed { plan, rows } => {
                let answer = self.summarize(question, query_type, &plan, &rows).await;
                AnalystState::Summarized { plan, rows, answer }
            }

            terminal => terminal,
        }
    }

    async fn extract(&self, question: &str, query_type: QueryType) -> AnalystState {
        let prompt = plan_prompt(question, query_type, &self.catalog, &self.stats, &self.profile);

        let text = match self.model.generate(&prompt).await {
            Ok(text) => text,
            Err(e) => {
                tracing::error!("Plan extraction call failed: {}", e);
                return AnalystState::Failed(Failure::PlanExtraction {
                    cause: e.to_string(),
                });
            }
        };

        match extract_plan(&text) {
            Ok(request) => {
                tracing::info!(operation = %request.operation, field = ?request.field, "Extracted plan");
                AnalystState::PlanExtracted { request }
            }
            Err(e) => {
                tracing::error!(output = %text, "Failed to parse plan: {}", e);
                AnalystState::Failed(Failure::PlanExtraction {
                    cause: e.to_string(),
                })
            }
        }
    }

    async fn summarize(
        &self,
        question: &str,
        query_type: QueryType,
        plan: &QueryPlan,
        rows: &[ResultRow],
    ) -> Answer {
        let prompt = summary_prompt(question, query_type, plan, rows, &self.stats, &self.profile);

        match self.model.generate(&prompt).await {
            Ok(text) => Answer::Summary(text.trim().to_string()),
            Err(e) => {
                tracing::error!("Summarization failed, returning raw rows: {}", e);
                Answer::Raw {
                    reason: e.to_string(),
                    rows: rows.to_vec(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Document;
    use crate::gateway::{GatewayError, Prompt};
    use crate::storage::MemoryStore;
    use parking_lot::Mutex;
    use serde_json::{json, Value};
    use std::future::{ready, Future};

    /// Answers plan prompts with a fixed plan and summary prompts with a fixed text
    struct ScriptedModel {
        plan: Option<String>,
        summary: Option<String>,
        seen: Mutex<Vec<Prompt>>,
    }

    impl ScriptedModel {
        fn new(plan: Option<&str>, summary: Option<&str>) -> Self {
            Self {
                plan: plan.map(str::to_string),
                summary: summary.map(str::to_string),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl LanguageModel for ScriptedModel {
        fn generate(
            &self,
            prompt: &Prompt,
        ) -> impl Future<Output = Result<String, GatewayError>> + Send {
            self.seen.lock().push(prompt.clone());
            let reply = if prompt.template == context::PLAN_TEMPLATE {
                self.plan.clone()
            } else {
                self.summary.clone()
            };
            ready(reply.ok_or(GatewayError::NotConfigured))
        }
    }

    /// Read-only store returning canned schema records and aggregation rows
    struct CannedStore {
        schema: Vec<Document>,
        rows: Option<Vec<Document>>,
    }

    impl Datastore for CannedStore {
        fn aggregate(&self, _: &str, _: &[Stage]) -> Result<Vec<Document>, StorageError> {
            self.rows
                .clone()
                .ok_or_else(|| StorageError::Backend("connection reset".into()))
        }

        fn find(&self, collection: &str) -> Result<Vec<Document>, StorageError> {
            Ok(if collection.ends_with("_cleaned_dt") {
                self.schema.clone()
            } else {
                Vec::new()
            })
        }

        fn count(&self, _: &str) -> Result<usize, StorageError> {
            Ok(self.rows.as_ref().map(Vec::len).unwrap_or(0))
        }

        fn insert(&self, _: &str, _: Document) -> Result<String, StorageError> {
            Err(StorageError::Backend("read-only".into()))
        }

        fn upsert(&self, _: &str, _: &str, _: Document) -> Result<(), StorageError> {
            Err(StorageError::Backend("read-only".into()))
        }

        fn delete(&self, _: &str, _: &str) -> Result<bool, StorageError> {
            Err(StorageError::Backend("read-only".into()))
        }
    }

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    fn canned(schema: Value, rows: Option<Vec<Value>>) -> Arc<dyn Datastore> {
        let schema = schema.as_array().unwrap().iter().cloned().map(doc).collect();
        Arc::new(CannedStore {
            schema,
            rows: rows.map(|r| r.into_iter().map(doc).collect()),
        })
    }

    fn analyst(store: Arc<dyn Datastore>, model: ScriptedModel) -> Analyst<ScriptedModel> {
        Analyst::new(store, model, ProjectCollections::new("p")).unwrap()
    }

    #[tokio::test]
    async fn test_sum_revenue_reaches_summarized() {
        let store = canned(
            json!([{"attribute": "revenue", "data_type": "float"}]),
            Some(vec![json!({"value": 12345.6})]),
        );
        let model = ScriptedModel::new(
            Some(r#"```json
{"operation": "sum", "field": "revenue"}
```"#),
            Some("Total revenue is 12,345.6"),
        );
        let analyst = analyst(store, model);

        match analyst.ask("What is the total revenue?").await {
            AnalystState::Summarized { plan, rows, answer } => {
                assert_eq!(plan.operation.name(), "sum");
                assert_eq!(rows, vec![doc(json!({"value": 12345.6}))]);
                assert_eq!(answer, Answer::Summary("Total revenue is 12,345.6".into()));
            }
            other => panic!("unexpected state {other:?}"),
        }

        let seen = analyst.model.seen.lock();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1].var("result_summary"), Some(&json!("Result: 12345.6")));
    }

    #[tokio::test]
    async fn test_avg_on_string_fails_validation() {
        let store = canned(
            json!([{"attribute": "country", "data_type": "string"}]),
            Some(Vec::new()),
        );
        let model = ScriptedModel::new(Some(r#"{"operation": "avg", "field": "country"}"#), None);
        let state = analyst(store, model).ask("average country").await;

        match &state {
            AnalystState::Failed(Failure::Validation(err)) => {
                let message = err.to_string();
                assert!(message.contains("country"));
                assert!(message.contains("avg"));
            }
            other => panic!("unexpected state {other:?}"),
        }
        assert!(state.message().unwrap().contains("country"));
    }

    #[tokio::test]
    async fn test_malformed_plan_fails_extraction() {
        let store = canned(json!([]), Some(Vec::new()));
        let model = ScriptedModel::new(Some("Sure! Here is the plan: sum revenue"), None);
        let state = analyst(store, model).ask("sum revenue").await;

        assert!(matches!(state, AnalystState::Failed(Failure::PlanExtraction { .. })));
        assert!(state.message().unwrap().starts_with("I couldn't understand"));
    }

    #[tokio::test]
    async fn test_gateway_failure_fails_extraction() {
        let store = canned(json!([]), Some(Vec::new()));
        let state = analyst(store, ScriptedModel::new(None, None)).ask("count").await;
        assert!(matches!(state, AnalystState::Failed(Failure::PlanExtraction { .. })));
    }

    #[tokio::test]
    async fn test_execution_error_degrades_to_empty_rows() {
        let store = canned(json!([]), None);
        let model = ScriptedModel::new(Some(r#"{"operation": "count"}"#), Some("No data found."));
        let analyst = analyst(store, model);

        match analyst.ask("how many rows?").await {
            AnalystState::Summarized { rows, answer, .. } => {
                assert!(rows.is_empty());
                assert_eq!(answer, Answer::Summary("No data found.".into()));
            }
            other => panic!("unexpected state {other:?}"),
        }
        let seen = analyst.model.seen.lock();
        assert_eq!(
            seen[1].var("result_summary"),
            Some(&json!("No data found matching the query criteria."))
        );
    }

    #[tokio::test]
    async fn test_summary_failure_returns_raw_rows() {
        let store = MemoryStore::new();
        store
            .insert(
                "p_cleaned_dt",
                doc(json!({"attribute": "country", "data_type": "string"})),
            )
            .unwrap();
        for country in ["NO", "SE", "NO"] {
            store.insert("p_data", doc(json!({"country": country}))).unwrap();
        }
        let model = ScriptedModel::new(
            Some(r#"{"operation": "group_by_count", "field": "country", "limit": 1}"#),
            None,
        );
        let analyst = analyst(Arc::new(store), model);
        assert_eq!(analyst.statistics().total_documents, 3);

        let state = analyst.ask("count per country").await;
        match &state {
            AnalystState::Summarized {
                answer: Answer::Raw { rows, .. },
                ..
            } => {
                assert_eq!(rows, &vec![doc(json!({"_id": "NO", "count": 2}))]);
            }
            other => panic!("unexpected state {other:?}"),
        }
        assert!(state.message().unwrap().contains("Raw results"));
    }
}
