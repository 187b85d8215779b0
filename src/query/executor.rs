use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::chart::ChartRecord;
use super::stage::{pipeline_json, Stage};
use crate::config::ProjectCollections;
use crate::data::{Document, ResultRow};
use crate::storage::{Datastore, StorageError};

/// Submit a compiled pipeline to the datastore in a single call.
///
/// Datastore failures are wrapped and returned; nothing is retried here.
pub fn execute(
    store: &dyn Datastore,
    collection: &str,
    stages: &[Stage],
) -> Result<Vec<ResultRow>, ExecuteError> {
    let start = std::time::Instant::now();
    tracing::trace!(collection, pipeline = %pipeline_json(stages), "Submitting pipeline");

    let rows = store.aggregate(collection, stages).map_err(|e| {
        tracing::error!(collection, stages = stages.len(), "Pipeline execution failed: {}", e);
        ExecuteError::Storage(e)
    })?;

    tracing::debug!(
        collection,
        stages = stages.len(),
        rows = rows.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Executed pipeline"
    );
    Ok(rows)
}

/// Stored result of a chart pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaterializedChart {
    pub chart_id: String,
    pub chart_type: String,
    pub title: String,
    pub description: String,
    pub display_mode: String,
    pub config: Map<String, Value>,
    pub rows: Vec<ResultRow>,
    pub materialized_at: DateTime<Utc>,
}

impl MaterializedChart {
    pub fn new(chart: &ChartRecord, rows: Vec<ResultRow>) -> Self {
        Self {
            chart_id: chart.id.clone(),
            chart_type: chart.chart_type.clone(),
            title: chart.title.clone(),
            description: chart.description.clone(),
            display_mode: chart.display_mode.clone(),
            config: chart.config.clone(),
            rows,
            materialized_at: Utc::now(),
        }
    }

    fn to_document(&self) -> Result<Document, StorageError> {
        match serde_json::to_value(self)? {
            Value::Object(doc) => Ok(doc),
            other => Err(StorageError::Backend(format!(
                "materialized chart serialized to {}",
                other
            ))),
        }
    }
}

/// What happened to a chart after its pipeline ran
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChartStatus {
    /// Rows stored, replacing any earlier materialization
    Stored { rows: usize },
    /// Empty result: the chart and its materialization were removed
    Pruned,
}

/// Run a chart's compiled pipeline and apply the materialization policy.
///
/// A non-empty result replaces the chart's materialized rows. An empty result
/// deletes the chart specification and any stale materialization, so the
/// chart no longer appears in later reads.
pub fn execute_chart(
    store: &dyn Datastore,
    collections: &ProjectCollections,
    chart: &ChartRecord,
    stages: &[Stage],
) -> Result<ChartStatus, ExecuteError> {
    let rows = execute(store, &collections.data, stages)?;

    if rows.is_empty() {
        let removed_spec = store.delete(&collections.charts, &chart.id)?;
        let removed_rows = store.delete(&collections.materialized, &chart.id)?;
        tracing::warn!(
            chart_id = %chart.id,
            chart_type = %chart.chart_type,
            removed_spec,
            removed_rows,
            "Chart produced no rows, removed"
        );
        return Ok(ChartStatus::Pruned);
    }

    let count = rows.len();
    let record = MaterializedChart::new(chart, rows);
    store.upsert(&collections.materialized, &chart.id, record.to_document()?)?;

    tracing::info!(chart_id = %chart.id, rows = count, "Materialized chart");
    Ok(ChartStatus::Stored { rows: count })
}

#[derive(Debug, thiserror::Error)]
pub enum ExecuteError {
    #[error("Execution error: {0}")]
    Storage(#[from] StorageError),
}
