//! Batch chart materialization
//!
//! Every stored chart specification of a project is compiled and executed in
//! turn. A failing chart never stops the batch; each outcome is recorded and
//! tallied in a [`MaterializeReport`].

use serde_json::Value;

use crate::config::ProjectCollections;
use crate::query::{compile_chart, execute_chart, ChartRecord, ChartStatus, CompileError};
use crate::storage::{doc_id, Datastore, StorageError};

/// Result of materializing a single chart
#[derive(Debug)]
pub enum ChartOutcome {
    /// Rows stored under the chart id
    Stored { chart_id: String, rows: usize },
    /// Empty result; the chart was deleted
    Pruned { chart_id: String },
    /// The chart could not be compiled and was left untouched
    Skipped { chart_id: String, reason: CompileError },
    /// Unreadable record or datastore failure
    Failed { chart_id: String, error: String },
}

impl ChartOutcome {
    pub fn chart_id(&self) -> &str {
        match self {
            ChartOutcome::Stored { chart_id, .. }
            | ChartOutcome::Pruned { chart_id }
            | ChartOutcome::Skipped { chart_id, .. }
            | ChartOutcome::Failed { chart_id, .. } => chart_id,
        }
    }
}

#[derive(Debug, Default)]
pub struct MaterializeReport {
    /// Charts stored with rows
    pub processed: usize,
    /// Charts whose compilation failed
    pub skipped: usize,
    /// Charts that could not be read or executed
    pub failed: usize,
    /// Charts removed for producing no rows
    pub deleted: usize,
    pub outcomes: Vec<ChartOutcome>,
}

impl MaterializeReport {
    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    fn record(&mut self, outcome: ChartOutcome) {
        match &outcome {
            ChartOutcome::Stored { .. } => self.processed += 1,
            ChartOutcome::Pruned { .. } => self.deleted += 1,
            ChartOutcome::Skipped { .. } => self.skipped += 1,
            ChartOutcome::Failed { .. } => self.failed += 1,
        }
        self.outcomes.push(outcome);
    }
}

/// Compile, execute and store every chart of a project, one at a time.
///
/// Only failing to list the charts aborts the batch.
pub fn materialize_charts(
    store: &dyn Datastore,
    collections: &ProjectCollections,
) -> Result<MaterializeReport, StorageError> {
    let records = store.find(&collections.charts)?;
    tracing::info!(
        project = %collections.project,
        charts = records.len(),
        "Materializing charts"
    );

    let mut report = MaterializeReport::default();
    for doc in records {
        let fallback_id = doc_id(&doc).unwrap_or_else(|| "<unknown>".to_string());

        let chart: ChartRecord = match serde_json::from_value(Value::Object(doc)) {
            Ok(chart) => chart,
            Err(e) => {
                tracing::warn!(chart_id = %fallback_id, "Unreadable chart record: {}", e);
                report.record(ChartOutcome::Failed {
                    chart_id: fallback_id,
                    error: e.to_string(),
                });
                continue;
            }
        };

        report.record(materialize_one(store, collections, &chart));
    }

    tracing::info!(
        processed = report.processed,
        deleted = report.deleted,
        skipped = report.skipped,
        failed = report.failed,
        "Chart materialization finished"
    );
    Ok(report)
}

fn materialize_one(
    store: &dyn Datastore,
    collections: &ProjectCollections,
    chart: &ChartRecord,
) -> ChartOutcome {
    let chart_id = chart.id.clone();

    let spec = match chart.spec() {
        Ok(spec) => spec,
        Err(reason) => {
            tracing::warn!(
                chart_id = %chart_id,
                chart_type = %chart.chart_type,
                "Skipping chart: {}",
                reason
            );
            return ChartOutcome::Skipped { chart_id, reason };
        }
    };

    let stages = compile_chart(&spec);
    match execute_chart(store, collections, chart, &stages) {
        Ok(ChartStatus::Stored { rows }) => ChartOutcome::Stored { chart_id, rows },
        Ok(ChartStatus::Pruned) => ChartOutcome::Pruned { chart_id },
        Err(e) => {
            tracing::error!(chart_id = %chart_id, "Chart execution failed: {}", e);
            ChartOutcome::Failed {
                chart_id,
                error: e.to_string(),
            }
        }
    }
}
