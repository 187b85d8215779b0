//! PulseQuery runner
//!
//! Run with: cargo run
//!
//! Loads a dataset snapshot, materializes every chart of the project, answers
//! an optional analyst question and writes the snapshot back.
//!
//! Environment variables:
//! - PULSE_SNAPSHOT: JSON snapshot path (default: start from an empty store)
//! - PULSE_PROJECT: Project id (default: demo)
//! - PULSE_LLM_PRIMARY_URL / PULSE_LLM_FALLBACK_URL: Language-model endpoints
//! - PULSE_LLM_TIMEOUT_SECS: Language-model timeout (default: 60)
//! - PULSE_QUESTION: Question for the analyst
//! - RUST_LOG: Log level (default: pulsequery=info)

use std::sync::Arc;

use pulsequery::charts::materialize_charts;
use pulsequery::gateway::HttpGateway;
use pulsequery::storage::{Datastore, MemoryStore};
use pulsequery::{Analyst, AppConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pulsequery=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env();
    let collections = config.collections();

    tracing::info!("PulseQuery configuration:");
    tracing::info!("  Project: {}", config.project);
    match &config.snapshot {
        Some(path) => tracing::info!("  Snapshot: {}", path.display()),
        None => tracing::info!("  Snapshot: none (empty store)"),
    }
    tracing::info!(
        "  Language model: primary={:?} fallback={:?} timeout={}s",
        config.llm_primary_url,
        config.llm_fallback_url,
        config.llm_timeout.as_secs()
    );

    let store = Arc::new(match &config.snapshot {
        Some(path) if path.exists() => MemoryStore::load_snapshot(path)?,
        _ => MemoryStore::new(),
    });

    let report = {
        let store = Arc::clone(&store);
        let collections = collections.clone();
        tokio::task::spawn_blocking(move || materialize_charts(store.as_ref(), &collections))
            .await??
    };
    println!(
        "Charts: {} stored, {} pruned, {} skipped, {} failed",
        report.processed, report.deleted, report.skipped, report.failed
    );

    if let Some(question) = &config.question {
        let gateway = HttpGateway::from_config(&config)?;
        if !gateway.is_configured() {
            tracing::warn!("PULSE_QUESTION set but no language-model endpoint configured");
        }

        let analyst = Analyst::new(store.clone() as Arc<dyn Datastore>, gateway, collections)?;
        let state = analyst.ask(question).await;
        if let Some(message) = state.message() {
            println!("{}", message);
        }
    }

    if let Some(path) = &config.snapshot {
        store.save_snapshot(path)?;
    }

    Ok(())
}
