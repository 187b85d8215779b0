//! Runtime configuration
//!
//! Environment variables:
//! - PULSE_SNAPSHOT: JSON snapshot to load and write back (optional)
//! - PULSE_PROJECT: Project id used to name collections (default: demo)
//! - PULSE_LLM_PRIMARY_URL: Primary language-model endpoint (optional)
//! - PULSE_LLM_FALLBACK_URL: Fallback language-model endpoint (optional)
//! - PULSE_LLM_TIMEOUT_SECS: Per-request timeout in seconds (default: 60)
//! - PULSE_QUESTION: Question for the analyst (optional)

use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_PROJECT: &str = "demo";
const DEFAULT_LLM_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub snapshot: Option<PathBuf>,
    pub project: String,
    pub llm_primary_url: Option<String>,
    pub llm_fallback_url: Option<String>,
    pub llm_timeout: Duration,
    pub question: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any key lookup; blank values count as unset
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let llm_timeout = get("PULSE_LLM_TIMEOUT_SECS")
            .and_then(|s| s.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .unwrap_or(DEFAULT_LLM_TIMEOUT_SECS);

        Self {
            snapshot: get("PULSE_SNAPSHOT").map(PathBuf::from),
            project: get("PULSE_PROJECT").unwrap_or_else(|| DEFAULT_PROJECT.to_string()),
            llm_primary_url: get("PULSE_LLM_PRIMARY_URL"),
            llm_fallback_url: get("PULSE_LLM_FALLBACK_URL"),
            llm_timeout: Duration::from_secs(llm_timeout),
            question: get("PULSE_QUESTION"),
        }
    }

    pub fn collections(&self) -> ProjectCollections {
        ProjectCollections::new(&self.project)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

/// Collection names belonging to one project
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectCollections {
    pub project: String,
    /// Raw dataset documents
    pub data: String,
    /// `{attribute, data_type}` schema records
    pub schema: String,
    /// Chart specifications
    pub charts: String,
    /// Materialized chart results
    pub materialized: String,
}

impl ProjectCollections {
    pub fn new(project: &str) -> Self {
        Self {
            project: project.to_string(),
            data: format!("{}_data", project),
            schema: format!("{}_cleaned_dt", project),
            charts: format!("{}_charts", project),
            materialized: format!("{}_cleaned_data", project),
        }
    }
}
