//! Language-model gateway
//!
//! The analyst only needs `generate(template, variables) -> text`. Prompt
//! rendering happens on the provider side; this crate ships the template name
//! and its variables.

pub mod http;

pub use http::HttpGateway;

use serde::Serialize;
use serde_json::{Map, Value};
use std::future::Future;

/// Template name plus the variables it is rendered with
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prompt {
    pub template: String,
    pub variables: Map<String, Value>,
}

impl Prompt {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            variables: Map::new(),
        }
    }

    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.variables.insert(key.into(), value.into());
        self
    }

    pub fn var(&self, key: &str) -> Option<&Value> {
        self.variables.get(key)
    }
}

/// A text generator reachable over some transport
pub trait LanguageModel: Send + Sync {
    fn generate(&self, prompt: &Prompt) -> impl Future<Output = Result<String, GatewayError>> + Send;
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Provider {url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("Provider returned an unusable response: {0}")]
    InvalidResponse(String),

    #[error("All providers failed (primary: {primary}; fallback: {fallback})")]
    AllProvidersFailed { primary: String, fallback: String },

    #[error("No language-model provider configured")]
    NotConfigured,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_builder() {
        let prompt = Prompt::new("analyst_plan")
            .with_var("user_query", "how many rows?")
            .with_var("total_documents", 42);
        assert_eq!(prompt.template, "analyst_plan");
        assert_eq!(prompt.var("total_documents"), Some(&Value::from(42)));
        assert!(prompt.var("missing").is_none());
    }
}
