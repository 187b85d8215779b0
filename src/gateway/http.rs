use serde::Deserialize;
use std::time::Duration;

use super::{GatewayError, LanguageModel, Prompt};
use crate::config::AppConfig;

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    text: String,
}

/// JSON-over-HTTP gateway with an optional fallback provider.
///
/// Each provider receives `POST {template, variables}` and answers
/// `{"text": "..."}`.
pub struct HttpGateway {
    client: reqwest::Client,
    primary: Option<String>,
    fallback: Option<String>,
}

impl HttpGateway {
    pub fn new(
        primary: Option<String>,
        fallback: Option<String>,
        timeout: Duration,
    ) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            primary,
            fallback,
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, GatewayError> {
        Self::new(
            config.llm_primary_url.clone(),
            config.llm_fallback_url.clone(),
            config.llm_timeout,
        )
    }

    pub fn is_configured(&self) -> bool {
        self.primary.is_some() || self.fallback.is_some()
    }

    async fn call(&self, url: &str, prompt: &Prompt) -> Result<String, GatewayError> {
        let response = self.client.post(url).json(prompt).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;

        tracing::debug!(
            url = %url,
            template = %prompt.template,
            chars = body.text.len(),
            "Generated text"
        );
        Ok(body.text)
    }
}

impl LanguageModel for HttpGateway {
    async fn generate(&self, prompt: &Prompt) -> Result<String, GatewayError> {
        match (self.primary.as_deref(), self.fallback.as_deref()) {
            (None, None) => Err(GatewayError::NotConfigured),
            (Some(url), None) | (None, Some(url)) => self.call(url, prompt).await,
            (Some(primary), Some(fallback)) => {
                let primary_err = match self.call(primary, prompt).await {
                    Ok(text) => return Ok(text),
                    Err(e) => e,
                };
                tracing::warn!(
                    template = %prompt.template,
                    "Primary provider failed, trying fallback: {}",
                    primary_err
                );
                self.call(fallback, prompt)
                    .await
                    .map_err(|fallback_err| GatewayError::AllProvidersFailed {
                        primary: primary_err.to_string(),
                        fallback: fallback_err.to_string(),
                    })
            }
        }
    }
}
