//! LLM API HTTP client

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info, warn};

use crate::config::LlmConfig;
use crate::error::{Error, Result};

use super::types::*;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";

/// Source of assistant turns for a decision loop
///
/// The wire format behind an implementation is its own business; callers only
/// see whole turns.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Model used when a request does not name one
    fn model(&self) -> &str;

    /// Request one assistant turn for the given conversation
    async fn next_turn(&self, request: MessagesRequest) -> Result<LlmTurn>;
}

/// Anthropic Messages API client
#[derive(Clone)]
pub struct ClaudeClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl ClaudeClient {
    /// Create a new client from configuration
    pub fn new(config: &LlmConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(Error::Config("LLM_API_KEY not set".to_string()));
        }

        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .map_err(Error::Http)?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        })
    }
}

#[async_trait]
impl LlmClient for ClaudeClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn next_turn(&self, request: MessagesRequest) -> Result<LlmTurn> {
        let url = format!("{}/messages", self.base_url);

        debug!(
            model = %request.model,
            messages = request.messages.len(),
            tools = request.tools.as_ref().map(|t| t.len()).unwrap_or(0),
            "Sending request to LLM API"
        );

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            warn!("LLM API error: {} - {}", status, body);
            return Err(Error::LlmApi(format!("{}: {}", status, body)));
        }

        let parsed: MessagesResponse = serde_json::from_str(&body)
            .map_err(|e| Error::LlmApi(format!("Failed to parse response: {} - {}", e, body)))?;

        info!(
            stop_reason = ?parsed.stop_reason,
            output_tokens = parsed.usage.map(|u| u.output_tokens).unwrap_or(0),
            "LLM API response"
        );

        Ok(parsed.into())
    }
}
