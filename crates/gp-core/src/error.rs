//! Error types for gp-core

use thiserror::Error;

/// Main error type for gp-core
#[derive(Error, Debug)]
pub enum Error {
    #[error("LLM API error: {0}")]
    LlmApi(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Sub-worker error: {0}")]
    Subworker(String),

    #[error("MCP error: {0}")]
    Mcp(String),
}

/// Result type alias for gp-core
pub type Result<T> = std::result::Result<T, Error>;
