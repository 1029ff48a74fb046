//! Tool execution errors

use gp_rpc::TransportError;
use thiserror::Error;

/// Failure of a single tool call
///
/// The executor never lets these escape: they are turned into a failed
/// [`gp_core::ExecutionRecord`] carrying the message.
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Missing parameter '{param}' for {tool}")]
    MissingParameter { tool: String, param: String },

    #[error("{0}")]
    ExecutionFailed(String),

    #[error("Plugin error: {0}")]
    PluginError(String),
}

impl ToolError {
    pub fn missing(tool: &str, param: &str) -> Self {
        Self::MissingParameter {
            tool: tool.to_string(),
            param: param.to_string(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::ExecutionFailed(message.into())
    }
}

impl From<TransportError> for ToolError {
    fn from(e: TransportError) -> Self {
        Self::ExecutionFailed(format!("Worker call failed: {}", e))
    }
}

impl From<gp_core::Error> for ToolError {
    fn from(e: gp_core::Error) -> Self {
        Self::ExecutionFailed(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ToolError>;
