//! External plugin tools
//!
//! Tools whose names start with [`crate::canonical::PLUGIN_PREFIX`] bypass
//! the fixed command set and go to this collaborator verbatim.

use async_trait::async_trait;
use gp_core::{ToolDefinition, ToolResult};
use serde_json::{Map, Value};

use crate::error::Result;

#[async_trait]
pub trait PluginTools: Send + Sync {
    /// Definitions of every plugin tool, already carrying the prefix
    fn definitions(&self) -> Vec<ToolDefinition>;

    /// Invoke a plugin tool. Unknown names yield `ToolError::PluginError`.
    async fn call(&self, name: &str, arguments: Map<String, Value>) -> Result<ToolResult>;
}
