//! MCP server list
//!
//! Loaded from the JSON (or TOML) file named by `[mcp].config_path`:
//!
//! ```json
//! {"servers": [{"name": "git", "command": "uvx mcp-server-git", "env": {"GIT_DIR": "/srv"}}]}
//! ```

use std::collections::HashMap;
use std::path::Path;

use gp_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// One MCP server started as a child process
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServerConfig {
    /// Label used in exposed tool names: `mcp__<name>__<tool>`
    pub name: String,

    /// Command line, split on whitespace
    pub command: String,

    #[serde(default)]
    pub env: HashMap<String, String>,

    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct McpServersConfig {
    #[serde(default)]
    pub servers: Vec<McpServerConfig>,
}

impl McpServersConfig {
    /// Load from a file; `.toml` files are read as TOML, everything else as JSON
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read MCP config {}: {}", path.display(), e)))?;

        if path.extension().is_some_and(|ext| ext == "toml") {
            toml::from_str(&content).map_err(|e| Error::Config(format!("Invalid MCP config TOML: {}", e)))
        } else {
            serde_json::from_str(&content).map_err(|e| Error::Config(format!("Invalid MCP config JSON: {}", e)))
        }
    }

    pub fn enabled_servers(&self) -> impl Iterator<Item = &McpServerConfig> {
        self.servers.iter().filter(|s| s.enabled && !s.command.trim().is_empty())
    }
}
