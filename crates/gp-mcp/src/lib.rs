//! gp-mcp: MCP servers as plugin tools
//!
//! Connects to the MCP servers listed in the plugin config and exposes their
//! tools to the executor as `mcp__<server>__<tool>`.

pub mod client;
pub mod config;
pub mod host;

pub use client::{McpClient, McpTool};
pub use config::{McpServerConfig, McpServersConfig};
pub use host::{exposed_name, McpPluginHost, ToolServer};
