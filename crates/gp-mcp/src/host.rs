//! Plugin host: every tool of every connected MCP server, exposed under
//! `mcp__<server>__<tool>`

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use gp_core::{ToolDefinition, ToolResult};
use gp_tools::{PluginTools, ToolError, PLUGIN_PREFIX};
use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

use crate::client::{McpClient, McpTool};
use crate::config::McpServersConfig;

/// Something that can run tools by name, normally an [`McpClient`]
#[async_trait]
pub trait ToolServer: Send + Sync {
    fn server_name(&self) -> &str;

    async fn call_tool(&self, name: &str, arguments: Map<String, Value>) -> gp_core::Result<String>;
}

struct PluginRoute {
    server: Arc<dyn ToolServer>,
    tool: String,
}

/// Exposed name of `tool` on the server labelled `server`
pub fn exposed_name(server: &str, tool: &str) -> String {
    let label: String = server
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect();
    format!("{}{}__{}", PLUGIN_PREFIX, label, tool)
}

#[derive(Default)]
pub struct McpPluginHost {
    routes: HashMap<String, PluginRoute>,
    definitions: Vec<ToolDefinition>,
    /// Owned clients, kept for shutdown
    clients: Vec<Arc<McpClient>>,
}

impl McpPluginHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expose `tools` of `server` under the `label` namespace. A later
    /// registration of the same exposed name replaces the earlier one.
    pub fn register(&mut self, label: &str, server: Arc<dyn ToolServer>, tools: Vec<McpTool>) {
        for tool in tools {
            let name = exposed_name(label, &tool.name);
            let description = if tool.description.is_empty() {
                format!("{} tool from the {} MCP server", tool.name, label)
            } else {
                tool.description
            };

            self.definitions.retain(|d| d.name != name);
            self.definitions.push(ToolDefinition::new(name.clone(), description, tool.input_schema));
            debug!(tool = %name, "Registered MCP tool");
            self.routes.insert(
                name,
                PluginRoute {
                    server: server.clone(),
                    tool: tool.name,
                },
            );
        }
    }

    /// Connect to every enabled server. Servers that fail to start or to
    /// list their tools are skipped. Returns None when nothing connected.
    pub async fn connect(config: &McpServersConfig) -> Option<Self> {
        let mut host = Self::new();

        for server in config.enabled_servers() {
            info!(server_name = %server.name, command = %server.command, "Connecting to MCP server");
            let client = match McpClient::connect(&server.command, &server.env).await {
                Ok(client) => Arc::new(client),
                Err(e) => {
                    error!(server_name = %server.name, error = %e, "Failed to connect to MCP server");
                    continue;
                }
            };

            match client.list_tools().await {
                Ok(tools) => {
                    info!(server_name = %server.name, tool_count = tools.len(), "Discovered MCP tools");
                    host.register(&server.name, client.clone(), tools);
                    host.clients.push(client);
                }
                Err(e) => {
                    warn!(server_name = %server.name, error = %e, "Failed to list tools from MCP server");
                }
            }
        }

        if host.clients.is_empty() {
            warn!("No MCP servers connected");
            return None;
        }
        info!(
            server_count = host.clients.len(),
            tool_count = host.tool_count(),
            "MCP plugin host ready"
        );
        Some(host)
    }

    pub fn tool_count(&self) -> usize {
        self.routes.len()
    }

    pub fn server_count(&self) -> usize {
        self.clients.len()
    }

    /// Stop every child process this host started
    pub async fn shutdown(self) {
        let Self { routes, clients, .. } = self;
        drop(routes);

        for client in clients {
            match Arc::try_unwrap(client) {
                Ok(client) => {
                    if let Err(e) = client.shutdown().await {
                        warn!(error = %e, "Failed to shut down MCP client");
                    }
                }
                Err(shared) => {
                    warn!(server_name = %shared.server_name(), "MCP client still in use, skipping shutdown");
                }
            }
        }
    }
}

#[async_trait]
impl PluginTools for McpPluginHost {
    fn definitions(&self) -> Vec<ToolDefinition> {
        self.definitions.clone()
    }

    async fn call(&self, name: &str, arguments: Map<String, Value>) -> gp_tools::Result<ToolResult> {
        let route = self
            .routes
            .get(name)
            .ok_or_else(|| ToolError::PluginError(format!("Unknown plugin tool '{}'", name)))?;

        debug!(tool = %name, server_name = %route.server.server_name(), "Calling MCP tool");
        route
            .server
            .call_tool(&route.tool, arguments)
            .await
            .map(ToolResult::text)
            .map_err(|e| ToolError::PluginError(format!("{}: {}", name, e)))
    }
}
