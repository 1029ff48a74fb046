//! Client for one MCP server running as a child process

use std::collections::HashMap;

use async_trait::async_trait;
use gp_core::{Error, Result};
use rmcp::{
    model::{CallToolRequestParams, RawContent, Tool},
    service::{RoleClient, RunningService, ServiceExt},
    transport::{ConfigureCommandExt, TokioChildProcess},
};
use serde_json::{Map, Value};
use tokio::process::Command;

use crate::host::ToolServer;

/// Tool advertised by an MCP server
#[derive(Debug, Clone)]
pub struct McpTool {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

impl From<Tool> for McpTool {
    fn from(tool: Tool) -> Self {
        Self {
            name: tool.name.to_string(),
            description: tool.description.clone().unwrap_or_default().to_string(),
            input_schema: serde_json::to_value(&tool.input_schema).unwrap_or(Value::Null),
        }
    }
}

pub struct McpClient {
    service: RunningService<RoleClient, ()>,
    server_name: String,
}

impl McpClient {
    /// Start `command` with `env` added to the environment and perform the
    /// MCP handshake
    pub async fn connect(command: &str, env: &HashMap<String, String>) -> Result<Self> {
        let mut parts = command.split_whitespace();
        let program = parts.next().ok_or_else(|| Error::Config("Empty MCP server command".into()))?;
        let args: Vec<&str> = parts.collect();

        let transport = TokioChildProcess::new(Command::new(program).configure(|c| {
            c.args(&args);
            c.envs(env);
        }))
        .map_err(|e| Error::Mcp(format!("Failed to start '{}': {}", program, e)))?;

        let service = ()
            .serve(transport)
            .await
            .map_err(|e| Error::Mcp(format!("Failed to connect: {}", e)))?;

        let server_name = service
            .peer_info()
            .map(|info| info.server_info.name.to_string())
            .unwrap_or_else(|| "unknown".to_string());

        Ok(Self { service, server_name })
    }

    pub async fn list_tools(&self) -> Result<Vec<McpTool>> {
        let result = self
            .service
            .list_tools(Default::default())
            .await
            .map_err(|e| Error::Mcp(format!("Failed to list tools: {}", e)))?;

        Ok(result.tools.into_iter().map(McpTool::from).collect())
    }

    pub async fn shutdown(self) -> Result<()> {
        self.service
            .cancel()
            .await
            .map_err(|e| Error::Mcp(format!("Shutdown failed: {}", e)))?;
        Ok(())
    }
}

#[async_trait]
impl ToolServer for McpClient {
    fn server_name(&self) -> &str {
        &self.server_name
    }

    /// Text blocks of the result, joined by newlines
    async fn call_tool(&self, name: &str, arguments: Map<String, Value>) -> Result<String> {
        let result = self
            .service
            .call_tool(CallToolRequestParams {
                meta: None,
                name: name.to_string().into(),
                arguments: Some(arguments),
                task: None,
            })
            .await
            .map_err(|e| Error::Mcp(format!("Tool call failed: {}", e)))?;

        let output = result
            .content
            .into_iter()
            .filter_map(|c| match c.raw {
                RawContent::Text(text) => Some(text.text),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n");

        if result.is_error == Some(true) {
            return Err(Error::Mcp(output));
        }
        Ok(output)
    }
}
