//! gp-core: guestpilot core library
//!
//! Shared vocabulary for the guestpilot workspace: configuration, the LLM
//! conversation model and client, tool call/result types, and the
//! sub-worker types that the tool executor and the agent runtime exchange.

pub mod agents;
pub mod config;
pub mod error;
pub mod llm;
pub mod tool;

pub use agents::{
    Domain, MailMessage, SpawnRequest, SubworkerControl, SubworkerInfo, SubworkerStatus, TodoItem,
    TodoList,
};
pub use config::{AgentsConfig, Config, LlmConfig, McpConfig, PolicyConfig, WorkerConfig};
pub use error::{Error, Result};
pub use llm::{
    ClaudeClient, ImageSource, LlmClient, LlmTurn, Message, MessageContent, MessagesRequest,
    ToolDefinition,
};
pub use tool::{ExecutionKind, ExecutionRecord, SchemaBuilder, ToolCall, ToolOutput, ToolResult};
