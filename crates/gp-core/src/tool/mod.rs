//! Tool call and result types shared by the executor and the decision loops

pub mod definition;
pub mod types;

pub use definition::SchemaBuilder;
pub use types::{ExecutionKind, ExecutionRecord, ToolCall, ToolOutput, ToolResult};
