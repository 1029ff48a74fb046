//! LLM client and conversation types

mod client;
mod types;

pub use client::{ClaudeClient, LlmClient};
pub use types::*;
