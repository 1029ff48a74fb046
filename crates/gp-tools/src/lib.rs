//! gp-tools: tool dispatch for guestpilot
//!
//! Turns model tool calls into worker RPCs, host-side actions and
//! sub-worker control. Raw tool names are canonicalized first, so
//! `TypeText`, `type-text` and `typetext` all reach the same handler.

pub mod args;
pub mod canonical;
pub mod catalog;
pub mod command;
pub mod credentials;
pub mod error;
pub mod executor;
pub mod image;
pub mod plugin;
pub mod policy;
pub mod web_search;

pub use canonical::{canonicalize, resolve, Route, PLUGIN_PREFIX};
pub use command::{Command, ToolGroup};
pub use credentials::{CredentialStore, InMemoryCredentialStore};
pub use error::{Result, ToolError};
pub use executor::ToolExecutor;
pub use image::{GeneratedImage, ImageGenerator};
pub use plugin::PluginTools;
pub use policy::{resolve_domain, AutoApprove, CommandApprover, DomainResolution};
pub use web_search::{ExaDuckDuckGoSearch, WebSearch};
