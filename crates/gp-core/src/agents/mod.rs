//! Sub-worker vocabulary
//!
//! The tool executor drives sub-workers through [`SubworkerControl`]; the
//! runtime that actually spawns and supervises them lives in `gp-agents`.

pub mod control;
pub mod types;

pub use control::{BROADCAST_RECIPIENT, MAIN_RECIPIENT, SubworkerControl};
pub use types::{Domain, MailMessage, SpawnRequest, SubworkerInfo, SubworkerStatus, TodoItem, TodoList};
