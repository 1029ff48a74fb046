//! gp-agents: sub-worker orchestration for guestpilot
//!
//! - SubworkerRunner: one nested decision loop with a restricted tool set
//! - Report: judges a sub-worker's final free-text report
//! - SubworkerManager: spawns, tracks, cancels and awaits runners, and
//!   carries messages between them and the main loop

pub mod manager;
pub mod prompt;
pub mod report;
pub mod runner;

pub use manager::SubworkerManager;
pub use report::{FailureReason, Report, ReportedStatus, Verdict};
pub use runner::{RunOutcome, RunStatus, SubworkerRunner};
