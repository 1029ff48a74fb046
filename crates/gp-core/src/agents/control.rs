//! Collaborator interface for sub-worker supervision

use std::time::Duration;

use async_trait::async_trait;

use super::types::{MailMessage, SpawnRequest, SubworkerInfo};
use crate::Result;

/// Recipient id addressing the main decision loop
pub const MAIN_RECIPIENT: &str = "main";

/// Recipient id addressing everyone except the sender
pub const BROADCAST_RECIPIENT: &str = "broadcast";

/// Spawns, tracks and cancels concurrently running sub-workers
#[async_trait]
pub trait SubworkerControl: Send + Sync {
    /// Start a sub-worker. Fails when the todo outline is empty.
    async fn spawn(&self, request: SpawnRequest) -> Result<SubworkerInfo>;

    async fn status(&self, id: &str) -> Option<SubworkerInfo>;

    async fn list(&self) -> Vec<SubworkerInfo>;

    /// Cancel a running sub-worker. Returns false for unknown or finished ids.
    async fn cancel(&self, id: &str) -> bool;

    /// Wait up to `timeout` for the sub-worker to leave the running state.
    ///
    /// Returns `None` for unknown ids and the current (possibly still
    /// running) info when the timeout elapses.
    async fn await_result(&self, id: &str, timeout: Duration) -> Option<SubworkerInfo>;

    /// Deliver a message to `main`, a sub-worker id, or `broadcast`
    async fn send_message(&self, from: &str, to: &str, subject: &str, body: &str) -> Result<()>;

    /// Drain the mailbox of `recipient`
    async fn read_messages(&self, recipient: &str) -> Vec<MailMessage>;
}
