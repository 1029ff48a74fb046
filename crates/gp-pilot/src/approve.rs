//! Interactive confirmation of shell commands

use async_trait::async_trait;
use gp_tools::CommandApprover;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;

/// Asks on the terminal before each shell command. Prompts are serialized
/// so concurrent sub-agents never interleave their questions.
pub struct StdinApprover {
    lock: Mutex<()>,
}

impl StdinApprover {
    pub fn new() -> Self {
        Self { lock: Mutex::new(()) }
    }
}

#[async_trait]
impl CommandApprover for StdinApprover {
    async fn approve(&self, command: &str) -> bool {
        let _guard = self.lock.lock().await;

        let mut stderr = tokio::io::stderr();
        let prompt = format!("\nRun this command in the worker?\n  {}\n[y/N] ", command);
        if stderr.write_all(prompt.as_bytes()).await.is_err() {
            return false;
        }
        let _ = stderr.flush().await;

        let mut answer = String::new();
        let mut stdin = BufReader::new(tokio::io::stdin());
        match stdin.read_line(&mut answer).await {
            Ok(_) => is_yes(&answer),
            Err(_) => false,
        }
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}
