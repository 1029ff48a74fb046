//! Sub-worker manager
//!
//! Owns the registry of spawned sub-workers and their mailboxes. Each
//! sub-worker runs a [`SubworkerRunner`] in its own tokio task under a
//! wall-clock timeout. Registry entries publish their [`SubworkerInfo`]
//! through a `watch` channel, so waiters wake on completion or cancellation
//! without polling. A terminal state is never overwritten: when cancel and
//! completion race, whichever lands first wins.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use gp_core::agents::{BROADCAST_RECIPIENT, MAIN_RECIPIENT};
use gp_core::{
    AgentsConfig, Error, LlmClient, MailMessage, Result, SpawnRequest, SubworkerControl, SubworkerInfo,
    SubworkerStatus, TodoList,
};
use gp_tools::{Command, ToolExecutor};
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use crate::runner::SubworkerRunner;

const ID_PREFIX: &str = "sub";

struct Entry {
    /// Spawn order, for stable listings
    seq: u64,
    info: watch::Sender<SubworkerInfo>,
    task: Mutex<Option<AbortHandle>>,
}

impl Entry {
    fn snapshot(&self) -> SubworkerInfo {
        self.info.borrow().clone()
    }

    /// Move to a terminal state unless one was already reached
    fn finish(&self, status: SubworkerStatus, summary: Option<String>, error: Option<String>) -> bool {
        self.info.send_if_modified(|info| info.finish(status, summary, error))
    }

    fn lock_task(&self) -> MutexGuard<'_, Option<AbortHandle>> {
        self.task.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_terminal(&self) -> bool {
        self.info.borrow().status.is_terminal()
    }

    /// Keep `handle` for a later cancel. A sub-worker cancelled before its
    /// task was attached is aborted here instead.
    fn attach(&self, handle: AbortHandle) {
        let mut task = self.lock_task();
        if self.is_terminal() {
            handle.abort();
        } else {
            *task = Some(handle);
        }
    }

    /// Mark Cancelled and abort the task. The task lock orders this against
    /// `attach`, so a task spawned concurrently never outlives the cancel.
    fn cancel(&self) -> bool {
        let mut task = self.lock_task();
        if !self.finish(SubworkerStatus::Cancelled, None, Some("Cancelled".to_string())) {
            return false;
        }
        if let Some(handle) = task.take() {
            handle.abort();
        }
        true
    }
}

/// Spawns and supervises sub-workers
pub struct SubworkerManager {
    this: Weak<SubworkerManager>,
    client: Arc<dyn LlmClient>,
    max_tokens: u64,
    /// Unrestricted executor every sub-worker executor is derived from
    executor: ToolExecutor,
    config: AgentsConfig,
    next_seq: AtomicU64,
    entries: DashMap<String, Arc<Entry>>,
    mailboxes: DashMap<String, VecDeque<MailMessage>>,
}

impl SubworkerManager {
    /// `max_tokens` bounds every sub-worker LLM turn
    pub fn new(client: Arc<dyn LlmClient>, executor: ToolExecutor, config: AgentsConfig, max_tokens: u64) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            client,
            max_tokens,
            executor,
            config,
            next_seq: AtomicU64::new(1),
            entries: DashMap::new(),
            mailboxes: DashMap::new(),
        })
    }

    fn entry(&self, id: &str) -> Option<Arc<Entry>> {
        self.entries.get(id).map(|e| e.value().clone())
    }

    /// Number of sub-workers still running
    pub fn running_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.value().info.borrow().status == SubworkerStatus::Running)
            .count()
    }

    /// Cancel every running sub-worker, returning how many were cancelled
    pub async fn cancel_all(&self) -> usize {
        let ids: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        let mut cancelled = 0;
        for id in ids {
            if self.cancel(&id).await {
                cancelled += 1;
            }
        }
        cancelled
    }

    /// Executor for one sub-worker: the domain's commands narrowed to the
    /// requested ones, its own identity and a todo list seeded from the outline
    fn executor_for(&self, id: &str, tools: &[Command], outline: &[String]) -> ToolExecutor {
        let mut executor = self
            .executor
            .restricted(tools)
            .with_identity(id)
            .with_todo_list(TodoList::new(outline.iter().cloned()));
        if let Some(this) = self.this.upgrade() {
            executor = executor.with_subworkers(this);
        }
        executor
    }
}

#[async_trait]
impl SubworkerControl for SubworkerManager {
    async fn spawn(&self, request: SpawnRequest) -> Result<SubworkerInfo> {
        if request.goal.trim().is_empty() {
            return Err(Error::Subworker("A sub-agent needs a goal".to_string()));
        }
        if !request.has_outline() {
            return Err(Error::Subworker(
                "A sub-agent needs a non-empty todo outline".to_string(),
            ));
        }

        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let id = format!("{}-{}", ID_PREFIX, seq);
        let tools = Command::granted_for(request.domain, &request.tools);
        let timeout = request
            .timeout
            .unwrap_or(Duration::from_secs(self.config.default_timeout_secs));

        let info = SubworkerInfo::running(
            id.clone(),
            request.goal.clone(),
            request.domain,
            tools.iter().map(|c| c.name().to_string()).collect(),
        )
        .with_purpose(request.purpose.clone());

        let runner = SubworkerRunner::new(
            request.goal.clone(),
            request.domain,
            self.client.clone(),
            self.executor_for(&id, &tools, &request.todo_items),
        )
        .with_model(request.model.clone())
        .with_max_iterations(self.config.max_iterations)
        .with_max_tokens(self.max_tokens)
        .with_min_report_chars(self.config.min_report_chars);

        let (sender, _) = watch::channel(info.clone());
        let entry = Arc::new(Entry {
            seq,
            info: sender,
            task: Mutex::new(None),
        });
        self.entries.insert(id.clone(), entry.clone());
        self.mailboxes.entry(id.clone()).or_default();

        let task_entry = entry.clone();
        let task_id = id.clone();
        let handle = tokio::spawn(async move {
            let (status, summary, error) = match tokio::time::timeout(timeout, runner.run()).await {
                Ok(outcome) if outcome.is_success() => (SubworkerStatus::Completed, Some(outcome.summary), None),
                Ok(outcome) => (
                    SubworkerStatus::Failed,
                    Some(outcome.summary).filter(|s| !s.is_empty()),
                    outcome.failure_reason,
                ),
                Err(_) => (
                    SubworkerStatus::Failed,
                    None,
                    Some(format!("Timed out after {}s", timeout.as_secs())),
                ),
            };

            if task_entry.finish(status, summary, error) {
                info!(id = %task_id, status = %status, "Sub-agent finished");
            } else {
                debug!(id = %task_id, "Sub-agent finished after reaching a terminal state");
            }
        });
        entry.attach(handle.abort_handle());

        info!(
            id = %id,
            domain = %request.domain,
            tools = tools.len(),
            timeout_secs = timeout.as_secs(),
            "Sub-agent spawned"
        );
        Ok(info)
    }

    async fn status(&self, id: &str) -> Option<SubworkerInfo> {
        self.entry(id).map(|e| e.snapshot())
    }

    async fn list(&self) -> Vec<SubworkerInfo> {
        let mut entries: Vec<Arc<Entry>> = self.entries.iter().map(|e| e.value().clone()).collect();
        entries.sort_by_key(|e| e.seq);
        entries.iter().map(|e| e.snapshot()).collect()
    }

    async fn cancel(&self, id: &str) -> bool {
        let Some(entry) = self.entry(id) else {
            return false;
        };
        if !entry.cancel() {
            return false;
        }
        self.mailboxes.remove(id);
        info!(id = %id, "Sub-agent cancelled");
        true
    }

    async fn await_result(&self, id: &str, timeout: Duration) -> Option<SubworkerInfo> {
        let entry = self.entry(id)?;
        let mut rx = entry.info.subscribe();

        let finished = tokio::time::timeout(timeout, rx.wait_for(|info| info.status.is_terminal()))
            .await
            .is_ok_and(|changed| changed.is_ok());
        if !finished {
            debug!(id = %id, timeout_secs = timeout.as_secs(), "Sub-agent still running after wait");
        }

        let info = rx.borrow().clone();
        if info.status.is_terminal() && self.mailboxes.remove(id).is_some() {
            debug!(id = %id, "Mailbox of finished sub-agent dropped");
        }
        Some(info)
    }

    async fn send_message(&self, from: &str, to: &str, subject: &str, body: &str) -> Result<()> {
        let recipients: Vec<String> = if to == BROADCAST_RECIPIENT {
            std::iter::once(MAIN_RECIPIENT.to_string())
                .chain(
                    self.entries
                        .iter()
                        .filter(|e| !e.value().is_terminal())
                        .map(|e| e.key().clone()),
                )
                .filter(|r| r != from)
                .collect()
        } else if to == MAIN_RECIPIENT {
            vec![to.to_string()]
        } else if let Some(entry) = self.entry(to) {
            if entry.is_terminal() {
                return Err(Error::Subworker(format!("'{}' has already finished", to)));
            }
            vec![to.to_string()]
        } else {
            warn!(from = %from, to = %to, "Message to unknown recipient dropped");
            return Err(Error::Subworker(format!("unknown recipient '{}'", to)));
        };

        let sent_at = Utc::now();
        for recipient in &recipients {
            self.mailboxes.entry(recipient.clone()).or_default().push_back(MailMessage {
                from: from.to_string(),
                to: to.to_string(),
                subject: subject.to_string(),
                body: body.to_string(),
                sent_at,
            });
        }

        debug!(from = %from, to = %to, recipients = recipients.len(), "Message delivered");
        Ok(())
    }

    async fn read_messages(&self, recipient: &str) -> Vec<MailMessage> {
        self.mailboxes
            .get_mut(recipient)
            .map(|mut queue| queue.drain(..).collect())
            .unwrap_or_default()
    }
}
