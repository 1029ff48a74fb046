//! Sub-worker handlers, backed by the [`SubworkerControl`] collaborator

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use gp_core::{Domain, MailMessage, SpawnRequest, SubworkerControl, SubworkerInfo, SubworkerStatus, ToolResult};
use tokio::time::Instant;
use tracing::info;

use super::ToolExecutor;
use crate::args::Args;
use crate::command::Command;
use crate::error::{Result, ToolError};
use crate::policy::resolve_domain;

const DEFAULT_AWAIT_SECS: u64 = 300;
const MAX_AWAIT_SECS: u64 = 3600;

/// How one awaited id ended up
enum AwaitOutcome {
    NotFound,
    Finished(SubworkerInfo),
    TimedOut(SubworkerInfo),
}

impl ToolExecutor {
    fn control(&self) -> Result<&Arc<dyn SubworkerControl>> {
        self.subworkers
            .as_ref()
            .ok_or_else(|| ToolError::failed("Sub-agents are not available here"))
    }

    pub(super) async fn spawn_subagent(&self, args: &Args<'_>) -> Result<ToolResult> {
        let control = self.control()?;
        let goal = args.required_any(&["goal", "task"])?;

        let todo_items = args.string_list(&["todo_items", "todos", "todo_list", "items"]);
        if todo_items.is_empty() {
            return Ok(ToolResult::text(
                "Sub-agent not spawned: provide todo_items, the list of steps the sub-agent must \
                 check off. Its final report is judged against that list.",
            ));
        }

        let requested = args
            .opt_str("domain")
            .and_then(|d| Domain::parse(&d))
            .unwrap_or(Domain::Mixed);
        let resolution = resolve_domain(&goal, requested);
        let tools = Command::granted_for(resolution.domain, &args.string_list(&["tools", "allowed_tools"]));

        let mut request = SpawnRequest::new(goal, resolution.domain)
            .with_tools(tools.iter().map(|c| c.name().to_string()).collect())
            .with_todo_items(todo_items);
        if let Some(secs) = args.opt_u64("timeout_secs").filter(|s| *s > 0) {
            request = request.with_timeout(Duration::from_secs(secs));
        }
        request.model = args.opt_str("model").filter(|m| !m.trim().is_empty());
        request.purpose = args.opt_str("purpose").filter(|p| !p.trim().is_empty());

        let info = control.spawn(request).await?;
        info!(id = %info.id, domain = %info.domain, tools = info.tools.len(), "Sub-agent spawned");

        let mut text = format!(
            "Spawned sub-agent {} (domain: {}, tools: {}).",
            info.id,
            info.domain,
            info.tools.join(", ")
        );
        if let Some(note) = resolution.note {
            text.push_str(&format!("\nNote: {}", note));
        }
        text.push_str("\nUse await_subagents to collect its report.");
        Ok(ToolResult::text(text))
    }

    pub(super) async fn subagent_status(&self, args: &Args<'_>) -> Result<ToolResult> {
        let control = self.control()?;
        let id = args.required_any(&["id", "subagent_id"])?;

        Ok(ToolResult::text(match control.status(&id).await {
            Some(info) => describe_full(&info),
            None => format!("No sub-agent with id {}", id),
        }))
    }

    pub(super) async fn list_subagents(&self) -> Result<ToolResult> {
        let control = self.control()?;
        let all = control.list().await;
        if all.is_empty() {
            return Ok(ToolResult::text("No sub-agents have been spawned."));
        }

        let lines: Vec<String> = all.iter().map(SubworkerInfo::describe).collect();
        Ok(ToolResult::text(lines.join("\n")))
    }

    /// Wait for several sub-workers under one deadline fixed now
    pub(super) async fn await_subagents(&self, args: &Args<'_>) -> Result<ToolResult> {
        let control = self.control()?;
        let mut ids = args.string_list(&["ids", "subagent_ids"]);
        if ids.is_empty() {
            ids = args.opt_str_any(&["id", "subagent_id"]).into_iter().collect();
        }
        if ids.is_empty() {
            return Err(ToolError::missing("await_subagents", "ids"));
        }

        let timeout = Duration::from_secs(
            args.opt_u64("timeout_secs")
                .unwrap_or(DEFAULT_AWAIT_SECS)
                .min(MAX_AWAIT_SECS),
        );
        let deadline = Instant::now() + timeout;

        let mut outcomes: HashMap<String, AwaitOutcome> = HashMap::new();
        let mut pending: Vec<String> = Vec::new();
        for id in &ids {
            if outcomes.contains_key(id) || pending.contains(id) {
                continue;
            }
            match control.status(id).await {
                None => {
                    outcomes.insert(id.clone(), AwaitOutcome::NotFound);
                }
                Some(info) if info.status.is_terminal() => {
                    outcomes.insert(id.clone(), AwaitOutcome::Finished(info));
                }
                Some(_) => pending.push(id.clone()),
            }
        }

        let waited: Vec<(String, AwaitOutcome)> = stream::iter(pending)
            .map(|id| {
                let control = control.clone();
                async move {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    let outcome = match control.await_result(&id, remaining).await {
                        None => AwaitOutcome::NotFound,
                        Some(info) if info.status == SubworkerStatus::Running => AwaitOutcome::TimedOut(info),
                        Some(info) => AwaitOutcome::Finished(info),
                    };
                    (id, outcome)
                }
            })
            .buffer_unordered(self.max_concurrent_waits)
            .collect()
            .await;
        outcomes.extend(waited);

        let sections: Vec<String> = ids
            .iter()
            .map(|id| match outcomes.get(id) {
                Some(AwaitOutcome::Finished(info)) => describe_full(info),
                Some(AwaitOutcome::TimedOut(info)) => {
                    format!("{}: timed out after {}s (still running: {})", id, timeout.as_secs(), info.goal)
                }
                Some(AwaitOutcome::NotFound) | None => format!("{}: not found", id),
            })
            .collect();

        Ok(ToolResult::text(sections.join("\n\n")))
    }

    pub(super) async fn cancel_subagent(&self, args: &Args<'_>) -> Result<ToolResult> {
        let control = self.control()?;
        let id = args.required_any(&["id", "subagent_id"])?;

        Ok(ToolResult::text(if control.cancel(&id).await {
            format!("Sub-agent {} cancelled", id)
        } else {
            format!("Sub-agent {} is unknown or already finished", id)
        }))
    }

    pub(super) async fn send_message(&self, args: &Args<'_>) -> Result<ToolResult> {
        let control = self.control()?;
        let to = args.required_any(&["to", "recipient"])?;
        let body = args.required_any(&["body", "message", "content"])?;
        let subject = args.opt_str("subject").unwrap_or_default();

        match control.send_message(&self.identity, to.trim(), &subject, &body).await {
            Ok(()) => Ok(ToolResult::text(format!("Message sent to {}", to.trim()))),
            // Unknown recipients are an answer for the model, not a tool failure
            Err(gp_core::Error::Subworker(reason)) => Ok(ToolResult::text(format!("Message not sent: {}", reason))),
            Err(e) => Err(e.into()),
        }
    }

    pub(super) async fn read_messages(&self) -> Result<ToolResult> {
        let control = self.control()?;
        let messages = control.read_messages(&self.identity).await;
        if messages.is_empty() {
            return Ok(ToolResult::text("No new messages."));
        }

        let rendered: Vec<String> = messages.iter().map(render_message).collect();
        Ok(ToolResult::text(rendered.join("\n\n")))
    }
}

fn describe_full(info: &SubworkerInfo) -> String {
    let mut text = info.describe();
    if let Some(summary) = &info.summary {
        text.push_str(&format!("\n{}", summary));
    }
    if let Some(error) = &info.error {
        text.push_str(&format!("\nError: {}", error));
    }
    text
}

fn render_message(message: &MailMessage) -> String {
    let subject = if message.subject.is_empty() {
        String::new()
    } else {
        format!(" [{}]", message.subject)
    };
    format!(
        "From {}{} at {}:\n{}",
        message.from,
        subject,
        message.sent_at.format("%H:%M:%S"),
        message.body
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::Utc;
    use gp_core::{ToolCall, TodoList};
    use serde_json::{json, Value};

    use super::super::testing::offline_transport;
    use super::*;

    /// Fake control: ids finish after a fixed delay, unknown ids are absent
    #[derive(Default)]
    struct FakeControl {
        finish_after: HashMap<String, Duration>,
        spawned: Mutex<Vec<SpawnRequest>>,
        sent: Mutex<Vec<(String, String, String)>>,
    }

    impl FakeControl {
        fn with(mut self, id: &str, after: Duration) -> Self {
            self.finish_after.insert(id.to_string(), after);
            self
        }

        fn info(id: &str) -> SubworkerInfo {
            SubworkerInfo::running(id, format!("goal of {}", id), Domain::Mixed, vec![])
        }
    }

    #[async_trait]
    impl SubworkerControl for FakeControl {
        async fn spawn(&self, request: SpawnRequest) -> gp_core::Result<SubworkerInfo> {
            let info = SubworkerInfo::running("sw-1", request.goal.clone(), request.domain, request.tools.clone());
            self.spawned.lock().unwrap().push(request);
            Ok(info)
        }

        async fn status(&self, id: &str) -> Option<SubworkerInfo> {
            self.finish_after.contains_key(id).then(|| Self::info(id))
        }

        async fn list(&self) -> Vec<SubworkerInfo> {
            let mut ids: Vec<_> = self.finish_after.keys().collect();
            ids.sort();
            ids.into_iter().map(|id| Self::info(id)).collect()
        }

        async fn cancel(&self, id: &str) -> bool {
            self.finish_after.contains_key(id)
        }

        async fn await_result(&self, id: &str, timeout: Duration) -> Option<SubworkerInfo> {
            let after = *self.finish_after.get(id)?;
            let mut info = Self::info(id);
            if after <= timeout {
                tokio::time::sleep(after).await;
                info.finish(SubworkerStatus::Completed, Some(format!("{} done", id)), None);
            } else {
                tokio::time::sleep(timeout).await;
            }
            Some(info)
        }

        async fn send_message(&self, from: &str, to: &str, _subject: &str, body: &str) -> gp_core::Result<()> {
            if to != "main" && !self.finish_after.contains_key(to) {
                return Err(gp_core::Error::Subworker(format!("unknown recipient '{}'", to)));
            }
            self.sent.lock().unwrap().push((from.to_string(), to.to_string(), body.to_string()));
            Ok(())
        }

        async fn read_messages(&self, recipient: &str) -> Vec<MailMessage> {
            vec![MailMessage {
                from: "sw-9".to_string(),
                to: recipient.to_string(),
                subject: "progress".to_string(),
                body: "half way".to_string(),
                sent_at: Utc::now(),
            }]
        }
    }

    fn call(name: &str, args: Value) -> ToolCall {
        ToolCall::from_value("c", name, args)
    }

    fn executor(control: FakeControl) -> (ToolExecutor, Arc<FakeControl>) {
        let control = Arc::new(control);
        let executor = ToolExecutor::new(offline_transport()).with_subworkers(control.clone());
        (executor, control)
    }

    #[tokio::test(start_paused = true)]
    async fn test_await_preserves_order_under_one_deadline() {
        let (executor, _) = executor(
            FakeControl::default()
                .with("fast", Duration::from_secs(1))
                .with("slow", Duration::from_secs(30)),
        );
        let started = Instant::now();

        let record = executor
            .execute(&call(
                "await_subagents",
                json!({"ids": ["ghost", "fast", "slow"], "timeout_secs": 2}),
            ))
            .await;
        let text = record.result.summary();
        let sections: Vec<&str> = text.split("\n\n").collect();

        assert_eq!(sections.len(), 3);
        assert_eq!(sections[0], "ghost: not found");
        assert!(sections[1].starts_with("fast [completed]"));
        assert!(sections[1].ends_with("fast done"));
        assert!(sections[2].starts_with("slow: timed out after 2s"));
        assert_eq!(started.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_await_concurrency_bound_shares_deadline() {
        // With one wait at a time the second id only gets what is left
        let (executor, _) = executor(
            FakeControl::default()
                .with("a", Duration::from_secs(3))
                .with("b", Duration::from_secs(3)),
        );
        let executor = executor.with_max_concurrent_waits(1);
        let started = Instant::now();

        let record = executor
            .execute(&call("await_subagents", json!({"ids": ["a", "b"], "timeout_secs": 4})))
            .await;
        let text = record.result.summary();

        assert!(text.contains("a [completed]"));
        assert!(text.contains("b: timed out after 4s"));
        assert_eq!(started.elapsed(), Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_spawn_requires_outline() {
        let (executor, control) = executor(FakeControl::default());
        let record = executor
            .execute(&call("spawn_subagent", json!({"goal": "book a flight"})))
            .await;

        assert!(record.is_success());
        assert!(record.result.summary().starts_with("Sub-agent not spawned"));
        assert!(control.spawned.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_spawn_infers_domain_and_grants_tools() {
        let (executor, control) = executor(FakeControl::default());
        let record = executor
            .execute(&call(
                "SpawnSubAgent",
                json!({
                    "goal": "Research GPU prices",
                    "domain": "guest_only",
                    "todo_items": ["compare three vendors"],
                    "tools": ["websearch", "click", "spawn_subagent"],
                    "timeout_secs": 120
                }),
            ))
            .await;

        let text = record.result.summary();
        assert!(text.contains("domain: host_only"));
        assert!(text.contains("Note: Domain adjusted from guest_only to host_only"));

        let spawned = control.spawned.lock().unwrap();
        assert_eq!(spawned[0].domain, Domain::HostOnly);
        assert_eq!(spawned[0].tools, vec!["web_search"]);
        assert_eq!(spawned[0].todo_items, vec!["compare three vendors"]);
        assert_eq!(spawned[0].timeout, Some(Duration::from_secs(120)));
    }

    #[tokio::test]
    async fn test_messaging_uses_identity() {
        let (executor, control) = executor(FakeControl::default().with("sw-2", Duration::ZERO));
        let executor = executor.with_identity("sw-1");

        let sent = executor
            .execute(&call("send_message", json!({"to": "sw-2", "message": "ready"})))
            .await;
        assert_eq!(sent.result.summary(), "Message sent to sw-2");
        assert_eq!(
            control.sent.lock().unwrap()[0],
            ("sw-1".to_string(), "sw-2".to_string(), "ready".to_string())
        );

        let rejected = executor
            .execute(&call("send_message", json!({"to": "nobody", "body": "hi"})))
            .await;
        assert!(rejected.is_success());
        assert_eq!(rejected.result.summary(), "Message not sent: unknown recipient 'nobody'");

        let read = executor.execute(&call("read_messages", json!({}))).await;
        assert!(read.result.summary().starts_with("From sw-9 [progress] at "));
    }

    #[tokio::test]
    async fn test_status_list_cancel() {
        let (executor, _) = executor(FakeControl::default().with("sw-3", Duration::ZERO));

        let status = executor.execute(&call("subagent_status", json!({"id": "sw-3"}))).await;
        assert!(status.result.summary().starts_with("sw-3 [running]"));

        let missing = executor.execute(&call("subagent_status", json!({"id": "sw-4"}))).await;
        assert_eq!(missing.result.summary(), "No sub-agent with id sw-4");

        let listed = executor.execute(&call("list_subagents", json!({}))).await;
        assert!(listed.result.summary().contains("goal of sw-3"));

        let cancelled = executor.execute(&call("cancel_subagent", json!({"id": "sw-3"}))).await;
        assert_eq!(cancelled.result.summary(), "Sub-agent sw-3 cancelled");
    }

    #[tokio::test]
    async fn test_without_control() {
        let executor = ToolExecutor::new(offline_transport()).with_todo_list(TodoList::default());
        let record = executor.execute(&call("list_subagents", json!({}))).await;
        assert_eq!(record.error.as_deref(), Some("Sub-agents are not available here"));
    }
}
