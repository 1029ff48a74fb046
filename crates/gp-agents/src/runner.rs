//! Nested decision loop for one sub-worker
//!
//! The runner asks the LLM for one turn at a time, executes the requested
//! tools strictly in order through its (restricted) executor, and stops at
//! the first turn without tool calls or after `max_iterations` turns. The
//! final text is then judged by [`Report`]: a report that does not follow
//! the format gets exactly one more chance, in a turn without tools.

use std::sync::Arc;

use chrono::Local;
use gp_core::{Domain, ImageSource, LlmClient, Message, MessagesRequest, TodoList, ToolResult};
use gp_tools::ToolExecutor;
use tracing::{debug, info, warn};

use crate::prompt;
use crate::report::{Report, Verdict};

pub const DEFAULT_MAX_ITERATIONS: usize = 10;
pub const DEFAULT_MIN_REPORT_CHARS: usize = 40;
const DEFAULT_MAX_TOKENS: u64 = 4096;

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Success,
    Failed,
}

/// Result of [`SubworkerRunner::run`]
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub status: RunStatus,
    /// The report text (best effort when it never became compliant)
    pub summary: String,
    pub failure_reason: Option<String>,
    /// Model turns taken, the report turn included
    pub iterations: usize,
    /// TODO LIST parsed from the report
    pub todo: Option<TodoList>,
}

impl RunOutcome {
    fn failed(reason: impl Into<String>, iterations: usize) -> Self {
        Self {
            status: RunStatus::Failed,
            summary: String::new(),
            failure_reason: Some(reason.into()),
            iterations,
            todo: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }
}

/// Drives one goal to a judged report
pub struct SubworkerRunner {
    goal: String,
    domain: Domain,
    client: Arc<dyn LlmClient>,
    executor: ToolExecutor,
    model: Option<String>,
    max_iterations: usize,
    max_tokens: u64,
    min_report_chars: usize,
}

impl SubworkerRunner {
    /// The executor should already be restricted to the sub-worker's
    /// allowlist and seeded with its todo outline
    pub fn new(goal: impl Into<String>, domain: Domain, client: Arc<dyn LlmClient>, executor: ToolExecutor) -> Self {
        Self {
            goal: goal.into(),
            domain,
            client,
            executor,
            model: None,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            max_tokens: DEFAULT_MAX_TOKENS,
            min_report_chars: DEFAULT_MIN_REPORT_CHARS,
        }
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }

    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max.max(1);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u64) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_min_report_chars(mut self, min: usize) -> Self {
        self.min_report_chars = min;
        self
    }

    fn request(&self, system: &str, messages: &[Message], with_tools: bool) -> MessagesRequest {
        let tools = with_tools.then(|| self.executor.definitions()).filter(|t| !t.is_empty());
        MessagesRequest {
            model: self.model.clone().unwrap_or_else(|| self.client.model().to_string()),
            max_tokens: self.max_tokens,
            system: Some(system.to_string()),
            messages: messages.to_vec(),
            tools,
        }
    }

    pub async fn run(&self) -> RunOutcome {
        let identity = self.executor.identity().to_string();
        let system = prompt::system_prompt(
            &self.goal,
            self.domain,
            &self.executor.allowed_commands(),
            &self.executor.todo_list(),
            Local::now().date_naive(),
        );
        let mut messages = vec![Message::user(self.goal.clone())];
        let mut last_text = String::new();
        let mut iterations = 0;

        info!(agent = %identity, domain = %self.domain, max_iterations = self.max_iterations, "Sub-agent loop started");

        loop {
            if iterations >= self.max_iterations {
                warn!(agent = %identity, "Sub-agent reached its iteration limit");
                break;
            }
            iterations += 1;

            let turn = match self.client.next_turn(self.request(&system, &messages, true)).await {
                Ok(turn) => turn,
                Err(e) => {
                    warn!(agent = %identity, iteration = iterations, "LLM request failed: {}", e);
                    return RunOutcome::failed(format!("LLM request failed: {}", e), iterations);
                }
            };

            let text = turn.text();
            if !text.trim().is_empty() {
                last_text = text;
            }
            let calls = turn.tool_calls();
            messages.push(Message::assistant_blocks(turn.content));
            if calls.is_empty() {
                break;
            }

            for call in &calls {
                let record = self.executor.execute(call).await;
                debug!(
                    agent = %identity,
                    tool = %record.tool_name,
                    success = record.is_success(),
                    elapsed_ms = record.duration.as_millis() as u64,
                    "Sub-agent tool call"
                );

                messages.push(Message::tool_result(
                    call.id.clone(),
                    record.result.summary(),
                    !record.is_success(),
                ));
                if let ToolResult::Image { data, mime_type, .. } = &record.result {
                    messages.push(Message::user_with_image(
                        format!("Image returned by {}", record.tool_name),
                        ImageSource::base64(mime_type.clone(), data.clone()),
                    ));
                }
            }
        }

        self.finalize(&system, messages, last_text, iterations).await
    }

    /// Judge the final text, asking once for a compliant report if needed
    async fn finalize(&self, system: &str, mut messages: Vec<Message>, text: String, mut iterations: usize) -> RunOutcome {
        let mut report_text = text;
        let mut report = Report::parse(&report_text);

        let accepted = report.is_compliant() && report_text.trim().chars().count() >= self.min_report_chars;
        if !accepted {
            messages.push(Message::user(prompt::report_request(&self.executor.todo_list())));
            iterations += 1;

            match self.client.next_turn(self.request(system, &messages, false)).await {
                Ok(turn) => {
                    // An empty retry keeps the original text
                    let retry = turn.text();
                    if !retry.trim().is_empty() {
                        report = Report::parse(&retry);
                        report_text = retry;
                    }
                }
                Err(e) => warn!(agent = %self.executor.identity(), "Report request failed: {}", e),
            }
        }

        let verdict = report.verdict();
        info!(
            agent = %self.executor.identity(),
            iterations,
            success = verdict.is_success(),
            "Sub-agent finished"
        );

        let (status, failure_reason) = match verdict {
            Verdict::Success => (RunStatus::Success, None),
            Verdict::Failed(reason) => (RunStatus::Failed, Some(reason.to_string())),
        };
        RunOutcome {
            status,
            summary: report_text.trim().to_string(),
            failure_reason,
            iterations,
            todo: report.todo,
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use gp_core::{LlmTurn, MessageContent, MessagesRequest};
    use serde_json::Value;

    use super::*;

    /// Scripted LLM: pops one turn per request and records every request
    pub struct ScriptedLlm {
        turns: Mutex<VecDeque<LlmTurn>>,
        pub requests: Mutex<Vec<MessagesRequest>>,
    }

    impl ScriptedLlm {
        pub fn new(turns: Vec<LlmTurn>) -> Arc<Self> {
            Arc::new(Self {
                turns: Mutex::new(turns.into()),
                requests: Mutex::new(Vec::new()),
            })
        }

        pub fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        fn model(&self) -> &str {
            "scripted"
        }

        async fn next_turn(&self, request: MessagesRequest) -> gp_core::Result<LlmTurn> {
            self.requests.lock().unwrap().push(request);
            self.turns
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| gp_core::Error::LlmApi("script exhausted".to_string()))
        }
    }

    pub fn text_turn(text: &str) -> LlmTurn {
        LlmTurn::from_content(vec![MessageContent::Text { text: text.to_string() }])
    }

    pub fn tool_turn(id: &str, name: &str, input: Value) -> LlmTurn {
        LlmTurn::from_content(vec![MessageContent::ToolUse {
            id: id.to_string(),
            name: name.to_string(),
            input,
        }])
    }
}
