//! Tool executor
//!
//! Canonicalizes a tool call's name, routes it to its handler and times it.
//! Handler failures never escape `execute`: they become failed records, so
//! one bad tool call never aborts a decision loop.

mod local;
mod subworkers;
mod worker;

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use gp_core::agents::MAIN_RECIPIENT;
use gp_core::{ExecutionRecord, SubworkerControl, TodoList, ToolCall, ToolDefinition, ToolResult};
use gp_rpc::Transport;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::args::Args;
use crate::canonical::{resolve, Route};
use crate::catalog;
use crate::command::Command;
use crate::credentials::{CredentialStore, InMemoryCredentialStore};
use crate::error::{Result, ToolError};
use crate::image::ImageGenerator;
use crate::plugin::PluginTools;
use crate::policy::CommandApprover;
use crate::web_search::WebSearch;

/// Default fan-out of `await_subagents`
const DEFAULT_MAX_CONCURRENT_WAITS: usize = 8;

/// Dispatches tool calls to the worker and to host-side collaborators
///
/// Cloning shares every collaborator and the todo list. Use
/// [`ToolExecutor::restricted`] for a sub-worker's executor.
#[derive(Clone)]
pub struct ToolExecutor {
    transport: Transport,
    approver: Option<Arc<dyn CommandApprover>>,
    credentials: Arc<dyn CredentialStore>,
    web_search: Option<Arc<dyn WebSearch>>,
    images: Option<Arc<dyn ImageGenerator>>,
    plugins: Option<Arc<dyn PluginTools>>,
    subworkers: Option<Arc<dyn SubworkerControl>>,
    /// None means every command is allowed
    allowlist: Option<Arc<BTreeSet<Command>>>,
    todo: Arc<Mutex<TodoList>>,
    /// Mailbox identity: "main" or the sub-worker id
    identity: String,
    max_concurrent_waits: usize,
}

impl ToolExecutor {
    pub fn new(transport: Transport) -> Self {
        Self {
            transport,
            approver: None,
            credentials: Arc::new(InMemoryCredentialStore::new()),
            web_search: None,
            images: None,
            plugins: None,
            subworkers: None,
            allowlist: None,
            todo: Arc::new(Mutex::new(TodoList::default())),
            identity: MAIN_RECIPIENT.to_string(),
            max_concurrent_waits: DEFAULT_MAX_CONCURRENT_WAITS,
        }
    }

    /// Require approval before every shell command
    pub fn with_approver(mut self, approver: Arc<dyn CommandApprover>) -> Self {
        self.approver = Some(approver);
        self
    }

    pub fn with_credentials(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.credentials = store;
        self
    }

    pub fn with_web_search(mut self, search: Arc<dyn WebSearch>) -> Self {
        self.web_search = Some(search);
        self
    }

    pub fn with_image_generator(mut self, generator: Arc<dyn ImageGenerator>) -> Self {
        self.images = Some(generator);
        self
    }

    pub fn with_plugins(mut self, plugins: Arc<dyn PluginTools>) -> Self {
        self.plugins = Some(plugins);
        self
    }

    pub fn with_subworkers(mut self, control: Arc<dyn SubworkerControl>) -> Self {
        self.subworkers = Some(control);
        self
    }

    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = identity.into();
        self
    }

    pub fn with_max_concurrent_waits(mut self, max: usize) -> Self {
        self.max_concurrent_waits = max.max(1);
        self
    }

    /// Seed the todo list
    pub fn with_todo_list(self, list: TodoList) -> Self {
        *self.lock_todo() = list;
        self
    }

    /// Executor limited to `allowed`, sharing this one's collaborators but
    /// owning a fresh todo list. Anything outside the allowlist, plugin
    /// tools included, is refused as an unknown tool.
    pub fn restricted(&self, allowed: &[Command]) -> Self {
        let mut restricted = self.clone();
        restricted.allowlist = Some(Arc::new(allowed.iter().copied().collect()));
        restricted.todo = Arc::new(Mutex::new(TodoList::default()));
        restricted
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Snapshot of the todo list
    pub fn todo_list(&self) -> TodoList {
        self.lock_todo().clone()
    }

    pub fn is_allowed(&self, command: Command) -> bool {
        self.allowlist.as_ref().is_none_or(|allowed| allowed.contains(&command))
    }

    /// Commands this executor will dispatch
    pub fn allowed_commands(&self) -> Vec<Command> {
        Command::ALL.iter().copied().filter(|c| self.is_allowed(*c)).collect()
    }

    /// Definitions for the LLM request: allowed commands, then plugin tools
    /// on unrestricted executors
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut definitions = catalog::definitions(&self.allowed_commands());
        if self.allowlist.is_none() {
            if let Some(plugins) = &self.plugins {
                definitions.extend(plugins.definitions());
            }
        }
        definitions
    }

    fn lock_todo(&self) -> MutexGuard<'_, TodoList> {
        self.todo.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Execute one tool call
    pub async fn execute(&self, call: &ToolCall) -> ExecutionRecord {
        let started = Instant::now();
        let route = resolve(&call.name);
        let tool_name = match &route {
            Route::Command(command) => command.name().to_string(),
            Route::Plugin(name) => name.clone(),
            Route::Unknown(_) => call.name.clone(),
        };

        let outcome = self.dispatch(route, &call.arguments).await;
        let duration = started.elapsed();

        match outcome {
            Ok(result) => {
                debug!(
                    tool = %tool_name,
                    call_id = %call.id,
                    elapsed_ms = duration.as_millis() as u64,
                    image = result.is_image(),
                    "Tool call succeeded"
                );
                ExecutionRecord::success(&call.id, tool_name, result, duration)
            }
            Err(e) => {
                warn!(
                    tool = %tool_name,
                    call_id = %call.id,
                    elapsed_ms = duration.as_millis() as u64,
                    error = %e,
                    "Tool call failed"
                );
                ExecutionRecord::failure(&call.id, tool_name, e.to_string(), duration)
            }
        }
    }

    async fn dispatch(&self, route: Route, arguments: &Map<String, Value>) -> Result<ToolResult> {
        let command = match route {
            Route::Command(command) => command,
            Route::Plugin(name) => return self.call_plugin(&name, arguments).await,
            Route::Unknown(name) => return Err(ToolError::UnknownTool(name)),
        };

        if !self.is_allowed(command) {
            return Err(ToolError::UnknownTool(command.name().to_string()));
        }

        let args = Args::new(command.name(), arguments);
        match command {
            Command::Screenshot => self.screenshot().await,
            Command::CursorPosition => self.cursor_position().await,
            Command::Click => self.click(&args).await,
            Command::DoubleClick => self.pointer_at(command, &args).await,
            Command::RightClick => self.pointer_at(command, &args).await,
            Command::MouseMove => self.pointer_at(command, &args).await,
            Command::Drag => self.drag(&args).await,
            Command::Scroll => self.scroll(&args).await,
            Command::TypeText => self.type_text(&args).await,
            Command::KeyPress => self.key_press(&args).await,
            Command::Hotkey => self.hotkey(&args).await,
            Command::RunShell => self.run_shell(&args).await,
            Command::ReadFile => self.read_file(&args).await,
            Command::WriteFile => self.write_file(&args).await,
            Command::ListDirectory => self.list_directory(&args).await,
            Command::Wait => self.wait(&args).await,
            Command::WebSearch => self.web_search(&args).await,
            Command::GenerateImage => self.generate_image(&args).await,
            Command::CreateTodoList => self.create_todo_list(&args),
            Command::AddTodo => self.add_todo(&args),
            Command::FinishTodo => self.finish_todo(&args),
            Command::ShowTodoList => Ok(self.show_todo_list()),
            Command::ListCredentials => Ok(self.list_credentials()),
            Command::GetCredential => self.get_credential(&args),
            Command::SpawnSubagent => self.spawn_subagent(&args).await,
            Command::SubagentStatus => self.subagent_status(&args).await,
            Command::ListSubagents => self.list_subagents().await,
            Command::AwaitSubagents => self.await_subagents(&args).await,
            Command::CancelSubagent => self.cancel_subagent(&args).await,
            Command::SendMessage => self.send_message(&args).await,
            Command::ReadMessages => self.read_messages().await,
        }
    }

    async fn call_plugin(&self, name: &str, arguments: &Map<String, Value>) -> Result<ToolResult> {
        if self.allowlist.is_some() {
            return Err(ToolError::UnknownTool(name.to_string()));
        }
        let plugins = self
            .plugins
            .as_ref()
            .ok_or_else(|| ToolError::PluginError(format!("No plugin host for '{}'", name)))?;
        plugins.call(name, arguments.clone()).await
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Fake worker for executor tests

    use std::sync::Arc;
    use std::time::Duration;

    use gp_rpc::{methods, Request, Response, StreamConnector, TimeoutPolicy, Transport};
    use serde_json::{json, Value};
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::sync::Mutex;

    /// Requests the fake worker has seen, ping excluded
    pub type Seen = Arc<Mutex<Vec<Request>>>;

    /// Connected transport whose worker answers with `reply(method, params)`
    pub async fn fake_transport<F>(reply: F) -> (Transport, Seen)
    where
        F: Fn(&str, &Value) -> std::result::Result<Value, String> + Send + Sync + 'static,
    {
        let (client, server) = tokio::io::duplex(1 << 20);
        let seen: Seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();

        tokio::spawn(async move {
            let (read, mut write) = tokio::io::split(server);
            let mut lines = BufReader::new(read).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let Ok(request) = serde_json::from_str::<Request>(&line) else {
                    continue;
                };
                let response = if request.method == methods::PING {
                    Response::success(&request.id, json!("pong"))
                } else {
                    log.lock().await.push(request.clone());
                    let params = request.params.clone().unwrap_or(Value::Null);
                    match reply(&request.method, &params) {
                        Ok(value) => Response::success(&request.id, value),
                        Err(message) => Response::failure(&request.id, -32000, message),
                    }
                };
                let mut frame = serde_json::to_vec(&response).unwrap();
                frame.push(b'\n');
                if write.write_all(&frame).await.is_err() {
                    break;
                }
            }
        });

        let transport = Transport::new(StreamConnector::new(client), TimeoutPolicy::new(Duration::from_secs(5)));
        transport.connect().await.unwrap();
        (transport, seen)
    }

    /// Transport that was never connected
    pub fn offline_transport() -> Transport {
        let (client, _server) = tokio::io::duplex(64);
        Transport::new(StreamConnector::new(client), TimeoutPolicy::default())
    }
}
