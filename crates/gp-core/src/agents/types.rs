//! Sub-worker types
//!
//! - Domain: which side of the isolation boundary a sub-worker may act on
//! - SubworkerInfo: registry record of one sub-worker
//! - TodoList: progress signal and completion contract

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Execution domain of a sub-worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    /// Host-side tools only (web search, image generation, ...)
    HostOnly,
    /// Worker-bound tools only (pointer, keyboard, shell, files)
    GuestOnly,
    /// Both
    Mixed,
}

impl Domain {
    /// Parse the spellings models tend to use
    pub fn parse(value: &str) -> Option<Self> {
        let normalized: String = value
            .trim()
            .to_lowercase()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();

        match normalized.as_str() {
            "host" | "host_only" | "host_tools" | "host_tools_only" | "research" => Some(Self::HostOnly),
            "guest" | "guest_only" | "guest_tools" | "guest_tools_only" | "vm" | "worker" | "worker_only" => {
                Some(Self::GuestOnly)
            }
            "mixed" | "both" | "all" | "hybrid" => Some(Self::Mixed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HostOnly => "host_only",
            Self::GuestOnly => "guest_only",
            Self::Mixed => "mixed",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a sub-worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubworkerStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl SubworkerStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for SubworkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Registry record of one sub-worker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubworkerInfo {
    pub id: String,
    pub goal: String,
    pub domain: Domain,
    pub status: SubworkerStatus,
    pub purpose: Option<String>,
    pub summary: Option<String>,
    pub error: Option<String>,
    /// Canonical names of the tools the sub-worker may call
    pub tools: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl SubworkerInfo {
    pub fn running(id: impl Into<String>, goal: impl Into<String>, domain: Domain, tools: Vec<String>) -> Self {
        Self {
            id: id.into(),
            goal: goal.into(),
            domain,
            status: SubworkerStatus::Running,
            purpose: None,
            summary: None,
            error: None,
            tools,
            created_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn with_purpose(mut self, purpose: Option<String>) -> Self {
        self.purpose = purpose;
        self
    }

    /// Move to a terminal state. Terminal states are never left again.
    pub fn finish(&mut self, status: SubworkerStatus, summary: Option<String>, error: Option<String>) -> bool {
        if self.status.is_terminal() || !status.is_terminal() {
            return false;
        }
        self.status = status;
        self.summary = summary;
        self.error = error;
        self.finished_at = Some(Utc::now());
        true
    }

    /// One-line description for tool results
    pub fn describe(&self) -> String {
        let mut line = format!("{} [{}] ({}) {}", self.id, self.status, self.domain, self.goal);
        if let Some(purpose) = &self.purpose {
            line.push_str(&format!(" | purpose: {}", purpose));
        }
        line
    }
}

/// One entry of a todo list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoItem {
    pub text: String,
    pub completed: bool,
}

impl TodoItem {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            completed: false,
        }
    }

    pub fn done(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            completed: true,
        }
    }
}

/// Ordered todo list
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoList {
    pub items: Vec<TodoItem>,
}

impl TodoList {
    pub fn new<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            items: items
                .into_iter()
                .map(Into::<String>::into)
                .filter(|s| !s.trim().is_empty())
                .map(TodoItem::new)
                .collect(),
        }
    }

    pub fn add(&mut self, text: impl Into<String>) {
        self.items.push(TodoItem::new(text));
    }

    /// Mark the item at `index` (zero-based) completed
    pub fn finish(&mut self, index: usize) -> Option<&TodoItem> {
        let item = self.items.get_mut(index)?;
        item.completed = true;
        Some(item)
    }

    /// Position of the first item whose text contains `needle`, case-insensitively
    pub fn position_of(&self, needle: &str) -> Option<usize> {
        let needle = needle.trim().to_lowercase();
        if needle.is_empty() {
            return None;
        }
        self.items
            .iter()
            .position(|item| item.text.to_lowercase() == needle)
            .or_else(|| self.items.iter().position(|item| item.text.to_lowercase().contains(&needle)))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn unchecked_count(&self) -> usize {
        self.items.iter().filter(|i| !i.completed).count()
    }

    /// Non-empty and every item checked
    pub fn is_complete(&self) -> bool {
        !self.items.is_empty() && self.unchecked_count() == 0
    }

    /// Checkbox rendering, one item per line
    pub fn render(&self) -> String {
        self.items
            .iter()
            .map(|item| format!("- [{}] {}", if item.completed { "x" } else { " " }, item.text))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Parameters of a spawn
#[derive(Debug, Clone)]
pub struct SpawnRequest {
    pub goal: String,
    pub domain: Domain,
    /// Canonical tool names the sub-worker may call
    pub tools: Vec<String>,
    pub todo_items: Vec<String>,
    pub timeout: Option<Duration>,
    pub model: Option<String>,
    pub purpose: Option<String>,
}

impl SpawnRequest {
    pub fn new(goal: impl Into<String>, domain: Domain) -> Self {
        Self {
            goal: goal.into(),
            domain,
            tools: vec![],
            todo_items: vec![],
            timeout: None,
            model: None,
            purpose: None,
        }
    }

    pub fn with_tools(mut self, tools: Vec<String>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_todo_items(mut self, items: Vec<String>) -> Self {
        self.todo_items = items;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn has_outline(&self) -> bool {
        self.todo_items.iter().any(|item| !item.trim().is_empty())
    }
}

/// Message exchanged over the sub-worker mailbox
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
    pub sent_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_parse() {
        assert_eq!(Domain::parse("host-only"), Some(Domain::HostOnly));
        assert_eq!(Domain::parse("Guest Tools Only"), Some(Domain::GuestOnly));
        assert_eq!(Domain::parse("MIXED"), Some(Domain::Mixed));
        assert_eq!(Domain::parse("sideways"), None);
    }

    #[test]
    fn test_info_finish_is_one_way() {
        let mut info = SubworkerInfo::running("sw-1", "goal", Domain::Mixed, vec![]);
        assert!(info.finish(SubworkerStatus::Cancelled, None, Some("cancelled".into())));
        assert!(!info.finish(SubworkerStatus::Completed, Some("late".into()), None));

        assert_eq!(info.status, SubworkerStatus::Cancelled);
        assert!(info.summary.is_none());
        assert!(info.finished_at.is_some());
    }

    #[test]
    fn test_todo_list_progress() {
        let mut list = TodoList::new(["open browser", "", "download report"]);
        assert_eq!(list.len(), 2);
        assert!(!list.is_complete());

        list.finish(0);
        list.add("save to folder");
        assert_eq!(list.unchecked_count(), 2);
        assert!(list.finish(7).is_none());

        let idx = list.position_of("DOWNLOAD").unwrap();
        list.finish(idx);
        list.finish(2);
        assert!(list.is_complete());
        assert_eq!(
            list.render(),
            "- [x] open browser\n- [x] download report\n- [x] save to folder"
        );
    }

    #[test]
    fn test_empty_todo_list_is_not_complete() {
        assert!(!TodoList::default().is_complete());
    }

    #[test]
    fn test_spawn_request_outline() {
        let request = SpawnRequest::new("goal", Domain::HostOnly).with_todo_items(vec!["  ".into()]);
        assert!(!request.has_outline());

        let request = request.with_todo_items(vec!["step".into()]);
        assert!(request.has_outline());
    }
}
