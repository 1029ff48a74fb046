//! The fixed command set and its grouping

use std::fmt;

use gp_core::Domain;

use crate::canonical::canonicalize;

/// Functional group of a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolGroup {
    Observation,
    Pointer,
    Keyboard,
    Shell,
    Files,
    Timing,
    Web,
    Images,
    Todo,
    Credentials,
    Messaging,
    Subworkers,
}

impl ToolGroup {
    /// Groups a sub-worker of `domain` is granted
    pub fn for_domain(domain: Domain) -> &'static [ToolGroup] {
        use ToolGroup::*;
        match domain {
            Domain::HostOnly => &[Web, Images, Todo, Credentials, Messaging],
            Domain::GuestOnly => &[
                Observation,
                Pointer,
                Keyboard,
                Shell,
                Files,
                Timing,
                Todo,
                Credentials,
                Messaging,
            ],
            Domain::Mixed => &[
                Observation,
                Pointer,
                Keyboard,
                Shell,
                Files,
                Timing,
                Web,
                Images,
                Todo,
                Credentials,
                Messaging,
            ],
        }
    }
}

/// Canonical command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Command {
    Screenshot,
    CursorPosition,
    Click,
    DoubleClick,
    RightClick,
    MouseMove,
    Drag,
    Scroll,
    TypeText,
    KeyPress,
    Hotkey,
    RunShell,
    ReadFile,
    WriteFile,
    ListDirectory,
    Wait,
    WebSearch,
    GenerateImage,
    CreateTodoList,
    AddTodo,
    FinishTodo,
    ShowTodoList,
    ListCredentials,
    GetCredential,
    SpawnSubagent,
    SubagentStatus,
    ListSubagents,
    AwaitSubagents,
    CancelSubagent,
    SendMessage,
    ReadMessages,
}

impl Command {
    pub const ALL: [Command; 31] = [
        Command::Screenshot,
        Command::CursorPosition,
        Command::Click,
        Command::DoubleClick,
        Command::RightClick,
        Command::MouseMove,
        Command::Drag,
        Command::Scroll,
        Command::TypeText,
        Command::KeyPress,
        Command::Hotkey,
        Command::RunShell,
        Command::ReadFile,
        Command::WriteFile,
        Command::ListDirectory,
        Command::Wait,
        Command::WebSearch,
        Command::GenerateImage,
        Command::CreateTodoList,
        Command::AddTodo,
        Command::FinishTodo,
        Command::ShowTodoList,
        Command::ListCredentials,
        Command::GetCredential,
        Command::SpawnSubagent,
        Command::SubagentStatus,
        Command::ListSubagents,
        Command::AwaitSubagents,
        Command::CancelSubagent,
        Command::SendMessage,
        Command::ReadMessages,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Screenshot => "screenshot",
            Self::CursorPosition => "cursor_position",
            Self::Click => "click",
            Self::DoubleClick => "double_click",
            Self::RightClick => "right_click",
            Self::MouseMove => "mouse_move",
            Self::Drag => "drag",
            Self::Scroll => "scroll",
            Self::TypeText => "type_text",
            Self::KeyPress => "key_press",
            Self::Hotkey => "hotkey",
            Self::RunShell => "run_shell",
            Self::ReadFile => "read_file",
            Self::WriteFile => "write_file",
            Self::ListDirectory => "list_directory",
            Self::Wait => "wait",
            Self::WebSearch => "web_search",
            Self::GenerateImage => "generate_image",
            Self::CreateTodoList => "create_todo_list",
            Self::AddTodo => "add_todo",
            Self::FinishTodo => "finish_todo",
            Self::ShowTodoList => "show_todo_list",
            Self::ListCredentials => "list_credentials",
            Self::GetCredential => "get_credential",
            Self::SpawnSubagent => "spawn_subagent",
            Self::SubagentStatus => "subagent_status",
            Self::ListSubagents => "list_subagents",
            Self::AwaitSubagents => "await_subagents",
            Self::CancelSubagent => "cancel_subagent",
            Self::SendMessage => "send_message",
            Self::ReadMessages => "read_messages",
        }
    }

    /// Look up an already canonical name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.name() == name)
    }

    pub fn group(&self) -> ToolGroup {
        match self {
            Self::Screenshot | Self::CursorPosition => ToolGroup::Observation,
            Self::Click
            | Self::DoubleClick
            | Self::RightClick
            | Self::MouseMove
            | Self::Drag
            | Self::Scroll => ToolGroup::Pointer,
            Self::TypeText | Self::KeyPress | Self::Hotkey => ToolGroup::Keyboard,
            Self::RunShell => ToolGroup::Shell,
            Self::ReadFile | Self::WriteFile | Self::ListDirectory => ToolGroup::Files,
            Self::Wait => ToolGroup::Timing,
            Self::WebSearch => ToolGroup::Web,
            Self::GenerateImage => ToolGroup::Images,
            Self::CreateTodoList | Self::AddTodo | Self::FinishTodo | Self::ShowTodoList => ToolGroup::Todo,
            Self::ListCredentials | Self::GetCredential => ToolGroup::Credentials,
            Self::SendMessage | Self::ReadMessages => ToolGroup::Messaging,
            Self::SpawnSubagent
            | Self::SubagentStatus
            | Self::ListSubagents
            | Self::AwaitSubagents
            | Self::CancelSubagent => ToolGroup::Subworkers,
        }
    }

    /// Commands granted to a sub-worker of `domain`, in catalog order
    pub fn for_domain(domain: Domain) -> Vec<Command> {
        let groups = ToolGroup::for_domain(domain);
        Self::ALL
            .iter()
            .copied()
            .filter(|c| groups.contains(&c.group()))
            .collect()
    }

    /// Tools a sub-worker of `domain` actually gets: the requested names
    /// (canonicalized) that the domain allows, in catalog order. An empty
    /// or entirely invalid request gets the whole domain set.
    pub fn granted_for(domain: Domain, requested: &[String]) -> Vec<Command> {
        let allowed = Self::for_domain(domain);
        let requested: Vec<String> = requested.iter().map(|r| canonicalize(r)).collect();
        let narrowed: Vec<Command> = allowed
            .iter()
            .copied()
            .filter(|c| requested.iter().any(|r| r == c.name()))
            .collect();

        if narrowed.is_empty() { allowed } else { narrowed }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
