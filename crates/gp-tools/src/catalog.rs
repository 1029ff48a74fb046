//! Tool definitions advertised to the model

use gp_core::{SchemaBuilder, ToolDefinition};

use crate::command::Command;

const SCROLL_DIRECTIONS: &[&str] = &["up", "down", "left", "right"];
const MOUSE_BUTTONS: &[&str] = &["left", "right", "middle"];
const DOMAINS: &[&str] = &["host_only", "guest_only", "mixed"];

/// Definition of one command
pub fn definition(command: Command) -> ToolDefinition {
    let (description, schema) = match command {
        Command::Screenshot => (
            "Capture the worker's screen. Returns an image.",
            SchemaBuilder::new().build(),
        ),
        Command::CursorPosition => (
            "Report the current pointer position.",
            SchemaBuilder::new().build(),
        ),
        Command::Click => (
            "Click at a screen position.",
            SchemaBuilder::new()
                .number("x", "Horizontal pixel coordinate", true)
                .number("y", "Vertical pixel coordinate", true)
                .string_enum("button", "Mouse button (default: left)", MOUSE_BUTTONS, false)
                .build(),
        ),
        Command::DoubleClick => (
            "Double-click at a screen position.",
            xy().build(),
        ),
        Command::RightClick => (
            "Right-click at a screen position.",
            xy().build(),
        ),
        Command::MouseMove => (
            "Move the pointer without clicking.",
            xy().build(),
        ),
        Command::Drag => (
            "Press at one position, move to another and release.",
            SchemaBuilder::new()
                .number("from_x", "Start x", true)
                .number("from_y", "Start y", true)
                .number("to_x", "End x", true)
                .number("to_y", "End y", true)
                .build(),
        ),
        Command::Scroll => (
            "Scroll at the pointer or at a given position.",
            SchemaBuilder::new()
                .string_enum("direction", "Scroll direction (default: down)", SCROLL_DIRECTIONS, false)
                .integer("amount", "Number of scroll steps (default: 3)", false)
                .number("x", "Optional x to scroll at", false)
                .number("y", "Optional y to scroll at", false)
                .build(),
        ),
        Command::TypeText => (
            "Type text with the keyboard. Credential tokens like {{credential:NAME}} are expanded before typing.",
            SchemaBuilder::new().string("text", "Text to type", true).build(),
        ),
        Command::KeyPress => (
            "Press a single key, e.g. Enter, Tab, Escape, F5.",
            SchemaBuilder::new().string("key", "Key name", true).build(),
        ),
        Command::Hotkey => (
            "Press a key combination, e.g. [\"ctrl\", \"c\"] or \"ctrl+shift+t\".",
            SchemaBuilder::new()
                .string_array("keys", "Keys pressed together, modifiers first", true)
                .build(),
        ),
        Command::RunShell => (
            "Run a shell command inside the worker and return its output.",
            SchemaBuilder::new()
                .string("command", "Command line to execute", true)
                .string("cwd", "Working directory", false)
                .build(),
        ),
        Command::ReadFile => (
            "Read a text file inside the worker.",
            SchemaBuilder::new().string("path", "File path", true).build(),
        ),
        Command::WriteFile => (
            "Write a text file inside the worker, replacing its contents.",
            SchemaBuilder::new()
                .string("path", "File path", true)
                .string("content", "New file contents", true)
                .build(),
        ),
        Command::ListDirectory => (
            "List the entries of a directory inside the worker.",
            SchemaBuilder::new().string("path", "Directory path (default: .)", false).build(),
        ),
        Command::Wait => (
            "Pause before the next action, up to 60 seconds.",
            SchemaBuilder::new().number("seconds", "Seconds to wait (default: 1)", false).build(),
        ),
        Command::WebSearch => (
            "Search the web. Returns titles, URLs and snippets.",
            SchemaBuilder::new()
                .string("query", "Search query", true)
                .integer("limit", "Maximum results (default: 5, max: 10)", false)
                .build(),
        ),
        Command::GenerateImage => (
            "Generate an image from a text prompt.",
            SchemaBuilder::new()
                .string("prompt", "What to draw", true)
                .string("size", "Size hint such as 1024x1024", false)
                .build(),
        ),
        Command::CreateTodoList => (
            "Create (or replace) the todo list tracking this task.",
            SchemaBuilder::new().string_array("items", "Todo items in order", true).build(),
        ),
        Command::AddTodo => (
            "Append an item to the todo list.",
            SchemaBuilder::new().string("item", "Item text", true).build(),
        ),
        Command::FinishTodo => (
            "Mark a todo item completed, by 1-based index or by text.",
            SchemaBuilder::new()
                .integer("index", "1-based item number", false)
                .string("item", "Item text (used when no index is given)", false)
                .build(),
        ),
        Command::ShowTodoList => (
            "Show the todo list with its checkboxes.",
            SchemaBuilder::new().build(),
        ),
        Command::ListCredentials => (
            "List the names of stored credentials.",
            SchemaBuilder::new().build(),
        ),
        Command::GetCredential => (
            "Get an opaque token for a credential. Pass the token to type_text; the secret is never shown.",
            SchemaBuilder::new().string("name", "Credential name", true).build(),
        ),
        Command::SpawnSubagent => (
            "Start a sub-agent that pursues a sub-goal concurrently. A todo outline is required.",
            SchemaBuilder::new()
                .string("goal", "What the sub-agent must achieve", true)
                .string_array("todo_items", "Steps the sub-agent must check off", true)
                .string_enum("domain", "Tool domain (default: mixed)", DOMAINS, false)
                .string_array("tools", "Optional subset of tools to grant", false)
                .integer("timeout_secs", "Give up after this many seconds", false)
                .string("model", "Model override", false)
                .string("purpose", "Why this sub-agent exists, for status listings", false)
                .build(),
        ),
        Command::SubagentStatus => (
            "Show the status of one sub-agent.",
            SchemaBuilder::new().string("id", "Sub-agent id", true).build(),
        ),
        Command::ListSubagents => (
            "List all sub-agents and their status.",
            SchemaBuilder::new().build(),
        ),
        Command::AwaitSubagents => (
            "Wait for sub-agents to finish, up to a shared deadline.",
            SchemaBuilder::new()
                .string_array("ids", "Sub-agent ids, reported in this order", true)
                .integer("timeout_secs", "Shared deadline in seconds (default: 300)", false)
                .build(),
        ),
        Command::CancelSubagent => (
            "Cancel a running sub-agent.",
            SchemaBuilder::new().string("id", "Sub-agent id", true).build(),
        ),
        Command::SendMessage => (
            "Send a message to \"main\", a sub-agent id, or \"broadcast\".",
            SchemaBuilder::new()
                .string("to", "Recipient", true)
                .string("subject", "Short subject", false)
                .string("body", "Message body", true)
                .build(),
        ),
        Command::ReadMessages => (
            "Read and clear the messages addressed to you.",
            SchemaBuilder::new().build(),
        ),
    };

    ToolDefinition::new(command.name(), description, schema)
}

/// Definitions of `commands`, in the given order
pub fn definitions(commands: &[Command]) -> Vec<ToolDefinition> {
    commands.iter().copied().map(definition).collect()
}

fn xy() -> SchemaBuilder {
    SchemaBuilder::new()
        .number("x", "Horizontal pixel coordinate", true)
        .number("y", "Vertical pixel coordinate", true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_command_has_an_object_schema() {
        for def in definitions(&Command::ALL) {
            assert!(!def.description.is_empty(), "{}", def.name);
            assert_eq!(def.input_schema["type"], "object", "{}", def.name);
        }
    }

    #[test]
    fn test_required_fields() {
        let spawn = definition(Command::SpawnSubagent);
        let required = spawn.input_schema["required"].as_array().unwrap();
        assert!(required.iter().any(|v| v == "goal"));
        assert!(required.iter().any(|v| v == "todo_items"));
    }
}
