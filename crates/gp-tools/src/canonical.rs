//! Tool name canonicalization
//!
//! Models drift on tool names: `RunShell`, `run-shell`, `run_shell ` and
//! `run\u{200b}shell` all mean the same command. Names are folded to
//! lowercase snake case and then looked up in a fixed alias table.

use crate::command::Command;

/// Names starting with this prefix belong to external plugin tools
pub const PLUGIN_PREFIX: &str = "mcp__";

/// Folded spelling -> canonical name. Targets are canonical names and never
/// appear as keys, which keeps canonicalization idempotent.
const ALIASES: &[(&str, &str)] = &[
    // observation
    ("take_screenshot", "screenshot"),
    ("capture_screen", "screenshot"),
    ("capture_screenshot", "screenshot"),
    ("cursorposition", "cursor_position"),
    ("get_cursor_position", "cursor_position"),
    ("mouse_position", "cursor_position"),
    // pointer
    ("left_click", "click"),
    ("mouse_click", "click"),
    ("doubleclick", "double_click"),
    ("rightclick", "right_click"),
    ("mousemove", "mouse_move"),
    ("move_mouse", "mouse_move"),
    ("drag_and_drop", "drag"),
    ("scroll_page", "scroll"),
    // keyboard
    ("typetext", "type_text"),
    ("type", "type_text"),
    ("keypress", "key_press"),
    ("press_key", "key_press"),
    ("key", "key_press"),
    ("hot_key", "hotkey"),
    ("key_combo", "hotkey"),
    // shell
    ("runshell", "run_shell"),
    ("run_command", "run_shell"),
    ("runcommand", "run_shell"),
    ("execute_command", "run_shell"),
    ("shell", "run_shell"),
    ("bash", "run_shell"),
    // files
    ("readfile", "read_file"),
    ("writefile", "write_file"),
    ("listdirectory", "list_directory"),
    ("list_dir", "list_directory"),
    ("list_files", "list_directory"),
    ("ls", "list_directory"),
    // timing
    ("sleep", "wait"),
    ("pause", "wait"),
    // web & images
    ("websearch", "web_search"),
    ("search_web", "web_search"),
    ("search", "web_search"),
    ("generateimage", "generate_image"),
    ("create_image", "generate_image"),
    // todo
    ("createtodolist", "create_todo_list"),
    ("create_todo", "create_todo_list"),
    ("create_todos", "create_todo_list"),
    ("addtodo", "add_todo"),
    ("add_todo_item", "add_todo"),
    ("finishtodo", "finish_todo"),
    ("complete_todo", "finish_todo"),
    ("check_todo", "finish_todo"),
    ("showtodolist", "show_todo_list"),
    ("show_todos", "show_todo_list"),
    ("list_todos", "show_todo_list"),
    // credentials
    ("listcredentials", "list_credentials"),
    ("getcredential", "get_credential"),
    // sub-workers
    ("spawnsubagent", "spawn_subagent"),
    ("spawn_agent", "spawn_subagent"),
    ("spawn_sub_agent", "spawn_subagent"),
    ("spawn_subworker", "spawn_subagent"),
    ("subagentstatus", "subagent_status"),
    ("sub_agent_status", "subagent_status"),
    ("listsubagents", "list_subagents"),
    ("list_sub_agents", "list_subagents"),
    ("awaitsubagents", "await_subagents"),
    ("await_subagent", "await_subagents"),
    ("await_sub_agents", "await_subagents"),
    ("wait_for_subagents", "await_subagents"),
    ("cancelsubagent", "cancel_subagent"),
    ("cancel_sub_agent", "cancel_subagent"),
    ("sendmessage", "send_message"),
    ("readmessages", "read_messages"),
    ("check_messages", "read_messages"),
];

/// Where a raw tool name routes to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Command(Command),
    /// Plugin tool, with the control characters stripped but otherwise verbatim
    Plugin(String),
    /// Canonicalized name that matches no command
    Unknown(String),
}

/// Canonical form of a tool name
pub fn canonicalize(raw: &str) -> String {
    let stripped = strip_invisible(raw);

    // Split camelCase before the case information is lost
    let mut spaced = String::with_capacity(stripped.len() + 4);
    let mut previous: Option<char> = None;
    for c in stripped.chars() {
        if c.is_ascii_uppercase() && previous.is_some_and(|p| p.is_ascii_lowercase() || p.is_ascii_digit()) {
            spaced.push('_');
        }
        spaced.push(c);
        previous = Some(c);
    }

    let mut folded = String::with_capacity(spaced.len());
    for c in spaced.chars() {
        if c.is_ascii_alphanumeric() {
            folded.push(c.to_ascii_lowercase());
        } else if !folded.ends_with('_') {
            folded.push('_');
        }
    }
    let folded = folded.trim_matches('_');

    match ALIASES.iter().find(|(alias, _)| *alias == folded) {
        Some((_, canonical)) => (*canonical).to_string(),
        None => folded.to_string(),
    }
}

/// Resolve a raw tool name to its route
pub fn resolve(raw: &str) -> Route {
    let stripped = strip_invisible(raw);
    let trimmed = stripped.trim();
    if trimmed.starts_with(PLUGIN_PREFIX) {
        return Route::Plugin(trimmed.to_string());
    }

    let canonical = canonicalize(raw);
    match Command::from_name(&canonical) {
        Some(command) => Route::Command(command),
        None => Route::Unknown(canonical),
    }
}

fn strip_invisible(raw: &str) -> String {
    raw.chars().filter(|c| !c.is_control() && !is_format_char(*c)).collect()
}

/// Unicode format characters models occasionally leak into names
fn is_format_char(c: char) -> bool {
    matches!(
        c,
        '\u{00AD}'
            | '\u{200B}'..='\u{200F}'
            | '\u{202A}'..='\u{202E}'
            | '\u{2060}'..='\u{2064}'
            | '\u{2066}'..='\u{2069}'
            | '\u{FEFF}'
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alias_stable() {
        assert_eq!(canonicalize("RunShell"), "run_shell");
        assert_eq!(canonicalize("run_shell"), "run_shell");
        assert_eq!(canonicalize("runshell"), "run_shell");
        assert_eq!(canonicalize("  run-shell  "), "run_shell");
        assert_eq!(canonicalize("spawnSubagent"), "spawn_subagent");
        assert_eq!(canonicalize("SpawnSubAgent"), "spawn_subagent");
    }

    #[test]
    fn test_invisible_characters_are_dropped() {
        assert_eq!(canonicalize("run\u{200B}shell"), "run_shell");
        assert_eq!(canonicalize("\u{FEFF}screenshot\n"), "screenshot");
        assert_eq!(canonicalize("type\u{0000}_text"), "type_text");
    }

    #[test]
    fn test_punctuation_runs_fold() {
        assert_eq!(canonicalize("--key..press!!"), "key_press");
        assert_eq!(canonicalize("create todo list"), "create_todo_list");
        assert_eq!(canonicalize("__list__directory__"), "list_directory");
    }

    #[test]
    fn test_idempotent() {
        let inputs = [
            "RunShell",
            "run_shell",
            "Take Screenshot",
            "ﬁle_read",
            "émoji 🚀 tool",
            "x\u{200D}y\u{2066}z",
            "mcp__github__create_issue",
            "HTTPGet",
            "a1B2c3",
            "",
            "___",
            "İstanbul",
        ];
        for input in inputs {
            let once = canonicalize(input);
            assert_eq!(canonicalize(&once), once, "input {:?}", input);
        }
    }

    #[test]
    fn test_alias_targets_are_fixed_points() {
        for (alias, target) in ALIASES {
            assert_ne!(alias, target);
            assert_eq!(canonicalize(target), *target, "alias {}", alias);
            assert!(Command::from_name(target).is_some(), "alias target {} is not a command", target);
            assert!(!ALIASES.iter().any(|(key, _)| key == target));
        }
    }

    #[test]
    fn test_every_command_resolves_to_itself() {
        for command in Command::ALL {
            assert_eq!(resolve(command.name()), Route::Command(command));
        }
    }

    #[test]
    fn test_plugin_prefix_survives() {
        assert_eq!(
            resolve(" mcp__github__create_issue"),
            Route::Plugin("mcp__github__create_issue".to_string())
        );
        assert_eq!(
            resolve("mcp\u{200B}__fs__read"),
            Route::Plugin("mcp__fs__read".to_string())
        );
    }

    #[test]
    fn test_unknown() {
        assert_eq!(resolve("Launch Rockets"), Route::Unknown("launch_rockets".to_string()));
    }
}
