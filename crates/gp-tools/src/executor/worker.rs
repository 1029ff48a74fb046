//! Worker-bound handlers: observation, pointer, keyboard, shell, files

use gp_core::ToolResult;
use gp_rpc::methods;
use serde_json::{json, Value};
use tracing::{info, warn};

use super::ToolExecutor;
use crate::args::{as_number, Args};
use crate::command::Command;
use crate::credentials::expand_tokens;
use crate::error::{Result, ToolError};

/// Output longer than this is cut before it reaches the model
const MAX_OUTPUT_CHARS: usize = 20_000;

const DEFAULT_IMAGE_MIME: &str = "image/png";

impl ToolExecutor {
    async fn worker_call(&self, method: &str, params: Value) -> Result<Value> {
        Ok(self.transport.call_value(method, Some(params)).await?)
    }

    pub(super) async fn screenshot(&self) -> Result<ToolResult> {
        let value = self.transport.call_value(methods::SCREENSHOT, None).await?;
        screenshot_result(&value)
    }

    pub(super) async fn cursor_position(&self) -> Result<ToolResult> {
        let value = self.transport.call_value(methods::CURSOR_POSITION, None).await?;
        let x = value.get("x").and_then(as_number);
        let y = value.get("y").and_then(as_number);
        match (x, y) {
            (Some(x), Some(y)) => Ok(ToolResult::text(format!("Cursor at ({}, {})", x.round(), y.round()))),
            _ => Err(ToolError::failed(format!("Unexpected cursor position reply: {}", value))),
        }
    }

    pub(super) async fn click(&self, args: &Args<'_>) -> Result<ToolResult> {
        let x = args.coordinate("x")?;
        let y = args.coordinate("y")?;
        let button = args.opt_str("button").unwrap_or_else(|| "left".to_string()).to_lowercase();
        if !matches!(button.as_str(), "left" | "right" | "middle") {
            return Err(ToolError::failed(format!("Unsupported mouse button '{}'", button)));
        }

        self.worker_call(methods::CLICK, json!({"x": x, "y": y, "button": button}))
            .await?;
        Ok(ToolResult::text(format!("Clicked {} at ({}, {})", button, x, y)))
    }

    /// Double click, right click and move share the same shape
    pub(super) async fn pointer_at(&self, command: Command, args: &Args<'_>) -> Result<ToolResult> {
        let x = args.coordinate("x")?;
        let y = args.coordinate("y")?;
        let (method, verb) = match command {
            Command::DoubleClick => (methods::DOUBLE_CLICK, "Double-clicked"),
            Command::RightClick => (methods::RIGHT_CLICK, "Right-clicked"),
            _ => (methods::MOUSE_MOVE, "Moved pointer"),
        };

        self.worker_call(method, json!({"x": x, "y": y})).await?;
        Ok(ToolResult::text(format!("{} at ({}, {})", verb, x, y)))
    }

    pub(super) async fn drag(&self, args: &Args<'_>) -> Result<ToolResult> {
        let (fx, fy) = (args.coordinate("from_x")?, args.coordinate("from_y")?);
        let (tx, ty) = (args.coordinate("to_x")?, args.coordinate("to_y")?);

        self.worker_call(
            methods::DRAG,
            json!({"from_x": fx, "from_y": fy, "to_x": tx, "to_y": ty}),
        )
        .await?;
        Ok(ToolResult::text(format!("Dragged from ({}, {}) to ({}, {})", fx, fy, tx, ty)))
    }

    pub(super) async fn scroll(&self, args: &Args<'_>) -> Result<ToolResult> {
        let direction = args.opt_str("direction").unwrap_or_else(|| "down".to_string()).to_lowercase();
        if !matches!(direction.as_str(), "up" | "down" | "left" | "right") {
            return Err(ToolError::failed(format!("Unsupported scroll direction '{}'", direction)));
        }
        let amount = args.opt_u64("amount").unwrap_or(3).clamp(1, 50);

        let mut params = json!({"direction": direction, "amount": amount});
        if let (Some(x), Some(y)) = (args.opt_number("x"), args.opt_number("y")) {
            params["x"] = json!(x.round() as i64);
            params["y"] = json!(y.round() as i64);
        }

        self.worker_call(methods::SCROLL, params).await?;
        Ok(ToolResult::text(format!("Scrolled {} by {}", direction, amount)))
    }

    pub(super) async fn type_text(&self, args: &Args<'_>) -> Result<ToolResult> {
        let text = args.required("text")?;
        let expanded = expand_tokens(&text, self.credentials.as_ref())?;
        let chars = expanded.chars().count();

        // Typed text may hold secrets now; only its size is logged
        info!(chars = chars, "Typing text");
        self.worker_call(methods::TYPE_TEXT, json!({"text": expanded.as_str()}))
            .await?;
        Ok(ToolResult::text(format!("Typed {} characters", chars)))
    }

    pub(super) async fn key_press(&self, args: &Args<'_>) -> Result<ToolResult> {
        let key = args.required("key")?;
        self.worker_call(methods::KEY_PRESS, json!({"key": key})).await?;
        Ok(ToolResult::text(format!("Pressed {}", key)))
    }

    pub(super) async fn hotkey(&self, args: &Args<'_>) -> Result<ToolResult> {
        let mut keys = args.string_list(&["keys"]);
        if keys.len() == 1 && keys[0].contains('+') {
            keys = keys[0].split('+').map(|k| k.trim().to_string()).filter(|k| !k.is_empty()).collect();
        }
        if keys.is_empty() {
            return Err(ToolError::missing("hotkey", "keys"));
        }

        self.worker_call(methods::HOTKEY, json!({"keys": keys})).await?;
        Ok(ToolResult::text(format!("Pressed {}", keys.join("+"))))
    }

    pub(super) async fn run_shell(&self, args: &Args<'_>) -> Result<ToolResult> {
        let command = args.required("command")?;

        if let Some(approver) = &self.approver {
            if !approver.approve(&command).await {
                warn!(command = %command, "Shell command declined");
                return Ok(ToolResult::text(format!(
                    "Command blocked: '{}' was not approved by the user.",
                    command
                )));
            }
        }

        let mut params = json!({"command": command});
        if let Some(cwd) = args.opt_str("cwd") {
            params["cwd"] = json!(cwd);
        }

        let value = self.worker_call(methods::RUN_COMMAND, params).await?;
        Ok(ToolResult::text(format_command_output(&value)))
    }

    pub(super) async fn read_file(&self, args: &Args<'_>) -> Result<ToolResult> {
        let path = args.required("path")?;
        let value = self.worker_call(methods::READ_FILE, json!({"path": path})).await?;

        let content = match &value {
            Value::String(s) => s.as_str(),
            other => other
                .get("content")
                .and_then(Value::as_str)
                .ok_or_else(|| ToolError::failed(format!("No content returned for {}", path)))?,
        };
        Ok(ToolResult::text(truncate(content)))
    }

    pub(super) async fn write_file(&self, args: &Args<'_>) -> Result<ToolResult> {
        let path = args.required("path")?;
        // Empty content is a legitimate write
        let content = args
            .opt_str("content")
            .ok_or_else(|| ToolError::missing("write_file", "content"))?;

        self.worker_call(methods::WRITE_FILE, json!({"path": path, "content": content}))
            .await?;
        Ok(ToolResult::text(format!("Wrote {} bytes to {}", content.len(), path)))
    }

    pub(super) async fn list_directory(&self, args: &Args<'_>) -> Result<ToolResult> {
        let path = args.opt_str("path").unwrap_or_else(|| ".".to_string());
        let value = self
            .worker_call(methods::LIST_DIRECTORY, json!({"path": path}))
            .await?;

        let entries = match &value {
            Value::Array(entries) => entries.as_slice(),
            other => other
                .get("entries")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or_default(),
        };

        if entries.is_empty() {
            return Ok(ToolResult::text(format!("{} is empty", path)));
        }

        let lines: Vec<String> = entries.iter().filter_map(format_entry).collect();
        Ok(ToolResult::text(format!("{}:\n{}", path, lines.join("\n"))))
    }
}

/// Screenshot reply: `{image|data, mime_type?, width?, height?}`
fn screenshot_result(value: &Value) -> Result<ToolResult> {
    let data = value
        .get("image")
        .or_else(|| value.get("data"))
        .and_then(Value::as_str)
        .filter(|d| !d.is_empty())
        .ok_or_else(|| ToolError::failed("Worker returned no image data"))?;
    let mime_type = value
        .get("mime_type")
        .or_else(|| value.get("mimeType"))
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_IMAGE_MIME);
    let dimension = |key: &str| value.get(key).and_then(as_number).map(|n| n.round() as u32);

    Ok(ToolResult::image(data, mime_type).with_dimensions(dimension("width"), dimension("height")))
}

fn format_command_output(value: &Value) -> String {
    if let Value::String(s) = value {
        return truncate(s);
    }

    let field = |key: &str| value.get(key).and_then(Value::as_str).unwrap_or("").trim_end().to_string();
    let stdout = field("stdout");
    let stderr = field("stderr");
    let exit_code = value
        .get("exit_code")
        .or_else(|| value.get("exitCode"))
        .and_then(Value::as_i64);

    let mut output = match exit_code {
        Some(code) => format!("Exit code: {}", code),
        None => "Exit code: unknown".to_string(),
    };
    if !stdout.is_empty() {
        output.push_str(&format!("\nstdout:\n{}", stdout));
    }
    if !stderr.is_empty() {
        output.push_str(&format!("\nstderr:\n{}", stderr));
    }
    truncate(&output)
}

fn format_entry(entry: &Value) -> Option<String> {
    match entry {
        Value::String(name) => Some(name.clone()),
        Value::Object(obj) => {
            let name = obj.get("name").and_then(Value::as_str)?;
            let is_dir = obj
                .get("is_dir")
                .or_else(|| obj.get("isDir"))
                .and_then(Value::as_bool)
                .unwrap_or(false);
            Some(if is_dir { format!("{}/", name) } else { name.to_string() })
        }
        _ => None,
    }
}

fn truncate(text: &str) -> String {
    if text.chars().count() <= MAX_OUTPUT_CHARS {
        return text.to_string();
    }
    let head: String = text.chars().take(MAX_OUTPUT_CHARS).collect();
    format!("{}\n... [output truncated]", head)
}
