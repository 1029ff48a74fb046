//! Host-side handlers: timing, web, images, todo list, credentials

use std::time::Duration;

use gp_core::{TodoList, ToolResult};

use super::ToolExecutor;
use crate::args::Args;
use crate::credentials::credential_token;
use crate::error::{Result, ToolError};

const MAX_WAIT_SECS: f64 = 60.0;

impl ToolExecutor {
    pub(super) async fn wait(&self, args: &Args<'_>) -> Result<ToolResult> {
        let seconds = args.opt_number("seconds").unwrap_or(1.0).clamp(0.0, MAX_WAIT_SECS);
        tokio::time::sleep(Duration::from_secs_f64(seconds)).await;
        Ok(ToolResult::text(format!("Waited {}s", seconds)))
    }

    pub(super) async fn web_search(&self, args: &Args<'_>) -> Result<ToolResult> {
        let query = args.required_any(&["query", "q"])?;
        let limit = args.opt_u64("limit").unwrap_or(5) as usize;
        let search = self
            .web_search
            .as_ref()
            .ok_or_else(|| ToolError::failed("Web search is not configured"))?;

        Ok(ToolResult::text(search.search(&query, limit).await?))
    }

    pub(super) async fn generate_image(&self, args: &Args<'_>) -> Result<ToolResult> {
        let prompt = args.required("prompt")?;
        let size = args.opt_str("size");
        let generator = self
            .images
            .as_ref()
            .ok_or_else(|| ToolError::failed("Image generation is not configured"))?;

        let image = generator.generate(&prompt, size.as_deref()).await?;
        Ok(ToolResult::image(image.data, image.mime_type).with_dimensions(image.width, image.height))
    }

    pub(super) fn create_todo_list(&self, args: &Args<'_>) -> Result<ToolResult> {
        let items = args.string_list(&["items", "todo_items", "todos"]);
        if items.is_empty() {
            return Err(ToolError::missing("create_todo_list", "items"));
        }

        let mut todo = self.lock_todo();
        *todo = TodoList::new(items);
        Ok(ToolResult::text(format!("Todo list created:\n{}", todo.render())))
    }

    pub(super) fn add_todo(&self, args: &Args<'_>) -> Result<ToolResult> {
        let item = args.required_any(&["item", "text"])?;

        let mut todo = self.lock_todo();
        todo.add(item.trim());
        Ok(ToolResult::text(format!("Added item {}:\n{}", todo.len(), todo.render())))
    }

    /// Finish by 1-based index, or by text when no usable index is given
    pub(super) fn finish_todo(&self, args: &Args<'_>) -> Result<ToolResult> {
        let mut todo = self.lock_todo();
        if todo.is_empty() {
            return Err(ToolError::failed("The todo list is empty; create it first"));
        }

        let index = match args.opt_u64("index") {
            Some(n) if n >= 1 => Some(n as usize - 1),
            _ => args.opt_str_any(&["item", "text"]).and_then(|needle| todo.position_of(&needle)),
        };
        let Some(index) = index else {
            return Err(ToolError::failed("No matching todo item; pass a 1-based index or the item text"));
        };

        let text = match todo.finish(index) {
            Some(item) => item.text.clone(),
            None => {
                return Err(ToolError::failed(format!(
                    "Todo item {} does not exist (the list has {} items)",
                    index + 1,
                    todo.len()
                )));
            }
        };

        let remaining = todo.unchecked_count();
        Ok(ToolResult::text(format!(
            "Completed: {} ({} remaining)\n{}",
            text,
            remaining,
            todo.render()
        )))
    }

    pub(super) fn show_todo_list(&self) -> ToolResult {
        let todo = self.lock_todo();
        if todo.is_empty() {
            ToolResult::text("The todo list is empty.")
        } else {
            ToolResult::text(format!("TODO LIST:\n{}", todo.render()))
        }
    }

    pub(super) fn list_credentials(&self) -> ToolResult {
        let names = self.credentials.names();
        if names.is_empty() {
            return ToolResult::text("No credentials are stored.");
        }
        ToolResult::text(format!("Stored credentials:\n{}", names.join("\n")))
    }

    pub(super) fn get_credential(&self, args: &Args<'_>) -> Result<ToolResult> {
        let name = args.required("name")?.trim().to_lowercase();
        if !self.credentials.contains(&name) {
            return Err(ToolError::failed(format!("Unknown credential '{}'", name)));
        }
        Ok(ToolResult::text(format!(
            "Use {} in type_text; it is replaced with the secret when typed.",
            credential_token(&name)
        )))
    }
}
