//! Tool invocation, result and execution record types

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// A tool invocation requested by a decision loop
///
/// `name` is taken verbatim from the model and may be noisy; the executor
/// canonicalizes it before dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub arguments: Map<String, JsonValue>,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Map<String, JsonValue>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }

    /// Build a call from whatever the model sent as input.
    ///
    /// Objects are used as-is, strings holding a JSON object are decoded,
    /// anything else becomes an empty argument map.
    pub fn from_value(id: impl Into<String>, name: impl Into<String>, input: JsonValue) -> Self {
        let arguments = match input {
            JsonValue::Object(map) => map,
            JsonValue::String(s) => match serde_json::from_str::<JsonValue>(&s) {
                Ok(JsonValue::Object(map)) => map,
                _ => Map::new(),
            },
            _ => Map::new(),
        };
        Self::new(id, name, arguments)
    }
}

/// Uniform result consumed by the decision loop's conversation state
#[derive(Debug, Clone, PartialEq)]
pub enum ToolResult {
    Text(String),
    Image {
        /// Base64 encoded image bytes
        data: String,
        mime_type: String,
        width: Option<u32>,
        height: Option<u32>,
    },
}

impl ToolResult {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    pub fn image(data: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self::Image {
            data: data.into(),
            mime_type: mime_type.into(),
            width: None,
            height: None,
        }
    }

    pub fn with_dimensions(self, w: Option<u32>, h: Option<u32>) -> Self {
        match self {
            Self::Image { data, mime_type, .. } => Self::Image {
                data,
                mime_type,
                width: w,
                height: h,
            },
            other => other,
        }
    }

    pub fn is_image(&self) -> bool {
        matches!(self, Self::Image { .. })
    }

    /// Text shown to the model for this result
    ///
    /// Images are summarized; the pixels travel in a separate user turn.
    pub fn summary(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Image {
                mime_type,
                width: Some(w),
                height: Some(h),
                ..
            } => format!("[image {} {}x{}]", mime_type, w, h),
            Self::Image { mime_type, .. } => format!("[image {}]", mime_type),
        }
    }
}

/// Classification of a finished tool call, for tracing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionKind {
    Success,
    SuccessWithImage,
    Failure,
}

/// One timed tool execution
#[derive(Debug, Clone)]
pub struct ExecutionRecord {
    pub call_id: String,
    /// Canonical name when canonicalization succeeded, raw name otherwise
    pub tool_name: String,
    pub result: ToolResult,
    pub error: Option<String>,
    pub duration: Duration,
}

impl ExecutionRecord {
    pub fn success(call_id: impl Into<String>, tool_name: impl Into<String>, result: ToolResult, duration: Duration) -> Self {
        Self {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            result,
            error: None,
            duration,
        }
    }

    pub fn failure(call_id: impl Into<String>, tool_name: impl Into<String>, error: impl Into<String>, duration: Duration) -> Self {
        let error = error.into();
        Self {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            result: ToolResult::Text(format!("Error: {}", error)),
            error: Some(error),
            duration,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn kind(&self) -> ExecutionKind {
        match (&self.error, &self.result) {
            (Some(_), _) => ExecutionKind::Failure,
            (None, ToolResult::Image { .. }) => ExecutionKind::SuccessWithImage,
            (None, ToolResult::Text(_)) => ExecutionKind::Success,
        }
    }

    /// Flatten into the serializable contract handed to decision loops
    pub fn to_output(&self) -> ToolOutput {
        let (image_base64, image_mime_type) = match &self.result {
            ToolResult::Image { data, mime_type, .. } => (Some(data.clone()), Some(mime_type.clone())),
            ToolResult::Text(_) => (None, None),
        };

        ToolOutput {
            success: self.is_success(),
            result_text: self.result.summary(),
            error_message: self.error.clone(),
            duration_ms: self.duration.as_millis() as u64,
            image_base64,
            image_mime_type,
        }
    }
}

/// Serializable execution result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolOutput {
    pub success: bool,
    pub result_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_base64: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_mime_type: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tool_call_from_json_string_input() {
        let call = ToolCall::from_value("1", "click", json!("{\"x\": 3}"));
        assert_eq!(call.arguments["x"], json!(3));

        let call = ToolCall::from_value("2", "click", json!("not json"));
        assert!(call.arguments.is_empty());

        let call = ToolCall::from_value("3", "click", JsonValue::Null);
        assert!(call.arguments.is_empty());
    }

    #[test]
    fn test_record_kinds() {
        let ok = ExecutionRecord::success("1", "click", ToolResult::text("ok"), Duration::from_millis(5));
        assert_eq!(ok.kind(), ExecutionKind::Success);

        let img = ExecutionRecord::success(
            "2",
            "screenshot",
            ToolResult::image("aGk=", "image/png"),
            Duration::from_millis(5),
        );
        assert_eq!(img.kind(), ExecutionKind::SuccessWithImage);

        let err = ExecutionRecord::failure("3", "click", "worker timed out", Duration::from_millis(5));
        assert_eq!(err.kind(), ExecutionKind::Failure);
        assert!(!err.is_success());
    }

    #[test]
    fn test_to_output_image() {
        let record = ExecutionRecord::success(
            "1",
            "screenshot",
            ToolResult::image("aGk=", "image/png").with_dimensions(Some(800), Some(600)),
            Duration::from_millis(1500),
        );

        let output = record.to_output();
        assert!(output.success);
        assert_eq!(output.duration_ms, 1500);
        assert_eq!(output.result_text, "[image image/png 800x600]");
        assert_eq!(output.image_base64.as_deref(), Some("aGk="));

        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(json["imageMimeType"], "image/png");
        assert!(json.get("errorMessage").is_none());
    }

    #[test]
    fn test_to_output_failure() {
        let record = ExecutionRecord::failure("1", "read_file", "missing parameter", Duration::ZERO);
        let output = record.to_output();

        assert!(!output.success);
        assert_eq!(output.error_message.as_deref(), Some("missing parameter"));
        assert!(output.image_base64.is_none());
    }
}
