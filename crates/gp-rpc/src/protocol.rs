//! Wire envelopes and per-method timeouts
//!
//! One JSON object per line in each direction:
//!
//! ```text
//! -> {"jsonrpc":"2.0","id":"0192...","method":"screenshot","params":{}}
//! <- {"jsonrpc":"2.0","id":"0192...","result":{"image":"iVBOR...","width":1280}}
//! <- {"jsonrpc":"2.0","id":"0192...","error":{"code":-32000,"message":"no display"}}
//! ```

use std::collections::HashMap;
use std::time::Duration;

use gp_core::WorkerConfig;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::TransportError;

/// Protocol version carried by every envelope
pub const PROTOCOL_VERSION: &str = "2.0";

/// Worker automation primitives
pub mod methods {
    pub const PING: &str = "ping";
    pub const SCREENSHOT: &str = "screenshot";
    pub const TYPE_TEXT: &str = "type_text";
    pub const RUN_COMMAND: &str = "run_command";
    pub const CLICK: &str = "click";
    pub const DOUBLE_CLICK: &str = "double_click";
    pub const RIGHT_CLICK: &str = "right_click";
    pub const MOUSE_MOVE: &str = "mouse_move";
    pub const DRAG: &str = "drag";
    pub const SCROLL: &str = "scroll";
    pub const KEY_PRESS: &str = "key_press";
    pub const HOTKEY: &str = "hotkey";
    pub const CURSOR_POSITION: &str = "cursor_position";
    pub const READ_FILE: &str = "read_file";
    pub const WRITE_FILE: &str = "write_file";
    pub const LIST_DIRECTORY: &str = "list_directory";
}

/// Outbound request envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub jsonrpc: String,
    pub id: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Request {
    pub fn new(id: impl Into<String>, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: PROTOCOL_VERSION.to_string(),
            id: id.into(),
            method: method.into(),
            params,
        }
    }

    /// Serialize as one newline-terminated frame
    pub fn to_frame(&self) -> serde_json::Result<Vec<u8>> {
        let mut frame = serde_json::to_vec(self)?;
        frame.push(b'\n');
        Ok(frame)
    }
}

/// Error payload of a failed response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcErrorPayload {
    pub code: i64,
    pub message: String,
}

/// Inbound response envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    #[serde(default)]
    pub jsonrpc: String,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorPayload>,
}

impl Response {
    pub fn success(id: impl Into<String>, result: Value) -> Self {
        Self {
            jsonrpc: PROTOCOL_VERSION.to_string(),
            id: id.into(),
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: impl Into<String>, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: PROTOCOL_VERSION.to_string(),
            id: id.into(),
            result: None,
            error: Some(RpcErrorPayload {
                code,
                message: message.into(),
            }),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Result value, or the error payload as `RemoteError`
    ///
    /// A response carrying neither yields `Value::Null`.
    pub fn into_result(self) -> Result<Value, TransportError> {
        match self.error {
            Some(RpcErrorPayload { code, message }) => Err(TransportError::RemoteError { code, message }),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

/// Method-keyed call timeouts
#[derive(Debug, Clone)]
pub struct TimeoutPolicy {
    default: Duration,
    overrides: HashMap<String, Duration>,
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
            .with_override(methods::SCREENSHOT, Duration::from_secs(60))
            .with_override(methods::TYPE_TEXT, Duration::from_secs(300))
            .with_override(methods::RUN_COMMAND, Duration::from_secs(90))
    }
}

impl TimeoutPolicy {
    /// Policy with only a default and no overrides
    pub fn new(default: Duration) -> Self {
        Self {
            default,
            overrides: HashMap::new(),
        }
    }

    pub fn from_config(config: &WorkerConfig) -> Self {
        Self::new(Duration::from_secs(config.default_timeout_secs))
            .with_override(methods::SCREENSHOT, Duration::from_secs(config.observation_timeout_secs))
            .with_override(methods::TYPE_TEXT, Duration::from_secs(config.text_entry_timeout_secs))
            .with_override(methods::RUN_COMMAND, Duration::from_secs(config.command_timeout_secs))
    }

    pub fn with_override(mut self, method: impl Into<String>, timeout: Duration) -> Self {
        self.overrides.insert(method.into(), timeout);
        self
    }

    pub fn timeout_for(&self, method: &str) -> Duration {
        self.overrides.get(method).copied().unwrap_or(self.default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_frame_is_one_line() {
        let request = Request::new("abc", methods::CLICK, Some(json!({"x": 10, "y": 20})));
        let frame = request.to_frame().unwrap();

        assert_eq!(frame.last(), Some(&b'\n'));
        assert_eq!(frame.iter().filter(|b| **b == b'\n').count(), 1);

        let decoded: Request = serde_json::from_slice(&frame).unwrap();
        assert_eq!(decoded, request);
        assert_eq!(decoded.jsonrpc, "2.0");
    }

    #[test]
    fn test_heterogeneous_values_survive_the_wire() {
        let params = json!({
            "text": "line one\nline two",
            "count": 3,
            "ratio": 0.25,
            "flag": true,
            "nothing": null,
            "keys": ["ctrl", "shift", 4, 1.5],
            "nested": {"deep": [{"a": false}, []]}
        });
        let request = Request::new("id-1", methods::HOTKEY, Some(params.clone()));
        let decoded: Request = serde_json::from_slice(&request.to_frame().unwrap()).unwrap();
        assert_eq!(decoded.id, "id-1");
        assert_eq!(decoded.method, "hotkey");
        assert_eq!(decoded.params, Some(params.clone()));

        let response = Response::success("id-1", params.clone());
        let line = serde_json::to_string(&response).unwrap();
        let decoded: Response = serde_json::from_str(&line).unwrap();
        assert_eq!(decoded.into_result().unwrap(), params);
    }

    #[test]
    fn test_request_without_params_omits_field() {
        let request = Request::new("1", methods::PING, None);
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("params").is_none());
    }

    #[test]
    fn test_error_response_into_result() {
        let response: Response =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":"7","error":{"code":-32601,"message":"unknown method"}}"#)
                .unwrap();
        assert!(response.is_error());

        match response.into_result() {
            Err(TransportError::RemoteError { code, message }) => {
                assert_eq!(code, -32601);
                assert_eq!(message, "unknown method");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_response_tolerates_missing_version_and_result() {
        let response: Response = serde_json::from_str(r#"{"id":"9"}"#).unwrap();
        assert_eq!(response.into_result().unwrap(), Value::Null);
    }

    #[test]
    fn test_default_timeout_policy() {
        let policy = TimeoutPolicy::default();
        assert_eq!(policy.timeout_for(methods::CLICK), Duration::from_secs(30));
        assert_eq!(policy.timeout_for(methods::SCREENSHOT), Duration::from_secs(60));
        assert_eq!(policy.timeout_for(methods::TYPE_TEXT), Duration::from_secs(300));
        assert_eq!(policy.timeout_for(methods::RUN_COMMAND), Duration::from_secs(90));
    }

    #[test]
    fn test_timeout_policy_from_config() {
        let config = WorkerConfig {
            default_timeout_secs: 5,
            command_timeout_secs: 600,
            ..Default::default()
        };
        let policy = TimeoutPolicy::from_config(&config);
        assert_eq!(policy.timeout_for("anything"), Duration::from_secs(5));
        assert_eq!(policy.timeout_for(methods::RUN_COMMAND), Duration::from_secs(600));
        assert_eq!(policy.timeout_for(methods::SCREENSHOT), Duration::from_secs(60));
    }
}
