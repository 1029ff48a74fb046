//! Loosely typed tool arguments
//!
//! Models send numbers as integers, floats or numeric strings, lists as
//! arrays or newline separated text. All handlers read arguments through
//! [`Args`] so the coercion rules live in one place.

use serde_json::{Map, Value};

use crate::error::{Result, ToolError};

/// Coerce a JSON value to a number: integers, floats and numeric strings
pub fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        _ => None,
    }
}

/// Argument map of one call, bound to the tool name for error messages
pub struct Args<'a> {
    tool: &'a str,
    map: &'a Map<String, Value>,
}

impl<'a> Args<'a> {
    pub fn new(tool: &'a str, map: &'a Map<String, Value>) -> Self {
        Self { tool, map }
    }

    /// First present, non-null value among `keys`
    fn get(&self, keys: &[&str]) -> Option<&'a Value> {
        keys.iter()
            .filter_map(|k| self.map.get(*k))
            .find(|v| !v.is_null())
    }

    pub fn opt_str(&self, key: &str) -> Option<String> {
        self.opt_str_any(&[key])
    }

    /// String under the first matching key; numbers and booleans are stringified
    pub fn opt_str_any(&self, keys: &[&str]) -> Option<String> {
        match self.get(keys)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    pub fn required(&self, key: &str) -> Result<String> {
        self.required_any(&[key])
    }

    /// Required non-blank string, reported missing under the first key
    pub fn required_any(&self, keys: &[&str]) -> Result<String> {
        self.opt_str_any(keys)
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| ToolError::missing(self.tool, keys[0]))
    }

    pub fn opt_number(&self, key: &str) -> Option<f64> {
        self.get(&[key]).and_then(as_number)
    }

    pub fn number(&self, key: &str) -> Result<f64> {
        self.opt_number(key).ok_or_else(|| ToolError::missing(self.tool, key))
    }

    /// Required number rounded to a whole pixel coordinate
    pub fn coordinate(&self, key: &str) -> Result<i64> {
        Ok(self.number(key)?.round() as i64)
    }

    pub fn opt_u64(&self, key: &str) -> Option<u64> {
        self.opt_number(key).filter(|n| *n >= 0.0).map(|n| n.round() as u64)
    }

    pub fn opt_bool(&self, key: &str) -> Option<bool> {
        match self.get(&[key])? {
            Value::Bool(b) => Some(*b),
            Value::String(s) => match s.trim().to_lowercase().as_str() {
                "true" | "yes" | "1" => Some(true),
                "false" | "no" | "0" => Some(false),
                _ => None,
            },
            Value::Number(n) => n.as_f64().map(|n| n != 0.0),
            _ => None,
        }
    }

    /// List of strings from an array or from newline separated text.
    /// Blank entries and list markers are dropped.
    pub fn string_list(&self, keys: &[&str]) -> Vec<String> {
        let raw: Vec<String> = match self.get(keys) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    Value::Object(obj) => obj
                        .get("text")
                        .or_else(|| obj.get("title"))
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    _ => None,
                })
                .collect(),
            Some(Value::String(s)) => s.lines().map(str::to_string).collect(),
            _ => Vec::new(),
        };

        raw.iter()
            .map(|item| strip_list_marker(item))
            .filter(|item| !item.is_empty())
            .collect()
    }
}

fn strip_list_marker(item: &str) -> String {
    let trimmed = item.trim();
    let trimmed = trimmed
        .strip_prefix("- [ ]")
        .or_else(|| trimmed.strip_prefix("- "))
        .or_else(|| trimmed.strip_prefix("* "))
        .unwrap_or(trimmed);
    trimmed.trim().to_string()
}
