//! Tool schema helpers

use serde_json::{json, Map, Value as JsonValue};

/// Incremental builder for a tool's JSON input schema
///
/// # Example
/// ```ignore
/// let schema = SchemaBuilder::new()
///     .number("x", "Horizontal pixel coordinate", true)
///     .number("y", "Vertical pixel coordinate", true)
///     .build();
/// ```
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    properties: Map<String, JsonValue>,
    required: Vec<String>,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a property with an arbitrary schema
    pub fn property(mut self, name: &str, schema: JsonValue, required: bool) -> Self {
        self.properties.insert(name.to_string(), schema);
        if required {
            self.required.push(name.to_string());
        }
        self
    }

    pub fn string(self, name: &str, description: &str, required: bool) -> Self {
        self.property(name, json!({"type": "string", "description": description}), required)
    }

    pub fn number(self, name: &str, description: &str, required: bool) -> Self {
        self.property(name, json!({"type": "number", "description": description}), required)
    }

    pub fn integer(self, name: &str, description: &str, required: bool) -> Self {
        self.property(name, json!({"type": "integer", "description": description}), required)
    }

    pub fn boolean(self, name: &str, description: &str, required: bool) -> Self {
        self.property(name, json!({"type": "boolean", "description": description}), required)
    }

    pub fn string_array(self, name: &str, description: &str, required: bool) -> Self {
        self.property(
            name,
            json!({"type": "array", "items": {"type": "string"}, "description": description}),
            required,
        )
    }

    /// String restricted to a fixed set of values
    pub fn string_enum(self, name: &str, description: &str, values: &[&str], required: bool) -> Self {
        self.property(
            name,
            json!({"type": "string", "enum": values, "description": description}),
            required,
        )
    }

    pub fn build(self) -> JsonValue {
        json!({
            "type": "object",
            "properties": self.properties,
            "required": self.required
        })
    }
}
