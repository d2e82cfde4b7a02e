//! Raw tool metadata as reported by a backend.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A JSON object (tool arguments, input schemas).
pub type JsonObject = Map<String, Value>;

/// One tool as listed by a backend at discovery time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub input_schema: JsonObject,
}

impl ToolDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema: JsonObject::new(),
        }
    }

    pub fn with_schema(mut self, schema: Value) -> Self {
        if let Value::Object(map) = schema {
            self.input_schema = map;
        }
        self
    }
}

impl From<rmcp::model::Tool> for ToolDescriptor {
    fn from(tool: rmcp::model::Tool) -> Self {
        Self {
            name: tool.name.to_string(),
            description: tool
                .description
                .map(|d| d.to_string())
                .unwrap_or_default(),
            input_schema: tool.input_schema.as_ref().clone(),
        }
    }
}
