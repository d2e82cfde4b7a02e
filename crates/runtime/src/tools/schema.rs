//! Tool naming and input schema normalization.

use mcp::JsonObject;
use serde_json::Value;

use super::ToolError;

/// Separator between the backend and tool parts of a published tool name.
pub const SEPARATOR: &str = "__";

/// Schema keys the completion API rejects or does not need.
const AUTHORING_KEYS: &[&str] = &["$schema", "$id", "$defs"];

/// The model-facing name of `tool` on `backend`.
pub fn qualified_name(backend: &str, tool: &str) -> String {
    format!("{backend}{SEPARATOR}{tool}")
}

/// Split a published name into `(backend, tool)`.
///
/// The name must contain the separator exactly once, with text on both
/// sides.
pub fn split_qualified(name: &str) -> Result<(&str, &str), ToolError> {
    if name.matches(SEPARATOR).count() != 1 {
        return Err(ToolError::Routing(name.to_string()));
    }
    match name.split_once(SEPARATOR) {
        Some((backend, tool)) if !backend.is_empty() && !tool.is_empty() => Ok((backend, tool)),
        _ => Err(ToolError::Routing(name.to_string())),
    }
}

/// Turn a backend-declared input schema into a valid call shape.
///
/// The result always has `type: "object"` and a `properties` object, and
/// never carries schema-authoring keys. Everything else, `required`
/// included, is kept. Normalizing twice gives the same schema.
pub fn normalize_schema(schema: &JsonObject) -> Value {
    let mut schema = schema.clone();
    for key in AUTHORING_KEYS {
        schema.remove(*key);
    }

    schema.insert("type".into(), Value::String("object".into()));
    if !matches!(schema.get("properties"), Some(Value::Object(_))) {
        schema.insert("properties".into(), Value::Object(JsonObject::new()));
    }

    Value::Object(schema)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> JsonObject {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn qualified_names_round_trip() {
        let name = qualified_name("weather", "get_forecast");
        assert_eq!(name, "weather__get_forecast");
        assert_eq!(split_qualified(&name).unwrap(), ("weather", "get_forecast"));
    }

    #[test]
    fn split_rejects_malformed_names() {
        for name in ["weather", "a__b__c", "__tool", "backend__", ""] {
            assert!(
                matches!(split_qualified(name), Err(ToolError::Routing(_))),
                "{name} should not route"
            );
        }
    }

    #[test]
    fn empty_schema_gets_call_shape() {
        let schema = normalize_schema(&JsonObject::new());
        assert_eq!(schema, json!({"type": "object", "properties": {}}));
    }

    #[test]
    fn authoring_keys_removed_and_required_kept() {
        let raw = object(json!({
            "$schema": "http://json-schema.org/draft-07/schema#",
            "$id": "forecast",
            "$defs": {"unit": {"type": "string"}},
            "type": "object",
            "properties": {"city": {"type": "string"}},
            "required": ["city"]
        }));
        let schema = normalize_schema(&raw);
        assert_eq!(
            schema,
            json!({
                "type": "object",
                "properties": {"city": {"type": "string"}},
                "required": ["city"]
            })
        );
    }

    #[test]
    fn normalization_is_idempotent() {
        let raw = object(json!({
            "$schema": "x",
            "properties": null,
            "required": ["q"],
            "additionalProperties": false
        }));
        let once = normalize_schema(&raw);
        let twice = normalize_schema(&object(once.clone()));
        assert_eq!(once, twice);
        assert_eq!(once["required"], json!(["q"]));
        assert_eq!(once["properties"], json!({}));
    }
}
