//! Recovery of malformed tool-call arguments.
//!
//! Models sometimes emit argument payloads that are almost JSON: cut off
//! mid-string, missing closing braces, or carrying a trailing comma. A
//! session parses arguments through an [`ArgumentRecovery`] strategy so
//! that how hard it tries is a configuration choice.

use mcp::JsonObject;
use serde_json::Value;
use tracing::debug;

use crate::tools::ToolError;

/// A strategy for salvaging arguments that failed to parse.
pub trait ArgumentRecovery: Send + Sync {
    /// Try to produce a JSON value from `raw`, which did not parse as-is.
    fn recover(&self, raw: &str) -> Option<Value>;
}

/// Never recovers. Malformed arguments are reported as-is.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoRecovery;

impl ArgumentRecovery for NoRecovery {
    fn recover(&self, _raw: &str) -> Option<Value> {
        None
    }
}

/// Best-effort repair of truncated or sloppy JSON.
///
/// Repairs are applied cumulatively, re-parsing after each one:
/// trailing commas are dropped, an unterminated string is closed, then
/// unclosed objects and arrays are closed in nesting order.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonRepair;

impl ArgumentRecovery for JsonRepair {
    fn recover(&self, raw: &str) -> Option<Value> {
        let mut repaired = strip_trailing_commas(raw.trim());
        if let Ok(value) = serde_json::from_str(&repaired) {
            return Some(value);
        }

        repaired = close_open_delimiters(&repaired);
        if let Ok(value) = serde_json::from_str(&repaired) {
            return Some(value);
        }

        // Closing may have exposed a comma right before the new brace.
        serde_json::from_str(&strip_trailing_commas(&repaired)).ok()
    }
}

/// Parse a tool call's raw argument text into an argument map.
///
/// Empty text means no arguments. Anything that is not a JSON object,
/// even after recovery, is an [`ToolError::InvalidArguments`].
pub fn parse_arguments(
    raw: &str,
    recovery: &dyn ArgumentRecovery,
) -> Result<JsonObject, ToolError> {
    if raw.trim().is_empty() {
        return Ok(JsonObject::new());
    }

    let error = match serde_json::from_str::<Value>(raw) {
        Ok(value) => return into_object(value),
        Err(e) => e,
    };

    match recovery.recover(raw) {
        Some(value) => {
            debug!(raw_len = raw.len(), "recovered malformed tool arguments");
            into_object(value)
        }
        None => Err(ToolError::InvalidArguments(error.to_string())),
    }
}

fn into_object(value: Value) -> Result<JsonObject, ToolError> {
    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(JsonObject::new()),
        other => Err(ToolError::InvalidArguments(format!(
            "expected a JSON object, got {other}"
        ))),
    }
}

/// Remove commas that directly precede `}` or `]`, outside strings.
fn strip_trailing_commas(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len());
    let mut in_string = false;
    let mut escaped = false;

    for (i, &c) in chars.iter().enumerate() {
        if in_string {
            out.push(c);
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            ',' => {
                let next = chars[i + 1..].iter().find(|c| !c.is_whitespace());
                if !matches!(next, Some('}') | Some(']') | None) {
                    out.push(c);
                }
            }
            _ => out.push(c),
        }
    }
    out
}

/// Close an unterminated string and any unclosed objects or arrays.
fn close_open_delimiters(input: &str) -> String {
    let mut stack = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for c in input.chars() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                stack.pop();
            }
            _ => {}
        }
    }

    let mut out = input.to_string();
    if escaped {
        out.pop();
    }
    if in_string {
        out.push('"');
    }
    // A dangling key with no value cannot be closed meaningfully.
    if out.trim_end().ends_with(':') {
        out.push_str("null");
    }
    while let Some(closer) = stack.pop() {
        out.push(closer);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn repaired(raw: &str) -> JsonObject {
        parse_arguments(raw, &JsonRepair).unwrap()
    }

    #[test]
    fn valid_arguments_parse_without_recovery() {
        let args = parse_arguments(r#"{"city":"Paris"}"#, &NoRecovery).unwrap();
        assert_eq!(args["city"], "Paris");
    }

    #[test]
    fn empty_arguments_are_an_empty_map() {
        assert!(parse_arguments("", &NoRecovery).unwrap().is_empty());
        assert!(parse_arguments("  ", &NoRecovery).unwrap().is_empty());
        assert!(parse_arguments("null", &NoRecovery).unwrap().is_empty());
    }

    #[test]
    fn no_recovery_reports_parse_error() {
        let err = parse_arguments(r#"{"city":"Par"#, &NoRecovery).unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
        assert!(err.to_string().starts_with("error_parsing_args: "));
    }

    #[test]
    fn non_object_arguments_are_rejected() {
        assert!(matches!(
            parse_arguments("[1, 2]", &JsonRepair),
            Err(ToolError::InvalidArguments(_))
        ));
    }

    #[test]
    fn repairs_truncated_string_and_object() {
        assert_eq!(repaired(r#"{"city":"Par"#)["city"], "Par");
        assert_eq!(
            Value::Object(repaired(r#"{"q":{"tags":["a","b"#)),
            json!({"q": {"tags": ["a", "b"]}})
        );
    }

    #[test]
    fn repairs_trailing_commas() {
        assert_eq!(
            Value::Object(repaired(r#"{"a":1,"b":[1,2,],}"#)),
            json!({"a": 1, "b": [1, 2]})
        );
        assert_eq!(Value::Object(repaired(r#"{"a":1,"#)), json!({"a": 1}));
    }

    #[test]
    fn repairs_dangling_key() {
        assert_eq!(
            Value::Object(repaired(r#"{"city":"Paris","units":"#)),
            json!({"city": "Paris", "units": null})
        );
    }

    #[test]
    fn commas_inside_strings_are_kept() {
        assert_eq!(repaired(r#"{"text":"a,}"#)["text"], "a,}");
    }

    #[test]
    fn hopeless_input_still_fails() {
        assert!(matches!(
            parse_arguments("city=Paris", &JsonRepair),
            Err(ToolError::InvalidArguments(_))
        ));
    }
}
