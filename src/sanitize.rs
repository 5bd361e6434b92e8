//! Input sanitization for untrusted strings
//!
//! Strips NUL and carriage returns, folds newlines into spaces and bounds the
//! length of anything that reaches business logic or is echoed back to a
//! caller. Non-ASCII text is never altered.

use serde_json::{Map, Value};

/// Appended to a value that had to be truncated
pub const TRUNCATION_MARKER: &str = "...";

/// Default bound when a caller has no specific limit
pub const DEFAULT_MAX_LENGTH: usize = 1000;

/// Bound for tool names
pub const MAX_TOOL_NAME_LENGTH: usize = 100;

/// Bound for string arguments and list items in a tool call
pub const MAX_ARGUMENT_LENGTH: usize = 500;

/// Bound for tool descriptions loaded from configuration
pub const MAX_DESCRIPTION_LENGTH: usize = 1000;

/// Bound for API keys read from the environment
pub const MAX_API_KEY_LENGTH: usize = 100;

/// Sanitize a string, bounding it to `max_length` characters.
///
/// Lengths are counted in characters, not bytes, so truncation never splits a
/// multi-byte character.
pub fn sanitize_str(value: &str, max_length: usize) -> String {
    let cleaned: String = value
        .chars()
        .filter(|c| *c != '\0' && *c != '\r')
        .map(|c| if c == '\n' { ' ' } else { c })
        .collect();

    let char_count = cleaned.chars().count();
    if char_count <= max_length {
        return cleaned;
    }

    tracing::warn!(
        original_length = char_count,
        max_length,
        "String truncated to {} characters",
        max_length
    );
    let mut truncated: String = cleaned.chars().take(max_length).collect();
    truncated.push_str(TRUNCATION_MARKER);
    truncated
}

/// Sanitize an arbitrary JSON value.
///
/// Missing and null values become the empty string; non-string values are
/// rendered to their JSON text first.
pub fn sanitize(value: Option<&Value>, max_length: usize) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => sanitize_str(s, max_length),
        Some(other) => sanitize_str(&other.to_string(), max_length),
    }
}

/// Sanitize every string argument of a tool call.
///
/// String values and string items of lists are cleaned; other values pass
/// through untouched so the validator can still reject them by type.
pub fn sanitize_arguments(arguments: &Map<String, Value>) -> Map<String, Value> {
    arguments
        .iter()
        .map(|(key, value)| {
            let cleaned = match value {
                Value::String(s) => Value::String(sanitize_str(s, MAX_ARGUMENT_LENGTH)),
                Value::Array(items) => Value::Array(
                    items
                        .iter()
                        .map(|item| match item {
                            Value::String(s) => {
                                Value::String(sanitize_str(s, MAX_ARGUMENT_LENGTH))
                            }
                            other => other.clone(),
                        })
                        .collect(),
                ),
                other => other.clone(),
            };
            (key.clone(), cleaned)
        })
        .collect()
}
