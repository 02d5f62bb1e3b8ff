//! Parsing and schema validation of raw model output.
//!
//! Validation never stops at the first problem: every missing or mistyped
//! field is reported so a corrective prompt can address them all at once.

use std::fmt;

use serde_json::{Map, Value};

use crate::schema::{FieldType, Schema};

/// Category of a [`Violation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViolationKind {
    /// The backend could not be reached or returned an error.
    Transport,
    /// The returned text is not well-formed JSON.
    Parse,
    MissingField,
    TypeMismatch,
    /// Well-formed JSON whose top level is not an object.
    NotAnObject,
    /// Schema-conformant JSON the target Rust type still rejects.
    Deserialize,
}

/// A specific mismatch between a backend response and the schema.
#[derive(Debug, Clone, PartialEq)]
pub enum Violation {
    Transport {
        message: String,
        retryable: bool,
    },
    Parse {
        message: String,
    },
    MissingField {
        path: String,
    },
    TypeMismatch {
        path: String,
        expected: String,
        actual: &'static str,
    },
    NotAnObject {
        actual: &'static str,
    },
    Deserialize {
        message: String,
    },
}

impl Violation {
    pub fn transport(message: impl Into<String>, retryable: bool) -> Self {
        Self::Transport {
            message: message.into(),
            retryable,
        }
    }

    pub fn deserialize(message: impl Into<String>) -> Self {
        Self::Deserialize {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ViolationKind {
        match self {
            Self::Transport { .. } => ViolationKind::Transport,
            Self::Parse { .. } => ViolationKind::Parse,
            Self::MissingField { .. } => ViolationKind::MissingField,
            Self::TypeMismatch { .. } => ViolationKind::TypeMismatch,
            Self::NotAnObject { .. } => ViolationKind::NotAnObject,
            Self::Deserialize { .. } => ViolationKind::Deserialize,
        }
    }

    /// Whether another attempt could plausibly clear this violation.
    ///
    /// Only transport failures such as a rejected API key are permanent.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { retryable, .. } => *retryable,
            _ => true,
        }
    }

    /// Field path this violation refers to, if any.
    pub fn path(&self) -> Option<&str> {
        match self {
            Self::MissingField { path } | Self::TypeMismatch { path, .. } => Some(path),
            _ => None,
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport { message, .. } => write!(f, "backend call failed: {message}"),
            Self::Parse { message } => write!(f, "response is not valid JSON: {message}"),
            Self::MissingField { path } => write!(f, "field '{path}' missing"),
            Self::TypeMismatch {
                path,
                expected,
                actual,
            } => write!(f, "field '{path}' expected {expected}, got {actual}"),
            Self::NotAnObject { actual } => {
                write!(f, "response must be a JSON object, got {actual}")
            }
            Self::Deserialize { message } => {
                write!(f, "response does not match the target type: {message}")
            }
        }
    }
}

/// Join violations into a single line for logs and error messages.
pub fn summarize(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// JSON type name of a value, as used in violation messages.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Parse raw backend text into JSON, tolerating a surrounding Markdown fence.
///
/// Text that is already valid JSON is taken as-is, whatever its top-level
/// type; cleanup only runs when the direct parse fails.
pub fn parse_response(raw: &str) -> Result<Value, Violation> {
    let trimmed = raw.trim();
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Ok(value);
    }
    let cleaned = clean_json_text(trimmed);
    serde_json::from_str::<Value>(&cleaned).map_err(|err| Violation::Parse {
        message: err.to_string(),
    })
}

/// Parse and validate in one step.
pub fn parse_and_validate(raw: &str, schema: &Schema) -> Result<Value, Vec<Violation>> {
    let value = parse_response(raw).map_err(|v| vec![v])?;
    let violations = validate(schema, &value);
    if violations.is_empty() {
        Ok(value)
    } else {
        Err(violations)
    }
}

/// Check `value` against `schema`, returning every violation found.
///
/// Undeclared fields are ignored.
pub fn validate(schema: &Schema, value: &Value) -> Vec<Violation> {
    let mut violations = Vec::new();
    match value {
        Value::Object(map) => validate_fields(schema, map, None, &mut violations),
        other => violations.push(Violation::NotAnObject {
            actual: json_type_name(other),
        }),
    }
    violations
}

fn validate_fields(
    schema: &Schema,
    map: &Map<String, Value>,
    prefix: Option<&str>,
    out: &mut Vec<Violation>,
) {
    for field in schema.fields() {
        let path = match prefix {
            Some(prefix) => format!("{prefix}.{}", field.name()),
            None => field.name().to_string(),
        };
        match map.get(field.name()) {
            None => {
                if field.is_required() {
                    out.push(Violation::MissingField { path });
                }
            }
            Some(Value::Null) if !field.is_required() => {}
            Some(value) => check_type(field.field_type(), value, &path, out),
        }
    }
}

fn check_type(expected: &FieldType, value: &Value, path: &str, out: &mut Vec<Violation>) {
    match (expected, value) {
        (FieldType::String, Value::String(_))
        | (FieldType::Number, Value::Number(_))
        | (FieldType::Boolean, Value::Bool(_)) => {}
        (FieldType::Integer, Value::Number(n)) if is_whole(n) => {}
        (FieldType::Array(item), Value::Array(items)) => {
            if let Some(item) = item {
                for (idx, element) in items.iter().enumerate() {
                    check_type(item, element, &format!("{path}[{idx}]"), out);
                }
            }
        }
        (FieldType::Object(nested), Value::Object(map)) => {
            if let Some(nested) = nested {
                validate_fields(nested, map, Some(path), out);
            }
        }
        (expected, value) => out.push(Violation::TypeMismatch {
            path: path.to_string(),
            expected: expected.to_string(),
            actual: json_type_name(value),
        }),
    }
}

fn is_whole(n: &serde_json::Number) -> bool {
    n.is_i64() || n.is_u64() || n.as_f64().is_some_and(|f| f.fract() == 0.0)
}

/// Strip Markdown code fences and surrounding prose from model text.
pub(crate) fn clean_json_text(text: &str) -> String {
    let text = text.trim();

    if let Some(start) = text.find("```") {
        if let Some(end) = text.rfind("```") {
            if start < end {
                // Skip the fence line, which may carry a language tag.
                if let Some(newline) = text[start..end].find('\n') {
                    let content_start = start + newline + 1;
                    if content_start < end {
                        return text[content_start..end].trim().to_string();
                    }
                }
            }
        }
    }

    // Fallback heuristic: outermost brackets, keeping a top-level array intact.
    let object_start = text.find('{');
    let array_start = text.find('[');
    let (start, close) = match (object_start, array_start) {
        (Some(obj), Some(arr)) if arr < obj => (arr, ']'),
        (Some(obj), _) => (obj, '}'),
        (None, Some(arr)) => (arr, ']'),
        (None, None) => return text.to_string(),
    };
    match text.rfind(close) {
        Some(end) if start <= end => text[start..=end].to_string(),
        _ => text.to_string(),
    }
}
