//! Structural schema descriptor for model responses
//!
//! A tagged shape description checked structurally against parsed JSON.
//! Checking is strict: object responses may not carry keys the schema does
//! not declare.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Expected shape of a response value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Schema {
    /// Any JSON string
    String,
    /// Any JSON number
    Number,
    /// A JSON boolean
    Boolean,
    /// A string restricted to the listed values
    Enum { values: Vec<String> },
    /// An object with exactly the listed fields
    Object { fields: BTreeMap<String, Schema> },
    /// An array whose items all match
    Array { items: Box<Schema> },
}

/// A structural mismatch found while checking a value
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaViolation {
    /// JSON-pointer-ish path to the offending value
    pub path: String,
    /// What went wrong
    pub detail: String,
}

impl std::fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.detail)
    }
}

impl Schema {
    /// Convenience constructor for an object schema
    pub fn object(fields: impl IntoIterator<Item = (&'static str, Schema)>) -> Self {
        Schema::Object {
            fields: fields
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        }
    }

    /// Check a parsed value against this schema
    pub fn check(&self, value: &serde_json::Value) -> Result<(), SchemaViolation> {
        self.check_at(value, "$")
    }

    fn check_at(&self, value: &serde_json::Value, path: &str) -> Result<(), SchemaViolation> {
        use serde_json::Value;

        match (self, value) {
            (Schema::String, Value::String(_)) => Ok(()),
            (Schema::Number, Value::Number(_)) => Ok(()),
            (Schema::Boolean, Value::Bool(_)) => Ok(()),
            (Schema::Enum { values }, Value::String(s)) => {
                if values.iter().any(|v| v == s) {
                    Ok(())
                } else {
                    Err(violation(
                        path,
                        format!("{s:?} is not one of the allowed values {values:?}"),
                    ))
                }
            }
            (Schema::Object { fields }, Value::Object(map)) => {
                for (key, field_schema) in fields {
                    let field_path = format!("{path}.{key}");
                    match map.get(key) {
                        Some(v) => field_schema.check_at(v, &field_path)?,
                        None => return Err(violation(&field_path, "missing required field")),
                    }
                }
                // Strict: undeclared keys are mismatches.
                for key in map.keys() {
                    if !fields.contains_key(key) {
                        return Err(violation(
                            &format!("{path}.{key}"),
                            "field not declared in schema",
                        ));
                    }
                }
                Ok(())
            }
            (Schema::Array { items }, Value::Array(values)) => {
                for (i, v) in values.iter().enumerate() {
                    items.check_at(v, &format!("{path}[{i}]"))?;
                }
                Ok(())
            }
            _ => Err(violation(
                path,
                format!("expected {}, got {}", self.type_name(), value_type(value)),
            )),
        }
    }

    /// Render a compact shape description for inclusion in a prompt
    pub fn describe(&self) -> String {
        match self {
            Schema::String => "string".to_string(),
            Schema::Number => "number".to_string(),
            Schema::Boolean => "boolean".to_string(),
            Schema::Enum { values } => {
                let quoted: Vec<String> = values.iter().map(|v| format!("{v:?}")).collect();
                format!("one of [{}]", quoted.join(", "))
            }
            Schema::Object { fields } => {
                let body: Vec<String> = fields
                    .iter()
                    .map(|(k, v)| format!("{k:?}: {}", v.describe()))
                    .collect();
                format!("{{{}}}", body.join(", "))
            }
            Schema::Array { items } => format!("[{}]", items.describe()),
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Schema::String => "string",
            Schema::Number => "number",
            Schema::Boolean => "boolean",
            Schema::Enum { .. } => "enum string",
            Schema::Object { .. } => "object",
            Schema::Array { .. } => "array",
        }
    }
}

fn violation(path: &str, detail: impl Into<String>) -> SchemaViolation {
    SchemaViolation {
        path: path.to_string(),
        detail: detail.into(),
    }
}

fn value_type(value: &serde_json::Value) -> &'static str {
    use serde_json::Value;
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn summary_schema() -> Schema {
        Schema::object([("summary", Schema::String)])
    }

    #[test]
    fn test_matching_object() {
        assert!(summary_schema().check(&json!({"summary": "ok"})).is_ok());
    }

    #[test]
    fn test_extra_key_rejected() {
        let err = summary_schema()
            .check(&json!({"summary": "ok", "extra": 1}))
            .unwrap_err();
        assert!(err.path.contains("extra"));
        assert!(err.detail.contains("not declared"));
    }

    #[test]
    fn test_missing_field_rejected() {
        let err = summary_schema().check(&json!({})).unwrap_err();
        assert!(err.detail.contains("missing"));
    }

    #[test]
    fn test_wrong_type_rejected() {
        let err = summary_schema().check(&json!({"summary": 42})).unwrap_err();
        assert_eq!(err.path, "$.summary");
    }

    #[test]
    fn test_nested_path_reported() {
        let schema = Schema::object([(
            "items",
            Schema::Array {
                items: Box::new(Schema::Number),
            },
        )]);
        let err = schema.check(&json!({"items": [1, 2, "three"]})).unwrap_err();
        assert_eq!(err.path, "$.items[2]");
    }

    #[test]
    fn test_enum_values() {
        let schema = Schema::Enum {
            values: vec!["low".to_string(), "high".to_string()],
        };
        assert!(schema.check(&json!("low")).is_ok());
        assert!(schema.check(&json!("medium")).is_err());
    }

    #[test]
    fn test_describe() {
        let schema = Schema::object([("summary", Schema::String), ("score", Schema::Number)]);
        let desc = schema.describe();
        assert!(desc.contains("\"summary\": string"));
        assert!(desc.contains("\"score\": number"));
    }
}
