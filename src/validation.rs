//! Validation of declared state.
//!
//! Everything here runs before any backend call: a malformed `member` or an
//! unparseable `policy_data` is reported as a field-level [`Diagnostic`].
//!
//! # Example
//!
//! ```
//! use hemmer_iam::schema::iam_member_schema;
//! use hemmer_iam::validation::validate;
//! use serde_json::json;
//!
//! let schema = iam_member_schema("folder_id");
//! let diagnostics = validate(&schema, &json!({
//!     "folder_id": "b1g",
//!     "role": "viewer",
//!     "member": "userAccount:aje1",
//! }));
//! assert!(diagnostics.is_empty());
//!
//! let diagnostics = validate(&schema, &json!({
//!     "folder_id": "b1g",
//!     "role": "viewer",
//!     "member": "aje1",
//! }));
//! assert_eq!(diagnostics[0].attribute, Some("member".to_string()));
//! ```

use serde_json::Value;

use crate::merge::parse_canonical_member;
use crate::schema::{Attribute, AttributeType, Diagnostic, DiagnosticSeverity, Schema};
use crate::types::Policy;

/// Validate a configuration against a schema.
///
/// Returns a list of diagnostics; an empty list means the value is valid.
///
/// - Required attributes must be present and non-null
/// - Computed-only attributes are skipped
/// - Attribute types must match the schema
/// - `member`, `members` and `policy_data` must be well-formed
pub fn validate(schema: &Schema, value: &Value) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    let obj = match value {
        Value::Object(map) => map,
        _ => {
            diagnostics.push(
                Diagnostic::error("Expected object")
                    .with_detail(format!("Got {}", value_type_name(value))),
            );
            return diagnostics;
        },
    };

    let mut names: Vec<&String> = schema.attributes.keys().collect();
    names.sort();
    for name in names {
        let attr = &schema.attributes[name];
        validate_attribute(attr, obj.get(name.as_str()), name, &mut diagnostics);
    }

    if diagnostics.is_empty() {
        validate_iam_fields(obj, &mut diagnostics);
    }
    diagnostics
}

/// Validate a configuration, returning Ok if valid or Err with diagnostics.
pub fn validate_result(schema: &Schema, value: &Value) -> Result<(), Vec<Diagnostic>> {
    let diagnostics = validate(schema, value);
    if diagnostics.iter().any(Diagnostic::is_error) {
        Err(diagnostics)
    } else {
        Ok(())
    }
}

/// Check that `member` has the `TYPE:ID` form.
pub fn validate_member(member: &str, path: &str) -> Option<Diagnostic> {
    parse_canonical_member(member).err().map(|_| {
        Diagnostic::error(format!("Invalid member {:?}", member))
            .with_detail("Member must be in the format TYPE:ID, e.g. userAccount:aje1")
            .with_attribute(path)
    })
}

/// Check that `data` is a policy document.
pub fn validate_policy_data(data: &str, path: &str) -> Option<Diagnostic> {
    Policy::from_json(data).err().map(|e| {
        Diagnostic::error("Invalid policy document")
            .with_detail(e.to_string())
            .with_attribute(path)
    })
}

fn validate_iam_fields(obj: &serde_json::Map<String, Value>, diagnostics: &mut Vec<Diagnostic>) {
    if let Some(Value::String(member)) = obj.get("member") {
        diagnostics.extend(validate_member(member, "member"));
    }
    if let Some(Value::Array(members)) = obj.get("members") {
        for (i, member) in members.iter().enumerate() {
            if let Value::String(member) = member {
                diagnostics.extend(validate_member(member, &format!("members.{}", i)));
            }
        }
    }
    if let Some(Value::String(data)) = obj.get("policy_data") {
        diagnostics.extend(validate_policy_data(data, "policy_data"));
    }
    if let Some(Value::Number(n)) = obj.get("sleep_after") {
        if n.as_u64().is_none() {
            diagnostics.push(
                Diagnostic::error("sleep_after must be a non-negative number of seconds")
                    .with_attribute("sleep_after"),
            );
        }
    }
}

fn validate_attribute(
    attr: &Attribute,
    value: Option<&Value>,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    if attr.flags.is_computed_only() {
        return;
    }

    match value {
        None | Some(Value::Null) => {
            if attr.flags.required {
                diagnostics.push(
                    Diagnostic::error(format!("Missing required attribute '{}'", path))
                        .with_detail("This attribute is required and must be provided")
                        .with_attribute(path),
                );
            }
        },
        Some(v) => validate_attribute_type(&attr.attr_type, v, path, diagnostics),
    }
}

fn validate_attribute_type(
    attr_type: &AttributeType,
    value: &Value,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    match attr_type {
        AttributeType::String => {
            if !value.is_string() {
                diagnostics.push(type_error(path, "string", value));
            }
        },
        AttributeType::Int64 => {
            if !is_int64(value) {
                diagnostics.push(type_error(path, "int64", value));
            }
        },
        AttributeType::Bool => {
            if !value.is_boolean() {
                diagnostics.push(type_error(path, "bool", value));
            }
        },
        AttributeType::List(element_type) | AttributeType::Set(element_type) => {
            if let Some(arr) = value.as_array() {
                for (i, elem) in arr.iter().enumerate() {
                    let elem_path = format!("{}.{}", path, i);
                    validate_attribute_type(element_type, elem, &elem_path, diagnostics);
                }
            } else {
                let expected = if matches!(attr_type, AttributeType::Set(_)) {
                    "set"
                } else {
                    "list"
                };
                diagnostics.push(type_error(path, expected, value));
            }
        },
    }
}

fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn is_int64(value: &Value) -> bool {
    match value {
        Value::Number(n) => {
            n.is_i64()
                || n.is_u64() && n.as_u64().is_some_and(|u| u <= i64::MAX as u64)
                || n.as_f64().is_some_and(|f| f.fract() == 0.0)
        },
        _ => false,
    }
}

fn type_error(path: &str, expected: &str, got: &Value) -> Diagnostic {
    Diagnostic {
        severity: DiagnosticSeverity::Error,
        summary: format!("Invalid type for attribute '{}'", path),
        detail: Some(format!(
            "Expected {}, got {}",
            expected,
            value_type_name(got)
        )),
        attribute: Some(path.to_string()),
    }
}
