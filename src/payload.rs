//! Request body validation with per-field messages.
//!
//! Bodies are parsed to a JSON value first and walked against a static
//! [`Shape`]. Every missing or mistyped field is reported under its dotted
//! path (`config_endpoints.tags.list`, `revision.files.0.uuid`) before the
//! value is decoded into its typed struct.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{FieldErrors, ServiceError};

pub const MISSING: &str = "Missing data for required field.";
const NULL: &str = "Field may not be null.";
const SCHEMA_KEY: &str = "_schema";

/// Expected JSON type of a value.
#[derive(Debug)]
pub enum Shape {
    Str,
    Int,
    /// Object with known fields; unknown fields are ignored.
    Object(&'static [Field]),
    /// Object with arbitrary keys, each value of the given shape.
    Map(&'static Shape),
    List(&'static Shape),
    Any,
}

#[derive(Debug)]
pub struct Field {
    pub name: &'static str,
    pub shape: Shape,
    pub required: bool,
}

impl Field {
    pub const fn required(name: &'static str, shape: Shape) -> Self {
        Self {
            name,
            shape,
            required: true,
        }
    }

    pub const fn optional(name: &'static str, shape: Shape) -> Self {
        Self {
            name,
            shape,
            required: false,
        }
    }
}

/// A request body with a declared shape.
pub trait Payload: DeserializeOwned {
    const SHAPE: Shape;
}

/// Parse and validate a raw body.
pub fn parse_payload<T: Payload>(body: &[u8]) -> Result<T, ServiceError> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| ServiceError::invalid("json", format!("Invalid JSON body: {e}")))?;

    let errors = check(&value, &T::SHAPE);
    if !errors.is_empty() {
        return Err(ServiceError::Validation(errors));
    }
    serde_json::from_value(value).map_err(|e| ServiceError::invalid(SCHEMA_KEY, e.to_string()))
}

/// Collect field errors of `value` against `shape`.
pub fn check(value: &Value, shape: &Shape) -> FieldErrors {
    let mut errors = FieldErrors::new();
    walk(value, shape, SCHEMA_KEY, "", &mut errors);
    errors
}

fn walk(value: &Value, shape: &Shape, label: &str, prefix: &str, errors: &mut FieldErrors) {
    match shape {
        Shape::Any => {}
        Shape::Str if !value.is_string() => push(errors, label, "Not a valid string."),
        Shape::Int if !(value.is_i64() || value.is_u64()) => {
            push(errors, label, "Not a valid integer.")
        }
        Shape::Str | Shape::Int => {}
        Shape::Object(fields) => {
            let Some(object) = value.as_object() else {
                push(errors, label, "Invalid input type.");
                return;
            };
            for field in *fields {
                let path = join(prefix, field.name);
                match object.get(field.name) {
                    None if field.required => push(errors, &path, MISSING),
                    Some(Value::Null) if field.required => push(errors, &path, NULL),
                    None | Some(Value::Null) => {}
                    Some(inner) => walk(inner, &field.shape, &path, &path, errors),
                }
            }
        }
        Shape::Map(values) => {
            let Some(object) = value.as_object() else {
                push(errors, label, "Not a valid mapping type.");
                return;
            };
            for (key, inner) in object {
                let path = join(prefix, key);
                walk(inner, values, &path, &path, errors);
            }
        }
        Shape::List(items) => {
            let Some(list) = value.as_array() else {
                push(errors, label, "Not a valid list.");
                return;
            };
            for (index, inner) in list.iter().enumerate() {
                let path = join(prefix, &index.to_string());
                walk(inner, items, &path, &path, errors);
            }
        }
    }
}

fn push(errors: &mut FieldErrors, key: &str, message: &str) {
    errors
        .entry(key.to_string())
        .or_default()
        .push(message.to_string());
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}
