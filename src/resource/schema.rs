//! Declarative field mapping
//!
//! A [`Schema`] is a const table of `raw key -> attribute (+ transform)`
//! records. [`init_attrs`] interprets it against a raw provider object and
//! produces an attribute map whose keys are the resource struct's serde field
//! names.

use crate::error::{Error, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};

/// How a raw value becomes an attribute value
#[derive(Debug, Clone, Copy)]
pub enum Transform {
    Keep,
    /// Epoch milliseconds -> RFC 3339 UTC
    EpochMillis,
    /// Epoch seconds (integer or float) -> RFC 3339 UTC
    EpochSeconds,
    /// Numbers and booleans -> strings
    Stringify,
    /// Object, or array of objects, mapped with another schema
    Nested(&'static Schema),
}

/// One mapping record
#[derive(Debug, Clone, Copy)]
pub struct Field {
    pub raw: &'static str,
    /// Attribute name; `None` means the snake_case form of `raw`
    pub attr: Option<&'static str>,
    pub transform: Transform,
}

impl Field {
    pub const fn keep(raw: &'static str) -> Self {
        Self {
            raw,
            attr: None,
            transform: Transform::Keep,
        }
    }

    pub const fn rename(raw: &'static str, attr: &'static str) -> Self {
        Self {
            raw,
            attr: Some(attr),
            transform: Transform::Keep,
        }
    }

    pub const fn with(self, transform: Transform) -> Self {
        Self {
            raw: self.raw,
            attr: self.attr,
            transform,
        }
    }

    fn attr_name(&self) -> String {
        match self.attr {
            Some(attr) => attr.to_string(),
            None => snake_case(self.raw),
        }
    }
}

/// Mapping table for one resource kind (or nested sub-object)
#[derive(Debug)]
pub struct Schema {
    pub kind: &'static str,
    pub fields: &'static [Field],
}

impl Schema {
    pub fn field(&self, raw: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.raw == raw)
    }
}

/// What to do with raw keys the schema does not know
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strictness {
    /// Collect every unmapped key and fail with [`Error::UnmappedKeys`]
    #[default]
    Strict,
    /// Warn and keep the value under its snake_case name
    Lenient,
}

/// Map a raw provider object to attributes
pub fn init_attrs(raw: &Value, schema: &Schema, strictness: Strictness) -> Result<Map<String, Value>> {
    let Value::Object(raw) = raw else {
        return Err(Error::invalid(format!(
            "{}: expected a JSON object, got {}",
            schema.kind,
            type_name(raw)
        )));
    };

    let mut attrs = Map::new();
    let mut unmapped = Vec::new();

    for (key, value) in raw {
        match schema.field(key) {
            Some(field) => {
                let value = apply(field, value, schema, strictness)?;
                attrs.insert(field.attr_name(), value);
            }
            None => {
                if strictness == Strictness::Lenient {
                    tracing::warn!("{}: no mapping for '{}', using default", schema.kind, key);
                    attrs.insert(snake_case(key), value.clone());
                }
                unmapped.push(key.clone());
            }
        }
    }

    if strictness == Strictness::Strict && !unmapped.is_empty() {
        return Err(Error::UnmappedKeys {
            kind: schema.kind,
            keys: unmapped,
        });
    }

    Ok(attrs)
}

fn apply(field: &Field, value: &Value, schema: &Schema, strictness: Strictness) -> Result<Value> {
    match field.transform {
        Transform::Keep => Ok(value.clone()),
        Transform::EpochMillis => epoch_to_rfc3339(value, 1_000, schema, field),
        Transform::EpochSeconds => epoch_to_rfc3339(value, 1, schema, field),
        Transform::Stringify => Ok(match value {
            Value::Number(n) => Value::String(n.to_string()),
            Value::Bool(b) => Value::String(b.to_string()),
            other => other.clone(),
        }),
        Transform::Nested(nested) => match value {
            Value::Array(items) => items
                .iter()
                .map(|item| init_attrs(item, nested, strictness).map(Value::Object))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
            Value::Object(_) => init_attrs(value, nested, strictness).map(Value::Object),
            Value::Null => Ok(Value::Null),
            other => Err(Error::invalid(format!(
                "{}.{}: expected object or array, got {}",
                schema.kind,
                field.raw,
                type_name(other)
            ))),
        },
    }
}

fn epoch_to_rfc3339(value: &Value, per_second: i64, schema: &Schema, field: &Field) -> Result<Value> {
    if value.is_null() {
        return Ok(Value::Null);
    }

    let millis = match value {
        Value::Number(n) if per_second == 1_000 => n.as_i64(),
        Value::Number(n) => n.as_f64().map(|secs| (secs * 1_000.0).round() as i64),
        _ => None,
    };

    millis
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .map(|dt| Value::String(dt.to_rfc3339_opts(SecondsFormat::Millis, true)))
        .ok_or_else(|| {
            Error::invalid(format!(
                "{}.{}: not an epoch timestamp: {}",
                schema.kind, field.raw, value
            ))
        })
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// CamelCase -> snake_case, keeping acronyms together.
///
/// `HTTPResponseCode` -> `http_response_code`, `Camel2Camel2Case` ->
/// `camel2_camel2_case`, `TableArn` -> `table_arn`.
pub fn snake_case(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        if c.is_uppercase() {
            let prev = i.checked_sub(1).map(|p| chars[p]);
            let next = chars.get(i + 1).copied();
            let boundary = match prev {
                None | Some('_') => false,
                Some(p) if p.is_lowercase() || p.is_ascii_digit() => true,
                Some(p) if p.is_uppercase() => next.is_some_and(|n| n.is_lowercase()),
                Some(_) => false,
            };
            if boundary {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }

    out
}
