//! Typed field schemas and coercion of untyped request data.
//!
//! Request data arrives as a `serde_json::Map`. Each path (or secret type)
//! declares a [`FieldSchema`] per field name; [`FieldData`] pairs the raw map
//! with the schema and hands out typed [`FieldValue`]s on demand.
//!
//! Semantics:
//! - A present value is coerced to the declared [`FieldType`] or fails with
//!   [`Error::Coercion`] naming the field and the expected type.
//! - An absent value (or JSON `null`) resolves to the schema default if one is
//!   configured, otherwise to the type's zero value.
//! - Coercion is deterministic: same raw value and schema, same outcome.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Declared type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    /// UTF-8 string.
    String,
    /// Signed 64-bit integer.
    Int,
    /// Boolean.
    Bool,
    /// Duration, given as seconds or a human duration such as `1h 30m`.
    Duration,
    /// JSON object.
    Map,
    /// List of strings, given as an array or a comma-separated string.
    CommaStringSlice,
}

impl FieldType {
    /// Canonical zero value for this type.
    pub fn zero(self) -> FieldValue {
        match self {
            FieldType::String => FieldValue::String(String::new()),
            FieldType::Int => FieldValue::Int(0),
            FieldType::Bool => FieldValue::Bool(false),
            FieldType::Duration => FieldValue::Duration(Duration::ZERO),
            FieldType::Map => FieldValue::Map(Map::new()),
            FieldType::CommaStringSlice => FieldValue::StringSlice(Vec::new()),
        }
    }

    /// Coerce a raw JSON value into this type.
    ///
    /// `Value::Null` is not handled here; callers treat it as absent.
    pub fn coerce(self, raw: &Value) -> Result<FieldValue, String> {
        match self {
            FieldType::String => coerce_string(raw).map(FieldValue::String),
            FieldType::Int => coerce_int(raw).map(FieldValue::Int),
            FieldType::Bool => coerce_bool(raw).map(FieldValue::Bool),
            FieldType::Duration => coerce_duration(raw).map(FieldValue::Duration),
            FieldType::Map => match raw {
                Value::Object(m) => Ok(FieldValue::Map(m.clone())),
                other => Err(format!("cannot use {} as a map", json_kind(other))),
            },
            FieldType::CommaStringSlice => coerce_slice(raw).map(FieldValue::StringSlice),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldType::String => "string",
            FieldType::Int => "int",
            FieldType::Bool => "bool",
            FieldType::Duration => "duration",
            FieldType::Map => "map",
            FieldType::CommaStringSlice => "comma-separated string slice",
        };
        f.write_str(name)
    }
}

/// A typed field value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    String(String),
    Int(i64),
    Bool(bool),
    Duration(Duration),
    Map(Map<String, Value>),
    StringSlice(Vec<String>),
}

impl FieldValue {
    /// Type tag of this value.
    pub fn field_type(&self) -> FieldType {
        match self {
            FieldValue::String(_) => FieldType::String,
            FieldValue::Int(_) => FieldType::Int,
            FieldValue::Bool(_) => FieldType::Bool,
            FieldValue::Duration(_) => FieldType::Duration,
            FieldValue::Map(_) => FieldType::Map,
            FieldValue::StringSlice(_) => FieldType::CommaStringSlice,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            FieldValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_duration(&self) -> Option<Duration> {
        match self {
            FieldValue::Duration(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Map<String, Value>> {
        match self {
            FieldValue::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_slice(&self) -> Option<&[String]> {
        match self {
            FieldValue::StringSlice(v) => Some(v),
            _ => None,
        }
    }
}

/// Durations render as whole seconds.
impl From<FieldValue> for Value {
    fn from(v: FieldValue) -> Self {
        match v {
            FieldValue::String(s) => Value::String(s),
            FieldValue::Int(i) => Value::from(i),
            FieldValue::Bool(b) => Value::Bool(b),
            FieldValue::Duration(d) => Value::from(d.as_secs()),
            FieldValue::Map(m) => Value::Object(m),
            FieldValue::StringSlice(v) => Value::from(v),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::String(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::String(s)
    }
}

impl From<i64> for FieldValue {
    fn from(i: i64) -> Self {
        FieldValue::Int(i)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Bool(b)
    }
}

impl From<Duration> for FieldValue {
    fn from(d: Duration) -> Self {
        FieldValue::Duration(d)
    }
}

impl From<Vec<String>> for FieldValue {
    fn from(v: Vec<String>) -> Self {
        FieldValue::StringSlice(v)
    }
}

/// Declared schema for a single field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSchema {
    pub field_type: FieldType,
    pub default: Option<FieldValue>,
    pub description: String,
}

impl FieldSchema {
    /// Schema of the given type with no default and no description.
    pub fn new(field_type: FieldType) -> Self {
        Self { field_type, default: None, description: String::new() }
    }

    /// Set the value returned when the field is absent.
    pub fn with_default(mut self, default: impl Into<FieldValue>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// Set the human description shown in help output.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Default if set, else the zero value of the declared type.
    pub fn default_or_zero(&self) -> FieldValue {
        match &self.default {
            Some(d) => d.clone(),
            None => self.field_type.zero(),
        }
    }

    /// Reject defaults whose type disagrees with the declared type.
    pub(crate) fn validate(&self, name: &str) -> Result<()> {
        match &self.default {
            Some(d) if d.field_type() != self.field_type => Err(Error::InvalidDefault {
                field: name.to_string(),
                declared: self.field_type,
                found: d.field_type(),
            }),
            _ => Ok(()),
        }
    }
}

/// Field name to schema mapping shared by a path or secret definition.
pub type FieldSchemas = HashMap<String, FieldSchema>;

/// Raw request data paired with the schema used to interpret it.
#[derive(Debug, Clone)]
pub struct FieldData {
    raw: Map<String, Value>,
    schema: Arc<FieldSchemas>,
}

impl FieldData {
    pub fn new(raw: Map<String, Value>, schema: Arc<FieldSchemas>) -> Self {
        Self { raw, schema }
    }

    /// Typed value for `name`: coerced if present, default or zero otherwise.
    pub fn get(&self, name: &str) -> Result<FieldValue> {
        let schema = self.schema(name)?;
        match self.present(name) {
            Some(raw) => coerce_field(name, schema, raw),
            None => Ok(schema.default_or_zero()),
        }
    }

    /// Typed value for `name` only if the request actually carried one.
    pub fn get_ok(&self, name: &str) -> Result<Option<FieldValue>> {
        let schema = self.schema(name)?;
        self.present(name).map(|raw| coerce_field(name, schema, raw)).transpose()
    }

    /// The untouched raw value, if any.
    pub fn get_raw(&self, name: &str) -> Option<&Value> {
        self.raw.get(name)
    }

    /// Coerce every present, schema-declared field and report the first failure.
    ///
    /// Raw keys outside the schema are ignored.
    pub fn validate(&self) -> Result<()> {
        let mut names: Vec<&String> = self.raw.keys().collect();
        names.sort();
        for name in names {
            if let (Some(schema), Some(raw)) = (self.schema.get(name), self.present(name)) {
                coerce_field(name, schema, raw)?;
            }
        }
        Ok(())
    }

    /// Raw data backing this view.
    pub fn raw(&self) -> &Map<String, Value> {
        &self.raw
    }

    fn schema(&self, name: &str) -> Result<&FieldSchema> {
        self.schema.get(name).ok_or_else(|| Error::UnknownField(name.to_string()))
    }

    fn present(&self, name: &str) -> Option<&Value> {
        self.raw.get(name).filter(|v| !v.is_null())
    }
}

fn coerce_field(name: &str, schema: &FieldSchema, raw: &Value) -> Result<FieldValue> {
    schema.field_type.coerce(raw).map_err(|reason| Error::Coercion {
        field: name.to_string(),
        expected: schema.field_type,
        reason,
    })
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn coerce_string(raw: &Value) -> Result<String, String> {
    match raw {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(format!("cannot use {} as a string", json_kind(other))),
    }
}

fn coerce_int(raw: &Value) -> Result<i64, String> {
    match raw {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                return Ok(i);
            }
            match n.as_f64() {
                Some(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 => {
                    Ok(f as i64)
                }
                _ => Err(format!("{n} is not a 64-bit integer")),
            }
        }
        Value::String(s) if s.trim().is_empty() => Ok(0),
        Value::String(s) => s.trim().parse::<i64>().map_err(|e| format!("{s:?}: {e}")),
        other => Err(format!("cannot use {} as an int", json_kind(other))),
    }
}

fn coerce_bool(raw: &Value) -> Result<bool, String> {
    match raw {
        Value::Bool(b) => Ok(*b),
        Value::Number(n) => Ok(n.as_f64().map(|f| f != 0.0).unwrap_or(false)),
        Value::String(s) => match s.trim() {
            "" => Ok(false),
            "1" | "t" | "T" | "TRUE" | "true" | "True" => Ok(true),
            "0" | "f" | "F" | "FALSE" | "false" | "False" => Ok(false),
            other => Err(format!("{other:?} is not a boolean")),
        },
        other => Err(format!("cannot use {} as a bool", json_kind(other))),
    }
}

fn coerce_duration(raw: &Value) -> Result<Duration, String> {
    match raw {
        Value::Number(n) => match n.as_u64() {
            Some(secs) => Ok(Duration::from_secs(secs)),
            None => Err(format!("{n} is not a non-negative whole number of seconds")),
        },
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                return Ok(Duration::ZERO);
            }
            if let Ok(secs) = s.parse::<u64>() {
                return Ok(Duration::from_secs(secs));
            }
            humantime::parse_duration(s).map_err(|e| format!("{s:?}: {e}"))
        }
        other => Err(format!("cannot use {} as a duration", json_kind(other))),
    }
}

fn coerce_slice(raw: &Value) -> Result<Vec<String>, String> {
    match raw {
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => Ok(s.clone()),
                Value::Number(n) => Ok(n.to_string()),
                other => Err(format!("list item is {}", json_kind(other))),
            })
            .collect(),
        Value::String(s) => Ok(s
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(str::to_string)
            .collect()),
        other => Err(format!("cannot use {} as a list", json_kind(other))),
    }
}
