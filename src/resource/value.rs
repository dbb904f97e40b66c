//! Typed attribute values.
//!
//! Every value stored in a resource is one of the closed set of variants in
//! [`Value`]. Conversion from and to JSON happens only here, at the
//! ingestion boundary, driven by the attribute's declared type:
//! dateTime values are kept as epoch milliseconds and binary values as raw
//! bytes.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;

use crate::error::{ScimError, ScimResult, ScimType};
use crate::schema::{AttrType, AttributeType};

/// A single attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
}

impl Value {
    /// Convert a JSON scalar according to the attribute's type.
    pub fn from_json(at: &AttrType, json: &JsonValue) -> ScimResult<Value> {
        let invalid = |expected: &str| {
            ScimError::bad_request_with(
                ScimType::InvalidValue,
                format!(
                    "Invalid value {} for attribute {}, expected {}",
                    json, at.name, expected
                ),
            )
        };

        match at.attr_type {
            AttributeType::String | AttributeType::Reference => json
                .as_str()
                .map(|s| Value::Str(s.to_string()))
                .ok_or_else(|| invalid("a string")),
            AttributeType::Boolean => json
                .as_bool()
                .map(Value::Bool)
                .ok_or_else(|| invalid("a boolean")),
            AttributeType::Integer => {
                if let Some(i) = json.as_i64() {
                    return Ok(Value::Int(i));
                }
                match json.as_f64() {
                    Some(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
                        Ok(Value::Int(f as i64))
                    }
                    _ => Err(invalid("an integer")),
                }
            }
            AttributeType::Decimal => json
                .as_f64()
                .map(Value::Float)
                .ok_or_else(|| invalid("a decimal")),
            AttributeType::DateTime => {
                let text = json.as_str().ok_or_else(|| invalid("an RFC3339 dateTime"))?;
                parse_datetime_millis(text)
                    .map(Value::Int)
                    .ok_or_else(|| invalid("an RFC3339 dateTime"))
            }
            AttributeType::Binary => {
                let text = json.as_str().ok_or_else(|| invalid("base64 data"))?;
                BASE64
                    .decode(text)
                    .map(Value::Bytes)
                    .map_err(|_| invalid("base64 data"))
            }
            AttributeType::Complex => Err(invalid("a sub-attribute object")),
        }
    }

    /// Convert a filter literal according to the attribute's type.
    ///
    /// Quotes are already stripped. Booleans and numbers arrive as bare text.
    pub fn from_literal(at: &AttrType, literal: &str) -> ScimResult<Value> {
        let invalid = |expected: &str| {
            ScimError::invalid_filter(format!(
                "Invalid value '{}' for attribute {}, expected {}",
                literal, at.name, expected
            ))
        };

        match at.attr_type {
            AttributeType::String | AttributeType::Reference => Ok(Value::Str(literal.to_string())),
            AttributeType::Binary => BASE64
                .decode(literal)
                .map(Value::Bytes)
                .map_err(|_| invalid("base64 data")),
            AttributeType::Boolean => match literal.to_ascii_lowercase().as_str() {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                _ => Err(invalid("a boolean")),
            },
            AttributeType::Integer => literal
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|_| invalid("an integer")),
            AttributeType::Decimal => literal
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|_| invalid("a decimal")),
            AttributeType::DateTime => parse_datetime_millis(literal)
                .map(Value::Int)
                .ok_or_else(|| invalid("an RFC3339 dateTime")),
            AttributeType::Complex => Err(invalid("a simple attribute")),
        }
    }

    /// Render this value as JSON according to the attribute's type.
    pub fn to_json(&self, at: &AttrType) -> JsonValue {
        match (self, at.attr_type) {
            (Value::Int(millis), AttributeType::DateTime) => {
                JsonValue::String(format_datetime_millis(*millis))
            }
            (Value::Bool(b), _) => JsonValue::Bool(*b),
            (Value::Int(i), _) => JsonValue::from(*i),
            (Value::Float(f), _) => JsonValue::from(*f),
            (Value::Str(s), _) => JsonValue::String(s.clone()),
            (Value::Bytes(b), _) => JsonValue::String(BASE64.encode(b)),
        }
    }

    /// The value used for comparisons: strings are lowercased unless the
    /// attribute is caseExact. Binary values compare as raw bytes.
    pub fn normalized(&self, at: &AttrType) -> Value {
        match self {
            Value::Str(s) if !at.case_exact => Value::Str(s.to_lowercase()),
            other => other.clone(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Str(s) => f.write_str(s),
            Value::Bytes(b) => f.write_str(&BASE64.encode(b)),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

/// Parse an RFC3339 timestamp into epoch milliseconds.
pub fn parse_datetime_millis(text: &str) -> Option<i64> {
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|dt| dt.timestamp_millis())
}

/// Render epoch milliseconds as an RFC3339 UTC timestamp.
pub fn format_datetime_millis(millis: i64) -> String {
    match Utc.timestamp_millis_opt(millis).single() {
        Some(dt) => dt.to_rfc3339_opts(SecondsFormat::AutoSi, true),
        None => millis.to_string(),
    }
}
