//! Scalar field values and the totally ordered keys derived from them

use std::fmt;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::config::MissingValues;

/// A single field value of a record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    Date(DateTime<Utc>),
    Text(String),
}

impl Value {
    /// Parse raw text (e.g. a CSV cell) into the most specific value type
    pub fn parse(raw: &str, missing: &MissingValues) -> Self {
        if missing.is_missing(raw) {
            return Value::Null;
        }
        let trimmed = raw.trim();
        if let Ok(n) = trimmed.parse::<f64>() {
            return Value::Number(n);
        }
        if let Some(date) = parse_date(trimmed) {
            return Value::Date(date);
        }
        match trimmed.to_ascii_lowercase().as_str() {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => Value::Text(raw.to_string()),
        }
    }

    /// True for null, empty text and non-finite numbers
    pub fn is_missing(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Number(n) => !n.is_finite(),
            Value::Text(s) => s.is_empty(),
            _ => false,
        }
    }

    /// Finite numeric view of the value
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) if n.is_finite() => Some(*n),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Date view of the value. Text is parsed, numbers are epoch milliseconds.
    pub fn as_date(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::Date(d) => Some(*d),
            Value::Text(s) => parse_date(s.trim()),
            Value::Number(n) if n.is_finite() => Utc.timestamp_millis_opt(*n as i64).single(),
            _ => None,
        }
    }

    /// Sort key for this value; missing values become [`Key::Missing`]
    pub fn to_key(&self) -> Key {
        match self {
            Value::Null => Key::Missing,
            Value::Bool(b) => Key::Bool(*b),
            Value::Number(n) => Key::number(*n),
            Value::Date(d) => Key::Date(d.timestamp_millis()),
            Value::Text(s) if s.is_empty() => Key::Missing,
            Value::Text(s) => Key::Text(s.clone()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write_number(f, *n),
            Value::Date(d) => write!(f, "{}", d.to_rfc3339()),
            Value::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(d: DateTime<Utc>) -> Self {
        Value::Date(d)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Totally ordered key used by dimension indexes and group buckets.
///
/// Variants compare in declaration order, so `Missing` sorts below every
/// real value and can serve as the sentinel for absent data.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Key {
    Missing,
    Bool(bool),
    Number(OrderedFloat<f64>),
    /// Milliseconds since the Unix epoch
    Date(i64),
    Text(String),
    Tuple(Vec<Key>),
}

impl Key {
    /// Numeric key; NaN and infinities map to [`Key::Missing`]
    pub fn number(n: f64) -> Self {
        if n.is_finite() {
            Key::Number(OrderedFloat(n))
        } else {
            Key::Missing
        }
    }

    pub fn text(s: impl Into<String>) -> Self {
        Key::Text(s.into())
    }

    pub fn date(d: DateTime<Utc>) -> Self {
        Key::Date(d.timestamp_millis())
    }

    pub fn pair(a: Key, b: Key) -> Self {
        Key::Tuple(vec![a, b])
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Key::Missing)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Key::Number(n) => Some(n.0),
            Key::Date(ms) => Some(*ms as f64),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<DateTime<Utc>> {
        match self {
            Key::Date(ms) => Utc.timestamp_millis_opt(*ms).single(),
            _ => None,
        }
    }

    /// Component `i` of a tuple key
    pub fn component(&self, i: usize) -> Option<&Key> {
        match self {
            Key::Tuple(parts) => parts.get(i),
            _ => None,
        }
    }

    /// JSON rendering used by filter snapshots
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Key::Missing => serde_json::Value::Null,
            Key::Bool(b) => serde_json::Value::Bool(*b),
            Key::Number(n) => serde_json::Number::from_f64(n.0)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Key::Date(_) => self
                .as_date()
                .map(|d| serde_json::Value::String(d.to_rfc3339()))
                .unwrap_or(serde_json::Value::Null),
            Key::Text(s) => serde_json::Value::String(s.clone()),
            Key::Tuple(parts) => serde_json::Value::Array(parts.iter().map(Key::to_json).collect()),
        }
    }

    /// Inverse of [`Key::to_json`]; RFC 3339 strings become dates
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Key::Missing,
            serde_json::Value::Bool(b) => Key::Bool(*b),
            serde_json::Value::Number(n) => n.as_f64().map(Key::number).unwrap_or(Key::Missing),
            serde_json::Value::String(s) => match DateTime::parse_from_rfc3339(s) {
                Ok(d) => Key::date(d.with_timezone(&Utc)),
                Err(_) => Key::Text(s.clone()),
            },
            serde_json::Value::Array(parts) => Key::Tuple(parts.iter().map(Key::from_json).collect()),
            serde_json::Value::Object(_) => Key::Text(value.to_string()),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Missing => f.write_str("None"),
            Key::Bool(b) => write!(f, "{b}"),
            Key::Number(n) => write_number(f, n.0),
            Key::Date(_) => match self.as_date() {
                Some(d) => write!(f, "{}", d.format("%Y-%m-%d")),
                None => f.write_str("None"),
            },
            Key::Text(s) => f.write_str(s),
            Key::Tuple(parts) => {
                f.write_str("[")?;
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{part}")?;
                }
                f.write_str("]")
            }
        }
    }
}

impl From<f64> for Key {
    fn from(n: f64) -> Self {
        Key::number(n)
    }
}

impl From<i64> for Key {
    fn from(n: i64) -> Self {
        Key::number(n as f64)
    }
}

impl From<i32> for Key {
    fn from(n: i32) -> Self {
        Key::number(n as f64)
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Text(s.to_string())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::Text(s)
    }
}

impl From<&Value> for Key {
    fn from(v: &Value) -> Self {
        v.to_key()
    }
}

fn write_number(f: &mut fmt::Formatter<'_>, n: f64) -> fmt::Result {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        write!(f, "{}", n as i64)
    } else {
        write!(f, "{n}")
    }
}

fn parse_date(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(d) = DateTime::parse_from_rfc3339(s) {
        return Some(d.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| Utc.from_utc_datetime(&dt))
}
