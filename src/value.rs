use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::document::Document;

/// A document field value with type-aware ordering.
///
/// `Absent` is the explicit "field not present" marker, distinct from a
/// present `Null`. Path resolution and expression evaluation produce it
/// instead of erroring; it is never stored inside a document (writing
/// `Absent` to a field removes the field).
///
/// Date-like strings are normalized to `Timestamp` (millisecond epoch) on
/// conversion from JSON so they compare numerically.
#[derive(Debug, Clone)]
pub enum Value {
    Absent,
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Timestamp(i64), // millis since epoch
    Text(String),
    Array(Vec<Value>),
    Object(Document),
}

impl Eq for Value {}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        use Value::*;
        match (self, other) {
            (Absent, Absent) => Ordering::Equal,
            (Absent, _) => Ordering::Less,
            (_, Absent) => Ordering::Greater,

            (Null, Null) => Ordering::Equal,
            (Null, _) => Ordering::Less,
            (_, Null) => Ordering::Greater,

            (Bool(a), Bool(b)) => a.cmp(b),
            (Bool(_), _) => Ordering::Less,
            (_, Bool(_)) => Ordering::Greater,

            (Int(a), Int(b)) => a.cmp(b),
            (Int(a), Float(b)) => (*a as f64).total_cmp(b),
            (Float(a), Int(b)) => a.total_cmp(&(*b as f64)),
            (Float(a), Float(b)) => a.total_cmp(b),
            (Int(_) | Float(_), _) => Ordering::Less,
            (_, Int(_) | Float(_)) => Ordering::Greater,

            (Timestamp(a), Timestamp(b)) => a.cmp(b),
            (Timestamp(_), _) => Ordering::Less,
            (_, Timestamp(_)) => Ordering::Greater,

            (Text(a), Text(b)) => a.cmp(b),
            (Text(_), _) => Ordering::Less,
            (_, Text(_)) => Ordering::Greater,

            (Array(a), Array(b)) => a.iter().cmp(b.iter()),
            (Array(_), _) => Ordering::Less,
            (_, Array(_)) => Ordering::Greater,

            (Object(a), Object(b)) => a.cmp(b),
        }
    }
}

/// Values that compare equal must hash alike, so `Int` and `Float` share a
/// discriminant and hash through the same f64 representation.
impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Value::Absent => state.write_u8(0),
            Value::Null => state.write_u8(1),
            Value::Bool(b) => {
                state.write_u8(2);
                b.hash(state);
            }
            Value::Int(i) => {
                state.write_u8(3);
                (*i as f64).to_bits().hash(state);
            }
            Value::Float(f) => {
                state.write_u8(3);
                f.to_bits().hash(state);
            }
            Value::Timestamp(ms) => {
                state.write_u8(4);
                ms.hash(state);
            }
            Value::Text(s) => {
                state.write_u8(5);
                s.hash(state);
            }
            Value::Array(items) => {
                state.write_u8(6);
                for item in items {
                    item.hash(state);
                }
            }
            Value::Object(doc) => {
                state.write_u8(7);
                doc.hash(state);
            }
        }
    }
}

impl Value {
    /// Convert a JSON value. String values are checked for date formats and
    /// stored as `Timestamp(millis)` for numeric comparison.
    pub fn from_json(value: &JsonValue) -> Self {
        match value {
            JsonValue::Null => Value::Null,
            JsonValue::Bool(b) => Value::Bool(*b),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else if let Some(f) = n.as_f64() {
                    Value::Float(f)
                } else {
                    Value::Null
                }
            }
            JsonValue::String(s) => Self::parse_text(s),
            JsonValue::Array(items) => Value::Array(items.iter().map(Self::from_json).collect()),
            JsonValue::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), Self::from_json(v)))
                    .collect(),
            ),
        }
    }

    pub fn parse_text(s: &str) -> Self {
        // Fast path: skip date parsing for strings that don't look like dates.
        // Valid date strings start with YYYY-MM (4 digits + '-' + 2 digits).
        let b = s.as_bytes();
        if b.len() < 10
            || !b[0].is_ascii_digit()
            || !b[1].is_ascii_digit()
            || !b[2].is_ascii_digit()
            || !b[3].is_ascii_digit()
            || b[4] != b'-'
            || !b[5].is_ascii_digit()
            || !b[6].is_ascii_digit()
        {
            return Value::Text(s.to_string());
        }

        // Try RFC 3339 / ISO 8601 with timezone: "2024-01-15T10:30:00Z"
        if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
            return Value::Timestamp(dt.timestamp_millis());
        }
        // Try ISO 8601 without timezone: "2024-01-15T10:30:00"
        if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
            return Value::Timestamp(dt.and_utc().timestamp_millis());
        }
        // Try space-separated datetime: "2024-01-15 10:30:00"
        if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
            return Value::Timestamp(dt.and_utc().timestamp_millis());
        }
        // Try date only: "2024-01-15"
        if let Ok(d) = chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d") {
            if let Some(dt) = d.and_hms_opt(0, 0, 0) {
                return Value::Timestamp(dt.and_utc().timestamp_millis());
            }
        }
        Value::Text(s.to_string())
    }

    /// Convert back to a JSON value. `Timestamp` renders as RFC 3339;
    /// `Absent` renders as null (it never occurs inside a document).
    pub fn to_json(&self) -> JsonValue {
        match self {
            Value::Absent | Value::Null => JsonValue::Null,
            Value::Bool(b) => JsonValue::Bool(*b),
            Value::Int(i) => JsonValue::Number((*i).into()),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            Value::Timestamp(ms) => {
                let secs = ms.div_euclid(1000);
                let nsecs = ms.rem_euclid(1000) as u32 * 1_000_000;
                if let Some(dt) = chrono::DateTime::from_timestamp(secs, nsecs) {
                    JsonValue::String(dt.to_rfc3339())
                } else {
                    JsonValue::Number((*ms).into())
                }
            }
            Value::Text(s) => JsonValue::String(s.clone()),
            Value::Array(items) => JsonValue::Array(items.iter().map(Value::to_json).collect()),
            Value::Object(doc) => doc.to_json(),
        }
    }

    /// Build a number value, preferring `Int` when the float is integral.
    pub fn from_f64(n: f64) -> Self {
        if n.fract() == 0.0 && n >= i64::MIN as f64 && n <= i64::MAX as f64 {
            Value::Int(n as i64)
        } else {
            Value::Float(n)
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Value::Absent)
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Absent | Value::Null)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        JsonValue::deserialize(deserializer).map(|json| Value::from_json(&json))
    }
}
