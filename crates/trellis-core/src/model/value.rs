use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// Typed property value stored on an entity
///
/// Timestamps keep their UTC offset; two timestamps are equal only when both
/// the instant and the offset match.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PropertyValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(DateTime<FixedOffset>),
    Bytes(Vec<u8>),
}

impl PropertyValue {
    /// Short type name, used in logs
    pub fn type_name(&self) -> &'static str {
        match self {
            PropertyValue::Bool(_) => "bool",
            PropertyValue::Int(_) => "int",
            PropertyValue::Float(_) => "float",
            PropertyValue::Text(_) => "text",
            PropertyValue::Timestamp(_) => "timestamp",
            PropertyValue::Bytes(_) => "bytes",
        }
    }

    /// Borrow the text payload, if this is a text value
    pub fn as_text(&self) -> Option<&str> {
        match self {
            PropertyValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Copy the integer payload, if this is an integer value
    pub fn as_int(&self) -> Option<i64> {
        match self {
            PropertyValue::Int(i) => Some(*i),
            _ => None,
        }
    }
}

impl PartialEq for PropertyValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (PropertyValue::Bool(a), PropertyValue::Bool(b)) => a == b,
            (PropertyValue::Int(a), PropertyValue::Int(b)) => a == b,
            (PropertyValue::Float(a), PropertyValue::Float(b)) => a == b,
            (PropertyValue::Text(a), PropertyValue::Text(b)) => a == b,
            (PropertyValue::Timestamp(a), PropertyValue::Timestamp(b)) => {
                a == b && a.offset() == b.offset()
            }
            (PropertyValue::Bytes(a), PropertyValue::Bytes(b)) => a == b,
            _ => false,
        }
    }
}

impl From<bool> for PropertyValue {
    fn from(v: bool) -> Self {
        PropertyValue::Bool(v)
    }
}

impl From<i64> for PropertyValue {
    fn from(v: i64) -> Self {
        PropertyValue::Int(v)
    }
}

impl From<f64> for PropertyValue {
    fn from(v: f64) -> Self {
        PropertyValue::Float(v)
    }
}

impl From<&str> for PropertyValue {
    fn from(v: &str) -> Self {
        PropertyValue::Text(v.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(v: String) -> Self {
        PropertyValue::Text(v)
    }
}

impl From<DateTime<FixedOffset>> for PropertyValue {
    fn from(v: DateTime<FixedOffset>) -> Self {
        PropertyValue::Timestamp(v)
    }
}

impl From<Vec<u8>> for PropertyValue {
    fn from(v: Vec<u8>) -> Self {
        PropertyValue::Bytes(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamps_compare_offsets() {
        let utc = DateTime::parse_from_rfc3339("2024-03-01T10:00:00+00:00").unwrap();
        let cet = DateTime::parse_from_rfc3339("2024-03-01T11:00:00+01:00").unwrap();
        assert_eq!(utc, cet); // same instant
        assert_ne!(PropertyValue::from(utc), PropertyValue::from(cet));
        assert_eq!(PropertyValue::from(utc), PropertyValue::from(utc));
    }

    #[test]
    fn test_variants_never_cross_compare() {
        assert_ne!(PropertyValue::from(1i64), PropertyValue::from(1.0f64));
        assert_ne!(PropertyValue::from("1"), PropertyValue::from(1i64));
    }

    #[test]
    fn test_serialized_shape_is_tagged() {
        let json = serde_json::to_value(PropertyValue::from("open")).unwrap();
        assert_eq!(json["type"], "text");
        assert_eq!(json["value"], "open");
    }
}
