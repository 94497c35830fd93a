//! Loosely Typed Request Fields
//!
//! Browser clients send counts both as numbers and as numeric strings, and
//! a body with a mistyped field must still reach the admin key check. These
//! fields therefore always deserialize, and are validated afterwards.

use serde::Deserialize;

/// One JSON request field of any shape
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Integer literal
    Integer(i64),
    /// String, possibly holding a number (`"25"`)
    Text(String),
    /// Anything else (floats, arrays, objects, booleans, null)
    Other(serde_json::Value),
}

impl FieldValue {
    /// Non-empty string value
    pub fn text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) if !s.is_empty() => Some(s.as_str()),
            _ => None,
        }
    }

    /// Integer value, parsing numeric strings
    pub fn integer(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(n) => Some(*n),
            FieldValue::Text(s) => s.trim().parse().ok(),
            FieldValue::Other(_) => None,
        }
    }

    /// Strictly positive count, `None` for zero, negatives or non-numbers
    pub fn count(&self) -> Option<u64> {
        self.integer()
            .filter(|n| *n > 0)
            .and_then(|n| u64::try_from(n).ok())
    }
}

/// Read an optional field as a count
pub fn count(field: Option<&FieldValue>) -> Option<u64> {
    field.and_then(FieldValue::count)
}

/// Read an optional field as non-empty text
pub fn text(field: Option<&FieldValue>) -> Option<&str> {
    field.and_then(FieldValue::text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> FieldValue {
        serde_json::from_str(raw).unwrap()
    }

    #[test]
    fn test_numbers_and_numeric_strings() {
        assert_eq!(parse("25").count(), Some(25));
        assert_eq!(parse(r#""25""#).count(), Some(25));
        assert_eq!(parse(r#"" 7 ""#).count(), Some(7));
        assert_eq!(parse("0").count(), None);
        assert_eq!(parse("-3").count(), None);
        assert_eq!(parse(r#""-3""#).integer(), Some(-3));
        assert_eq!(parse(r#""abc""#).count(), None);
        assert_eq!(parse("2.5").count(), None);
    }

    #[test]
    fn test_any_shape_deserializes() {
        assert!(matches!(parse(r#"["x"]"#), FieldValue::Other(_)));
        assert!(matches!(parse("null"), FieldValue::Other(_)));
        assert_eq!(parse(r#"["x"]"#).text(), None);
        assert_eq!(parse(r#""""#).text(), None);
        assert_eq!(parse(r#""U1""#).text(), Some("U1"));
        assert_eq!(parse("42").text(), None);
    }
}
