//! Lenient serde helpers for fields the search backend encodes inconsistently.
//!
//! Scripted aggregations emit numbers as integers or floats depending on the
//! painless code path, and identifiers such as run numbers show up both as
//! strings and as numbers.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Deserialize a number that may arrive as an integer, a float, a numeric
/// string or null (null and garbage become `0.0`).
pub fn f64_lenient<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(value_as_f64).unwrap_or(0.0))
}

/// Same as [`f64_lenient`] but truncated into a non-negative count.
pub fn u64_lenient<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = f64_lenient(deserializer)?;
    Ok(if value.is_finite() && value > 0.0 {
        value as u64
    } else {
        0
    })
}

/// Deserialize an optional identifier that may be a string or a number.
pub fn opt_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| value_as_string(&v)))
}

/// Deserialize a list of strings where a single bare string is also accepted.
pub fn string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Array(items)) => items.iter().filter_map(value_as_string).collect(),
        Some(other) => value_as_string(&other).into_iter().collect(),
        None => Vec::new(),
    })
}

/// Numeric view of a JSON value.
pub fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// String view of a scalar JSON value.
pub fn value_as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(match n.as_i64() {
            Some(i) => i.to_string(),
            None => n.to_string(),
        }),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct Sample {
        #[serde(default, deserialize_with = "f64_lenient")]
        duration: f64,
        #[serde(default, deserialize_with = "u64_lenient")]
        count: u64,
        #[serde(default, deserialize_with = "opt_string_or_number")]
        run_number: Option<String>,
        #[serde(default, deserialize_with = "string_list")]
        names: Vec<String>,
    }

    #[test]
    fn test_integer_and_float_encodings() {
        let a: Sample =
            serde_json::from_str(r#"{"duration": 12, "count": 3.0, "run_number": 7}"#).unwrap();
        assert_eq!(a.duration, 12.0);
        assert_eq!(a.count, 3);
        assert_eq!(a.run_number.as_deref(), Some("7"));

        let b: Sample =
            serde_json::from_str(r#"{"duration": "1.5", "count": null, "run_number": "42"}"#)
                .unwrap();
        assert_eq!(b.duration, 1.5);
        assert_eq!(b.count, 0);
        assert_eq!(b.run_number.as_deref(), Some("42"));
    }

    #[test]
    fn test_string_list_accepts_single_value() {
        let s: Sample = serde_json::from_str(r#"{"names": "snyksast"}"#).unwrap();
        assert_eq!(s.names, vec!["snyksast"]);
        let s: Sample = serde_json::from_str(r#"{"names": ["a", 2]}"#).unwrap();
        assert_eq!(s.names, vec!["a", "2"]);
    }
}
