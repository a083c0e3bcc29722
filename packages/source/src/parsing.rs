//! Shared parsing utilities for raw trip records.
//!
//! Timestamp parsing and loose numeric coercion. Open-data feeds encode
//! most numbers as JSON strings, the synthetic generator as JSON numbers;
//! both are accepted.

use chrono::{DateTime, NaiveDateTime, Utc};

/// Parses a trip timestamp.
///
/// Accepts RFC 3339 (with `Z` or an offset) and the Socrata floating
/// format with or without fractional seconds. Naive timestamps are taken
/// as UTC.
#[must_use]
pub fn parse_trip_datetime(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(naive.and_utc());
        }
    }
    None
}

/// Looks up a field, treating JSON `null` as absent.
#[must_use]
pub fn field<'a>(record: &'a serde_json::Value, name: &str) -> Option<&'a serde_json::Value> {
    record.get(name).filter(|v| !v.is_null())
}

/// Coerces a JSON number or numeric string to a finite `f64`.
#[must_use]
pub fn coerce_f64(value: &serde_json::Value) -> Option<f64> {
    let n = match value {
        serde_json::Value::Number(n) => n.as_f64()?,
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

/// Coerces a JSON number or numeric string to a whole number.
///
/// Integral floats (`"2.0"`, `2.0`) are accepted since several feeds
/// publish counts that way.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn coerce_i64(value: &serde_json::Value) -> Option<i64> {
    if let Some(n) = value.as_i64() {
        return Some(n);
    }
    if let Some(s) = value.as_str()
        && let Ok(n) = s.trim().parse::<i64>()
    {
        return Some(n);
    }
    let f = coerce_f64(value)?;
    (f.fract() == 0.0 && f.abs() < 9.0e15).then_some(f as i64)
}

/// Renders a raw value for log and error messages.
#[must_use]
pub fn display_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_socrata_date_with_fractional() {
        let dt = parse_trip_datetime("2024-01-15T14:30:00.000").unwrap();
        assert_eq!(dt.to_string(), "2024-01-15 14:30:00 UTC");
    }

    #[test]
    fn parses_socrata_date_without_fractional() {
        let dt = parse_trip_datetime("2024-01-15T14:30:00").unwrap();
        assert_eq!(dt.to_string(), "2024-01-15 14:30:00 UTC");
    }

    #[test]
    fn parses_rfc3339_with_offset() {
        let dt = parse_trip_datetime("2024-01-15T09:30:00-05:00").unwrap();
        assert_eq!(dt.to_string(), "2024-01-15 14:30:00 UTC");
        let dt = parse_trip_datetime("2024-01-15T14:30:00Z").unwrap();
        assert_eq!(dt.to_string(), "2024-01-15 14:30:00 UTC");
    }

    #[test]
    fn rejects_invalid_date() {
        assert!(parse_trip_datetime("not-a-date").is_none());
        assert!(parse_trip_datetime("").is_none());
    }

    #[test]
    fn coerces_numbers_and_strings() {
        assert!((coerce_f64(&json!("12.5")).unwrap() - 12.5).abs() < f64::EPSILON);
        assert!((coerce_f64(&json!(3)).unwrap() - 3.0).abs() < f64::EPSILON);
        assert!(coerce_f64(&json!("abc")).is_none());
        assert!(coerce_f64(&json!("NaN")).is_none());
        assert!(coerce_f64(&json!(true)).is_none());
    }

    #[test]
    fn coerces_integral_values() {
        assert_eq!(coerce_i64(&json!("7")), Some(7));
        assert_eq!(coerce_i64(&json!(7)), Some(7));
        assert_eq!(coerce_i64(&json!("2.0")), Some(2));
        assert_eq!(coerce_i64(&json!(2.5)), None);
        assert_eq!(coerce_i64(&json!("seven")), None);
    }

    #[test]
    fn null_fields_are_absent() {
        let record = json!({"a": null, "b": 1});
        assert!(field(&record, "a").is_none());
        assert!(field(&record, "b").is_some());
        assert!(field(&record, "c").is_none());
    }
}
