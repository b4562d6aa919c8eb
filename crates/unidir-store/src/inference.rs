//! Type inference for unseen fields.
//!
//! Classifies the observed values of a new field by majority vote and
//! coerces raw JSON values into the registered type at write time.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;

use unidir_core::{DataType, FieldValue};

/// Majority threshold for the classification vote.
const VOTE_THRESHOLD: f64 = 0.8;

/// Smallest text length bound ever inferred.
const MIN_TEXT_LENGTH: i64 = 50;

/// Largest text length bound ever inferred.
const MAX_TEXT_LENGTH: i64 = 1000;

/// Outcome of inferring a single field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InferredType {
    /// The winning data type.
    pub data_type: DataType,
    /// Length bound for text fields.
    pub max_length: Option<i64>,
}

impl InferredType {
    fn plain(data_type: DataType) -> Self {
        Self {
            data_type,
            max_length: None,
        }
    }

    fn text(max_length: i64) -> Self {
        Self {
            data_type: DataType::Text,
            max_length: Some(max_length),
        }
    }
}

/// Infer the type of a field from its observed values.
///
/// Returns `None` when no non-null, non-empty value was observed — the
/// field is not yet inferable and is skipped this batch.
///
/// The vote runs boolean, then numeric, then date-like, each needing at
/// least 80% of the observed values; anything else falls back to text with
/// a padded length bound. Well-known semantic names override the vote.
#[must_use]
pub fn infer_field(field_name: &str, values: &[&Value]) -> Option<InferredType> {
    let observed: Vec<&Value> = values.iter().copied().filter(|v| is_observable(v)).collect();
    if observed.is_empty() {
        return None;
    }

    if let Some(inferred) = name_heuristic(field_name) {
        return Some(inferred);
    }

    let total = observed.len() as f64;
    let booleans = observed.iter().filter(|v| is_boolean_like(v)).count() as f64;
    if booleans / total >= VOTE_THRESHOLD {
        return Some(InferredType::plain(DataType::Boolean));
    }

    let numerics: Vec<f64> = observed.iter().filter_map(|v| numeric_value(v)).collect();
    if numerics.len() as f64 / total >= VOTE_THRESHOLD {
        let fractional = numerics.iter().any(|n| n.fract() != 0.0);
        return Some(InferredType::plain(if fractional {
            DataType::Real
        } else {
            DataType::Integer
        }));
    }

    let dates = observed
        .iter()
        .filter(|v| v.as_str().and_then(parse_date_like).is_some())
        .count() as f64;
    if dates / total >= VOTE_THRESHOLD {
        return Some(InferredType::plain(DataType::DateTime));
    }

    let longest = observed
        .iter()
        .map(|v| display_len(v))
        .max()
        .unwrap_or(0) as f64;
    let padded = (longest * 1.2).ceil() as i64;
    Some(InferredType::text(padded.max(MIN_TEXT_LENGTH).min(MAX_TEXT_LENGTH)))
}

/// Coerce a raw JSON value into the registered type.
///
/// Returns `None` for nulls, empty strings, and values that do not fit the
/// type; callers skip those rather than writing garbage.
#[must_use]
pub fn coerce_value(value: &Value, data_type: DataType) -> Option<FieldValue> {
    if !is_observable(value) {
        return None;
    }
    match data_type {
        DataType::Text => Some(FieldValue::Text(match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })),
        DataType::Integer => match value {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
                .map(FieldValue::Integer),
            Value::String(s) => s.trim().parse::<i64>().ok().map(FieldValue::Integer),
            _ => None,
        },
        DataType::Real => match value {
            Value::Number(n) => n.as_f64().map(FieldValue::Real),
            Value::String(s) => s.trim().parse::<f64>().ok().map(FieldValue::Real),
            _ => None,
        },
        DataType::Boolean => match value {
            Value::Bool(b) => Some(FieldValue::Boolean(*b)),
            Value::String(s) => match s.trim().to_lowercase().as_str() {
                "true" => Some(FieldValue::Boolean(true)),
                "false" => Some(FieldValue::Boolean(false)),
                _ => None,
            },
            _ => None,
        },
        DataType::DateTime => value
            .as_str()
            .and_then(parse_date_like)
            .map(FieldValue::DateTime),
    }
}

/// Whether a value participates in inference at all.
fn is_observable(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        _ => true,
    }
}

/// JSON booleans and the literal strings "true"/"false".
///
/// "0"/"1" deliberately do not count: integer flag columns would otherwise
/// misclassify.
fn is_boolean_like(value: &Value) -> bool {
    match value {
        Value::Bool(_) => true,
        Value::String(s) => matches!(s.trim().to_lowercase().as_str(), "true" | "false"),
        _ => false,
    }
}

fn numeric_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Parse the accepted date shapes, validated by a real parse rather than a
/// pattern match: ISO-8601 timestamps, `YYYY-MM-DD`, `MM/DD/YYYY`, and
/// `DD.MM.YYYY`.
fn parse_date_like(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S") {
        return Some(naive.and_utc());
    }
    for format in ["%Y-%m-%d", "%m/%d/%Y", "%d.%m.%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
        }
    }
    None
}

fn display_len(value: &Value) -> usize {
    match value {
        Value::String(s) => s.chars().count(),
        other => other.to_string().chars().count(),
    }
}

/// Well-known semantic field names that override the vote.
fn name_heuristic(field_name: &str) -> Option<InferredType> {
    let name = field_name.to_lowercase();
    if name.contains("email") || name.contains("mail") {
        return Some(InferredType::text(255));
    }
    if name.contains("phone") || name.contains("tel") {
        return Some(InferredType::text(50));
    }
    if name.contains("url") || name.contains("link") {
        return Some(InferredType::text(500));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn infer(name: &str, values: &[Value]) -> Option<InferredType> {
        let refs: Vec<&Value> = values.iter().collect();
        infer_field(name, &refs)
    }

    #[test]
    fn test_integer_vote() {
        let inferred = infer("employee_number", &[json!("42"), json!("17"), json!("103")]);
        assert_eq!(inferred.unwrap().data_type, DataType::Integer);
    }

    #[test]
    fn test_real_when_any_fractional() {
        let inferred = infer("score", &[json!("3.5"), json!("2")]);
        assert_eq!(inferred.unwrap().data_type, DataType::Real);
    }

    #[test]
    fn test_boolean_vote() {
        let inferred = infer("remote", &[json!("true"), json!("false")]);
        assert_eq!(inferred.unwrap().data_type, DataType::Boolean);

        // Native JSON booleans count too.
        let inferred = infer("remote", &[json!(true), json!(false), json!(true)]);
        assert_eq!(inferred.unwrap().data_type, DataType::Boolean);
    }

    #[test]
    fn test_numeric_flags_are_not_boolean() {
        let inferred = infer("flag", &[json!("0"), json!("1"), json!("1")]);
        assert_eq!(inferred.unwrap().data_type, DataType::Integer);
    }

    #[test]
    fn test_datetime_vote_all_formats() {
        let inferred = infer("hired", &[json!("2024-01-05"), json!("2024-02-10")]);
        assert_eq!(inferred.unwrap().data_type, DataType::DateTime);

        let inferred = infer("d", &[json!("01/15/2024"), json!("12/31/2023")]);
        assert_eq!(inferred.unwrap().data_type, DataType::DateTime);

        let inferred = infer("d", &[json!("15.01.2024")]);
        assert_eq!(inferred.unwrap().data_type, DataType::DateTime);

        let inferred = infer("d", &[json!("2024-01-05T10:30:00Z")]);
        assert_eq!(inferred.unwrap().data_type, DataType::DateTime);
    }

    #[test]
    fn test_date_is_validated_not_pattern_matched() {
        // Shaped like a date but not a real one.
        let inferred = infer("d", &[json!("2024-13-45"), json!("2024-99-99")]);
        assert_eq!(inferred.unwrap().data_type, DataType::Text);
    }

    #[test]
    fn test_text_fallback_with_padded_length() {
        let inferred = infer("nickname", &[json!("Alice"), json!("Bob")]).unwrap();
        assert_eq!(inferred.data_type, DataType::Text);
        // Longest is 5 chars; padded length stays at the 50 floor.
        assert_eq!(inferred.max_length, Some(50));

        let long = "x".repeat(200);
        let inferred = infer("bio", &[json!(long)]).unwrap();
        assert_eq!(inferred.max_length, Some(240));

        let very_long = "x".repeat(2000);
        let inferred = infer("bio", &[json!(very_long)]).unwrap();
        assert_eq!(inferred.max_length, Some(1000));
    }

    #[test]
    fn test_all_null_is_not_inferable() {
        assert!(infer("ghost", &[json!(null), json!(""), json!("   ")]).is_none());
        assert!(infer("ghost", &[]).is_none());
    }

    #[test]
    fn test_name_heuristics_override_vote() {
        // Values vote integer, but the name forces text 50.
        let inferred = infer("phone_number", &[json!("5551234"), json!("5559876")]).unwrap();
        assert_eq!(inferred.data_type, DataType::Text);
        assert_eq!(inferred.max_length, Some(50));

        let inferred = infer("secondaryEmail", &[json!("a@x.com")]).unwrap();
        assert_eq!(inferred.max_length, Some(255));

        let inferred = infer("profile_url", &[json!("https://x.com/a")]).unwrap();
        assert_eq!(inferred.max_length, Some(500));
    }

    #[test]
    fn test_mixed_values_below_threshold_fall_back_to_text() {
        // 2 of 5 numeric = 40%, below the 80% bar.
        let inferred = infer(
            "notes",
            &[json!("42"), json!("17"), json!("hello"), json!("world"), json!("there")],
        )
        .unwrap();
        assert_eq!(inferred.data_type, DataType::Text);
    }

    #[test]
    fn test_coercion() {
        assert_eq!(
            coerce_value(&json!("42"), DataType::Integer),
            Some(FieldValue::Integer(42))
        );
        assert_eq!(
            coerce_value(&json!(41), DataType::Text),
            Some(FieldValue::Text("41".to_string()))
        );
        assert_eq!(
            coerce_value(&json!("true"), DataType::Boolean),
            Some(FieldValue::Boolean(true))
        );
        assert_eq!(coerce_value(&json!("not a number"), DataType::Integer), None);
        assert_eq!(coerce_value(&json!(null), DataType::Text), None);

        let coerced = coerce_value(&json!("2024-01-05"), DataType::DateTime).unwrap();
        match coerced {
            FieldValue::DateTime(dt) => assert_eq!(dt.to_rfc3339(), "2024-01-05T00:00:00+00:00"),
            other => panic!("expected datetime, got {other:?}"),
        }
    }
}
