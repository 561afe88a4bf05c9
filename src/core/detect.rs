// logscope - core/detect.rs
//
// Guesses how a file's lines should be parsed from a small sample of its
// first lines.

use crate::core::model::{JsonOptions, LineFormat, TextOptions};
use crate::util::constants::{
    JSON_DETECTION_MAX_FAILURE_PERCENT, MESSAGE_FIELD_CANDIDATES, TIMESTAMP_FIELD_CANDIDATES,
};
use serde::Serialize;
use serde_json::Value;

/// A suggested line format and the evidence behind it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormatSuggestion {
    pub format: LineFormat,

    /// Lines examined.
    pub sampled: usize,

    /// Sample lines that were not valid JSON.
    pub json_failures: usize,
}

/// Suggest JSON when fewer than 40% of `lines` fail to decode as JSON,
/// plain text otherwise.
///
/// For JSON, the message and timestamp keys are the first well-known names
/// present in any sample object, and `fields` lists every key once, in the
/// order it was first seen.
pub fn guess_format<S: AsRef<str>>(lines: &[S]) -> FormatSuggestion {
    let decoded: Vec<Option<Value>> = lines
        .iter()
        .map(|l| serde_json::from_str::<Value>(l.as_ref()).ok())
        .collect();
    let json_failures = decoded.iter().filter(|v| v.is_none()).count();

    let failure_percent = if lines.is_empty() {
        100.0
    } else {
        100.0 * json_failures as f64 / lines.len() as f64
    };

    let format = if failure_percent < JSON_DETECTION_MAX_FAILURE_PERCENT {
        LineFormat::Json(json_options(decoded.iter().flatten()))
    } else {
        LineFormat::Text(TextOptions::default())
    };

    tracing::debug!(
        sampled = lines.len(),
        json_failures,
        format = ?format,
        "Format guessed"
    );

    FormatSuggestion {
        format,
        sampled: lines.len(),
        json_failures,
    }
}

fn json_options<'a>(values: impl Iterator<Item = &'a Value>) -> JsonOptions {
    let mut fields: Vec<String> = Vec::new();
    for object in values.filter_map(Value::as_object) {
        for key in object.keys() {
            if !fields.iter().any(|f| f == key) {
                fields.push(key.clone());
            }
        }
    }

    let pick = |candidates: &[&str]| {
        candidates
            .iter()
            .find(|c| fields.iter().any(|f| f == *c))
            .map(|c| c.to_string())
    };

    JsonOptions {
        message: pick(MESSAGE_FIELD_CANDIDATES),
        timestamp: pick(TIMESTAMP_FIELD_CANDIDATES),
        fields,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn json_fields(suggestion: &FormatSuggestion) -> &JsonOptions {
        match &suggestion.format {
            LineFormat::Json(options) => options,
            other => panic!("expected JSON, got {other:?}"),
        }
    }

    #[test]
    fn test_guesses_json() {
        let lines = [
            r#"{"a":"aaa","b":"bbb1"}"#,
            r#"{"a":"aaa2","b":"bbb2"}"#,
            r#"{"a":"aaa3","b":"bbb3"}"#,
            r#"{"a":"aaa4","b":"bbb4"}"#,
            r#"{"a":"aaa5","b":"bbb4"}"#,
        ];
        let suggestion = guess_format(&lines);
        assert_eq!(json_fields(&suggestion).fields, ["a", "b"]);
        assert_eq!(suggestion.json_failures, 0);
    }

    #[test]
    fn test_guesses_json_despite_noise() {
        let lines = [
            r#"{"a":"aaa","b":"bbb1"}"#,
            r#"{"a":"aaa2","b":"bbb2"}"#,
            r#"{"a":"aaa3","b":"bbb3"}"#,
            "blah",
            r#"{"a":"aaa5","b":"bbb4"}"#,
        ];
        let suggestion = guess_format(&lines);
        assert_eq!(json_fields(&suggestion).fields, ["a", "b"]);
        assert_eq!(suggestion.json_failures, 1);
    }

    #[test]
    fn test_picks_well_known_message_and_timestamp_keys() {
        let lines = [
            r#"{"time":"2024-01-15T10:00:00Z","level":"info","msg":"boot"}"#,
            r#"{"ts":1705312800,"level":"warn","msg":"slow","extra":1}"#,
        ];
        let suggestion = guess_format(&lines);
        let options = json_fields(&suggestion);
        assert_eq!(options.message.as_deref(), Some("msg"));
        assert_eq!(options.timestamp.as_deref(), Some("ts"));
        // Keys are ordered within each object, then by first appearance.
        assert_eq!(options.fields, ["level", "msg", "time", "extra", "ts"]);
    }

    #[test]
    fn test_guesses_text() {
        let suggestion = guess_format(&["aaa", "bbb", "ccc", "dddd"]);
        assert_eq!(suggestion.format, LineFormat::Text(TextOptions::default()));
    }

    #[test]
    fn test_empty_sample_is_text() {
        let suggestion = guess_format::<String>(&[]);
        assert!(matches!(suggestion.format, LineFormat::Text(_)));
        assert_eq!(suggestion.sampled, 0);
    }
}
