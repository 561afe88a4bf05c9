// logscope - core/parser.rs
//
// Turns scanned lines into display records: a message, an optional
// timestamp and a map of extracted fields.
// Parse failures never abort a scan; the line falls back to its raw text.

use crate::core::date::parse_date;
use crate::core::model::{
    DateFormat, FileOptions, JsonOptions, LineFormat, ParsedLine, RawLine, TextOptions,
};
use crate::util::logging::preview;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;

/// `key=value` tokens extracted from plain-text lines.
fn key_value_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"([a-z0-9]+)=([a-z0-9]+)").expect("static regex is valid"))
}

/// A parser compiled once per pass from the options bag.
#[derive(Debug, Clone)]
pub struct LineParser {
    kind: ParserKind,
    date_format: DateFormat,
}

#[derive(Debug, Clone)]
enum ParserKind {
    Plain,
    Text {
        extract_key_value: bool,
        timestamp: Option<Regex>,
    },
    Json(JsonOptions),
}

impl LineParser {
    pub fn new(format: &LineFormat, date_format: &DateFormat) -> Self {
        let kind = match format {
            LineFormat::Plain => ParserKind::Plain,
            LineFormat::Text(options) => ParserKind::Text {
                extract_key_value: options.extract_key_value,
                timestamp: compile_timestamp_pattern(options),
            },
            LineFormat::Json(options) => ParserKind::Json(options.clone()),
        };
        Self {
            kind,
            date_format: date_format.clone(),
        }
    }

    pub fn from_options(options: &FileOptions) -> Self {
        Self::new(&options.format, &options.date_format)
    }

    pub fn parse(&self, raw: RawLine) -> ParsedLine {
        match &self.kind {
            ParserKind::Plain => ParsedLine::plain(raw),
            ParserKind::Text {
                extract_key_value,
                timestamp,
            } => parse_text_with(raw, *extract_key_value, timestamp.as_ref(), &self.date_format),
            ParserKind::Json(options) => parse_json(raw, options),
        }
    }

    /// Interpret the timestamp text of a parsed line with the configured
    /// date format.
    pub fn timestamp_of(&self, line: &ParsedLine) -> Option<DateTime<Utc>> {
        line.timestamp
            .as_deref()
            .and_then(|ts| parse_date(ts, &self.date_format))
    }
}

fn compile_timestamp_pattern(options: &TextOptions) -> Option<Regex> {
    let pattern = options.timestamp_pattern.as_deref()?;
    if pattern.is_empty() {
        return None;
    }
    match Regex::new(pattern) {
        Ok(re) => Some(re),
        Err(e) => {
            tracing::warn!(
                pattern,
                error = %e,
                "Invalid timestamp pattern; timestamps will not be extracted"
            );
            None
        }
    }
}

/// Parse a JSON-per-line record.
///
/// All decoded fields are kept. The message comes from the configured
/// message key and falls back to the raw text when the key is missing or
/// empty. The timestamp comes from the configured timestamp key; absence
/// just means no timestamp. Undecodable lines keep their raw text.
pub fn parse_json(raw: RawLine, options: &JsonOptions) -> ParsedLine {
    let fields = match serde_json::from_str::<Value>(&raw.text) {
        Ok(Value::Object(map)) => map,
        _ => {
            tracing::trace!(
                line = raw.line_ordinal,
                text = preview(&raw.text),
                "Not a JSON object; keeping raw text"
            );
            return ParsedLine::plain(raw);
        }
    };

    let message = options
        .message
        .as_deref()
        .and_then(|key| fields.get(key))
        .and_then(value_text)
        .unwrap_or_else(|| raw.text.clone());
    let timestamp = options
        .timestamp
        .as_deref()
        .and_then(|key| fields.get(key))
        .and_then(value_text);

    ParsedLine {
        raw,
        message,
        timestamp,
        fields,
        match_ordinal: None,
    }
}

/// Text of a JSON value, or `None` for null, false, zero and "".
fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) if n.as_f64() == Some(0.0) => None,
        other => Some(other.to_string()),
    }
}

/// Parse a plain-text line.
///
/// With `extract_key_value`, `key=value` tokens become fields. With a
/// timestamp pattern, the first match is accepted only if it parses with
/// `date_format`; it is then removed from the message. Otherwise the whole
/// line is the message and the candidate is dropped.
pub fn parse_plain_text(raw: RawLine, options: &TextOptions, date_format: &DateFormat) -> ParsedLine {
    let timestamp = compile_timestamp_pattern(options);
    parse_text_with(raw, options.extract_key_value, timestamp.as_ref(), date_format)
}

fn parse_text_with(
    raw: RawLine,
    extract_key_value: bool,
    timestamp_re: Option<&Regex>,
    date_format: &DateFormat,
) -> ParsedLine {
    let mut fields = Map::new();
    if extract_key_value {
        for caps in key_value_re().captures_iter(&raw.text) {
            fields.insert(caps[1].to_string(), Value::String(caps[2].to_string()));
        }
    }

    let candidate = timestamp_re
        .and_then(|re| re.find(&raw.text))
        .filter(|m| parse_date(m.as_str(), date_format).is_some());

    let (message, timestamp) = match candidate {
        Some(m) => {
            let mut message = String::with_capacity(raw.text.len() - m.len());
            message.push_str(&raw.text[..m.start()]);
            message.push_str(&raw.text[m.end()..]);
            let message = message.trim_start().to_string();
            (message, Some(m.as_str().to_string()))
        }
        None => (raw.text.clone(), None),
    };

    ParsedLine {
        raw,
        message,
        timestamp,
        fields,
        match_ordinal: None,
    }
}
