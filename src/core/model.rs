// logscope - core/model.rs
//
// Core data model types shared by the scanner, loaders and the search
// engine. Pure data definitions plus the options bag every entry point
// accepts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// =============================================================================
// Lines
// =============================================================================

/// One non-empty, right-trimmed line as produced by the scanner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawLine {
    /// Decoded line text with trailing whitespace removed.
    pub text: String,

    /// Offset of the line's first byte in the file.
    pub byte_offset: u64,

    /// Zero-based count of non-empty lines, continuing from the ordinal of
    /// the position the scan started at.
    pub line_ordinal: u64,
}

impl RawLine {
    /// Where a scan would have to start to produce this line first.
    pub fn position(&self) -> Position {
        Position {
            line_ordinal: self.line_ordinal,
            byte_offset: self.byte_offset,
        }
    }
}

/// Per-line diagnostics passed alongside each scanned line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LineFlags {
    /// The line's bytes spanned at least one whole read chunk.
    /// Informational only; the line text is always complete.
    pub truncated: bool,
}

/// A raw line plus the fields a parser derived from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedLine {
    /// The scanned line, embedded by value.
    #[serde(flatten)]
    pub raw: RawLine,

    /// Text to display for this line.
    pub message: String,

    /// Timestamp text extracted by the parser, unparsed.
    pub timestamp: Option<String>,

    /// Additional decoded fields (JSON keys or `key=value` tokens).
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub fields: serde_json::Map<String, serde_json::Value>,

    /// Absolute match ordinal for search results and merged marks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_ordinal: Option<u64>,
}

impl ParsedLine {
    /// A line whose message is its raw text, with no fields or timestamp.
    pub fn plain(raw: RawLine) -> Self {
        Self {
            message: raw.text.clone(),
            raw,
            timestamp: None,
            fields: serde_json::Map::new(),
            match_ordinal: None,
        }
    }

    pub fn line_ordinal(&self) -> u64 {
        self.raw.line_ordinal
    }
}

/// A resumable scan position: the ordinal the line at `byte_offset` gets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub line_ordinal: u64,
    pub byte_offset: u64,
}

// =============================================================================
// Cancellation and progress
// =============================================================================

/// Returned by every line and progress callback to continue or stop a scan.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanControl {
    Continue,
    Stop,
}

impl ScanControl {
    pub fn is_stop(self) -> bool {
        self == ScanControl::Stop
    }
}

/// A throttled progress notification.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    /// Completion estimate in the range 0.0-100.0.
    pub percent: f64,

    /// Lines (open) or matches (search scan) counted so far; lines collected
    /// for buffer loads.
    pub count: u64,
}

// =============================================================================
// Search filter
// =============================================================================

/// A user search: a regular expression and its case sensitivity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FilterSpec {
    pub pattern: String,
    pub case_sensitive: bool,
}

impl FilterSpec {
    pub fn new(pattern: impl Into<String>, case_sensitive: bool) -> Self {
        Self {
            pattern: pattern.into(),
            case_sensitive,
        }
    }
}

// =============================================================================
// Histogram
// =============================================================================

/// One equal-duration slice of a file's time span.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramBucket {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,

    /// Interpolated number of lines whose timestamps fall in this slice.
    pub approximate_line_count: f64,
}

// =============================================================================
// Options bag
// =============================================================================

/// Text encoding used to decode complete lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Encoding {
    /// UTF-8; invalid sequences become U+FFFD.
    #[default]
    #[serde(rename = "utf-8", alias = "utf8")]
    Utf8,

    /// ISO-8859-1: every byte maps to the code point of the same value.
    #[serde(rename = "latin1", alias = "iso-8859-1")]
    Latin1,
}

impl Encoding {
    /// Decode the bytes of one complete line.
    pub fn decode(self, bytes: &[u8]) -> String {
        match self {
            Encoding::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
            Encoding::Latin1 => bytes.iter().map(|&b| b as char).collect(),
        }
    }
}

impl FromStr for Encoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "utf-8" | "utf8" => Ok(Encoding::Utf8),
            "latin1" | "iso-8859-1" => Ok(Encoding::Latin1),
            other => Err(format!(
                "unknown encoding '{other}' (expected utf-8 or latin1)"
            )),
        }
    }
}

/// How timestamps extracted from lines are interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DateFormat {
    /// RFC 3339 / ISO-8601.
    #[default]
    Iso,
    /// RFC 822 / RFC 2822.
    Rfc822,
    /// Unix epoch seconds.
    Unix,
    /// Unix epoch milliseconds.
    Millis,
    /// A token pattern such as `yyyy-MM-dd HH:mm:ss,SSS`.
    Custom(String),
}

impl From<String> for DateFormat {
    fn from(s: String) -> Self {
        match s.as_str() {
            "ISO" => DateFormat::Iso,
            "RFC822" => DateFormat::Rfc822,
            "Unix" => DateFormat::Unix,
            "Millis" => DateFormat::Millis,
            _ => DateFormat::Custom(s),
        }
    }
}

impl From<DateFormat> for String {
    fn from(f: DateFormat) -> Self {
        f.to_string()
    }
}

impl FromStr for DateFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Err("date format must not be empty".to_string());
        }
        Ok(DateFormat::from(s.to_string()))
    }
}

impl fmt::Display for DateFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DateFormat::Iso => f.write_str("ISO"),
            DateFormat::Rfc822 => f.write_str("RFC822"),
            DateFormat::Unix => f.write_str("Unix"),
            DateFormat::Millis => f.write_str("Millis"),
            DateFormat::Custom(pattern) => f.write_str(pattern),
        }
    }
}

/// Options for plain-text lines.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextOptions {
    /// Copy `key=value` tokens into the field map.
    pub extract_key_value: bool,

    /// Regex locating a candidate timestamp, usually anchored at `^`.
    pub timestamp_pattern: Option<String>,
}

/// Options for JSON-per-line files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JsonOptions {
    /// Key holding the display message.
    pub message: Option<String>,

    /// Key holding the timestamp.
    pub timestamp: Option<String>,

    /// Keys observed during format detection, in first-seen order.
    pub fields: Vec<String>,
}

/// How each line is turned into a [`ParsedLine`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "lowercase")]
pub enum LineFormat {
    /// No parsing: the message is the raw text.
    #[default]
    Plain,
    Text(TextOptions),
    Json(JsonOptions),
}

/// The options bag accepted by every engine entry point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileOptions {
    pub encoding: Encoding,
    pub chunk_size: usize,
    pub num_checkpoints: usize,
    pub format: LineFormat,
    pub date_format: DateFormat,
}

impl Default for FileOptions {
    fn default() -> Self {
        use crate::util::constants;
        Self {
            encoding: Encoding::Utf8,
            chunk_size: constants::DEFAULT_CHUNK_SIZE,
            num_checkpoints: constants::DEFAULT_NUM_CHECKPOINTS,
            format: LineFormat::Plain,
            date_format: DateFormat::Iso,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latin1_decodes_every_byte() {
        let text = Encoding::Latin1.decode(&[b'c', 0xE9, b'!']);
        assert_eq!(text, "cé!");
    }

    #[test]
    fn test_utf8_decode_is_lossy() {
        let text = Encoding::Utf8.decode(&[b'a', 0xFF, b'b']);
        assert_eq!(text, "a\u{FFFD}b");
    }

    #[test]
    fn test_date_format_names() {
        assert_eq!(DateFormat::from("ISO".to_string()), DateFormat::Iso);
        assert_eq!(DateFormat::from("Millis".to_string()), DateFormat::Millis);
        assert_eq!(
            DateFormat::from("yyyy-MM-dd".to_string()),
            DateFormat::Custom("yyyy-MM-dd".to_string())
        );
        assert_eq!(DateFormat::Rfc822.to_string(), "RFC822");
    }

    #[test]
    fn test_encoding_from_str() {
        assert_eq!("UTF8".parse::<Encoding>().unwrap(), Encoding::Utf8);
        assert_eq!("latin1".parse::<Encoding>().unwrap(), Encoding::Latin1);
        assert!("ebcdic".parse::<Encoding>().is_err());
    }

    #[test]
    fn test_parsed_line_serialises_flat() {
        let line = ParsedLine::plain(RawLine {
            text: "hello".to_string(),
            byte_offset: 7,
            line_ordinal: 2,
        });
        let json = serde_json::to_value(&line).unwrap();
        assert_eq!(json["text"], "hello");
        assert_eq!(json["byte_offset"], 7);
        assert_eq!(json["message"], "hello");
        assert!(json.get("match_ordinal").is_none());
    }
}
