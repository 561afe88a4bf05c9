// logscope - core/date.rs
//
// Timestamp parsing for the configurable date formats. Every function here
// returns `None` on failure; a bad timestamp is never an error.
//
// Custom formats use the token vocabulary users already know from log
// tooling (`yyyy-MM-dd HH:mm:ss,SSS`) and are translated to chrono format
// strings before parsing.

use crate::core::model::DateFormat;
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime, Utc};

/// Parse `text` with `format`, returning `None` on any failure.
pub fn parse_date(text: &str, format: &DateFormat) -> Option<DateTime<Utc>> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    match format {
        DateFormat::Iso => parse_iso(trimmed),
        DateFormat::Rfc822 => DateTime::parse_from_rfc2822(trimmed)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        DateFormat::Unix => parse_epoch(trimmed, 1_000.0),
        DateFormat::Millis => parse_epoch(trimmed, 1.0),
        DateFormat::Custom(pattern) => parse_custom(trimmed, pattern),
    }
}

/// ISO-8601 with or without an offset. Values without an offset are UTC.
fn parse_iso(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%d %H:%M:%S%.f%z"] {
        if let Ok(dt) = DateTime::parse_from_str(s, format) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(s, format) {
            return Some(ndt.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|ndt| ndt.and_utc())
}

/// Epoch value, `millis_per_unit` converting one unit to milliseconds.
fn parse_epoch(s: &str, millis_per_unit: f64) -> Option<DateTime<Utc>> {
    let value: f64 = s.parse().ok()?;
    if !value.is_finite() {
        return None;
    }
    let millis = (value * millis_per_unit).round();
    if millis.abs() > i64::MAX as f64 {
        return None;
    }
    DateTime::from_timestamp_millis(millis as i64)
}

/// Parse with a token pattern.
///
/// Strategy:
///   1. Patterns with an offset token parse as `DateTime` with offset.
///   2. Full `NaiveDateTime` parse, taken as UTC.
///   3. Date-only patterns parse as `NaiveDate` at midnight UTC.
///   4. Year-less patterns (`[MM.dd HH:mm:ss]`) get the current UTC year.
///   5. Time-only patterns are placed on the current UTC date.
fn parse_custom(s: &str, pattern: &str) -> Option<DateTime<Utc>> {
    match pattern {
        "X" => return parse_epoch(s, 1_000.0),
        "x" => return parse_epoch(s, 1.0),
        _ => {}
    }
    let tokens = translate_pattern(pattern)?;

    if tokens.has_offset {
        return DateTime::parse_from_str(s, &tokens.format)
            .ok()
            .map(|dt| dt.with_timezone(&Utc));
    }

    if let Ok(ndt) = NaiveDateTime::parse_from_str(s, &tokens.format) {
        return Some(ndt.and_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, &tokens.format) {
        return date.and_hms_opt(0, 0, 0).map(|ndt| ndt.and_utc());
    }

    let now = Utc::now();
    if tokens.has_date && !tokens.has_year {
        let with_year = format!("{} {s}", now.year());
        let year_format = format!("%Y {}", tokens.format);
        if let Ok(ndt) = NaiveDateTime::parse_from_str(&with_year, &year_format) {
            return Some(ndt.and_utc());
        }
        if let Ok(date) = NaiveDate::parse_from_str(&with_year, &year_format) {
            return date.and_hms_opt(0, 0, 0).map(|ndt| ndt.and_utc());
        }
    }
    if !tokens.has_date && tokens.has_time {
        if let Ok(time) = NaiveTime::parse_from_str(s, &tokens.format) {
            return Some(now.date_naive().and_time(time).and_utc());
        }
    }
    None
}

/// A token pattern translated to chrono syntax.
#[derive(Debug, Default, PartialEq, Eq)]
struct TranslatedPattern {
    format: String,
    has_year: bool,
    has_date: bool,
    has_time: bool,
    has_offset: bool,
}

/// Translate a token pattern to a chrono format string.
///
/// Returns `None` for tokens chrono cannot parse: zone names, and fraction
/// widths other than 3, 6 or 9 that do not follow a `.`.
fn translate_pattern(pattern: &str) -> Option<TranslatedPattern> {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = TranslatedPattern::default();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c == '\'' {
            // Quoted literal; '' inside a literal is an escaped quote.
            i += 1;
            while i < chars.len() {
                if chars[i] == '\'' {
                    if chars.get(i + 1) == Some(&'\'') {
                        out.format.push('\'');
                        i += 2;
                        continue;
                    }
                    break;
                }
                push_literal(&mut out.format, chars[i]);
                i += 1;
            }
            i += 1;
            continue;
        }

        if !c.is_ascii_alphabetic() {
            push_literal(&mut out.format, c);
            i += 1;
            continue;
        }

        let mut run = 1;
        while chars.get(i + run) == Some(&c) {
            run += 1;
        }
        i += run;

        let spec = match (c, run) {
            ('y', 2) => {
                out.has_year = true;
                out.has_date = true;
                "%y"
            }
            ('y', _) => {
                out.has_year = true;
                out.has_date = true;
                "%Y"
            }
            ('M' | 'L', 1 | 2) => {
                out.has_date = true;
                "%m"
            }
            ('M' | 'L', 3) => {
                out.has_date = true;
                "%b"
            }
            ('M' | 'L', _) => {
                out.has_date = true;
                "%B"
            }
            ('d', _) => {
                out.has_date = true;
                "%d"
            }
            ('o', _) => {
                out.has_date = true;
                "%j"
            }
            ('H', _) => {
                out.has_time = true;
                "%H"
            }
            ('h', _) => {
                out.has_time = true;
                "%I"
            }
            ('m', _) => {
                out.has_time = true;
                "%M"
            }
            ('s', _) => {
                out.has_time = true;
                "%S"
            }
            ('S', 3) => "%3f",
            ('S', 6) => "%6f",
            ('S', 9) => "%9f",
            ('S', _) => {
                // Other widths need chrono's dot-prefixed fraction to scale.
                if !out.format.ends_with('.') {
                    return None;
                }
                out.format.pop();
                "%.f"
            }
            ('a', _) => "%p",
            ('E', 3) | ('c', 3) => "%a",
            ('E', _) | ('c', _) => "%A",
            ('Z', 3) => {
                out.has_offset = true;
                "%z"
            }
            ('Z', _) => {
                out.has_offset = true;
                "%:z"
            }
            ('z', _) => return None,
            _ => {
                // Unknown letters are literal text.
                for _ in 0..run {
                    push_literal(&mut out.format, c);
                }
                continue;
            }
        };
        out.format.push_str(spec);
    }
    Some(out)
}

fn push_literal(format: &mut String, c: char) {
    if c == '%' {
        format.push_str("%%");
    } else {
        format.push(c);
    }
}
