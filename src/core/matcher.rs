// logscope - core/matcher.rs
//
// Compiles a search filter into a line predicate.
// A pattern that fails to compile matches nothing: a malformed query turns
// into "no results" instead of an error inside the scan loop.

use crate::core::model::{FilterSpec, RawLine};
use crate::util::error::FilterError;
use regex::{Regex, RegexBuilder};

/// A compiled line predicate for one filter. Built fresh for every pass.
#[derive(Debug, Clone)]
pub struct LineMatcher {
    regex: Option<Regex>,
}

impl LineMatcher {
    /// Compile `filter`. Never fails; see [`LineMatcher::validate`].
    pub fn new(filter: &FilterSpec) -> Self {
        match Self::validate(filter) {
            Ok(regex) => Self { regex: Some(regex) },
            Err(e) => {
                tracing::debug!(error = %e, "Filter does not compile; matching nothing");
                Self { regex: None }
            }
        }
    }

    /// Compile `filter`, reporting why it is malformed.
    pub fn validate(filter: &FilterSpec) -> Result<Regex, FilterError> {
        RegexBuilder::new(&filter.pattern)
            .case_insensitive(!filter.case_sensitive)
            .build()
            .map_err(|e| FilterError::InvalidRegex {
                pattern: filter.pattern.clone(),
                source: e,
            })
    }

    /// Returns false when the filter failed to compile.
    pub fn is_valid(&self) -> bool {
        self.regex.is_some()
    }

    /// Test the raw text of `line`.
    pub fn is_match(&self, line: &RawLine) -> bool {
        self.regex
            .as_ref()
            .is_some_and(|regex| regex.is_match(&line.text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(text: &str) -> RawLine {
        RawLine {
            text: text.to_string(),
            byte_offset: 0,
            line_ordinal: 0,
        }
    }

    #[test]
    fn test_case_sensitive_match() {
        let matcher = LineMatcher::new(&FilterSpec::new("Error", true));
        assert!(matcher.is_match(&raw("Error: disk full")));
        assert!(!matcher.is_match(&raw("error: disk full")));
    }

    #[test]
    fn test_case_insensitive_match() {
        let matcher = LineMatcher::new(&FilterSpec::new("error", false));
        assert!(matcher.is_match(&raw("ERROR: disk full")));
        assert!(matcher.is_match(&raw("an Error occurred")));
        assert!(!matcher.is_match(&raw("all good")));
    }

    #[test]
    fn test_regex_filter() {
        let matcher = LineMatcher::new(&FilterSpec::new(r"code:\s*5\d{2}", true));
        assert!(matcher.is_match(&raw("Error code: 500")));
        assert!(!matcher.is_match(&raw("Error code: 404")));
    }

    #[test]
    fn test_invalid_regex_matches_nothing() {
        let filter = FilterSpec::new("[invalid", true);
        let matcher = LineMatcher::new(&filter);
        assert!(!matcher.is_valid());
        assert!(!matcher.is_match(&raw("[invalid")));
        assert!(!matcher.is_match(&raw("")));
        assert!(matches!(
            LineMatcher::validate(&filter),
            Err(FilterError::InvalidRegex { .. })
        ));
    }
}
