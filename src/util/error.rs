// logscope - util/error.rs
//
// Typed error hierarchy with context-preserving error chains.
// Only conditions that must reach the caller live here. Malformed filters
// and unparseable lines are recovered where they occur and never surface.

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Top-level error type for all logscope operations.
#[derive(Debug)]
pub enum LogScopeError {
    /// I/O error with path context. Fatal to the in-flight request.
    Io {
        path: PathBuf,
        operation: &'static str,
        source: io::Error,
    },

    /// The operation needs state that an earlier call has not produced.
    Precondition(PreconditionError),

    /// An externally supplied checkpoint list is not usable.
    Index(IndexError),

    /// Configuration loading or validation failed.
    Config(ConfigError),
}

impl LogScopeError {
    /// Wrap an `io::Error` with the path and the operation that failed.
    pub fn io(path: impl Into<PathBuf>, operation: &'static str, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            operation,
            source,
        }
    }
}

impl fmt::Display for LogScopeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io {
                path,
                operation,
                source,
            } => write!(
                f,
                "I/O error during {operation} on '{}': {source}",
                path.display()
            ),
            Self::Precondition(e) => write!(f, "Precondition failed: {e}"),
            Self::Index(e) => write!(f, "Index error: {e}"),
            Self::Config(e) => write!(f, "Configuration error: {e}"),
        }
    }
}

impl std::error::Error for LogScopeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Precondition(e) => Some(e),
            Self::Index(e) => Some(e),
            Self::Config(e) => Some(e),
        }
    }
}

// ---------------------------------------------------------------------------
// Precondition errors
// ---------------------------------------------------------------------------

/// Errors raised when a request arrives before the state it depends on.
#[derive(Debug)]
pub enum PreconditionError {
    /// A buffer or histogram was requested before the initial full scan
    /// (and its checkpoint index) completed.
    NotOpened { path: PathBuf },
}

impl fmt::Display for PreconditionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotOpened { path } => write!(
                f,
                "'{}' has not been fully scanned yet; open it before loading buffers",
                path.display()
            ),
        }
    }
}

impl std::error::Error for PreconditionError {}

impl From<PreconditionError> for LogScopeError {
    fn from(e: PreconditionError) -> Self {
        Self::Precondition(e)
    }
}

// ---------------------------------------------------------------------------
// Index errors
// ---------------------------------------------------------------------------

/// Errors validating a checkpoint list handed in from outside the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexError {
    /// Checkpoint at `position` does not strictly follow its predecessor in
    /// both ordinal and byte offset.
    NotIncreasing { position: usize },
}

impl fmt::Display for IndexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotIncreasing { position } => write!(
                f,
                "checkpoint {position} does not strictly increase in ordinal and offset"
            ),
        }
    }
}

impl std::error::Error for IndexError {}

impl From<IndexError> for LogScopeError {
    fn from(e: IndexError) -> Self {
        Self::Index(e)
    }
}

// ---------------------------------------------------------------------------
// Filter errors
// ---------------------------------------------------------------------------

/// Errors compiling a user-supplied search filter.
///
/// The engine never propagates these: a filter that fails to compile
/// matches nothing. They exist so front ends can explain why.
#[derive(Debug)]
pub enum FilterError {
    /// User-provided regex is invalid.
    InvalidRegex {
        pattern: String,
        source: regex::Error,
    },
}

impl fmt::Display for FilterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidRegex { pattern, source } => {
                write!(f, "Invalid filter regex '{pattern}': {source}")
            }
        }
    }
}

impl std::error::Error for FilterError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidRegex { source, .. } => Some(source),
        }
    }
}

// ---------------------------------------------------------------------------
// Config errors
// ---------------------------------------------------------------------------

/// Errors related to configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    /// TOML parsing failed.
    TomlParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// A config value is out of the allowed range.
    ValueOutOfRange {
        field: String,
        value: String,
        expected: String,
    },

    /// I/O error reading config file.
    Io { path: PathBuf, source: io::Error },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TomlParse { path, source } => {
                write!(f, "Config parse error '{}': {source}", path.display())
            }
            Self::ValueOutOfRange {
                field,
                value,
                expected,
            } => write!(
                f,
                "Config '{field}' = '{value}' is out of range. Expected: {expected}"
            ),
            Self::Io { path, source } => {
                write!(f, "Config I/O error '{}': {source}", path.display())
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::TomlParse { source, .. } => Some(source),
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<ConfigError> for LogScopeError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

/// Convenience type alias for logscope results.
pub type Result<T> = std::result::Result<T, LogScopeError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_io_error_display_includes_path_and_operation() {
        let err = LogScopeError::io(
            "/var/log/app.log",
            "open",
            io::Error::new(io::ErrorKind::NotFound, "missing"),
        );
        let text = err.to_string();
        assert!(text.contains("open"), "{text}");
        assert!(text.contains("/var/log/app.log"), "{text}");
        assert!(err.source().is_some());
    }

    #[test]
    fn test_precondition_converts_into_top_level() {
        let err: LogScopeError = PreconditionError::NotOpened {
            path: PathBuf::from("big.log"),
        }
        .into();
        assert!(matches!(
            err,
            LogScopeError::Precondition(PreconditionError::NotOpened { .. })
        ));
        assert!(err.to_string().contains("big.log"));
    }
}
