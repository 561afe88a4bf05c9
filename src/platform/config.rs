// logscope - platform/config.rs
//
// Platform directory resolution and config.toml loading with startup
// validation.
//
// Uses the `directories` crate for XDG (Linux), AppData (Windows),
// Library (macOS) compliance.

use crate::core::model::{DateFormat, Encoding, FileOptions, JsonOptions, LineFormat, TextOptions};
use crate::util::constants;
use crate::util::error::ConfigError;
use directories::ProjectDirs;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Resolved platform paths for logscope configuration and caches.
#[derive(Debug, Clone)]
pub struct PlatformPaths {
    /// Configuration directory (e.g. ~/.config/logscope/ or %APPDATA%\logscope\config\)
    pub config_dir: PathBuf,

    /// Data directory.
    pub data_dir: PathBuf,

    /// Cached line indexes (e.g. ~/.cache/logscope/indexes/).
    pub index_cache_dir: PathBuf,
}

impl PlatformPaths {
    /// Resolve platform-appropriate paths.
    ///
    /// Falls back to current directory if platform dirs cannot be determined.
    pub fn resolve() -> Self {
        if let Some(proj_dirs) = ProjectDirs::from("", "", constants::APP_ID) {
            let config_dir = proj_dirs.config_dir().to_path_buf();
            let data_dir = proj_dirs.data_dir().to_path_buf();
            let index_cache_dir = proj_dirs
                .cache_dir()
                .join(constants::INDEX_CACHE_DIR_NAME);

            tracing::debug!(
                config = %config_dir.display(),
                data = %data_dir.display(),
                indexes = %index_cache_dir.display(),
                "Platform paths resolved"
            );

            Self {
                config_dir,
                data_dir,
                index_cache_dir,
            }
        } else {
            tracing::warn!("Could not determine platform directories, using current directory");
            let fallback = PathBuf::from(".");
            Self {
                config_dir: fallback.clone(),
                index_cache_dir: fallback.join(constants::INDEX_CACHE_DIR_NAME),
                data_dir: fallback,
            }
        }
    }

    /// Location of `config.toml`.
    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join(constants::CONFIG_FILE_NAME)
    }
}

// =============================================================================
// config.toml loading and validation
// =============================================================================

/// Raw deserialisable shape of config.toml.
///
/// Unknown keys are silently ignored so a newer config file still loads.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct RawConfig {
    /// `[engine]` section.
    pub engine: EngineSection,
    /// `[parsing]` section.
    pub parsing: ParsingSection,
    /// `[logging]` section.
    pub logging: LoggingSection,
}

/// `[engine]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct EngineSection {
    /// "utf-8" or "latin1".
    pub encoding: Option<String>,
    /// Read chunk size in bytes.
    pub chunk_size_bytes: Option<usize>,
    /// Checkpoints recorded per full scan.
    pub num_checkpoints: Option<usize>,
    /// Histogram buckets.
    pub histogram_buckets: Option<usize>,
    /// Lines per open/view/search window.
    pub window_lines: Option<usize>,
    /// Persist line indexes between runs.
    pub index_cache: Option<bool>,
}

/// `[parsing]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct ParsingSection {
    /// "plain", "text" or "json".
    pub format: Option<String>,
    /// Regex locating the timestamp in text lines.
    pub timestamp_pattern: Option<String>,
    /// Extract `key=value` tokens from text lines.
    pub extract_key_value: Option<bool>,
    /// "ISO", "RFC822", "Unix", "Millis" or a token pattern.
    pub date_format: Option<String>,
    /// JSON message key.
    pub message_field: Option<String>,
    /// JSON timestamp key.
    pub timestamp_field: Option<String>,
}

/// `[logging]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub level: Option<String>,
    /// Log file path (empty = stderr only).
    pub file: Option<String>,
}

/// Which line parser to configure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FormatKind {
    #[default]
    Plain,
    Text,
    Json,
}

impl FromStr for FormatKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "plain" => Ok(Self::Plain),
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!(
                "unknown format '{other}' (expected plain, text or json)"
            )),
        }
    }
}

impl fmt::Display for FormatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Plain => "plain",
            Self::Text => "text",
            Self::Json => "json",
        })
    }
}

/// Validated application configuration derived from `config.toml`.
///
/// All values are validated against named constants at load time.
/// Invalid values produce actionable warnings and fall back to defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    // -- Engine --
    pub encoding: Encoding,
    pub chunk_size: usize,
    pub num_checkpoints: usize,
    pub histogram_buckets: usize,
    pub window_lines: usize,
    pub index_cache: bool,

    // -- Parsing --
    pub format: FormatKind,
    pub timestamp_pattern: Option<String>,
    pub extract_key_value: bool,
    pub date_format: DateFormat,
    pub message_field: Option<String>,
    pub timestamp_field: Option<String>,

    // -- Logging --
    /// Logging level string (for init before tracing is available).
    pub log_level: Option<String>,
    /// Log file path.
    pub log_file: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            encoding: Encoding::Utf8,
            chunk_size: constants::DEFAULT_CHUNK_SIZE,
            num_checkpoints: constants::DEFAULT_NUM_CHECKPOINTS,
            histogram_buckets: constants::DEFAULT_HISTOGRAM_BUCKETS,
            window_lines: constants::DEFAULT_WINDOW_LINES,
            index_cache: true,
            format: FormatKind::Plain,
            timestamp_pattern: None,
            extract_key_value: false,
            date_format: DateFormat::Iso,
            message_field: None,
            timestamp_field: None,
            log_level: None,
            log_file: None,
        }
    }
}

impl AppConfig {
    /// Engine options described by this configuration.
    pub fn file_options(&self) -> FileOptions {
        let format = match self.format {
            FormatKind::Plain => LineFormat::Plain,
            FormatKind::Text => LineFormat::Text(TextOptions {
                extract_key_value: self.extract_key_value,
                timestamp_pattern: self.timestamp_pattern.clone(),
            }),
            FormatKind::Json => LineFormat::Json(JsonOptions {
                message: self.message_field.clone(),
                timestamp: self.timestamp_field.clone(),
                fields: Vec::new(),
            }),
        };
        FileOptions {
            encoding: self.encoding,
            chunk_size: self.chunk_size,
            num_checkpoints: self.num_checkpoints,
            format,
            date_format: self.date_format.clone(),
        }
    }
}

/// Load and validate `config.toml` from the given config directory.
///
/// Returns `AppConfig` with validated values and a list of non-fatal warnings.
/// If the file does not exist, returns defaults with no warnings (first-run).
/// A file that cannot be read or parsed also yields defaults, with the
/// problem reported as a warning.
pub fn load_config(config_dir: &Path) -> (AppConfig, Vec<String>) {
    let config_path = config_dir.join(constants::CONFIG_FILE_NAME);

    if !config_path.exists() {
        tracing::debug!(path = %config_path.display(), "No config.toml found; using defaults");
        return (AppConfig::default(), Vec::new());
    }

    match load_config_file(&config_path) {
        Ok(loaded) => loaded,
        Err(e) => {
            let msg = format!("{e}. Using defaults.");
            tracing::warn!("{}", msg);
            (AppConfig::default(), vec![msg])
        }
    }
}

/// Load and validate an explicitly named config file.
///
/// Unlike [`load_config`], a missing or malformed file is an error; bad
/// individual values are still only warnings.
pub fn load_config_file(config_path: &Path) -> Result<(AppConfig, Vec<String>), ConfigError> {
    let content = std::fs::read_to_string(config_path).map_err(|e| ConfigError::Io {
        path: config_path.to_path_buf(),
        source: e,
    })?;

    let raw: RawConfig = toml::from_str(&content).map_err(|e| ConfigError::TomlParse {
        path: config_path.to_path_buf(),
        source: e,
    })?;

    tracing::info!(path = %config_path.display(), "Loaded config.toml");

    let (config, warnings) = validate(raw);
    if !warnings.is_empty() {
        tracing::warn!(
            count = warnings.len(),
            "Config validation produced warnings"
        );
    }
    Ok((config, warnings))
}

/// Warning text for a rejected value.
fn rejected(field: &str, value: impl fmt::Display, expected: String, default: impl fmt::Display) -> String {
    let error = ConfigError::ValueOutOfRange {
        field: field.to_string(),
        value: value.to_string(),
        expected,
    };
    format!("{error}. Using default ({default}).")
}

/// Accept `value` when it lies in `min..=max`, else record a warning.
fn check_range(
    field: &str,
    value: Option<usize>,
    (min, max): (usize, usize),
    target: &mut usize,
    warnings: &mut Vec<String>,
) {
    let Some(value) = value else { return };
    if (min..=max).contains(&value) {
        *target = value;
    } else {
        warnings.push(rejected(field, value, format!("{min}-{max}"), *target));
    }
}

/// Validate each field against named constants, accumulating all problems.
fn validate(raw: RawConfig) -> (AppConfig, Vec<String>) {
    let mut config = AppConfig::default();
    let mut warnings = Vec::new();

    // -- Engine --
    if let Some(ref encoding) = raw.engine.encoding {
        match encoding.parse::<Encoding>() {
            Ok(e) => config.encoding = e,
            Err(_) => warnings.push(rejected(
                "[engine] encoding",
                encoding,
                "\"utf-8\" or \"latin1\"".to_string(),
                "utf-8",
            )),
        }
    }
    check_range(
        "[engine] chunk_size_bytes",
        raw.engine.chunk_size_bytes,
        (constants::MIN_CHUNK_SIZE, constants::MAX_CHUNK_SIZE),
        &mut config.chunk_size,
        &mut warnings,
    );
    check_range(
        "[engine] num_checkpoints",
        raw.engine.num_checkpoints,
        (constants::MIN_NUM_CHECKPOINTS, constants::MAX_NUM_CHECKPOINTS),
        &mut config.num_checkpoints,
        &mut warnings,
    );
    check_range(
        "[engine] histogram_buckets",
        raw.engine.histogram_buckets,
        (1, constants::MAX_HISTOGRAM_BUCKETS),
        &mut config.histogram_buckets,
        &mut warnings,
    );
    check_range(
        "[engine] window_lines",
        raw.engine.window_lines,
        (1, constants::MAX_WINDOW_LINES),
        &mut config.window_lines,
        &mut warnings,
    );
    if let Some(enabled) = raw.engine.index_cache {
        config.index_cache = enabled;
    }

    // -- Parsing --
    if let Some(ref format) = raw.parsing.format {
        match format.parse::<FormatKind>() {
            Ok(kind) => config.format = kind,
            Err(_) => warnings.push(rejected(
                "[parsing] format",
                format,
                "\"plain\", \"text\" or \"json\"".to_string(),
                FormatKind::Plain,
            )),
        }
    }

    if let Some(pattern) = raw.parsing.timestamp_pattern.filter(|p| !p.is_empty()) {
        if pattern.len() > constants::MAX_REGEX_PATTERN_LENGTH {
            warnings.push(rejected(
                "[parsing] timestamp_pattern",
                format!("<{} bytes>", pattern.len()),
                format!("at most {} bytes", constants::MAX_REGEX_PATTERN_LENGTH),
                "none",
            ));
        } else if let Err(e) = regex::Regex::new(&pattern) {
            warnings.push(rejected(
                "[parsing] timestamp_pattern",
                &pattern,
                format!("a valid regex ({e})"),
                "none",
            ));
        } else {
            config.timestamp_pattern = Some(pattern);
        }
    }

    if let Some(extract) = raw.parsing.extract_key_value {
        config.extract_key_value = extract;
    }

    if let Some(ref date_format) = raw.parsing.date_format {
        match date_format.parse::<DateFormat>() {
            Ok(f) => config.date_format = f,
            Err(e) => warnings.push(rejected(
                "[parsing] date_format",
                date_format,
                e,
                DateFormat::Iso,
            )),
        }
    }

    config.message_field = raw.parsing.message_field.filter(|f| !f.is_empty());
    config.timestamp_field = raw.parsing.timestamp_field.filter(|f| !f.is_empty());

    // -- Logging: level --
    if let Some(ref level) = raw.logging.level {
        let valid = ["error", "warn", "info", "debug", "trace"];
        if valid.contains(&level.to_lowercase().as_str()) {
            config.log_level = Some(level.to_lowercase());
        } else {
            warnings.push(rejected(
                "[logging] level",
                level,
                "one of error, warn, info, debug, trace".to_string(),
                constants::DEFAULT_LOG_LEVEL,
            ));
        }
    }

    // -- Logging: file --
    config.log_file = raw.logging.file.filter(|f| !f.is_empty());

    (config, warnings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_config(dir: &TempDir, content: &str) -> PathBuf {
        let path = dir.path().join(constants::CONFIG_FILE_NAME);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_missing_file_gives_defaults_without_warnings() {
        let dir = TempDir::new().unwrap();
        let (config, warnings) = load_config(dir.path());
        assert_eq!(config, AppConfig::default());
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_valid_values_are_applied() {
        let dir = TempDir::new().unwrap();
        write_config(
            &dir,
            r#"
[engine]
encoding = "latin1"
chunk_size_bytes = 4096
num_checkpoints = 50
histogram_buckets = 20
window_lines = 40
index_cache = false

[parsing]
format = "json"
date_format = "Millis"
message_field = "msg"
timestamp_field = "ts"

[logging]
level = "DEBUG"
file = "/tmp/logscope.log"
"#,
        );
        let (config, warnings) = load_config(dir.path());
        assert!(warnings.is_empty(), "{warnings:?}");
        assert_eq!(config.encoding, Encoding::Latin1);
        assert_eq!(config.chunk_size, 4096);
        assert_eq!(config.num_checkpoints, 50);
        assert_eq!(config.histogram_buckets, 20);
        assert_eq!(config.window_lines, 40);
        assert!(!config.index_cache);
        assert_eq!(config.date_format, DateFormat::Millis);
        assert_eq!(config.log_level.as_deref(), Some("debug"));
        assert_eq!(config.log_file.as_deref(), Some("/tmp/logscope.log"));

        let options = config.file_options();
        assert_eq!(options.chunk_size, 4096);
        assert_eq!(
            options.format,
            LineFormat::Json(JsonOptions {
                message: Some("msg".into()),
                timestamp: Some("ts".into()),
                fields: Vec::new(),
            })
        );
    }

    #[test]
    fn test_out_of_range_values_warn_and_keep_defaults() {
        let dir = TempDir::new().unwrap();
        write_config(
            &dir,
            r#"
[engine]
encoding = "ebcdic"
chunk_size_bytes = 0
num_checkpoints = 1000000000

[parsing]
format = "xml"
timestamp_pattern = "(["

[logging]
level = "loud"
"#,
        );
        let (config, warnings) = load_config(dir.path());
        assert_eq!(warnings.len(), 6, "{warnings:#?}");
        assert!(warnings.iter().any(|w| w.contains("chunk_size_bytes")));
        assert!(warnings.iter().all(|w| w.contains("Using default")));
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_text_format_carries_pattern_and_kv() {
        let dir = TempDir::new().unwrap();
        write_config(
            &dir,
            r#"
[parsing]
format = "text"
timestamp_pattern = "^\\S+"
extract_key_value = true
date_format = "yyyy-MM-dd HH:mm:ss"
"#,
        );
        let (config, warnings) = load_config(dir.path());
        assert!(warnings.is_empty(), "{warnings:?}");
        let options = config.file_options();
        assert_eq!(
            options.format,
            LineFormat::Text(TextOptions {
                extract_key_value: true,
                timestamp_pattern: Some("^\\S+".into()),
            })
        );
        assert_eq!(
            options.date_format,
            DateFormat::Custom("yyyy-MM-dd HH:mm:ss".into())
        );
    }

    #[test]
    fn test_malformed_file_is_a_warning_for_default_location() {
        let dir = TempDir::new().unwrap();
        write_config(&dir, "this is [not toml");
        let (config, warnings) = load_config(dir.path());
        assert_eq!(config, AppConfig::default());
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn test_explicit_file_errors_are_fatal() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(matches!(
            load_config_file(&missing),
            Err(ConfigError::Io { .. })
        ));
        let bad = write_config(&dir, "[engine\nchunk_size_bytes = 1");
        assert!(matches!(
            load_config_file(&bad),
            Err(ConfigError::TomlParse { .. })
        ));
    }

    #[test]
    fn test_unknown_keys_are_ignored() {
        let dir = TempDir::new().unwrap();
        write_config(&dir, "[engine]\nturbo = true\n[future]\nx = 1\n");
        let (_, warnings) = load_config(dir.path());
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_format_kind_parses_case_insensitively() {
        assert_eq!("JSON".parse::<FormatKind>(), Ok(FormatKind::Json));
        assert!("csv".parse::<FormatKind>().is_err());
    }
}
