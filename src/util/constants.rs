// logscope - util/constants.rs
//
// Single source of truth for all named constants, limits, and defaults.

// =============================================================================
// Application metadata
// =============================================================================

/// Application display name.
pub const APP_NAME: &str = "logscope";

/// Application identifier used for config/data directories.
pub const APP_ID: &str = "logscope";

/// Current application version.
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

// =============================================================================
// Scanner limits
// =============================================================================

/// Default read chunk size in bytes for streaming file reads.
pub const DEFAULT_CHUNK_SIZE: usize = 500 * 1024; // 500 KiB

/// Smallest accepted chunk size. One byte is slow but still correct.
pub const MIN_CHUNK_SIZE: usize = 1;

/// Largest accepted chunk size (a chunk is allocated up front per scan).
pub const MAX_CHUNK_SIZE: usize = 64 * 1024 * 1024; // 64 MiB

// =============================================================================
// Checkpoint index
// =============================================================================

/// Default number of checkpoints sampled during a full scan.
///
/// Bounds index memory independently of file size: a checkpoint is recorded
/// at most once every `file_size / num_checkpoints` bytes.
pub const DEFAULT_NUM_CHECKPOINTS: usize = 1_000;

/// Minimum user-configurable checkpoint count.
pub const MIN_NUM_CHECKPOINTS: usize = 1;

/// Maximum user-configurable checkpoint count.
pub const MAX_NUM_CHECKPOINTS: usize = 100_000;

// =============================================================================
// Progress throttling
// =============================================================================

/// Full scans (open, search scan) report progress at most once every
/// `file_size / FULL_SCAN_PROGRESS_STEPS` bytes.
pub const FULL_SCAN_PROGRESS_STEPS: f64 = 300.0;

/// Buffer loads report progress at most once every
/// `lines_to_read / BUFFER_PROGRESS_STEPS` lines.
pub const BUFFER_PROGRESS_STEPS: f64 = 200.0;

// =============================================================================
// Windows and histograms
// =============================================================================

/// Default number of lines returned by open, view and search windows.
pub const DEFAULT_WINDOW_LINES: usize = 100;

/// Maximum window a caller may request in one call.
pub const MAX_WINDOW_LINES: usize = 100_000;

/// Default number of histogram buckets.
pub const DEFAULT_HISTOGRAM_BUCKETS: usize = 10;

/// Maximum number of histogram buckets.
pub const MAX_HISTOGRAM_BUCKETS: usize = 1_000;

// =============================================================================
// Format detection
// =============================================================================

/// Number of lines sampled from the start of a file for format detection.
pub const DEFAULT_DETECTION_LINES: usize = 20;

/// A sample is considered JSON when fewer than this percentage of its lines
/// fail to decode.
pub const JSON_DETECTION_MAX_FAILURE_PERCENT: f64 = 40.0;

/// Candidate JSON keys for the display message, in priority order.
pub const MESSAGE_FIELD_CANDIDATES: &[&str] = &["message", "msg", "@message"];

/// Candidate JSON keys for the timestamp, in priority order.
pub const TIMESTAMP_FIELD_CANDIDATES: &[&str] = &["ts", "@timestamp", "timestamp", "time"];

/// Maximum timestamp regex length accepted from configuration.
pub const MAX_REGEX_PATTERN_LENGTH: usize = 4_096;

// =============================================================================
// Logging
// =============================================================================

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Maximum length of a log line included in debug output.
pub const DEBUG_MAX_LINE_PREVIEW: usize = 200;

// =============================================================================
// Configuration and caches
// =============================================================================

/// Configuration file name.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Subdirectory of the data directory holding cached line indexes.
pub const INDEX_CACHE_DIR_NAME: &str = "indexes";
