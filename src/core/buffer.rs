// logscope - core/buffer.rs
//
// Opening a file (full scan + line checkpoint index) and loading windows of
// parsed lines from an arbitrary start line using that index.

use crate::core::checkpoint::{Cadence, CheckpointRecorder, LineIndex, Lines};
use crate::core::model::{FileOptions, ParsedLine, Progress, ScanControl};
use crate::core::parser::LineParser;
use crate::core::scanner::{scan_file, ScanConfig};
use crate::util::constants::{BUFFER_PROGRESS_STEPS, FULL_SCAN_PROGRESS_STEPS, MAX_WINDOW_LINES};
use crate::util::error::{LogScopeError, Result};
use serde::Serialize;
use std::path::Path;
use std::time::Instant;

/// Result of a full open scan.
#[derive(Debug, Clone, Serialize)]
pub struct OpenResult {
    /// The first `window` parsed lines of the file.
    pub lines: Vec<ParsedLine>,

    /// Number of non-empty lines seen.
    pub line_count: u64,

    /// Size of the file when the scan started.
    pub file_size: u64,

    /// Line checkpoints for later buffer loads and histograms.
    #[serde(skip)]
    pub index: LineIndex,

    /// False when the progress callback stopped the scan early. `line_count`
    /// and `index` then only cover the part of the file that was read.
    pub complete: bool,
}

/// A window of parsed lines starting at line ordinal `offset`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BufferResult {
    pub lines: Vec<ParsedLine>,
    pub offset: u64,
}

/// Percentage of `done` over `total`, 0 when `total` is 0.
pub(crate) fn percent_of(done: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        100.0 * done as f64 / total as f64
    }
}

pub(crate) fn file_size(path: &Path) -> Result<u64> {
    std::fs::metadata(path)
        .map(|m| m.len())
        .map_err(|e| LogScopeError::io(path, "stat", e))
}

/// Scan `path` from the start: count lines, build the line index and keep
/// the first `window` lines.
///
/// `on_progress` is throttled to one call per `file_size / 300` bytes and
/// receives the line count so far; it is always called once more when the
/// scan ends.
pub fn open_file<P>(
    path: &Path,
    window: usize,
    options: &FileOptions,
    mut on_progress: P,
) -> Result<OpenResult>
where
    P: FnMut(Progress) -> ScanControl,
{
    let started = Instant::now();
    let file_size = file_size(path)?;
    let parser = LineParser::from_options(options);
    let mut recorder = CheckpointRecorder::<Lines>::new(file_size, options.num_checkpoints);
    let mut progress = Cadence::spread(file_size, FULL_SCAN_PROGRESS_STEPS);
    let mut lines = Vec::with_capacity(window.min(MAX_WINDOW_LINES));
    let mut line_count = 0u64;

    let outcome = scan_file(path, None, &ScanConfig::from(options), |raw, _| {
        if progress.tick(raw.byte_offset) {
            let update = Progress {
                percent: percent_of(raw.byte_offset, file_size),
                count: line_count,
            };
            if on_progress(update).is_stop() {
                return ScanControl::Stop;
            }
        }
        recorder.observe(raw.line_ordinal, &raw);
        if lines.len() < window {
            lines.push(parser.parse(raw));
        }
        line_count += 1;
        ScanControl::Continue
    })?;

    let complete = !outcome.stopped;
    let _ = on_progress(Progress {
        percent: if complete { 100.0 } else { percent_of(outcome.bytes_read, file_size) },
        count: line_count,
    });

    let index = recorder.finish();
    tracing::info!(
        file = %path.display(),
        lines = line_count,
        bytes = file_size,
        checkpoints = index.len(),
        complete,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "File opened"
    );

    Ok(OpenResult {
        lines,
        line_count,
        file_size,
        index,
        complete,
    })
}

/// Load up to `window` parsed lines starting at line ordinal `start`.
///
/// The scan resumes from the closest checkpoint before `start` (or the
/// beginning of the file) and stops as soon as the window is full, so the
/// result never depends on how dense `index` is. Stopping from
/// `on_progress` returns the lines collected so far.
pub fn load_buffer<P>(
    path: &Path,
    start: u64,
    window: usize,
    index: &LineIndex,
    options: &FileOptions,
    mut on_progress: P,
) -> Result<BufferResult>
where
    P: FnMut(Progress) -> ScanControl,
{
    let mut lines: Vec<ParsedLine> = Vec::with_capacity(window.min(MAX_WINDOW_LINES));
    if window == 0 {
        return Ok(BufferResult { lines, offset: start });
    }

    let checkpoint = index.start_for(start);
    let span = start.saturating_add(window as u64).saturating_sub(checkpoint.line_ordinal);
    let mut progress = Cadence::spread(span, BUFFER_PROGRESS_STEPS);
    let parser = LineParser::from_options(options);

    tracing::debug!(
        file = %path.display(),
        start,
        window,
        checkpoint_line = checkpoint.line_ordinal,
        checkpoint_offset = checkpoint.byte_offset,
        "Loading buffer"
    );

    let outcome = scan_file(
        path,
        Some(checkpoint.position()),
        &ScanConfig::from(options),
        |raw, _| {
            let scanned = raw.line_ordinal - checkpoint.line_ordinal;
            if raw.line_ordinal >= start {
                lines.push(parser.parse(raw));
                if lines.len() >= window {
                    return ScanControl::Stop;
                }
            }
            if progress.tick(scanned) {
                let update = Progress {
                    percent: percent_of(scanned, span),
                    count: lines.len() as u64,
                };
                if on_progress(update).is_stop() {
                    return ScanControl::Stop;
                }
            }
            ScanControl::Continue
        },
    )?;

    let _ = on_progress(Progress {
        percent: 100.0,
        count: lines.len() as u64,
    });
    tracing::debug!(
        start,
        loaded = lines.len(),
        stopped = outcome.stopped,
        "Buffer loaded"
    );

    Ok(BufferResult {
        lines,
        offset: start,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::{Encoding, LineFormat, TextOptions};
    use std::io::Write;

    fn numbered_file(count: usize) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        for i in 0..count {
            writeln!(f, "line number {i}").unwrap();
        }
        f.flush().unwrap();
        f
    }

    fn options(chunk_size: usize, num_checkpoints: usize) -> FileOptions {
        FileOptions {
            chunk_size,
            num_checkpoints,
            ..FileOptions::default()
        }
    }

    fn texts(lines: &[ParsedLine]) -> Vec<String> {
        lines.iter().map(|l| l.message.clone()).collect()
    }

    #[test]
    fn test_open_counts_lines_and_keeps_first_window() {
        let f = numbered_file(500);
        let result = open_file(f.path(), 10, &options(64, 50), |_| ScanControl::Continue).unwrap();
        assert!(result.complete);
        assert_eq!(result.line_count, 500);
        assert_eq!(result.lines.len(), 10);
        assert_eq!(result.lines[9].message, "line number 9");
        assert!(!result.index.is_empty());
        assert!(result.index.len() <= 50);
    }

    #[test]
    fn test_open_progress_is_throttled_with_final_call() {
        let f = numbered_file(3_000);
        let mut calls = Vec::new();
        open_file(f.path(), 0, &options(1024, 10), |p| {
            calls.push(p);
            ScanControl::Continue
        })
        .unwrap();
        assert!(calls.len() <= FULL_SCAN_PROGRESS_STEPS as usize + 1);
        let last = calls.last().unwrap();
        assert_eq!(last.percent, 100.0);
        assert_eq!(last.count, 3_000);
    }

    #[test]
    fn test_open_stopped_by_progress_is_incomplete() {
        let f = numbered_file(3_000);
        let result = open_file(f.path(), 5, &options(1024, 10), |p| {
            if p.percent > 50.0 {
                ScanControl::Stop
            } else {
                ScanControl::Continue
            }
        })
        .unwrap();
        assert!(!result.complete);
        assert!(result.line_count < 3_000);
        assert_eq!(result.lines.len(), 5);
    }

    #[test]
    fn test_load_buffer_same_with_and_without_index() {
        let f = numbered_file(1_000);
        let opts = options(128, 100);
        let opened = open_file(f.path(), 0, &opts, |_| ScanControl::Continue).unwrap();
        for start in [0, 1, 99, 500, 990] {
            let indexed = load_buffer(f.path(), start, 20, &opened.index, &opts, |_| {
                ScanControl::Continue
            })
            .unwrap();
            let plain = load_buffer(f.path(), start, 20, &LineIndex::empty(), &opts, |_| {
                ScanControl::Continue
            })
            .unwrap();
            assert_eq!(indexed, plain, "start {start}");
            assert_eq!(indexed.offset, start);
            assert_eq!(indexed.lines[0].line_ordinal(), start);
            assert_eq!(indexed.lines[0].message, format!("line number {start}"));
        }
    }

    #[test]
    fn test_load_buffer_truncates_at_end_of_file() {
        let f = numbered_file(100);
        let opts = options(4096, 10);
        let opened = open_file(f.path(), 0, &opts, |_| ScanControl::Continue).unwrap();
        let buffer = load_buffer(f.path(), 95, 50, &opened.index, &opts, |_| ScanControl::Continue).unwrap();
        assert_eq!(buffer.lines.len(), 5);
        assert_eq!(buffer.lines[4].line_ordinal(), 99);

        let past_end = load_buffer(f.path(), 200, 10, &opened.index, &opts, |_| ScanControl::Continue).unwrap();
        assert!(past_end.lines.is_empty());
    }

    #[test]
    fn test_load_buffer_far_past_end_is_empty() {
        let f = numbered_file(20);
        let empty = tempfile::NamedTempFile::new().unwrap();
        for path in [f.path(), empty.path()] {
            let buffer = load_buffer(
                path,
                u64::MAX - 1,
                10,
                &LineIndex::empty(),
                &FileOptions::default(),
                |_| ScanControl::Continue,
            )
            .unwrap();
            assert!(buffer.lines.is_empty());
            assert_eq!(buffer.offset, u64::MAX - 1);
        }
    }

    #[test]
    fn test_load_buffer_zero_window_reads_nothing() {
        let buffer = load_buffer(
            Path::new("/nonexistent/logscope.log"),
            3,
            0,
            &LineIndex::empty(),
            &FileOptions::default(),
            |_| ScanControl::Continue,
        )
        .unwrap();
        assert!(buffer.lines.is_empty());
        assert_eq!(buffer.offset, 3);
    }

    #[test]
    fn test_load_buffer_applies_parser() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "2024-01-15T10:00:00Z boot cpu=4").unwrap();
        writeln!(f, "2024-01-15T10:00:05Z ready").unwrap();
        f.flush().unwrap();
        let opts = FileOptions {
            format: LineFormat::Text(TextOptions {
                extract_key_value: true,
                timestamp_pattern: Some(r"^\S+".to_string()),
            }),
            encoding: Encoding::Utf8,
            ..FileOptions::default()
        };
        let buffer = load_buffer(f.path(), 0, 10, &LineIndex::empty(), &opts, |_| ScanControl::Continue).unwrap();
        assert_eq!(texts(&buffer.lines), ["boot cpu=4", "ready"]);
        assert_eq!(buffer.lines[0].timestamp.as_deref(), Some("2024-01-15T10:00:00Z"));
        assert_eq!(buffer.lines[0].fields["cpu"], "4");
    }

    #[test]
    fn test_load_buffer_missing_file_is_io_error() {
        let result = load_buffer(
            Path::new("/nonexistent/logscope.log"),
            0,
            10,
            &LineIndex::empty(),
            &FileOptions::default(),
            |_| ScanControl::Continue,
        );
        assert!(matches!(result, Err(LogScopeError::Io { .. })));
    }
}
