// logscope - core/scanner.rs
//
// Chunked streaming line scanner. This is the only module that reads log
// content from disk: every loader, search pass and histogram sample goes
// through it.
//
// Lines end at any `\r` or `\n` byte. Bytes are only decoded once a whole
// line has been collected, so multi-byte sequences are never split. A line
// longer than a chunk is accumulated across reads in a buffer owned by the
// scan call, and is always emitted complete.

use crate::core::model::{Encoding, FileOptions, LineFlags, Position, RawLine, ScanControl};
use crate::util::error::{LogScopeError, Result};
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// Scanner settings taken from the options bag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanConfig {
    pub encoding: Encoding,
    pub chunk_size: usize,
}

impl ScanConfig {
    pub fn new(encoding: Encoding, chunk_size: usize) -> Self {
        Self {
            encoding,
            chunk_size: chunk_size.max(1),
        }
    }
}

impl From<&FileOptions> for ScanConfig {
    fn from(options: &FileOptions) -> Self {
        Self::new(options.encoding, options.chunk_size)
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self::from(&FileOptions::default())
    }
}

/// How a scan ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanOutcome {
    /// A callback returned `ScanControl::Stop`.
    pub stopped: bool,

    /// Number of lines handed to the callback.
    pub lines_emitted: u64,

    /// Bytes read from the file during this scan.
    pub bytes_read: u64,
}

/// Stream the lines of `path` to `on_line`, starting at `start` (or the
/// beginning of the file with ordinal 0).
///
/// The file handle lives for the duration of this call only and is released
/// on every exit path, including early stops and read errors.
pub fn scan_file<F>(
    path: &Path,
    start: Option<Position>,
    config: &ScanConfig,
    on_line: F,
) -> Result<ScanOutcome>
where
    F: FnMut(RawLine, LineFlags) -> ScanControl,
{
    let start = start.unwrap_or_default();
    let mut file = File::open(path).map_err(|e| LogScopeError::io(path, "open", e))?;
    if start.byte_offset > 0 {
        file.seek(SeekFrom::Start(start.byte_offset))
            .map_err(|e| LogScopeError::io(path, "seek", e))?;
    }

    tracing::trace!(
        file = %path.display(),
        offset = start.byte_offset,
        ordinal = start.line_ordinal,
        chunk_size = config.chunk_size,
        "Scan started"
    );

    let mut scanner = LineScanner::new(start, *config, on_line);
    let mut chunk = vec![0u8; config.chunk_size];
    loop {
        let n = read_chunk(&mut file, &mut chunk).map_err(|e| LogScopeError::io(path, "read", e))?;
        if n == 0 {
            break;
        }
        if scanner.feed(&chunk[..n]).is_stop() {
            return Ok(scanner.outcome(true));
        }
    }
    let stopped = scanner.finish().is_stop();
    Ok(scanner.outcome(stopped))
}

/// Read one chunk, retrying reads interrupted by signals.
fn read_chunk(file: &mut File, chunk: &mut [u8]) -> io::Result<usize> {
    loop {
        match file.read(chunk) {
            Ok(n) => return Ok(n),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}

// =============================================================================
// Line reassembly
// =============================================================================

/// Splits a stream of chunks into lines. Owns the partial-line accumulator
/// for exactly one scan.
struct LineScanner<F> {
    config: ScanConfig,
    on_line: F,

    /// File offset of the first byte of the next chunk.
    chunk_offset: u64,

    /// Ordinal the next emitted line receives.
    next_ordinal: u64,

    /// Bytes of a line not yet terminated by the end of the previous chunk.
    pending: Vec<u8>,

    /// File offset of `pending[0]`.
    pending_offset: u64,

    /// `pending` has absorbed at least one whole chunk without a boundary.
    pending_truncated: bool,

    lines_emitted: u64,
    bytes_read: u64,
}

impl<F> LineScanner<F>
where
    F: FnMut(RawLine, LineFlags) -> ScanControl,
{
    fn new(start: Position, config: ScanConfig, on_line: F) -> Self {
        Self {
            config,
            on_line,
            chunk_offset: start.byte_offset,
            next_ordinal: start.line_ordinal,
            pending: Vec::new(),
            pending_offset: start.byte_offset,
            pending_truncated: false,
            lines_emitted: 0,
            bytes_read: 0,
        }
    }

    /// Process one chunk of file content.
    fn feed(&mut self, data: &[u8]) -> ScanControl {
        let mut line_start = 0usize;
        for (idx, &b) in data.iter().enumerate() {
            if b != b'\r' && b != b'\n' {
                continue;
            }
            let control = if self.pending.is_empty() {
                let offset = self.chunk_offset + line_start as u64;
                self.emit(&data[line_start..idx], offset, LineFlags::default())
            } else {
                let mut bytes = std::mem::take(&mut self.pending);
                bytes.extend_from_slice(&data[line_start..idx]);
                let flags = LineFlags {
                    truncated: self.pending_truncated,
                };
                self.pending_truncated = false;
                let control = self.emit(&bytes, self.pending_offset, flags);
                // Hand the allocation back for the next long line.
                bytes.clear();
                self.pending = bytes;
                control
            };
            line_start = idx + 1;
            if control.is_stop() {
                return ScanControl::Stop;
            }
        }

        if line_start < data.len() {
            if self.pending.is_empty() {
                self.pending_offset = self.chunk_offset + line_start as u64;
            }
            if line_start == 0 {
                self.pending_truncated = true;
            }
            self.pending.extend_from_slice(&data[line_start..]);
        }
        self.chunk_offset += data.len() as u64;
        self.bytes_read += data.len() as u64;
        ScanControl::Continue
    }

    /// Flush the unterminated last line at end of file.
    fn finish(&mut self) -> ScanControl {
        if self.pending.is_empty() {
            return ScanControl::Continue;
        }
        let bytes = std::mem::take(&mut self.pending);
        let flags = LineFlags {
            truncated: self.pending_truncated,
        };
        self.emit(&bytes, self.pending_offset, flags)
    }

    fn emit(&mut self, bytes: &[u8], byte_offset: u64, flags: LineFlags) -> ScanControl {
        let mut text = self.config.encoding.decode(bytes);
        let trimmed_len = text.trim_end().len();
        if trimmed_len == 0 {
            return ScanControl::Continue;
        }
        text.truncate(trimmed_len);

        let line = RawLine {
            text,
            byte_offset,
            line_ordinal: self.next_ordinal,
        };
        self.next_ordinal += 1;
        self.lines_emitted += 1;
        if flags.truncated {
            tracing::trace!(offset = byte_offset, "Line spanned more than one chunk");
        }
        (self.on_line)(line, flags)
    }

    fn outcome(&self, stopped: bool) -> ScanOutcome {
        ScanOutcome {
            stopped,
            lines_emitted: self.lines_emitted,
            bytes_read: self.bytes_read,
        }
    }
}

// =============================================================================
// Single-line sampling
// =============================================================================

/// Reads the first line at arbitrary positions through one open handle.
///
/// Each sample reads at most one chunk; a line that does not end within
/// that chunk is not returned unless the chunk reaches end of file.
pub struct LineSampler {
    path: PathBuf,
    file: File,
    chunk: Vec<u8>,
    encoding: Encoding,
}

impl LineSampler {
    pub fn open(path: &Path, config: &ScanConfig) -> Result<Self> {
        let file = File::open(path).map_err(|e| LogScopeError::io(path, "open", e))?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
            chunk: vec![0u8; config.chunk_size],
            encoding: config.encoding,
        })
    }

    /// Return the first non-empty line at or after `position`.
    pub fn line_at(&mut self, position: Position) -> Result<Option<RawLine>> {
        self.file
            .seek(SeekFrom::Start(position.byte_offset))
            .map_err(|e| LogScopeError::io(&self.path, "seek", e))?;
        let n = read_chunk(&mut self.file, &mut self.chunk)
            .map_err(|e| LogScopeError::io(&self.path, "read", e))?;
        let data = &self.chunk[..n];
        let reached_eof = n < self.chunk.len();

        let mut first: Option<RawLine> = None;
        let mut scanner = LineScanner::new(position, ScanConfig::new(self.encoding, n), |line, _| {
            first = Some(line);
            ScanControl::Stop
        });
        if !scanner.feed(data).is_stop() && reached_eof {
            let _ = scanner.finish();
        }
        Ok(first)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(content: &[u8]) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(content).unwrap();
        f.flush().unwrap();
        f
    }

    fn collect(path: &Path, start: Option<Position>, chunk: usize) -> Vec<RawLine> {
        let mut lines = Vec::new();
        scan_file(path, start, &ScanConfig::new(Encoding::Utf8, chunk), |line, _| {
            lines.push(line);
            ScanControl::Continue
        })
        .unwrap();
        lines
    }

    #[test]
    fn test_scan_small_file_offsets() {
        let f = write_temp(b"one\ntwo  two\nthree\nfour");
        for chunk in [1, 2, 3, 5, 1000] {
            let lines = collect(f.path(), None, chunk);
            let texts: Vec<_> = lines.iter().map(|l| l.text.as_str()).collect();
            let offsets: Vec<_> = lines.iter().map(|l| l.byte_offset).collect();
            let ordinals: Vec<_> = lines.iter().map(|l| l.line_ordinal).collect();
            assert_eq!(texts, ["one", "two  two", "three", "four"], "chunk {chunk}");
            assert_eq!(offsets, [0, 4, 13, 19], "chunk {chunk}");
            assert_eq!(ordinals, [0, 1, 2, 3], "chunk {chunk}");
        }
    }

    #[test]
    fn test_crlf_and_blank_lines_skipped() {
        let f = write_temp(b"a\r\n\r\n   \nb  \r\nc\n");
        let lines = collect(f.path(), None, 4);
        let texts: Vec<_> = lines.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, ["a", "b", "c"]);
        assert_eq!(lines[1].line_ordinal, 1);
        assert_eq!(lines[1].byte_offset, 9);
    }

    #[test]
    fn test_long_line_is_flagged_and_complete() {
        let long = "x".repeat(50);
        let content = format!("short\n{long}\nend\n");
        let f = write_temp(content.as_bytes());
        let mut seen = Vec::new();
        scan_file(f.path(), None, &ScanConfig::new(Encoding::Utf8, 8), |line, flags| {
            seen.push((line.text, flags.truncated));
            ScanControl::Continue
        })
        .unwrap();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0], ("short".to_string(), false));
        assert_eq!(seen[1], (long, true));
        assert_eq!(seen[2], ("end".to_string(), false));
    }

    #[test]
    fn test_multibyte_sequence_split_across_chunks() {
        let f = write_temp("héllo wörld\nnaïve\n".as_bytes());
        for chunk in [1, 2, 3] {
            let texts: Vec<_> = collect(f.path(), None, chunk)
                .into_iter()
                .map(|l| l.text)
                .collect();
            assert_eq!(texts, ["héllo wörld", "naïve"], "chunk {chunk}");
        }
    }

    #[test]
    fn test_stop_ends_scan_without_flushing() {
        let f = write_temp(b"a\nb\nc");
        let mut seen = Vec::new();
        let outcome = scan_file(f.path(), None, &ScanConfig::new(Encoding::Utf8, 2), |line, _| {
            seen.push(line.text);
            if seen.len() == 2 {
                ScanControl::Stop
            } else {
                ScanControl::Continue
            }
        })
        .unwrap();
        assert!(outcome.stopped);
        assert_eq!(seen, ["a", "b"]);
    }

    #[test]
    fn test_scan_resumes_from_position() {
        let f = write_temp(b"zero\none\ntwo\nthree\n");
        let start = Position {
            line_ordinal: 2,
            byte_offset: 9,
        };
        let lines = collect(f.path(), Some(start), 3);
        assert_eq!(lines[0].text, "two");
        assert_eq!(lines[0].line_ordinal, 2);
        assert_eq!(lines[1].line_ordinal, 3);
        assert_eq!(lines[1].byte_offset, 13);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = scan_file(
            Path::new("/nonexistent/logscope/missing.log"),
            None,
            &ScanConfig::default(),
            |_, _| ScanControl::Continue,
        );
        assert!(matches!(
            result,
            Err(LogScopeError::Io {
                operation: "open",
                ..
            })
        ));
    }

    #[test]
    fn test_sampler_reads_line_at_position() {
        let f = write_temp(b"first\n\nsecond line\nthird");
        let mut sampler = LineSampler::open(f.path(), &ScanConfig::new(Encoding::Utf8, 64)).unwrap();
        let line = sampler
            .line_at(Position {
                line_ordinal: 1,
                byte_offset: 6,
            })
            .unwrap()
            .unwrap();
        assert_eq!(line.text, "second line");
        assert_eq!(line.byte_offset, 7);
        assert_eq!(line.line_ordinal, 1);

        let last = sampler
            .line_at(Position {
                line_ordinal: 2,
                byte_offset: 19,
            })
            .unwrap()
            .unwrap();
        assert_eq!(last.text, "third");
    }

    #[test]
    fn test_sampler_without_boundary_in_chunk_returns_none() {
        let f = write_temp(b"a very long first line\nb\n");
        let mut sampler = LineSampler::open(f.path(), &ScanConfig::new(Encoding::Utf8, 4)).unwrap();
        assert!(sampler.line_at(Position::default()).unwrap().is_none());
    }
}
