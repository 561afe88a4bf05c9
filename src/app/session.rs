// logscope - app/session.rs
//
// Per-file session: owns the line index and the per-filter search indexes
// between engine calls and refuses buffer loads before the file is opened.
//
// The engine itself is stateless. Everything a viewer needs to remember
// about one file lives here.

use crate::app::index_cache::{self, IndexSnapshot};
use crate::core::buffer::{self, BufferResult, OpenResult};
use crate::core::checkpoint::{Checkpoint, LineIndex};
use crate::core::histogram;
use crate::core::model::{FileOptions, FilterSpec, HistogramBucket, Progress, ScanControl};
use crate::core::search::{self, SearchBuffer, SearchIndex};
use crate::util::error::{PreconditionError, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// State produced by a completed open scan.
#[derive(Debug, Clone)]
struct OpenedFile {
    line_count: u64,
    file_size: u64,
    index: LineIndex,
}

/// One log file being viewed.
#[derive(Debug)]
pub struct FileSession {
    path: PathBuf,
    options: FileOptions,
    opened: Option<OpenedFile>,
    search_indexes: HashMap<FilterSpec, SearchIndex>,

    /// Start line of the last loaded buffer; base for relative go-to specs.
    current_line: u64,
}

impl FileSession {
    pub fn new(path: impl Into<PathBuf>, options: FileOptions) -> Self {
        Self {
            path: path.into(),
            options,
            opened: None,
            search_indexes: HashMap::new(),
            current_line: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn options(&self) -> &FileOptions {
        &self.options
    }

    /// True once an open scan has run to completion.
    pub fn is_open(&self) -> bool {
        self.opened.is_some()
    }

    pub fn line_count(&self) -> Option<u64> {
        self.opened.as_ref().map(|o| o.line_count)
    }

    pub fn file_size(&self) -> Option<u64> {
        self.opened.as_ref().map(|o| o.file_size)
    }

    pub fn line_index(&self) -> Option<&LineIndex> {
        self.opened.as_ref().map(|o| &o.index)
    }

    pub fn current_line(&self) -> u64 {
        self.current_line
    }

    fn require_open(&self) -> Result<&OpenedFile> {
        self.opened.as_ref().ok_or_else(|| {
            PreconditionError::NotOpened {
                path: self.path.clone(),
            }
            .into()
        })
    }

    /// Run the full open scan. The index is kept only if the scan completed;
    /// a cancelled open leaves the session unopened.
    pub fn open<P>(&mut self, window: usize, on_progress: P) -> Result<OpenResult>
    where
        P: FnMut(Progress) -> ScanControl,
    {
        let result = buffer::open_file(&self.path, window, &self.options, on_progress)?;
        self.adopt_open(&result);
        Ok(result)
    }

    /// Take over the result of an open scan run elsewhere (for example by
    /// the task manager).
    pub fn adopt_open(&mut self, result: &OpenResult) {
        // Any earlier search indexes describe a previous version of the file.
        self.search_indexes.clear();
        self.current_line = 0;
        self.opened = result.complete.then(|| OpenedFile {
            line_count: result.line_count,
            file_size: result.file_size,
            index: result.index.clone(),
        });
        if !result.complete {
            tracing::info!(file = %self.path.display(), "Open cancelled; session stays unopened");
        }
    }

    /// Use line checkpoints built elsewhere (another process, an earlier
    /// run) instead of running an open scan.
    ///
    /// Fails with [`IndexError::NotIncreasing`](crate::util::error::IndexError)
    /// when the checkpoints do not strictly increase; the session is then
    /// left unchanged.
    pub fn adopt_checkpoints(&mut self, line_count: u64, checkpoints: Vec<Checkpoint>) -> Result<()> {
        let index = LineIndex::try_from(checkpoints)?;
        let file_size = buffer::file_size(&self.path)?;
        tracing::debug!(
            file = %self.path.display(),
            lines = line_count,
            checkpoints = index.len(),
            "External line index adopted"
        );
        self.search_indexes.clear();
        self.current_line = 0;
        self.opened = Some(OpenedFile {
            line_count,
            file_size,
            index,
        });
        Ok(())
    }

    /// Load `window` lines starting at `start`.
    ///
    /// Fails with [`PreconditionError::NotOpened`] before a completed open.
    pub fn load_buffer<P>(&mut self, start: u64, window: usize, on_progress: P) -> Result<BufferResult>
    where
        P: FnMut(Progress) -> ScanControl,
    {
        let opened = self.require_open()?;
        let result = buffer::load_buffer(
            &self.path,
            start,
            window,
            &opened.index,
            &self.options,
            on_progress,
        )?;
        self.current_line = start;
        Ok(result)
    }

    /// Count matches for `filter`. A completed scan's index is kept for
    /// later [`FileSession::search_buffer`] calls with the same filter.
    pub fn search_scan<P>(&mut self, filter: &FilterSpec, on_progress: P) -> Result<SearchIndex>
    where
        P: FnMut(Progress) -> ScanControl,
    {
        let index = search::search_scan(&self.path, filter, &self.options, on_progress)?;
        self.adopt_search(index.clone());
        Ok(index)
    }

    /// Keep a search index produced elsewhere. Partial indexes are dropped.
    pub fn adopt_search(&mut self, index: SearchIndex) {
        if index.complete {
            self.search_indexes.insert(index.filter.clone(), index);
        }
    }

    pub fn search_index(&self, filter: &FilterSpec) -> Option<&SearchIndex> {
        self.search_indexes.get(filter)
    }

    /// Load a window of matches. Without a stored index for `filter` the
    /// scan starts at the beginning of the file.
    pub fn search_buffer<P>(
        &self,
        filter: &FilterSpec,
        start_match: u64,
        window: usize,
        on_progress: P,
    ) -> Result<SearchBuffer>
    where
        P: FnMut(Progress) -> ScanControl,
    {
        let empty;
        let index = match self.search_indexes.get(filter) {
            Some(index) => index,
            None => {
                empty = SearchIndex::empty(filter.clone());
                &empty
            }
        };
        search::search_buffer(
            &self.path,
            filter,
            start_match,
            window,
            index,
            &self.options,
            on_progress,
        )
    }

    /// Line-density histogram sampled from the line index.
    pub fn histogram(&self, num_buckets: usize) -> Result<Option<Vec<HistogramBucket>>> {
        let opened = self.require_open()?;
        histogram::build_histogram(&self.path, &opened.index, num_buckets, &self.options)
    }

    /// Resolve a go-to-line spec against the current line and line count.
    pub fn goto(&self, spec: &str) -> Option<u64> {
        parse_line_spec(spec, self.line_count().unwrap_or(0), self.current_line)
    }

    // -------------------------------------------------------------------------
    // Index cache
    // -------------------------------------------------------------------------

    /// Write the line index to `cache_dir` so a later session can skip the
    /// open scan. Failures are logged and ignored.
    pub fn save_index(&self, cache_dir: &Path) {
        let Some(opened) = &self.opened else {
            return;
        };
        let Some(snapshot) = IndexSnapshot::capture(
            &self.path,
            &self.options,
            opened.file_size,
            opened.line_count,
            opened.index.clone(),
        ) else {
            return;
        };
        let target = index_cache::cache_path(cache_dir, &self.path);
        if let Err(e) = index_cache::save(&snapshot, &target) {
            tracing::warn!(error = %e, "Could not cache line index");
        }
    }

    /// Adopt a cached line index if it still describes the file on disk.
    /// Returns true when the session is now open.
    pub fn restore_index(&mut self, cache_dir: &Path) -> bool {
        let target = index_cache::cache_path(cache_dir, &self.path);
        let Some(snapshot) = index_cache::load(&target, &self.path, &self.options) else {
            return false;
        };
        tracing::debug!(
            file = %self.path.display(),
            lines = snapshot.line_count,
            checkpoints = snapshot.checkpoints.len(),
            "Line index restored from cache"
        );
        self.search_indexes.clear();
        self.current_line = 0;
        self.opened = Some(OpenedFile {
            line_count: snapshot.line_count,
            file_size: snapshot.file_size,
            index: snapshot.checkpoints,
        });
        true
    }
}

/// Parse a go-to-line spec: `N` (absolute), `+N` or `-N` (relative to
/// `current_line`).
///
/// The result is clamped to `[0, line_count - 1]`; with `line_count == 0`
/// only the lower bound applies. Returns `None` for specs that are not a
/// number.
pub fn parse_line_spec(spec: &str, line_count: u64, current_line: u64) -> Option<u64> {
    let spec = spec.trim();
    let target = if let Some(n) = spec.strip_prefix('+') {
        current_line.saturating_add(n.trim().parse::<u64>().ok()?)
    } else if let Some(n) = spec.strip_prefix('-') {
        current_line.saturating_sub(n.trim().parse::<u64>().ok()?)
    } else {
        spec.parse::<u64>().ok()?
    };
    if line_count > 0 && target >= line_count {
        return Some(line_count - 1);
    }
    Some(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::error::{IndexError, LogScopeError};
    use std::io::Write;

    fn numbered_file(count: usize) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        for i in 0..count {
            writeln!(f, "2024-01-15T10:{:02}:{:02}Z entry {i}", i / 60 % 60, i % 60).unwrap();
        }
        f.flush().unwrap();
        f
    }

    fn small_options() -> FileOptions {
        FileOptions {
            chunk_size: 256,
            num_checkpoints: 50,
            ..FileOptions::default()
        }
    }

    fn go(_: Progress) -> ScanControl {
        ScanControl::Continue
    }

    #[test]
    fn test_load_before_open_is_precondition_error() {
        let f = numbered_file(10);
        let mut session = FileSession::new(f.path(), small_options());
        let err = session.load_buffer(5, 3, go).unwrap_err();
        assert!(matches!(
            err,
            LogScopeError::Precondition(PreconditionError::NotOpened { .. })
        ));
        assert!(matches!(
            session.histogram(5),
            Err(LogScopeError::Precondition(_))
        ));
    }

    #[test]
    fn test_open_then_load_buffer() {
        let f = numbered_file(300);
        let mut session = FileSession::new(f.path(), small_options());
        let opened = session.open(5, go).unwrap();
        assert_eq!(opened.lines.len(), 5);
        assert!(session.is_open());
        assert_eq!(session.line_count(), Some(300));

        let buffer = session.load_buffer(250, 10, go).unwrap();
        assert_eq!(buffer.lines.len(), 10);
        assert_eq!(buffer.lines[0].message, "2024-01-15T10:04:10Z entry 250");
        assert_eq!(session.current_line(), 250);
    }

    #[test]
    fn test_adopt_external_checkpoints() {
        let f = numbered_file(300);
        let mut scanned = FileSession::new(f.path(), small_options());
        scanned.open(0, go).unwrap();
        let checkpoints = scanned.line_index().unwrap().as_slice().to_vec();
        assert!(checkpoints.len() > 1);

        let mut adopted = FileSession::new(f.path(), small_options());
        adopted.adopt_checkpoints(300, checkpoints).unwrap();
        assert!(adopted.is_open());
        assert_eq!(adopted.line_index(), scanned.line_index());
        assert_eq!(
            adopted.load_buffer(123, 4, go).unwrap(),
            scanned.load_buffer(123, 4, go).unwrap()
        );
    }

    #[test]
    fn test_adopt_unordered_checkpoints_is_index_error() {
        let f = numbered_file(10);
        let mut session = FileSession::new(f.path(), small_options());
        let checkpoints = vec![
            Checkpoint {
                ordinal: 4,
                line_ordinal: 4,
                byte_offset: 120,
            },
            Checkpoint {
                ordinal: 2,
                line_ordinal: 2,
                byte_offset: 60,
            },
        ];
        let err = session.adopt_checkpoints(10, checkpoints).unwrap_err();
        assert!(matches!(
            err,
            LogScopeError::Index(IndexError::NotIncreasing { position: 1 })
        ));
        assert!(!session.is_open());
    }

    #[test]
    fn test_cancelled_open_leaves_session_unopened() {
        let f = numbered_file(2_000);
        let mut session = FileSession::new(f.path(), small_options());
        let result = session.open(0, |_| ScanControl::Stop).unwrap();
        assert!(!result.complete);
        assert!(!session.is_open());
    }

    #[test]
    fn test_search_index_is_stored_per_filter() {
        let f = numbered_file(300);
        let mut session = FileSession::new(f.path(), small_options());
        let filter = FilterSpec::new(r"entry \d*5$", true);
        let index = session.search_scan(&filter, go).unwrap();
        assert_eq!(index.match_count, 30);
        assert!(session.search_index(&filter).is_some());
        assert!(session.search_index(&FilterSpec::new("entry", true)).is_none());

        let stored = session.search_buffer(&filter, 28, 5, go).unwrap();
        let unstored = session
            .search_buffer(&FilterSpec::new(r"entry \d*5$", true), 28, 5, go)
            .unwrap();
        assert_eq!(stored, unstored);
        assert_eq!(stored.lines.len(), 2);
        assert_eq!(stored.lines[0].match_ordinal, Some(28));
    }

    #[test]
    fn test_goto_relative_and_clamped() {
        let f = numbered_file(100);
        let mut session = FileSession::new(f.path(), small_options());
        session.open(0, go).unwrap();
        session.load_buffer(40, 5, go).unwrap();
        assert_eq!(session.goto("+10"), Some(50));
        assert_eq!(session.goto("-50"), Some(0));
        assert_eq!(session.goto("7"), Some(7));
        assert_eq!(session.goto("1000"), Some(99));
        assert_eq!(session.goto("abc"), None);
    }

    #[test]
    fn test_parse_line_spec_without_line_count() {
        assert_eq!(parse_line_spec("12", 0, 0), Some(12));
        assert_eq!(parse_line_spec(" +3 ", 0, 4), Some(7));
        assert_eq!(parse_line_spec("-", 10, 4), None);
        assert_eq!(parse_line_spec("", 10, 4), None);
    }

    #[test]
    fn test_index_cache_round_trip() {
        let f = numbered_file(400);
        let cache = tempfile::tempdir().unwrap();
        let mut first = FileSession::new(f.path(), small_options());
        first.open(0, go).unwrap();
        first.save_index(cache.path());

        let mut second = FileSession::new(f.path(), small_options());
        assert!(second.restore_index(cache.path()));
        assert_eq!(second.line_count(), Some(400));
        assert_eq!(second.line_index(), first.line_index());
        let a = first.load_buffer(333, 3, go).unwrap();
        let b = second.load_buffer(333, 3, go).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_index_cache_rejects_changed_file() {
        let mut f = numbered_file(100);
        let cache = tempfile::tempdir().unwrap();
        let mut first = FileSession::new(f.path(), small_options());
        first.open(0, go).unwrap();
        first.save_index(cache.path());

        writeln!(f, "one more line").unwrap();
        f.flush().unwrap();
        let mut second = FileSession::new(f.path(), small_options());
        assert!(!second.restore_index(cache.path()));
        assert!(!second.is_open());
    }
}
