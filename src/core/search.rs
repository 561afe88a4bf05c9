// logscope - core/search.rs
//
// Two-phase search. The scan phase counts matches of a filter over the
// whole file and records match checkpoints; the buffer phase loads a
// window of matches starting at any match ordinal.

use crate::core::buffer::{file_size, percent_of};
use crate::core::checkpoint::{Cadence, Checkpoint, CheckpointRecorder, MatchIndex, Matches};
use crate::core::matcher::LineMatcher;
use crate::core::model::{FileOptions, FilterSpec, ParsedLine, Progress, ScanControl};
use crate::core::parser::LineParser;
use crate::core::scanner::{scan_file, ScanConfig};
use crate::util::constants::{BUFFER_PROGRESS_STEPS, FULL_SCAN_PROGRESS_STEPS, MAX_WINDOW_LINES};
use crate::util::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Instant;

/// Match count and match checkpoints for one filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchIndex {
    /// The filter these checkpoints were recorded for.
    pub filter: FilterSpec,

    pub match_count: u64,

    pub checkpoints: MatchIndex,

    /// False when the scan was cancelled. The checkpoints are still valid
    /// for the part of the file that was read.
    pub complete: bool,
}

impl SearchIndex {
    /// An index with no checkpoints: buffer loads scan from the file start.
    pub fn empty(filter: FilterSpec) -> Self {
        Self {
            filter,
            match_count: 0,
            checkpoints: MatchIndex::empty(),
            complete: false,
        }
    }

    /// Where a buffer load for `filter` starting at match `target` resumes.
    /// Checkpoints recorded for a different filter are not used.
    fn start_for(&self, filter: &FilterSpec, target: u64) -> Checkpoint {
        if self.filter != *filter {
            tracing::warn!(
                requested = %filter.pattern,
                indexed = %self.filter.pattern,
                "Search index belongs to another filter; scanning from the start"
            );
            return Checkpoint::default();
        }
        self.checkpoints.start_for(target)
    }
}

/// A window of matching lines, each tagged with its match ordinal.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchBuffer {
    pub lines: Vec<ParsedLine>,
}

/// Count the matches of `filter` over the whole file and record match
/// checkpoints.
///
/// `on_progress` receives the matches found so far. Stopping from it
/// returns a partial index with `complete = false`.
pub fn search_scan<P>(
    path: &Path,
    filter: &FilterSpec,
    options: &FileOptions,
    mut on_progress: P,
) -> Result<SearchIndex>
where
    P: FnMut(Progress) -> ScanControl,
{
    let started = Instant::now();
    let file_size = file_size(path)?;
    let parser = LineParser::from_options(options);
    let matcher = LineMatcher::new(filter);
    let mut recorder = CheckpointRecorder::<Matches>::new(file_size, options.num_checkpoints);
    let mut progress = Cadence::spread(file_size, FULL_SCAN_PROGRESS_STEPS);
    let mut match_count = 0u64;

    let outcome = scan_file(path, None, &ScanConfig::from(options), |raw, _| {
        if progress.tick(raw.byte_offset) {
            let update = Progress {
                percent: percent_of(raw.byte_offset, file_size),
                count: match_count,
            };
            if on_progress(update).is_stop() {
                return ScanControl::Stop;
            }
        }
        recorder.observe(match_count, &raw);
        let line = parser.parse(raw);
        if matcher.is_match(&line.raw) {
            match_count += 1;
        }
        ScanControl::Continue
    })?;

    let complete = !outcome.stopped;
    let _ = on_progress(Progress {
        percent: if complete { 100.0 } else { percent_of(outcome.bytes_read, file_size) },
        count: match_count,
    });

    let checkpoints = recorder.finish();
    tracing::info!(
        file = %path.display(),
        pattern = %filter.pattern,
        case_sensitive = filter.case_sensitive,
        matches = match_count,
        checkpoints = checkpoints.len(),
        complete,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Search scan finished"
    );

    Ok(SearchIndex {
        filter: filter.clone(),
        match_count,
        checkpoints,
        complete,
    })
}

/// Load up to `window` matching lines starting at match ordinal
/// `start_match`.
///
/// The result is the same whether `index` is empty or fully populated;
/// checkpoints only shorten the scan.
pub fn search_buffer<P>(
    path: &Path,
    filter: &FilterSpec,
    start_match: u64,
    window: usize,
    index: &SearchIndex,
    options: &FileOptions,
    mut on_progress: P,
) -> Result<SearchBuffer>
where
    P: FnMut(Progress) -> ScanControl,
{
    let mut lines: Vec<ParsedLine> = Vec::with_capacity(window.min(MAX_WINDOW_LINES));
    if window == 0 {
        return Ok(SearchBuffer { lines });
    }

    let checkpoint = index.start_for(filter, start_match);
    let mut to_skip = start_match - checkpoint.ordinal;
    let mut progress = Cadence::spread(window as u64, BUFFER_PROGRESS_STEPS);
    let parser = LineParser::from_options(options);
    let matcher = LineMatcher::new(filter);

    tracing::debug!(
        file = %path.display(),
        pattern = %filter.pattern,
        start_match,
        window,
        checkpoint_match = checkpoint.ordinal,
        checkpoint_offset = checkpoint.byte_offset,
        "Loading search buffer"
    );

    scan_file(
        path,
        Some(checkpoint.position()),
        &ScanConfig::from(options),
        |raw, _| {
            let mut line = parser.parse(raw);
            if !matcher.is_match(&line.raw) {
                return ScanControl::Continue;
            }
            if to_skip > 0 {
                to_skip -= 1;
                return ScanControl::Continue;
            }
            line.match_ordinal = Some(start_match + lines.len() as u64);
            lines.push(line);
            if lines.len() >= window {
                return ScanControl::Stop;
            }
            if progress.tick(lines.len() as u64) {
                let update = Progress {
                    percent: percent_of(lines.len() as u64, window as u64),
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

    Ok(SearchBuffer { lines })
}
