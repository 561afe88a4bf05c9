// logscope - core/histogram.rs
//
// Approximate line-density histogram over time, built by sampling the line
// at every checkpoint of a line index instead of reading the whole file.

use crate::core::checkpoint::LineIndex;
use crate::core::model::{FileOptions, HistogramBucket};
use crate::core::parser::LineParser;
use crate::core::scanner::{LineSampler, ScanConfig};
use crate::util::error::Result;
use chrono::{DateTime, Duration, Utc};
use std::path::Path;

/// One checkpoint line and its parsed timestamp, if any.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub line_ordinal: u64,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Build a histogram of `num_buckets` equal time slices.
///
/// Returns `Ok(None)` when no histogram can be built: too few samples,
/// missing or decreasing timestamps at either end, or a zero time span.
/// Sparse samples can yield fewer than `num_buckets` buckets.
pub fn build_histogram(
    path: &Path,
    index: &LineIndex,
    num_buckets: usize,
    options: &FileOptions,
) -> Result<Option<Vec<HistogramBucket>>> {
    let parser = LineParser::from_options(options);
    let mut sampler = LineSampler::open(path, &ScanConfig::from(options))?;

    let mut samples = Vec::with_capacity(index.len());
    for checkpoint in index.iter() {
        let Some(raw) = sampler.line_at(checkpoint.position())? else {
            continue;
        };
        let line = parser.parse(raw);
        samples.push(Sample {
            line_ordinal: checkpoint.line_ordinal,
            timestamp: parser.timestamp_of(&line),
        });
    }

    let histogram = make_histogram(&samples, num_buckets);
    tracing::debug!(
        file = %path.display(),
        samples = samples.len(),
        requested = num_buckets,
        buckets = ?histogram.as_ref().map(Vec::len),
        "Histogram built"
    );
    Ok(histogram)
}

/// Seconds from `origin` to `t`, with millisecond precision.
fn seconds_since(origin: DateTime<Utc>, t: DateTime<Utc>) -> f64 {
    (t - origin).num_milliseconds() as f64 / 1000.0
}

fn at_offset(origin: DateTime<Utc>, seconds: f64) -> DateTime<Utc> {
    origin + Duration::milliseconds((seconds * 1000.0).round() as i64)
}

/// Interpolate bucket counts from ordered samples.
///
/// Each time a sample reaches the next bucket boundary, the line position
/// of the boundary is interpolated between that sample and the previous one,
/// and the bucket gets the line delta since the last boundary. The boundary
/// then jumps past the current sample, which is why gaps in the samples
/// merge buckets.
pub fn make_histogram(samples: &[Sample], num_buckets: usize) -> Option<Vec<HistogramBucket>> {
    if num_buckets == 0 || samples.len() < num_buckets {
        return None;
    }
    let origin = samples.first()?.timestamp?;
    let end = samples.last()?.timestamp?;
    let total = seconds_since(origin, end);
    if total <= 0.0 {
        return None;
    }

    let interval = total / num_buckets as f64;
    let mut next = interval;
    let mut start_count = 0.0;
    let mut histogram = Vec::with_capacity(num_buckets);

    for pair in samples.windows(2) {
        let (prev, current) = (&pair[0], &pair[1]);
        let Some(current_ts) = current.timestamp else {
            continue;
        };
        let current_t = seconds_since(origin, current_ts);
        if current_t < next {
            continue;
        }
        let Some(prev_ts) = prev.timestamp else {
            continue;
        };
        let prev_t = seconds_since(origin, prev_ts);

        let line_delta = current.line_ordinal as f64 - prev.line_ordinal as f64;
        let elapsed = current_t - prev_t;
        let adjustment = if elapsed > 0.0 {
            line_delta * (next - prev_t) / elapsed
        } else {
            line_delta
        };
        let end_count = prev.line_ordinal as f64 + adjustment;

        histogram.push(HistogramBucket {
            start_time: at_offset(origin, next - interval),
            end_time: at_offset(origin, next),
            approximate_line_count: end_count - start_count,
        });
        while current_t >= next {
            next += interval;
        }
        start_count = end_count;
    }

    Some(histogram)
}
