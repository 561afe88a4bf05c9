// logscope - core/checkpoint.rs
//
// Sparse ordinal-indexed checkpoint index, shared by the buffer loader
// (keyed by line ordinal) and the search engine (keyed by match ordinal).
//
// Invariant: checkpoints strictly increase in both ordinal and byte offset.
// It is enforced when a list arrives from outside (deserialisation,
// `TryFrom`) and maintained by `CheckpointRecorder` during a scan.

use crate::core::model::{Position, RawLine};
use crate::util::error::IndexError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::marker::PhantomData;

/// Marker: ordinals count lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Lines;

/// Marker: ordinals count matches of one filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Matches;

/// Index of line checkpoints built by a full open scan.
pub type LineIndex = CheckpointIndex<Lines>;

/// Index of match checkpoints built by a search scan.
pub type MatchIndex = CheckpointIndex<Matches>;

/// A recorded resumption point.
///
/// `ordinal` is what the index is keyed on: the line ordinal in a
/// [`LineIndex`], the number of matches before this line in a [`MatchIndex`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub ordinal: u64,
    pub line_ordinal: u64,
    pub byte_offset: u64,
}

impl Checkpoint {
    /// Scanner start position for resuming at this checkpoint.
    pub fn position(&self) -> Position {
        Position {
            line_ordinal: self.line_ordinal,
            byte_offset: self.byte_offset,
        }
    }
}

/// Ordered, immutable sequence of checkpoints.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CheckpointIndex<K> {
    checkpoints: Vec<Checkpoint>,
    _kind: PhantomData<K>,
}

impl<K> CheckpointIndex<K> {
    /// An empty index: every lookup starts from the beginning of the file.
    pub fn empty() -> Self {
        Self {
            checkpoints: Vec::new(),
            _kind: PhantomData,
        }
    }

    pub fn len(&self) -> usize {
        self.checkpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checkpoints.is_empty()
    }

    pub fn as_slice(&self) -> &[Checkpoint] {
        &self.checkpoints
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Checkpoint> {
        self.checkpoints.iter()
    }

    /// The last checkpoint whose ordinal is strictly less than `target`.
    ///
    /// `None` means the scan has to start at offset 0.
    pub fn closest_before(&self, target: u64) -> Option<&Checkpoint> {
        let idx = self.checkpoints.partition_point(|cp| cp.ordinal < target);
        idx.checked_sub(1).map(|i| &self.checkpoints[i])
    }

    /// Where to start scanning to reach `target`: the closest preceding
    /// checkpoint, or the start of the file.
    pub fn start_for(&self, target: u64) -> Checkpoint {
        self.closest_before(target).copied().unwrap_or_default()
    }

    /// Append during a scan. A checkpoint with the same ordinal as the last
    /// one replaces it, keeping the furthest resumption point.
    fn record(&mut self, checkpoint: Checkpoint) {
        match self.checkpoints.last_mut() {
            Some(last) if last.ordinal == checkpoint.ordinal => {
                debug_assert!(last.byte_offset < checkpoint.byte_offset);
                *last = checkpoint;
            }
            Some(last) => {
                debug_assert!(
                    last.ordinal < checkpoint.ordinal && last.byte_offset < checkpoint.byte_offset
                );
                self.checkpoints.push(checkpoint);
            }
            None => self.checkpoints.push(checkpoint),
        }
    }
}

impl<K> TryFrom<Vec<Checkpoint>> for CheckpointIndex<K> {
    type Error = IndexError;

    fn try_from(checkpoints: Vec<Checkpoint>) -> Result<Self, Self::Error> {
        for (position, pair) in checkpoints.windows(2).enumerate() {
            if pair[1].ordinal <= pair[0].ordinal || pair[1].byte_offset <= pair[0].byte_offset {
                return Err(IndexError::NotIncreasing {
                    position: position + 1,
                });
            }
        }
        Ok(Self {
            checkpoints,
            _kind: PhantomData,
        })
    }
}

impl<K> Serialize for CheckpointIndex<K> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.checkpoints.serialize(serializer)
    }
}

impl<'de, K> Deserialize<'de> for CheckpointIndex<K> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let checkpoints = Vec::<Checkpoint>::deserialize(deserializer)?;
        Self::try_from(checkpoints).map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// Building during a scan
// =============================================================================

/// Throttle keyed on a monotonically increasing position (bytes or lines).
///
/// `tick` fires when the position has advanced by more than `interval`
/// since the last time it fired (initially position 0).
#[derive(Debug, Clone, Copy)]
pub struct Cadence {
    interval: f64,
    last: u64,
}

impl Cadence {
    pub fn new(interval: f64) -> Self {
        Self {
            interval: interval.max(0.0),
            last: 0,
        }
    }

    /// Spread `steps` ticks evenly across `total`.
    pub fn spread(total: u64, steps: f64) -> Self {
        Self::new(total as f64 / steps.max(1.0))
    }

    pub fn tick(&mut self, position: u64) -> bool {
        if position.saturating_sub(self.last) as f64 > self.interval {
            self.last = position;
            true
        } else {
            false
        }
    }
}

/// Samples checkpoints every `file_size / num_checkpoints` bytes of a full
/// forward scan from offset 0.
#[derive(Debug)]
pub struct CheckpointRecorder<K> {
    index: CheckpointIndex<K>,
    cadence: Cadence,
}

impl<K> CheckpointRecorder<K> {
    pub fn new(file_size: u64, num_checkpoints: usize) -> Self {
        Self {
            index: CheckpointIndex::empty(),
            cadence: Cadence::spread(file_size, num_checkpoints as f64),
        }
    }

    /// Offer the line about to be processed. `ordinal` is the index key as
    /// of the start of this line.
    pub fn observe(&mut self, ordinal: u64, line: &RawLine) {
        if self.cadence.tick(line.byte_offset) {
            self.index.record(Checkpoint {
                ordinal,
                line_ordinal: line.line_ordinal,
                byte_offset: line.byte_offset,
            });
        }
    }

    pub fn finish(self) -> CheckpointIndex<K> {
        self.index
    }
}
