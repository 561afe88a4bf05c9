// logscope - app/index_cache.rs
//
// Persisted line indexes, so reopening a large file does not need another
// full scan.
//
// - Snapshots are saved atomically (write temp, rename) so a crash during
//   save never corrupts the previous good snapshot.
// - A snapshot is only accepted when it was built for the same path, size,
//   modification time, encoding and checkpoint density as the file on disk.
//   Anything else silently falls back to a fresh open scan.

use crate::core::checkpoint::LineIndex;
use crate::core::model::{Encoding, FileOptions};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

/// Increment whenever `IndexSnapshot` changes incompatibly. Snapshots with
/// another version are discarded.
pub const INDEX_CACHE_VERSION: u32 = 1;

/// A completed open scan, as stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSnapshot {
    pub version: u32,
    pub path: PathBuf,
    pub file_size: u64,
    pub modified: DateTime<Utc>,
    pub encoding: Encoding,
    pub num_checkpoints: usize,
    pub line_count: u64,

    /// Validated on load: a list that is not strictly increasing fails
    /// deserialisation and the snapshot is discarded.
    pub checkpoints: LineIndex,
}

/// Modification time of `path`, or `None` if the platform cannot tell.
pub fn modified_time(path: &Path) -> Option<DateTime<Utc>> {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .map(DateTime::<Utc>::from)
        .map_err(|e| {
            tracing::debug!(file = %path.display(), error = %e, "Cannot read modification time");
        })
        .ok()
}

/// Cache file for `log_path` inside `cache_dir`.
///
/// The name is a hash of the path; the full path is stored in the snapshot
/// and compared on load, so a collision is just a cache miss.
pub fn cache_path(cache_dir: &Path, log_path: &Path) -> PathBuf {
    let absolute = std::fs::canonicalize(log_path).unwrap_or_else(|_| log_path.to_path_buf());
    let mut hasher = DefaultHasher::new();
    absolute.hash(&mut hasher);
    cache_dir.join(format!("{:016x}.json", hasher.finish()))
}

/// Save `snapshot` to `path` atomically (write temp, then rename).
///
/// Creates parent directories as needed. The error string is meant for a
/// `warn!` call; callers log it and carry on.
pub fn save(snapshot: &IndexSnapshot, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            format!(
                "cannot create index cache directory '{}': {e}",
                parent.display()
            )
        })?;
    }

    let json = serde_json::to_string(snapshot)
        .map_err(|e| format!("failed to serialise line index: {e}"))?;

    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json.as_bytes())
        .map_err(|e| format!("failed to write index temp file '{}': {e}", tmp.display()))?;

    std::fs::rename(&tmp, path).map_err(|e| {
        let _ = std::fs::remove_file(&tmp);
        format!("failed to finalise index file '{}': {e}", path.display())
    })?;

    tracing::debug!(
        path = %path.display(),
        checkpoints = snapshot.checkpoints.len(),
        "Line index cached"
    );
    Ok(())
}

/// Load the snapshot at `path` if it still describes `log_path` as read with
/// `options`. Returns `None` on any mismatch or error.
pub fn load(path: &Path, log_path: &Path, options: &FileOptions) -> Option<IndexSnapshot> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::debug!(path = %path.display(), error = %e, "Cannot read index cache");
            }
        })
        .ok()?;

    let snapshot: IndexSnapshot = serde_json::from_str(&content)
        .map_err(|e| {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "Index cache is malformed; rescanning"
            );
        })
        .ok()?;

    if snapshot.version != INDEX_CACHE_VERSION {
        tracing::debug!(
            found = snapshot.version,
            expected = INDEX_CACHE_VERSION,
            "Index cache version mismatch"
        );
        return None;
    }

    let absolute = std::fs::canonicalize(log_path).unwrap_or_else(|_| log_path.to_path_buf());
    let size = std::fs::metadata(log_path).map(|m| m.len()).ok()?;
    let fresh = snapshot.path == absolute
        && snapshot.file_size == size
        && Some(snapshot.modified) == modified_time(log_path)
        && snapshot.encoding == options.encoding
        && snapshot.num_checkpoints == options.num_checkpoints;
    if !fresh {
        tracing::debug!(file = %log_path.display(), "Index cache is stale");
        return None;
    }
    Some(snapshot)
}

impl IndexSnapshot {
    /// Snapshot of a completed open of `log_path`, or `None` when its
    /// modification time is unavailable.
    pub fn capture(
        log_path: &Path,
        options: &FileOptions,
        file_size: u64,
        line_count: u64,
        checkpoints: LineIndex,
    ) -> Option<Self> {
        Some(Self {
            version: INDEX_CACHE_VERSION,
            path: std::fs::canonicalize(log_path).unwrap_or_else(|_| log_path.to_path_buf()),
            file_size,
            modified: modified_time(log_path)?,
            encoding: options.encoding,
            num_checkpoints: options.num_checkpoints,
            line_count,
            checkpoints,
        })
    }
}
