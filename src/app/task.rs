// logscope - app/task.rs
//
// Runs long engine scans (open, search scan) on a background thread and
// reports progress over an mpsc channel.
//
// Architecture:
//   - `TaskManager` lives on the caller's thread; `run_task` runs on a worker.
//   - An `Arc<AtomicBool>` cancel flag is checked from the engine's progress
//     callback, which then returns `ScanControl::Stop`.
//   - All cross-thread communication is via `TaskProgress` channel messages.
//   - The worker owns its own file handle; nothing is shared across threads.

use crate::core::buffer::{self, OpenResult};
use crate::core::model::{FileOptions, FilterSpec, Progress, ScanControl};
use crate::core::search::{self, SearchIndex};
use crate::util::error::Result;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;

/// Progress callback handed to a job by the worker.
type ProgressSink<'a> = &'a mut dyn FnMut(Progress) -> ScanControl;

/// What a background task is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Open,
    Search,
}

/// Messages sent from the worker thread.
#[derive(Debug)]
pub enum TaskProgress {
    Started { kind: TaskKind, path: PathBuf },
    Progress(Progress),
    Opened(OpenResult),
    Searched(SearchIndex),
    Failed { error: String },
    Cancelled,
}

/// Runs at most one engine task at a time on a background thread.
pub struct TaskManager {
    /// Channel receiver for polling progress messages.
    pub progress_rx: Option<mpsc::Receiver<TaskProgress>>,

    /// Cancel flag shared with the background thread.
    cancel_flag: Option<Arc<AtomicBool>>,

    worker: Option<JoinHandle<()>>,
}

impl TaskManager {
    pub fn new() -> Self {
        Self {
            progress_rx: None,
            cancel_flag: None,
            worker: None,
        }
    }

    /// Start a full open scan of `path`. A running task is cancelled first.
    pub fn start_open(&mut self, path: PathBuf, window: usize, options: FileOptions) {
        self.spawn(TaskKind::Open, path, move |path, on_progress| {
            buffer::open_file(path, window, &options, on_progress).map(|result| {
                let complete = result.complete;
                (TaskProgress::Opened(result), complete)
            })
        });
    }

    /// Start a search scan of `path` for `filter`. A running task is
    /// cancelled first.
    pub fn start_search(&mut self, path: PathBuf, filter: FilterSpec, options: FileOptions) {
        self.spawn(TaskKind::Search, path, move |path, on_progress| {
            search::search_scan(path, &filter, &options, on_progress).map(|index| {
                let complete = index.complete;
                (TaskProgress::Searched(index), complete)
            })
        });
    }

    fn spawn<F>(&mut self, kind: TaskKind, path: PathBuf, job: F)
    where
        F: FnOnce(&Path, ProgressSink<'_>) -> Result<(TaskProgress, bool)> + Send + 'static,
    {
        self.cancel();
        self.join_worker();

        let (tx, rx) = mpsc::channel();
        let cancel = Arc::new(AtomicBool::new(false));

        self.progress_rx = Some(rx);
        self.cancel_flag = Some(Arc::clone(&cancel));

        tracing::info!(?kind, file = %path.display(), "Task started");
        self.worker = Some(std::thread::spawn(move || {
            run_task(kind, path, job, tx, cancel);
        }));
    }

    /// Request cancellation of the running task. The worker sends
    /// `TaskProgress::Cancelled` and exits.
    pub fn cancel(&mut self) {
        if let Some(flag) = &self.cancel_flag {
            flag.store(true, Ordering::SeqCst);
        }
        self.cancel_flag = None;
    }

    /// Poll for progress messages without blocking. Returns all pending messages.
    pub fn poll_progress(&self) -> Vec<TaskProgress> {
        let mut messages = Vec::new();
        if let Some(ref rx) = self.progress_rx {
            while let Ok(msg) = rx.try_recv() {
                messages.push(msg);
            }
        }
        messages
    }

    /// Block until the current task sends its final message, forwarding
    /// every message to `on_message`. Returns the final message.
    pub fn wait<F>(&mut self, mut on_message: F) -> Option<TaskProgress>
    where
        F: FnMut(&TaskProgress),
    {
        let rx = self.progress_rx.take()?;
        let mut last = None;
        for msg in rx.iter() {
            on_message(&msg);
            last = Some(msg);
        }
        self.join_worker();
        self.cancel_flag = None;
        last
    }

    fn join_worker(&mut self) {
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::warn!("Task worker panicked");
            }
        }
    }
}

impl Default for TaskManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Worker body: runs `job`, forwarding progress and honouring `cancel`.
fn run_task<F>(
    kind: TaskKind,
    path: PathBuf,
    job: F,
    tx: mpsc::Sender<TaskProgress>,
    cancel: Arc<AtomicBool>,
) where
    F: FnOnce(&Path, ProgressSink<'_>) -> Result<(TaskProgress, bool)>,
{
    if tx
        .send(TaskProgress::Started {
            kind,
            path: path.clone(),
        })
        .is_err()
    {
        return; // Receiver dropped; nobody is listening.
    }

    let mut on_progress = |progress: Progress| {
        if cancel.load(Ordering::SeqCst) {
            return ScanControl::Stop;
        }
        if tx.send(TaskProgress::Progress(progress)).is_err() {
            return ScanControl::Stop;
        }
        ScanControl::Continue
    };

    let outcome = job(&path, &mut on_progress);
    let message = match outcome {
        Ok((_, false)) if cancel.load(Ordering::SeqCst) => TaskProgress::Cancelled,
        Ok((message, complete)) => {
            if !complete {
                tracing::debug!(?kind, "Task stopped before completion");
            }
            message
        }
        Err(e) => {
            tracing::warn!(?kind, file = %path.display(), error = %e, "Task failed");
            TaskProgress::Failed {
                error: e.to_string(),
            }
        }
    };
    let _ = tx.send(message);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn big_file(lines: usize) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        for i in 0..lines {
            writeln!(f, "worker line {i} status={}", if i % 3 == 0 { "fail" } else { "ok" }).unwrap();
        }
        f.flush().unwrap();
        f
    }

    fn options() -> FileOptions {
        FileOptions {
            chunk_size: 1024,
            ..FileOptions::default()
        }
    }

    #[test]
    fn test_open_task_reports_progress_and_result() {
        let f = big_file(5_000);
        let mut manager = TaskManager::new();
        manager.start_open(f.path().to_path_buf(), 3, options());

        let mut progress_updates = 0;
        let mut started = false;
        let last = manager.wait(|msg| match msg {
            TaskProgress::Started { kind, .. } => {
                assert_eq!(*kind, TaskKind::Open);
                started = true;
            }
            TaskProgress::Progress(_) => progress_updates += 1,
            _ => {}
        });
        assert!(started);
        assert!(progress_updates > 0);
        match last {
            Some(TaskProgress::Opened(result)) => {
                assert!(result.complete);
                assert_eq!(result.line_count, 5_000);
                assert_eq!(result.lines.len(), 3);
            }
            other => panic!("expected Opened, got {other:?}"),
        }
    }

    #[test]
    fn test_search_task_counts_matches() {
        let f = big_file(3_000);
        let mut manager = TaskManager::new();
        manager.start_search(
            f.path().to_path_buf(),
            FilterSpec::new("status=fail", true),
            options(),
        );
        match manager.wait(|_| {}) {
            Some(TaskProgress::Searched(index)) => assert_eq!(index.match_count, 1_000),
            other => panic!("expected Searched, got {other:?}"),
        }
    }

    #[test]
    fn test_cancel_stops_running_task() {
        let f = big_file(200_000);
        let mut manager = TaskManager::new();
        manager.start_open(f.path().to_path_buf(), 0, options());
        // The receiver stays; the worker sees the flag at its next progress
        // callback.
        manager.cancel();
        let last = manager.wait(|_| {});
        assert!(matches!(last, Some(TaskProgress::Cancelled)), "got {last:?}");
    }

    #[test]
    fn test_restart_waits_for_previous_worker() {
        let finished = Arc::new(AtomicBool::new(false));
        let seen = Arc::clone(&finished);
        let mut manager = TaskManager::new();
        manager.spawn(TaskKind::Open, PathBuf::from("busy.log"), move |_, on_progress| {
            let tick = Progress {
                percent: 0.0,
                count: 0,
            };
            while !on_progress(tick).is_stop() {
                std::thread::sleep(std::time::Duration::from_millis(1));
            }
            std::thread::sleep(std::time::Duration::from_millis(50));
            seen.store(true, Ordering::SeqCst);
            Ok((TaskProgress::Cancelled, false))
        });

        let f = big_file(3_000);
        manager.start_search(
            f.path().to_path_buf(),
            FilterSpec::new("status=fail", true),
            options(),
        );
        assert!(finished.load(Ordering::SeqCst));

        let mut kinds = Vec::new();
        let last = manager.wait(|msg| {
            if let TaskProgress::Started { kind, .. } = msg {
                kinds.push(*kind);
            }
        });
        assert_eq!(kinds, [TaskKind::Search]);
        match last {
            Some(TaskProgress::Searched(index)) => assert_eq!(index.match_count, 1_000),
            other => panic!("expected Searched, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_file_fails() {
        let mut manager = TaskManager::new();
        manager.start_open(PathBuf::from("/nonexistent/logscope/task.log"), 10, options());
        assert!(matches!(
            manager.wait(|_| {}),
            Some(TaskProgress::Failed { .. })
        ));
    }

    #[test]
    fn test_wait_without_task_is_none() {
        let mut manager = TaskManager::default();
        assert!(manager.wait(|_| {}).is_none());
        assert!(manager.poll_progress().is_empty());
    }
}
