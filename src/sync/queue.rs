//! Pending-upload queue and in-flight set.
//!
//! The only state shared between the capture task and the sync worker. Both
//! structures live behind a single mutex with insert/remove-only critical
//! sections; directory I/O happens before the lock is taken.
//!
//! Ordering rules:
//! - explicit completions go to the front (priority, preserves user-visible
//!   recency)
//! - rescan-discovered orphans append in modification-time order, oldest
//!   first (fairness for backlog left by a crashed run)

use anyhow::Result;
use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::SystemTime;

use crate::chunk;

/// How a pending file entered the queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DiscoveryOrigin {
    /// Explicit completion event from a chunk writer.
    Completion,
    /// Periodic directory rescan.
    Rescan,
}

#[derive(Clone, Debug)]
pub struct PendingUpload {
    pub path: PathBuf,
    pub origin: DiscoveryOrigin,
}

#[derive(Debug, Default)]
struct QueueState {
    /// Absolute paths currently being written; invisible to rescans.
    in_flight: HashSet<PathBuf>,
    pending: VecDeque<PendingUpload>,
}

impl QueueState {
    fn is_pending(&self, path: &Path) -> bool {
        self.pending.iter().any(|p| p.path == path)
    }
}

/// Mutex-guarded in-flight set + pending list.
///
/// Paths are compared verbatim; callers pass paths rooted at the same
/// canonicalized cache directory, so writer-registered paths and
/// scanner-discovered paths compare equal.
#[derive(Debug, Default)]
pub struct UploadQueue {
    state: Mutex<QueueState>,
}

impl UploadQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a file as being written. Must happen before the file is
    /// created so a rescan can never race the writer.
    pub fn mark_recording(&self, path: &Path) {
        let mut state = self.lock();
        state.in_flight.insert(path.to_path_buf());
    }

    /// Unregister a file that never produced data (encoder open failed).
    /// Nothing is enqueued.
    pub fn abandon_recording(&self, path: &Path) {
        let mut state = self.lock();
        state.in_flight.remove(path);
    }

    /// Mark `recorded` complete and enqueue `upload_as` at the front.
    ///
    /// The two differ only when the finalize rename failed and the chunk is
    /// uploaded under its temporary name. The file becomes scannable the
    /// moment this returns.
    pub fn mark_complete(&self, recorded: &Path, upload_as: &Path) {
        let mut state = self.lock();
        state.in_flight.remove(recorded);
        if !state.is_pending(upload_as) {
            state.pending.push_front(PendingUpload {
                path: upload_as.to_path_buf(),
                origin: DiscoveryOrigin::Completion,
            });
        }
    }

    /// Sweep `cache_dir` for chunk files missed by completion events (e.g.
    /// left behind by a crashed run) and append them oldest-first.
    ///
    /// Returns the number of newly enqueued files.
    pub fn scan_and_enqueue(&self, cache_dir: &Path) -> Result<usize> {
        // All directory I/O happens before the lock.
        let mut candidates: Vec<(PathBuf, SystemTime)> = Vec::new();
        let entries = match std::fs::read_dir(cache_dir) {
            Ok(entries) => entries,
            Err(_) => return Ok(0),
        };
        for entry in entries.flatten() {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !chunk::is_chunk_file(name) {
                continue;
            }
            let modified = entry
                .metadata()
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            candidates.push((path, modified));
        }
        candidates.sort_by_key(|(_, modified)| *modified);

        let mut state = self.lock();
        let mut added = 0;
        for (path, _) in candidates {
            if state.in_flight.contains(&path) || state.is_pending(&path) {
                continue;
            }
            state.pending.push_back(PendingUpload {
                path,
                origin: DiscoveryOrigin::Rescan,
            });
            added += 1;
        }
        Ok(added)
    }

    /// Pop the head of the queue (priority/oldest first). Popping is the
    /// implicit ack; a failed transfer is handed back via [`requeue`].
    ///
    /// [`requeue`]: UploadQueue::requeue
    pub fn next_pending(&self) -> Option<PendingUpload> {
        self.lock().pending.pop_front()
    }

    /// Return a failed entry to the head so it is retried first next cycle.
    pub fn requeue(&self, entry: PendingUpload) {
        self.lock().pending.push_front(entry);
    }

    /// Take the entire pending list (final shutdown drain).
    pub fn drain_pending(&self) -> Vec<PendingUpload> {
        self.lock().pending.drain(..).collect()
    }

    /// Restore entries in order after a partial drain.
    pub fn restore(&self, entries: Vec<PendingUpload>) {
        let mut state = self.lock();
        for entry in entries {
            state.pending.push_back(entry);
        }
    }

    pub fn pending_len(&self) -> usize {
        self.lock().pending.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, QueueState> {
        // A poisoned queue mutex means a panic mid-insert; the state is still
        // structurally sound, so keep going rather than wedging the pipeline.
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
