//! End-to-end sync worker properties: at-least-once delivery, no premature
//! deletion, priority ordering.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::Result;

use capsync::{
    FsRemoteStore, RemoteStore, StopFlag, SyncSettings, SyncWorker, TransferOutcome,
    TransientKind, UploadQueue,
};

fn settings(cache: &Path) -> SyncSettings {
    SyncSettings {
        cache_dir: cache.to_path_buf(),
        owner: "alice".to_string(),
        check_interval: Duration::from_millis(10),
        rescan_interval: Duration::from_millis(20),
    }
}

fn wait_until(deadline: Duration, mut done: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if done() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    false
}

/// Fails the first N transfers, then delegates to the real store.
struct FlakyStore {
    inner: FsRemoteStore,
    failures_left: AtomicUsize,
}

impl RemoteStore for FlakyStore {
    fn ensure_owner_dir(&self, owner: &str) -> Result<()> {
        self.inner.ensure_owner_dir(owner)
    }

    fn transfer(&self, src: &Path, owner: &str) -> TransferOutcome {
        if self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return TransferOutcome::Transient(TransientKind::NetworkUnavailable);
        }
        self.inner.transfer(src, owner)
    }
}

/// Copies, then corrupts the remote copy so size verification always fails.
struct CorruptingStore {
    inner: FsRemoteStore,
    remote_root: PathBuf,
}

impl RemoteStore for CorruptingStore {
    fn ensure_owner_dir(&self, owner: &str) -> Result<()> {
        self.inner.ensure_owner_dir(owner)
    }

    fn transfer(&self, src: &Path, owner: &str) -> TransferOutcome {
        let Some(name) = src.file_name() else {
            return TransferOutcome::Fatal("no name".into());
        };
        let dest = self.remote_root.join(owner).join(name);
        if std::fs::create_dir_all(dest.parent().unwrap()).is_err() {
            return TransferOutcome::Transient(TransientKind::NetworkUnavailable);
        }
        // Simulate a partial copy.
        if std::fs::write(&dest, b"trunc").is_err() {
            return TransferOutcome::Transient(TransientKind::NetworkUnavailable);
        }
        TransferOutcome::Transient(TransientKind::SizeMismatch)
    }
}

#[test]
fn finalized_chunk_is_eventually_delivered_despite_outages() {
    let cache = tempfile::tempdir().unwrap();
    let remote = tempfile::tempdir().unwrap();

    let src = cache.path().join("0-100-200-alice.mkv");
    std::fs::write(&src, b"chunk payload").unwrap();

    let queue = Arc::new(UploadQueue::new());
    queue.mark_complete(&src, &src);

    let store = Arc::new(FlakyStore {
        inner: FsRemoteStore::new(remote.path().to_path_buf()),
        failures_left: AtomicUsize::new(5),
    });

    let stop = StopFlag::new();
    let handle = SyncWorker::spawn(
        settings(cache.path()),
        queue.clone(),
        store,
        stop.clone(),
    )
    .unwrap();

    let dest = remote.path().join("alice").join("0-100-200-alice.mkv");
    assert!(
        wait_until(Duration::from_secs(10), || !src.exists() && dest.exists()),
        "chunk was not delivered"
    );
    assert_eq!(std::fs::read(&dest).unwrap(), b"chunk payload");
    assert_eq!(queue.pending_len(), 0);

    stop.trip();
    handle.join(Duration::from_secs(5));
}

#[test]
fn local_file_survives_corrupted_copies() {
    let cache = tempfile::tempdir().unwrap();
    let remote = tempfile::tempdir().unwrap();

    let src = cache.path().join("0-100-200-alice.mkv");
    std::fs::write(&src, b"precious payload").unwrap();

    let queue = Arc::new(UploadQueue::new());
    queue.mark_complete(&src, &src);

    let store = Arc::new(CorruptingStore {
        inner: FsRemoteStore::new(remote.path().to_path_buf()),
        remote_root: remote.path().to_path_buf(),
    });

    let stop = StopFlag::new();
    let handle = SyncWorker::spawn(
        settings(cache.path()),
        queue.clone(),
        store,
        stop.clone(),
    )
    .unwrap();

    // Give the worker many cycles to (not) delete the local copy.
    std::thread::sleep(Duration::from_millis(500));
    assert!(src.exists(), "local file deleted despite size mismatch");
    assert_eq!(std::fs::read(&src).unwrap(), b"precious payload");

    stop.trip();
    handle.join(Duration::from_secs(5));
    // The final drain must not delete it either.
    assert!(src.exists());
}

#[test]
fn rescan_discovers_orphans_and_delivers_them() {
    let cache = tempfile::tempdir().unwrap();
    let remote = tempfile::tempdir().unwrap();

    // Orphans from a "crashed run": one finalized, one stuck under its temp
    // name. Nothing ever calls mark_complete for them.
    let finalized = cache.path().join("0-100-200-alice.mkv");
    std::fs::write(&finalized, b"finalized").unwrap();
    let stuck_temp = cache.path().join("open-1-300-alice.mkv");
    std::fs::write(&stuck_temp, b"temp-named").unwrap();
    // Foreign files stay put.
    let log_file = cache.path().join("recorder.log");
    std::fs::write(&log_file, b"log").unwrap();

    let queue = Arc::new(UploadQueue::new());
    let store = Arc::new(FsRemoteStore::new(remote.path().to_path_buf()));

    let stop = StopFlag::new();
    let handle = SyncWorker::spawn(
        settings(cache.path()),
        queue.clone(),
        store,
        stop.clone(),
    )
    .unwrap();

    let owner_dir = remote.path().join("alice");
    assert!(
        wait_until(Duration::from_secs(10), || {
            owner_dir.join("0-100-200-alice.mkv").exists()
                && owner_dir.join("open-1-300-alice.mkv").exists()
        }),
        "orphans were not delivered"
    );
    assert!(!finalized.exists());
    assert!(!stuck_temp.exists());
    assert!(log_file.exists());

    stop.trip();
    handle.join(Duration::from_secs(5));
}

#[test]
fn stop_triggers_final_drain_of_entire_backlog() {
    let cache = tempfile::tempdir().unwrap();
    let remote = tempfile::tempdir().unwrap();

    let queue = Arc::new(UploadQueue::new());
    let mut sources = Vec::new();
    for i in 0..4 {
        let src = cache.path().join(format!("0-{}-{}-alice.mkv", i * 100, i * 100 + 50));
        std::fs::write(&src, b"backlog").unwrap();
        queue.mark_complete(&src, &src);
        sources.push(src);
    }

    let store = Arc::new(FsRemoteStore::new(remote.path().to_path_buf()));
    let stop = StopFlag::new();
    // Long intervals: the loop itself would move at most one file per cycle,
    // so the full backlog clearing proves the shutdown drain ran.
    let mut cfg = settings(cache.path());
    cfg.check_interval = Duration::from_secs(60);
    cfg.rescan_interval = Duration::from_secs(60);

    let handle = SyncWorker::spawn(cfg, queue.clone(), store, stop.clone()).unwrap();
    // Let the first cycle probe the network, then stop immediately.
    std::thread::sleep(Duration::from_millis(100));
    stop.trip();
    handle.join(Duration::from_secs(10));

    for src in &sources {
        assert!(!src.exists(), "final drain left {} behind", src.display());
    }
    assert_eq!(queue.pending_len(), 0);
}

/// Delegates to the real store and records the delivery order.
struct RecordingStore {
    inner: FsRemoteStore,
    delivered: Mutex<Vec<String>>,
}

impl RemoteStore for RecordingStore {
    fn ensure_owner_dir(&self, owner: &str) -> Result<()> {
        self.inner.ensure_owner_dir(owner)
    }

    fn transfer(&self, src: &Path, owner: &str) -> TransferOutcome {
        let outcome = self.inner.transfer(src, owner);
        if matches!(outcome, TransferOutcome::Delivered) {
            if let Some(name) = src.file_name().and_then(|n| n.to_str()) {
                self.delivered.lock().unwrap().push(name.to_string());
            }
        }
        outcome
    }
}

#[test]
fn fresh_completions_upload_before_rescanned_backlog() {
    let cache = tempfile::tempdir().unwrap();
    let remote = tempfile::tempdir().unwrap();

    // Backlog from an earlier run, plus a chunk just finalized by a writer.
    let orphan = cache.path().join("0-100-200-alice.mkv");
    std::fs::write(&orphan, b"old backlog").unwrap();
    let fresh = cache.path().join("0-300-400-alice.mkv");
    std::fs::write(&fresh, b"just finalized").unwrap();

    let queue = Arc::new(UploadQueue::new());
    queue.mark_complete(&fresh, &fresh);

    let store = Arc::new(RecordingStore {
        inner: FsRemoteStore::new(remote.path().to_path_buf()),
        delivered: Mutex::new(Vec::new()),
    });

    let stop = StopFlag::new();
    let handle = SyncWorker::spawn(
        settings(cache.path()),
        queue.clone(),
        store.clone(),
        stop.clone(),
    )
    .unwrap();

    assert!(
        wait_until(Duration::from_secs(10), || !orphan.exists()
            && !fresh.exists()),
        "backlog was not delivered"
    );
    stop.trip();
    handle.join(Duration::from_secs(5));

    let order = store.delivered.lock().unwrap().clone();
    assert_eq!(
        order,
        vec![
            "0-300-400-alice.mkv".to_string(),
            "0-100-200-alice.mkv".to_string()
        ]
    );
}

#[test]
fn vanished_file_is_dropped_without_error() {
    let cache = tempfile::tempdir().unwrap();
    let remote = tempfile::tempdir().unwrap();

    let ghost = cache.path().join("0-100-200-alice.mkv");
    let queue = Arc::new(UploadQueue::new());
    queue.mark_complete(&ghost, &ghost);

    let store = Arc::new(FsRemoteStore::new(remote.path().to_path_buf()));
    let stop = StopFlag::new();
    let handle = SyncWorker::spawn(
        settings(cache.path()),
        queue.clone(),
        store,
        stop.clone(),
    )
    .unwrap();

    assert!(
        wait_until(Duration::from_secs(10), || queue.pending_len() == 0),
        "ghost entry was not dropped"
    );

    stop.trip();
    handle.join(Duration::from_secs(5));
}
