//! Background sync worker.
//!
//! Independent loop on its own cadence. All remote I/O in the process happens
//! here; capture never blocks on the network. The worker is deliberately
//! bounded to one transfer attempt per cycle so a large backlog cannot wedge
//! a single cycle, and any transfer failure pessimistically marks the whole
//! link down until the next rescan re-probes it.
//!
//! Nothing is tracked only in memory: anything left unsent when the process
//! dies stays in the cache directory and is rediscovered by the rescan step
//! of the next run.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::config::RecorderConfig;
use crate::sync::queue::{PendingUpload, UploadQueue};
use crate::sync::remote::{RemoteStore, TransferOutcome};
use crate::StopFlag;

/// The slice of configuration the worker needs.
#[derive(Clone, Debug)]
pub struct SyncSettings {
    pub cache_dir: PathBuf,
    pub owner: String,
    /// Cycle cadence.
    pub check_interval: Duration,
    /// Cache rescan + network probe cadence.
    pub rescan_interval: Duration,
}

impl SyncSettings {
    pub fn from_config(config: &RecorderConfig, cache_dir: PathBuf) -> Self {
        Self {
            cache_dir,
            owner: config.owner.clone(),
            check_interval: config.check_interval,
            rescan_interval: config.rescan_interval,
        }
    }
}

pub struct SyncWorker;

impl SyncWorker {
    /// Start the worker thread. It runs until the stop flag trips, then
    /// performs one best-effort drain pass over everything still pending.
    pub fn spawn(
        settings: SyncSettings,
        queue: Arc<UploadQueue>,
        store: Arc<dyn RemoteStore>,
        stop: StopFlag,
    ) -> anyhow::Result<SyncHandle> {
        let join = std::thread::Builder::new()
            .name("capsync-sync".to_string())
            .spawn(move || run(settings, queue, store, stop))?;
        Ok(SyncHandle { join: Some(join) })
    }
}

pub struct SyncHandle {
    join: Option<JoinHandle<()>>,
}

impl SyncHandle {
    /// Wait up to `grace` for the final drain, then give up and leave the
    /// remainder on disk for the next run.
    pub fn join(mut self, grace: Duration) {
        let Some(join) = self.join.take() else {
            return;
        };
        let deadline = Instant::now() + grace;
        while !join.is_finished() {
            if Instant::now() >= deadline {
                log::warn!("sync worker still draining after grace period; leaving remaining files for next run");
                return;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        if join.join().is_err() {
            log::error!("sync worker thread panicked");
        }
    }
}

struct WorkerState {
    network_available: bool,
    last_rescan: Option<Instant>,
}

fn run(settings: SyncSettings, queue: Arc<UploadQueue>, store: Arc<dyn RemoteStore>, stop: StopFlag) {
    log::info!("sync worker started");
    let mut state = WorkerState {
        network_available: false,
        last_rescan: None,
    };

    while !stop.is_tripped() {
        // The worker must never die while files remain undelivered; any
        // unexpected error is logged and the loop continues.
        if let Err(e) = cycle(&settings, &queue, store.as_ref(), &mut state) {
            log::error!("sync cycle error: {e:#}");
        }
        stop.sleep_interruptible(settings.check_interval);
    }

    final_drain(&settings, &queue, store.as_ref());
    log::info!("sync worker stopped");
}

fn cycle(
    settings: &SyncSettings,
    queue: &UploadQueue,
    store: &dyn RemoteStore,
    state: &mut WorkerState,
) -> anyhow::Result<()> {
    // Priority completions arrive at the queue front as they are signaled;
    // there is no separate drain step.

    let rescan_due = state
        .last_rescan
        .map_or(true, |at| at.elapsed() >= settings.rescan_interval);
    if rescan_due {
        let added = queue.scan_and_enqueue(&settings.cache_dir)?;
        if added > 0 {
            log::info!("rescan found {added} orphaned chunk(s)");
        }
        state.last_rescan = Some(Instant::now());

        state.network_available = match store.ensure_owner_dir(&settings.owner) {
            Ok(()) => true,
            Err(e) => {
                log::debug!("cannot access remote store: {e:#}");
                false
            }
        };
        if !state.network_available && queue.pending_len() > 0 {
            log::debug!(
                "network unavailable, {} file(s) pending",
                queue.pending_len()
            );
        }
    }

    // At most one transfer per cycle.
    if state.network_available {
        if let Some(entry) = queue.next_pending() {
            if !attempt(settings, queue, store, entry) {
                // Assume the whole link is down; do not hammer it with the
                // rest of the backlog this tick.
                state.network_available = false;
            }
        }
    }
    Ok(())
}

/// Attempt one transfer. Returns `false` when the link should be considered
/// down.
fn attempt(
    settings: &SyncSettings,
    queue: &UploadQueue,
    store: &dyn RemoteStore,
    entry: PendingUpload,
) -> bool {
    let name = entry.path.display();
    match store.transfer(&entry.path, &settings.owner) {
        TransferOutcome::Delivered => {
            log::info!("uploaded and cleaned {name}");
            true
        }
        TransferOutcome::SourceVanished => {
            log::warn!("file disappeared before upload: {name}");
            true
        }
        TransferOutcome::Transient(kind) => {
            log::warn!("upload failed ({kind}): {name}; will retry");
            queue.requeue(entry);
            false
        }
        TransferOutcome::Fatal(msg) => {
            // Keep the file on disk but drop the queue entry so it cannot
            // wedge the head; the next rescan re-appends it behind the rest.
            log::error!("upload failed: {name}: {msg}");
            true
        }
    }
}

fn final_drain(settings: &SyncSettings, queue: &UploadQueue, store: &dyn RemoteStore) {
    let entries = queue.drain_pending();
    if entries.is_empty() {
        return;
    }
    log::info!("final sync: {} file(s) pending", entries.len());

    let mut remaining = Vec::new();
    for entry in entries {
        match store.transfer(&entry.path, &settings.owner) {
            TransferOutcome::Delivered => {
                log::info!("uploaded and cleaned {}", entry.path.display());
            }
            TransferOutcome::SourceVanished => {}
            TransferOutcome::Transient(kind) => {
                log::debug!("final sync skipped {} ({kind})", entry.path.display());
                remaining.push(entry);
            }
            TransferOutcome::Fatal(msg) => {
                log::error!("final sync failed {}: {msg}", entry.path.display());
                remaining.push(entry);
            }
        }
    }
    if !remaining.is_empty() {
        log::warn!(
            "{} file(s) remain in cache (will upload on next run)",
            remaining.len()
        );
        queue.restore(remaining);
    }
}
