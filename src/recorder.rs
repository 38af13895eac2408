//! Orchestrating state machine.
//!
//! Two long-lived tasks: this capture loop (strictly sequential across units
//! within one tick) and the sync worker. The capture task never touches the
//! network; the sync worker never touches an encoder. The only shared state
//! is the upload queue.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::capture::FrameSource;
use crate::config::RecorderConfig;
use crate::encoder::{RawSegmentFactory, SinkFactory};
use crate::frame::Frame;
use crate::motion::MotionGate;
use crate::session::SessionGate;
use crate::sync::{FsRemoteStore, RemoteStore, SyncSettings, SyncWorker, UploadQueue};
use crate::writer::ChunkWriter;
use crate::{StopFlag, UnitId};

/// Low-frequency poll while the session is locked.
const LOCK_POLL: Duration = Duration::from_secs(1);
/// Backoff when no capture unit initializes.
const INIT_BACKOFF: Duration = Duration::from_secs(5);
/// How long shutdown waits for the sync worker's final drain.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);
/// Status log cadence while recording.
const HEARTBEAT: Duration = Duration::from_secs(30);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RecorderState {
    WaitingForUnlock,
    Initializing,
    Recording,
    Paused,
    ShuttingDown,
}

/// Why the inner capture loop ended.
enum SessionEnd {
    Locked,
    AllUnitsFailed,
    Stopped,
}

/// Plugs in real unit discovery; the default enumerates the built-in
/// synthetic backend.
pub type UnitEnumerator = Box<dyn Fn(&RecorderConfig) -> Vec<Box<dyn FrameSource>> + Send>;

struct ActiveUnit {
    unit: UnitId,
    source: Box<dyn FrameSource>,
    writer: ChunkWriter,
    /// Last *persisted* frame; only advances when the motion gate retains.
    retained: Option<Frame>,
}

pub struct Recorder {
    config: RecorderConfig,
    gate: SessionGate,
    motion: MotionGate,
    queue: Arc<UploadQueue>,
    factory: Arc<dyn SinkFactory>,
    store: Arc<dyn RemoteStore>,
    enumerate: UnitEnumerator,
    state: RecorderState,
}

impl Recorder {
    pub fn new(
        config: RecorderConfig,
        gate: SessionGate,
        factory: Arc<dyn SinkFactory>,
        store: Arc<dyn RemoteStore>,
        enumerate: UnitEnumerator,
    ) -> Self {
        let motion = MotionGate::new(config.motion_threshold_pct);
        Self {
            config,
            gate,
            motion,
            queue: Arc::new(UploadQueue::new()),
            factory,
            store,
            enumerate,
            state: RecorderState::WaitingForUnlock,
        }
    }

    /// Default wiring: platform session probe, built-in encoder sink,
    /// filesystem remote store, synthetic unit enumeration.
    pub fn with_defaults(config: RecorderConfig) -> Self {
        let store = Arc::new(FsRemoteStore::new(config.remote_dir.clone()));
        Self::new(
            config,
            SessionGate::with_default_probe(),
            Arc::new(RawSegmentFactory),
            store,
            Box::new(crate::capture::enumerate_units),
        )
    }

    fn set_state(&mut self, state: RecorderState) {
        if self.state != state {
            log::info!("recorder state: {:?} -> {:?}", self.state, state);
            self.state = state;
        }
    }

    /// Run until the stop flag trips. Blocks the calling thread.
    pub fn run(mut self, stop: StopFlag) -> Result<()> {
        std::fs::create_dir_all(&self.config.cache_dir).with_context(|| {
            format!(
                "failed to create cache directory {}",
                self.config.cache_dir.display()
            )
        })?;
        let cache_dir = self
            .config
            .cache_dir
            .canonicalize()
            .context("failed to resolve cache directory")?;

        let sync_handle = SyncWorker::spawn(
            SyncSettings::from_config(&self.config, cache_dir.clone()),
            self.queue.clone(),
            self.store.clone(),
            stop.clone(),
        )?;

        while !stop.is_tripped() {
            if self.gate.is_locked() {
                self.set_state(RecorderState::WaitingForUnlock);
                log::info!("session locked, waiting for unlock");
                if !self.gate.block_until_unlocked(LOCK_POLL, &stop) {
                    break;
                }
                log::info!("session unlocked, resuming");
            }

            self.set_state(RecorderState::Initializing);
            let mut units = self.init_units(&cache_dir);
            if units.is_empty() {
                log::error!(
                    "no capture units available, retrying in {}s",
                    INIT_BACKOFF.as_secs()
                );
                if !stop.sleep_interruptible(INIT_BACKOFF) {
                    break;
                }
                continue;
            }

            self.set_state(RecorderState::Recording);
            log::info!("recording started ({} unit(s))", units.len());
            let end = self.capture_loop(&mut units, &stop);

            self.set_state(RecorderState::Paused);
            self.cleanup(units);

            if matches!(end, SessionEnd::AllUnitsFailed)
                && !stop.sleep_interruptible(INIT_BACKOFF)
            {
                break;
            }
        }

        self.set_state(RecorderState::ShuttingDown);
        // The shared stop flag has already told the worker to finish its
        // final drain; bound how long we wait for it.
        sync_handle.join(SHUTDOWN_GRACE);
        log::info!("recorder stopped");
        Ok(())
    }

    /// Open a frame source + chunk writer pair per available unit. A unit
    /// that cannot produce a first frame is skipped; the others continue.
    fn init_units(&mut self, cache_dir: &PathBuf) -> Vec<ActiveUnit> {
        let sources = (self.enumerate)(&self.config);
        log::info!("detected {} capture unit(s)", sources.len());

        let mut units = Vec::new();
        for (index, mut source) in sources.into_iter().enumerate() {
            let unit = UnitId(index as u32);
            if let Err(e) = source.start(self.config.fps) {
                log::warn!("unit {unit}: failed to start, skipping: {e:#}");
                continue;
            }
            let Some(first) = source.latest_frame() else {
                log::warn!("unit {unit}: no first frame, skipping");
                source.stop();
                continue;
            };
            log::info!("unit {unit}: {}x{} ready", first.width(), first.height());

            let writer = ChunkWriter::new(
                unit,
                self.config.owner.clone(),
                cache_dir.clone(),
                self.config.chunk_duration,
                self.config.fps,
                first.size(),
                self.config.codecs.clone(),
                self.factory.clone(),
                self.queue.clone(),
            );
            units.push(ActiveUnit {
                unit,
                source,
                writer,
                retained: None,
            });
        }
        units
    }

    /// One recording session: tick at the target sample rate until the
    /// session locks, every unit fails, or a stop is requested.
    fn capture_loop(&mut self, units: &mut Vec<ActiveUnit>, stop: &StopFlag) -> SessionEnd {
        let tick = Duration::from_secs_f64(1.0 / self.config.fps);
        let mut last_heartbeat = Instant::now();

        while !stop.is_tripped() {
            let tick_start = Instant::now();

            // Lock check before any capture work; a locked session aborts
            // the tick immediately to force cleanup.
            if self.gate.is_locked() {
                log::info!("session locked, pausing capture");
                return SessionEnd::Locked;
            }

            let mut failed = Vec::new();
            for (index, active) in units.iter_mut().enumerate() {
                let Some(frame) = active.source.latest_frame() else {
                    continue;
                };
                if !self.motion.should_retain(&frame, active.retained.as_ref()) {
                    continue;
                }
                match active.writer.write_frame(&frame) {
                    Ok(Some(finalized)) => {
                        log::debug!(
                            "unit {}: rotated into new chunk (finalized {})",
                            active.unit,
                            finalized.path.display()
                        );
                        active.retained = Some(frame);
                    }
                    Ok(None) => {
                        active.retained = Some(frame);
                    }
                    Err(e) => {
                        // Fatal for this unit only; its partial chunk still
                        // gets finalized and delivered.
                        log::error!("unit {}: dropping after write error: {e:#}", active.unit);
                        failed.push(index);
                    }
                }
            }
            for index in failed.into_iter().rev() {
                let mut active = units.remove(index);
                if let Err(e) = active.writer.close() {
                    log::error!("unit {}: close failed: {e:#}", active.unit);
                }
                active.source.stop();
            }
            if units.is_empty() {
                log::error!("all capture units failed");
                return SessionEnd::AllUnitsFailed;
            }

            if last_heartbeat.elapsed() >= HEARTBEAT {
                log::debug!(
                    "recording: {} unit(s) active, {} upload(s) pending",
                    units.len(),
                    self.queue.pending_len()
                );
                last_heartbeat = Instant::now();
            }

            let elapsed = tick_start.elapsed();
            if elapsed < tick && !stop.sleep_interruptible(tick - elapsed) {
                return SessionEnd::Stopped;
            }
        }
        SessionEnd::Stopped
    }

    /// Finalize every writer (each enqueues its chunk) and stop every source.
    fn cleanup(&mut self, units: Vec<ActiveUnit>) {
        log::info!("finalizing {} unit(s)", units.len());
        for mut active in units {
            match active.writer.close() {
                Ok(Some(chunk)) => {
                    log::info!("unit {}: enqueued {}", active.unit, chunk.path.display())
                }
                Ok(None) => {}
                Err(e) => log::error!("unit {}: close failed: {e:#}", active.unit),
            }
            active.source.stop();
        }
    }
}
