//! capsync - offline-tolerant chunked screen capture
//!
//! This crate records time-chunked capture files into a local cache and moves
//! them to a remote store in the background, without ever losing data or
//! blocking capture on network I/O.
//!
//! # Architecture
//!
//! Data flows one direction:
//!
//! frame source -> motion gate -> chunk writer -> (on rotation) sync worker -> remote store
//!
//! Session lock state and termination signals flow sideways into the
//! orchestrator, which starts and stops per-unit capture and ultimately drives
//! the sync worker's shutdown drain.
//!
//! # Module Structure
//!
//! - `capture`: frame sources (one per capture unit, e.g. one per monitor)
//! - `motion`: frame-admission filter (persist only frames with enough change)
//! - `encoder`: encoder/container seam consumed by the chunk writer
//! - `chunk`: chunk data model and the on-disk naming convention
//! - `writer`: per-unit chunk rotation state machine
//! - `session`: lock-screen gating
//! - `sync`: upload queue, remote store seam, and the background sync worker
//! - `recorder`: orchestrating state machine tying it all together

use anyhow::Result;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

pub mod capture;
pub mod chunk;
pub mod config;
pub mod encoder;
pub mod frame;
pub mod motion;
pub mod recorder;
pub mod session;
pub mod sync;
pub mod writer;

pub use capture::{enumerate_units, FrameSource, SyntheticConfig, SyntheticSource};
pub use chunk::{ChunkMeta, ChunkState};
pub use config::RecorderConfig;
pub use encoder::{raw_segment_frame_count, EncoderSink, RawSegmentFactory, SinkFactory};
pub use frame::Frame;
pub use motion::MotionGate;
pub use recorder::Recorder;
pub use session::{ManualProbe, SessionGate, SessionProbe, SessionState};
pub use sync::{
    DiscoveryOrigin, FsRemoteStore, PendingUpload, RemoteStore, SyncHandle, SyncSettings,
    SyncWorker, TransferOutcome, TransientKind, UploadQueue,
};
pub use writer::ChunkWriter;

/// Current wall-clock time in whole seconds since the Unix epoch.
pub fn now_s() -> Result<u64> {
    Ok(SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs())
}

/// Identifier of one capture unit (e.g. one monitor).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnitId(pub u32);

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Granularity of interruptible sleeps. Bounds how long any component keeps
/// sleeping after the stop flag trips.
const STOP_POLL: Duration = Duration::from_millis(50);

/// Shared cooperative cancellation token.
///
/// One flag is constructed at startup and handed to every long-lived
/// component; it is checked at the top of every loop iteration and at every
/// suspension point. There is no forced preemption.
#[derive(Clone, Debug, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trip(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_tripped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Sleep for `total`, waking early when the flag trips.
    ///
    /// Returns `false` if the sleep was interrupted (or the flag was already
    /// tripped), `true` if the full duration elapsed.
    pub fn sleep_interruptible(&self, total: Duration) -> bool {
        let deadline = Instant::now() + total;
        loop {
            if self.is_tripped() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::sleep(STOP_POLL.min(deadline - now));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_s_is_sane() {
        // 2020-01-01 as a lower bound.
        assert!(now_s().unwrap() > 1_577_836_800);
    }

    #[test]
    fn stop_flag_trips_once_and_stays() {
        let stop = StopFlag::new();
        assert!(!stop.is_tripped());
        stop.trip();
        assert!(stop.is_tripped());
        let clone = stop.clone();
        assert!(clone.is_tripped());
    }

    #[test]
    fn tripped_flag_interrupts_sleep() {
        let stop = StopFlag::new();
        stop.trip();
        let started = Instant::now();
        assert!(!stop.sleep_interruptible(Duration::from_secs(5)));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn sleep_runs_to_completion_when_untripped() {
        let stop = StopFlag::new();
        assert!(stop.sleep_interruptible(Duration::from_millis(20)));
    }

    #[test]
    fn sleep_wakes_on_trip_from_other_thread() {
        let stop = StopFlag::new();
        let tripper = stop.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(30));
            tripper.trip();
        });
        let started = Instant::now();
        assert!(!stop.sleep_interruptible(Duration::from_secs(10)));
        assert!(started.elapsed() < Duration::from_secs(5));
        handle.join().unwrap();
    }
}
