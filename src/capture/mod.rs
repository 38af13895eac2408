//! Frame sources.
//!
//! A capture unit is one independently captured surface (e.g. one monitor).
//! The pixel-capture mechanism itself lives behind [`FrameSource`]; this crate
//! ships the synthetic backend used by tests and headless runs, and a real
//! screen-capture backend plugs in behind the same trait.
//!
//! Sources hand out whole owned [`Frame`]s; nothing downstream holds a
//! reference into a source's internal buffers.

mod synthetic;

pub use synthetic::{SyntheticConfig, SyntheticSource};

use anyhow::Result;

use crate::config::RecorderConfig;
use crate::frame::Frame;

/// One capture unit's frame supplier.
pub trait FrameSource: Send {
    /// Begin capturing at roughly `target_fps`.
    fn start(&mut self, target_fps: f64) -> Result<()>;

    /// Most recent frame, if one is available. Non-blocking; `None` means
    /// nothing new this tick, which is not an error.
    fn latest_frame(&mut self) -> Option<Frame>;

    /// Stop capturing. Idempotent.
    fn stop(&mut self);
}

/// Enumerate the capture units available to this process.
///
/// The built-in backend materializes `config.capture_units` synthetic
/// sources; a platform backend replaces this with real display enumeration.
pub fn enumerate_units(config: &RecorderConfig) -> Vec<Box<dyn FrameSource>> {
    (0..config.capture_units)
        .map(|i| {
            Box::new(SyntheticSource::new(SyntheticConfig {
                seed: i as u64,
                ..SyntheticConfig::default()
            })) as Box<dyn FrameSource>
        })
        .collect()
}
