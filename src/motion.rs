//! Frame-admission filter.
//!
//! Decides whether a sampled frame is worth persisting by comparing it against
//! the last frame that was actually persisted. The caller contract matters:
//! the previous-frame reference must only advance on retained frames, so
//! static periods compress into nothing and playback fast-forwards through
//! them instead of freeze-framing.

use crate::frame::{luma, Frame};

/// Per-pixel luma difference below this counts as sensor/compression noise
/// (~10% of full range), not as change.
pub const NOISE_FLOOR: u8 = 25;

/// Decision function for persisting frames.
///
/// Stateless; the retained-frame reference lives with the caller (one per
/// capture unit).
#[derive(Clone, Copy, Debug)]
pub struct MotionGate {
    /// Minimum percentage of changed pixels required to retain a frame.
    threshold_pct: f64,
}

impl MotionGate {
    pub fn new(threshold_pct: f64) -> Self {
        Self { threshold_pct }
    }

    /// Should `current` be persisted, given the last *persisted* frame?
    ///
    /// - No previous frame: always retain, so every stream opens with a frame.
    /// - Dimension change: always retain; a resolution switch must not drop
    ///   frames.
    /// - Otherwise: fraction of pixels whose luma moved more than
    ///   [`NOISE_FLOOR`] must exceed the configured percentage.
    pub fn should_retain(&self, current: &Frame, previous: Option<&Frame>) -> bool {
        let Some(previous) = previous else {
            return true;
        };
        if current.size() != previous.size() {
            return true;
        }

        let changed = current
            .pixels()
            .zip(previous.pixels())
            .filter(|(c, p)| luma(c).abs_diff(luma(p)) > NOISE_FLOOR)
            .count();

        let change_pct = changed as f64 / current.pixel_count() as f64 * 100.0;
        change_pct > self.threshold_pct
    }
}
