//! Synthetic frame source.
//!
//! Produces a fixed noise background with a moving block splashed in every
//! `motion_every`-th frame, so the motion gate sees realistic quiet/busy
//! stretches without any real capture hardware.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::FrameSource;
use crate::frame::{Frame, BYTES_PER_PIXEL};
use anyhow::Result;

#[derive(Clone, Debug)]
pub struct SyntheticConfig {
    pub width: u32,
    pub height: u32,
    /// Inject a visible change every Nth frame; 0 disables injected motion.
    pub motion_every: u64,
    /// Seed for the background pattern, so units differ deterministically.
    pub seed: u64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            motion_every: 10,
            seed: 0,
        }
    }
}

pub struct SyntheticSource {
    config: SyntheticConfig,
    background: Vec<u8>,
    running: bool,
    counter: u64,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Self {
        let mut rng = StdRng::seed_from_u64(config.seed);
        let len = config.width as usize * config.height as usize * BYTES_PER_PIXEL;
        let background = (0..len).map(|_| rng.gen()).collect();
        Self {
            config,
            background,
            running: false,
            counter: 0,
        }
    }

    fn splash_block(&self, data: &mut [u8]) {
        let w = self.config.width as usize;
        let h = self.config.height as usize;
        let block_w = (w / 4).max(1);
        let block_h = (h / 4).max(1);
        // Walk the block across the surface as the counter advances.
        let x0 = (self.counter as usize * 7) % (w - block_w + 1);
        let y0 = (self.counter as usize * 3) % (h - block_h + 1);
        let shade = (self.counter % 2 * 255) as u8;
        for y in y0..y0 + block_h {
            let row = (y * w + x0) * BYTES_PER_PIXEL;
            data[row..row + block_w * BYTES_PER_PIXEL].fill(shade);
        }
    }
}

impl FrameSource for SyntheticSource {
    fn start(&mut self, _target_fps: f64) -> Result<()> {
        self.running = true;
        Ok(())
    }

    fn latest_frame(&mut self) -> Option<Frame> {
        if !self.running {
            return None;
        }
        self.counter += 1;
        let mut data = self.background.clone();
        if self.config.motion_every != 0 && self.counter % self.config.motion_every == 0 {
            self.splash_block(&mut data);
        }
        Frame::new(data, self.config.width, self.config.height).ok()
    }

    fn stop(&mut self) {
        self.running = false;
    }
}
