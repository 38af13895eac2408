//! capsyncd - chunked capture daemon
//!
//! This daemon:
//! 1. Waits out locked sessions, capturing only while the desktop is active
//! 2. Samples frames per capture unit and persists only frames with motion
//! 3. Rotates chunk files on a fixed duration into the local cache
//! 4. Uploads finalized chunks to the remote store in the background
//! 5. Survives offline stretches: undelivered chunks stay cached and are
//!    rediscovered on the next run

use anyhow::Result;

use capsync::{Recorder, RecorderConfig, StopFlag};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = RecorderConfig::load()?;
    log::info!("capsyncd v{}", env!("CARGO_PKG_VERSION"));
    log::info!("owner={}", config.owner);
    log::info!(
        "fps={}, motion_threshold={}%, chunk={}s",
        config.fps,
        config.motion_threshold_pct,
        config.chunk_duration.as_secs()
    );
    log::info!("cache={}", config.cache_dir.display());
    log::info!("remote={}", config.remote_dir.display());

    let stop = StopFlag::new();
    let handler_stop = stop.clone();
    ctrlc::set_handler(move || {
        log::info!("termination signal received");
        handler_stop.trip();
    })?;

    Recorder::with_defaults(config).run(stop)
}
