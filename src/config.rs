use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_FPS: f64 = 5.0;
const DEFAULT_MOTION_THRESHOLD_PCT: f64 = 0.5;
const DEFAULT_CHUNK_SECS: u64 = 600;
const DEFAULT_CACHE_DIR: &str = "cache";
const DEFAULT_REMOTE_DIR: &str = "remote";
const DEFAULT_RESCAN_SECS: u64 = 30;
const DEFAULT_CHECK_SECS: u64 = 5;
const DEFAULT_CAPTURE_UNITS: u32 = 1;
const DEFAULT_CODECS: [&str; 2] = ["X264", "XVID"];

#[derive(Debug, Deserialize, Default)]
struct RecorderConfigFile {
    owner: Option<String>,
    fps: Option<f64>,
    motion_threshold_pct: Option<f64>,
    chunk_secs: Option<u64>,
    cache_dir: Option<PathBuf>,
    remote_dir: Option<PathBuf>,
    upload: Option<UploadConfigFile>,
    capture_units: Option<u32>,
    codecs: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default)]
struct UploadConfigFile {
    rescan_secs: Option<u64>,
    check_secs: Option<u64>,
}

/// Immutable process-wide configuration.
///
/// Constructed once at startup from an optional TOML file named by
/// `CAPSYNC_CONFIG` plus environment overrides; read-only thereafter.
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    /// Owner identity (employee/user label); names the remote subdirectory
    /// and is embedded in chunk file names.
    pub owner: String,
    /// Target sample rate in frames per second.
    pub fps: f64,
    /// Minimum percentage of changed pixels required to persist a frame.
    pub motion_threshold_pct: f64,
    /// Wall-clock duration of one chunk file.
    pub chunk_duration: Duration,
    /// Local cache root for in-progress and finalized chunks.
    pub cache_dir: PathBuf,
    /// Remote store root (e.g. a mounted network share).
    pub remote_dir: PathBuf,
    /// How often the sync worker rescans the cache and probes the network.
    pub rescan_interval: Duration,
    /// Sync worker cycle cadence (typically shorter than the rescan interval).
    pub check_interval: Duration,
    /// Number of capture units to enumerate with the built-in backend.
    pub capture_units: u32,
    /// Codec preference order handed to the encoder sink.
    pub codecs: Vec<String>,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            owner: default_owner(),
            fps: DEFAULT_FPS,
            motion_threshold_pct: DEFAULT_MOTION_THRESHOLD_PCT,
            chunk_duration: Duration::from_secs(DEFAULT_CHUNK_SECS),
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            remote_dir: PathBuf::from(DEFAULT_REMOTE_DIR),
            rescan_interval: Duration::from_secs(DEFAULT_RESCAN_SECS),
            check_interval: Duration::from_secs(DEFAULT_CHECK_SECS),
            capture_units: DEFAULT_CAPTURE_UNITS,
            codecs: DEFAULT_CODECS.iter().map(|c| c.to_string()).collect(),
        }
    }
}

impl RecorderConfig {
    /// Load the effective configuration: file (if `CAPSYNC_CONFIG` is set),
    /// then environment overrides, then validation.
    pub fn load() -> Result<Self> {
        let file_cfg = match std::env::var("CAPSYNC_CONFIG").ok().as_deref() {
            Some(path) if !path.trim().is_empty() => read_config_file(Path::new(path))?,
            _ => RecorderConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg);
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: RecorderConfigFile) -> Self {
        let defaults = Self::default();
        Self {
            owner: file.owner.unwrap_or(defaults.owner),
            fps: file.fps.unwrap_or(defaults.fps),
            motion_threshold_pct: file
                .motion_threshold_pct
                .unwrap_or(defaults.motion_threshold_pct),
            chunk_duration: file
                .chunk_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.chunk_duration),
            cache_dir: file.cache_dir.unwrap_or(defaults.cache_dir),
            remote_dir: file.remote_dir.unwrap_or(defaults.remote_dir),
            rescan_interval: file
                .upload
                .as_ref()
                .and_then(|u| u.rescan_secs)
                .map(Duration::from_secs)
                .unwrap_or(defaults.rescan_interval),
            check_interval: file
                .upload
                .as_ref()
                .and_then(|u| u.check_secs)
                .map(Duration::from_secs)
                .unwrap_or(defaults.check_interval),
            capture_units: file.capture_units.unwrap_or(defaults.capture_units),
            codecs: file.codecs.unwrap_or(defaults.codecs),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(owner) = non_empty_env("CAPSYNC_OWNER") {
            self.owner = owner;
        }
        if let Some(fps) = non_empty_env("CAPSYNC_FPS") {
            self.fps = fps
                .parse()
                .map_err(|_| anyhow!("CAPSYNC_FPS must be a number"))?;
        }
        if let Some(pct) = non_empty_env("CAPSYNC_MOTION_THRESHOLD") {
            self.motion_threshold_pct = pct
                .parse()
                .map_err(|_| anyhow!("CAPSYNC_MOTION_THRESHOLD must be a percentage"))?;
        }
        if let Some(secs) = non_empty_env("CAPSYNC_CHUNK_SECS") {
            self.chunk_duration = Duration::from_secs(
                secs.parse()
                    .map_err(|_| anyhow!("CAPSYNC_CHUNK_SECS must be an integer"))?,
            );
        }
        if let Some(dir) = non_empty_env("CAPSYNC_CACHE_DIR") {
            self.cache_dir = PathBuf::from(dir);
        }
        if let Some(dir) = non_empty_env("CAPSYNC_REMOTE_DIR") {
            self.remote_dir = PathBuf::from(dir);
        }
        if let Some(secs) = non_empty_env("CAPSYNC_RESCAN_SECS") {
            self.rescan_interval = Duration::from_secs(
                secs.parse()
                    .map_err(|_| anyhow!("CAPSYNC_RESCAN_SECS must be an integer"))?,
            );
        }
        if let Some(secs) = non_empty_env("CAPSYNC_CHECK_SECS") {
            self.check_interval = Duration::from_secs(
                secs.parse()
                    .map_err(|_| anyhow!("CAPSYNC_CHECK_SECS must be an integer"))?,
            );
        }
        if let Some(units) = non_empty_env("CAPSYNC_UNITS") {
            self.capture_units = units
                .parse()
                .map_err(|_| anyhow!("CAPSYNC_UNITS must be an integer"))?;
        }
        if let Some(codecs) = non_empty_env("CAPSYNC_CODECS") {
            let parsed = split_csv(&codecs);
            if !parsed.is_empty() {
                self.codecs = parsed;
            }
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.owner.trim().is_empty() {
            return Err(anyhow!("owner must not be empty"));
        }
        if self.owner.contains(['/', '\\']) || self.owner.contains("..") {
            // The owner names a remote subdirectory and is embedded in file
            // names; path separators would escape both.
            return Err(anyhow!("owner must not contain path separators"));
        }
        if !(self.fps > 0.0 && self.fps.is_finite()) {
            return Err(anyhow!("fps must be greater than zero"));
        }
        if !(0.0..=100.0).contains(&self.motion_threshold_pct) {
            return Err(anyhow!("motion threshold must be a percentage (0-100)"));
        }
        if self.chunk_duration.as_secs() == 0 {
            return Err(anyhow!("chunk duration must be at least one second"));
        }
        if self.rescan_interval.is_zero() || self.check_interval.is_zero() {
            return Err(anyhow!("upload intervals must be greater than zero"));
        }
        if self.capture_units == 0 {
            return Err(anyhow!("at least one capture unit is required"));
        }
        if self.codecs.is_empty() {
            return Err(anyhow!("codec preference list must not be empty"));
        }
        Ok(())
    }
}

fn default_owner() -> String {
    std::env::var("USERNAME")
        .or_else(|_| std::env::var("USER"))
        .unwrap_or_else(|_| "unknown_user".to_string())
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn read_config_file(path: &Path) -> Result<RecorderConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}
