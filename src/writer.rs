//! Per-unit chunk rotation.
//!
//! One `ChunkWriter` exclusively owns one capture unit's encoder. It opens
//! chunks on demand, rotates them when the configured duration elapses, and
//! finalizes them into the sync worker's queue. Rotation finalizes the old
//! chunk and opens the next one *before* writing the incoming frame, so no
//! frame is ever dropped across a boundary.

use anyhow::{anyhow, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::chunk::{self, ChunkMeta, ChunkState};
use crate::encoder::{EncoderSink, SinkFactory};
use crate::frame::Frame;
use crate::sync::UploadQueue;
use crate::{now_s, UnitId};

pub struct ChunkWriter {
    unit: UnitId,
    owner: String,
    cache_dir: PathBuf,
    chunk_duration: Duration,
    fps: f64,
    frame_size: (u32, u32),
    codecs: Vec<String>,
    factory: Arc<dyn SinkFactory>,
    queue: Arc<UploadQueue>,
    open: Option<OpenChunk>,
}

struct OpenChunk {
    sink: Box<dyn EncoderSink>,
    path: PathBuf,
    start_epoch: u64,
    started: Instant,
    frames: u64,
}

impl ChunkWriter {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        unit: UnitId,
        owner: String,
        cache_dir: PathBuf,
        chunk_duration: Duration,
        fps: f64,
        frame_size: (u32, u32),
        codecs: Vec<String>,
        factory: Arc<dyn SinkFactory>,
        queue: Arc<UploadQueue>,
    ) -> Self {
        Self {
            unit,
            owner,
            cache_dir,
            chunk_duration,
            fps,
            frame_size,
            codecs,
            factory,
            queue,
            open: None,
        }
    }

    /// Write one frame, rotating first if the open chunk has reached its
    /// duration. Returns the finalized chunk when a rotation (or first-open
    /// after a failure) completed one.
    pub fn write_frame(&mut self, frame: &Frame) -> Result<Option<ChunkMeta>> {
        let mut finalized = None;
        match &self.open {
            None => self.open_chunk()?,
            Some(open) if open.started.elapsed() >= self.chunk_duration => {
                finalized = self.finalize_open()?;
                self.open_chunk()?;
            }
            Some(_) => {}
        }

        let open = self
            .open
            .as_mut()
            .ok_or_else(|| anyhow!("no open chunk after open"))?;
        open.sink.write_frame(frame)?;
        open.frames += 1;
        Ok(finalized)
    }

    /// Finalize any open chunk (shutdown or pause).
    pub fn close(&mut self) -> Result<Option<ChunkMeta>> {
        self.finalize_open()
    }

    fn open_chunk(&mut self) -> Result<()> {
        let start_epoch = now_s()?;
        let path = self
            .cache_dir
            .join(chunk::temp_file_name(self.unit, start_epoch, &self.owner));

        // Register before the file exists so a rescan can never observe a
        // recording chunk.
        self.queue.mark_recording(&path);
        let sink = match self
            .factory
            .open(&path, &self.codecs, self.fps, self.frame_size)
        {
            Ok(sink) => sink,
            Err(e) => {
                self.queue.abandon_recording(&path);
                return Err(e);
            }
        };

        log::info!("unit {}: started chunk {}", self.unit, path.display());
        self.open = Some(OpenChunk {
            sink,
            path,
            start_epoch,
            started: Instant::now(),
            frames: 0,
        });
        Ok(())
    }

    fn finalize_open(&mut self) -> Result<Option<ChunkMeta>> {
        let Some(open) = self.open.take() else {
            return Ok(None);
        };

        // The bytes are on disk either way; a finish error must not prevent
        // the chunk from being enqueued.
        if let Err(e) = open.sink.finish() {
            log::error!("unit {}: encoder finish failed: {e:#}", self.unit);
        }

        let end_epoch = now_s()?;
        let final_path = self.cache_dir.join(chunk::final_file_name(
            self.unit,
            open.start_epoch,
            end_epoch,
            &self.owner,
        ));

        let upload_path = match std::fs::rename(&open.path, &final_path) {
            Ok(()) => {
                log::info!(
                    "unit {}: finalized chunk {} ({} frames)",
                    self.unit,
                    final_path.display(),
                    open.frames
                );
                final_path
            }
            Err(e) => {
                // Naming convention violated for this one file, but delivery
                // still happens under the temp name.
                log::error!(
                    "unit {}: failed to rename chunk ({e}); uploading {} as-is",
                    self.unit,
                    open.path.display()
                );
                open.path.clone()
            }
        };

        self.queue.mark_complete(&open.path, &upload_path);

        Ok(Some(ChunkMeta {
            unit: self.unit,
            owner: self.owner.clone(),
            start_epoch: open.start_epoch,
            end_epoch: Some(end_epoch),
            path: upload_path,
            state: ChunkState::Finalized,
        }))
    }
}

impl Drop for ChunkWriter {
    fn drop(&mut self) {
        if self.open.is_some() {
            if let Err(e) = self.finalize_open() {
                log::error!("unit {}: finalize on drop failed: {e:#}", self.unit);
            }
        }
    }
}
