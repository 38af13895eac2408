//! Encoder/container seam.
//!
//! The real video encoder is an external collaborator; the chunk writer only
//! ever talks to [`EncoderSink`]. `RawSegmentSink` is the built-in
//! implementation: a minimal length-prefixed frame stream that keeps the
//! daemon and the tests runnable end to end without a codec library. A real
//! MKV encoder implements the same trait behind a [`SinkFactory`].

use anyhow::{anyhow, Context, Result};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::frame::Frame;

/// One open encoder instance writing a single chunk file.
pub trait EncoderSink: Send {
    fn write_frame(&mut self, frame: &Frame) -> Result<()>;

    /// Flush and close the file. Consumes the sink; a finished chunk is never
    /// written to again.
    fn finish(self: Box<Self>) -> Result<()>;
}

/// Opens encoder sinks. One factory serves every capture unit.
pub trait SinkFactory: Send + Sync {
    /// Open an encoder at `path`. Fails if no codec in the preference list is
    /// available; that failure is fatal for the capture unit, not the process.
    fn open(
        &self,
        path: &Path,
        codecs: &[String],
        fps: f64,
        frame_size: (u32, u32),
    ) -> Result<Box<dyn EncoderSink>>;
}

const RAW_SEGMENT_MAGIC: &[u8; 4] = b"CSR1";

/// Factory for [`RawSegmentSink`].
#[derive(Clone, Copy, Debug, Default)]
pub struct RawSegmentFactory;

impl SinkFactory for RawSegmentFactory {
    fn open(
        &self,
        path: &Path,
        codecs: &[String],
        fps: f64,
        frame_size: (u32, u32),
    ) -> Result<Box<dyn EncoderSink>> {
        if codecs.is_empty() {
            return Err(anyhow!("no codec available in preference list"));
        }
        Ok(Box::new(RawSegmentSink::create(path, fps, frame_size)?))
    }
}

/// Length-prefixed raw frame stream.
///
/// Layout: magic, width u32, height u32, fps f64 (all little-endian), then
/// one `u32` byte length + payload per frame.
pub struct RawSegmentSink {
    file: BufWriter<File>,
}

impl RawSegmentSink {
    fn create(path: &Path, fps: f64, frame_size: (u32, u32)) -> Result<Self> {
        let file = File::create(path)
            .with_context(|| format!("failed to create chunk file {}", path.display()))?;
        let mut file = BufWriter::new(file);
        file.write_all(RAW_SEGMENT_MAGIC)?;
        file.write_all(&frame_size.0.to_le_bytes())?;
        file.write_all(&frame_size.1.to_le_bytes())?;
        file.write_all(&fps.to_le_bytes())?;
        Ok(Self { file })
    }
}

impl EncoderSink for RawSegmentSink {
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        let bytes = frame.bytes();
        self.file.write_all(&(bytes.len() as u32).to_le_bytes())?;
        self.file.write_all(bytes)?;
        Ok(())
    }

    fn finish(mut self: Box<Self>) -> Result<()> {
        self.file.flush()?;
        self.file.get_ref().sync_all()?;
        Ok(())
    }
}

/// Count the frames in a raw segment file. Diagnostic helper; also used by
/// the rotation tests to prove no frame is lost or duplicated.
pub fn raw_segment_frame_count(path: &Path) -> Result<u64> {
    let file = File::open(path)
        .with_context(|| format!("failed to open segment {}", path.display()))?;
    let mut reader = BufReader::new(file);

    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    if &magic != RAW_SEGMENT_MAGIC {
        return Err(anyhow!("not a raw segment file: {}", path.display()));
    }
    // Skip width, height, fps.
    reader.seek(SeekFrom::Current(4 + 4 + 8))?;

    let mut count = 0u64;
    let mut len_buf = [0u8; 4];
    loop {
        match reader.read_exact(&mut len_buf) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        }
        let len = u32::from_le_bytes(len_buf) as i64;
        reader.seek(SeekFrom::Current(len))?;
        count += 1;
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(shade: u8) -> Frame {
        Frame::new(vec![shade; 4 * 4 * 3], 4, 4).unwrap()
    }

    #[test]
    fn empty_codec_list_fails_open() {
        let dir = tempfile::tempdir().unwrap();
        let err = RawSegmentFactory
            .open(&dir.path().join("x.mkv"), &[], 5.0, (4, 4))
            .err()
            .unwrap();
        assert!(err.to_string().contains("no codec"));
    }

    #[test]
    fn writes_and_counts_frames() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seg.mkv");
        let codecs = vec!["X264".to_string()];
        let mut sink = RawSegmentFactory.open(&path, &codecs, 5.0, (4, 4)).unwrap();
        for i in 0..3 {
            sink.write_frame(&frame(i)).unwrap();
        }
        sink.finish().unwrap();
        assert_eq!(raw_segment_frame_count(&path).unwrap(), 3);
    }

    #[test]
    fn rejects_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk.mkv");
        std::fs::write(&path, b"not a segment").unwrap();
        assert!(raw_segment_frame_count(&path).is_err());
    }
}
