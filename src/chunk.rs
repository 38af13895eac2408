//! Chunk data model and on-disk naming convention.
//!
//! A chunk is one finite, contiguous capture segment materialized as a single
//! file in the local cache. Its lifecycle is reflected in its name:
//!
//! - in progress: `open-{unit}-{startEpoch}-{owner}.mkv` (invisible to the
//!   sync worker through the in-flight set)
//! - finalized:   `{unit}-{startEpoch}-{endEpoch}-{owner}.mkv`
//!
//! The rescan pattern matches both forms so that temp files orphaned by a
//! crash are still discovered and delivered on the next run.

use regex::Regex;
use std::path::PathBuf;
use std::sync::OnceLock;

use crate::UnitId;

pub const CHUNK_EXT: &str = "mkv";

const TEMP_PREFIX: &str = "open-";

/// Chunk lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChunkState {
    /// Encoder open, file under its temporary name.
    Recording,
    /// Encoder closed, renamed, enqueued for upload.
    Finalized,
    /// Verified copy exists remotely; local copy deleted.
    Uploaded,
}

/// Metadata for one chunk.
#[derive(Clone, Debug)]
pub struct ChunkMeta {
    pub unit: UnitId,
    pub owner: String,
    pub start_epoch: u64,
    /// Unset while the chunk is still open.
    pub end_epoch: Option<u64>,
    pub path: PathBuf,
    pub state: ChunkState,
}

/// Temporary name for an in-progress chunk.
pub fn temp_file_name(unit: UnitId, start_epoch: u64, owner: &str) -> String {
    format!("{TEMP_PREFIX}{unit}-{start_epoch}-{owner}.{CHUNK_EXT}")
}

/// Final name for a finalized chunk.
pub fn final_file_name(unit: UnitId, start_epoch: u64, end_epoch: u64, owner: &str) -> String {
    format!("{unit}-{start_epoch}-{end_epoch}-{owner}.{CHUNK_EXT}")
}

fn final_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(\d+)-(\d+)-(\d+)-(.+)\.mkv$").expect("final chunk name regex")
    })
}

fn temp_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^open-(\d+)-(\d+)-(.+)\.mkv$").expect("temp chunk name regex"))
}

/// Does this file name belong to the recorder, in either lifecycle form?
///
/// Used by the cache rescan; anything else in the cache directory (logs,
/// foreign files) is ignored.
pub fn is_chunk_file(name: &str) -> bool {
    temp_name_re().is_match(name) || final_name_re().is_match(name)
}

/// Parse a finalized chunk name back into `(unit, start, end, owner)`.
pub fn parse_final_name(name: &str) -> Option<(UnitId, u64, u64, String)> {
    let caps = final_name_re().captures(name)?;
    let unit = caps[1].parse().ok()?;
    let start = caps[2].parse().ok()?;
    let end = caps[3].parse().ok()?;
    Some((UnitId(unit), start, end, caps[4].to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_and_final_names_are_distinct() {
        let temp = temp_file_name(UnitId(0), 1700000000, "alice");
        let fin = final_file_name(UnitId(0), 1700000000, 1700000600, "alice");
        assert_ne!(temp, fin);
        assert_eq!(temp, "open-0-1700000000-alice.mkv");
        assert_eq!(fin, "0-1700000000-1700000600-alice.mkv");
    }

    #[test]
    fn final_name_round_trips() {
        let name = final_file_name(UnitId(3), 100, 700, "bob.smith");
        let (unit, start, end, owner) = parse_final_name(&name).unwrap();
        assert_eq!(unit, UnitId(3));
        assert_eq!(start, 100);
        assert_eq!(end, 700);
        assert_eq!(owner, "bob.smith");
    }

    #[test]
    fn rescan_pattern_matches_both_lifecycle_forms() {
        assert!(is_chunk_file("open-1-1700000000-alice.mkv"));
        assert!(is_chunk_file("1-1700000000-1700000600-alice.mkv"));
    }

    #[test]
    fn rescan_pattern_ignores_foreign_files() {
        assert!(!is_chunk_file("recorder.log"));
        assert!(!is_chunk_file("notes.txt"));
        assert!(!is_chunk_file("1-abc-2-alice.mkv"));
        assert!(!is_chunk_file("1-2-3-alice.mp4"));
        assert!(!is_chunk_file(".mkv"));
    }

    #[test]
    fn temp_names_do_not_parse_as_final() {
        assert!(parse_final_name("open-1-1700000000-alice.mkv").is_none());
    }
}
