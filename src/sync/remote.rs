//! Remote store seam.
//!
//! The transfer algorithm is copy-verify-delete, never move-first: the local
//! copy only disappears after a size-verified remote copy exists. Every
//! failure mode maps to an explicit [`TransferOutcome`] variant so the
//! worker's retry policy is a pure function of the result.

use anyhow::Result;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Transient failure kinds. All of them leave the local file in place and
/// are retried on a later cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransientKind {
    NetworkUnavailable,
    PermissionDenied,
    /// Remote copy exists but its size differs; both copies are kept.
    SizeMismatch,
}

impl fmt::Display for TransientKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransientKind::NetworkUnavailable => write!(f, "network unavailable"),
            TransientKind::PermissionDenied => write!(f, "permission denied"),
            TransientKind::SizeMismatch => write!(f, "size mismatch after copy"),
        }
    }
}

/// Result of one transfer attempt.
#[derive(Clone, Debug)]
pub enum TransferOutcome {
    /// Size-verified remote copy exists; local copy deleted.
    Delivered,
    /// Local file no longer exists; treat as already handled.
    SourceVanished,
    /// Retry later; the local file is untouched.
    Transient(TransientKind),
    /// Not retryable at the head of the queue (e.g. unrepresentable name).
    /// The file stays on disk for a later rescan.
    Fatal(String),
}

/// Destination for finalized chunks. One owner subdirectory per identity.
pub trait RemoteStore: Send + Sync {
    /// Create/access the owner's directory. Doubles as the network
    /// availability probe: an error means the link is down.
    fn ensure_owner_dir(&self, owner: &str) -> Result<()>;

    /// Copy `src` under the owner's directory, verify sizes, delete the
    /// local copy on success.
    fn transfer(&self, src: &Path, owner: &str) -> TransferOutcome;
}

/// Filesystem-backed remote store (e.g. a mounted network share).
#[derive(Clone, Debug)]
pub struct FsRemoteStore {
    root: PathBuf,
}

impl FsRemoteStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn owner_dir(&self, owner: &str) -> PathBuf {
        self.root.join(owner)
    }
}

impl RemoteStore for FsRemoteStore {
    fn ensure_owner_dir(&self, owner: &str) -> Result<()> {
        fs::create_dir_all(self.owner_dir(owner))?;
        Ok(())
    }

    fn transfer(&self, src: &Path, owner: &str) -> TransferOutcome {
        if !src.exists() {
            return TransferOutcome::SourceVanished;
        }
        let Some(name) = src.file_name() else {
            return TransferOutcome::Fatal(format!("no file name in {}", src.display()));
        };

        let dir = self.owner_dir(owner);
        if let Err(e) = fs::create_dir_all(&dir) {
            return classify(e);
        }
        let dest = dir.join(name);

        if let Err(e) = fs::copy(src, &dest) {
            return classify(e);
        }

        let src_len = match fs::metadata(src) {
            Ok(meta) => meta.len(),
            Err(e) => return classify(e),
        };
        let dest_len = match fs::metadata(&dest) {
            Ok(meta) => meta.len(),
            Err(e) => return classify(e),
        };
        if src_len != dest_len {
            // Partial/corrupt copy. Keep both; never delete on mismatch.
            return TransferOutcome::Transient(TransientKind::SizeMismatch);
        }

        match fs::remove_file(src) {
            Ok(()) => TransferOutcome::Delivered,
            // Remote copy is verified; a failed local delete just means this
            // entry is retried (and re-verified) next cycle.
            Err(e) => classify(e),
        }
    }
}

fn classify(e: io::Error) -> TransferOutcome {
    match e.kind() {
        io::ErrorKind::PermissionDenied => {
            TransferOutcome::Transient(TransientKind::PermissionDenied)
        }
        _ => TransferOutcome::Transient(TransientKind::NetworkUnavailable),
    }
}
