//! Local-cache to remote-store synchronization.
//!
//! Three pieces:
//! - [`UploadQueue`]: the in-flight set + pending list shared with the
//!   capture task (the only cross-task state in the process)
//! - [`RemoteStore`]: the copy-verify-delete transfer seam
//! - [`SyncWorker`]: the background loop that drives transfers
//!
//! Delivery is at-least-once: a local chunk file is deleted if and only if a
//! size-verified remote copy exists.

mod queue;
mod remote;
mod worker;

pub use queue::{DiscoveryOrigin, PendingUpload, UploadQueue};
pub use remote::{FsRemoteStore, RemoteStore, TransferOutcome, TransientKind};
pub use worker::{SyncHandle, SyncSettings, SyncWorker};
