//! Session lock gating.
//!
//! Capture must pause while the interactive session is locked. The probe
//! itself is a small OS-specific seam; everything above it treats the state
//! as transient and re-derives it on every poll.
//!
//! An ambiguous probe result (`Unknown`) is treated as locked: recording
//! through a real lock is the worse failure mode, so the gate pauses until
//! the probe can answer definitively.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::StopFlag;

/// Interactive session state. Derived fresh on each poll, never persisted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Active,
    Locked,
    Unknown,
}

/// OS-specific lock query.
pub trait SessionProbe: Send {
    fn state(&self) -> SessionState;
}

/// Polls a [`SessionProbe`] and exposes the pause decision.
pub struct SessionGate {
    probe: Box<dyn SessionProbe>,
}

impl SessionGate {
    pub fn new(probe: Box<dyn SessionProbe>) -> Self {
        Self { probe }
    }

    /// Platform default: the input-desktop probe on Windows, always-active
    /// elsewhere (headless/dev runs).
    pub fn with_default_probe() -> Self {
        #[cfg(windows)]
        {
            Self::new(Box::new(InputDesktopProbe))
        }
        #[cfg(not(windows))]
        {
            Self::new(Box::new(AlwaysActiveProbe))
        }
    }

    /// Should capture be paused right now? `Unknown` counts as locked.
    pub fn is_locked(&self) -> bool {
        !matches!(self.probe.state(), SessionState::Active)
    }

    /// Poll until the session unlocks. Returns `false` if the stop flag
    /// tripped first.
    pub fn block_until_unlocked(&self, poll: Duration, stop: &StopFlag) -> bool {
        while self.is_locked() {
            if !stop.sleep_interruptible(poll) {
                return false;
            }
        }
        !stop.is_tripped()
    }
}

/// Probe for platforms without a lock concept (headless, CI).
pub struct AlwaysActiveProbe;

impl SessionProbe for AlwaysActiveProbe {
    fn state(&self) -> SessionState {
        SessionState::Active
    }
}

/// Externally driven probe; tests flip the flag to simulate lock/unlock.
#[derive(Clone, Default)]
pub struct ManualProbe {
    locked: Arc<AtomicBool>,
}

impl ManualProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle for flipping the lock state from another thread.
    pub fn handle(&self) -> Arc<AtomicBool> {
        self.locked.clone()
    }

    pub fn set_locked(&self, locked: bool) {
        self.locked.store(locked, Ordering::SeqCst);
    }
}

impl SessionProbe for ManualProbe {
    fn state(&self) -> SessionState {
        if self.locked.load(Ordering::SeqCst) {
            SessionState::Locked
        } else {
            SessionState::Active
        }
    }
}

/// Windows probe: the input desktop cannot be opened while the session is
/// locked.
#[cfg(windows)]
pub struct InputDesktopProbe;

#[cfg(windows)]
impl SessionProbe for InputDesktopProbe {
    fn state(&self) -> SessionState {
        use windows_sys::Win32::System::StationsAndDesktops::{
            CloseDesktop, OpenInputDesktop, DESKTOP_READOBJECTS,
        };
        // SAFETY: OpenInputDesktop returns either null or a desktop handle
        // that we close immediately; nothing else aliases it.
        unsafe {
            let desktop = OpenInputDesktop(0, 0, DESKTOP_READOBJECTS);
            if desktop == 0 {
                SessionState::Locked
            } else {
                CloseDesktop(desktop);
                SessionState::Active
            }
        }
    }
}
