//! Link state and the collaborator traits the watchdog drives.
//!
//! [`LinkState`] is shared between the handlers: the break-recovery sequence
//! and the pulse handler both race to clear `break_pending`, and the
//! heartbeat reads `enabled`. Every field is atomic so that race resolves
//! through a single compare-exchange instead of a lock.

use crate::error::Result;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};

/// Logic level on a digital line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Low,
    High,
}

/// Byte-oriented serial interface the watchdog supervises.
pub trait SerialLink: Send {
    fn set_enabled(&mut self, enabled: bool) -> Result<()>;

    /// Non-blocking read of whatever is buffered. May be empty.
    fn read_pending(&mut self) -> Result<Vec<u8>>;

    fn write(&mut self, bytes: &[u8]) -> Result<()>;
}

/// Output line used to hold the remote transmitter during recovery.
pub trait ControlPin: Send {
    fn set_level(&mut self, level: Level) -> Result<()>;
}

/// Step of the break-recovery sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum RecoveryPhase {
    #[default]
    Idle = 0,
    BreakDetected = 1,
    Disabling = 2,
    PinAsserted = 3,
    Recovering = 4,
    Reenabling = 5,
}

impl RecoveryPhase {
    pub fn from_raw(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Idle),
            1 => Some(Self::BreakDetected),
            2 => Some(Self::Disabling),
            3 => Some(Self::PinAsserted),
            4 => Some(Self::Recovering),
            5 => Some(Self::Reenabling),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::BreakDetected => "BreakDetected",
            Self::Disabling => "Disabling",
            Self::PinAsserted => "PinAsserted",
            Self::Recovering => "Recovering",
            Self::Reenabling => "Re-enabling",
        }
    }

    pub fn is_recovering(self) -> bool {
        !matches!(self, Self::Idle)
    }
}

impl fmt::Display for RecoveryPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
pub struct LinkState {
    enabled: AtomicBool,
    break_pending: AtomicBool,
    phase: AtomicU8,
    queued_breaks: AtomicU32,
}

impl LinkState {
    pub fn new() -> Self {
        Self {
            enabled: AtomicBool::new(true),
            break_pending: AtomicBool::new(false),
            phase: AtomicU8::new(RecoveryPhase::Idle as u8),
            queued_breaks: AtomicU32::new(0),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub(crate) fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    pub fn is_break_pending(&self) -> bool {
        self.break_pending.load(Ordering::Acquire)
    }

    pub(crate) fn raise_break_pending(&self) {
        self.break_pending.store(true, Ordering::Release);
    }

    /// Clears `break_pending` and reports whether this caller was the one to clear it.
    pub(crate) fn take_break_pending(&self) -> bool {
        self.break_pending
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn phase(&self) -> RecoveryPhase {
        RecoveryPhase::from_raw(self.phase.load(Ordering::Acquire)).unwrap_or_default()
    }

    pub(crate) fn set_phase(&self, phase: RecoveryPhase) {
        self.phase.store(phase as u8, Ordering::Release);
    }

    /// Moves `Idle -> BreakDetected`. Fails if an episode is already running.
    pub(crate) fn begin_episode(&self) -> std::result::Result<(), RecoveryPhase> {
        self.phase
            .compare_exchange(
                RecoveryPhase::Idle as u8,
                RecoveryPhase::BreakDetected as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map(|_| ())
            .map_err(|current| RecoveryPhase::from_raw(current).unwrap_or_default())
    }

    /// Queues one more episode behind the running one. Returns the queue depth.
    pub(crate) fn queue_break(&self) -> u32 {
        self.queued_breaks
            .fetch_add(1, Ordering::AcqRel)
            .saturating_add(1)
    }

    /// Takes one queued episode, if any.
    pub(crate) fn take_queued_break(&self) -> bool {
        self.queued_breaks
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok()
    }

    pub fn queued_breaks(&self) -> u32 {
        self.queued_breaks.load(Ordering::Acquire)
    }
}

impl Default for LinkState {
    fn default() -> Self {
        Self::new()
    }
}
