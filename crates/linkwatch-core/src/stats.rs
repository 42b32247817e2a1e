//! Counters for what the watchdog has seen and written.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct LinkStats {
    heartbeats: AtomicU64,
    frames_echoed: AtomicU64,
    bytes_echoed: AtomicU64,
    framing_errors: AtomicU64,
    overruns: AtomicU64,
    breaks: AtomicU64,
    deferred_breaks: AtomicU64,
    recoveries_completed: AtomicU64,
    pulses_acknowledged: AtomicU64,
    pulses_missed: AtomicU64,
    pulses_ignored: AtomicU64,
    writes_dropped: AtomicU64,
}

/// Point-in-time copy of [`LinkStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub heartbeats: u64,
    pub frames_echoed: u64,
    pub bytes_echoed: u64,
    pub framing_errors: u64,
    pub overruns: u64,
    pub breaks: u64,
    pub deferred_breaks: u64,
    pub recoveries_completed: u64,
    pub pulses_acknowledged: u64,
    pub pulses_missed: u64,
    pub pulses_ignored: u64,
    pub writes_dropped: u64,
}

impl StatsSnapshot {
    /// Episodes resolved either way. Equals `recoveries_completed` when every
    /// episode produced exactly one resolution message.
    pub fn resolutions(&self) -> u64 {
        self.pulses_acknowledged.saturating_add(self.pulses_missed)
    }
}

fn bump(counter: &AtomicU64, by: u64) {
    counter.fetch_add(by, Ordering::Relaxed);
}

impl LinkStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_heartbeat(&self) {
        bump(&self.heartbeats, 1);
    }

    pub fn record_echo(&self, len: usize) {
        bump(&self.frames_echoed, 1);
        bump(&self.bytes_echoed, u64::try_from(len).unwrap_or(u64::MAX));
    }

    pub fn record_framing_error(&self) {
        bump(&self.framing_errors, 1);
    }

    pub fn record_overrun(&self) {
        bump(&self.overruns, 1);
    }

    pub fn record_break(&self) {
        bump(&self.breaks, 1);
    }

    pub fn record_deferred_break(&self) {
        bump(&self.deferred_breaks, 1);
    }

    pub fn record_recovery(&self) {
        bump(&self.recoveries_completed, 1);
    }

    pub fn record_pulse_acknowledged(&self) {
        bump(&self.pulses_acknowledged, 1);
    }

    pub fn record_pulse_missed(&self) {
        bump(&self.pulses_missed, 1);
    }

    pub fn record_pulse_ignored(&self) {
        bump(&self.pulses_ignored, 1);
    }

    pub fn record_write_dropped(&self) {
        bump(&self.writes_dropped, 1);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            heartbeats: load(&self.heartbeats),
            frames_echoed: load(&self.frames_echoed),
            bytes_echoed: load(&self.bytes_echoed),
            framing_errors: load(&self.framing_errors),
            overruns: load(&self.overruns),
            breaks: load(&self.breaks),
            deferred_breaks: load(&self.deferred_breaks),
            recoveries_completed: load(&self.recoveries_completed),
            pulses_acknowledged: load(&self.pulses_acknowledged),
            pulses_missed: load(&self.pulses_missed),
            pulses_ignored: load(&self.pulses_ignored),
            writes_dropped: load(&self.writes_dropped),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_records() {
        let stats = LinkStats::new();
        stats.record_echo(2);
        stats.record_echo(5);
        stats.record_pulse_acknowledged();
        stats.record_pulse_missed();

        let snap = stats.snapshot();
        assert_eq!(snap.frames_echoed, 2);
        assert_eq!(snap.bytes_echoed, 7);
        assert_eq!(snap.resolutions(), 2);
        assert_eq!(snap.breaks, 0);
    }

    #[test]
    fn snapshot_serializes() {
        let stats = LinkStats::new();
        stats.record_break();
        let json = serde_json::to_value(stats.snapshot()).unwrap();
        assert_eq!(json["breaks"], 1);
        assert_eq!(json["heartbeats"], 0);
    }
}
