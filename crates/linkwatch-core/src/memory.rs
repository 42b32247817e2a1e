//! In-memory collaborators, for tests and for running the watchdog without hardware.

use crate::clock::{Clock, ManualClock, Millis};
use crate::error::{LinkError, Result};
use crate::link::{ControlPin, Level, SerialLink};
use crate::transcript::{Direction, Transcript};
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug)]
struct LinkInner {
    enabled: bool,
    rx: Vec<u8>,
    writes: Vec<Vec<u8>>,
    dropped: usize,
    enable_log: Vec<(Millis, bool)>,
    transcript: Transcript,
    fail_writes: bool,
}

/// A [`SerialLink`] backed by shared buffers. Clones observe the same link.
///
/// Like a real interface, it silently drops writes while disabled.
#[derive(Debug, Clone)]
pub struct MemoryLink {
    clock: ManualClock,
    inner: Arc<Mutex<LinkInner>>,
}

impl MemoryLink {
    pub fn new(clock: ManualClock) -> Self {
        Self {
            clock,
            inner: Arc::new(Mutex::new(LinkInner {
                enabled: true,
                rx: Vec::new(),
                writes: Vec::new(),
                dropped: 0,
                enable_log: Vec::new(),
                transcript: Transcript::default(),
                fail_writes: false,
            })),
        }
    }

    /// Queues bytes as if the remote end had sent them.
    pub fn feed_rx(&self, bytes: &[u8]) {
        let at = self.clock.now();
        let mut inner = self.inner.lock();
        inner.rx.extend_from_slice(bytes);
        inner.transcript.push(at, Direction::Rx, bytes.to_vec());
    }

    /// Makes every subsequent write fail.
    pub fn fail_writes(&self, fail: bool) {
        self.inner.lock().fail_writes = fail;
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.lock().enabled
    }

    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.inner.lock().writes.clone()
    }

    pub fn output(&self) -> Vec<u8> {
        self.inner.lock().writes.concat()
    }

    pub fn output_string(&self) -> String {
        String::from_utf8_lossy(&self.output()).into_owned()
    }

    /// Output split into lines, without the trailing newline.
    pub fn lines(&self) -> Vec<String> {
        self.output_string().lines().map(str::to_owned).collect()
    }

    pub fn dropped_writes(&self) -> usize {
        self.inner.lock().dropped
    }

    /// Every enable/disable request with the time it happened.
    pub fn enable_log(&self) -> Vec<(Millis, bool)> {
        self.inner.lock().enable_log.clone()
    }

    pub fn transcript(&self) -> Transcript {
        self.inner.lock().transcript.clone()
    }

    pub fn clear_output(&self) {
        let mut inner = self.inner.lock();
        inner.writes.clear();
        inner.transcript.clear();
    }
}

impl SerialLink for MemoryLink {
    fn set_enabled(&mut self, enabled: bool) -> Result<()> {
        let at = self.clock.now();
        let mut inner = self.inner.lock();
        inner.enabled = enabled;
        inner.enable_log.push((at, enabled));
        Ok(())
    }

    fn read_pending(&mut self) -> Result<Vec<u8>> {
        let mut inner = self.inner.lock();
        if !inner.enabled {
            return Ok(Vec::new());
        }
        Ok(std::mem::take(&mut inner.rx))
    }

    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        let at = self.clock.now();
        let mut inner = self.inner.lock();
        if inner.fail_writes {
            return Err(LinkError::Disconnected);
        }
        if !inner.enabled {
            inner.dropped += 1;
            return Ok(());
        }
        inner.writes.push(bytes.to_vec());
        inner.transcript.push(at, Direction::Tx, bytes.to_vec());
        Ok(())
    }
}

/// A [`ControlPin`] that records each level it is driven to.
#[derive(Debug, Clone)]
pub struct MemoryPin {
    clock: ManualClock,
    levels: Arc<Mutex<Vec<(Millis, Level)>>>,
}

impl MemoryPin {
    pub fn new(clock: ManualClock) -> Self {
        Self {
            clock,
            levels: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn levels(&self) -> Vec<(Millis, Level)> {
        self.levels.lock().clone()
    }

    pub fn level(&self) -> Option<Level> {
        self.levels.lock().last().map(|(_, level)| *level)
    }
}

impl ControlPin for MemoryPin {
    fn set_level(&mut self, level: Level) -> Result<()> {
        let at = self.clock.now();
        self.levels.lock().push((at, level));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_writes_while_disabled() {
        let clock = ManualClock::new();
        let mut link = MemoryLink::new(clock.clone());
        link.set_enabled(false).unwrap();
        link.write(b"lost").unwrap();
        assert_eq!(link.dropped_writes(), 1);
        assert!(link.output().is_empty());

        clock.set(7);
        link.set_enabled(true).unwrap();
        link.write(b"kept\n").unwrap();
        assert_eq!(link.lines(), vec!["kept".to_owned()]);
        assert_eq!(link.enable_log(), vec![(0, false), (7, true)]);
    }

    #[test]
    fn read_pending_takes_buffer() {
        let mut link = MemoryLink::new(ManualClock::new());
        link.feed_rx(&[1, 2]);
        link.feed_rx(&[3]);
        assert_eq!(link.read_pending().unwrap(), vec![1, 2, 3]);
        assert!(link.read_pending().unwrap().is_empty());
    }

    #[test]
    fn pin_records_timestamps() {
        let clock = ManualClock::new();
        let mut pin = MemoryPin::new(clock.clone());
        clock.set(1);
        pin.set_level(Level::Low).unwrap();
        clock.set(5001);
        pin.set_level(Level::High).unwrap();
        assert_eq!(pin.levels(), vec![(1, Level::Low), (5001, Level::High)]);
        assert_eq!(pin.level(), Some(Level::High));
    }
}
