//! Virtual-time timer queue driving the watchdog's suspension points.

use crate::clock::Millis;
use crate::dispatch::Context;
use std::cmp::Reverse;
use std::collections::BinaryHeap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Wake {
    Heartbeat,
    Recovery,
}

/// Receives wakes once their deadline has passed.
pub trait WakeHandler: Send + Sync {
    fn on_wake(&self, wake: Wake, cx: &mut Context<'_>);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Entry {
    at: Millis,
    seq: u64,
    wake: Wake,
}

#[derive(Debug, Default)]
pub struct Timers {
    queue: BinaryHeap<Reverse<Entry>>,
    seq: u64,
}

impl Timers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, at: Millis, wake: Wake) {
        let seq = self.seq;
        self.seq = self.seq.wrapping_add(1);
        self.queue.push(Reverse(Entry { at, seq, wake }));
    }

    pub fn next_deadline(&self) -> Option<Millis> {
        self.queue.peek().map(|Reverse(entry)| entry.at)
    }

    /// Pops the earliest wake due at or before `until`. Equal deadlines pop in scheduling order.
    pub fn pop_due(&mut self, until: Millis) -> Option<(Millis, Wake)> {
        match self.queue.peek() {
            Some(Reverse(entry)) if entry.at <= until => {
                let Reverse(entry) = self.queue.pop()?;
                Some((entry.at, entry.wake))
            }
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
