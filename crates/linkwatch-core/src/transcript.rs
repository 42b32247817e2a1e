use crate::clock::Millis;
use std::collections::VecDeque;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptEntry {
    pub at: Millis,
    pub direction: Direction,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Rx,
    Tx,
}

/// Bounded record of traffic on a link. Oldest entries are evicted first.
#[derive(Debug, Clone)]
pub struct Transcript {
    entries: VecDeque<TranscriptEntry>,
    max_entries: usize,
}

impl Transcript {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            max_entries,
        }
    }

    pub fn push(&mut self, at: Millis, direction: Direction, data: Vec<u8>) {
        self.entries.push_back(TranscriptEntry { at, direction, data });
        while self.entries.len() > self.max_entries {
            self.entries.pop_front();
        }
    }

    pub fn entries(&self) -> impl Iterator<Item = &TranscriptEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// All bytes in one direction, concatenated in order.
    pub fn bytes(&self, direction: Direction) -> Vec<u8> {
        self.entries
            .iter()
            .filter(|e| e.direction == direction)
            .flat_map(|e| e.data.iter().copied())
            .collect()
    }

    pub fn to_text(&self, show_timestamp: bool, show_hex: bool) -> String {
        let mut result = String::new();
        for entry in &self.entries {
            if show_timestamp {
                let secs = entry.at / 1000;
                let millis = entry.at % 1000;
                result.push_str(&format!("[{secs:>5}.{millis:03}] "));
            }
            result.push_str(match entry.direction {
                Direction::Rx => "RX: ",
                Direction::Tx => "TX: ",
            });
            if show_hex {
                result.push_str(&hex::encode_upper(&entry.data));
                result.push('\n');
            } else {
                let text = String::from_utf8_lossy(&entry.data);
                result.push_str(&text);
                if !text.ends_with('\n') {
                    result.push('\n');
                }
            }
        }
        result
    }
}

impl Default for Transcript {
    fn default() -> Self {
        Self::new(10_000)
    }
}
