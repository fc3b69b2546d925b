//! ---
//! eaf_section: "05-networking-external-interfaces"
//! eaf_subsection: "module"
//! eaf_type: "source"
//! eaf_scope: "code"
//! eaf_description: "Fixed-capacity tick history used for replay."
//! eaf_version: "v0.0.0-prealpha"
//! eaf_owner: "tbd"
//! ---
use std::collections::VecDeque;

use eaf_msg::Tick;

/// A live tick as received, with receipt metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct BufferedTick {
    pub received_at_ms: i64,
    /// Origin timestamp, when the frame carried one.
    pub server_timestamp_ms: Option<i64>,
    pub payload: Tick,
    /// `received_at_ms - server_timestamp_ms`, clamped at zero.
    pub latency_ms: Option<i64>,
}

/// FIFO ring of the most recently received ticks, in receipt order.
#[derive(Debug, Clone)]
pub struct TickRingBuffer {
    entries: VecDeque<BufferedTick>,
    capacity: usize,
}

impl TickRingBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append `entry`, returning the evicted oldest entry when full.
    pub fn push(&mut self, entry: BufferedTick) -> Option<BufferedTick> {
        let evicted = if self.entries.len() == self.capacity {
            self.entries.pop_front()
        } else {
            None
        };
        self.entries.push_back(entry);
        evicted
    }

    pub fn get(&self, index: usize) -> Option<&BufferedTick> {
        self.entries.get(index)
    }

    pub fn latest(&self) -> Option<&BufferedTick> {
        self.entries.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BufferedTick> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Index of the first entry among the last `window` entries.
    pub fn window_start(&self, window: usize) -> usize {
        self.entries.len().saturating_sub(window)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
