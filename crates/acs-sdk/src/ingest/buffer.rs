//! Bounded in-memory event buffer

use std::collections::VecDeque;

use acs_core::DeviceEvent;

/// Maximum number of buffered events
pub const EVENT_BUFFER_CAPACITY: usize = 1000;

/// FIFO ring of the most recent events
#[derive(Debug)]
pub struct EventBuffer {
    events: VecDeque<DeviceEvent>,
    capacity: usize,
}

impl Default for EventBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBuffer {
    pub fn new() -> Self {
        Self::with_capacity(EVENT_BUFFER_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append one event, returning how many old events were evicted
    pub fn push(&mut self, event: DeviceEvent) -> usize {
        let mut evicted = 0;
        while self.events.len() >= self.capacity {
            self.events.pop_front();
            evicted += 1;
        }
        self.events.push_back(event);
        evicted
    }

    /// The `take` most recently appended events, oldest first by `occurred_at`
    ///
    /// `take <= 0` yields nothing; anything above the capacity is clamped.
    pub fn read_recent(&self, take: i64) -> Vec<DeviceEvent> {
        if take <= 0 {
            return Vec::new();
        }
        let take = usize::try_from(take).unwrap_or(usize::MAX).min(self.capacity);
        let skip = self.events.len().saturating_sub(take);

        let mut recent: Vec<DeviceEvent> = self.events.iter().skip(skip).cloned().collect();
        recent.sort_by_key(|e| e.occurred_at);
        recent
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
