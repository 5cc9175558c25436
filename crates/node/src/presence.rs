//! Sliding-window presence detector.
//!
//! The pressure mat pulls its line low when someone lies on it, so each
//! raw sample is inverted before entering the window.  The running
//! average over the window is the smoothed presence signal consumed by
//! the alarm state machine.

use std::collections::VecDeque;

pub struct PresenceDetector {
    window: VecDeque<bool>,
    capacity: usize,
}

impl PresenceDetector {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            window: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Feed one raw line-level sample (low = occupied) and return the
    /// updated running average.  Oldest entry is evicted at capacity.
    pub fn observe(&mut self, raw: bool) -> f32 {
        let occupied = !raw;
        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(occupied);
        self.average()
    }

    /// Mean of the window in [0, 1]; 0.0 while empty.
    pub fn average(&self) -> f32 {
        if self.window.is_empty() {
            return 0.0;
        }
        let occupied = self.window.iter().filter(|&&b| b).count();
        occupied as f32 / self.window.len() as f32
    }

    /// Change the window capacity at runtime.  Existing entries are
    /// kept; if the new capacity is smaller, the oldest entries are
    /// evicted immediately so the length invariant holds.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        while self.window.len() > self.capacity {
            self.window.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

// ===========================================================================
// Tests
// ===========================================================================
