//! Bounded FIFO of recently accepted observations.

use crate::types::Observation;
use std::collections::VecDeque;

/// Sliding window of the last `capacity` accepted observations, oldest first.
#[derive(Debug, Clone)]
pub struct HistoryWindow {
    entries: VecDeque<Observation>,
    capacity: usize,
}

impl HistoryWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append, evicting the oldest entry when full.
    pub fn push(&mut self, observation: Observation) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(observation);
    }

    /// Drop everything and start over from a single observation.
    pub fn reseed(&mut self, observation: Observation) {
        self.entries.clear();
        self.entries.push_back(observation);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
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

    pub fn iter(&self) -> impl Iterator<Item = &Observation> {
        self.entries.iter()
    }

    pub fn latest(&self) -> Option<&Observation> {
        self.entries.back()
    }
}
