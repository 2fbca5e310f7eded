//! Bounded time series buffer.
//!
//! A [`TimeSeries`] keeps the most recent samples of one metric in
//! chronological order. Gaps are stored explicitly as `None`; the buffer never
//! invents a value for a missing sample.

use std::collections::VecDeque;

/// Ordered, append-only sequence with oldest-first eviction.
///
/// A capacity of 0 means unbounded.
#[derive(Debug, Clone)]
pub struct TimeSeries<T> {
    entries: VecDeque<Option<T>>,
    capacity: usize,
}

impl<T> TimeSeries<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(4096)),
            capacity,
        }
    }

    /// Appends a sample, evicting the oldest one when full.
    pub fn push(&mut self, value: Option<T>) {
        self.entries.push_back(value);
        self.evict();
    }

    /// Newest entry, `None` when empty or when the newest entry is a gap.
    pub fn latest(&self) -> Option<&T> {
        self.entries.back().and_then(Option::as_ref)
    }

    pub fn iter(&self) -> impl Iterator<Item = Option<&T>> {
        self.entries.iter().map(Option::as_ref)
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

    /// Changes the bound; shrinking evicts the oldest entries immediately.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
        self.evict();
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Pads with gaps or drops the newest entries until `len` entries remain.
    pub fn resize_to(&mut self, len: usize) {
        while self.entries.len() < len {
            self.entries.push_back(None);
        }
        self.entries.truncate(len);
    }

    fn evict(&mut self) {
        if self.capacity == 0 {
            return;
        }
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }
}

impl<T: Clone> TimeSeries<T> {
    /// All entries in chronological order (oldest to newest).
    pub fn history(&self) -> Vec<Option<T>> {
        self.entries.iter().cloned().collect()
    }
}
