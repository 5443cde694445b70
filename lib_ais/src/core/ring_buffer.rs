//! # Message Ring Buffer
//!
//! A fixed-capacity FIFO that keeps the newest `capacity` items. When full, an
//! `append` evicts the oldest item before inserting, so stored length never
//! exceeds the capacity regardless of how fast items arrive.
//!
//! The inbound AIS rate is set by the relay, not by us. This buffer is the only
//! place inbound payloads are retained, and it is never swapped for an
//! unbounded queue.

use std::collections::VecDeque;

/// Bounded FIFO holding the most recent items in arrival order.
#[derive(Debug, Clone)]
pub struct MessageRingBuffer<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> MessageRingBuffer<T> {
    /// Creates an empty buffer. A capacity of zero is bumped to one.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends an item, evicting the oldest one first if the buffer is full.
    ///
    /// Returns the evicted item, if any.
    pub fn append(&mut self, item: T) -> Option<T> {
        let evicted = if self.items.len() == self.capacity {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(item);
        evicted
    }

    /// Number of stored items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether nothing has been stored yet.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Maximum number of stored items.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Iterates oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    /// The newest item, if any.
    pub fn latest(&self) -> Option<&T> {
        self.items.back()
    }

    /// Drops every stored item. The capacity is unchanged.
    pub fn clear(&mut self) {
        self.items.clear();
    }
}

impl<T: Clone> MessageRingBuffer<T> {
    /// Returns clones of the last `n` items, oldest first.
    ///
    /// `n` larger than the stored length returns everything.
    pub fn snapshot(&self, n: usize) -> Vec<T> {
        let skip = self.items.len().saturating_sub(n);
        self.items.iter().skip(skip).cloned().collect()
    }

    /// Returns clones of every stored item, oldest first.
    pub fn to_vec(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }
}
