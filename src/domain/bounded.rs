//! Fixed-capacity FIFO buffer with drop-oldest eviction.
//!
//! Every in-memory buffer of the client (the outbound queue and the recent
//! event window) uses [`BoundedBuffer`], so there is exactly one eviction
//! rule: when a push would exceed capacity, the oldest entry is removed and
//! returned to the caller.

use std::collections::VecDeque;

/// Ring buffer that never grows past its capacity.
#[derive(Debug, Clone)]
pub struct BoundedBuffer<T> {
    items: VecDeque<T>,
    capacity: usize,
    evicted: u64,
}

impl<T> BoundedBuffer<T> {
    /// Creates an empty buffer. A capacity of zero is raised to one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
            evicted: 0,
        }
    }

    /// Appends `item` at the tail, returning the evicted head if the buffer
    /// was full.
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = if self.items.len() >= self.capacity {
            self.evicted = self.evicted.saturating_add(1);
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(item);
        evicted
    }

    /// Returns the oldest entry without removing it.
    #[must_use]
    pub fn front(&self) -> Option<&T> {
        self.items.front()
    }

    /// Removes and returns the oldest entry.
    pub fn pop_front(&mut self) -> Option<T> {
        self.items.pop_front()
    }

    /// Iterates from oldest to newest.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> {
        self.items.iter()
    }

    /// Removes every entry, returning how many were dropped.
    pub fn clear(&mut self) -> usize {
        let len = self.items.len();
        self.items.clear();
        len
    }

    /// Number of buffered entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if nothing is buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Maximum number of entries.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total entries dropped by the eviction rule since creation.
    #[must_use]
    pub const fn evicted_count(&self) -> u64 {
        self.evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_fifo_order() {
        let mut buf = BoundedBuffer::new(3);
        buf.push(1);
        buf.push(2);
        assert_eq!(buf.pop_front(), Some(1));
        assert_eq!(buf.pop_front(), Some(2));
        assert!(buf.is_empty());
    }

    #[test]
    fn evicts_oldest_when_full() {
        let mut buf = BoundedBuffer::new(2);
        assert_eq!(buf.push('a'), None);
        assert_eq!(buf.push('b'), None);
        assert_eq!(buf.push('c'), Some('a'));
        assert_eq!(buf.iter().copied().collect::<String>(), "bc");
        assert_eq!(buf.evicted_count(), 1);
    }

    #[test]
    fn zero_capacity_is_raised_to_one() {
        let mut buf = BoundedBuffer::new(0);
        assert_eq!(buf.capacity(), 1);
        buf.push(7);
        assert_eq!(buf.push(8), Some(7));
        assert_eq!(buf.len(), 1);
    }

    #[test]
    fn clear_reports_dropped_count() {
        let mut buf = BoundedBuffer::new(4);
        buf.push(1);
        buf.push(2);
        assert_eq!(buf.clear(), 2);
        assert!(buf.front().is_none());
    }
}
