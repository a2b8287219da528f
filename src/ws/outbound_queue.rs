//! FIFO buffer for commands issued while the connection is not open.

use super::messages::OutboundMessage;
use crate::domain::BoundedBuffer;
use crate::error::RealtimeError;

/// Outbound commands awaiting transmission, strictly in submission order.
///
/// Bounded: when full, the oldest queued command is dropped to make room.
/// There is no priority-based reordering.
#[derive(Debug)]
pub struct OutboundQueue {
    buffer: BoundedBuffer<OutboundMessage>,
}

impl OutboundQueue {
    /// Creates a queue holding at most `capacity` commands.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: BoundedBuffer::new(capacity),
        }
    }

    /// Appends a command at the tail.
    pub fn enqueue(&mut self, message: OutboundMessage) {
        if let Some(dropped) = self.buffer.push(message) {
            tracing::warn!(
                kind = dropped.type_str(),
                capacity = self.buffer.capacity(),
                "outbound queue full; dropped oldest command"
            );
        }
    }

    /// Hands queued commands to `transmit` head first until the queue is
    /// empty or `transmit` fails.
    ///
    /// A command is only removed once `transmit` accepted it, so on failure
    /// the unsent remainder stays at the head in its original order. Returns
    /// the number of commands transmitted.
    pub fn flush<F>(&mut self, mut transmit: F) -> usize
    where
        F: FnMut(&OutboundMessage) -> Result<(), RealtimeError>,
    {
        let mut sent = 0;
        while let Some(head) = self.buffer.front() {
            if let Err(error) = transmit(head) {
                tracing::debug!(%error, remaining = self.buffer.len(), "flush interrupted");
                break;
            }
            let _ = self.buffer.pop_front();
            sent += 1;
        }
        sent
    }

    /// Drops every queued command, returning how many were discarded.
    pub fn clear(&mut self) -> usize {
        self.buffer.clear()
    }

    /// Number of queued commands.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Returns `true` if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Commands dropped by the capacity limit since creation.
    #[must_use]
    pub const fn dropped_count(&self) -> u64 {
        self.buffer.evicted_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ping(timestamp: i64) -> OutboundMessage {
        OutboundMessage::Ping { timestamp }
    }

    fn stamp(message: &OutboundMessage) -> i64 {
        match message {
            OutboundMessage::Ping { timestamp } => *timestamp,
            _ => -1,
        }
    }

    #[test]
    fn flush_preserves_submission_order() {
        let mut queue = OutboundQueue::new(8);
        queue.enqueue(ping(1));
        queue.enqueue(ping(2));
        queue.enqueue(ping(3));

        let mut seen = Vec::new();
        let sent = queue.flush(|m| {
            seen.push(stamp(m));
            Ok(())
        });
        assert_eq!(sent, 3);
        assert_eq!(seen, [1, 2, 3]);
        assert!(queue.is_empty());
    }

    #[test]
    fn failed_send_leaves_remainder_at_head() {
        let mut queue = OutboundQueue::new(8);
        for ts in 1..=4 {
            queue.enqueue(ping(ts));
        }

        let mut calls = 0;
        let sent = queue.flush(|_| {
            calls += 1;
            if calls == 3 {
                Err(RealtimeError::NotConnected)
            } else {
                Ok(())
            }
        });
        assert_eq!(sent, 2);
        assert_eq!(queue.len(), 2);

        let mut rest = Vec::new();
        queue.flush(|m| {
            rest.push(stamp(m));
            Ok(())
        });
        assert_eq!(rest, [3, 4]);
    }

    #[test]
    fn full_queue_drops_oldest() {
        let mut queue = OutboundQueue::new(2);
        queue.enqueue(ping(1));
        queue.enqueue(ping(2));
        queue.enqueue(ping(3));
        assert_eq!(queue.dropped_count(), 1);

        let mut seen = Vec::new();
        queue.flush(|m| {
            seen.push(stamp(m));
            Ok(())
        });
        assert_eq!(seen, [2, 3]);
    }

    #[test]
    fn clear_discards_everything() {
        let mut queue = OutboundQueue::new(4);
        queue.enqueue(ping(1));
        assert_eq!(queue.clear(), 1);
        assert_eq!(queue.flush(|_| Ok(())), 0);
    }
}
