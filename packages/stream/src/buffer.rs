//! Capacity-bounded append buffer with trailing-window truncation.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// Capacity and retain size of a [`BoundedBuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferLimits {
    /// Largest length the buffer may hold after a write.
    pub capacity: usize,
    /// Length the buffer is cut down to once it overflows.
    pub retain: usize,
}

impl BufferLimits {
    /// Demand-record buffer: 1000, trimmed to the last 500.
    pub const DEMAND: Self = Self {
        capacity: 1000,
        retain: 500,
    };

    /// Anomaly buffer: 100, trimmed to the last 50.
    pub const ANOMALIES: Self = Self {
        capacity: 100,
        retain: 50,
    };

    /// Returns `true` if `0 < retain < capacity`.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.retain > 0 && self.retain < self.capacity
    }
}

/// Append-only buffer that, once it grows past `capacity`, drops its
/// oldest items in one step so only the most recent `retain` remain.
///
/// Unlike a ring buffer, a single overflow frees a large block at once,
/// so the buffer oscillates between `retain` and `capacity` items.
#[derive(Debug, Clone)]
pub struct BoundedBuffer<T> {
    name: &'static str,
    items: VecDeque<T>,
    limits: BufferLimits,
}

impl<T> BoundedBuffer<T> {
    /// Creates an empty buffer. `name` appears in trim log lines.
    #[must_use]
    pub fn new(name: &'static str, limits: BufferLimits) -> Self {
        Self {
            name,
            items: VecDeque::with_capacity(limits.capacity + 1),
            limits,
        }
    }

    #[must_use]
    pub const fn limits(&self) -> BufferLimits {
        self.limits
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Appends one item, trimming if the buffer overflows.
    pub fn push(&mut self, item: T) {
        self.items.push_back(item);
        self.trim();
    }

    /// Appends items in order, trimming after each overflow.
    ///
    /// Trimming per item keeps the result identical to repeated
    /// [`Self::push`] calls.
    pub fn extend(&mut self, items: impl IntoIterator<Item = T>) {
        for item in items {
            self.push(item);
        }
    }

    /// Iterates from oldest to newest.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator {
        self.items.iter()
    }

    fn trim(&mut self) {
        if self.items.len() <= self.limits.capacity {
            return;
        }
        let drop = self.items.len().saturating_sub(self.limits.retain);
        self.items.drain(..drop);
        log::warn!(
            "{} buffer exceeded {} items, dropped {drop} oldest (kept {})",
            self.name,
            self.limits.capacity,
            self.items.len()
        );
    }
}

impl<T: Clone> BoundedBuffer<T> {
    /// The newest `n` items, oldest first.
    #[must_use]
    pub fn last(&self, n: usize) -> Vec<T> {
        let skip = self.items.len().saturating_sub(n);
        self.items.iter().skip(skip).cloned().collect()
    }

    /// Copies the whole buffer, oldest first.
    #[must_use]
    pub fn to_vec(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overflow_keeps_most_recent_retain() {
        let mut buffer = BoundedBuffer::new("demand", BufferLimits::DEMAND);
        buffer.extend(0..1000);
        assert_eq!(buffer.len(), 1000);

        buffer.push(1000);
        assert_eq!(buffer.len(), 500);
        assert_eq!(buffer.iter().next(), Some(&501));
        assert_eq!(buffer.iter().next_back(), Some(&1000));
    }

    #[test]
    fn anomaly_limits_trim_to_fifty() {
        let mut buffer = BoundedBuffer::new("anomalies", BufferLimits::ANOMALIES);
        buffer.extend(0..101);
        assert_eq!(buffer.len(), 50);
        assert_eq!(buffer.to_vec(), (51..101).collect::<Vec<_>>());
    }

    #[test]
    fn never_exceeds_capacity_after_a_write() {
        let limits = BufferLimits {
            capacity: 10,
            retain: 4,
        };
        let mut buffer = BoundedBuffer::new("small", limits);
        for i in 0..57 {
            buffer.push(i);
            assert!(buffer.len() <= limits.capacity);
        }
        buffer.extend(100..140);
        assert!(buffer.len() <= limits.capacity);
        assert_eq!(buffer.iter().next_back(), Some(&139));
    }

    #[test]
    fn last_returns_tail_in_order() {
        let mut buffer = BoundedBuffer::new("demand", BufferLimits::DEMAND);
        buffer.extend(0..20);
        assert_eq!(buffer.last(3), vec![17, 18, 19]);
        assert_eq!(buffer.last(50).len(), 20);
    }

    #[test]
    fn limits_validation() {
        assert!(BufferLimits::DEMAND.is_valid());
        assert!(
            !BufferLimits {
                capacity: 5,
                retain: 5
            }
            .is_valid()
        );
    }
}
