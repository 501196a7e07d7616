//! Thread-safe sequence counter for burst-channel datagrams.
//!
//! The host assigns a monotonically increasing `u32` to every input event
//! it emits. The sequence number exists for exactly one purpose here:
//! critical events are sent in multiple redundant UDP copies, and agents
//! use the sequence number to drop the duplicates (see
//! [`crate::protocol::dedup::SeqWindow`]).
//!
//! The counter is per process start; agents never compare sequence
//! numbers across host restarts.

use std::sync::atomic::{AtomicU32, Ordering};

/// A thread-safe, monotonically increasing sequence counter.
///
/// The first call to [`next`](SequenceCounter::next) returns 1; sequence
/// number 0 is reserved for header-only session packets (Register,
/// Heartbeat, Ack) which are exempt from dedup. Wraps from `u32::MAX`
/// back around without panicking.
///
/// # Examples
///
/// ```rust
/// use vkvm_core::SequenceCounter;
///
/// let counter = SequenceCounter::new();
/// assert_eq!(counter.next(), 1);
/// assert_eq!(counter.next(), 2);
/// ```
pub struct SequenceCounter {
    inner: AtomicU32,
}

impl SequenceCounter {
    /// Creates a new counter whose first emitted value is 1.
    pub fn new() -> Self {
        Self {
            inner: AtomicU32::new(0),
        }
    }

    /// Atomically increments the counter and returns the new value.
    ///
    /// `Ordering::Relaxed` is sufficient: sequence numbers only order
    /// messages, they are not used for memory synchronization between
    /// threads.
    pub fn next(&self) -> u32 {
        self.inner.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
    }

    /// Returns the most recently assigned value without incrementing.
    pub fn current(&self) -> u32 {
        self.inner.load(Ordering::Relaxed)
    }
}

impl Default for SequenceCounter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_first_value_is_one() {
        let counter = SequenceCounter::new();
        assert_eq!(counter.next(), 1);
    }

    #[test]
    fn test_values_increase_monotonically() {
        let counter = SequenceCounter::new();
        let values: Vec<u32> = (0..100).map(|_| counter.next()).collect();
        for window in values.windows(2) {
            assert!(window[1] > window[0]);
        }
    }

    #[test]
    fn test_wraps_at_u32_max() {
        let counter = SequenceCounter {
            inner: AtomicU32::new(u32::MAX - 1),
        };
        assert_eq!(counter.next(), u32::MAX);
        assert_eq!(counter.next(), 0);
        assert_eq!(counter.next(), 1);
    }

    #[test]
    fn test_no_duplicates_across_threads() {
        let counter = Arc::new(SequenceCounter::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let c = Arc::clone(&counter);
                thread::spawn(move || (0..1000).map(|_| c.next()).collect::<Vec<_>>())
            })
            .collect();

        let mut all: Vec<u32> = handles
            .into_iter()
            .flat_map(|h| h.join().expect("thread panicked"))
            .collect();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 8 * 1000);
    }

    #[test]
    fn test_current_does_not_advance() {
        let counter = SequenceCounter::new();
        counter.next();
        assert_eq!(counter.current(), 1);
        assert_eq!(counter.current(), 1);
    }
}
