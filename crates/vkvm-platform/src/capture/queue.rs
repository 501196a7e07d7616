//! Bounded event queue bridging OS hook threads and the async runtime.
//!
//! Hook callbacks run on a dedicated OS thread and must return within a
//! few milliseconds or the OS removes the hook. [`EventQueue::push`] is a
//! short lock-push-notify with no allocation on the steady state; if the
//! queue is full the *oldest* entry is dropped. Losing an old mouse move
//! merely loses pointer resolution, whereas blocking the hook thread
//! would stall every input on the machine.

use std::collections::VecDeque;
use std::sync::Mutex;

use tokio::sync::Notify;

/// Fixed-capacity MPSC queue with drop-oldest overflow behavior.
pub struct EventQueue<T> {
    inner: Mutex<VecDeque<T>>,
    notify: Notify,
    capacity: usize,
    dropped: Mutex<u64>,
}

impl<T> EventQueue<T> {
    /// Queue capacity used by every capture implementation.
    pub const DEFAULT_CAPACITY: usize = 1024;

    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            notify: Notify::new(),
            capacity,
            dropped: Mutex::new(0),
        }
    }

    /// Pushes an event, evicting the oldest entry if the queue is full.
    /// Never blocks beyond the internal mutex; safe to call from hook
    /// callbacks.
    pub fn push(&self, value: T) {
        {
            let mut q = self.inner.lock().expect("event queue poisoned");
            if q.len() >= self.capacity {
                q.pop_front();
                *self.dropped.lock().expect("counter poisoned") += 1;
            }
            q.push_back(value);
        }
        self.notify.notify_one();
    }

    /// Removes the oldest event without waiting.
    pub fn try_recv(&self) -> Option<T> {
        self.inner.lock().expect("event queue poisoned").pop_front()
    }

    /// Waits until an event is available and removes it.
    pub async fn recv(&self) -> T {
        loop {
            // Register interest before the emptiness check so a push
            // between check and await cannot be missed.
            let notified = self.notify.notified();
            if let Some(value) = self.try_recv() {
                return value;
            }
            notified.await;
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("event queue poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of events evicted due to overflow since creation.
    pub fn dropped(&self) -> u64 {
        *self.dropped.lock().expect("counter poisoned")
    }

    /// Discards all queued events.
    pub fn clear(&self) {
        self.inner.lock().expect("event queue poisoned").clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_push_then_try_recv_is_fifo() {
        let q = EventQueue::new(8);
        q.push(1);
        q.push(2);
        q.push(3);
        assert_eq!(q.try_recv(), Some(1));
        assert_eq!(q.try_recv(), Some(2));
        assert_eq!(q.try_recv(), Some(3));
        assert_eq!(q.try_recv(), None);
    }

    #[test]
    fn test_overflow_drops_oldest() {
        let q = EventQueue::new(3);
        for i in 0..5 {
            q.push(i);
        }
        assert_eq!(q.len(), 3);
        assert_eq!(q.dropped(), 2);
        assert_eq!(q.try_recv(), Some(2), "0 and 1 were evicted");
    }

    #[tokio::test]
    async fn test_recv_waits_for_push() {
        let q = Arc::new(EventQueue::new(8));
        let q2 = Arc::clone(&q);
        let handle = tokio::spawn(async move { q2.recv().await });

        // Give the receiver a moment to park, then push from another task.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        q.push(99);
        assert_eq!(handle.await.unwrap(), 99);
    }

    #[tokio::test]
    async fn test_recv_returns_existing_without_waiting() {
        let q = EventQueue::new(8);
        q.push(7);
        assert_eq!(q.recv().await, 7);
    }

    #[test]
    fn test_clear_empties_queue() {
        let q = EventQueue::new(8);
        q.push(1);
        q.push(2);
        q.clear();
        assert!(q.is_empty());
    }

    #[test]
    fn test_push_from_plain_thread() {
        // Hook threads are plain OS threads with no async runtime.
        let q = Arc::new(EventQueue::new(16));
        let q2 = Arc::clone(&q);
        std::thread::spawn(move || {
            for i in 0..10 {
                q2.push(i);
            }
        })
        .join()
        .unwrap();
        assert_eq!(q.len(), 10);
    }
}
