//! Scriptable capture test double.
//!
//! Tests drive [`MockCapture::feed`] to simulate the OS hook delivering
//! events, including the delta computation a real hook performs for
//! absolute positions, and fire the kill switch directly.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use vkvm_core::event::{InputEvent, TimedEvent};

use super::{CaptureError, EventQueue, InputCapture, KillSwitchFn};

/// In-memory capture implementation for tests.
pub struct MockCapture {
    queue: Arc<EventQueue<TimedEvent>>,
    running: AtomicBool,
    capture_enabled: AtomicBool,
    kill_switch: Mutex<Option<KillSwitchFn>>,
    last_pos: Mutex<Option<(i32, i32)>>,
    /// Events that were allowed through to the "local OS" (i.e. emitted
    /// while capture was disabled). Lets tests assert the swallow rule.
    passed_through: Mutex<Vec<TimedEvent>>,
}

impl MockCapture {
    pub fn new() -> Self {
        Self {
            queue: Arc::new(EventQueue::new(EventQueue::<TimedEvent>::DEFAULT_CAPACITY)),
            running: AtomicBool::new(false),
            capture_enabled: AtomicBool::new(false),
            kill_switch: Mutex::new(None),
            last_pos: Mutex::new(None),
            passed_through: Mutex::new(Vec::new()),
        }
    }

    /// Feeds a normalized event as if the hook produced it.
    pub fn feed(&self, event: InputEvent, ts: i64) {
        if !self.running.load(Ordering::SeqCst) {
            return;
        }
        let timed = TimedEvent::new(event, ts);
        self.queue.push(timed);
        if !self.capture_enabled.load(Ordering::SeqCst) {
            self.passed_through.lock().unwrap().push(timed);
        }
    }

    /// Feeds an absolute pointer position; emits the delta exactly like a
    /// pointer hook would. The first call only initializes.
    pub fn feed_absolute_move(&self, x: i32, y: i32, ts: i64) {
        let mut last = self.last_pos.lock().unwrap();
        if let Some((px, py)) = *last {
            *last = Some((x, y));
            drop(last);
            self.feed(
                InputEvent::MouseMove {
                    dx: x - px,
                    dy: y - py,
                },
                ts,
            );
        } else {
            *last = Some((x, y));
        }
    }

    /// Simulates the kill-switch chord firing.
    pub fn fire_kill_switch(&self) {
        self.capture_enabled.store(false, Ordering::SeqCst);
        if let Some(cb) = self.kill_switch.lock().unwrap().as_ref() {
            cb();
        }
    }

    /// Events that reached the local OS (emitted while capture disabled).
    pub fn passed_through(&self) -> Vec<TimedEvent> {
        self.passed_through.lock().unwrap().clone()
    }
}

impl Default for MockCapture {
    fn default() -> Self {
        Self::new()
    }
}

impl InputCapture for MockCapture {
    fn start(&self) -> Result<(), CaptureError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(CaptureError::AlreadyRunning);
        }
        Ok(())
    }

    fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    fn events(&self) -> Arc<EventQueue<TimedEvent>> {
        Arc::clone(&self.queue)
    }

    fn enable_capture(&self, enabled: bool) {
        self.capture_enabled.store(enabled, Ordering::SeqCst);
    }

    fn is_capture_enabled(&self) -> bool {
        self.capture_enabled.load(Ordering::SeqCst)
    }

    fn set_kill_switch(&self, callback: KillSwitchFn) {
        *self.kill_switch.lock().unwrap() = Some(callback);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_start_twice_fails() {
        let cap = MockCapture::new();
        cap.start().unwrap();
        assert!(matches!(cap.start(), Err(CaptureError::AlreadyRunning)));
    }

    #[test]
    fn test_stopped_capture_emits_nothing() {
        let cap = MockCapture::new();
        cap.feed(InputEvent::MouseMove { dx: 1, dy: 1 }, 0);
        assert!(cap.events().is_empty());
    }

    #[test]
    fn test_first_absolute_move_initializes_only() {
        let cap = MockCapture::new();
        cap.start().unwrap();
        cap.feed_absolute_move(100, 100, 0);
        assert!(cap.events().is_empty(), "first move must not emit");

        cap.feed_absolute_move(110, 95, 1);
        let got = cap.events().try_recv().unwrap();
        assert_eq!(got.event, InputEvent::MouseMove { dx: 10, dy: -5 });
    }

    #[test]
    fn test_enabled_capture_swallows_local_delivery() {
        let cap = MockCapture::new();
        cap.start().unwrap();
        cap.enable_capture(true);
        cap.feed(InputEvent::Key { code: 0x41, pressed: true, modifiers: 0 }, 0);

        assert_eq!(cap.events().len(), 1, "still emitted on the queue");
        assert!(cap.passed_through().is_empty(), "not delivered locally");
    }

    #[test]
    fn test_disabled_capture_passes_through_and_emits() {
        let cap = MockCapture::new();
        cap.start().unwrap();
        cap.enable_capture(false);
        cap.feed(InputEvent::Key { code: 0x41, pressed: true, modifiers: 0 }, 0);

        assert_eq!(cap.events().len(), 1);
        assert_eq!(cap.passed_through().len(), 1);
    }

    #[test]
    fn test_kill_switch_disables_capture_and_fires_callback() {
        let cap = MockCapture::new();
        cap.start().unwrap();
        cap.enable_capture(true);

        let fired = Arc::new(AtomicUsize::new(0));
        let fired2 = Arc::clone(&fired);
        cap.set_kill_switch(Box::new(move || {
            fired2.fetch_add(1, Ordering::SeqCst);
        }));

        cap.fire_kill_switch();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!cap.is_capture_enabled());
    }
}
