//! Host-side input capture.
//!
//! The capture layer installs OS-level hooks and turns raw events into the
//! wire-normalized [`TimedEvent`] stream. Hook callbacks must never block:
//! they push onto a bounded [`EventQueue`] (1024 slots, drop-oldest on
//! overflow) that the session coordinator drains from the async runtime.
//!
//! Semantics every implementation upholds:
//!
//! - Mouse motion is delivered as **relative deltas**, never absolute
//!   coordinates. Hooks that report absolute positions compute the delta
//!   from the prior position; the first motion after start only
//!   initializes that position and emits nothing.
//! - Buttons use canonical IDs 1=left, 2=right, 3=middle, 4/5=extras.
//! - When capture is *enabled*, events are swallowed before they reach
//!   the local OS while still being emitted on the queue. When disabled,
//!   events are emitted AND allowed through.
//! - The **kill switch** chord (Ctrl+Alt+Esc, falling back to Ctrl+Alt+Q,
//!   Ctrl+Alt+W, then Ctrl+Esc if already claimed) is registered with the
//!   OS itself. Firing it disables capture and invokes the callback, and
//!   works under both capture states — the operator can always recover
//!   local control. If none of the chords can be registered, capture
//!   refuses to start.

use std::sync::Arc;

use thiserror::Error;
use vkvm_core::event::TimedEvent;

mod queue;
pub use queue::EventQueue;

pub mod mock;

#[cfg(target_os = "windows")]
pub mod windows;

/// Error type for capture operations.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// Hook registration was denied (insufficient privilege, or another
    /// process owns the hook). The session degrades to display-only
    /// switching.
    #[error("input capture unavailable: {0}")]
    Unavailable(String),

    /// No kill-switch chord could be registered. Fatal for the capture
    /// subsystem: capture never starts without an operator-accessible
    /// escape.
    #[error("no kill-switch hotkey available: {0}")]
    KillSwitchUnregistrable(String),

    /// `start()` was called while the capture service is already running.
    #[error("capture already running")]
    AlreadyRunning,
}

/// Callback invoked when the kill-switch chord fires.
pub type KillSwitchFn = Box<dyn Fn() + Send + Sync>;

/// Contract for host-side input capture.
pub trait InputCapture: Send + Sync {
    /// Installs the OS hooks and begins emitting events.
    ///
    /// # Errors
    ///
    /// [`CaptureError::Unavailable`] when hook registration is denied;
    /// [`CaptureError::KillSwitchUnregistrable`] when every kill-switch
    /// chord is claimed (capture must not start);
    /// [`CaptureError::AlreadyRunning`] on double start.
    fn start(&self) -> Result<(), CaptureError>;

    /// Uninstalls the hooks. Idempotent.
    fn stop(&self);

    /// Handle to the bounded event queue this capture pushes into.
    fn events(&self) -> Arc<EventQueue<TimedEvent>>;

    /// When `true`, captured events are blocked from reaching the local
    /// OS (still emitted on the queue). When `false`, events pass
    /// through. The kill-switch chord functions under both states.
    fn enable_capture(&self, enabled: bool);

    /// Whether capture mode is currently swallowing local input.
    fn is_capture_enabled(&self) -> bool;

    /// Registers the kill-switch callback. Firing the chord disables
    /// capture *and* invokes this.
    fn set_kill_switch(&self, callback: KillSwitchFn);
}

/// Creates the platform capture implementation.
///
/// # Errors
///
/// Returns [`CaptureError::Unavailable`] on platforms without a capture
/// backend; the caller degrades to display-only switching.
pub fn platform_capture() -> Result<Arc<dyn InputCapture>, CaptureError> {
    #[cfg(target_os = "windows")]
    {
        Ok(Arc::new(windows::WindowsCapture::new()))
    }

    #[cfg(not(target_os = "windows"))]
    {
        Err(CaptureError::Unavailable(format!(
            "no capture backend for {}",
            std::env::consts::OS
        )))
    }
}
