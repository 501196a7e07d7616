//! Global hook feed for the hotkey engine.
//!
//! The chord registry in `vkvm-core` is pure; something has to deliver
//! every key and mouse-button transition to it regardless of which
//! application has focus. That is this module: a listen-only global hook
//! per platform that calls the supplied function with `(token, is_down)`
//! pairs using the chord token alphabet.
//!
//! On a host with capture running, the capture hook already sees every
//! event first (and may swallow it before this hook would run), so the
//! session feeds the registry from the capture stream instead and this
//! feed stays off. The feed serves agents and display-only hosts.

use thiserror::Error;

#[cfg(target_os = "macos")]
pub mod macos;

#[cfg(target_os = "windows")]
pub mod windows;

/// Error type for the hotkey feed.
#[derive(Debug, Error)]
pub enum FeedError {
    /// The OS refused the event tap/hook (typically missing permissions).
    #[error("global hook unavailable: {0}")]
    Unavailable(String),

    /// No feed implementation for this platform.
    #[error("global hotkey hook unsupported on {0}")]
    UnsupportedPlatform(&'static str),
}

/// Callback receiving `(token, is_down)` transitions.
pub type TransitionFn = Box<dyn Fn(&str, bool) + Send + Sync>;

/// Starts the platform global hook on a background thread.
///
/// Hotkeys are a convenience, not a safety feature (the kill switch has
/// its own OS registration), so callers log failures and continue.
///
/// # Errors
///
/// [`FeedError::Unavailable`] when the hook cannot be installed;
/// [`FeedError::UnsupportedPlatform`] where no implementation exists.
pub fn start(on_transition: TransitionFn) -> Result<(), FeedError> {
    #[cfg(target_os = "macos")]
    {
        macos::start(on_transition)
    }
    #[cfg(target_os = "windows")]
    {
        windows::start(on_transition)
    }
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        let _ = on_transition;
        Err(FeedError::UnsupportedPlatform(std::env::consts::OS))
    }
}
