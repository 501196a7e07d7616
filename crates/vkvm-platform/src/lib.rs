//! # vkvm-platform
//!
//! OS integration for VKVM. Everything that touches an operating-system
//! API lives here, behind traits the session coordinator consumes:
//!
//! - **`capture`** – low-level keyboard/mouse capture on the host
//!   (Windows low-level hooks), with the kill-switch chord that always
//!   returns control to the operator.
//! - **`inject`** – synthetic input on the agent. The platform-correct
//!   semantics (relative motion, drag tracking, click counting, modifier
//!   flag synthesis, scroll normalization, key translation) are planned
//!   by a pure [`inject::Synthesizer`] so they are testable without an
//!   OS; thin per-platform backends post the planned events.
//! - **`ddc`** – monitor enumeration and VCP writes over DDC/CI via the
//!   platform's command-line tool (`m1ddc`, `ControlMyMonitor`), with
//!   pure output parsers.
//! - **`wake`** – the 1-pixel mouse jiggle that wakes sleeping displays
//!   before a round of DDC writes.
//! - **`hotkey_feed`** – the global OS hook that feeds key/button
//!   transitions to the chord registry when capture is not running.
//!
//! The correct implementation is selected at compile time via
//! `#[cfg(target_os = ...)]`; unsupported platforms get stubs that report
//! `Unavailable`/`UnsupportedPlatform` so the session can degrade to
//! display-only switching. Every module also ships a recording mock used
//! by the test suites.

pub mod capture;
pub mod ddc;
pub mod hotkey_feed;
pub mod inject;
pub mod wake;

pub use capture::{CaptureError, EventQueue, InputCapture};
pub use ddc::{DdcController, DdcError, InputSource, Monitor};
pub use inject::{InjectionBackend, InjectionError, Injector, SyntheticEvent};
