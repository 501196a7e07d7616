//! # vkvm
//!
//! The VKVM application crate: transport, HTTP/WS control API, and the
//! session coordinator that ties capture, injection, DDC switching, and
//! hotkeys together according to the configured role.
//!
//! ```text
//! Host                                          Agent
//! ────                                          ─────
//! capture hooks ──► session gate ──► udp sender ──► udp receiver ──► gate ──► injector
//!                        │                │  (burst, redundant)
//!                        │                └─ control channel fallback
//!                        │
//! hotkeys ──► switcher ──┼──► DDC writes (local monitors)
//!                        └──► switch broadcast ──► agents update allow_injection
//! ```
//!
//! The library layout exists so the integration tests in `tests/` drive
//! the same public API the binary uses.

pub mod api;
pub mod session;
pub mod transport;
