//! # vkvm-core
//!
//! Shared library for VKVM containing the wire protocol codecs, the
//! configuration model, hotkey chord matching, and key code translation
//! tables.
//!
//! This crate is used by both the host and agent roles of the `vkvm`
//! binary. It has zero dependencies on OS APIs, UI frameworks, or network
//! sockets.
//!
//! VKVM is a software KVM switch: one operator drives several computers
//! that share a set of monitors. The **host** is the machine with the
//! physical keyboard and mouse; **agents** are the machines being driven.
//! Two planes are coordinated:
//!
//! - **Display plane** – profile switches command monitors over DDC/CI to
//!   change their active input source.
//! - **Input plane** – low-level input captured on the host is forwarded
//!   over the network and injected on whichever agent currently owns the
//!   monitors.
//!
//! This crate defines:
//!
//! - **`protocol`** – the JSON control-message family (reliable channel)
//!   and the fixed-size binary datagram family (UDP burst channel), plus
//!   the sequence counter and the duplicate-suppression window used to
//!   make redundant UDP delivery safe.
//!
//! - **`event`** – the wire-normalized [`InputEvent`] union shared by
//!   capture, transport, and injection.
//!
//! - **`config`** – profiles, general settings, and the single-writer
//!   [`config::ConfigManager`] with change notification.
//!
//! - **`hotkey`** – chord parsing and subset matching against the set of
//!   currently held keys, independent of application focus.
//!
//! - **`keymap`** – static translation tables between Windows virtual-key
//!   codes (the wire representation) and macOS CGKeyCodes, plus the token
//!   names used by the hotkey engine.

pub mod config;
pub mod event;
pub mod hotkey;
pub mod keymap;
pub mod protocol;

pub use config::{Config, ConfigManager, GeneralConfig, Profile, Role, SwitchMode};
pub use event::{InputEvent, ScrollAxis, TimedEvent};
pub use hotkey::{Chord, HotkeyRegistry};
pub use protocol::control::ControlMessage;
pub use protocol::datagram::{decode_datagram, encode_datagram, Datagram, DatagramError};
pub use protocol::dedup::SeqWindow;
pub use protocol::sequence::SequenceCounter;
