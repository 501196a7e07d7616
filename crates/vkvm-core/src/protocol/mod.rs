//! VKVM wire protocol.
//!
//! Two message families travel over two distinct channels:
//!
//! - **Control messages** ([`control`]) – JSON over the reliable,
//!   ordered WebSocket channel: authentication, profile switches, config
//!   sync, and the input fallback path.
//!
//! - **Input datagrams** ([`datagram`]) – a fixed-size binary encoding
//!   over the best-effort UDP burst channel, optimized for latency.
//!   Critical events are duplicated on the wire; [`dedup`] suppresses the
//!   redundant copies on the receiving side using the host-assigned
//!   sequence numbers produced by [`sequence`].

pub mod control;
pub mod datagram;
pub mod dedup;
pub mod sequence;

pub use control::ControlMessage;
pub use datagram::{decode_datagram, encode_datagram, Datagram, DatagramError};
pub use dedup::SeqWindow;
pub use sequence::SequenceCounter;
