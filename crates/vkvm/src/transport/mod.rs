//! Dual-channel transport.
//!
//! One logical session rides two channels:
//!
//! - The **control channel** ([`ws_client`] on the agent, the `/ws`
//!   endpoint in [`crate::api`] on the host): reliable, ordered JSON
//!   frames for auth, switches, config sync, and the input fallback.
//! - The **burst channel** ([`udp_sender`]/[`udp_receiver`]): UDP on the
//!   same port number, binary datagrams, register/heartbeat/ack session
//!   management, redundant delivery of critical events, and dedup.
//!
//! Both agent-side channels deliver into one [`TransportEvent`] stream
//! so the session coordinator has a single place to gate and dispatch.

use std::net::SocketAddr;

use thiserror::Error;
use vkvm_core::config::Profile;
use vkvm_core::event::TimedEvent;
use vkvm_core::protocol::control::SwitchPayload;

pub mod udp_receiver;
pub mod udp_sender;
pub mod ws_client;

/// Error type for transport operations.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("bind failed on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("could not resolve coordinator address {0:?}")]
    BadAddress(String),

    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("peer disconnected")]
    Disconnected,
}

/// Everything the agent-side session reacts to, from either channel.
#[derive(Debug)]
pub enum TransportEvent {
    /// Control channel established (initial connect or reconnect). The
    /// session resets injector modifier state and re-registers for UDP.
    Connected,
    /// Control channel lost; the client is already backing off to
    /// reconnect.
    Disconnected,
    /// A `switch` broadcast or request arrived.
    Switch(SwitchPayload),
    /// A `sync_resp` arrived with the host's authoritative profiles.
    ProfilesSynced {
        profiles: Vec<Profile>,
        usb_forwarding_enabled: bool,
    },
    /// An input event arrived (burst channel, or control-channel
    /// fallback when UDP is closed).
    Input(TimedEvent),
}

/// Per-event-kind wire redundancy for the burst channel. Critical events
/// are duplicated because UDP has no delivery guarantee; dedup on the
/// agent drops the extras.
pub(crate) fn redundancy_for(event: &TimedEvent) -> usize {
    use vkvm_core::event::InputEvent;
    match event.event {
        InputEvent::MouseMove { .. } => 1,
        InputEvent::MouseWheel { .. } => 2,
        InputEvent::MouseButton { .. } | InputEvent::Key { .. } => 3,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vkvm_core::event::{InputEvent, ScrollAxis};

    #[test]
    fn test_redundancy_policy() {
        let ts = 0;
        let moves = TimedEvent::new(InputEvent::MouseMove { dx: 1, dy: 1 }, ts);
        let wheel = TimedEvent::new(
            InputEvent::MouseWheel {
                delta: 120,
                axis: ScrollAxis::Vertical,
            },
            ts,
        );
        let button = TimedEvent::new(
            InputEvent::MouseButton {
                button: 1,
                pressed: true,
            },
            ts,
        );
        let key = TimedEvent::new(
            InputEvent::Key {
                code: 0x41,
                pressed: true,
                modifiers: 0,
            },
            ts,
        );

        assert_eq!(redundancy_for(&moves), 1);
        assert_eq!(redundancy_for(&wheel), 2);
        assert_eq!(redundancy_for(&button), 3);
        assert_eq!(redundancy_for(&key), 3);
    }
}
