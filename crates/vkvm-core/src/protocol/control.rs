//! JSON control messages for the reliable channel.
//!
//! Wire shape is `{"type": "...", "payload": {...}}`. Message types:
//!
//! | type        | direction     | purpose                                   |
//! |-------------|---------------|-------------------------------------------|
//! | `auth`      | agent → host  | bearer token + agent identity             |
//! | `switch`    | both          | request or announce a profile switch      |
//! | `sync_req`  | agent → host  | request the full profile list             |
//! | `sync_resp` | host → agent  | profile list + forwarding flag            |
//! | `input`     | host → agent  | input event fallback when UDP is closed   |
//! | `ping`      | both          | application-level heartbeat               |

use serde::{Deserialize, Serialize};

use crate::config::Profile;
use crate::event::TimedEvent;

/// Payload of an `auth` message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthPayload {
    pub token: String,
    pub agent_name: String,
    pub agent_version: String,
}

/// Payload of a `switch` message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchPayload {
    /// Name of the profile to switch to.
    pub profile: String,
    /// `"host"` or the originating agent's identity.
    pub origin: String,
    /// Whether the receiver should propagate the switch further.
    /// Host broadcasts set this to `false` to prevent loops.
    pub propagate: bool,
}

/// Payload of a `sync_resp` message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncResponsePayload {
    /// The host's authoritative profile list.
    pub profiles: Vec<Profile>,
    /// Whether input forwarding is enabled host-side.
    #[serde(default)]
    pub usb_forwarding_enabled: bool,
}

/// All control-channel messages, discriminated by the `type` field.
///
/// Unknown type strings fail deserialization; the transport logs and
/// drops such frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ControlMessage {
    Auth(AuthPayload),
    Switch(SwitchPayload),
    SyncReq,
    SyncResp(SyncResponsePayload),
    Input(TimedEvent),
    Ping,
}

impl ControlMessage {
    /// Serializes to the JSON text frame sent on the control channel.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Parses a received text frame.
    pub fn from_json(data: &str) -> serde_json::Result<Self> {
        serde_json::from_str(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::InputEvent;

    fn round_trip(msg: &ControlMessage) -> ControlMessage {
        let json = msg.to_json().expect("serialize");
        ControlMessage::from_json(&json).expect("deserialize")
    }

    #[test]
    fn test_auth_round_trip() {
        let msg = ControlMessage::Auth(AuthPayload {
            token: "s3cret".to_string(),
            agent_name: "mac-studio".to_string(),
            agent_version: "0.2.0".to_string(),
        });
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn test_switch_round_trip() {
        let msg = ControlMessage::Switch(SwitchPayload {
            profile: "Mac".to_string(),
            origin: "host".to_string(),
            propagate: false,
        });
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn test_sync_req_has_no_payload() {
        let json = ControlMessage::SyncReq.to_json().unwrap();
        assert_eq!(json, r#"{"type":"sync_req"}"#);
        assert_eq!(round_trip(&ControlMessage::SyncReq), ControlMessage::SyncReq);
    }

    #[test]
    fn test_sync_resp_round_trip() {
        let msg = ControlMessage::SyncResp(SyncResponsePayload {
            profiles: vec![Profile::named("PC1"), Profile::named("Mac")],
            usb_forwarding_enabled: true,
        });
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn test_input_fallback_round_trip() {
        let msg = ControlMessage::Input(TimedEvent::new(
            InputEvent::MouseButton {
                button: 1,
                pressed: true,
            },
            1_700_000_000_123,
        ));
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn test_unknown_type_fails_deserialization() {
        let result = ControlMessage::from_json(r#"{"type":"teleport","payload":{}}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_type_tag_uses_snake_case() {
        let json = ControlMessage::SyncResp(SyncResponsePayload {
            profiles: vec![],
            usb_forwarding_enabled: false,
        })
        .to_json()
        .unwrap();
        assert!(json.contains(r#""type":"sync_resp""#), "got {json}");
    }
}
