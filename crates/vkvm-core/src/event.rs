//! Wire-normalized input events.
//!
//! Every capture backend produces this shape and every injection backend
//! consumes it. The same type serializes to JSON for the control-channel
//! fallback path (`ControlMessage::Input`) and maps 1:1 onto the binary
//! datagram variants of the UDP burst channel.

use serde::{Deserialize, Serialize};

/// Scroll wheel axis.
///
/// The `u8` values match the wire encoding of the `MouseScroll` datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum ScrollAxis {
    Vertical = 0,
    Horizontal = 1,
}

impl TryFrom<u8> for ScrollAxis {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ScrollAxis::Vertical),
            1 => Ok(ScrollAxis::Horizontal),
            _ => Err(()),
        }
    }
}

/// A single normalized keyboard or mouse event.
///
/// - Mouse motion is always **relative** (deltas, never absolute
///   coordinates). Capture layers that receive absolute positions compute
///   deltas from the prior position.
/// - Buttons use canonical IDs: 1=left, 2=right, 3=middle, 4/5=extra side
///   buttons.
/// - Wheel deltas use the per-notch unit of 120 (the Windows `WHEEL_DELTA`
///   convention); normalization to OS-native units is the injector's job.
/// - Key codes are the source OS's virtual-key codes; translation to the
///   target OS happens at the injection boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputEvent {
    MouseMove {
        dx: i32,
        dy: i32,
    },
    MouseButton {
        /// Canonical button ID, 1..=5.
        button: u8,
        pressed: bool,
    },
    MouseWheel {
        /// Signed per-notch delta in units of 120.
        delta: i32,
        axis: ScrollAxis,
    },
    Key {
        /// Source-OS virtual-key code.
        code: u16,
        pressed: bool,
        /// Modifier bitmask active at capture time (see [`crate::keymap::modifiers`]).
        modifiers: u16,
    },
}

/// An [`InputEvent`] paired with its capture timestamp.
///
/// The timestamp is milliseconds since the Unix epoch, assigned by the
/// host at capture time and carried verbatim across the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimedEvent {
    #[serde(flatten)]
    pub event: InputEvent,
    /// Unix millisecond timestamp.
    pub ts: i64,
}

impl TimedEvent {
    pub fn new(event: InputEvent, ts: i64) -> Self {
        Self { event, ts }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scroll_axis_round_trips_through_u8() {
        assert_eq!(ScrollAxis::try_from(0), Ok(ScrollAxis::Vertical));
        assert_eq!(ScrollAxis::try_from(1), Ok(ScrollAxis::Horizontal));
        assert_eq!(ScrollAxis::try_from(2), Err(()));
    }

    #[test]
    fn test_input_event_json_uses_snake_case_tags() {
        let json = serde_json::to_string(&InputEvent::MouseMove { dx: 3, dy: -4 }).unwrap();
        assert!(json.contains(r#""type":"mouse_move""#), "got {json}");
    }

    #[test]
    fn test_timed_event_json_round_trip() {
        let original = TimedEvent::new(
            InputEvent::Key {
                code: 0x41,
                pressed: true,
                modifiers: 0,
            },
            1_700_000_000_000,
        );
        let json = serde_json::to_string(&original).unwrap();
        let restored: TimedEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, original);
    }
}
