//! Binary codec for UDP burst-channel datagrams.
//!
//! Wire format:
//! ```text
//! [type:1][seq:4][timestamp:8][payload:N]
//! ```
//! Total header size: 13 bytes. All multi-byte integers are big-endian.
//!
//! Payload sizes are fixed per type, so no length prefix is needed:
//!
//! | type | name        | payload                                      | total |
//! |------|-------------|----------------------------------------------|-------|
//! | 0x01 | MouseMove   | `dx:i32  dy:i32`                             | 21 B  |
//! | 0x02 | MouseButton | `button:u8  pressed:u8`                      | 15 B  |
//! | 0x03 | MouseScroll | `delta:i32  axis:u8`                         | 18 B  |
//! | 0x04 | KeyEvent    | `key:u16  pressed:u8  modifiers:u16`         | 18 B  |
//! | 0x10 | Register    | –                                            | 13 B  |
//! | 0x11 | Heartbeat   | –                                            | 13 B  |
//! | 0x12 | Ack         | –                                            | 13 B  |

use thiserror::Error;

use crate::event::{InputEvent, ScrollAxis, TimedEvent};

/// Size of the common datagram header in bytes.
pub const HEADER_SIZE: usize = 13;

/// Largest possible encoded datagram (MouseMove: 13 + 8).
pub const MAX_DATAGRAM_SIZE: usize = HEADER_SIZE + 8;

const TYPE_MOUSE_MOVE: u8 = 0x01;
const TYPE_MOUSE_BUTTON: u8 = 0x02;
const TYPE_MOUSE_SCROLL: u8 = 0x03;
const TYPE_KEY_EVENT: u8 = 0x04;
const TYPE_REGISTER: u8 = 0x10;
const TYPE_HEARTBEAT: u8 = 0x11;
const TYPE_ACK: u8 = 0x12;

/// Errors that can occur while decoding a datagram.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DatagramError {
    /// The buffer is shorter than the header or the fixed payload size.
    #[error("datagram too short: need {needed} bytes, got {available}")]
    Truncated { needed: usize, available: usize },

    /// The type byte is not a recognized value.
    #[error("unknown datagram type: 0x{0:02X}")]
    UnknownType(u8),

    /// A payload field holds a value outside its domain (e.g. scroll axis > 1).
    #[error("malformed payload: {0}")]
    Malformed(&'static str),
}

/// One burst-channel datagram.
///
/// `Event` wraps an input event with its host-assigned sequence number;
/// `Register`/`Heartbeat`/`Ack` are the header-only session-management
/// packets (idempotent by construction, exempt from dedup).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Datagram {
    Event { seq: u32, event: TimedEvent },
    Register { ts: i64 },
    Heartbeat { ts: i64 },
    Ack { ts: i64 },
}

/// Encodes a datagram into its wire representation.
///
/// Encoding is infallible: every representable [`Datagram`] has a fixed,
/// known size.
pub fn encode_datagram(dgram: &Datagram) -> Vec<u8> {
    let (ty, seq, ts, payload_len) = match dgram {
        Datagram::Event { seq, event } => {
            let (ty, len) = match event.event {
                InputEvent::MouseMove { .. } => (TYPE_MOUSE_MOVE, 8),
                InputEvent::MouseButton { .. } => (TYPE_MOUSE_BUTTON, 2),
                InputEvent::MouseWheel { .. } => (TYPE_MOUSE_SCROLL, 5),
                InputEvent::Key { .. } => (TYPE_KEY_EVENT, 5),
            };
            (ty, *seq, event.ts, len)
        }
        Datagram::Register { ts } => (TYPE_REGISTER, 0, *ts, 0),
        Datagram::Heartbeat { ts } => (TYPE_HEARTBEAT, 0, *ts, 0),
        Datagram::Ack { ts } => (TYPE_ACK, 0, *ts, 0),
    };

    let mut buf = Vec::with_capacity(HEADER_SIZE + payload_len);
    buf.push(ty);
    buf.extend_from_slice(&seq.to_be_bytes());
    buf.extend_from_slice(&ts.to_be_bytes());

    if let Datagram::Event { event, .. } = dgram {
        match event.event {
            InputEvent::MouseMove { dx, dy } => {
                buf.extend_from_slice(&dx.to_be_bytes());
                buf.extend_from_slice(&dy.to_be_bytes());
            }
            InputEvent::MouseButton { button, pressed } => {
                buf.push(button);
                buf.push(pressed as u8);
            }
            InputEvent::MouseWheel { delta, axis } => {
                buf.extend_from_slice(&delta.to_be_bytes());
                buf.push(axis as u8);
            }
            InputEvent::Key {
                code,
                pressed,
                modifiers,
            } => {
                buf.extend_from_slice(&code.to_be_bytes());
                buf.push(pressed as u8);
                buf.extend_from_slice(&modifiers.to_be_bytes());
            }
        }
    }

    buf
}

/// Decodes one datagram from `data`.
///
/// # Errors
///
/// Returns [`DatagramError::Truncated`] if `data` is shorter than the
/// header or the type's fixed payload, [`DatagramError::UnknownType`] for
/// unrecognized type bytes, and [`DatagramError::Malformed`] for payload
/// fields outside their domain.
pub fn decode_datagram(data: &[u8]) -> Result<Datagram, DatagramError> {
    if data.len() < HEADER_SIZE {
        return Err(DatagramError::Truncated {
            needed: HEADER_SIZE,
            available: data.len(),
        });
    }

    let ty = data[0];
    let seq = u32::from_be_bytes([data[1], data[2], data[3], data[4]]);
    let ts = i64::from_be_bytes([
        data[5], data[6], data[7], data[8], data[9], data[10], data[11], data[12],
    ]);
    let payload = &data[HEADER_SIZE..];

    let event = match ty {
        TYPE_MOUSE_MOVE => {
            require(payload, 8)?;
            InputEvent::MouseMove {
                dx: i32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]),
                dy: i32::from_be_bytes([payload[4], payload[5], payload[6], payload[7]]),
            }
        }
        TYPE_MOUSE_BUTTON => {
            require(payload, 2)?;
            InputEvent::MouseButton {
                button: payload[0],
                pressed: payload[1] != 0,
            }
        }
        TYPE_MOUSE_SCROLL => {
            require(payload, 5)?;
            let axis = ScrollAxis::try_from(payload[4])
                .map_err(|_| DatagramError::Malformed("scroll axis out of range"))?;
            InputEvent::MouseWheel {
                delta: i32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]),
                axis,
            }
        }
        TYPE_KEY_EVENT => {
            require(payload, 5)?;
            InputEvent::Key {
                code: u16::from_be_bytes([payload[0], payload[1]]),
                pressed: payload[2] != 0,
                modifiers: u16::from_be_bytes([payload[3], payload[4]]),
            }
        }
        TYPE_REGISTER => return Ok(Datagram::Register { ts }),
        TYPE_HEARTBEAT => return Ok(Datagram::Heartbeat { ts }),
        TYPE_ACK => return Ok(Datagram::Ack { ts }),
        other => return Err(DatagramError::UnknownType(other)),
    };

    Ok(Datagram::Event {
        seq,
        event: TimedEvent::new(event, ts),
    })
}

fn require(payload: &[u8], needed: usize) -> Result<(), DatagramError> {
    if payload.len() < needed {
        Err(DatagramError::Truncated {
            needed: HEADER_SIZE + needed,
            available: HEADER_SIZE + payload.len(),
        })
    } else {
        Ok(())
    }
}
