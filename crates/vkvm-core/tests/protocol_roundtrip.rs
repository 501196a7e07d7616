//! Integration tests for the vkvm-core wire protocol.
//!
//! These tests live in `tests/` (outside `src/`) so they can only touch
//! the *public* API — the same API the `vkvm` application crate uses. If
//! a type or function is mistakenly made private, these fail to compile.
//!
//! They exercise the two codec families together with the sequence
//! counter and the dedup window, mirroring the path a datagram actually
//! takes: host assigns a sequence number, encodes, duplicates critical
//! events on the wire, and the agent decodes and suppresses the extras.

use vkvm_core::event::{InputEvent, ScrollAxis, TimedEvent};
use vkvm_core::protocol::control::{AuthPayload, SwitchPayload, SyncResponsePayload};
use vkvm_core::{
    decode_datagram, encode_datagram, ControlMessage, Datagram, Profile, SeqWindow,
    SequenceCounter,
};

fn roundtrip(dgram: Datagram) -> Datagram {
    let bytes = encode_datagram(&dgram);
    decode_datagram(&bytes).expect("decode failed")
}

// ── Datagram family ───────────────────────────────────────────────────────────

#[test]
fn test_every_event_variant_round_trips() {
    let events = [
        InputEvent::MouseMove { dx: -4, dy: 17 },
        InputEvent::MouseButton {
            button: 3,
            pressed: false,
        },
        InputEvent::MouseWheel {
            delta: 240,
            axis: ScrollAxis::Horizontal,
        },
        InputEvent::Key {
            code: 0x0D,
            pressed: true,
            modifiers: 0x0041,
        },
    ];

    let counter = SequenceCounter::new();
    for event in events {
        let dgram = Datagram::Event {
            seq: counter.next(),
            event: TimedEvent::new(event, 1_699_999_999_999),
        };
        assert_eq!(roundtrip(dgram), dgram);
    }
}

#[test]
fn test_session_packets_round_trip() {
    for dgram in [
        Datagram::Register { ts: 1 },
        Datagram::Heartbeat { ts: 2 },
        Datagram::Ack { ts: 3 },
    ] {
        assert_eq!(roundtrip(dgram), dgram);
    }
}

#[test]
fn test_redundant_copies_dedupe_to_one_dispatch() {
    // A key event leaves the host three times with the same sequence
    // number; the agent dispatches exactly the first copy.
    let counter = SequenceCounter::new();
    let dgram = Datagram::Event {
        seq: counter.next(),
        event: TimedEvent::new(
            InputEvent::Key {
                code: 0x41,
                pressed: true,
                modifiers: 0,
            },
            7,
        ),
    };
    let wire_copies = vec![encode_datagram(&dgram); 3];

    let mut window = SeqWindow::new();
    let mut dispatched = 0;
    for copy in &wire_copies {
        if let Datagram::Event { seq, .. } = decode_datagram(copy).unwrap() {
            if !window.is_duplicate(seq) {
                dispatched += 1;
            }
        }
    }
    assert_eq!(dispatched, 1);
}

#[test]
fn test_interleaved_duplicates_preserve_first_copy_order() {
    // Copies of distinct events may interleave on the wire; the surviving
    // dispatch order equals first-arrival order.
    let counter = SequenceCounter::new();
    let a = Datagram::Event {
        seq: counter.next(),
        event: TimedEvent::new(
            InputEvent::MouseButton {
                button: 1,
                pressed: true,
            },
            1,
        ),
    };
    let b = Datagram::Event {
        seq: counter.next(),
        event: TimedEvent::new(
            InputEvent::MouseButton {
                button: 1,
                pressed: false,
            },
            2,
        ),
    };

    let wire = [&a, &a, &b, &a, &b, &b].map(encode_datagram);

    let mut window = SeqWindow::new();
    let mut dispatched = Vec::new();
    for bytes in &wire {
        if let Datagram::Event { seq, event } = decode_datagram(bytes).unwrap() {
            if !window.is_duplicate(seq) {
                dispatched.push((seq, event));
            }
        }
    }

    assert_eq!(dispatched.len(), 2);
    assert!(dispatched[0].0 < dispatched[1].0, "press before release");
}

#[test]
fn test_sequence_numbers_are_never_zero() {
    // Seq 0 is reserved for session packets, which skip the dedup window.
    let counter = SequenceCounter::new();
    for _ in 0..1000 {
        assert_ne!(counter.next(), 0);
    }
}

// ── Control family ────────────────────────────────────────────────────────────

#[test]
fn test_control_messages_round_trip_through_json() {
    let messages = vec![
        ControlMessage::Auth(AuthPayload {
            token: "tok".into(),
            agent_name: "mac".into(),
            agent_version: "0.2.0".into(),
        }),
        ControlMessage::Switch(SwitchPayload {
            profile: "PC1".into(),
            origin: "host".into(),
            propagate: false,
        }),
        ControlMessage::SyncReq,
        ControlMessage::SyncResp(SyncResponsePayload {
            profiles: vec![Profile::named("PC1")],
            usb_forwarding_enabled: true,
        }),
        ControlMessage::Input(TimedEvent::new(InputEvent::MouseMove { dx: 1, dy: 2 }, 3)),
        ControlMessage::Ping,
    ];

    for msg in messages {
        let json = msg.to_json().unwrap();
        assert_eq!(ControlMessage::from_json(&json).unwrap(), msg);
    }
}

#[test]
fn test_input_fallback_and_datagram_agree_on_event_shape() {
    // The same InputEvent value travels either path; both must preserve it.
    let event = TimedEvent::new(
        InputEvent::MouseWheel {
            delta: -120,
            axis: ScrollAxis::Vertical,
        },
        42,
    );

    let via_control = match ControlMessage::from_json(
        &ControlMessage::Input(event).to_json().unwrap(),
    )
    .unwrap()
    {
        ControlMessage::Input(e) => e,
        other => panic!("unexpected message: {other:?}"),
    };

    let via_datagram = match roundtrip(Datagram::Event { seq: 1, event }) {
        Datagram::Event { event, .. } => event,
        other => panic!("unexpected datagram: {other:?}"),
    };

    assert_eq!(via_control, event);
    assert_eq!(via_datagram, event);
}
