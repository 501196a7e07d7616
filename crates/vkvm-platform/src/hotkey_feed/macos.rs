//! macOS listen-only CGEventTap hotkey feed.
//!
//! A session event tap in listen-only mode observes every key, modifier,
//! and mouse-button event without being able to block them — exactly
//! what chord matching needs. Creating the tap requires the Accessibility
//! permission; without it `CGEventTap::new` fails and hotkeys are
//! reported unavailable.
//!
//! Modifier keys never produce KeyDown/KeyUp on macOS; they arrive as
//! `FlagsChanged` events, and the *direction* of the transition is
//! recovered from whether the modifier's flag bit is set afterwards.

#![cfg(target_os = "macos")]

use core_foundation::runloop::{kCFRunLoopCommonModes, CFRunLoop};
use core_graphics::event::{
    CGEventFlags, CGEventTap, CGEventTapLocation, CGEventTapOptions, CGEventTapPlacement,
    CGEventType, EventField,
};
use tracing::info;

use vkvm_core::keymap::KeyMapper;

use super::{FeedError, TransitionFn};

pub fn start(on_transition: TransitionFn) -> Result<(), FeedError> {
    let (ready_tx, ready_rx) = std::sync::mpsc::channel::<Result<(), FeedError>>();

    std::thread::Builder::new()
        .name("vkvm-hotkey-tap".to_string())
        .spawn(move || run_tap(on_transition, ready_tx))
        .map_err(|e| FeedError::Unavailable(e.to_string()))?;

    ready_rx
        .recv()
        .unwrap_or_else(|_| Err(FeedError::Unavailable("tap thread died".into())))
}

fn run_tap(on_transition: TransitionFn, ready_tx: std::sync::mpsc::Sender<Result<(), FeedError>>) {
    let events_of_interest = vec![
        CGEventType::KeyDown,
        CGEventType::KeyUp,
        CGEventType::FlagsChanged,
        CGEventType::LeftMouseDown,
        CGEventType::LeftMouseUp,
        CGEventType::RightMouseDown,
        CGEventType::RightMouseUp,
        CGEventType::OtherMouseDown,
        CGEventType::OtherMouseUp,
    ];

    let tap = match CGEventTap::new(
        CGEventTapLocation::Session,
        CGEventTapPlacement::HeadInsertEventTap,
        CGEventTapOptions::ListenOnly,
        events_of_interest,
        move |_proxy, event_type, event| {
            handle_event(&on_transition, event_type, event);
            None // listen-only: never replace the event
        },
    ) {
        Ok(tap) => tap,
        Err(_) => {
            let _ = ready_tx.send(Err(FeedError::Unavailable(
                "CGEventTapCreate failed; is the Accessibility permission granted?".into(),
            )));
            return;
        }
    };

    let Ok(source) = tap.mach_port.create_runloop_source(0) else {
        let _ = ready_tx.send(Err(FeedError::Unavailable(
            "run-loop source creation failed".into(),
        )));
        return;
    };

    let run_loop = CFRunLoop::get_current();
    unsafe {
        run_loop.add_source(&source, kCFRunLoopCommonModes);
    }
    tap.enable();
    info!("macOS hotkey event tap running");
    let _ = ready_tx.send(Ok(()));
    CFRunLoop::run_current();
}

fn handle_event(
    on_transition: &TransitionFn,
    event_type: CGEventType,
    event: &core_graphics::event::CGEvent,
) {
    match event_type {
        CGEventType::KeyDown | CGEventType::KeyUp => {
            let keycode =
                event.get_integer_value_field(EventField::KEYBOARD_EVENT_KEYCODE) as u16;
            if let Some(token) = KeyMapper::macos_keycode_to_token(keycode) {
                on_transition(token, event_type == CGEventType::KeyDown);
            }
        }

        CGEventType::FlagsChanged => {
            let keycode =
                event.get_integer_value_field(EventField::KEYBOARD_EVENT_KEYCODE) as u16;
            let flags = event.get_flags();
            let state = match keycode {
                54 | 55 => Some(("CMD", flags.contains(CGEventFlags::CGEventFlagCommand))),
                56 | 60 => Some(("SHIFT", flags.contains(CGEventFlags::CGEventFlagShift))),
                58 | 61 => Some(("ALT", flags.contains(CGEventFlags::CGEventFlagAlternate))),
                59 | 62 => Some(("CTRL", flags.contains(CGEventFlags::CGEventFlagControl))),
                _ => None,
            };
            if let Some((token, is_down)) = state {
                on_transition(token, is_down);
            }
        }

        CGEventType::LeftMouseDown
        | CGEventType::LeftMouseUp
        | CGEventType::RightMouseDown
        | CGEventType::RightMouseUp
        | CGEventType::OtherMouseDown
        | CGEventType::OtherMouseUp => {
            let is_down = matches!(
                event_type,
                CGEventType::LeftMouseDown
                    | CGEventType::RightMouseDown
                    | CGEventType::OtherMouseDown
            );
            // 0-based button number; right is 1 and middle is 2 in CG
            // terms, which maps onto our MOUSE2/MOUSE3 tokens directly.
            let number = event.get_integer_value_field(EventField::MOUSE_EVENT_BUTTON_NUMBER);
            let token = match number {
                0 => "MOUSE1",
                1 => "MOUSE2",
                2 => "MOUSE3",
                3 => "MOUSE4",
                4 => "MOUSE5",
                _ => return,
            };
            on_transition(token, is_down);
        }

        _ => {}
    }
}
