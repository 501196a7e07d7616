//! macOS CoreGraphics injection backend.
//!
//! Posts synthetic events at the `kCGHIDEventTap` level — the same level
//! as physical input, so applications cannot distinguish them from real
//! hardware events.
//!
//! Platform details this backend owns:
//!
//! - Key translation from wire virtual-key codes to `CGKeyCode`s via the
//!   static table in `vkvm-core`.
//! - Drag events: `LeftMouseDragged`/`RightMouseDragged`/
//!   `OtherMouseDragged` instead of `MouseMoved` while a button is held.
//! - `kCGMouseEventClickState` carries the click count so double- and
//!   triple-clicks work.
//! - `kCGMouseEventDeltaX/Y` are populated on moves so pointer
//!   acceleration applies to the forwarded motion.
//! - Modifier keys post as `FlagsChanged` events with the full flag set.
//!
//! # Accessibility permission
//!
//! `CGEventPost` requires the Accessibility permission (System Settings →
//! Privacy & Security). Without it the posts silently do nothing, so the
//! backend preflights `AXIsProcessTrusted` at construction, logs a single
//! diagnostic, and keeps accepting events — the permission may be granted
//! while we run, and the session surfaces the state to the UI.

#![cfg(target_os = "macos")]

use core_graphics::event::{
    CGEvent, CGEventFlags, CGEventTapLocation, CGEventType, CGMouseButton, CGScrollEventUnit,
    EventField,
};
use core_graphics::event_source::{CGEventSource, CGEventSourceStateID};
use core_graphics::geometry::CGPoint;
use tracing::warn;

use vkvm_core::keymap::{KeyMapper, ModifierMask};

use super::{InjectionBackend, InjectionError, SyntheticEvent};

#[link(name = "ApplicationServices", kind = "framework")]
extern "C" {
    fn AXIsProcessTrusted() -> bool;
}

pub struct MacosBackend {
    permission: bool,
}

impl MacosBackend {
    pub fn new() -> Self {
        // SAFETY: plain query with no arguments or side effects.
        let permission = unsafe { AXIsProcessTrusted() };
        if !permission {
            warn!(
                "Accessibility permission not granted; synthetic input will be ignored \
                 until the operator enables it in System Settings"
            );
        }
        Self { permission }
    }

    fn source(&self) -> Result<CGEventSource, InjectionError> {
        CGEventSource::new(CGEventSourceStateID::HIDSystemState)
            .map_err(|_| InjectionError::Backend("CGEventSource creation failed".into()))
    }

    fn post_event(&self, event: CGEvent) {
        event.post(CGEventTapLocation::HID);
    }
}

impl Default for MacosBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Maps the wire modifier mask to CoreGraphics event flags.
fn flags_for(mask: ModifierMask) -> CGEventFlags {
    let mut flags = CGEventFlags::empty();
    if mask.ctrl() {
        flags |= CGEventFlags::CGEventFlagControl;
    }
    if mask.shift() {
        flags |= CGEventFlags::CGEventFlagShift;
    }
    if mask.alt() {
        flags |= CGEventFlags::CGEventFlagAlternate;
    }
    if mask.meta() {
        flags |= CGEventFlags::CGEventFlagCommand;
    }
    flags
}

/// (event type, CG button) for a button transition, honoring drag rules.
fn button_event_type(button: u8, pressed: bool) -> (CGEventType, CGMouseButton) {
    match (button, pressed) {
        (1, true) => (CGEventType::LeftMouseDown, CGMouseButton::Left),
        (1, false) => (CGEventType::LeftMouseUp, CGMouseButton::Left),
        (2, true) => (CGEventType::RightMouseDown, CGMouseButton::Right),
        (2, false) => (CGEventType::RightMouseUp, CGMouseButton::Right),
        // Middle and the extra side buttons all ride the "other" channel;
        // the button number field distinguishes them.
        (_, true) => (CGEventType::OtherMouseDown, CGMouseButton::Center),
        (_, false) => (CGEventType::OtherMouseUp, CGMouseButton::Center),
    }
}

impl InjectionBackend for MacosBackend {
    fn cursor_position(&mut self) -> (i32, i32) {
        // An empty CGEvent reports the current cursor location in global
        // top-left coordinates.
        match CGEventSource::new(CGEventSourceStateID::HIDSystemState)
            .and_then(CGEvent::new)
        {
            Ok(event) => {
                let loc = event.location();
                (loc.x as i32, loc.y as i32)
            }
            Err(_) => (0, 0),
        }
    }

    fn post(&mut self, event: &SyntheticEvent) -> Result<(), InjectionError> {
        match *event {
            SyntheticEvent::MouseMove {
                x,
                y,
                dx,
                dy,
                drag_button,
            } => {
                let (event_type, cg_button) = match drag_button {
                    None => (CGEventType::MouseMoved, CGMouseButton::Left),
                    Some(1) => (CGEventType::LeftMouseDragged, CGMouseButton::Left),
                    Some(2) => (CGEventType::RightMouseDragged, CGMouseButton::Right),
                    Some(_) => (CGEventType::OtherMouseDragged, CGMouseButton::Center),
                };
                let cg_event = CGEvent::new_mouse_event(
                    self.source()?,
                    event_type,
                    CGPoint::new(x as f64, y as f64),
                    cg_button,
                )
                .map_err(|_| InjectionError::Backend("mouse move event creation failed".into()))?;
                // Relative deltas make the target's acceleration curve
                // apply to forwarded motion.
                cg_event.set_integer_value_field(EventField::MOUSE_EVENT_DELTA_X, dx as i64);
                cg_event.set_integer_value_field(EventField::MOUSE_EVENT_DELTA_Y, dy as i64);
                self.post_event(cg_event);
                Ok(())
            }

            SyntheticEvent::MouseButton {
                button,
                pressed,
                x,
                y,
                click_count,
            } => {
                let (event_type, cg_button) = button_event_type(button, pressed);
                let cg_event = CGEvent::new_mouse_event(
                    self.source()?,
                    event_type,
                    CGPoint::new(x as f64, y as f64),
                    cg_button,
                )
                .map_err(|_| InjectionError::Backend("button event creation failed".into()))?;
                cg_event
                    .set_integer_value_field(EventField::MOUSE_EVENT_CLICK_STATE, click_count as i64);
                if button >= 3 {
                    // 0-based button number on the "other" channel.
                    cg_event.set_integer_value_field(
                        EventField::MOUSE_EVENT_BUTTON_NUMBER,
                        (button - 1) as i64,
                    );
                }
                self.post_event(cg_event);
                Ok(())
            }

            SyntheticEvent::Wheel {
                vertical,
                horizontal,
            } => {
                let cg_event = CGEvent::new_scroll_event(
                    self.source()?,
                    CGScrollEventUnit::Line,
                    2,
                    vertical,
                    horizontal,
                    0,
                )
                .map_err(|_| InjectionError::Backend("scroll event creation failed".into()))?;
                self.post_event(cg_event);
                Ok(())
            }

            SyntheticEvent::Key {
                code,
                pressed,
                modifiers,
            } => {
                let keycode = KeyMapper::vk_to_macos_keycode(code)
                    .ok_or(InjectionError::UnmappedKey(code))?;
                let cg_event = CGEvent::new_keyboard_event(self.source()?, keycode, pressed)
                    .map_err(|_| InjectionError::Backend("key event creation failed".into()))?;
                cg_event.set_flags(flags_for(modifiers));
                self.post_event(cg_event);
                Ok(())
            }

            SyntheticEvent::FlagsChanged { code, modifiers } => {
                let keycode = KeyMapper::vk_to_macos_keycode(code)
                    .ok_or(InjectionError::UnmappedKey(code))?;
                // Modifiers are a distinct event type on macOS: a
                // FlagsChanged carrying the full post-transition flag set.
                let cg_event = CGEvent::new_keyboard_event(self.source()?, keycode, true)
                    .map_err(|_| InjectionError::Backend("flags event creation failed".into()))?;
                cg_event.set_type(CGEventType::FlagsChanged);
                cg_event.set_flags(flags_for(modifiers));
                self.post_event(cg_event);
                Ok(())
            }
        }
    }

    fn permission_granted(&self) -> bool {
        self.permission
    }
}
