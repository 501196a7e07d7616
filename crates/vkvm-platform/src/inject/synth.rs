//! Pure synthesis planner for injected input.
//!
//! Owns every piece of injection state that applications on the target
//! can observe:
//!
//! - **Drag tracking** – while any button is held, pointer motion must be
//!   posted as the matching "dragged" event, not "moved".
//! - **Click counting** – a left press within 300 ms and 5 px of the
//!   previous press increments the count; otherwise it resets to 1.
//! - **Modifier synthesis** – modifier keys update an internal bitmask
//!   and are posted as flags-changed events; the mask is attached to
//!   every non-modifier key.
//! - **Scroll normalization** – wire deltas are 120 per notch; OS lines
//!   are delta/120, with sub-notch remainders rounded away from zero so
//!   no scroll input is lost.
//!
//! Nothing here touches an OS API, so all of it is unit-tested directly.

use std::time::{Duration, Instant};

use vkvm_core::keymap::{KeyMapper, ModifierMask};

use super::SyntheticEvent;

/// Two presses closer together than this (and within
/// [`CLICK_RADIUS_PX`]) count as a multi-click.
pub const CLICK_INTERVAL: Duration = Duration::from_millis(300);

/// Maximum distance between consecutive presses of a multi-click.
pub const CLICK_RADIUS_PX: i32 = 5;

/// One wire scroll notch (the Windows `WHEEL_DELTA` convention).
pub const WHEEL_NOTCH: i32 = 120;

#[derive(Debug, Clone, Copy)]
struct PressRecord {
    at: Instant,
    pos: (i32, i32),
    count: u32,
}

/// Stateful planner turning wire events into [`SyntheticEvent`]s.
pub struct Synthesizer {
    /// Bitmask of held buttons, bit N-1 for button N.
    buttons_down: u8,
    modifiers: ModifierMask,
    last_left_press: Option<PressRecord>,
    /// Last planned pointer position; button events are posted here.
    position: (i32, i32),
}

impl Synthesizer {
    pub fn new() -> Self {
        Self {
            buttons_down: 0,
            modifiers: ModifierMask::default(),
            last_left_press: None,
            position: (0, 0),
        }
    }

    /// Plans pointer motion: the current cursor position plus the delta,
    /// as a drag when any button is held.
    pub fn plan_move(&mut self, cursor: (i32, i32), dx: i32, dy: i32) -> SyntheticEvent {
        let x = cursor.0.saturating_add(dx);
        let y = cursor.1.saturating_add(dy);
        self.position = (x, y);
        SyntheticEvent::MouseMove {
            x,
            y,
            dx,
            dy,
            drag_button: self.lowest_held_button(),
        }
    }

    /// Plans a button transition, maintaining held state and click count.
    pub fn plan_button(&mut self, button: u8, pressed: bool, now: Instant) -> SyntheticEvent {
        let bit = 1u8 << (button - 1);
        if pressed {
            self.buttons_down |= bit;
        } else {
            self.buttons_down &= !bit;
        }

        let click_count = if button == 1 && pressed {
            let count = next_click_count(self.last_left_press.as_ref(), now, self.position);
            self.last_left_press = Some(PressRecord {
                at: now,
                pos: self.position,
                count,
            });
            count
        } else if button == 1 {
            // Release carries the count of the press that started it.
            self.last_left_press.map(|r| r.count).unwrap_or(1)
        } else {
            1
        };

        SyntheticEvent::MouseButton {
            button,
            pressed,
            x: self.position.0,
            y: self.position.1,
            click_count,
        }
    }

    /// Plans a wheel event, converting notch units to lines. A non-zero
    /// sub-notch delta still produces one line in its direction.
    pub fn plan_wheel(&mut self, delta_y: i32, delta_x: i32) -> SyntheticEvent {
        SyntheticEvent::Wheel {
            vertical: notch_to_lines(delta_y),
            horizontal: notch_to_lines(delta_x),
        }
    }

    /// Plans a key event. Modifier keys update the mask and become
    /// flags-changed plans; other keys carry the synthesized mask merged
    /// with the wire-provided one.
    pub fn plan_key(&mut self, code: u16, pressed: bool, wire_modifiers: u16) -> SyntheticEvent {
        if KeyMapper::is_modifier_vk(code) {
            self.modifiers.apply(code, pressed);
            SyntheticEvent::FlagsChanged {
                code,
                modifiers: self.modifiers,
            }
        } else {
            SyntheticEvent::Key {
                code,
                pressed,
                modifiers: ModifierMask(self.modifiers.0 | wire_modifiers),
            }
        }
    }

    /// Clears button and modifier state (transport reconnect).
    pub fn reset(&mut self) {
        self.buttons_down = 0;
        self.modifiers = ModifierMask::default();
        self.last_left_press = None;
    }

    pub fn modifier_mask(&self) -> ModifierMask {
        self.modifiers
    }

    fn lowest_held_button(&self) -> Option<u8> {
        (1..=5).find(|b| self.buttons_down & (1 << (b - 1)) != 0)
    }
}

impl Default for Synthesizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Click-count rule: increment iff within [`CLICK_INTERVAL`] and
/// [`CLICK_RADIUS_PX`] of the previous press, else restart at 1.
fn next_click_count(prev: Option<&PressRecord>, now: Instant, pos: (i32, i32)) -> u32 {
    match prev {
        Some(record)
            if now.duration_since(record.at) <= CLICK_INTERVAL
                && (pos.0 - record.pos.0).abs() <= CLICK_RADIUS_PX
                && (pos.1 - record.pos.1).abs() <= CLICK_RADIUS_PX =>
        {
            record.count + 1
        }
        _ => 1,
    }
}

/// Converts a 120-per-notch wire delta to OS scroll lines, keeping at
/// least one line for non-zero sub-notch deltas (trackpads and high-
/// resolution wheels report fractions of a notch).
fn notch_to_lines(delta: i32) -> i32 {
    if delta == 0 {
        0
    } else if delta.abs() < WHEEL_NOTCH {
        delta.signum()
    } else {
        delta / WHEEL_NOTCH
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
