//! Agent-side input injection.
//!
//! Injection is split in two:
//!
//! - [`Synthesizer`] (in [`synth`]) is a pure state machine that turns
//!   wire events into fully-specified [`SyntheticEvent`] plans — it owns
//!   drag tracking, click counting, modifier flag synthesis, and scroll
//!   normalization, and is tested without any OS.
//! - An [`InjectionBackend`] posts planned events using the target OS
//!   API and owns the key translation table for its platform.
//!
//! [`Injector`] glues the two together and exposes the four-call surface
//! the session coordinator uses.

use std::collections::HashSet;

use thiserror::Error;
use tracing::warn;
use vkvm_core::keymap::ModifierMask;

pub mod mock;
pub mod synth;

#[cfg(target_os = "macos")]
pub mod macos;

#[cfg(target_os = "windows")]
pub mod windows;

pub use synth::Synthesizer;

/// Error type for injection operations.
#[derive(Debug, Error)]
pub enum InjectionError {
    /// The wire key code has no mapping on the target OS. The event is
    /// dropped — never passed through as if the codes were identical.
    #[error("no key mapping for source code 0x{0:02X}")]
    UnmappedKey(u16),

    /// Button ID outside the canonical 1..=5 range.
    #[error("invalid mouse button: {0}")]
    InvalidButton(u8),

    /// The OS refused or failed the synthetic-input call.
    #[error("injection backend error: {0}")]
    Backend(String),

    /// No injection backend exists for this platform.
    #[error("input injection unsupported on {0}")]
    UnsupportedPlatform(&'static str),
}

/// A fully-specified synthetic input event, ready to post.
///
/// Coordinates are in the target's primary coordinate space (top-left
/// origin); backends flip the axis where their OS differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyntheticEvent {
    /// Pointer motion. `drag_button` is set when a button is held — the
    /// posted event must then be the OS's "dragged" type, which
    /// applications can observe.
    MouseMove {
        x: i32,
        y: i32,
        dx: i32,
        dy: i32,
        drag_button: Option<u8>,
    },
    /// Button transition with the click count attached so double- and
    /// triple-click semantics work on the target.
    MouseButton {
        button: u8,
        pressed: bool,
        x: i32,
        y: i32,
        click_count: u32,
    },
    /// Wheel scroll in OS-native line units (already normalized from the
    /// 120-per-notch wire unit).
    Wheel { vertical: i32, horizontal: i32 },
    /// Non-modifier key with the synthesized modifier mask attached.
    Key {
        /// Wire (source-OS) virtual-key code; the backend translates.
        code: u16,
        pressed: bool,
        modifiers: ModifierMask,
    },
    /// Modifier key transition, posted as the OS's "flags changed" form
    /// rather than a regular key event.
    FlagsChanged {
        /// Wire virtual-key code of the modifier that changed.
        code: u16,
        modifiers: ModifierMask,
    },
}

/// Posts synthetic events using the target OS API.
pub trait InjectionBackend: Send {
    /// Current system cursor position (top-left origin).
    fn cursor_position(&mut self) -> (i32, i32);

    /// Posts one synthetic event.
    ///
    /// # Errors
    ///
    /// [`InjectionError::UnmappedKey`] when a key event's wire code has
    /// no mapping on this platform; [`InjectionError::Backend`] for OS
    /// failures.
    fn post(&mut self, event: &SyntheticEvent) -> Result<(), InjectionError>;

    /// Whether the OS granted permission to post synthetic input.
    ///
    /// Checked once at construction (accessibility preflight). Denial
    /// does not fail injection calls — permission may be granted later —
    /// but the session surfaces it to the UI.
    fn permission_granted(&self) -> bool {
        true
    }
}

/// The agent-side injector: synthesizer + platform backend.
pub struct Injector {
    synth: Synthesizer,
    backend: Box<dyn InjectionBackend>,
    /// Key codes already reported as unmapped; each is logged once.
    unmapped_seen: HashSet<u16>,
}

impl Injector {
    pub fn new(backend: Box<dyn InjectionBackend>) -> Self {
        Self {
            synth: Synthesizer::new(),
            backend,
            unmapped_seen: HashSet::new(),
        }
    }

    /// Creates the injector for the current platform.
    ///
    /// # Errors
    ///
    /// [`InjectionError::UnsupportedPlatform`] where no backend exists.
    pub fn platform() -> Result<Self, InjectionError> {
        #[cfg(target_os = "macos")]
        {
            Ok(Self::new(Box::new(macos::MacosBackend::new())))
        }
        #[cfg(target_os = "windows")]
        {
            Ok(Self::new(Box::new(windows::WindowsBackend::new())))
        }
        #[cfg(not(any(target_os = "macos", target_os = "windows")))]
        {
            Err(InjectionError::UnsupportedPlatform(std::env::consts::OS))
        }
    }

    /// Injects relative pointer motion, preserving OS acceleration by
    /// populating both the new position and the relative delta fields.
    ///
    /// # Errors
    ///
    /// Returns [`InjectionError::Backend`] on OS failure.
    pub fn inject_mouse_move(&mut self, dx: i32, dy: i32) -> Result<(), InjectionError> {
        let cursor = self.backend.cursor_position();
        let event = self.synth.plan_move(cursor, dx, dy);
        self.backend.post(&event)
    }

    /// Injects a button transition with drag/click-count bookkeeping.
    ///
    /// # Errors
    ///
    /// Returns [`InjectionError::InvalidButton`] for IDs outside 1..=5 or
    /// [`InjectionError::Backend`] on OS failure.
    pub fn inject_mouse_button(&mut self, button: u8, pressed: bool) -> Result<(), InjectionError> {
        if !(1..=5).contains(&button) {
            return Err(InjectionError::InvalidButton(button));
        }
        let event = self.synth.plan_button(button, pressed, std::time::Instant::now());
        self.backend.post(&event)
    }

    /// Injects wheel scroll. Wire deltas use the 120-per-notch unit; sub-
    /// notch remainders still scroll at least one line in the right
    /// direction.
    ///
    /// # Errors
    ///
    /// Returns [`InjectionError::Backend`] on OS failure.
    pub fn inject_mouse_wheel(&mut self, delta_y: i32, delta_x: i32) -> Result<(), InjectionError> {
        let event = self.synth.plan_wheel(delta_y, delta_x);
        self.backend.post(&event)
    }

    /// Injects a key event. Modifier keys become flags-changed events and
    /// update the internal mask; other keys carry the mask (merged with
    /// the wire mask) so host-held combinations survive interleaving.
    ///
    /// Unmapped codes are dropped after a one-shot diagnostic per code.
    ///
    /// # Errors
    ///
    /// Returns [`InjectionError::Backend`] on OS failure.
    pub fn inject_key(
        &mut self,
        code: u16,
        pressed: bool,
        wire_modifiers: u16,
    ) -> Result<(), InjectionError> {
        let event = self.synth.plan_key(code, pressed, wire_modifiers);
        match self.backend.post(&event) {
            Err(InjectionError::UnmappedKey(code)) => {
                if self.unmapped_seen.insert(code) {
                    warn!("dropping key 0x{code:02X}: no mapping on this platform");
                }
                Ok(())
            }
            other => other,
        }
    }

    /// Clears drag and modifier state. Called on transport reconnect:
    /// the mask tracked before the drop is stale.
    pub fn reset(&mut self) {
        self.synth.reset();
    }

    /// Current synthesized modifier mask (diagnostics and tests).
    pub fn modifier_mask(&self) -> ModifierMask {
        self.synth.modifier_mask()
    }

    /// Whether the OS granted synthetic-input permission.
    pub fn permission_granted(&self) -> bool {
        self.backend.permission_granted()
    }
}
