//! Windows `SendInput` injection backend.
//!
//! Windows needs less synthesis help than macOS: there is no distinct
//! drag event type (applications infer drags from button state), and
//! modifier keys are plain key events — the flags-changed plan posts as
//! a regular key transition. Click counting is derived by the OS from
//! our event timing, but we keep the synthesizer's bookkeeping so the
//! cross-platform laws hold identically.
//!
//! Wire key codes are Windows virtual-key codes already, so the
//! translation table is the identity; codes above the VK range are still
//! rejected as unmapped rather than passed through.

#![cfg(target_os = "windows")]

use windows::Win32::Foundation::POINT;
use windows::Win32::UI::Input::KeyboardAndMouse::{
    SendInput, INPUT, INPUT_0, INPUT_KEYBOARD, INPUT_MOUSE, KEYBDINPUT, KEYBD_EVENT_FLAGS,
    KEYEVENTF_KEYUP, MOUSEEVENTF_HWHEEL, MOUSEEVENTF_LEFTDOWN, MOUSEEVENTF_LEFTUP,
    MOUSEEVENTF_MIDDLEDOWN, MOUSEEVENTF_MIDDLEUP, MOUSEEVENTF_MOVE, MOUSEEVENTF_RIGHTDOWN,
    MOUSEEVENTF_RIGHTUP, MOUSEEVENTF_WHEEL, MOUSEEVENTF_XDOWN, MOUSEEVENTF_XUP, MOUSEINPUT,
    MOUSE_EVENT_FLAGS, VIRTUAL_KEY,
};
use windows::Win32::UI::WindowsAndMessaging::GetCursorPos;

use super::{InjectionBackend, InjectionError, SyntheticEvent};

const WHEEL_DELTA: i32 = 120;
const XBUTTON1: u32 = 0x0001;
const XBUTTON2: u32 = 0x0002;

pub struct WindowsBackend;

impl WindowsBackend {
    pub fn new() -> Self {
        Self
    }

    fn send(&self, input: INPUT) -> Result<(), InjectionError> {
        // SAFETY: a single well-formed INPUT with the documented size.
        let sent = unsafe { SendInput(&[input], std::mem::size_of::<INPUT>() as i32) };
        if sent == 1 {
            Ok(())
        } else {
            Err(InjectionError::Backend("SendInput rejected the event".into()))
        }
    }

    fn mouse_input(flags: MOUSE_EVENT_FLAGS, dx: i32, dy: i32, data: i32) -> INPUT {
        INPUT {
            r#type: INPUT_MOUSE,
            Anonymous: INPUT_0 {
                mi: MOUSEINPUT {
                    dx,
                    dy,
                    mouseData: data as u32,
                    dwFlags: flags,
                    time: 0,
                    dwExtraInfo: 0,
                },
            },
        }
    }

    fn key_input(vk: u16, pressed: bool) -> INPUT {
        INPUT {
            r#type: INPUT_KEYBOARD,
            Anonymous: INPUT_0 {
                ki: KEYBDINPUT {
                    wVk: VIRTUAL_KEY(vk),
                    wScan: 0,
                    dwFlags: if pressed {
                        KEYBD_EVENT_FLAGS(0)
                    } else {
                        KEYEVENTF_KEYUP
                    },
                    time: 0,
                    dwExtraInfo: 0,
                },
            },
        }
    }
}

impl Default for WindowsBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InjectionBackend for WindowsBackend {
    fn cursor_position(&mut self) -> (i32, i32) {
        let mut point = POINT::default();
        // SAFETY: GetCursorPos writes into the provided POINT.
        if unsafe { GetCursorPos(&mut point) }.is_ok() {
            (point.x, point.y)
        } else {
            (0, 0)
        }
    }

    fn post(&mut self, event: &SyntheticEvent) -> Result<(), InjectionError> {
        match *event {
            SyntheticEvent::MouseMove { dx, dy, .. } => {
                // Relative MOUSEEVENTF_MOVE keeps the OS acceleration
                // curve in play; drags need no distinct event type here.
                self.send(Self::mouse_input(MOUSEEVENTF_MOVE, dx, dy, 0))
            }

            SyntheticEvent::MouseButton { button, pressed, .. } => {
                let (flags, data) = match (button, pressed) {
                    (1, true) => (MOUSEEVENTF_LEFTDOWN, 0),
                    (1, false) => (MOUSEEVENTF_LEFTUP, 0),
                    (2, true) => (MOUSEEVENTF_RIGHTDOWN, 0),
                    (2, false) => (MOUSEEVENTF_RIGHTUP, 0),
                    (3, true) => (MOUSEEVENTF_MIDDLEDOWN, 0),
                    (3, false) => (MOUSEEVENTF_MIDDLEUP, 0),
                    (4, true) => (MOUSEEVENTF_XDOWN, XBUTTON1 as i32),
                    (4, false) => (MOUSEEVENTF_XUP, XBUTTON1 as i32),
                    (5, true) => (MOUSEEVENTF_XDOWN, XBUTTON2 as i32),
                    (5, false) => (MOUSEEVENTF_XUP, XBUTTON2 as i32),
                    (other, _) => return Err(InjectionError::InvalidButton(other)),
                };
                self.send(Self::mouse_input(flags, 0, 0, data))
            }

            SyntheticEvent::Wheel {
                vertical,
                horizontal,
            } => {
                if vertical != 0 {
                    self.send(Self::mouse_input(
                        MOUSEEVENTF_WHEEL,
                        0,
                        0,
                        vertical * WHEEL_DELTA,
                    ))?;
                }
                if horizontal != 0 {
                    self.send(Self::mouse_input(
                        MOUSEEVENTF_HWHEEL,
                        0,
                        0,
                        horizontal * WHEEL_DELTA,
                    ))?;
                }
                Ok(())
            }

            SyntheticEvent::Key { code, pressed, .. } => {
                if code == 0 || code > 0xFE {
                    return Err(InjectionError::UnmappedKey(code));
                }
                self.send(Self::key_input(code, pressed))
            }

            SyntheticEvent::FlagsChanged { code, modifiers } => {
                if code == 0 || code > 0xFE {
                    return Err(InjectionError::UnmappedKey(code));
                }
                // Modifiers are ordinary keys on Windows. The transition
                // direction is recoverable from the mask: after a press
                // the modifier's bit is set.
                let pressed = {
                    use vkvm_core::keymap::windows_vk::modifier_bit;
                    modifier_bit(code)
                        .map(|bit| modifiers.0 & bit != 0)
                        .unwrap_or(true)
                };
                self.send(Self::key_input(code, pressed))
            }
        }
    }
}
