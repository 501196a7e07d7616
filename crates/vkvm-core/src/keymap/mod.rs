//! Key code translation tables for cross-platform input forwarding.
//!
//! The wire representation is the **Windows virtual-key code** of the
//! captured key (the host is the machine with the physical keyboard, and
//! capture is Windows-first). Injection backends translate to their
//! target OS at the boundary; a code with no mapping is reported as an
//! error and never silently passed through as if identical.
//!
//! The hotkey engine works on a third representation — upper-case token
//! names like `CTRL` or `F5` — produced from whichever raw codes the
//! platform hook delivers.

pub mod macos_cg;
pub mod windows_vk;

/// Wire modifier bitmask shared by capture and injection.
///
/// Bit layout (low byte mirrors the usual HID ordering):
/// - bit 0: Left Ctrl,  bit 1: Right Ctrl
/// - bit 2: Left Shift, bit 3: Right Shift
/// - bit 4: Left Alt,   bit 5: Right Alt
/// - bit 6: Left Meta (Win/Cmd), bit 7: Right Meta
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ModifierMask(pub u16);

impl ModifierMask {
    pub const LEFT_CTRL: u16 = 1 << 0;
    pub const RIGHT_CTRL: u16 = 1 << 1;
    pub const LEFT_SHIFT: u16 = 1 << 2;
    pub const RIGHT_SHIFT: u16 = 1 << 3;
    pub const LEFT_ALT: u16 = 1 << 4;
    pub const RIGHT_ALT: u16 = 1 << 5;
    pub const LEFT_META: u16 = 1 << 6;
    pub const RIGHT_META: u16 = 1 << 7;

    pub fn ctrl(&self) -> bool {
        self.0 & (Self::LEFT_CTRL | Self::RIGHT_CTRL) != 0
    }

    pub fn shift(&self) -> bool {
        self.0 & (Self::LEFT_SHIFT | Self::RIGHT_SHIFT) != 0
    }

    pub fn alt(&self) -> bool {
        self.0 & (Self::LEFT_ALT | Self::RIGHT_ALT) != 0
    }

    pub fn meta(&self) -> bool {
        self.0 & (Self::LEFT_META | Self::RIGHT_META) != 0
    }

    /// Applies one modifier key transition. Non-modifier codes leave the
    /// mask untouched.
    pub fn apply(&mut self, vk: u16, pressed: bool) {
        if let Some(bit) = windows_vk::modifier_bit(vk) {
            if pressed {
                self.0 |= bit;
            } else {
                self.0 &= !bit;
            }
        }
    }
}

/// Unified key mapper facade over the per-platform tables.
pub struct KeyMapper;

impl KeyMapper {
    /// True when the virtual-key code is a modifier key (Ctrl, Shift,
    /// Alt, Win/Cmd — left, right, or generic variant).
    pub fn is_modifier_vk(vk: u16) -> bool {
        windows_vk::modifier_bit(vk).is_some()
    }

    /// Translates a wire virtual-key code to the hotkey token name.
    pub fn vk_to_token(vk: u16) -> Option<&'static str> {
        windows_vk::vk_to_token(vk)
    }

    /// Translates a wire virtual-key code to a macOS `CGKeyCode`.
    ///
    /// Returns `None` when the code has no macOS equivalent; the injector
    /// reports such events as unmapped and drops them.
    pub fn vk_to_macos_keycode(vk: u16) -> Option<u16> {
        macos_cg::vk_to_cgkeycode(vk)
    }

    /// Translates a macOS `CGKeyCode` to the hotkey token name (used by
    /// the macOS hotkey feed).
    pub fn macos_keycode_to_token(code: u16) -> Option<&'static str> {
        macos_cg::cgkeycode_to_token(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modifier_mask_tracks_press_and_release() {
        let mut mask = ModifierMask::default();
        mask.apply(windows_vk::VK_LSHIFT, true);
        assert!(mask.shift());
        mask.apply(windows_vk::VK_LSHIFT, false);
        assert!(!mask.shift());
        assert_eq!(mask.0, 0);
    }

    #[test]
    fn test_modifier_mask_left_right_independent() {
        let mut mask = ModifierMask::default();
        mask.apply(windows_vk::VK_LCONTROL, true);
        mask.apply(windows_vk::VK_RCONTROL, true);
        mask.apply(windows_vk::VK_LCONTROL, false);
        assert!(mask.ctrl(), "right ctrl still held");
    }

    #[test]
    fn test_non_modifier_vk_leaves_mask_untouched() {
        let mut mask = ModifierMask::default();
        mask.apply(0x41, true); // 'A'
        assert_eq!(mask.0, 0);
    }

    #[test]
    fn test_is_modifier_vk() {
        assert!(KeyMapper::is_modifier_vk(windows_vk::VK_LSHIFT));
        assert!(KeyMapper::is_modifier_vk(windows_vk::VK_LWIN));
        assert!(!KeyMapper::is_modifier_vk(0x41));
    }
}
