//! Windows virtual-key code helpers.
//!
//! Windows VK codes are the wire representation of keyboard events (see
//! [`crate::keymap`]). This module provides the VK constants the rest of
//! the system needs, the VK → modifier-bit mapping, and the VK → hotkey
//! token translation.
//!
//! Reference: Windows Virtual-Key Codes (winuser.h).

use super::ModifierMask;

// The VK constants referenced elsewhere in the codebase. Only the ones we
// name in code are spelled out; everything else is matched numerically in
// the token table below.
pub const VK_BACK: u16 = 0x08;
pub const VK_TAB: u16 = 0x09;
pub const VK_RETURN: u16 = 0x0D;
pub const VK_SHIFT: u16 = 0x10;
pub const VK_CONTROL: u16 = 0x11;
pub const VK_MENU: u16 = 0x12;
pub const VK_CAPITAL: u16 = 0x14;
pub const VK_ESCAPE: u16 = 0x1B;
pub const VK_SPACE: u16 = 0x20;
pub const VK_LWIN: u16 = 0x5B;
pub const VK_RWIN: u16 = 0x5C;
pub const VK_LSHIFT: u16 = 0xA0;
pub const VK_RSHIFT: u16 = 0xA1;
pub const VK_LCONTROL: u16 = 0xA2;
pub const VK_RCONTROL: u16 = 0xA3;
pub const VK_LMENU: u16 = 0xA4;
pub const VK_RMENU: u16 = 0xA5;

/// Maps a modifier VK code to its bit in the wire [`ModifierMask`].
///
/// The generic (side-less) VK_SHIFT/VK_CONTROL/VK_MENU codes map to the
/// left-side bit; low-level hooks normally deliver the sided codes, the
/// generic ones only appear from synthetic senders.
pub fn modifier_bit(vk: u16) -> Option<u16> {
    match vk {
        VK_LCONTROL | VK_CONTROL => Some(ModifierMask::LEFT_CTRL),
        VK_RCONTROL => Some(ModifierMask::RIGHT_CTRL),
        VK_LSHIFT | VK_SHIFT => Some(ModifierMask::LEFT_SHIFT),
        VK_RSHIFT => Some(ModifierMask::RIGHT_SHIFT),
        VK_LMENU | VK_MENU => Some(ModifierMask::LEFT_ALT),
        VK_RMENU => Some(ModifierMask::RIGHT_ALT),
        VK_LWIN => Some(ModifierMask::LEFT_META),
        VK_RWIN => Some(ModifierMask::RIGHT_META),
        _ => None,
    }
}

/// Translates a VK code to the hotkey token name, or `None` for keys
/// outside the chord alphabet.
///
/// Left/right modifier variants collapse to a single token: a chord says
/// `CTRL`, not `LCTRL`.
pub fn vk_to_token(vk: u16) -> Option<&'static str> {
    Some(match vk {
        VK_LCONTROL | VK_RCONTROL | VK_CONTROL => "CTRL",
        VK_LSHIFT | VK_RSHIFT | VK_SHIFT => "SHIFT",
        VK_LMENU | VK_RMENU | VK_MENU => "ALT",
        VK_LWIN | VK_RWIN => "CMD",
        VK_SPACE => "SPACE",
        VK_RETURN => "ENTER",
        VK_ESCAPE => "ESC",
        VK_TAB => "TAB",
        VK_BACK => "BACKSPACE",
        0x21 => "PAGEUP",
        0x22 => "PAGEDOWN",
        0x23 => "END",
        0x24 => "HOME",
        0x25 => "LEFT",
        0x26 => "UP",
        0x27 => "RIGHT",
        0x28 => "DOWN",
        0x2D => "INSERT",
        0x2E => "DELETE",
        0x30 => "0",
        0x31 => "1",
        0x32 => "2",
        0x33 => "3",
        0x34 => "4",
        0x35 => "5",
        0x36 => "6",
        0x37 => "7",
        0x38 => "8",
        0x39 => "9",
        0x41 => "A",
        0x42 => "B",
        0x43 => "C",
        0x44 => "D",
        0x45 => "E",
        0x46 => "F",
        0x47 => "G",
        0x48 => "H",
        0x49 => "I",
        0x4A => "J",
        0x4B => "K",
        0x4C => "L",
        0x4D => "M",
        0x4E => "N",
        0x4F => "O",
        0x50 => "P",
        0x51 => "Q",
        0x52 => "R",
        0x53 => "S",
        0x54 => "T",
        0x55 => "U",
        0x56 => "V",
        0x57 => "W",
        0x58 => "X",
        0x59 => "Y",
        0x5A => "Z",
        0x70 => "F1",
        0x71 => "F2",
        0x72 => "F3",
        0x73 => "F4",
        0x74 => "F5",
        0x75 => "F6",
        0x76 => "F7",
        0x77 => "F8",
        0x78 => "F9",
        0x79 => "F10",
        0x7A => "F11",
        0x7B => "F12",
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_letters_map_to_single_char_tokens() {
        assert_eq!(vk_to_token(0x41), Some("A"));
        assert_eq!(vk_to_token(0x5A), Some("Z"));
    }

    #[test]
    fn test_sided_modifiers_collapse_to_one_token() {
        assert_eq!(vk_to_token(VK_LCONTROL), Some("CTRL"));
        assert_eq!(vk_to_token(VK_RCONTROL), Some("CTRL"));
        assert_eq!(vk_to_token(VK_LWIN), Some("CMD"));
    }

    #[test]
    fn test_unknown_vk_has_no_token() {
        assert_eq!(vk_to_token(0x07), None); // undefined VK
        assert_eq!(vk_to_token(0xFF), None);
    }

    #[test]
    fn test_generic_modifier_vks_map_to_left_bits() {
        assert_eq!(modifier_bit(VK_SHIFT), Some(ModifierMask::LEFT_SHIFT));
        assert_eq!(modifier_bit(VK_CONTROL), Some(ModifierMask::LEFT_CTRL));
    }

    #[test]
    fn test_function_keys() {
        assert_eq!(vk_to_token(0x70), Some("F1"));
        assert_eq!(vk_to_token(0x7B), Some("F12"));
    }
}
