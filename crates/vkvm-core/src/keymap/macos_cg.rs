//! Windows virtual-key code → macOS `CGKeyCode` translation table.
//!
//! macOS identifies keys by `CGKeyCode` — a number for each physical key
//! position on an ANSI layout (e.g. the letter A is 0, Return is 36).
//! The table below is a compile-time constant array of 256 entries
//! indexed by VK code, so every forwarded key event translates with a
//! single O(1) lookup. Entries with no macOS equivalent hold the `NONE`
//! sentinel and translate to `None`; the injector reports those as
//! unmapped and drops the event.
//!
//! Reference: winuser.h VK codes; HIToolbox `Events.h` kVK constants.

/// Sentinel for "no mapping"; no real CGKeyCode uses this value.
const NONE: u16 = 0xFFFF;

/// Translates a Windows virtual-key code to a macOS `CGKeyCode`.
pub fn vk_to_cgkeycode(vk: u16) -> Option<u16> {
    if vk >= 256 {
        return None;
    }
    match VK_TO_CG_TABLE[vk as usize] {
        NONE => None,
        code => Some(code),
    }
}

/// Complete VK → CGKeyCode table indexed by VK code (0x00–0xFF).
const VK_TO_CG_TABLE: [u16; 256] = {
    let mut t = [NONE; 256];

    // Letters (VK_A=0x41 … VK_Z=0x5A). CGKeyCodes are position-based and
    // not alphabetical.
    t[0x41] = 0; // A
    t[0x42] = 11; // B
    t[0x43] = 8; // C
    t[0x44] = 2; // D
    t[0x45] = 14; // E
    t[0x46] = 3; // F
    t[0x47] = 5; // G
    t[0x48] = 4; // H
    t[0x49] = 34; // I
    t[0x4A] = 38; // J
    t[0x4B] = 40; // K
    t[0x4C] = 37; // L
    t[0x4D] = 46; // M
    t[0x4E] = 45; // N
    t[0x4F] = 31; // O
    t[0x50] = 35; // P
    t[0x51] = 12; // Q
    t[0x52] = 15; // R
    t[0x53] = 1; // S
    t[0x54] = 17; // T
    t[0x55] = 32; // U
    t[0x56] = 9; // V
    t[0x57] = 13; // W
    t[0x58] = 7; // X
    t[0x59] = 16; // Y
    t[0x5A] = 6; // Z

    // Top-row digits (VK 0x30–0x39).
    t[0x30] = 29; // 0
    t[0x31] = 18; // 1
    t[0x32] = 19; // 2
    t[0x33] = 20; // 3
    t[0x34] = 21; // 4
    t[0x35] = 23; // 5
    t[0x36] = 22; // 6
    t[0x37] = 26; // 7
    t[0x38] = 28; // 8
    t[0x39] = 25; // 9

    // Whitespace and editing.
    t[0x08] = 51; // Backspace -> Delete
    t[0x09] = 48; // Tab
    t[0x0D] = 36; // Enter -> Return
    t[0x1B] = 53; // Escape
    t[0x20] = 49; // Space
    t[0x2E] = 117; // Delete -> Forward Delete
    t[0x14] = 57; // Caps Lock

    // Navigation.
    t[0x21] = 116; // Page Up
    t[0x22] = 121; // Page Down
    t[0x23] = 119; // End
    t[0x24] = 115; // Home
    t[0x25] = 123; // Left Arrow
    t[0x26] = 126; // Up Arrow
    t[0x27] = 124; // Right Arrow
    t[0x28] = 125; // Down Arrow

    // Function keys F1–F12 (VK 0x70–0x7B).
    t[0x70] = 122; // F1
    t[0x71] = 120; // F2
    t[0x72] = 99; // F3
    t[0x73] = 118; // F4
    t[0x74] = 96; // F5
    t[0x75] = 97; // F6
    t[0x76] = 98; // F7
    t[0x77] = 100; // F8
    t[0x78] = 101; // F9
    t[0x79] = 109; // F10
    t[0x7A] = 103; // F11
    t[0x7B] = 111; // F12

    // Numpad (VK 0x60–0x69 plus operators).
    t[0x60] = 82; // Numpad 0
    t[0x61] = 83; // Numpad 1
    t[0x62] = 84; // Numpad 2
    t[0x63] = 85; // Numpad 3
    t[0x64] = 86; // Numpad 4
    t[0x65] = 87; // Numpad 5
    t[0x66] = 88; // Numpad 6
    t[0x67] = 89; // Numpad 7
    t[0x68] = 91; // Numpad 8
    t[0x69] = 92; // Numpad 9
    t[0x6A] = 67; // Numpad *
    t[0x6B] = 69; // Numpad +
    t[0x6D] = 78; // Numpad -
    t[0x6E] = 65; // Numpad .
    t[0x6F] = 75; // Numpad /

    // Punctuation (US ANSI OEM codes).
    t[0xBA] = 41; // ;
    t[0xBB] = 24; // =
    t[0xBC] = 43; // ,
    t[0xBD] = 27; // -
    t[0xBE] = 47; // .
    t[0xBF] = 44; // /
    t[0xC0] = 50; // `
    t[0xDB] = 33; // [
    t[0xDC] = 42; // \
    t[0xDD] = 30; // ]
    t[0xDE] = 39; // '

    // Modifiers. Generic (side-less) codes map to the left-side key.
    t[0x10] = 56; // Shift
    t[0x11] = 59; // Control
    t[0x12] = 58; // Alt/Option
    t[0xA0] = 56; // Left Shift
    t[0xA1] = 60; // Right Shift
    t[0xA2] = 59; // Left Control
    t[0xA3] = 62; // Right Control
    t[0xA4] = 58; // Left Option
    t[0xA5] = 61; // Right Option
    t[0x5B] = 55; // Left Win -> Left Command
    t[0x5C] = 54; // Right Win -> Right Command

    t
};

/// Translates a macOS `CGKeyCode` to the hotkey token name.
///
/// Used by the macOS event-tap feed to drive chord matching. Left/right
/// modifier keys collapse to the single token a chord names.
pub fn cgkeycode_to_token(code: u16) -> Option<&'static str> {
    Some(match code {
        54 | 55 => "CMD",
        56 | 60 => "SHIFT",
        58 | 61 => "ALT",
        59 | 62 => "CTRL",
        49 => "SPACE",
        36 => "ENTER",
        53 => "ESC",
        48 => "TAB",
        51 => "BACKSPACE",
        115 => "HOME",
        116 => "PAGEUP",
        119 => "END",
        121 => "PAGEDOWN",
        117 => "DELETE",
        123 => "LEFT",
        124 => "RIGHT",
        125 => "DOWN",
        126 => "UP",
        0 => "A",
        11 => "B",
        8 => "C",
        2 => "D",
        14 => "E",
        3 => "F",
        5 => "G",
        4 => "H",
        34 => "I",
        38 => "J",
        40 => "K",
        37 => "L",
        46 => "M",
        45 => "N",
        31 => "O",
        35 => "P",
        12 => "Q",
        15 => "R",
        1 => "S",
        17 => "T",
        32 => "U",
        9 => "V",
        13 => "W",
        7 => "X",
        16 => "Y",
        6 => "Z",
        29 => "0",
        18 => "1",
        19 => "2",
        20 => "3",
        21 => "4",
        23 => "5",
        22 => "6",
        26 => "7",
        28 => "8",
        25 => "9",
        122 => "F1",
        120 => "F2",
        99 => "F3",
        118 => "F4",
        96 => "F5",
        97 => "F6",
        98 => "F7",
        100 => "F8",
        101 => "F9",
        109 => "F10",
        103 => "F11",
        111 => "F12",
        _ => return None,
    })
}
