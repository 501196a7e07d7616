//! Global hotkey chord parsing and matching.
//!
//! A chord is a normalized, upper-case, `+`-separated set of tokens such
//! as `CTRL+ALT+1` or `MOUSE4+MOUSE5`. The platform hook layer feeds every
//! key and mouse-button transition into [`HotkeyRegistry::key_transition`]
//! regardless of application focus; on each *down* transition the registry
//! fires every registered chord whose full token set is a subset of the
//! currently held set.
//!
//! Firing is **not** debounced here — the session coordinator applies the
//! global 500 ms minimum between hotkey-triggered switches, so one policy
//! covers hotkeys from every source.

use std::collections::HashSet;

/// A parsed, normalized chord.
///
/// Token alphabet: `CTRL`, `ALT`, `SHIFT`, `CMD`, letters `A`–`Z`, digits
/// `0`–`9`, `F1`–`F12`, `SPACE`, `ENTER`, `ESC`, arrow/navigation keys,
/// and `MOUSE1`–`MOUSE5`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chord {
    tokens: Vec<String>,
}

impl Chord {
    /// Parses a chord string, trimming and upper-casing each token.
    ///
    /// Returns `None` for an empty or all-whitespace string (meaning "no
    /// chord configured").
    pub fn parse(s: &str) -> Option<Self> {
        let tokens: Vec<String> = s
            .split('+')
            .map(|t| t.trim().to_uppercase())
            .filter(|t| !t.is_empty())
            .collect();
        if tokens.is_empty() {
            None
        } else {
            Some(Self { tokens })
        }
    }

    /// True when every token of this chord is currently held.
    fn matches(&self, held: &HashSet<String>) -> bool {
        self.tokens.iter().all(|t| held.contains(t))
    }

    /// True when the chord mentions the CTRL modifier.
    fn contains_ctrl(&self) -> bool {
        self.tokens.iter().any(|t| t == "CTRL")
    }

    /// Returns this chord with CTRL replaced by CMD.
    fn with_cmd(&self) -> Self {
        Self {
            tokens: self
                .tokens
                .iter()
                .map(|t| {
                    if t == "CTRL" {
                        "CMD".to_string()
                    } else {
                        t.clone()
                    }
                })
                .collect(),
        }
    }
}

impl std::fmt::Display for Chord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.tokens.join("+"))
    }
}

struct Registered<T> {
    chord: Chord,
    id: T,
}

/// Tracks the currently held key/button set and matches registered chords
/// against it.
///
/// `T` is an opaque identifier returned when a chord fires; the session
/// uses an enum naming the action (switch to profile X, open settings,
/// sleep displays).
pub struct HotkeyRegistry<T> {
    hotkeys: Vec<Registered<T>>,
    held: HashSet<String>,
    /// When true (macOS), every registered chord containing CTRL also
    /// registers a CMD variant — the dominant-modifier convention differs
    /// across platforms but configs sync between them.
    cmd_is_primary: bool,
}

impl<T: Clone> HotkeyRegistry<T> {
    pub fn new(cmd_is_primary: bool) -> Self {
        Self {
            hotkeys: Vec::new(),
            held: HashSet::new(),
            cmd_is_primary,
        }
    }

    /// Registers a chord string. Empty strings register nothing; malformed
    /// chords simply never match (the token just won't be fed by any hook).
    pub fn register(&mut self, chord_str: &str, id: T) {
        let Some(chord) = Chord::parse(chord_str) else {
            return;
        };
        if self.cmd_is_primary && chord.contains_ctrl() {
            self.hotkeys.push(Registered {
                chord: chord.with_cmd(),
                id: id.clone(),
            });
        }
        self.hotkeys.push(Registered { chord, id });
    }

    /// Removes every registered chord. Held-key state is kept: clearing
    /// happens on config change while the operator may be mid-chord.
    pub fn clear(&mut self) {
        self.hotkeys.clear();
    }

    /// Number of registered chords (CMD variants included).
    pub fn len(&self) -> usize {
        self.hotkeys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hotkeys.is_empty()
    }

    /// Feeds one key or button transition and returns the IDs of every
    /// chord whose full set is held after this transition.
    ///
    /// Only *down* transitions fire; releases merely update the held set.
    pub fn key_transition(&mut self, token: &str, is_down: bool) -> Vec<T> {
        let token = token.trim().to_uppercase();
        if token.is_empty() {
            return Vec::new();
        }

        if is_down {
            self.held.insert(token);
            self.hotkeys
                .iter()
                .filter(|r| r.chord.matches(&self.held))
                .map(|r| r.id.clone())
                .collect()
        } else {
            self.held.remove(&token);
            Vec::new()
        }
    }

    /// Drops all held state (used when the hook is restarted and key-up
    /// events may have been lost).
    pub fn release_all(&mut self) {
        self.held.clear();
    }
}
