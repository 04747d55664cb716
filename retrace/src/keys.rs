//! Canonical key names.
//!
//! Recorded sessions and generated scripts refer to keys by lowercase names
//! (`"a"`, `"1"`, `"ctrl"`, `"enter"`, `"f8"`). Left and right modifier
//! variants collapse onto one name so that chords replay on any layout.

use rdev::Key;

const KEY_NAMES: &[(Key, &str)] = &[
    (Key::ControlLeft, "ctrl"),
    (Key::ControlRight, "ctrl"),
    (Key::ShiftLeft, "shift"),
    (Key::ShiftRight, "shift"),
    (Key::Alt, "alt"),
    (Key::AltGr, "alt"),
    (Key::MetaLeft, "win"),
    (Key::MetaRight, "win"),
    (Key::Return, "enter"),
    (Key::KpReturn, "enter"),
    (Key::Space, "space"),
    (Key::Tab, "tab"),
    (Key::Backspace, "backspace"),
    (Key::Delete, "delete"),
    (Key::Insert, "insert"),
    (Key::Escape, "escape"),
    (Key::CapsLock, "capslock"),
    (Key::NumLock, "numlock"),
    (Key::ScrollLock, "scrolllock"),
    (Key::PrintScreen, "printscreen"),
    (Key::Function, "fn"),
    (Key::Pause, "pause"),
    (Key::Home, "home"),
    (Key::End, "end"),
    (Key::PageUp, "pageup"),
    (Key::PageDown, "pagedown"),
    (Key::UpArrow, "up"),
    (Key::DownArrow, "down"),
    (Key::LeftArrow, "left"),
    (Key::RightArrow, "right"),
    (Key::F1, "f1"),
    (Key::F2, "f2"),
    (Key::F3, "f3"),
    (Key::F4, "f4"),
    (Key::F5, "f5"),
    (Key::F6, "f6"),
    (Key::F7, "f7"),
    (Key::F8, "f8"),
    (Key::F9, "f9"),
    (Key::F10, "f10"),
    (Key::F11, "f11"),
    (Key::F12, "f12"),
    (Key::KeyA, "a"),
    (Key::KeyB, "b"),
    (Key::KeyC, "c"),
    (Key::KeyD, "d"),
    (Key::KeyE, "e"),
    (Key::KeyF, "f"),
    (Key::KeyG, "g"),
    (Key::KeyH, "h"),
    (Key::KeyI, "i"),
    (Key::KeyJ, "j"),
    (Key::KeyK, "k"),
    (Key::KeyL, "l"),
    (Key::KeyM, "m"),
    (Key::KeyN, "n"),
    (Key::KeyO, "o"),
    (Key::KeyP, "p"),
    (Key::KeyQ, "q"),
    (Key::KeyR, "r"),
    (Key::KeyS, "s"),
    (Key::KeyT, "t"),
    (Key::KeyU, "u"),
    (Key::KeyV, "v"),
    (Key::KeyW, "w"),
    (Key::KeyX, "x"),
    (Key::KeyY, "y"),
    (Key::KeyZ, "z"),
    (Key::Num0, "0"),
    (Key::Num1, "1"),
    (Key::Num2, "2"),
    (Key::Num3, "3"),
    (Key::Num4, "4"),
    (Key::Num5, "5"),
    (Key::Num6, "6"),
    (Key::Num7, "7"),
    (Key::Num8, "8"),
    (Key::Num9, "9"),
    (Key::Kp0, "0"),
    (Key::Kp1, "1"),
    (Key::Kp2, "2"),
    (Key::Kp3, "3"),
    (Key::Kp4, "4"),
    (Key::Kp5, "5"),
    (Key::Kp6, "6"),
    (Key::Kp7, "7"),
    (Key::Kp8, "8"),
    (Key::Kp9, "9"),
    (Key::BackQuote, "`"),
    (Key::Minus, "-"),
    (Key::KpMinus, "-"),
    (Key::Equal, "="),
    (Key::KpPlus, "+"),
    (Key::KpMultiply, "*"),
    (Key::KpDivide, "/"),
    (Key::LeftBracket, "["),
    (Key::RightBracket, "]"),
    (Key::SemiColon, ";"),
    (Key::Quote, "'"),
    (Key::BackSlash, "\\"),
    (Key::IntlBackslash, "\\"),
    (Key::Comma, ","),
    (Key::Dot, "."),
    (Key::KpDelete, "."),
    (Key::Slash, "/"),
];

const ALIASES: &[(&str, &str)] = &[
    ("control", "ctrl"),
    ("return", "enter"),
    ("esc", "escape"),
    ("del", "delete"),
    ("function", "fn"),
    ("cmd", "win"),
    ("command", "win"),
    ("meta", "win"),
    ("super", "win"),
    (" ", "space"),
];

const UNKNOWN_PREFIX: &str = "unknown_";

/// Canonical name of a physical key. Keys without a name are kept as
/// `unknown_<code>` so they still round-trip through [`key_from_name`].
pub fn key_name(key: Key) -> String {
    if let Key::Unknown(code) = key {
        return format!("{UNKNOWN_PREFIX}{code}");
    }
    KEY_NAMES
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, name)| (*name).to_string())
        .unwrap_or_else(|| format!("{key:?}").to_lowercase())
}

/// Normalize a user- or file-supplied key name. Case-insensitive; accepts a
/// few common aliases.
pub fn canonical_name(name: &str) -> String {
    // A lone space must survive the trim below.
    if name == " " {
        return "space".to_string();
    }
    let lowered = name.trim().to_lowercase();
    ALIASES
        .iter()
        .find(|(alias, _)| *alias == lowered)
        .map(|(_, canonical)| (*canonical).to_string())
        .unwrap_or(lowered)
}

/// Physical key for a canonical name. The first table entry wins, so `"ctrl"`
/// maps to the left control key and `"1"` to the top-row digit.
pub fn key_from_name(name: &str) -> Option<Key> {
    let name = canonical_name(name);
    if let Some(code) = name.strip_prefix(UNKNOWN_PREFIX) {
        return code.parse().ok().map(Key::Unknown);
    }
    KEY_NAMES
        .iter()
        .find(|(_, n)| *n == name)
        .map(|(key, _)| *key)
}

/// Modifiers that participate in chords.
pub fn is_modifier(name: &str) -> bool {
    matches!(canonical_name(name).as_str(), "ctrl" | "alt" | "shift")
}

/// Character typed by a key with no modifier held, if it types one.
pub fn printable_char(name: &str) -> Option<char> {
    let name = canonical_name(name);
    if name == "space" {
        return Some(' ');
    }
    let mut chars = name.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if !c.is_control() => Some(c),
        _ => None,
    }
}

pub fn is_printable(name: &str) -> bool {
    printable_char(name).is_some()
}
