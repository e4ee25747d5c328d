//! Key identifiers and raw event normalization
//!
//! Raw platform key codes are mapped through static tables into
//! [`CanonicalKey`]s. Modifiers keep their side so the blocking policy can
//! reason about either variant; [`ComboKey`] erases the side for the exit
//! combination.

use std::fmt;

use crate::config::ConfigError;

/// Which physical variant of a modifier produced an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Left,
    Right,
}

/// Modifier keys that exist on both sides of the keyboard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Modifier {
    Ctrl,
    Shift,
    Alt,
    /// Windows / Command / Meta
    Windows,
}

/// Non-character keys with a fixed symbolic name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NamedKey {
    Esc,
    Tab,
    Enter,
    Space,
    Backspace,
    Delete,
    Insert,
    Home,
    End,
    PageUp,
    PageDown,
    ArrowLeft,
    ArrowRight,
    ArrowUp,
    ArrowDown,
    CapsLock,
    PrintScreen,
    Menu,
}

/// Raw key identity as delivered by a platform hook
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RawKey {
    /// Win32 virtual-key code and hardware scan code
    Windows { vk: u32, scan: u32 },
    /// macOS virtual keycode
    Mac { keycode: u16 },
}

/// Normalized, platform-independent key identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CanonicalKey {
    Modifier(Modifier, Side),
    Named(NamedKey),
    /// F1..F24
    Function(u8),
    /// Lower-cased character payload of an alphanumeric or symbol key
    Char(char),
    /// Code missing from the tables, bucketed by its raw value
    Unknown(RawKey),
}

/// Press or release
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyAction {
    Press,
    Release,
}

/// A key event as it arrives from the OS hook
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawKeyEvent {
    pub key: RawKey,
    pub action: KeyAction,
}

impl RawKeyEvent {
    pub fn press(key: RawKey) -> Self {
        Self {
            key,
            action: KeyAction::Press,
        }
    }

    pub fn release(key: RawKey) -> Self {
        Self {
            key,
            action: KeyAction::Release,
        }
    }
}

/// Output of [`normalize`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizedEvent {
    pub key: CanonicalKey,
    pub action: KeyAction,
    /// Set when the key is itself a modifier
    pub modifier_hint: Option<Modifier>,
}

/// Convert a raw hook event into its canonical form
pub fn normalize(event: &RawKeyEvent) -> NormalizedEvent {
    let key = match event.key {
        RawKey::Windows { vk, .. } => from_virtual_key(vk),
        RawKey::Mac { keycode } => from_mac_keycode(keycode),
    }
    .unwrap_or(CanonicalKey::Unknown(event.key));

    NormalizedEvent {
        key,
        action: event.action,
        modifier_hint: key.modifier(),
    }
}

impl CanonicalKey {
    /// The modifier this key is, if any
    pub fn modifier(&self) -> Option<Modifier> {
        match self {
            CanonicalKey::Modifier(m, _) => Some(*m),
            _ => None,
        }
    }
}

/// Win32 virtual-key table (US layout for OEM symbol keys)
fn from_virtual_key(vk: u32) -> Option<CanonicalKey> {
    use CanonicalKey::{Char, Function, Modifier as Mod, Named};
    use Modifier::{Alt, Ctrl, Shift, Windows};
    use NamedKey::*;
    use Side::{Left, Right};

    let key = match vk {
        0x08 => Named(Backspace),
        0x09 => Named(Tab),
        0x0D => Named(Enter),
        // Side-less VK_SHIFT / VK_CONTROL / VK_MENU
        0x10 => Mod(Shift, Left),
        0x11 => Mod(Ctrl, Left),
        0x12 => Mod(Alt, Left),
        0x14 => Named(CapsLock),
        0x1B => Named(Esc),
        0x20 => Named(Space),
        0x21 => Named(PageUp),
        0x22 => Named(PageDown),
        0x23 => Named(End),
        0x24 => Named(Home),
        0x25 => Named(ArrowLeft),
        0x26 => Named(ArrowUp),
        0x27 => Named(ArrowRight),
        0x28 => Named(ArrowDown),
        0x2C => Named(PrintScreen),
        0x2D => Named(Insert),
        0x2E => Named(Delete),
        0x30..=0x39 => Char(char::from(b'0' + (vk - 0x30) as u8)),
        0x41..=0x5A => Char(char::from(b'a' + (vk - 0x41) as u8)),
        0x5B => Mod(Windows, Left),
        0x5C => Mod(Windows, Right),
        0x5D => Named(Menu),
        0x70..=0x87 => Function((vk - 0x70 + 1) as u8),
        0xA0 => Mod(Shift, Left),
        0xA1 => Mod(Shift, Right),
        0xA2 => Mod(Ctrl, Left),
        0xA3 => Mod(Ctrl, Right),
        0xA4 => Mod(Alt, Left),
        0xA5 => Mod(Alt, Right),
        0xBA => Char(';'),
        0xBB => Char('='),
        0xBC => Char(','),
        0xBD => Char('-'),
        0xBE => Char('.'),
        0xBF => Char('/'),
        0xC0 => Char('`'),
        0xDB => Char('['),
        0xDC => Char('\\'),
        0xDD => Char(']'),
        0xDE => Char('\''),
        _ => return None,
    };
    Some(key)
}

/// macOS virtual keycode table (ANSI layout)
fn from_mac_keycode(keycode: u16) -> Option<CanonicalKey> {
    use CanonicalKey::{Char, Function, Modifier as Mod, Named};
    use Modifier::{Alt, Ctrl, Shift, Windows};
    use NamedKey::*;
    use Side::{Left, Right};

    let key = match keycode {
        0x00 => Char('a'),
        0x01 => Char('s'),
        0x02 => Char('d'),
        0x03 => Char('f'),
        0x04 => Char('h'),
        0x05 => Char('g'),
        0x06 => Char('z'),
        0x07 => Char('x'),
        0x08 => Char('c'),
        0x09 => Char('v'),
        0x0B => Char('b'),
        0x0C => Char('q'),
        0x0D => Char('w'),
        0x0E => Char('e'),
        0x0F => Char('r'),
        0x10 => Char('y'),
        0x11 => Char('t'),
        0x12 => Char('1'),
        0x13 => Char('2'),
        0x14 => Char('3'),
        0x15 => Char('4'),
        0x16 => Char('6'),
        0x17 => Char('5'),
        0x18 => Char('='),
        0x19 => Char('9'),
        0x1A => Char('7'),
        0x1B => Char('-'),
        0x1C => Char('8'),
        0x1D => Char('0'),
        0x1E => Char(']'),
        0x1F => Char('o'),
        0x20 => Char('u'),
        0x21 => Char('['),
        0x22 => Char('i'),
        0x23 => Char('p'),
        0x24 => Named(Enter),
        0x25 => Char('l'),
        0x26 => Char('j'),
        0x27 => Char('\''),
        0x28 => Char('k'),
        0x29 => Char(';'),
        0x2A => Char('\\'),
        0x2B => Char(','),
        0x2C => Char('/'),
        0x2D => Char('n'),
        0x2E => Char('m'),
        0x2F => Char('.'),
        0x30 => Named(Tab),
        0x31 => Named(Space),
        0x32 => Char('`'),
        0x33 => Named(Backspace),
        0x35 => Named(Esc),
        0x36 => Mod(Windows, Right),
        0x37 => Mod(Windows, Left),
        0x38 => Mod(Shift, Left),
        0x39 => Named(CapsLock),
        0x3A => Mod(Alt, Left),
        0x3B => Mod(Ctrl, Left),
        0x3C => Mod(Shift, Right),
        0x3D => Mod(Alt, Right),
        0x3E => Mod(Ctrl, Right),
        0x40 => Function(17),
        0x4F => Function(18),
        0x50 => Function(19),
        0x5A => Function(20),
        0x60 => Function(5),
        0x61 => Function(6),
        0x62 => Function(7),
        0x63 => Function(3),
        0x64 => Function(8),
        0x65 => Function(9),
        0x67 => Function(11),
        0x69 => Function(13),
        0x6A => Function(16),
        0x6B => Function(14),
        0x6D => Function(10),
        0x6E => Named(Menu),
        0x6F => Function(12),
        0x71 => Function(15),
        0x72 => Named(Insert),
        0x73 => Named(Home),
        0x74 => Named(PageUp),
        0x75 => Named(Delete),
        0x76 => Function(4),
        0x77 => Named(End),
        0x78 => Function(2),
        0x79 => Named(PageDown),
        0x7A => Function(1),
        0x7B => Named(ArrowLeft),
        0x7C => Named(ArrowRight),
        0x7D => Named(ArrowDown),
        0x7E => Named(ArrowUp),
        _ => return None,
    };
    Some(key)
}

/// A key as named in configuration, with modifier sides erased
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComboKey {
    /// Either side of the modifier
    Modifier(Modifier),
    /// Exactly this key
    Key(CanonicalKey),
}

impl ComboKey {
    /// Parse a case-insensitive key name such as `ctrl`, `esc`, `f4` or `q`
    pub fn parse(name: &str) -> Result<Self, ConfigError> {
        use NamedKey::*;

        let trimmed = name.trim();
        let lower = trimmed.to_lowercase();
        let named = |k| ComboKey::Key(CanonicalKey::Named(k));

        let key = match lower.as_str() {
            "ctrl" | "control" => ComboKey::Modifier(Modifier::Ctrl),
            "shift" => ComboKey::Modifier(Modifier::Shift),
            "alt" | "option" => ComboKey::Modifier(Modifier::Alt),
            "windows" | "win" | "cmd" | "command" | "meta" | "super" => {
                ComboKey::Modifier(Modifier::Windows)
            }
            "esc" | "escape" => named(Esc),
            "tab" => named(Tab),
            "enter" | "return" => named(Enter),
            "space" => named(Space),
            "backspace" => named(Backspace),
            "delete" | "del" => named(Delete),
            "insert" => named(Insert),
            "home" => named(Home),
            "end" => named(End),
            "pageup" | "page_up" => named(PageUp),
            "pagedown" | "page_down" => named(PageDown),
            "left" => named(ArrowLeft),
            "right" => named(ArrowRight),
            "up" => named(ArrowUp),
            "down" => named(ArrowDown),
            "capslock" | "caps_lock" => named(CapsLock),
            "printscreen" | "print_screen" => named(PrintScreen),
            "menu" => named(Menu),
            other => {
                if let Some(n) = function_number(other) {
                    ComboKey::Key(CanonicalKey::Function(n))
                } else {
                    let mut chars = other.chars();
                    match (chars.next(), chars.next()) {
                        (Some(c), None) if !c.is_whitespace() && !c.is_control() => {
                            ComboKey::Key(CanonicalKey::Char(c))
                        }
                        _ => return Err(ConfigError::UnknownKeyName(trimmed.to_string())),
                    }
                }
            }
        };
        Ok(key)
    }

    /// Whether a held key satisfies this entry
    pub fn matches(&self, key: &CanonicalKey) -> bool {
        match self {
            ComboKey::Modifier(m) => key.modifier() == Some(*m),
            ComboKey::Key(k) => k == key,
        }
    }
}

fn function_number(name: &str) -> Option<u8> {
    name.strip_prefix('f')?
        .parse::<u8>()
        .ok()
        .filter(|n| (1..=24).contains(n))
}

impl fmt::Display for Modifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Modifier::Ctrl => write!(f, "ctrl"),
            Modifier::Shift => write!(f, "shift"),
            Modifier::Alt => write!(f, "alt"),
            Modifier::Windows => write!(f, "windows"),
        }
    }
}

impl fmt::Display for CanonicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CanonicalKey::Modifier(m, Side::Left) => write!(f, "{m}_l"),
            CanonicalKey::Modifier(m, Side::Right) => write!(f, "{m}_r"),
            CanonicalKey::Named(k) => write!(f, "{}", format!("{k:?}").to_lowercase()),
            CanonicalKey::Function(n) => write!(f, "f{n}"),
            CanonicalKey::Char(c) => write!(f, "{c}"),
            CanonicalKey::Unknown(RawKey::Windows { vk, scan }) => {
                write!(f, "<unknown vk={vk:#04x} scan={scan:#04x}>")
            }
            CanonicalKey::Unknown(RawKey::Mac { keycode }) => {
                write!(f, "<unknown keycode={keycode:#04x}>")
            }
        }
    }
}

impl fmt::Display for ComboKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComboKey::Modifier(m) => write!(f, "{m}"),
            ComboKey::Key(k) => write!(f, "{k}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vk(code: u32) -> CanonicalKey {
        normalize(&RawKeyEvent::press(RawKey::Windows { vk: code, scan: 0 })).key
    }

    fn mac(keycode: u16) -> CanonicalKey {
        normalize(&RawKeyEvent::press(RawKey::Mac { keycode })).key
    }

    #[test]
    fn test_letters_are_lowercase_chars() {
        assert_eq!(vk(0x41), CanonicalKey::Char('a'));
        assert_eq!(vk(0x5A), CanonicalKey::Char('z'));
        assert_eq!(vk(0x35), CanonicalKey::Char('5'));
        assert_eq!(mac(0x0C), CanonicalKey::Char('q'));
    }

    #[test]
    fn test_modifier_sides() {
        assert_eq!(vk(0xA2), CanonicalKey::Modifier(Modifier::Ctrl, Side::Left));
        assert_eq!(vk(0xA3), CanonicalKey::Modifier(Modifier::Ctrl, Side::Right));
        assert_eq!(vk(0x5C), CanonicalKey::Modifier(Modifier::Windows, Side::Right));
        assert_eq!(vk(0x11), CanonicalKey::Modifier(Modifier::Ctrl, Side::Left));
        assert_eq!(mac(0x3E), CanonicalKey::Modifier(Modifier::Ctrl, Side::Right));
        assert_eq!(mac(0x37), CanonicalKey::Modifier(Modifier::Windows, Side::Left));
    }

    #[test]
    fn test_named_and_function_keys() {
        assert_eq!(vk(0x1B), CanonicalKey::Named(NamedKey::Esc));
        assert_eq!(vk(0x09), CanonicalKey::Named(NamedKey::Tab));
        assert_eq!(vk(0x73), CanonicalKey::Function(4));
        assert_eq!(vk(0x87), CanonicalKey::Function(24));
        assert_eq!(mac(0x35), CanonicalKey::Named(NamedKey::Esc));
        assert_eq!(mac(0x76), CanonicalKey::Function(4));
    }

    #[test]
    fn test_unknown_codes_are_bucketed() {
        let raw = RawKey::Windows { vk: 0xFF, scan: 0x5E };
        let event = normalize(&RawKeyEvent::release(raw));
        assert_eq!(event.key, CanonicalKey::Unknown(raw));
        assert_eq!(event.action, KeyAction::Release);
        assert_eq!(event.modifier_hint, None);

        let other = RawKey::Windows { vk: 0xFF, scan: 0x5F };
        assert_ne!(vk_raw(other), CanonicalKey::Unknown(raw));
    }

    fn vk_raw(raw: RawKey) -> CanonicalKey {
        normalize(&RawKeyEvent::press(raw)).key
    }

    #[test]
    fn test_modifier_hint() {
        let event = normalize(&RawKeyEvent::press(RawKey::Windows { vk: 0xA5, scan: 0 }));
        assert_eq!(event.modifier_hint, Some(Modifier::Alt));
    }

    #[test]
    fn test_parse_names() {
        assert_eq!(
            ComboKey::parse("Ctrl").unwrap(),
            ComboKey::Modifier(Modifier::Ctrl)
        );
        assert_eq!(
            ComboKey::parse(" escape ").unwrap(),
            ComboKey::Key(CanonicalKey::Named(NamedKey::Esc))
        );
        assert_eq!(
            ComboKey::parse("F4").unwrap(),
            ComboKey::Key(CanonicalKey::Function(4))
        );
        assert_eq!(
            ComboKey::parse("Q").unwrap(),
            ComboKey::Key(CanonicalKey::Char('q'))
        );
        assert_eq!(
            ComboKey::parse("f").unwrap(),
            ComboKey::Key(CanonicalKey::Char('f'))
        );
    }

    #[test]
    fn test_parse_rejects_unknown() {
        assert!(matches!(
            ComboKey::parse("hyper"),
            Err(ConfigError::UnknownKeyName(name)) if name == "hyper"
        ));
        assert!(ComboKey::parse("f25").is_err());
        assert!(ComboKey::parse("").is_err());
    }

    #[test]
    fn test_combo_key_is_side_agnostic() {
        let ctrl = ComboKey::Modifier(Modifier::Ctrl);
        assert!(ctrl.matches(&CanonicalKey::Modifier(Modifier::Ctrl, Side::Left)));
        assert!(ctrl.matches(&CanonicalKey::Modifier(Modifier::Ctrl, Side::Right)));
        assert!(!ctrl.matches(&CanonicalKey::Modifier(Modifier::Shift, Side::Left)));
        assert!(!ctrl.matches(&CanonicalKey::Char('c')));
    }

    #[test]
    fn test_display() {
        assert_eq!(
            CanonicalKey::Modifier(Modifier::Alt, Side::Right).to_string(),
            "alt_r"
        );
        assert_eq!(CanonicalKey::Named(NamedKey::PageUp).to_string(), "pageup");
        assert_eq!(CanonicalKey::Function(4).to_string(), "f4");
        assert_eq!(ComboKey::Modifier(Modifier::Shift).to_string(), "shift");
    }
}
