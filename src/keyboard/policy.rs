//! Shortcut suppression rules
//!
//! Rules are evaluated against the held set after the current press has
//! been recorded, so a modifier press sees itself as held.

use tracing::warn;

use crate::config::ConfigError;

use super::keys::{CanonicalKey, Modifier, NamedKey};
use super::tracker::HeldKeys;

/// Whether a key event may reach the rest of the system
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Allow,
    Suppress,
}

/// A single suppression predicate over (key, held keys)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BlockRule {
    /// Either Windows/Meta key, unconditionally
    WindowsKey,
    /// Tab while any Alt is held
    AltTab,
    /// F4 while any Alt is held
    AltF4,
}

impl BlockRule {
    pub fn blocks(&self, key: &CanonicalKey, held: &HeldKeys) -> bool {
        match self {
            BlockRule::WindowsKey => key.modifier() == Some(Modifier::Windows),
            BlockRule::AltTab => {
                *key == CanonicalKey::Named(NamedKey::Tab) && held.any_modifier(Modifier::Alt)
            }
            BlockRule::AltF4 => {
                *key == CanonicalKey::Function(4) && held.any_modifier(Modifier::Alt)
            }
        }
    }
}

/// Ordered rule set; first match wins, default allow
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockPolicy {
    rules: Vec<BlockRule>,
}

impl BlockPolicy {
    pub fn new(mut rules: Vec<BlockRule>) -> Self {
        rules.sort();
        rules.dedup();
        Self { rules }
    }

    /// Build rules from configured names such as `windows` or `alt+tab`
    ///
    /// `ctrl+alt+delete` is accepted for compatibility but cannot be
    /// intercepted from user mode, so it adds no rule.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self, ConfigError> {
        let mut rules = Vec::with_capacity(names.len());
        for name in names {
            let normalized: String = name
                .as_ref()
                .chars()
                .filter(|c| !c.is_whitespace())
                .collect::<String>()
                .to_lowercase();

            match normalized.as_str() {
                "windows" | "win" | "cmd" | "meta" | "super" => rules.push(BlockRule::WindowsKey),
                "alt+tab" | "tab+alt" => rules.push(BlockRule::AltTab),
                "alt+f4" | "f4+alt" => rules.push(BlockRule::AltF4),
                "ctrl+alt+delete" | "ctrl+alt+del" => {
                    warn!("ctrl+alt+delete cannot be blocked by a user-mode hook, ignoring");
                }
                _ => return Err(ConfigError::UnknownBlockRule(name.as_ref().to_string())),
            }
        }
        Ok(Self::new(rules))
    }

    pub fn rules(&self) -> &[BlockRule] {
        &self.rules
    }

    pub fn evaluate(&self, key: &CanonicalKey, held: &HeldKeys) -> Verdict {
        if self.rules.iter().any(|rule| rule.blocks(key, held)) {
            Verdict::Suppress
        } else {
            Verdict::Allow
        }
    }
}

impl Default for BlockPolicy {
    fn default() -> Self {
        Self::new(vec![BlockRule::WindowsKey, BlockRule::AltTab, BlockRule::AltF4])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::keyboard::clock::ManualClock;
    use crate::keyboard::keys::Side;
    use crate::keyboard::tracker::PressedKeyTracker;

    const TAB: CanonicalKey = CanonicalKey::Named(NamedKey::Tab);
    const ALT_L: CanonicalKey = CanonicalKey::Modifier(Modifier::Alt, Side::Left);
    const ALT_R: CanonicalKey = CanonicalKey::Modifier(Modifier::Alt, Side::Right);

    fn tracker() -> PressedKeyTracker {
        PressedKeyTracker::new(Arc::new(ManualClock::new()), Duration::from_secs(10))
    }

    fn press(tracker: &PressedKeyTracker, policy: &BlockPolicy, key: CanonicalKey) -> Verdict {
        tracker.press_and_then(key, |held| policy.evaluate(&key, held))
    }

    #[test]
    fn test_windows_key_always_suppressed() {
        let tracker = tracker();
        let policy = BlockPolicy::default();
        let win_l = CanonicalKey::Modifier(Modifier::Windows, Side::Left);
        let win_r = CanonicalKey::Modifier(Modifier::Windows, Side::Right);
        assert_eq!(press(&tracker, &policy, win_l), Verdict::Suppress);
        assert_eq!(press(&tracker, &policy, win_r), Verdict::Suppress);
    }

    #[test]
    fn test_tab_alone_allowed() {
        let tracker = tracker();
        assert_eq!(press(&tracker, &BlockPolicy::default(), TAB), Verdict::Allow);
    }

    #[test]
    fn test_alt_tab_suppressed_then_allowed_after_release() {
        let tracker = tracker();
        let policy = BlockPolicy::default();

        assert_eq!(press(&tracker, &policy, ALT_R), Verdict::Allow);
        assert_eq!(press(&tracker, &policy, TAB), Verdict::Suppress);

        tracker.record_release(&TAB);
        tracker.record_release(&ALT_R);
        assert_eq!(press(&tracker, &policy, TAB), Verdict::Allow);
    }

    #[test]
    fn test_alt_f4_suppressed() {
        let tracker = tracker();
        let policy = BlockPolicy::default();
        let f4 = CanonicalKey::Function(4);

        assert_eq!(press(&tracker, &policy, f4), Verdict::Allow);
        tracker.record_release(&f4);

        press(&tracker, &policy, ALT_L);
        assert_eq!(press(&tracker, &policy, f4), Verdict::Suppress);
    }

    #[test]
    fn test_ordinary_keys_allowed() {
        let tracker = tracker();
        let policy = BlockPolicy::default();
        press(&tracker, &policy, ALT_L);
        assert_eq!(press(&tracker, &policy, CanonicalKey::Char('a')), Verdict::Allow);
        assert_eq!(press(&tracker, &policy, CanonicalKey::Function(5)), Verdict::Allow);
    }

    #[test]
    fn test_from_names() {
        let policy =
            BlockPolicy::from_names(&["Alt + F4", "windows", "cmd", "ctrl+alt+delete"]).unwrap();
        assert_eq!(policy.rules(), &[BlockRule::WindowsKey, BlockRule::AltF4]);

        let tracker = tracker();
        press(&tracker, &policy, ALT_L);
        assert_eq!(press(&tracker, &policy, TAB), Verdict::Allow);
    }

    #[test]
    fn test_from_names_rejects_unknown() {
        assert!(matches!(
            BlockPolicy::from_names(&["alt+space"]),
            Err(ConfigError::UnknownBlockRule(name)) if name == "alt+space"
        ));
    }
}
