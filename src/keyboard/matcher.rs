//! Exit-combination matching
//!
//! A combination matches only when every key is held and the presses were
//! assembled within the exit window, so a modifier left down from an
//! unrelated action cannot complete it later.

use std::fmt;
use std::time::{Duration, Instant};

use crate::config::ConfigError;

use super::keys::{CanonicalKey, ComboKey, Modifier, NamedKey};
use super::tracker::HeldKeys;

/// The configured set of keys that unlocks the application
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitCombination {
    keys: Vec<ComboKey>,
}

impl ExitCombination {
    /// Convert configured key names, preserving order and dropping duplicates
    pub fn parse<S: AsRef<str>>(names: &[S]) -> Result<Self, ConfigError> {
        let mut keys = Vec::with_capacity(names.len());
        for name in names {
            let key = ComboKey::parse(name.as_ref())?;
            if !keys.contains(&key) {
                keys.push(key);
            }
        }

        if keys.is_empty() {
            return Err(ConfigError::EmptyExitCombination);
        }
        Ok(Self { keys })
    }

    pub fn keys(&self) -> &[ComboKey] {
        &self.keys
    }
}

impl Default for ExitCombination {
    fn default() -> Self {
        Self {
            keys: vec![
                ComboKey::Modifier(Modifier::Ctrl),
                ComboKey::Modifier(Modifier::Shift),
                ComboKey::Key(CanonicalKey::Named(NamedKey::Esc)),
            ],
        }
    }
}

impl fmt::Display for ExitCombination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, key) in self.keys.iter().enumerate() {
            if i > 0 {
                write!(f, "+")?;
            }
            write!(f, "{key}")?;
        }
        Ok(())
    }
}

/// Decides whether the held keys form a deliberate exit gesture
#[derive(Debug, Clone)]
pub struct CombinationMatcher {
    combination: ExitCombination,
    exit_window: Duration,
}

impl CombinationMatcher {
    pub fn new(combination: ExitCombination, exit_window: Duration) -> Self {
        Self {
            combination,
            exit_window,
        }
    }

    pub fn combination(&self) -> &ExitCombination {
        &self.combination
    }

    /// All combination keys held with press-time spread within the window
    pub fn is_satisfied(&self, held: &HeldKeys) -> bool {
        let mut earliest: Option<Instant> = None;
        let mut latest: Option<Instant> = None;

        for key in self.combination.keys() {
            let Some(at) = held.pressed_at(key) else {
                return false;
            };
            earliest = Some(earliest.map_or(at, |e| e.min(at)));
            latest = Some(latest.map_or(at, |l| l.max(at)));
        }

        match (earliest, latest) {
            (Some(first), Some(last)) => last.duration_since(first) <= self.exit_window,
            _ => false,
        }
    }
}
