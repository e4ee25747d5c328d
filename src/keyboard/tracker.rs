//! Pressed-key state shared between the hook thread and the host
//!
//! Every access goes through one mutex. Presses also run the stuck-key
//! sweep inside the same critical section, so no reader ever observes a
//! set that has been updated but not yet swept.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::debug;

use super::clock::Clock;
use super::keys::{CanonicalKey, ComboKey, Modifier};

/// Keys currently considered held, with their most recent press time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeldKeys {
    keys: HashMap<CanonicalKey, Instant>,
}

impl HeldKeys {
    /// Most recent press among the held keys matching `combo`
    ///
    /// With both Ctrl keys down, `ctrl` reports the later of the two.
    pub fn pressed_at(&self, combo: &ComboKey) -> Option<Instant> {
        self.keys
            .iter()
            .filter(|(key, _)| combo.matches(key))
            .map(|(_, at)| *at)
            .max()
    }

    /// Whether either side of `modifier` is held
    pub fn any_modifier(&self, modifier: Modifier) -> bool {
        self.keys.keys().any(|key| key.modifier() == Some(modifier))
    }

    pub fn contains(&self, key: &CanonicalKey) -> bool {
        self.keys.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&CanonicalKey, &Instant)> {
        self.keys.iter()
    }
}

/// Lock-protected set of held keys with stuck-key eviction
#[derive(Debug)]
pub struct PressedKeyTracker {
    held: Mutex<HeldKeys>,
    clock: Arc<dyn Clock>,
    max_key_age: Duration,
}

impl PressedKeyTracker {
    pub fn new(clock: Arc<dyn Clock>, max_key_age: Duration) -> Self {
        Self {
            held: Mutex::new(HeldKeys::default()),
            clock,
            max_key_age,
        }
    }

    /// Record a press and run the stuck-key sweep
    pub fn record_press(&self, key: CanonicalKey) {
        self.press_and_then(key, |_| ());
    }

    /// Record a press, sweep, then evaluate `decide` on the updated set
    ///
    /// All three steps happen under a single lock acquisition. Nothing is
    /// logged on this path since it runs inside the OS hook callback.
    pub fn press_and_then<R>(&self, key: CanonicalKey, decide: impl FnOnce(&HeldKeys) -> R) -> R {
        let now = self.clock.now();
        let mut held = self.lock();
        held.keys.insert(key, now);
        sweep_locked(&mut held, now, self.max_key_age);
        decide(&held)
    }

    /// Forget a key; releasing a key that is not held is a no-op
    pub fn record_release(&self, key: &CanonicalKey) {
        self.lock().keys.remove(key);
    }

    /// Evict entries older than the max key age, returning how many
    pub fn stuck_key_sweep(&self, now: Instant) -> usize {
        let evicted = sweep_locked(&mut self.lock(), now, self.max_key_age);
        if evicted > 0 {
            debug!(evicted, "evicted stuck keys");
        }
        evicted
    }

    pub fn is_held(&self, key: &CanonicalKey) -> bool {
        self.lock().contains(key)
    }

    /// Snapshot of the held set
    pub fn held_keys(&self) -> HeldKeys {
        self.lock().clone()
    }

    pub fn clear(&self) {
        self.lock().keys.clear();
    }

    /// A panic while holding the lock leaves the map itself intact, so
    /// poisoning is ignored rather than propagated into the hook path.
    fn lock(&self) -> MutexGuard<'_, HeldKeys> {
        self.held.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn sweep_locked(held: &mut HeldKeys, now: Instant, max_key_age: Duration) -> usize {
    let before = held.keys.len();
    held.keys
        .retain(|_, pressed_at| now.saturating_duration_since(*pressed_at) <= max_key_age);
    before - held.keys.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyboard::clock::ManualClock;
    use crate::keyboard::keys::Side;

    const CTRL_L: CanonicalKey = CanonicalKey::Modifier(Modifier::Ctrl, Side::Left);
    const CTRL_R: CanonicalKey = CanonicalKey::Modifier(Modifier::Ctrl, Side::Right);

    fn tracker() -> (PressedKeyTracker, ManualClock) {
        let clock = ManualClock::new();
        let tracker = PressedKeyTracker::new(Arc::new(clock.clone()), Duration::from_secs(10));
        (tracker, clock)
    }

    #[test]
    fn test_press_and_release() {
        let (tracker, _) = tracker();
        tracker.record_press(CanonicalKey::Char('a'));
        assert!(tracker.is_held(&CanonicalKey::Char('a')));

        tracker.record_release(&CanonicalKey::Char('a'));
        assert!(!tracker.is_held(&CanonicalKey::Char('a')));
        assert!(tracker.held_keys().is_empty());
    }

    #[test]
    fn test_release_without_press_is_noop() {
        let (tracker, _) = tracker();
        tracker.record_release(&CanonicalKey::Char('x'));
        assert!(tracker.held_keys().is_empty());
    }

    #[test]
    fn test_repress_updates_timestamp() {
        let (tracker, clock) = tracker();
        tracker.record_press(CTRL_L);
        let first = clock.now();

        clock.advance(Duration::from_secs(3));
        tracker.record_press(CTRL_L);

        let held = tracker.held_keys();
        assert_eq!(held.len(), 1);
        assert_eq!(
            held.pressed_at(&ComboKey::Modifier(Modifier::Ctrl)),
            Some(first + Duration::from_secs(3))
        );
    }

    #[test]
    fn test_stuck_key_evicted_on_next_press() {
        let (tracker, clock) = tracker();
        tracker.record_press(CTRL_L);

        clock.advance(Duration::from_millis(10_001));
        tracker.record_press(CanonicalKey::Char('a'));

        assert!(!tracker.is_held(&CTRL_L));
        assert!(tracker.is_held(&CanonicalKey::Char('a')));
    }

    #[test]
    fn test_key_at_exact_age_is_kept() {
        let (tracker, clock) = tracker();
        tracker.record_press(CTRL_L);

        clock.advance(Duration::from_secs(10));
        assert_eq!(tracker.stuck_key_sweep(clock.now()), 0);
        assert!(tracker.is_held(&CTRL_L));

        clock.advance(Duration::from_millis(1));
        assert_eq!(tracker.stuck_key_sweep(clock.now()), 1);
        assert!(!tracker.is_held(&CTRL_L));
    }

    #[test]
    fn test_pressed_at_uses_latest_side() {
        let (tracker, clock) = tracker();
        tracker.record_press(CTRL_L);
        clock.advance(Duration::from_secs(1));
        tracker.record_press(CTRL_R);

        let held = tracker.held_keys();
        assert_eq!(
            held.pressed_at(&ComboKey::Modifier(Modifier::Ctrl)),
            Some(clock.now())
        );
        assert!(held.any_modifier(Modifier::Ctrl));
        assert!(!held.any_modifier(Modifier::Alt));
    }

    #[test]
    fn test_press_and_then_sees_updated_set() {
        let (tracker, _) = tracker();
        let seen = tracker.press_and_then(CTRL_R, |held| held.contains(&CTRL_R));
        assert!(seen);
    }

    #[test]
    fn test_clear() {
        let (tracker, _) = tracker();
        tracker.record_press(CTRL_L);
        tracker.record_press(CanonicalKey::Char('q'));
        tracker.clear();
        assert!(tracker.held_keys().is_empty());
    }
}
