//! Keyboard guard lifecycle
//!
//! Owns the hook, the pressed-key tracker and the exit flag. States:
//! - Stopped: no hook installed, events are not processed
//! - Running: hook installed, shortcuts suppressed, exit combination armed
//! - ExitRequested: Running with the exit flag latched

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, error, info};

use crate::config::{ConfigError, GuardConfig};

use super::clock::{Clock, SystemClock};
use super::hook::{HookError, KeyHandler, KeyboardHook, PlatformHook};
use super::keys::{self, KeyAction, RawKeyEvent};
use super::matcher::{CombinationMatcher, ExitCombination};
use super::policy::{BlockPolicy, Verdict};
use super::tracker::{HeldKeys, PressedKeyTracker};

/// Lifecycle state of a guard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardState {
    Stopped,
    Running,
    ExitRequested,
}

impl fmt::Display for GuardState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuardState::Stopped => write!(f, "Stopped"),
            GuardState::Running => write!(f, "Running"),
            GuardState::ExitRequested => write!(f, "ExitRequested"),
        }
    }
}

/// Point-in-time report for host diagnostics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GuardStatus {
    /// The hook backend can work on this platform
    pub available: bool,
    pub state: GuardState,
    pub exit_combination: String,
    pub held_keys: usize,
}

/// State shared with the hook thread
#[derive(Debug)]
struct GuardCore {
    tracker: PressedKeyTracker,
    matcher: CombinationMatcher,
    policy: BlockPolicy,
    /// One-shot latch, cleared only when a new session starts
    exit_flag: AtomicBool,
    /// Events are ignored while false
    active: AtomicBool,
}

impl GuardCore {
    fn on_press(&self, event: keys::NormalizedEvent) -> Verdict {
        let key = event.key;
        self.tracker.press_and_then(key, |held| {
            if self.matcher.is_satisfied(held) {
                // Logged by the host when it polls the flag, not here
                self.exit_flag.store(true, Ordering::Release);
                // The completing key must not leak to the foreground window
                return Verdict::Suppress;
            }
            self.policy.evaluate(&key, held)
        })
    }
}

impl KeyHandler for GuardCore {
    fn handle(&self, event: RawKeyEvent) -> Verdict {
        if !self.active.load(Ordering::Acquire) {
            return Verdict::Allow;
        }

        let event = keys::normalize(&event);
        match event.action {
            KeyAction::Press => self.on_press(event),
            KeyAction::Release => {
                self.tracker.record_release(&event.key);
                Verdict::Allow
            }
        }
    }
}

/// Kiosk keyboard guard
///
/// Suppresses system shortcuts while running and latches [`should_exit`]
/// once the exit combination is pressed within the exit window.
///
/// [`should_exit`]: KeyboardGuard::should_exit
pub struct KeyboardGuard<H: KeyboardHook = PlatformHook> {
    core: Arc<GuardCore>,
    hook: Mutex<H>,
}

impl KeyboardGuard<PlatformHook> {
    /// Create a guard using the platform hook backend
    pub fn new(config: GuardConfig) -> Result<Self, ConfigError> {
        Self::with_hook(config, PlatformHook::default())
    }
}

impl<H: KeyboardHook> KeyboardGuard<H> {
    /// Create a guard around a specific hook backend
    pub fn with_hook(config: GuardConfig, hook: H) -> Result<Self, ConfigError> {
        Self::with_clock(config, hook, Arc::new(SystemClock))
    }

    /// Create a guard with an explicit clock
    pub fn with_clock(
        config: GuardConfig,
        hook: H,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let combination = ExitCombination::parse(&config.exit_combination)?;
        let policy = BlockPolicy::from_names(&config.blocked_keys)?;

        debug!(
            combination = %combination,
            rules = ?policy.rules(),
            exit_window_ms = duration_ms(config.exit_window),
            max_key_age_ms = duration_ms(config.max_key_age),
            "keyboard guard configured"
        );

        Ok(Self {
            core: Arc::new(GuardCore {
                tracker: PressedKeyTracker::new(clock, config.max_key_age),
                matcher: CombinationMatcher::new(combination, config.exit_window),
                policy,
                exit_flag: AtomicBool::new(false),
                active: AtomicBool::new(false),
            }),
            hook: Mutex::new(hook),
        })
    }

    /// Install the hook and begin guarding
    ///
    /// Idempotent while running. Starting from Stopped begins a new session
    /// with a cleared exit flag. On failure the guard stays Stopped and the
    /// host is expected to continue without the lock.
    pub fn start(&self) -> Result<(), HookError> {
        let mut hook = self.lock_hook();
        if self.core.active.load(Ordering::Acquire) {
            debug!("keyboard guard already running");
            return Ok(());
        }

        self.core.tracker.clear();
        self.core.exit_flag.store(false, Ordering::Release);
        self.core.active.store(true, Ordering::Release);

        let handler: Arc<dyn KeyHandler> = self.core.clone();
        if let Err(e) = hook.install(handler) {
            self.core.active.store(false, Ordering::Release);
            error!(error = %e, "failed to start keyboard guard");
            return Err(e);
        }

        info!(
            combination = %self.core.matcher.combination(),
            "keyboard guard started"
        );
        Ok(())
    }

    /// Remove the hook and drop all tracked key state
    ///
    /// Safe from any state, including never started. A callback still in
    /// flight becomes a no-op. The exit flag stays readable.
    pub fn stop(&self) {
        let mut hook = self.lock_hook();
        let was_active = self.core.active.swap(false, Ordering::AcqRel);
        hook.uninstall();
        self.core.tracker.clear();

        if was_active {
            info!(exit_requested = self.should_exit(), "keyboard guard stopped");
        }
    }

    /// Whether the exit combination has been detected
    pub fn should_exit(&self) -> bool {
        self.core.exit_flag.load(Ordering::Acquire)
    }

    pub fn is_running(&self) -> bool {
        self.core.active.load(Ordering::Acquire)
    }

    pub fn state(&self) -> GuardState {
        if !self.is_running() {
            GuardState::Stopped
        } else if self.should_exit() {
            GuardState::ExitRequested
        } else {
            GuardState::Running
        }
    }

    /// Snapshot of the keys currently considered held
    pub fn held_keys(&self) -> HeldKeys {
        self.core.tracker.held_keys()
    }

    pub fn status(&self) -> GuardStatus {
        GuardStatus {
            available: self.lock_hook().is_available(),
            state: self.state(),
            exit_combination: self.core.matcher.combination().to_string(),
            held_keys: self.core.tracker.held_keys().len(),
        }
    }

    fn lock_hook(&self) -> MutexGuard<'_, H> {
        self.hook.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl<H: KeyboardHook> Drop for KeyboardGuard<H> {
    fn drop(&mut self) {
        self.stop();
    }
}

impl<H: KeyboardHook> fmt::Debug for KeyboardGuard<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyboardGuard")
            .field("state", &self.state())
            .field("combination", &self.core.matcher.combination().to_string())
            .finish()
    }
}

fn duration_ms(duration: Duration) -> u64 {
    duration.as_millis() as u64
}
