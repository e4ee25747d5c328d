//! kiosk-guard: keyboard guard for child-safe kiosk applications
//!
//! Intercepts keyboard events at the OS level and provides:
//! - Suppression of system shortcuts (Windows key, Alt+Tab, Alt+F4)
//! - Detection of a deliberate, timed exit combination (default Ctrl+Shift+Esc)
//! - Self-healing key state when release events are lost
//!
//! The host application only needs [`KeyboardGuard::start`],
//! [`KeyboardGuard::stop`] and [`KeyboardGuard::should_exit`].
//!
//! Ctrl+Alt+Delete cannot be intercepted by a user-mode hook and is not
//! attempted.

pub mod config;
pub mod keyboard;
pub mod lifecycle;

pub use config::{ConfigError, GuardConfig, Settings};
pub use keyboard::{GuardState, GuardStatus, HookError, KeyboardGuard};
