//! OS keyboard hook backends
//!
//! A backend delivers every key event to a [`KeyHandler`] on its own thread
//! and swallows the event when the handler returns [`Verdict::Suppress`].
//!
//! - Windows: `WH_KEYBOARD_LL` low-level hook
//! - macOS: `CGEventTap` at the session level
//! - elsewhere: [`UnsupportedHook`], which fails to install

mod manual;

#[cfg(target_os = "macos")]
mod macos;
#[cfg(target_os = "windows")]
mod win32;

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

pub use manual::ManualHook;

#[cfg(target_os = "macos")]
pub use macos::MacHook;
#[cfg(target_os = "windows")]
pub use win32::WindowsHook;

use super::keys::RawKeyEvent;
use super::policy::Verdict;

/// Hook backend for the current platform
#[cfg(target_os = "windows")]
pub type PlatformHook = WindowsHook;
#[cfg(target_os = "macos")]
pub type PlatformHook = MacHook;
#[cfg(not(any(target_os = "windows", target_os = "macos")))]
pub type PlatformHook = UnsupportedHook;

/// Receives key events from a hook; must return promptly
pub trait KeyHandler: Send + Sync {
    fn handle(&self, event: RawKeyEvent) -> Verdict;
}

/// An installable OS-level keyboard hook
pub trait KeyboardHook: Send {
    /// Install the hook and start delivering events to `handler`
    ///
    /// Installing an already installed hook is a no-op.
    fn install(&mut self, handler: Arc<dyn KeyHandler>) -> Result<(), HookError>;

    /// Remove the hook; safe to call when not installed
    fn uninstall(&mut self);

    fn is_installed(&self) -> bool;

    /// Whether this backend can work on the current platform at all
    fn is_available(&self) -> bool {
        true
    }
}

/// Errors that can occur while installing the hook
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HookError {
    #[error("keyboard hooks are not supported on this platform")]
    Unsupported,

    #[error("failed to install keyboard hook: {0}")]
    Install(String),

    #[error("failed to spawn hook thread: {0}")]
    ThreadSpawn(String),
}

/// Name given to backend hook threads
#[cfg_attr(not(any(target_os = "windows", target_os = "macos")), allow(dead_code))]
pub(crate) const HOOK_THREAD_NAME: &str = "keyboard-guard-hook";

/// Run the handler without letting a panic unwind into the OS callback
///
/// A panicking handler allows the event.
pub(crate) fn dispatch(handler: &dyn KeyHandler, event: RawKeyEvent) -> Verdict {
    panic::catch_unwind(AssertUnwindSafe(|| handler.handle(event))).unwrap_or(Verdict::Allow)
}

/// Backend for platforms without a suppressing keyboard hook
#[derive(Debug, Default)]
pub struct UnsupportedHook;

impl KeyboardHook for UnsupportedHook {
    fn install(&mut self, _handler: Arc<dyn KeyHandler>) -> Result<(), HookError> {
        Err(HookError::Unsupported)
    }

    fn uninstall(&mut self) {}

    fn is_installed(&self) -> bool {
        false
    }

    fn is_available(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyboard::keys::RawKey;

    struct Panicking;

    impl KeyHandler for Panicking {
        fn handle(&self, _event: RawKeyEvent) -> Verdict {
            panic!("handler bug");
        }
    }

    struct SuppressAll;

    impl KeyHandler for SuppressAll {
        fn handle(&self, _event: RawKeyEvent) -> Verdict {
            Verdict::Suppress
        }
    }

    #[test]
    fn test_dispatch_contains_panics() {
        let event = RawKeyEvent::press(RawKey::Windows { vk: 0x41, scan: 0 });
        assert_eq!(dispatch(&Panicking, event), Verdict::Allow);
        assert_eq!(dispatch(&SuppressAll, event), Verdict::Suppress);
    }

    #[test]
    fn test_unsupported_hook() {
        let mut hook = UnsupportedHook;
        assert_eq!(
            hook.install(Arc::new(SuppressAll)),
            Err(HookError::Unsupported)
        );
        assert!(!hook.is_installed());
        assert!(!hook.is_available());
        hook.uninstall();
    }
}
