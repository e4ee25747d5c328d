//! In-process hook for driving a guard without an OS hook

use std::sync::{Arc, Mutex};

use super::{dispatch, HookError, KeyHandler, KeyboardHook};
use crate::keyboard::keys::RawKeyEvent;
use crate::keyboard::policy::Verdict;

/// Hook that only receives events injected by the caller
///
/// Clones share the installed handler, so a test can keep one clone while
/// the guard owns another.
#[derive(Clone, Default)]
pub struct ManualHook {
    handler: Arc<Mutex<Option<Arc<dyn KeyHandler>>>>,
    fail_with: Option<HookError>,
}

impl ManualHook {
    pub fn new() -> Self {
        Self::default()
    }

    /// A hook whose installation always fails with `error`
    pub fn failing(error: HookError) -> Self {
        Self {
            fail_with: Some(error),
            ..Self::default()
        }
    }

    /// Deliver an event as the OS would; allowed when nothing is installed
    pub fn inject(&self, event: RawKeyEvent) -> Verdict {
        let handler = self.slot().clone();
        match handler {
            Some(handler) => dispatch(handler.as_ref(), event),
            None => Verdict::Allow,
        }
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<Arc<dyn KeyHandler>>> {
        self.handler.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for ManualHook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualHook")
            .field("installed", &self.is_installed())
            .field("fail_with", &self.fail_with)
            .finish()
    }
}

impl KeyboardHook for ManualHook {
    fn install(&mut self, handler: Arc<dyn KeyHandler>) -> Result<(), HookError> {
        if let Some(error) = &self.fail_with {
            return Err(error.clone());
        }
        let mut slot = self.slot();
        if slot.is_none() {
            *slot = Some(handler);
        }
        Ok(())
    }

    fn uninstall(&mut self) {
        self.slot().take();
    }

    fn is_installed(&self) -> bool {
        self.slot().is_some()
    }
}
