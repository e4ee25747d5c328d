//! macOS keyboard tap using CGEventTap
//!
//! Runs on a dedicated thread with its own CFRunLoop. The tap is created
//! with `Default` options so returning `None` from the callback swallows
//! the event. Requires the Accessibility (or Input Monitoring) permission.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{sync_channel, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use core_foundation::runloop::{kCFRunLoopCommonModes, kCFRunLoopDefaultMode, CFRunLoop};
use core_graphics::event::{
    CGEvent, CGEventTap, CGEventTapLocation, CGEventTapOptions,
    CGEventTapPlacement, CGEventTapProxy, CGEventType, EventField,
};
use tracing::{error, info, warn};

use super::{dispatch, HookError, KeyHandler, KeyboardHook, HOOK_THREAD_NAME};
use crate::keyboard::keys::{KeyAction, RawKey, RawKeyEvent};
use crate::keyboard::policy::Verdict;

/// Modifier bits in CGEventFlags
///
/// The device-dependent bits (NX_DEVICE*KEYMASK) tell the two sides apart;
/// the generic bits are used when a source does not set them.
mod modifier_bits {
    pub const LEFT_CONTROL: u64 = 0x0000_0001;
    pub const LEFT_SHIFT: u64 = 0x0000_0002;
    pub const RIGHT_SHIFT: u64 = 0x0000_0004;
    pub const LEFT_COMMAND: u64 = 0x0000_0008;
    pub const RIGHT_COMMAND: u64 = 0x0000_0010;
    pub const LEFT_OPTION: u64 = 0x0000_0020;
    pub const RIGHT_OPTION: u64 = 0x0000_0040;
    pub const RIGHT_CONTROL: u64 = 0x0000_2000;
    pub const DEVICE_MASK: u64 = LEFT_CONTROL
        | LEFT_SHIFT
        | RIGHT_SHIFT
        | LEFT_COMMAND
        | RIGHT_COMMAND
        | LEFT_OPTION
        | RIGHT_OPTION
        | RIGHT_CONTROL;

    pub const SHIFT: u64 = 0x0002_0000;
    pub const CONTROL: u64 = 0x0004_0000;
    pub const OPTION: u64 = 0x0008_0000;
    pub const COMMAND: u64 = 0x0010_0000;
}

/// How long one run-loop slice lasts before the running flag is rechecked
const RUN_LOOP_SLICE: Duration = Duration::from_millis(100);

/// Virtual keycode of CapsLock
const CAPS_LOCK: u16 = 0x39;

/// Set by the tap callback when the system disables the tap
///
/// A disabled tap receives nothing until it is enabled again, so the run
/// loop thread checks this after every slice.
#[derive(Debug, Clone, Default)]
struct TapDisabled(Arc<AtomicBool>);

impl TapDisabled {
    fn mark(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Call `enable` if the tap was disabled since the last check
    fn restore_with(&self, enable: impl FnOnce()) -> bool {
        if self.0.swap(false, Ordering::AcqRel) {
            enable();
            true
        } else {
            false
        }
    }
}

/// Session-level CGEventTap on its own run-loop thread
#[derive(Debug)]
pub struct MacHook {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Default for MacHook {
    fn default() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }
}

impl KeyboardHook for MacHook {
    fn install(&mut self, handler: Arc<dyn KeyHandler>) -> Result<(), HookError> {
        if self.handle.is_some() {
            return Ok(());
        }

        self.running.store(true, Ordering::SeqCst);
        let running = Arc::clone(&self.running);
        let (ready_tx, ready_rx) = sync_channel::<Result<(), HookError>>(1);

        let handle = thread::Builder::new()
            .name(HOOK_THREAD_NAME.to_string())
            .spawn(move || {
                info!("keyboard tap thread started");
                run_event_loop(handler, Arc::clone(&running), ready_tx);
                running.store(false, Ordering::SeqCst);
                info!("keyboard tap thread stopped");
            })
            .map_err(|e| {
                self.running.store(false, Ordering::SeqCst);
                HookError::ThreadSpawn(e.to_string())
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                self.handle = Some(handle);
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                Err(HookError::Install(
                    "tap thread exited before reporting status".to_string(),
                ))
            }
        }
    }

    fn uninstall(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            // The run loop notices the flag within one slice
            if handle.join().is_err() {
                warn!("keyboard tap thread panicked during shutdown");
            }
        }
    }

    fn is_installed(&self) -> bool {
        self.handle.is_some()
    }
}

impl Drop for MacHook {
    fn drop(&mut self) {
        self.uninstall();
    }
}

/// Create the tap and run the CFRunLoop until `running` is cleared
fn run_event_loop(
    handler: Arc<dyn KeyHandler>,
    running: Arc<AtomicBool>,
    ready: SyncSender<Result<(), HookError>>,
) {
    let disabled = TapDisabled::default();
    let disabled_by_system = disabled.clone();

    // CGEventTap callback - must be fast, non-blocking and must not log
    let callback = move |_proxy: CGEventTapProxy,
                         event_type: CGEventType,
                         event: &CGEvent|
                         -> Option<CGEvent> {
        let keycode = event.get_integer_value_field(EventField::KEYBOARD_EVENT_KEYCODE) as u16;

        let actions: &[KeyAction] = match event_type {
            CGEventType::KeyDown => &[KeyAction::Press],
            CGEventType::KeyUp => &[KeyAction::Release],
            CGEventType::FlagsChanged => flags_changed_actions(keycode, event.get_flags().bits()),
            CGEventType::TapDisabledByTimeout | CGEventType::TapDisabledByUserInput => {
                disabled_by_system.mark();
                &[]
            }
            _ => &[],
        };

        let mut verdict = Verdict::Allow;
        for &action in actions {
            let event = RawKeyEvent {
                key: RawKey::Mac { keycode },
                action,
            };
            if dispatch(handler.as_ref(), event) == Verdict::Suppress {
                verdict = Verdict::Suppress;
            }
        }

        match verdict {
            Verdict::Allow => Some(event.clone()),
            Verdict::Suppress => None,
        }
    };

    let tap = match CGEventTap::new(
        CGEventTapLocation::Session,
        CGEventTapPlacement::HeadInsertEventTap,
        CGEventTapOptions::Default,
        vec![
            CGEventType::KeyDown,
            CGEventType::KeyUp,
            CGEventType::FlagsChanged,
        ],
        callback,
    ) {
        Ok(tap) => tap,
        Err(()) => {
            error!("failed to create event tap - is Accessibility permission granted?");
            let _ = ready.send(Err(HookError::Install(
                "CGEventTapCreate returned null; check Accessibility permissions".to_string(),
            )));
            return;
        }
    };

    let run_loop_source = match tap.mach_port.create_runloop_source(0) {
        Ok(source) => source,
        Err(()) => {
            let _ = ready.send(Err(HookError::Install(
                "failed to create run loop source for event tap".to_string(),
            )));
            return;
        }
    };

    let run_loop = CFRunLoop::get_current();
    // SAFETY: kCFRunLoopCommonModes is a valid static CFString
    unsafe {
        run_loop.add_source(&run_loop_source, kCFRunLoopCommonModes);
    }
    tap.enable();

    if ready.send(Ok(())).is_err() {
        return;
    }
    info!("event tap created and enabled");

    while running.load(Ordering::SeqCst) {
        // SAFETY: kCFRunLoopDefaultMode is a valid static CFString
        unsafe {
            CFRunLoop::run_in_mode(kCFRunLoopDefaultMode, RUN_LOOP_SLICE, true);
        }
        if disabled.restore_with(|| tap.enable()) {
            warn!("keyboard tap was disabled by the system, re-enabled");
        }
    }

    // SAFETY: same source and mode as added above
    unsafe {
        run_loop.remove_source(&run_loop_source, kCFRunLoopCommonModes);
    }
}

/// Key events carried by one FlagsChanged event
///
/// CapsLock reports its lock state rather than the key position, so every
/// change is delivered as a tap: a press immediately followed by a release.
fn flags_changed_actions(keycode: u16, flags: u64) -> &'static [KeyAction] {
    if keycode == CAPS_LOCK {
        return &[KeyAction::Press, KeyAction::Release];
    }
    match modifier_action(keycode, flags) {
        Some(KeyAction::Press) => &[KeyAction::Press],
        Some(KeyAction::Release) => &[KeyAction::Release],
        None => &[],
    }
}

/// Press or release for a modifier FlagsChanged event
fn modifier_action(keycode: u16, flags: u64) -> Option<KeyAction> {
    use modifier_bits::*;

    let (device, generic) = match keycode {
        0x3B => (LEFT_CONTROL, CONTROL),
        0x3E => (RIGHT_CONTROL, CONTROL),
        0x38 => (LEFT_SHIFT, SHIFT),
        0x3C => (RIGHT_SHIFT, SHIFT),
        0x37 => (LEFT_COMMAND, COMMAND),
        0x36 => (RIGHT_COMMAND, COMMAND),
        0x3A => (LEFT_OPTION, OPTION),
        0x3D => (RIGHT_OPTION, OPTION),
        _ => return None,
    };

    let down = if flags & DEVICE_MASK != 0 {
        flags & device != 0
    } else {
        flags & generic != 0
    };

    Some(if down {
        KeyAction::Press
    } else {
        KeyAction::Release
    })
}
