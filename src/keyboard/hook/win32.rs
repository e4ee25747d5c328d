//! Windows low-level keyboard hook
//!
//! `WH_KEYBOARD_LL` callbacks run on the thread that installed the hook,
//! and only while that thread pumps messages. The backend therefore owns a
//! dedicated thread running a message loop; the handler is kept in
//! thread-local storage because the hook procedure cannot capture state.
//! Windows silently removes a hook whose callback exceeds the
//! `LowLevelHooksTimeout`, so the handler must never block.

use std::cell::RefCell;
use std::sync::mpsc::{sync_channel, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, error, info, warn};
use windows::core::PCWSTR;
use windows::Win32::Foundation::{HINSTANCE, HWND, LPARAM, LRESULT, WPARAM};
use windows::Win32::System::LibraryLoader::GetModuleHandleW;
use windows::Win32::System::Threading::GetCurrentThreadId;
use windows::Win32::UI::WindowsAndMessaging::{
    CallNextHookEx, DispatchMessageW, GetMessageW, PeekMessageW, PostThreadMessageW,
    SetWindowsHookExW, TranslateMessage, UnhookWindowsHookEx, HC_ACTION, HHOOK, KBDLLHOOKSTRUCT,
    MSG, PM_NOREMOVE, WH_KEYBOARD_LL, WM_KEYDOWN, WM_KEYUP, WM_QUIT, WM_SYSKEYDOWN, WM_SYSKEYUP,
    WM_USER,
};

use super::{dispatch, HookError, KeyHandler, KeyboardHook, HOOK_THREAD_NAME};
use crate::keyboard::keys::{KeyAction, RawKey, RawKeyEvent};
use crate::keyboard::policy::Verdict;

thread_local! {
    static HANDLER: RefCell<Option<Arc<dyn KeyHandler>>> = const { RefCell::new(None) };
}

/// `WH_KEYBOARD_LL` hook running on its own message-loop thread
#[derive(Debug, Default)]
pub struct WindowsHook {
    worker: Option<HookThread>,
}

#[derive(Debug)]
struct HookThread {
    thread_id: u32,
    handle: JoinHandle<()>,
}

impl KeyboardHook for WindowsHook {
    fn install(&mut self, handler: Arc<dyn KeyHandler>) -> Result<(), HookError> {
        if self.worker.is_some() {
            return Ok(());
        }

        let (ready_tx, ready_rx) = sync_channel::<Result<u32, HookError>>(1);

        let handle = thread::Builder::new()
            .name(HOOK_THREAD_NAME.to_string())
            .spawn(move || run_message_loop(handler, ready_tx))
            .map_err(|e| HookError::ThreadSpawn(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(thread_id)) => {
                self.worker = Some(HookThread { thread_id, handle });
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                Err(HookError::Install(
                    "hook thread exited before reporting status".to_string(),
                ))
            }
        }
    }

    fn uninstall(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };

        // SAFETY: posting to a thread id we own; the queue exists because the
        // thread called PeekMessageW before reporting ready.
        let posted =
            unsafe { PostThreadMessageW(worker.thread_id, WM_QUIT, WPARAM(0), LPARAM(0)) };
        if let Err(e) = posted {
            warn!(?e, "failed to post WM_QUIT to hook thread");
            return;
        }

        if worker.handle.join().is_err() {
            warn!("hook thread panicked during shutdown");
        }
    }

    fn is_installed(&self) -> bool {
        self.worker.is_some()
    }
}

impl Drop for WindowsHook {
    fn drop(&mut self) {
        self.uninstall();
    }
}

/// Install the hook on the current thread and pump messages until WM_QUIT
fn run_message_loop(handler: Arc<dyn KeyHandler>, ready: SyncSender<Result<u32, HookError>>) {
    HANDLER.with(|slot| *slot.borrow_mut() = Some(handler));

    // SAFETY: plain Win32 calls on this thread; the hook procedure only reads
    // the thread-local handler set above.
    let installed = unsafe {
        // Force creation of this thread's message queue so WM_QUIT can be posted
        let mut msg = MSG::default();
        let _ = PeekMessageW(&mut msg, HWND::default(), WM_USER, WM_USER, PM_NOREMOVE);

        GetModuleHandleW(PCWSTR::null()).and_then(|module| {
            SetWindowsHookExW(WH_KEYBOARD_LL, Some(keyboard_proc), HINSTANCE::from(module), 0)
        })
    };

    let hook = match installed {
        Ok(hook) => hook,
        Err(e) => {
            error!(?e, "SetWindowsHookExW failed");
            HANDLER.with(|slot| slot.borrow_mut().take());
            let _ = ready.send(Err(HookError::Install(e.to_string())));
            return;
        }
    };

    // SAFETY: no preconditions
    let thread_id = unsafe { GetCurrentThreadId() };
    if ready.send(Ok(thread_id)).is_err() {
        // SAFETY: `hook` was returned by SetWindowsHookExW above
        let _ = unsafe { UnhookWindowsHookEx(hook) };
        return;
    }

    info!(thread_id, "low-level keyboard hook installed");

    let mut msg = MSG::default();
    loop {
        // SAFETY: `msg` is a valid out-pointer for the duration of the call
        let status = unsafe { GetMessageW(&mut msg, HWND::default(), 0, 0) };
        // 0 is WM_QUIT, -1 is an error
        if status.0 <= 0 {
            break;
        }
        // SAFETY: `msg` was filled in by GetMessageW
        unsafe {
            let _ = TranslateMessage(&msg);
            DispatchMessageW(&msg);
        }
    }

    // SAFETY: `hook` was returned by SetWindowsHookExW above
    match unsafe { UnhookWindowsHookEx(hook) } {
        Ok(()) => info!("low-level keyboard hook removed"),
        Err(e) => warn!(?e, "UnhookWindowsHookEx failed"),
    }
    HANDLER.with(|slot| slot.borrow_mut().take());
    debug!("hook thread exiting");
}

/// Low-level keyboard hook procedure
unsafe extern "system" fn keyboard_proc(code: i32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
    if code == HC_ACTION as i32 {
        // SAFETY: for HC_ACTION, lparam points to a KBDLLHOOKSTRUCT
        let info = &*(lparam.0 as *const KBDLLHOOKSTRUCT);

        let action = match wparam.0 as u32 {
            WM_KEYDOWN | WM_SYSKEYDOWN => Some(KeyAction::Press),
            WM_KEYUP | WM_SYSKEYUP => Some(KeyAction::Release),
            _ => None,
        };

        if let Some(action) = action {
            let event = RawKeyEvent {
                key: RawKey::Windows {
                    vk: info.vkCode,
                    scan: info.scanCode,
                },
                action,
            };

            let verdict = HANDLER
                .try_with(|slot| match slot.try_borrow() {
                    Ok(handler) => handler
                        .as_ref()
                        .map_or(Verdict::Allow, |h| dispatch(h.as_ref(), event)),
                    Err(_) => Verdict::Allow,
                })
                .unwrap_or(Verdict::Allow);

            if verdict == Verdict::Suppress {
                return LRESULT(1);
            }
        }
    }

    CallNextHookEx(HHOOK::default(), code, wparam, lparam)
}
