//! Windows global hook hotkey feed.
//!
//! Installs its own listen-only pair of low-level hooks on a dedicated
//! message-loop thread and forwards every transition to the registry
//! callback. Unlike the capture hooks this pair always calls
//! `CallNextHookEx` — it observes, never swallows.

#![cfg(target_os = "windows")]

use std::sync::OnceLock;
use std::thread;

use tracing::info;
use windows::Win32::Foundation::{LPARAM, LRESULT, WPARAM};
use windows::Win32::UI::WindowsAndMessaging::{
    CallNextHookEx, DispatchMessageW, GetMessageW, SetWindowsHookExW, TranslateMessage,
    UnhookWindowsHookEx, HC_ACTION, KBDLLHOOKSTRUCT, MSG, MSLLHOOKSTRUCT, WH_KEYBOARD_LL,
    WH_MOUSE_LL, WM_KEYDOWN, WM_KEYUP, WM_LBUTTONDOWN, WM_LBUTTONUP, WM_MBUTTONDOWN,
    WM_MBUTTONUP, WM_RBUTTONDOWN, WM_RBUTTONUP, WM_SYSKEYDOWN, WM_SYSKEYUP, WM_XBUTTONDOWN,
    WM_XBUTTONUP,
};

use vkvm_core::keymap::KeyMapper;

use super::{FeedError, TransitionFn};

static CALLBACK: OnceLock<TransitionFn> = OnceLock::new();

const XBUTTON1: u16 = 0x0001;

pub fn start(on_transition: TransitionFn) -> Result<(), FeedError> {
    CALLBACK
        .set(on_transition)
        .map_err(|_| FeedError::Unavailable("hotkey feed already started".into()))?;

    let (ready_tx, ready_rx) = std::sync::mpsc::channel::<Result<(), FeedError>>();
    thread::Builder::new()
        .name("vkvm-hotkey-hooks".to_string())
        .spawn(move || run_hook_loop(ready_tx))
        .map_err(|e| FeedError::Unavailable(e.to_string()))?;

    ready_rx
        .recv()
        .unwrap_or_else(|_| Err(FeedError::Unavailable("hook thread died".into())))
}

fn run_hook_loop(ready_tx: std::sync::mpsc::Sender<Result<(), FeedError>>) {
    // SAFETY: standard low-level hook installation on a message-loop thread.
    let kbd_hook = match unsafe { SetWindowsHookExW(WH_KEYBOARD_LL, Some(keyboard_proc), None, 0) }
    {
        Ok(h) => h,
        Err(e) => {
            let _ = ready_tx.send(Err(FeedError::Unavailable(format!(
                "keyboard hook failed: {e}"
            ))));
            return;
        }
    };
    let mouse_hook = match unsafe { SetWindowsHookExW(WH_MOUSE_LL, Some(mouse_proc), None, 0) } {
        Ok(h) => h,
        Err(e) => {
            unsafe {
                let _ = UnhookWindowsHookEx(kbd_hook);
            }
            let _ = ready_tx.send(Err(FeedError::Unavailable(format!("mouse hook failed: {e}"))));
            return;
        }
    };

    info!("Windows hotkey hooks running");
    let _ = ready_tx.send(Ok(()));

    // SAFETY: standard message pump; this process keeps the hooks for
    // its lifetime.
    unsafe {
        let mut msg = MSG::default();
        while GetMessageW(&mut msg, None, 0, 0).as_bool() {
            let _ = TranslateMessage(&msg);
            DispatchMessageW(&msg);
        }
        let _ = UnhookWindowsHookEx(kbd_hook);
        let _ = UnhookWindowsHookEx(mouse_hook);
    }
}

unsafe extern "system" fn keyboard_proc(n_code: i32, w_param: WPARAM, l_param: LPARAM) -> LRESULT {
    if n_code == HC_ACTION as i32 {
        if let Some(callback) = CALLBACK.get() {
            // SAFETY: l_param points to KBDLLHOOKSTRUCT at HC_ACTION.
            let kbs = &*(l_param.0 as *const KBDLLHOOKSTRUCT);
            let is_down = matches!(w_param.0 as u32, WM_KEYDOWN | WM_SYSKEYDOWN);
            let is_up = matches!(w_param.0 as u32, WM_KEYUP | WM_SYSKEYUP);
            if is_down || is_up {
                if let Some(token) = KeyMapper::vk_to_token(kbs.vkCode as u16) {
                    callback(token, is_down);
                }
            }
        }
    }
    CallNextHookEx(None, n_code, w_param, l_param)
}

unsafe extern "system" fn mouse_proc(n_code: i32, w_param: WPARAM, l_param: LPARAM) -> LRESULT {
    if n_code == HC_ACTION as i32 {
        if let Some(callback) = CALLBACK.get() {
            // SAFETY: l_param points to MSLLHOOKSTRUCT at HC_ACTION.
            let mhs = &*(l_param.0 as *const MSLLHOOKSTRUCT);
            let transition = match w_param.0 as u32 {
                WM_LBUTTONDOWN => Some(("MOUSE1", true)),
                WM_LBUTTONUP => Some(("MOUSE1", false)),
                WM_RBUTTONDOWN => Some(("MOUSE2", true)),
                WM_RBUTTONUP => Some(("MOUSE2", false)),
                WM_MBUTTONDOWN => Some(("MOUSE3", true)),
                WM_MBUTTONUP => Some(("MOUSE3", false)),
                WM_XBUTTONDOWN | WM_XBUTTONUP => {
                    let token = if (mhs.mouseData >> 16) as u16 == XBUTTON1 {
                        "MOUSE4"
                    } else {
                        "MOUSE5"
                    };
                    Some((token, w_param.0 as u32 == WM_XBUTTONDOWN))
                }
                _ => None,
            };
            if let Some((token, is_down)) = transition {
                callback(token, is_down);
            }
        }
    }
    CallNextHookEx(None, n_code, w_param, l_param)
}
