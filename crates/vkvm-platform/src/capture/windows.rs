//! Windows low-level keyboard and mouse hook capture.
//!
//! Installs WH_KEYBOARD_LL and WH_MOUSE_LL hooks on a dedicated Win32
//! message-loop thread. The hook callbacks must complete quickly or
//! Windows removes the hook, so all work is deferred: events are pushed
//! onto the shared [`EventQueue`] and consumed from the Tokio runtime.
//!
//! The kill switch is registered with `RegisterHotKey` rather than being
//! matched inside the hook: `RegisterHotKey` chords keep working even
//! while the hook swallows everything else, which is exactly the
//! guarantee the escape path needs.
//!
//! # Safety
//!
//! `unsafe` is used exclusively for Win32 FFI. Hook state lives in
//! process-wide statics because hook callbacks receive no user context
//! pointer; only one capture service may run per process.

#![cfg(target_os = "windows")]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::thread;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{info, warn};
use windows::Win32::Foundation::{LPARAM, LRESULT, WPARAM};
use windows::Win32::UI::Input::KeyboardAndMouse::{
    RegisterHotKey, UnregisterHotKey, HOT_KEY_MODIFIERS, MOD_ALT, MOD_CONTROL,
};
use windows::Win32::UI::WindowsAndMessaging::{
    CallNextHookEx, DispatchMessageW, GetMessageW, SetWindowsHookExW, TranslateMessage,
    UnhookWindowsHookEx, HC_ACTION, HHOOK, KBDLLHOOKSTRUCT, MSG, MSLLHOOKSTRUCT, WH_KEYBOARD_LL,
    WH_MOUSE_LL, WM_HOTKEY, WM_KEYDOWN, WM_KEYUP, WM_LBUTTONDOWN, WM_LBUTTONUP, WM_MBUTTONDOWN,
    WM_MBUTTONUP, WM_MOUSEHWHEEL, WM_MOUSEMOVE, WM_MOUSEWHEEL, WM_RBUTTONDOWN, WM_RBUTTONUP,
    WM_SYSKEYDOWN, WM_SYSKEYUP, WM_XBUTTONDOWN, WM_XBUTTONUP,
};

use vkvm_core::event::{InputEvent, ScrollAxis, TimedEvent};

use super::{CaptureError, EventQueue, InputCapture, KillSwitchFn};

const XBUTTON1: u16 = 0x0001;
const KILL_SWITCH_ID: i32 = 1;

/// Kill-switch chords in preference order: (modifiers, vk, label).
const KILL_SWITCH_CHORDS: [(u32, u32, &str); 4] = [
    (MOD_CONTROL.0 | MOD_ALT.0, 0x1B, "Ctrl+Alt+Esc"),
    (MOD_CONTROL.0 | MOD_ALT.0, 0x51, "Ctrl+Alt+Q"),
    (MOD_CONTROL.0 | MOD_ALT.0, 0x57, "Ctrl+Alt+W"),
    (MOD_CONTROL.0, 0x1B, "Ctrl+Esc"),
];

// Hook callbacks receive no user pointer, so the service state is
// process-global. set() fails on a second capture instance.
static STATE: OnceLock<Arc<SharedState>> = OnceLock::new();

struct SharedState {
    queue: Arc<EventQueue<TimedEvent>>,
    running: AtomicBool,
    capture_enabled: AtomicBool,
    kill_switch: Mutex<Option<KillSwitchFn>>,
    /// Prior pointer position for delta computation; (i32::MIN, i32::MIN)
    /// means "not initialized yet".
    last_pos: Mutex<Option<(i32, i32)>>,
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Owns an installed hook handle; uninstalls on every exit path from the
/// hook thread, panic included.
struct HookGuard(HHOOK);

impl Drop for HookGuard {
    fn drop(&mut self) {
        // SAFETY: the handle came from SetWindowsHookExW on this thread.
        unsafe {
            let _ = UnhookWindowsHookEx(self.0);
        }
    }
}

/// Owns the kill-switch hotkey registration.
struct HotkeyGuard;

impl Drop for HotkeyGuard {
    fn drop(&mut self) {
        // SAFETY: unregisters the id this thread registered.
        unsafe {
            let _ = UnregisterHotKey(None, KILL_SWITCH_ID);
        }
    }
}

/// Windows capture service. One instance per process.
pub struct WindowsCapture {
    state: Arc<SharedState>,
}

impl WindowsCapture {
    pub fn new() -> Self {
        let state = Arc::new(SharedState {
            queue: Arc::new(EventQueue::new(EventQueue::<TimedEvent>::DEFAULT_CAPACITY)),
            running: AtomicBool::new(false),
            capture_enabled: AtomicBool::new(false),
            kill_switch: Mutex::new(None),
            last_pos: Mutex::new(None),
        });
        Self { state }
    }
}

impl Default for WindowsCapture {
    fn default() -> Self {
        Self::new()
    }
}

impl InputCapture for WindowsCapture {
    fn start(&self) -> Result<(), CaptureError> {
        if self.state.running.swap(true, Ordering::SeqCst) {
            return Err(CaptureError::AlreadyRunning);
        }

        STATE.set(Arc::clone(&self.state)).map_err(|_| {
            CaptureError::Unavailable("another capture service already ran in this process".into())
        })?;

        // Hook installation happens on the message-loop thread; its
        // outcome is reported back through this channel so start() can
        // return a real error instead of spawning and hoping.
        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<Result<(), CaptureError>>();

        thread::Builder::new()
            .name("vkvm-capture-hooks".to_string())
            .spawn(move || run_hook_loop(ready_tx))
            .map_err(|e| CaptureError::Unavailable(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                self.state.running.store(false, Ordering::SeqCst);
                Err(e)
            }
            Err(_) => {
                self.state.running.store(false, Ordering::SeqCst);
                Err(CaptureError::Unavailable(
                    "hook thread exited before reporting readiness".into(),
                ))
            }
        }
    }

    fn stop(&self) {
        // The message loop polls this flag; hooks are uninstalled on the
        // loop thread itself (hook handles are thread-affine).
        self.state.running.store(false, Ordering::SeqCst);
    }

    fn events(&self) -> Arc<EventQueue<TimedEvent>> {
        Arc::clone(&self.state.queue)
    }

    fn enable_capture(&self, enabled: bool) {
        self.state.capture_enabled.store(enabled, Ordering::SeqCst);
        info!(enabled, "input capture gate changed");
    }

    fn is_capture_enabled(&self) -> bool {
        self.state.capture_enabled.load(Ordering::SeqCst)
    }

    fn set_kill_switch(&self, callback: KillSwitchFn) {
        *self.state.kill_switch.lock().expect("kill switch lock") = Some(callback);
    }
}

/// Entry point for the dedicated hook thread: installs both hooks and the
/// kill-switch hotkey, then pumps messages until `running` clears.
fn run_hook_loop(ready_tx: std::sync::mpsc::Sender<Result<(), CaptureError>>) {
    let state = STATE.get().expect("state initialized by start()");

    // SAFETY: SetWindowsHookExW with a null module handle is valid for
    // low-level hooks; the callback runs on this thread's message loop.
    // The guards uninstall on every exit path from this thread.
    let _kbd_hook = match unsafe {
        SetWindowsHookExW(WH_KEYBOARD_LL, Some(keyboard_hook_proc), None, 0)
    } {
        Ok(h) => HookGuard(h),
        Err(e) => {
            let _ = ready_tx.send(Err(CaptureError::Unavailable(format!(
                "WH_KEYBOARD_LL install failed: {e}"
            ))));
            return;
        }
    };
    let _mouse_hook =
        match unsafe { SetWindowsHookExW(WH_MOUSE_LL, Some(mouse_hook_proc), None, 0) } {
            Ok(h) => HookGuard(h),
            Err(e) => {
                let _ = ready_tx.send(Err(CaptureError::Unavailable(format!(
                    "WH_MOUSE_LL install failed: {e}"
                ))));
                return;
            }
        };

    // Kill switch: thread-scoped RegisterHotKey (null hwnd posts WM_HOTKEY
    // to this thread's queue). Without a registered escape chord we must
    // not capture at all.
    let _hotkey = match register_kill_switch() {
        Ok(guard) => guard,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    let _ = ready_tx.send(Ok(()));

    // SAFETY: standard GetMessage/DispatchMessage pump.
    unsafe {
        let mut msg = MSG::default();
        while state.running.load(Ordering::SeqCst) && GetMessageW(&mut msg, None, 0, 0).as_bool() {
            if msg.message == WM_HOTKEY && msg.wParam.0 as i32 == KILL_SWITCH_ID {
                state.capture_enabled.store(false, Ordering::SeqCst);
                if let Some(cb) = state.kill_switch.lock().expect("kill switch lock").as_ref() {
                    cb();
                }
                continue;
            }
            let _ = TranslateMessage(&msg);
            DispatchMessageW(&msg);
        }
    }
}

fn register_kill_switch() -> Result<HotkeyGuard, CaptureError> {
    for (modifiers, vk, label) in KILL_SWITCH_CHORDS {
        // SAFETY: plain FFI; a null hwnd ties the hotkey to this thread.
        let ok = unsafe { RegisterHotKey(None, KILL_SWITCH_ID, HOT_KEY_MODIFIERS(modifiers), vk) };
        match ok {
            Ok(()) => {
                info!(chord = label, "kill switch registered");
                return Ok(HotkeyGuard);
            }
            Err(_) => {
                warn!(chord = label, "kill switch chord already claimed, trying next");
            }
        }
    }
    Err(CaptureError::KillSwitchUnregistrable(
        "Ctrl+Alt+Esc, Ctrl+Alt+Q, Ctrl+Alt+W and Ctrl+Esc are all claimed".into(),
    ))
}

/// Pushes the event and reports whether it should be swallowed.
fn emit(state: &SharedState, event: InputEvent) -> bool {
    state.queue.push(TimedEvent::new(event, now_ms()));
    state.capture_enabled.load(Ordering::SeqCst)
}

/// Low-level keyboard hook callback. Must return fast.
unsafe extern "system" fn keyboard_hook_proc(
    n_code: i32,
    w_param: WPARAM,
    l_param: LPARAM,
) -> LRESULT {
    if n_code != HC_ACTION as i32 {
        return CallNextHookEx(None, n_code, w_param, l_param);
    }
    let Some(state) = STATE.get() else {
        return CallNextHookEx(None, n_code, w_param, l_param);
    };

    // SAFETY: l_param points to KBDLLHOOKSTRUCT when n_code == HC_ACTION.
    let kbs = &*(l_param.0 as *const KBDLLHOOKSTRUCT);
    let pressed = match w_param.0 as u32 {
        WM_KEYDOWN | WM_SYSKEYDOWN => true,
        WM_KEYUP | WM_SYSKEYUP => false,
        _ => return CallNextHookEx(None, n_code, w_param, l_param),
    };

    let swallow = emit(
        state,
        InputEvent::Key {
            code: kbs.vkCode as u16,
            pressed,
            modifiers: 0, // the agent's injector synthesizes its own mask
        },
    );

    if swallow {
        // RegisterHotKey chords (the kill switch) are processed before
        // low-level hooks, so the escape path survives this.
        return LRESULT(1);
    }
    CallNextHookEx(None, n_code, w_param, l_param)
}

/// Low-level mouse hook callback. Converts absolute positions to deltas.
unsafe extern "system" fn mouse_hook_proc(n_code: i32, w_param: WPARAM, l_param: LPARAM) -> LRESULT {
    if n_code != HC_ACTION as i32 {
        return CallNextHookEx(None, n_code, w_param, l_param);
    }
    let Some(state) = STATE.get() else {
        return CallNextHookEx(None, n_code, w_param, l_param);
    };

    // SAFETY: l_param points to MSLLHOOKSTRUCT when n_code == HC_ACTION.
    let mhs = &*(l_param.0 as *const MSLLHOOKSTRUCT);
    let (x, y) = (mhs.pt.x, mhs.pt.y);

    let event = match w_param.0 as u32 {
        WM_MOUSEMOVE => {
            let mut last = state.last_pos.lock().expect("last_pos lock");
            match last.replace((x, y)) {
                Some((px, py)) => InputEvent::MouseMove {
                    dx: x - px,
                    dy: y - py,
                },
                // First motion after start: initialize only.
                None => return CallNextHookEx(None, n_code, w_param, l_param),
            }
        }
        WM_LBUTTONDOWN => InputEvent::MouseButton { button: 1, pressed: true },
        WM_LBUTTONUP => InputEvent::MouseButton { button: 1, pressed: false },
        WM_RBUTTONDOWN => InputEvent::MouseButton { button: 2, pressed: true },
        WM_RBUTTONUP => InputEvent::MouseButton { button: 2, pressed: false },
        WM_MBUTTONDOWN => InputEvent::MouseButton { button: 3, pressed: true },
        WM_MBUTTONUP => InputEvent::MouseButton { button: 3, pressed: false },
        WM_XBUTTONDOWN | WM_XBUTTONUP => {
            let button = if (mhs.mouseData >> 16) as u16 == XBUTTON1 { 4 } else { 5 };
            InputEvent::MouseButton {
                button,
                pressed: w_param.0 as u32 == WM_XBUTTONDOWN,
            }
        }
        WM_MOUSEWHEEL => InputEvent::MouseWheel {
            delta: (mhs.mouseData >> 16) as i16 as i32,
            axis: ScrollAxis::Vertical,
        },
        WM_MOUSEHWHEEL => InputEvent::MouseWheel {
            delta: (mhs.mouseData >> 16) as i16 as i32,
            axis: ScrollAxis::Horizontal,
        },
        _ => return CallNextHookEx(None, n_code, w_param, l_param),
    };

    if emit(state, event) {
        return LRESULT(1);
    }
    CallNextHookEx(None, n_code, w_param, l_param)
}
