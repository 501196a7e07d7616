//! Display wake pulse.
//!
//! A sleeping display ignores DDC writes, so before a round of input
//! switches the session simulates a 1-pixel relative mouse movement and
//! back, then waits 100 ms for the display pipeline to come up.

use std::time::Duration;

use tracing::debug;

/// Delay callers should observe after [`wake_displays`] before issuing
/// DDC writes.
pub const WAKE_SETTLE: Duration = Duration::from_millis(100);

/// Jiggles the pointer one pixel and back to wake sleeping displays.
/// A no-op on platforms without an injection API.
pub fn wake_displays() {
    debug!("waking displays with a 1px pointer pulse");

    #[cfg(target_os = "macos")]
    {
        use core_graphics::event::{CGEvent, CGEventTapLocation, CGEventType, CGMouseButton};
        use core_graphics::event_source::{CGEventSource, CGEventSourceStateID};
        use core_graphics::geometry::CGPoint;

        let Ok(source) = CGEventSource::new(CGEventSourceStateID::HIDSystemState) else {
            return;
        };
        let Ok(probe) = CGEvent::new(source.clone()) else {
            return;
        };
        let loc = probe.location();
        for point in [
            CGPoint::new(loc.x + 1.0, loc.y + 1.0),
            CGPoint::new(loc.x, loc.y),
        ] {
            if let Ok(event) = CGEvent::new_mouse_event(
                source.clone(),
                CGEventType::MouseMoved,
                point,
                CGMouseButton::Left,
            ) {
                event.post(CGEventTapLocation::HID);
            }
        }
    }

    #[cfg(target_os = "windows")]
    {
        use windows::Win32::UI::Input::KeyboardAndMouse::{
            SendInput, INPUT, INPUT_0, INPUT_MOUSE, MOUSEEVENTF_MOVE, MOUSEINPUT,
        };

        for (dx, dy) in [(1, 1), (-1, -1)] {
            let input = INPUT {
                r#type: INPUT_MOUSE,
                Anonymous: INPUT_0 {
                    mi: MOUSEINPUT {
                        dx,
                        dy,
                        mouseData: 0,
                        dwFlags: MOUSEEVENTF_MOVE,
                        time: 0,
                        dwExtraInfo: 0,
                    },
                },
            };
            // SAFETY: single well-formed INPUT.
            unsafe {
                SendInput(&[input], std::mem::size_of::<INPUT>() as i32);
            }
        }
    }
}
