//! DDC/CI monitor control.
//!
//! Monitor input switching rides DDC/CI — an I²C-over-video protocol —
//! through each platform's established command-line tool rather than a
//! raw I²C binding: `m1ddc` on Apple Silicon, `ControlMyMonitor` on
//! Windows. The tool output parsers are pure functions in [`parse`] so
//! they are testable everywhere; only the subprocess plumbing is
//! platform-gated.
//!
//! Monitor IDs must be the most specific hardware path available
//! (hardware instance path > OS display device path > model name): two
//! physical monitors of the same model must never collide on `id`.

use serde::Serialize;
use thiserror::Error;

pub mod mock;
pub mod parse;

#[cfg(target_os = "macos")]
pub mod macos;

#[cfg(target_os = "windows")]
pub mod windows;

/// VCP code 0x60: input source select.
pub const VCP_INPUT_SELECT: u8 = 0x60;
/// VCP code 0x10: brightness (used only as a DDC liveness probe).
pub const VCP_BRIGHTNESS: u8 = 0x10;
/// VCP code 0xD6: power mode (1 = on, 4 = standby).
pub const VCP_POWER_MODE: u8 = 0xD6;

/// Well-known VCP 0x60 input source codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputSource(pub u16);

impl InputSource {
    pub const DP1: InputSource = InputSource(0x0F);
    pub const DP2: InputSource = InputSource(0x10);
    pub const HDMI1: InputSource = InputSource(0x11);
    pub const HDMI2: InputSource = InputSource(0x12);
    pub const USB_C: InputSource = InputSource(0x1B);

    /// Human-readable label for UI and CLI listings.
    pub fn label(&self) -> &'static str {
        match self.0 {
            0x0F => "DisplayPort 1",
            0x10 => "DisplayPort 2",
            0x11 => "HDMI 1",
            0x12 => "HDMI 2",
            0x1B => "USB-C",
            _ => "Unknown",
        }
    }
}

/// A connected display as the controller sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Monitor {
    /// Stable identifier; the most specific hardware path available.
    pub id: String,
    /// Model name; may be empty for displays with broken metadata.
    pub name: String,
    /// OS display device path, when distinct from `id`.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub device_name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub serial: String,
    /// Current VCP 0x60 value, when readable.
    pub input_source: Option<u16>,
    pub ddc_supported: bool,
}

/// Error type for DDC operations.
#[derive(Debug, Error)]
pub enum DdcError {
    /// The platform's DDC tool binary was not found.
    #[error("DDC tool not found")]
    ToolNotFound,

    /// The tool ran but failed or produced unusable output.
    #[error("DDC command failed: {0}")]
    CommandFailed(String),

    /// The monitor did not expose the requested VCP value.
    #[error("VCP value not found in tool output")]
    ValueNotFound,

    /// No DDC driver exists for this platform.
    #[error("DDC control unsupported on {0}")]
    UnsupportedPlatform(&'static str),
}

/// Contract for DDC control operations.
///
/// Writes to the same physical monitor are serialized by the caller;
/// writes across different monitors may run in parallel. Implementations
/// block on the out-of-process tool and must therefore never be called
/// with a session lock held.
pub trait DdcController: Send + Sync {
    /// Enumerates all connected external displays with a DDC support
    /// probe and current-input read per monitor.
    ///
    /// # Errors
    ///
    /// Returns [`DdcError`] when the tool cannot run at all; individual
    /// monitors that fail their probes are returned with
    /// `ddc_supported = false` instead of failing the listing.
    fn list_monitors(&self) -> Result<Vec<Monitor>, DdcError>;

    /// Reads the current VCP 0x60 input source.
    ///
    /// # Errors
    ///
    /// Returns [`DdcError::CommandFailed`] or [`DdcError::ValueNotFound`].
    fn current_input(&self, monitor_id: &str) -> Result<u16, DdcError>;

    /// Writes VCP 0x60. Callers filter against [`list_monitors`]
    /// first — an ID not present on this machine is the caller's no-op,
    /// not an error here.
    ///
    /// # Errors
    ///
    /// Returns [`DdcError::CommandFailed`] when the write fails.
    fn set_input_source(&self, monitor_id: &str, code: u16) -> Result<(), DdcError>;

    /// Writes VCP 0xD6 power mode (true = on, false = standby).
    ///
    /// # Errors
    ///
    /// Returns [`DdcError::CommandFailed`] when the write fails.
    fn set_power(&self, monitor_id: &str, on: bool) -> Result<(), DdcError>;

    /// True iff the monitor answers a read of VCP 0x60 or VCP 0x10.
    /// Read-only responsiveness is sufficient evidence; writes may still
    /// fail and are handled at the call site.
    fn test_ddc_support(&self, monitor_id: &str) -> bool;
}

/// Creates the platform DDC controller.
///
/// # Errors
///
/// Returns [`DdcError::ToolNotFound`] when the platform tool is missing
/// and [`DdcError::UnsupportedPlatform`] elsewhere.
pub fn platform_controller(hdmi_dp_heuristic: bool) -> Result<Box<dyn DdcController>, DdcError> {
    #[cfg(target_os = "macos")]
    {
        // The metadata heuristic covers a Windows adapter bug; m1ddc
        // reports UUID-addressed displays and never needs it.
        let _ = hdmi_dp_heuristic;
        Ok(Box::new(macos::M1ddcController::new()?))
    }
    #[cfg(target_os = "windows")]
    {
        Ok(Box::new(windows::CmmController::new(hdmi_dp_heuristic)?))
    }
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        let _ = hdmi_dp_heuristic;
        Err(DdcError::UnsupportedPlatform(std::env::consts::OS))
    }
}
