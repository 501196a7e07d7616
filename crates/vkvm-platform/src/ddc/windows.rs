//! Windows DDC driver using NirSoft's `ControlMyMonitor.exe`.
//!
//! The tool writes its listings to a file (UTF-16LE) rather than stdout,
//! so each query runs with a unique temp-file path that is removed
//! afterwards. `GetValue` is the fast path for reading VCP 0x60: the
//! value comes back in the process exit code, skipping the multi-second
//! full VCP dump.

#![cfg(target_os = "windows")]

use std::path::PathBuf;
use std::process::Command;

use tracing::{debug, warn};
use uuid::Uuid;

use super::parse::{
    apply_hdmi_dp_heuristic, csv_mentions_ddc, decode_tool_output, parse_cmm_monitors,
    parse_vcp_csv,
};
use super::{DdcController, DdcError, Monitor};

const CANDIDATE_PATHS: [&str; 3] = [
    "ControlMyMonitor.exe",
    r"C:\Program Files\ControlMyMonitor\ControlMyMonitor.exe",
    r"C:\Program Files (x86)\ControlMyMonitor\ControlMyMonitor.exe",
];

pub struct CmmController {
    tool_path: PathBuf,
    hdmi_dp_heuristic: bool,
}

impl CmmController {
    /// Locates `ControlMyMonitor.exe`.
    ///
    /// # Errors
    ///
    /// Returns [`DdcError::ToolNotFound`] when no candidate exists.
    pub fn new(hdmi_dp_heuristic: bool) -> Result<Self, DdcError> {
        for candidate in CANDIDATE_PATHS {
            let path = PathBuf::from(candidate);
            if path.is_absolute() && !path.exists() {
                continue;
            }
            debug!(tool = candidate, "using ControlMyMonitor");
            return Ok(Self {
                tool_path: path,
                hdmi_dp_heuristic,
            });
        }
        Err(DdcError::ToolNotFound)
    }

    /// Runs the tool with an output-file switch, returning the decoded
    /// file content. The temp file is removed on every path.
    fn run_with_temp_file(
        &self,
        output_switch: &str,
        pre_args: &[&str],
    ) -> Result<String, DdcError> {
        let tmp = std::env::temp_dir().join(format!("vkvm_ddc_{}.txt", Uuid::new_v4()));
        let status = Command::new(&self.tool_path)
            .args(pre_args)
            .arg(output_switch)
            .arg(&tmp)
            .status()
            .map_err(|e| DdcError::CommandFailed(e.to_string()));

        let result = match status {
            Ok(status) if status.success() => match std::fs::read(&tmp) {
                Ok(bytes) => Ok(decode_tool_output(&bytes)),
                Err(e) => Err(DdcError::CommandFailed(format!(
                    "tool produced no output file: {e}"
                ))),
            },
            Ok(status) => Err(DdcError::CommandFailed(format!("tool exited with {status}"))),
            Err(e) => Err(e),
        };
        let _ = std::fs::remove_file(&tmp);
        result
    }

    /// Fast VCP 0x60 read: `GetValue` returns the value in the exit
    /// code. Zero means failure (real input codes are non-zero).
    fn get_input_fast(&self, monitor_id: &str) -> Option<u16> {
        let status = Command::new(&self.tool_path)
            .args(["/GetValue", monitor_id, "60"])
            .status()
            .ok()?;
        match status.code() {
            Some(code) if code > 0 => Some(code as u16),
            _ => None,
        }
    }

    fn vcp_dump(&self, monitor_id: &str) -> Result<String, DdcError> {
        self.run_with_temp_file("/scomma", &["/Monitor", monitor_id])
    }

    fn set_value(&self, monitor_id: &str, vcp: &str, value: &str) -> Result<(), DdcError> {
        debug!(monitor = monitor_id, vcp, value, "ControlMyMonitor SetValue");
        let status = Command::new(&self.tool_path)
            .args(["/SetValue", monitor_id, vcp, value])
            .status()
            .map_err(|e| DdcError::CommandFailed(e.to_string()))?;
        if status.success() {
            Ok(())
        } else {
            warn!(monitor = monitor_id, vcp, "SetValue failed with {status}");
            Err(DdcError::CommandFailed(format!("SetValue exited with {status}")))
        }
    }
}

impl DdcController for CmmController {
    fn list_monitors(&self) -> Result<Vec<Monitor>, DdcError> {
        let listing = self.run_with_temp_file("/smonitors", &[])?;
        let mut monitors = parse_cmm_monitors(&listing);

        // Per-monitor detail fetches run in parallel; each takes up to a
        // few seconds against slow DDC buses.
        std::thread::scope(|scope| {
            for monitor in &mut monitors {
                scope.spawn(move || {
                    if let Some(input) = self.get_input_fast(&monitor.id) {
                        monitor.input_source = Some(input);
                        monitor.ddc_supported = true;
                    } else if let Ok(dump) = self.vcp_dump(&monitor.id) {
                        monitor.ddc_supported = csv_mentions_ddc(&dump);
                        monitor.input_source = parse_vcp_csv(&dump, "60");
                    }
                    apply_hdmi_dp_heuristic(monitor, self.hdmi_dp_heuristic);
                });
            }
        });

        Ok(monitors)
    }

    fn current_input(&self, monitor_id: &str) -> Result<u16, DdcError> {
        if let Some(input) = self.get_input_fast(monitor_id) {
            return Ok(input);
        }
        let dump = self.vcp_dump(monitor_id)?;
        parse_vcp_csv(&dump, "60").ok_or(DdcError::ValueNotFound)
    }

    fn set_input_source(&self, monitor_id: &str, code: u16) -> Result<(), DdcError> {
        self.set_value(monitor_id, "60", &code.to_string())
    }

    fn set_power(&self, monitor_id: &str, on: bool) -> Result<(), DdcError> {
        self.set_value(monitor_id, "D6", if on { "1" } else { "4" })
    }

    fn test_ddc_support(&self, monitor_id: &str) -> bool {
        if self.get_input_fast(monitor_id).is_some() {
            return true;
        }
        self.vcp_dump(monitor_id)
            .map(|dump| csv_mentions_ddc(&dump))
            .unwrap_or(false)
    }
}
