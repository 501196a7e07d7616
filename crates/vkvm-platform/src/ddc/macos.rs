//! macOS DDC driver using the `m1ddc` command-line tool.
//!
//! `m1ddc` speaks DDC/CI over the Apple Silicon display engine. It is
//! looked up on `PATH` and in the usual Homebrew locations; a missing
//! binary degrades the whole display plane to [`DdcError::ToolNotFound`]
//! at construction so the session can report it once.

#![cfg(target_os = "macos")]

use std::path::PathBuf;
use std::process::Command;

use tracing::debug;

use super::parse::parse_m1ddc_list;
use super::{DdcController, DdcError, Monitor};

const CANDIDATE_PATHS: [&str; 3] = ["m1ddc", "/usr/local/bin/m1ddc", "/opt/homebrew/bin/m1ddc"];

pub struct M1ddcController {
    tool_path: PathBuf,
}

impl M1ddcController {
    /// Locates `m1ddc`.
    ///
    /// # Errors
    ///
    /// Returns [`DdcError::ToolNotFound`] when no candidate runs.
    pub fn new() -> Result<Self, DdcError> {
        for candidate in CANDIDATE_PATHS {
            let probe = Command::new(candidate).arg("help").output();
            if probe.is_ok() {
                debug!(tool = candidate, "using m1ddc");
                return Ok(Self {
                    tool_path: PathBuf::from(candidate),
                });
            }
        }
        Err(DdcError::ToolNotFound)
    }

    fn run(&self, args: &[&str]) -> Result<String, DdcError> {
        let output = Command::new(&self.tool_path)
            .args(args)
            .output()
            .map_err(|e| DdcError::CommandFailed(e.to_string()))?;
        if !output.status.success() {
            return Err(DdcError::CommandFailed(format!(
                "m1ddc {args:?} exited with {}",
                output.status
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl DdcController for M1ddcController {
    fn list_monitors(&self) -> Result<Vec<Monitor>, DdcError> {
        let output = self.run(&["display", "list"])?;
        let mut monitors = parse_m1ddc_list(&output);

        for monitor in &mut monitors {
            monitor.ddc_supported = self.test_ddc_support(&monitor.id);
            // Read the current input even when the probe failed: some KVM
            // hardware answers reads but rejects writes, and a successful
            // read is itself proof of DDC support.
            if let Ok(input) = self.current_input(&monitor.id) {
                monitor.input_source = Some(input);
                monitor.ddc_supported = true;
            }
        }
        Ok(monitors)
    }

    fn current_input(&self, monitor_id: &str) -> Result<u16, DdcError> {
        let output = self.run(&["display", monitor_id, "get", "input"])?;
        let text = output.trim();
        // m1ddc prints either decimal or 0x-prefixed values.
        let value = if let Some(hex) = text.strip_prefix("0x") {
            u16::from_str_radix(hex, 16)
        } else {
            text.parse::<u16>()
        };
        value.map_err(|_| DdcError::ValueNotFound)
    }

    fn set_input_source(&self, monitor_id: &str, code: u16) -> Result<(), DdcError> {
        debug!(monitor = monitor_id, code, "m1ddc set input");
        self.run(&["display", monitor_id, "set", "input", &code.to_string()])
            .map(|_| ())
    }

    fn set_power(&self, monitor_id: &str, on: bool) -> Result<(), DdcError> {
        // VCP D6: 1 = on, 4 = standby.
        let value = if on { "1" } else { "4" };
        self.run(&["display", monitor_id, "set", "D6", value])
            .map(|_| ())
    }

    fn test_ddc_support(&self, monitor_id: &str) -> bool {
        self.current_input(monitor_id).is_ok()
            || self.run(&["display", monitor_id, "get", "luminance"]).is_ok()
    }
}
