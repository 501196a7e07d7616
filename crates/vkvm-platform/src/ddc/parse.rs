//! Pure parsers for DDC tool output.
//!
//! Both platform tools print text the drivers have to scrape. Every
//! parser lives here with no platform gate so the formats stay covered
//! by tests on any build host.

use super::{InputSource, Monitor};

/// Decodes tool output that may be UTF-16LE (with or without BOM) or
/// already UTF-8. `ControlMyMonitor` writes UTF-16LE files.
pub fn decode_tool_output(bytes: &[u8]) -> String {
    if bytes.len() < 2 {
        return String::from_utf8_lossy(bytes).into_owned();
    }

    // Valid UTF-8 with few NULs is taken as-is: ASCII re-encoded as
    // UTF-16 would be half NUL bytes.
    if let Ok(s) = std::str::from_utf8(bytes) {
        let nulls = bytes.iter().filter(|b| **b == 0).count();
        if nulls < bytes.len() / 10 {
            return s.to_string();
        }
    }

    let body = if bytes[0] == 0xFF && bytes[1] == 0xFE {
        &bytes[2..]
    } else if bytes.len() >= 3 && bytes[0] == 0xEF && bytes[1] == 0xBB && bytes[2] == 0xBF {
        return String::from_utf8_lossy(&bytes[3..]).into_owned();
    } else {
        bytes
    };

    let units: Vec<u16> = body
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16_lossy(&units)
}

/// Parses `m1ddc display list` output.
///
/// Lines look like `[1] VG27AQL3A (776236CB-E781-416A-B419-7A65A34093C1)`.
/// `(null)` names (usually the built-in display) are skipped. The UUID is
/// used as both ID and serial — it is the most specific handle `m1ddc`
/// exposes.
pub fn parse_m1ddc_list(output: &str) -> Vec<Monitor> {
    let mut monitors = Vec::new();
    for line in output.lines() {
        let line = line.trim();
        let Some(rest) = line.strip_prefix('[') else {
            continue;
        };
        let Some((_, rest)) = rest.split_once(']') else {
            continue;
        };
        let rest = rest.trim();
        // Name runs up to the final parenthesized UUID.
        let Some(open) = rest.rfind('(') else {
            continue;
        };
        let Some(close) = rest.rfind(')') else {
            continue;
        };
        if close <= open {
            continue;
        }
        let name = rest[..open].trim();
        let uuid = rest[open + 1..close].trim();
        if name == "(null)" || name.is_empty() || uuid.is_empty() {
            continue;
        }
        monitors.push(Monitor {
            id: uuid.to_string(),
            name: name.to_string(),
            device_name: String::new(),
            serial: uuid.to_string(),
            input_source: None,
            ddc_supported: false,
        });
    }
    monitors
}

/// Parses `ControlMyMonitor /smonitors` output: key/value blocks
/// separated by blank lines.
///
/// ID priority per block: `Monitor ID` (hardware instance path) over
/// `Device Name` (`\\.\DISPLAY1\Monitor0`) over `Monitor Name` (model).
/// The hardware path is the only one guaranteed distinct for two
/// monitors of the same model.
pub fn parse_cmm_monitors(output: &str) -> Vec<Monitor> {
    let mut monitors = Vec::new();
    let mut block: Vec<(String, String)> = Vec::new();

    let mut commit = |block: &mut Vec<(String, String)>| {
        if block.is_empty() {
            return;
        }
        let find = |needle: &str| -> String {
            block
                .iter()
                .find(|(k, _)| k.contains(needle))
                .map(|(_, v)| v.clone())
                .unwrap_or_default()
        };
        // "Monitor ID" also substring-matches "Short Monitor ID"; take
        // the non-short key explicitly.
        let monitor_id = block
            .iter()
            .find(|(k, _)| k.contains("Monitor ID") && !k.contains("Short"))
            .map(|(_, v)| v.clone())
            .unwrap_or_default();
        let device_name = find("Device Name");
        let monitor_name = find("Monitor Name");
        let serial = find("Serial Number");

        let id = if !monitor_id.is_empty() {
            monitor_id
        } else if !device_name.is_empty() {
            device_name.clone()
        } else {
            monitor_name.clone()
        };
        if !id.is_empty() {
            monitors.push(Monitor {
                id,
                name: monitor_name,
                device_name,
                serial,
                input_source: None,
                ddc_supported: false,
            });
        }
        block.clear();
    };

    for line in output.lines() {
        let line: String = line.chars().filter(|c| (' '..='~').contains(c)).collect();
        let line = line.trim();
        if line.is_empty() {
            commit(&mut block);
            continue;
        }
        if let Some((key, value)) = line.split_once(':') {
            block.push((
                key.trim().to_string(),
                value.trim().trim_matches('"').to_string(),
            ));
        }
    }
    commit(&mut block);
    monitors
}

/// Extracts a VCP value from `ControlMyMonitor /scomma` CSV output.
///
/// Rows are `VCP Code, Name, Read-Write, Current Value, ...`; the header
/// row and short rows are skipped.
pub fn parse_vcp_csv(output: &str, vcp_code: &str) -> Option<u16> {
    for line in output.lines() {
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        if fields.len() < 4 {
            continue;
        }
        if fields[0].trim_matches('"') == vcp_code {
            if let Ok(value) = fields[3].trim_matches('"').parse::<u16>() {
                return Some(value);
            }
        }
    }
    None
}

/// True when the CSV dump mentions VCP 60 (input) or VCP 10 (brightness)
/// at all — the DDC support criterion.
pub fn csv_mentions_ddc(output: &str) -> bool {
    output.lines().any(|line| {
        let first = line.split(',').next().unwrap_or("").trim().trim_matches('"');
        first == "60" || first == "10"
    })
}

/// Hardware workaround: some DP adapters enumerate with empty metadata
/// and report HDMI1 while actually being on DisplayPort. When the
/// heuristic is enabled and all three signs line up, report DP1.
pub fn apply_hdmi_dp_heuristic(monitor: &mut Monitor, enabled: bool) {
    if enabled
        && monitor.name.is_empty()
        && monitor.serial.is_empty()
        && monitor.input_source == Some(InputSource::HDMI1.0)
    {
        monitor.input_source = Some(InputSource::DP1.0);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // ── decode_tool_output ────────────────────────────────────────────────────

    #[test]
    fn test_decode_plain_utf8() {
        assert_eq!(decode_tool_output(b"hello"), "hello");
    }

    #[test]
    fn test_decode_utf16le_with_bom() {
        let mut bytes = vec![0xFF, 0xFE];
        for unit in "Monitor".encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        assert_eq!(decode_tool_output(&bytes), "Monitor");
    }

    #[test]
    fn test_decode_utf16le_without_bom() {
        let mut bytes = Vec::new();
        for unit in "Device Name: X".encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        assert_eq!(decode_tool_output(&bytes), "Device Name: X");
    }

    #[test]
    fn test_decode_utf8_with_bom() {
        let bytes = [0xEF, 0xBB, 0xBF, b'o', b'k'];
        assert_eq!(decode_tool_output(&bytes), "ok");
    }

    // ── m1ddc list parsing ────────────────────────────────────────────────────

    #[test]
    fn test_parse_m1ddc_basic_listing() {
        let output = "\
[1] VG27AQL3A (776236CB-E781-416A-B419-7A65A34093C1)
[2] DELL U2720Q (12AB34CD-0000-1111-2222-333344445555)
";
        let monitors = parse_m1ddc_list(output);
        assert_eq!(monitors.len(), 2);
        assert_eq!(monitors[0].id, "776236CB-E781-416A-B419-7A65A34093C1");
        assert_eq!(monitors[0].name, "VG27AQL3A");
        assert_eq!(monitors[1].name, "DELL U2720Q");
    }

    #[test]
    fn test_parse_m1ddc_skips_null_entries() {
        let output = "[1] (null) (AAAA-BBBB)\n[2] LG HDR 4K (CCCC-DDDD)\n";
        let monitors = parse_m1ddc_list(output);
        assert_eq!(monitors.len(), 1);
        assert_eq!(monitors[0].name, "LG HDR 4K");
    }

    #[test]
    fn test_parse_m1ddc_uuid_doubles_as_serial() {
        let monitors = parse_m1ddc_list("[1] X27 (UUID-1)\n");
        assert_eq!(monitors[0].serial, "UUID-1");
    }

    #[test]
    fn test_parse_m1ddc_ignores_garbage_lines() {
        let monitors = parse_m1ddc_list("no brackets here\n[broken\n");
        assert!(monitors.is_empty());
    }

    // ── ControlMyMonitor parsing ──────────────────────────────────────────────

    const CMM_TWO_MONITORS: &str = "\
Monitor Device Name: \\\\.\\DISPLAY1\\Monitor0
Monitor Name: \"VG27AQL3A\"
Serial Number: M3LMQS123456
Monitor ID: MONITOR\\AUS27A1\\{4d36e96e-e325-11ce-bfc1-08002be10318}\\0001
Short Monitor ID: AUS27A1

Monitor Device Name: \\\\.\\DISPLAY2\\Monitor0
Monitor Name: \"VG27AQL3A\"
Serial Number: M3LMQS654321
Monitor ID: MONITOR\\AUS27A1\\{4d36e96e-e325-11ce-bfc1-08002be10318}\\0002
Short Monitor ID: AUS27A1
";

    #[test]
    fn test_parse_cmm_prefers_hardware_instance_path() {
        let monitors = parse_cmm_monitors(CMM_TWO_MONITORS);
        assert_eq!(monitors.len(), 2);
        assert!(monitors[0].id.starts_with("MONITOR\\AUS27A1"));
        assert_eq!(monitors[0].name, "VG27AQL3A");
        assert_eq!(monitors[0].device_name, "\\\\.\\DISPLAY1\\Monitor0");
    }

    #[test]
    fn test_parse_cmm_same_model_monitors_get_distinct_ids() {
        // Two identical monitors must never collide on id.
        let monitors = parse_cmm_monitors(CMM_TWO_MONITORS);
        assert_ne!(monitors[0].id, monitors[1].id);
    }

    #[test]
    fn test_parse_cmm_falls_back_to_device_name() {
        let output = "\
Monitor Device Name: \\\\.\\DISPLAY3\\Monitor0
Monitor Name: \"Ghost\"
";
        let monitors = parse_cmm_monitors(output);
        assert_eq!(monitors[0].id, "\\\\.\\DISPLAY3\\Monitor0");
    }

    #[test]
    fn test_parse_cmm_handles_missing_trailing_blank_line() {
        let output = "Monitor ID: MONITOR\\X\\0001\nMonitor Name: X";
        assert_eq!(parse_cmm_monitors(output).len(), 1);
    }

    // ── VCP CSV parsing ───────────────────────────────────────────────────────

    const VCP_CSV: &str = "\
VCP Code,VCP Code Name,Read-Write,Current Value,Maximum Value
02,New Control Value,Read+Write,2,2
10,Brightness,Read+Write,75,100
60,Input Select,Read+Write,17,27
";

    #[test]
    fn test_parse_vcp_csv_finds_input_select() {
        assert_eq!(parse_vcp_csv(VCP_CSV, "60"), Some(17));
    }

    #[test]
    fn test_parse_vcp_csv_finds_brightness() {
        assert_eq!(parse_vcp_csv(VCP_CSV, "10"), Some(75));
    }

    #[test]
    fn test_parse_vcp_csv_missing_code_is_none() {
        assert_eq!(parse_vcp_csv(VCP_CSV, "D6"), None);
    }

    #[test]
    fn test_csv_mentions_ddc_criterion() {
        assert!(csv_mentions_ddc(VCP_CSV));
        assert!(!csv_mentions_ddc("02,Other,Read,1,2\n"));
    }

    // ── Heuristic ─────────────────────────────────────────────────────────────

    fn bare_monitor(input: u16) -> Monitor {
        Monitor {
            id: "MONITOR\\X\\0003".to_string(),
            name: String::new(),
            device_name: String::new(),
            serial: String::new(),
            input_source: Some(input),
            ddc_supported: true,
        }
    }

    #[test]
    fn test_heuristic_rewrites_bare_hdmi1_to_dp1() {
        let mut monitor = bare_monitor(InputSource::HDMI1.0);
        apply_hdmi_dp_heuristic(&mut monitor, true);
        assert_eq!(monitor.input_source, Some(InputSource::DP1.0));
    }

    #[test]
    fn test_heuristic_disabled_leaves_input_alone() {
        let mut monitor = bare_monitor(InputSource::HDMI1.0);
        apply_hdmi_dp_heuristic(&mut monitor, false);
        assert_eq!(monitor.input_source, Some(InputSource::HDMI1.0));
    }

    #[test]
    fn test_heuristic_requires_all_three_signs() {
        // Named monitor on HDMI1 is genuinely on HDMI1.
        let mut monitor = bare_monitor(InputSource::HDMI1.0);
        monitor.name = "VG27A".to_string();
        apply_hdmi_dp_heuristic(&mut monitor, true);
        assert_eq!(monitor.input_source, Some(InputSource::HDMI1.0));

        // Bare monitor on DP is left alone.
        let mut monitor = bare_monitor(InputSource::DP1.0);
        apply_hdmi_dp_heuristic(&mut monitor, true);
        assert_eq!(monitor.input_source, Some(InputSource::DP1.0));
    }
}
