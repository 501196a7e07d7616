//! Scriptable DDC controller for tests.

use std::sync::{Arc, Mutex};

use super::{DdcController, DdcError, Monitor};

/// In-memory controller: a scripted monitor set plus a write log.
#[derive(Clone, Default)]
pub struct MockController {
    state: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    monitors: Vec<Monitor>,
    input_writes: Vec<(String, u16)>,
    power_writes: Vec<(String, bool)>,
    fail_writes_for: Vec<String>,
}

impl MockController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a DDC-capable monitor with the given current input.
    pub fn add_monitor(&self, id: &str, name: &str, input: u16) {
        self.state.lock().unwrap().monitors.push(Monitor {
            id: id.to_string(),
            name: name.to_string(),
            device_name: String::new(),
            serial: format!("SER-{id}"),
            input_source: Some(input),
            ddc_supported: true,
        });
    }

    /// Makes writes to `id` fail with `CommandFailed`.
    pub fn fail_writes_for(&self, id: &str) {
        self.state.lock().unwrap().fail_writes_for.push(id.to_string());
    }

    /// All `set_input_source` calls in order.
    pub fn input_writes(&self) -> Vec<(String, u16)> {
        self.state.lock().unwrap().input_writes.clone()
    }

    pub fn power_writes(&self) -> Vec<(String, bool)> {
        self.state.lock().unwrap().power_writes.clone()
    }
}

impl DdcController for MockController {
    fn list_monitors(&self) -> Result<Vec<Monitor>, DdcError> {
        Ok(self.state.lock().unwrap().monitors.clone())
    }

    fn current_input(&self, monitor_id: &str) -> Result<u16, DdcError> {
        let state = self.state.lock().unwrap();
        state
            .monitors
            .iter()
            .find(|m| m.id == monitor_id)
            .and_then(|m| m.input_source)
            .ok_or(DdcError::ValueNotFound)
    }

    fn set_input_source(&self, monitor_id: &str, code: u16) -> Result<(), DdcError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_writes_for.iter().any(|id| id == monitor_id) {
            return Err(DdcError::CommandFailed(format!(
                "scripted failure for {monitor_id}"
            )));
        }
        state.input_writes.push((monitor_id.to_string(), code));
        if let Some(monitor) = state.monitors.iter_mut().find(|m| m.id == monitor_id) {
            monitor.input_source = Some(code);
        }
        Ok(())
    }

    fn set_power(&self, monitor_id: &str, on: bool) -> Result<(), DdcError> {
        self.state
            .lock()
            .unwrap()
            .power_writes
            .push((monitor_id.to_string(), on));
        Ok(())
    }

    fn test_ddc_support(&self, monitor_id: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .monitors
            .iter()
            .any(|m| m.id == monitor_id && m.ddc_supported)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_records_writes_in_order() {
        let ctrl = MockController::new();
        ctrl.add_monitor("A", "Left", 0x11);
        ctrl.set_input_source("A", 0x0F).unwrap();
        ctrl.set_input_source("A", 0x11).unwrap();
        assert_eq!(
            ctrl.input_writes(),
            vec![("A".to_string(), 0x0F), ("A".to_string(), 0x11)]
        );
    }

    #[test]
    fn test_mock_write_updates_current_input() {
        let ctrl = MockController::new();
        ctrl.add_monitor("A", "Left", 0x11);
        ctrl.set_input_source("A", 0x0F).unwrap();
        assert_eq!(ctrl.current_input("A").unwrap(), 0x0F);
    }

    #[test]
    fn test_mock_scripted_failure() {
        let ctrl = MockController::new();
        ctrl.add_monitor("A", "Left", 0x11);
        ctrl.fail_writes_for("A");
        assert!(ctrl.set_input_source("A", 0x0F).is_err());
        assert!(ctrl.input_writes().is_empty());
    }

    #[test]
    fn test_distinct_monitor_ids() {
        let ctrl = MockController::new();
        ctrl.add_monitor("A", "Same Model", 0x11);
        ctrl.add_monitor("B", "Same Model", 0x11);
        let monitors = ctrl.list_monitors().unwrap();
        assert_ne!(monitors[0].id, monitors[1].id);
    }
}
