//! Recording injection backend for tests.

use std::sync::{Arc, Mutex};

use super::{InjectionBackend, InjectionError, SyntheticEvent};

/// Backend that records posted events instead of synthesizing OS input.
///
/// The cursor position follows posted moves so relative-motion tests see
/// realistic positions. Key codes in `unmapped` produce
/// [`InjectionError::UnmappedKey`] like a real translation table would.
#[derive(Clone, Default)]
pub struct RecordingBackend {
    state: Arc<Mutex<RecordingState>>,
}

#[derive(Default)]
struct RecordingState {
    posted: Vec<SyntheticEvent>,
    cursor: (i32, i32),
    unmapped: Vec<u16>,
    permission: Option<bool>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a wire key code as having no target mapping.
    pub fn mark_unmapped(&self, code: u16) {
        self.state.lock().unwrap().unmapped.push(code);
    }

    /// Overrides the accessibility preflight result.
    pub fn set_permission(&self, granted: bool) {
        self.state.lock().unwrap().permission = Some(granted);
    }

    pub fn set_cursor(&self, x: i32, y: i32) {
        self.state.lock().unwrap().cursor = (x, y);
    }

    pub fn posted(&self) -> Vec<SyntheticEvent> {
        self.state.lock().unwrap().posted.clone()
    }

    pub fn posted_count(&self) -> usize {
        self.state.lock().unwrap().posted.len()
    }
}

impl InjectionBackend for RecordingBackend {
    fn cursor_position(&mut self) -> (i32, i32) {
        self.state.lock().unwrap().cursor
    }

    fn post(&mut self, event: &SyntheticEvent) -> Result<(), InjectionError> {
        let mut state = self.state.lock().unwrap();
        if let SyntheticEvent::Key { code, .. } = event {
            if state.unmapped.contains(code) {
                return Err(InjectionError::UnmappedKey(*code));
            }
        }
        if let SyntheticEvent::MouseMove { x, y, .. } = event {
            state.cursor = (*x, *y);
        }
        state.posted.push(*event);
        Ok(())
    }

    fn permission_granted(&self) -> bool {
        self.state.lock().unwrap().permission.unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::super::Injector;
    use super::*;

    #[test]
    fn test_injector_moves_track_cursor() {
        // S1 shape: deltas (+10,0) then (0,-5) land 10 right, 5 up.
        let backend = RecordingBackend::new();
        backend.set_cursor(500, 500);
        let mut injector = Injector::new(Box::new(backend.clone()));

        injector.inject_mouse_move(10, 0).unwrap();
        injector.inject_mouse_move(0, -5).unwrap();

        let posted = backend.posted();
        assert_eq!(posted.len(), 2);
        assert!(matches!(
            posted[1],
            SyntheticEvent::MouseMove { x: 510, y: 495, .. }
        ));
    }

    #[test]
    fn test_injector_rejects_button_zero_and_six() {
        let mut injector = Injector::new(Box::new(RecordingBackend::new()));
        assert!(matches!(
            injector.inject_mouse_button(0, true),
            Err(InjectionError::InvalidButton(0))
        ));
        assert!(matches!(
            injector.inject_mouse_button(6, true),
            Err(InjectionError::InvalidButton(6))
        ));
    }

    #[test]
    fn test_unmapped_key_is_dropped_not_posted() {
        let backend = RecordingBackend::new();
        backend.mark_unmapped(0xE3);
        let mut injector = Injector::new(Box::new(backend.clone()));

        // Dropped with a one-shot diagnostic; the call itself succeeds.
        injector.inject_key(0xE3, true, 0).unwrap();
        injector.inject_key(0xE3, false, 0).unwrap();
        assert_eq!(backend.posted_count(), 0);
    }

    #[test]
    fn test_mapped_key_posts_through() {
        let backend = RecordingBackend::new();
        let mut injector = Injector::new(Box::new(backend.clone()));
        injector.inject_key(0x41, true, 0).unwrap();
        assert_eq!(backend.posted_count(), 1);
    }

    #[test]
    fn test_reset_clears_modifier_mask() {
        use vkvm_core::keymap::windows_vk::VK_LSHIFT;
        let mut injector = Injector::new(Box::new(RecordingBackend::new()));
        injector.inject_key(VK_LSHIFT, true, 0).unwrap();
        assert_ne!(injector.modifier_mask().0, 0);
        injector.reset();
        assert_eq!(injector.modifier_mask().0, 0);
    }

    #[test]
    fn test_permission_denied_does_not_fail_injection() {
        let backend = RecordingBackend::new();
        backend.set_permission(false);
        let mut injector = Injector::new(Box::new(backend.clone()));
        assert!(!injector.permission_granted());
        injector.inject_mouse_move(1, 1).unwrap();
    }
}
