//! Keyboard and mouse state, accumulated from window events between frames.

use std::collections::HashSet;

pub use winit::keyboard::KeyCode;

/// Mouse button identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

impl MouseButton {
    /// Maps a winit button; back/forward/other buttons are ignored.
    pub fn from_winit(button: winit::event::MouseButton) -> Option<Self> {
        match button {
            winit::event::MouseButton::Left => Some(MouseButton::Left),
            winit::event::MouseButton::Right => Some(MouseButton::Right),
            winit::event::MouseButton::Middle => Some(MouseButton::Middle),
            _ => None,
        }
    }
}

/// Current keyboard and mouse state plus the edges seen since the last
/// [`InputState::begin_frame`].
#[derive(Debug, Default)]
pub struct InputState {
    pressed_keys: HashSet<KeyCode>,
    just_pressed_keys: HashSet<KeyCode>,

    pressed_buttons: HashSet<MouseButton>,
    just_pressed_buttons: HashSet<MouseButton>,

    /// None until the first cursor event
    mouse_position: Option<(f32, f32)>,
    /// Accumulated since the last frame
    mouse_delta: (f32, f32),
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears the per-frame edges and the mouse delta.
    pub fn begin_frame(&mut self) {
        self.just_pressed_keys.clear();
        self.just_pressed_buttons.clear();
        self.mouse_delta = (0.0, 0.0);
    }

    pub fn on_key_pressed(&mut self, key: KeyCode) {
        if self.pressed_keys.insert(key) {
            self.just_pressed_keys.insert(key);
        }
    }

    pub fn on_key_released(&mut self, key: KeyCode) {
        self.pressed_keys.remove(&key);
    }

    pub fn on_mouse_pressed(&mut self, button: MouseButton) {
        if self.pressed_buttons.insert(button) {
            self.just_pressed_buttons.insert(button);
        }
    }

    pub fn on_mouse_released(&mut self, button: MouseButton) {
        self.pressed_buttons.remove(&button);
    }

    /// Records a cursor position. The first position produces no delta.
    pub fn on_mouse_moved(&mut self, x: f32, y: f32) {
        if let Some((old_x, old_y)) = self.mouse_position {
            self.mouse_delta.0 += x - old_x;
            self.mouse_delta.1 += y - old_y;
        }
        self.mouse_position = Some((x, y));
    }

    /// Drops all held keys and buttons, e.g. when the window loses focus.
    pub fn release_all(&mut self) {
        self.pressed_keys.clear();
        self.pressed_buttons.clear();
        self.mouse_position = None;
    }

    pub fn is_key_pressed(&self, key: KeyCode) -> bool {
        self.pressed_keys.contains(&key)
    }

    pub fn is_key_just_pressed(&self, key: KeyCode) -> bool {
        self.just_pressed_keys.contains(&key)
    }

    pub fn is_mouse_pressed(&self, button: MouseButton) -> bool {
        self.pressed_buttons.contains(&button)
    }

    pub fn is_mouse_just_pressed(&self, button: MouseButton) -> bool {
        self.just_pressed_buttons.contains(&button)
    }

    pub fn mouse_delta(&self) -> (f32, f32) {
        self.mouse_delta
    }

    /// Cursor movement while `button` is held.
    ///
    /// The frame the button goes down yields nothing, so movement made
    /// before the press does not leak into the drag.
    pub fn drag_delta(&self, button: MouseButton) -> Option<(f32, f32)> {
        (self.is_mouse_pressed(button) && !self.is_mouse_just_pressed(button))
            .then_some(self.mouse_delta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_edges() {
        let mut input = InputState::new();
        input.on_key_pressed(KeyCode::KeyR);
        assert!(input.is_key_pressed(KeyCode::KeyR));
        assert!(input.is_key_just_pressed(KeyCode::KeyR));

        input.begin_frame();
        // Key repeat does not produce a second edge.
        input.on_key_pressed(KeyCode::KeyR);
        assert!(input.is_key_pressed(KeyCode::KeyR));
        assert!(!input.is_key_just_pressed(KeyCode::KeyR));

        input.on_key_released(KeyCode::KeyR);
        assert!(!input.is_key_pressed(KeyCode::KeyR));
    }

    #[test]
    fn test_first_cursor_event_has_no_delta() {
        let mut input = InputState::new();
        input.on_mouse_moved(400.0, 300.0);
        assert_eq!(input.mouse_delta(), (0.0, 0.0));

        input.on_mouse_moved(410.0, 295.0);
        input.on_mouse_moved(415.0, 290.0);
        assert_eq!(input.mouse_delta(), (15.0, -10.0));

        input.begin_frame();
        assert_eq!(input.mouse_delta(), (0.0, 0.0));
    }

    #[test]
    fn test_drag_starts_the_frame_after_press() {
        let mut input = InputState::new();
        input.on_mouse_moved(0.0, 0.0);
        input.on_mouse_pressed(MouseButton::Left);
        input.on_mouse_moved(5.0, 5.0);
        assert_eq!(input.drag_delta(MouseButton::Left), None);

        input.begin_frame();
        input.on_mouse_moved(8.0, 4.0);
        assert_eq!(input.drag_delta(MouseButton::Left), Some((3.0, -1.0)));
        assert_eq!(input.drag_delta(MouseButton::Right), None);

        input.on_mouse_released(MouseButton::Left);
        assert_eq!(input.drag_delta(MouseButton::Left), None);
    }

    #[test]
    fn test_release_all() {
        let mut input = InputState::new();
        input.on_key_pressed(KeyCode::KeyW);
        input.on_mouse_pressed(MouseButton::Left);
        input.release_all();
        assert!(!input.is_key_pressed(KeyCode::KeyW));
        assert!(!input.is_mouse_pressed(MouseButton::Left));
    }

    #[test]
    fn test_unknown_buttons_are_ignored() {
        assert_eq!(
            MouseButton::from_winit(winit::event::MouseButton::Back),
            None
        );
        assert_eq!(
            MouseButton::from_winit(winit::event::MouseButton::Right),
            Some(MouseButton::Right)
        );
    }
}
