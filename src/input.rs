use std::collections::HashSet;

use glam::Vec2;

/// Keys the renderer's cameras and demo react to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    W,
    A,
    S,
    D,
    Q,
    E,
    X,
    Space,
    Escape,
    Digit1,
    Digit2,
    Digit3,
    Digit4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

/// What a [`Camera`](crate::Camera) polls each update.
pub trait CameraInput {
    fn key_down(&self, key: Key) -> bool;
    fn mouse_down(&self, button: MouseButton) -> bool;
    /// Cursor movement since the previous frame, in pixels.
    fn mouse_delta(&self) -> Vec2;
}

/// Tracks input state for keyboard and mouse.
///
/// The windowing layer feeds it through [`press`](Self::press),
/// [`release`](Self::release) and [`cursor_moved`](Self::cursor_moved) (or
/// `handle_event` with the `wgpu` feature) and calls
/// [`begin_frame`](Self::begin_frame) once per frame.
#[derive(Debug, Clone, Default)]
pub struct InputState {
    keys_down: HashSet<Key>,
    keys_pressed: HashSet<Key>,
    mouse_buttons_down: HashSet<MouseButton>,
    mouse_position: Option<Vec2>,
    mouse_delta: Vec2,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Call at the start of each frame to reset per-frame state.
    pub fn begin_frame(&mut self) {
        self.keys_pressed.clear();
        self.mouse_delta = Vec2::ZERO;
    }

    pub fn press(&mut self, key: Key) {
        if self.keys_down.insert(key) {
            self.keys_pressed.insert(key);
        }
    }

    pub fn release(&mut self, key: Key) {
        self.keys_down.remove(&key);
    }

    pub fn press_mouse(&mut self, button: MouseButton) {
        self.mouse_buttons_down.insert(button);
    }

    pub fn release_mouse(&mut self, button: MouseButton) {
        self.mouse_buttons_down.remove(&button);
    }

    /// Records a new cursor position. The first position only sets the origin.
    pub fn cursor_moved(&mut self, position: Vec2) {
        if let Some(previous) = self.mouse_position {
            self.mouse_delta += position - previous;
        }
        self.mouse_position = Some(position);
    }

    /// Returns true if the key went down this frame.
    pub fn key_pressed(&self, key: Key) -> bool {
        self.keys_pressed.contains(&key)
    }

    pub fn mouse_position(&self) -> Option<Vec2> {
        self.mouse_position
    }

    /// Process a window event and update input state.
    #[cfg(feature = "wgpu")]
    pub fn handle_event(&mut self, event: &winit::event::WindowEvent) {
        use winit::event::{ElementState, WindowEvent};
        use winit::keyboard::PhysicalKey;

        match event {
            WindowEvent::KeyboardInput { event, .. } => {
                let PhysicalKey::Code(code) = event.physical_key else {
                    return;
                };
                let Some(key) = key_from_code(code) else {
                    return;
                };
                match event.state {
                    ElementState::Pressed => self.press(key),
                    ElementState::Released => self.release(key),
                }
            }
            WindowEvent::MouseInput { state, button, .. } => {
                let button = match button {
                    winit::event::MouseButton::Left => MouseButton::Left,
                    winit::event::MouseButton::Right => MouseButton::Right,
                    winit::event::MouseButton::Middle => MouseButton::Middle,
                    _ => return,
                };
                match state {
                    ElementState::Pressed => self.press_mouse(button),
                    ElementState::Released => self.release_mouse(button),
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.cursor_moved(Vec2::new(position.x as f32, position.y as f32));
            }
            _ => {}
        }
    }
}

#[cfg(feature = "wgpu")]
fn key_from_code(code: winit::keyboard::KeyCode) -> Option<Key> {
    use winit::keyboard::KeyCode;

    Some(match code {
        KeyCode::KeyW => Key::W,
        KeyCode::KeyA => Key::A,
        KeyCode::KeyS => Key::S,
        KeyCode::KeyD => Key::D,
        KeyCode::KeyQ => Key::Q,
        KeyCode::KeyE => Key::E,
        KeyCode::KeyX => Key::X,
        KeyCode::Space => Key::Space,
        KeyCode::Escape => Key::Escape,
        KeyCode::Digit1 => Key::Digit1,
        KeyCode::Digit2 => Key::Digit2,
        KeyCode::Digit3 => Key::Digit3,
        KeyCode::Digit4 => Key::Digit4,
        _ => return None,
    })
}

impl CameraInput for InputState {
    fn key_down(&self, key: Key) -> bool {
        self.keys_down.contains(&key)
    }

    fn mouse_down(&self, button: MouseButton) -> bool {
        self.mouse_buttons_down.contains(&button)
    }

    fn mouse_delta(&self) -> Vec2 {
        self.mouse_delta
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pressed_only_on_transition() {
        let mut input = InputState::new();
        input.press(Key::W);
        assert!(input.key_pressed(Key::W));
        input.begin_frame();
        input.press(Key::W);
        assert!(!input.key_pressed(Key::W));
        assert!(input.key_down(Key::W));
        input.release(Key::W);
        assert!(!input.key_down(Key::W));
    }

    #[test]
    fn test_mouse_delta_accumulates_and_resets() {
        let mut input = InputState::new();
        input.cursor_moved(Vec2::new(10.0, 10.0));
        assert_eq!(input.mouse_delta(), Vec2::ZERO);
        input.cursor_moved(Vec2::new(13.0, 8.0));
        input.cursor_moved(Vec2::new(14.0, 8.0));
        assert_eq!(input.mouse_delta(), Vec2::new(4.0, -2.0));
        input.begin_frame();
        assert_eq!(input.mouse_delta(), Vec2::ZERO);
    }
}
