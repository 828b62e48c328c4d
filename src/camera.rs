use std::f32::consts::FRAC_PI_2;

use glam::{Mat4, Vec3};

use crate::config::CameraConfig;
use crate::input::{CameraInput, Key, MouseButton};
use crate::transform::Transform;

/// A free-look perspective camera.
///
/// Owns a [`Transform`] plus cached view and projection matrices. The view is
/// rebuilt by [`update_view`](Self::update_view) (called from
/// [`update`](Self::update)); the projection by
/// [`update_projection`](Self::update_projection) when the window resizes.
///
/// Both matrices are left-handed with a 0..1 depth range.
#[derive(Clone, Debug)]
pub struct Camera {
    transform: Transform,
    view: Mat4,
    projection: Mat4,
    aspect_ratio: f32,
    fov_degrees: f32,
    near: f32,
    far: f32,
    move_speed: f32,
    look_speed: f32,
}

impl Camera {
    /// Creates a camera with default clip planes and speeds.
    pub fn new(aspect_ratio: f32, position: Vec3, fov_degrees: f32) -> Self {
        let config = CameraConfig {
            fov_degrees,
            ..CameraConfig::default()
        };
        Self::with_config(aspect_ratio, position, &config)
    }

    pub fn with_config(aspect_ratio: f32, position: Vec3, config: &CameraConfig) -> Self {
        let mut camera = Self {
            transform: Transform::from_position(position),
            view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
            aspect_ratio,
            fov_degrees: config.fov_degrees,
            near: config.near,
            far: config.far,
            move_speed: config.move_speed,
            look_speed: config.look_speed,
        };
        camera.update_view();
        camera.update_projection(aspect_ratio);
        camera
    }

    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    /// Call [`update_view`](Self::update_view) after moving the camera this way.
    pub fn transform_mut(&mut self) -> &mut Transform {
        &mut self.transform
    }

    pub fn position(&self) -> Vec3 {
        self.transform.position()
    }

    pub fn view(&self) -> Mat4 {
        self.view
    }

    pub fn projection(&self) -> Mat4 {
        self.projection
    }

    pub fn fov_degrees(&self) -> f32 {
        self.fov_degrees
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.aspect_ratio
    }

    /// Changes the field of view, keeping the current aspect ratio.
    pub fn set_fov_degrees(&mut self, fov_degrees: f32) {
        self.fov_degrees = fov_degrees;
        self.update_projection(self.aspect_ratio);
    }

    pub fn update_projection(&mut self, aspect_ratio: f32) {
        self.aspect_ratio = aspect_ratio;
        self.projection = Mat4::perspective_lh(
            self.fov_degrees.to_radians(),
            aspect_ratio,
            self.near,
            self.far,
        );
    }

    pub fn update_view(&mut self) {
        self.view = Mat4::look_to_lh(
            self.transform.position(),
            self.transform.forward(),
            self.transform.up(),
        );
    }

    /// Applies one frame of keyboard movement and mouse look, then rebuilds the view.
    ///
    /// W/S move along the camera's forward axis, A/D along its right axis, and
    /// Space/X straight up and down in world space. Mouse look only applies
    /// while the left button is held; a pitch change that would pass straight
    /// up or down is dropped.
    pub fn update(&mut self, dt: f32, input: &dyn CameraInput) {
        let speed = self.move_speed * dt;

        if input.key_down(Key::W) {
            self.transform.move_relative(Vec3::new(0.0, 0.0, speed));
        }
        if input.key_down(Key::S) {
            self.transform.move_relative(Vec3::new(0.0, 0.0, -speed));
        }
        if input.key_down(Key::A) {
            self.transform.move_relative(Vec3::new(-speed, 0.0, 0.0));
        }
        if input.key_down(Key::D) {
            self.transform.move_relative(Vec3::new(speed, 0.0, 0.0));
        }
        if input.key_down(Key::Space) {
            self.transform.move_absolute(Vec3::new(0.0, speed, 0.0));
        }
        if input.key_down(Key::X) {
            self.transform.move_absolute(Vec3::new(0.0, -speed, 0.0));
        }

        if input.mouse_down(MouseButton::Left) {
            let delta = input.mouse_delta() * self.look_speed;
            let mut pitch = delta.y;
            if (self.transform.rotation().x + pitch).abs() > FRAC_PI_2 {
                pitch = 0.0;
            }
            self.transform.rotate(Vec3::new(pitch, delta.x, 0.0));
        }

        self.update_view();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::InputState;
    use glam::{Vec2, Vec4};

    #[test]
    fn test_view_moves_eye_to_origin() {
        let camera = Camera::new(16.0 / 9.0, Vec3::new(1.0, 2.0, -5.0), 60.0);
        let eye = camera.view().transform_point3(Vec3::new(1.0, 2.0, -5.0));
        assert!(eye.abs_diff_eq(Vec3::ZERO, 1e-5));
        // Something in front of the camera lands on +Z in view space.
        let ahead = camera.view().transform_point3(Vec3::new(1.0, 2.0, 0.0));
        assert!(ahead.z > 0.0);
    }

    #[test]
    fn test_projection_depth_range() {
        let camera = Camera::new(1.0, Vec3::ZERO, 60.0);
        let near = camera.projection() * Vec4::new(0.0, 0.0, 0.01, 1.0);
        let far = camera.projection() * Vec4::new(0.0, 0.0, 900.0, 1.0);
        assert!((near.z / near.w).abs() < 1e-4);
        assert!((far.z / far.w - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_forward_key_moves_along_forward() {
        let mut camera = Camera::new(1.0, Vec3::ZERO, 60.0);
        let mut input = InputState::new();
        input.press(Key::W);
        camera.update(2.0, &input);
        assert!(camera.position().abs_diff_eq(Vec3::new(0.0, 0.0, 2.0), 1e-6));
    }

    #[test]
    fn test_vertical_keys_are_absolute() {
        let mut camera = Camera::new(1.0, Vec3::ZERO, 60.0);
        camera.transform_mut().set_rotation(Vec3::new(0.5, 0.0, 0.0));
        let mut input = InputState::new();
        input.press(Key::Space);
        camera.update(1.0, &input);
        assert!(camera.position().abs_diff_eq(Vec3::Y, 1e-6));
    }

    #[test]
    fn test_mouse_look_requires_left_button() {
        let mut camera = Camera::new(1.0, Vec3::ZERO, 60.0);
        let mut input = InputState::new();
        input.cursor_moved(Vec2::ZERO);
        input.cursor_moved(Vec2::new(100.0, 40.0));
        camera.update(0.016, &input);
        assert_eq!(camera.transform().rotation(), Vec3::ZERO);

        input.press_mouse(MouseButton::Left);
        camera.update(0.016, &input);
        let rotation = camera.transform().rotation();
        assert!((rotation.x - 40.0 * 0.0025).abs() < 1e-6);
        assert!((rotation.y - 100.0 * 0.0025).abs() < 1e-6);
    }

    #[test]
    fn test_pitch_clamp_drops_pitch_only() {
        let mut camera = Camera::new(1.0, Vec3::ZERO, 60.0);
        camera.transform_mut().set_rotation(Vec3::new(1.5, 0.0, 0.0));
        let mut input = InputState::new();
        input.press_mouse(MouseButton::Left);
        input.cursor_moved(Vec2::ZERO);
        input.cursor_moved(Vec2::new(20.0, 100.0));
        camera.update(0.016, &input);

        let rotation = camera.transform().rotation();
        assert_eq!(rotation.x, 1.5);
        assert!((rotation.y - 20.0 * 0.0025).abs() < 1e-6);
    }

    #[test]
    fn test_update_projection_changes_aspect() {
        let mut camera = Camera::new(1.0, Vec3::ZERO, 90.0);
        let square = camera.projection();
        camera.update_projection(2.0);
        assert_ne!(square, camera.projection());
        assert_eq!(camera.aspect_ratio(), 2.0);
    }
}
