//! Position, Euler rotation and scale with a lazily cached world matrix.
//!
//! A [`Transform`] stores its components separately and derives two matrices
//! from them on demand:
//!
//! - the **world matrix**, composed Scale → Rotate → Translate
//! - the **world inverse-transpose**, used to carry normals into world space
//!   under non-uniform scale
//!
//! Both are cached. Every mutator marks the cache dirty; the next matrix getter
//! recomputes both and clears the flag. Getters take `&self`, so an entity can be
//! drawn through a shared reference while still benefiting from the cache.
//!
//! # Rotation convention
//!
//! `rotation` holds Euler angles in radians with `x = pitch`, `y = yaw` and
//! `z = roll`. They compose roll first (about Z), then pitch (about X), then yaw
//! (about Y). Pitching straight up or down collapses yaw and roll onto the same
//! axis (gimbal lock); callers that need free orientation should clamp pitch, as
//! [`Camera`](crate::Camera) does.
//!
//! # Example
//!
//! ```
//! use lantern::Transform;
//! use glam::Vec3;
//!
//! let mut transform = Transform::new();
//! transform.set_position(Vec3::new(0.0, 2.0, -5.0));
//! transform.scale_by(Vec3::splat(2.0));
//!
//! let world = transform.world_matrix();
//! assert_eq!(world.transform_point3(Vec3::ZERO), Vec3::new(0.0, 2.0, -5.0));
//! ```

use std::cell::Cell;

use glam::{EulerRot, Mat4, Quat, Vec3};

#[derive(Clone, Debug)]
pub struct Transform {
    position: Vec3,
    rotation: Vec3,
    scale: Vec3,
    world: Cell<Mat4>,
    world_inverse_transpose: Cell<Mat4>,
    dirty: Cell<bool>,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            scale: Vec3::ONE,
            world: Cell::new(Mat4::IDENTITY),
            world_inverse_transpose: Cell::new(Mat4::IDENTITY),
            dirty: Cell::new(false),
        }
    }
}

impl Transform {
    /// Identity transform: origin, no rotation, unit scale. Starts clean.
    pub fn new() -> Self {
        Self::default()
    }

    /// Identity transform moved to `position`.
    pub fn from_position(position: Vec3) -> Self {
        let mut transform = Self::new();
        transform.set_position(position);
        transform
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    /// Euler angles in radians (pitch, yaw, roll).
    pub fn rotation(&self) -> Vec3 {
        self.rotation
    }

    pub fn scale(&self) -> Vec3 {
        self.scale
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
        self.dirty.set(true);
    }

    pub fn set_rotation(&mut self, pitch_yaw_roll: Vec3) {
        self.rotation = pitch_yaw_roll;
        self.dirty.set(true);
    }

    pub fn set_scale(&mut self, scale: Vec3) {
        self.scale = scale;
        self.dirty.set(true);
    }

    /// Moves along the world axes.
    pub fn move_absolute(&mut self, offset: Vec3) {
        self.position += offset;
        self.dirty.set(true);
    }

    /// Moves along the transform's own axes: the offset is rotated by the
    /// current orientation first.
    ///
    /// ```
    /// use lantern::Transform;
    /// use glam::Vec3;
    ///
    /// let mut t = Transform::new();
    /// t.set_rotation(Vec3::new(0.0, std::f32::consts::FRAC_PI_2, 0.0));
    /// t.move_relative(Vec3::Z);
    /// assert!(t.position().abs_diff_eq(Vec3::X, 1e-5));
    /// ```
    pub fn move_relative(&mut self, offset: Vec3) {
        self.position += self.orientation() * offset;
        self.dirty.set(true);
    }

    /// Adds Euler deltas (pitch, yaw, roll) to the rotation.
    pub fn rotate(&mut self, pitch_yaw_roll: Vec3) {
        self.rotation += pitch_yaw_roll;
        self.dirty.set(true);
    }

    /// Multiplies the scale component-wise.
    pub fn scale_by(&mut self, factors: Vec3) {
        self.scale *= factors;
        self.dirty.set(true);
    }

    /// The rotation as a quaternion.
    pub fn orientation(&self) -> Quat {
        Quat::from_euler(EulerRot::YXZ, self.rotation.y, self.rotation.x, self.rotation.z)
    }

    pub fn up(&self) -> Vec3 {
        self.orientation() * Vec3::Y
    }

    pub fn right(&self) -> Vec3 {
        self.orientation() * Vec3::X
    }

    pub fn forward(&self) -> Vec3 {
        self.orientation() * Vec3::Z
    }

    /// Scale → Rotate → Translate, recomputed only when stale.
    pub fn world_matrix(&self) -> Mat4 {
        self.refresh();
        self.world.get()
    }

    /// `inverse(transpose(world))`, recomputed only when stale.
    pub fn world_inverse_transpose_matrix(&self) -> Mat4 {
        self.refresh();
        self.world_inverse_transpose.get()
    }

    /// True when a component changed since the matrices were last derived.
    pub fn is_dirty(&self) -> bool {
        self.dirty.get()
    }

    fn refresh(&self) {
        if !self.dirty.get() {
            return;
        }
        let world = Mat4::from_translation(self.position)
            * Mat4::from_quat(self.orientation())
            * Mat4::from_scale(self.scale);
        self.world.set(world);
        self.world_inverse_transpose.set(world.transpose().inverse());
        self.dirty.set(false);
    }
}
