use std::f32::consts::PI;

use approx::assert_relative_eq;
use lantern::{Mat4, Quat, Transform, Vec3};

/// Small deterministic generator so failures reproduce.
struct Lcg(u64);

impl Lcg {
    fn next_f32(&mut self) -> f32 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (self.0 >> 40) as f32 / (1u64 << 24) as f32
    }

    fn range(&mut self, min: f32, max: f32) -> f32 {
        min + (max - min) * self.next_f32()
    }

    fn vec3(&mut self, min: f32, max: f32) -> Vec3 {
        Vec3::new(self.range(min, max), self.range(min, max), self.range(min, max))
    }
}

fn expected_world(position: Vec3, rotation: Vec3, scale: Vec3) -> Mat4 {
    let q = Quat::from_euler(glam::EulerRot::YXZ, rotation.y, rotation.x, rotation.z);
    Mat4::from_translation(position) * Mat4::from_quat(q) * Mat4::from_scale(scale)
}

fn assert_matrix_eq(actual: Mat4, expected: Mat4) {
    for (a, e) in actual.to_cols_array().iter().zip(expected.to_cols_array()) {
        assert_relative_eq!(*a, e, epsilon = 1e-3, max_relative = 1e-3);
    }
}

#[test]
fn inverse_transpose_matches_for_random_transforms() {
    let mut rng = Lcg(0x5eed);
    for i in 0..24 {
        let position = rng.vec3(-50.0, 50.0);
        let rotation = rng.vec3(-PI, PI);
        // Every fourth case uses a near-degenerate scale.
        let scale = if i % 4 == 0 {
            Vec3::new(0.001, rng.range(0.5, 2.0), rng.range(0.5, 2.0))
        } else {
            rng.vec3(0.1, 5.0)
        };

        let mut transform = Transform::new();
        transform.set_position(position);
        transform.set_rotation(rotation);
        transform.set_scale(scale);

        let world = expected_world(position, rotation, scale);
        assert_matrix_eq(transform.world_matrix(), world);
        assert_matrix_eq(
            transform.world_inverse_transpose_matrix(),
            world.inverse().transpose(),
        );
    }
}

#[test]
fn setter_sequences_use_final_values() {
    let mut rng = Lcg(42);
    let mut transform = Transform::new();
    for _ in 0..10 {
        transform.set_position(rng.vec3(-10.0, 10.0));
        transform.set_rotation(rng.vec3(-PI, PI));
        transform.set_scale(rng.vec3(0.5, 2.0));
        // Reading in between must not pin stale values.
        let _ = transform.world_matrix();
    }
    transform.move_absolute(Vec3::new(1.0, 2.0, 3.0));
    transform.rotate(Vec3::new(0.1, 0.2, 0.3));
    transform.scale_by(Vec3::splat(2.0));

    let expected = expected_world(transform.position(), transform.rotation(), transform.scale());
    assert_matrix_eq(transform.world_matrix(), expected);
    assert!(!transform.is_dirty());
}

#[test]
fn inverse_transpose_keeps_normals_perpendicular() {
    let mut transform = Transform::new();
    transform.set_rotation(Vec3::new(0.3, 1.1, -0.4));
    transform.set_scale(Vec3::new(4.0, 0.25, 1.0));

    // A surface spanned by X and Z has normal Y.
    let world = transform.world_matrix();
    let tangent = world.transform_vector3(Vec3::X);
    let bitangent = world.transform_vector3(Vec3::Z);
    let normal = transform
        .world_inverse_transpose_matrix()
        .transform_vector3(Vec3::Y);

    assert_relative_eq!(normal.dot(tangent), 0.0, epsilon = 1e-4);
    assert_relative_eq!(normal.dot(bitangent), 0.0, epsilon = 1e-4);
}
