use glam::Vec3;

/// Light kinds as stored in [`Light::light_type`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum LightType {
    Directional = 0,
    Point = 1,
    Spot = 2,
}

/// A light in the exact layout the pixel shader reads: four 16-byte rows,
/// copied byte-for-byte into the `lights` array.
///
/// | Offset | Field                            |
/// |--------|----------------------------------|
/// | 0      | `light_type`, `direction`        |
/// | 16     | `range`, `position`              |
/// | 32     | `intensity`, `color`             |
/// | 48     | `spot_inner_angle`, `spot_outer_angle`, padding |
///
/// In WGSL each row is a `vec4<f32>`; the type is recovered with `bitcast<i32>`.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Light {
    pub light_type: i32,
    pub direction: [f32; 3],
    /// Attenuation distance for point and spot lights.
    pub range: f32,
    pub position: [f32; 3],
    pub intensity: f32,
    pub color: [f32; 3],
    /// Radians; full brightness inside this cone.
    pub spot_inner_angle: f32,
    /// Radians; no light outside this cone.
    pub spot_outer_angle: f32,
    pub padding: [f32; 2],
}

impl Light {
    pub const SIZE: usize = std::mem::size_of::<Light>();

    pub fn directional(direction: Vec3, color: Vec3, intensity: f32) -> Self {
        Self {
            light_type: LightType::Directional as i32,
            direction: direction.normalize_or_zero().into(),
            color: color.into(),
            intensity,
            ..Default::default()
        }
    }

    pub fn point(position: Vec3, range: f32, color: Vec3, intensity: f32) -> Self {
        Self {
            light_type: LightType::Point as i32,
            position: position.into(),
            range,
            color: color.into(),
            intensity,
            ..Default::default()
        }
    }

    pub fn spot(
        position: Vec3,
        direction: Vec3,
        range: f32,
        inner_angle: f32,
        outer_angle: f32,
        color: Vec3,
        intensity: f32,
    ) -> Self {
        Self {
            light_type: LightType::Spot as i32,
            position: position.into(),
            direction: direction.normalize_or_zero().into(),
            range,
            spot_inner_angle: inner_angle,
            spot_outer_angle: outer_angle,
            color: color.into(),
            intensity,
            ..Default::default()
        }
    }

    /// `None` for a type value outside the known kinds.
    pub fn kind(&self) -> Option<LightType> {
        match self.light_type {
            0 => Some(LightType::Directional),
            1 => Some(LightType::Point),
            2 => Some(LightType::Spot),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::offset_of;

    #[test]
    fn light_is_64_bytes() {
        assert_eq!(Light::SIZE, 64);
    }

    #[test]
    fn light_field_offsets() {
        assert_eq!(offset_of!(Light, light_type), 0);
        assert_eq!(offset_of!(Light, direction), 4);
        assert_eq!(offset_of!(Light, range), 16);
        assert_eq!(offset_of!(Light, position), 20);
        assert_eq!(offset_of!(Light, intensity), 32);
        assert_eq!(offset_of!(Light, color), 36);
        assert_eq!(offset_of!(Light, spot_inner_angle), 48);
        assert_eq!(offset_of!(Light, spot_outer_angle), 52);
        assert_eq!(offset_of!(Light, padding), 56);
    }

    #[test]
    fn type_values() {
        assert_eq!(Light::directional(Vec3::X, Vec3::ONE, 1.0).light_type, 0);
        assert_eq!(Light::point(Vec3::ZERO, 5.0, Vec3::ONE, 1.0).light_type, 1);
        let spot = Light::spot(Vec3::ZERO, Vec3::NEG_Y, 5.0, 0.2, 0.4, Vec3::ONE, 1.0);
        assert_eq!(spot.kind(), Some(LightType::Spot));
    }

    #[test]
    fn bytes_are_the_struct() {
        let light = Light::point(Vec3::new(1.0, 2.0, 3.0), 10.0, Vec3::ONE, 0.5);
        let bytes = bytemuck::bytes_of(&light);
        assert_eq!(&bytes[0..4], &1i32.to_ne_bytes());
        assert_eq!(&bytes[20..24], &1.0f32.to_ne_bytes());
        assert_eq!(&bytes[16..20], &10.0f32.to_ne_bytes());
    }
}
