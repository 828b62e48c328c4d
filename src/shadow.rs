//! Depth-only shadow map for one directional light.
//!
//! The light is modelled as an orthographic camera placed
//! `back_off_distance` units behind the origin along the light direction,
//! covering an `extent` x `extent` square. Each frame [`ShadowManager::draw`]
//! renders every entity's depth from that camera into a square depth texture
//! that the main pass samples through a comparison sampler.
//!
//! The light matrices are computed when the manager is built (or when
//! [`ShadowManager::set_light_direction`] is called), never per frame.

use std::rc::Rc;

use glam::{Mat4, Vec3};

use crate::config::ShadowConfig;
use crate::entity::Entity;
use crate::error::GpuError;
use crate::gpu::{
    AddressMode, CompareFunction, CullMode, DepthStencilView, Filter, Gpu, RasterizerDesc,
    RasterizerState, Sampler, SamplerDesc, ShaderResourceView, ShaderStage, TextureDesc,
    TextureFormat, TextureUsage, ViewDimension, Viewport,
};
use crate::render_state::{RestoreFlags, RestoreGuard};
use crate::shader::Shader;

pub struct ShadowManager {
    vertex_shader: Rc<Shader>,
    depth_view: DepthStencilView,
    shader_view: ShaderResourceView,
    rasterizer: RasterizerState,
    sampler: Sampler,
    light_direction: Vec3,
    light_view: Mat4,
    light_projection: Mat4,
    config: ShadowConfig,
}

impl ShadowManager {
    /// Creates the shadow texture, its views, the biased rasterizer and the
    /// comparison sampler. `vertex_shader` must declare `world`, `view` and
    /// `projection`.
    pub fn new(
        gpu: &mut dyn Gpu,
        light_direction: Vec3,
        vertex_shader: Rc<Shader>,
        config: &ShadowConfig,
    ) -> Result<Self, GpuError> {
        let texture = gpu.create_texture(
            &TextureDesc {
                label: "shadow map",
                width: config.resolution,
                height: config.resolution,
                array_layers: 1,
                format: TextureFormat::Depth32Float,
                usage: TextureUsage::DEPTH_STENCIL | TextureUsage::SHADER_RESOURCE,
                cube_compatible: false,
            },
            None,
        )?;
        let depth_view = gpu.create_depth_stencil_view(&texture)?;
        let shader_view = gpu.create_shader_resource_view(&texture, ViewDimension::D2)?;

        let rasterizer = gpu.create_rasterizer_state(&RasterizerDesc {
            label: "shadow rasterizer",
            cull_mode: CullMode::Back,
            depth_bias: config.depth_bias,
            depth_bias_clamp: config.depth_bias_clamp,
            slope_scaled_depth_bias: config.slope_scaled_depth_bias,
        })?;

        let sampler = gpu.create_sampler(&SamplerDesc {
            label: "shadow sampler",
            address_mode: AddressMode::Border,
            filter: Filter::Linear,
            max_anisotropy: 1,
            comparison: Some(CompareFunction::Less),
            border_color: [1.0; 4],
        })?;

        let mut manager = Self {
            vertex_shader,
            depth_view,
            shader_view,
            rasterizer,
            sampler,
            light_direction: Vec3::ZERO,
            light_view: Mat4::IDENTITY,
            light_projection: Mat4::IDENTITY,
            config: config.clone(),
        };
        manager.set_light_direction(light_direction);
        log::debug!(
            "shadow map {}x{} for light direction {:?}",
            config.resolution,
            config.resolution,
            manager.light_direction
        );
        Ok(manager)
    }

    /// Recomputes the light matrices for a new direction.
    pub fn set_light_direction(&mut self, direction: Vec3) {
        let direction = direction.try_normalize().unwrap_or(Vec3::NEG_Y);
        // look_to needs an up vector that is not parallel to the view direction
        let up = if direction.dot(Vec3::Y).abs() > 0.999 {
            Vec3::Z
        } else {
            Vec3::Y
        };
        let eye = direction * -self.config.back_off_distance;
        let half = self.config.extent * 0.5;

        self.light_direction = direction;
        self.light_view = Mat4::look_to_lh(eye, direction, up);
        self.light_projection = Mat4::orthographic_lh(
            -half,
            half,
            -half,
            half,
            self.config.near,
            self.config.far,
        );
    }

    pub fn light_direction(&self) -> Vec3 {
        self.light_direction
    }

    pub fn light_view(&self) -> Mat4 {
        self.light_view
    }

    pub fn light_projection(&self) -> Mat4 {
        self.light_projection
    }

    pub fn shadow_srv(&self) -> &ShaderResourceView {
        &self.shader_view
    }

    pub fn shadow_dsv(&self) -> &DepthStencilView {
        &self.depth_view
    }

    pub fn shadow_sampler(&self) -> &Sampler {
        &self.sampler
    }

    pub fn resolution(&self) -> u32 {
        self.config.resolution
    }

    /// Renders the depth of `entities` from the light.
    ///
    /// Meshes are drawn directly with the depth-only vertex shader and no pixel
    /// shader; materials are ignored. Afterwards the window viewport, the back
    /// buffer with its depth buffer, and the default rasterizer are bound again.
    pub fn draw(&self, gpu: &mut dyn Gpu, entities: &[Entity]) {
        let mut gpu = RestoreGuard::new(
            gpu,
            RestoreFlags::VIEWPORT | RestoreFlags::RENDER_TARGETS | RestoreFlags::RASTERIZER,
        );

        gpu.clear_depth_stencil(&self.depth_view, 1.0);
        gpu.set_render_targets(None, Some(&self.depth_view));
        gpu.set_shader(ShaderStage::Pixel, None);
        gpu.set_viewport(Viewport::new(self.config.resolution, self.config.resolution));
        gpu.set_rasterizer_state(Some(&self.rasterizer));

        let vs = &self.vertex_shader;
        vs.set_shader(&mut *gpu);
        vs.set_matrix4x4("view", self.light_view);
        vs.set_matrix4x4("projection", self.light_projection);

        for entity in entities {
            vs.set_matrix4x4("world", entity.transform().world_matrix());
            vs.copy_all_buffer_data(&mut *gpu);
            entity.mesh().draw(&mut *gpu);
        }

        log::trace!("shadow pass drew {} entities", entities.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::HeadlessGpu;
    use crate::shader::{ConstantBufferLayout, ShaderLayout, ShaderSource};
    use glam::Vec4;

    fn manager(gpu: &mut HeadlessGpu, direction: Vec3) -> ShadowManager {
        let layout = ShaderLayout::new()
            .with_constant_buffer(
                ConstantBufferLayout::new("per_object", 0)
                    .matrix4x4("world")
                    .matrix4x4("view")
                    .matrix4x4("projection"),
            )
            .with_vertex_input();
        let vs = Shader::new(
            gpu,
            ShaderStage::Vertex,
            &ShaderSource::new("shadow vs", "", "vs_main"),
            layout,
        )
        .unwrap();
        ShadowManager::new(gpu, direction, Rc::new(vs), &ShadowConfig::default()).unwrap()
    }

    #[test]
    fn light_eye_backs_off_along_direction() {
        let mut gpu = HeadlessGpu::new(32, 32);
        let shadows = manager(&mut gpu, Vec3::new(1.0, -1.0, 0.0));
        let dir = Vec3::new(1.0, -1.0, 0.0).normalize();
        let eye = dir * -20.0;
        // The eye maps to the view-space origin, the origin sits 20 units ahead.
        assert!(shadows.light_view().transform_point3(eye).abs_diff_eq(Vec3::ZERO, 1e-4));
        let origin = shadows.light_view().transform_point3(Vec3::ZERO);
        assert!((origin.z - 20.0).abs() < 1e-4);
    }

    #[test]
    fn orthographic_volume() {
        let mut gpu = HeadlessGpu::new(32, 32);
        let shadows = manager(&mut gpu, Vec3::new(0.0, -1.0, 1.0));
        let corner = shadows.light_projection() * Vec4::new(7.5, 7.5, 100.0, 1.0);
        assert!(corner.abs_diff_eq(Vec4::new(1.0, 1.0, 1.0, 1.0), 1e-5));
        let near = shadows.light_projection() * Vec4::new(0.0, 0.0, 1.0, 1.0);
        assert!(near.z.abs() < 1e-6);
    }

    #[test]
    fn straight_down_light_has_valid_view() {
        let mut gpu = HeadlessGpu::new(32, 32);
        let shadows = manager(&mut gpu, Vec3::NEG_Y);
        assert!(!shadows.light_view().is_nan());
        assert_eq!(shadows.resolution(), 1024);
    }
}
