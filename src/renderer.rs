//! Per-frame orchestration.
//!
//! A frame runs these passes in a fixed order:
//!
//! 1. clear the back buffer and the depth buffer
//! 2. shadow depth pass (when shadows are enabled)
//! 3. redirect output into the post-process chain (when one is active)
//! 4. main pass: scene-wide lighting parameters, then every entity
//! 5. sky
//! 6. post-process chain, ending on the back buffer
//! 7. unbind pixel shader textures so render targets can be written again
//! 8. present
//! 9. rebind the back buffer and depth buffer for the next frame

use std::rc::Rc;

use glam::Vec3;

use crate::camera::Camera;
use crate::config::RendererConfig;
use crate::entity::Entity;
use crate::error::{GpuError, RenderError};
use crate::gpu::{Gpu, ShaderStage};
use crate::light::Light;
use crate::post_process::PostProcessManager;
use crate::shader::Shader;
use crate::shadow::ShadowManager;
use crate::sky::Sky;

/// Pixel shader texture slots cleared at the end of a frame.
pub const MAX_SHADER_RESOURCE_SLOTS: u32 = 16;

/// Everything drawn in a frame.
#[derive(Clone, Default)]
pub struct Scene {
    pub entities: Vec<Entity>,
    pub lights: Vec<Light>,
    pub ambient: Vec3,
}

impl Scene {
    pub fn new(ambient: Vec3) -> Self {
        Self {
            entities: Vec::new(),
            lights: Vec::new(),
            ambient,
        }
    }

    pub fn add_entity(&mut self, entity: Entity) -> &mut Entity {
        self.entities.push(entity);
        let last = self.entities.len() - 1;
        &mut self.entities[last]
    }

    pub fn add_light(&mut self, light: Light) {
        self.lights.push(light);
    }
}

pub struct Renderer {
    config: RendererConfig,
    shadows: Option<ShadowManager>,
    sky: Option<Sky>,
    post_process: Option<PostProcessManager>,
}

impl Renderer {
    pub fn new(config: RendererConfig) -> Self {
        Self {
            config,
            shadows: None,
            sky: None,
            post_process: None,
        }
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    /// Scene preset with the configured ambient color.
    pub fn new_scene(&self) -> Scene {
        Scene::new(Vec3::from_array(self.config.ambient_color))
    }

    /// Creates the shadow map for `light_direction` unless shadows are
    /// disabled in the config.
    pub fn enable_shadows(
        &mut self,
        gpu: &mut dyn Gpu,
        light_direction: Vec3,
        vertex_shader: Rc<Shader>,
    ) -> Result<(), GpuError> {
        if !self.config.shadow.enabled {
            log::debug!("shadows disabled by config");
            return Ok(());
        }
        self.shadows = Some(ShadowManager::new(
            gpu,
            light_direction,
            vertex_shader,
            &self.config.shadow,
        )?);
        Ok(())
    }

    pub fn shadows(&self) -> Option<&ShadowManager> {
        self.shadows.as_ref()
    }

    pub fn shadows_mut(&mut self) -> Option<&mut ShadowManager> {
        self.shadows.as_mut()
    }

    pub fn set_shadows(&mut self, shadows: Option<ShadowManager>) {
        self.shadows = shadows;
    }

    pub fn sky(&self) -> Option<&Sky> {
        self.sky.as_ref()
    }

    pub fn sky_mut(&mut self) -> Option<&mut Sky> {
        self.sky.as_mut()
    }

    pub fn set_sky(&mut self, sky: Option<Sky>) {
        self.sky = sky;
    }

    pub fn post_process(&self) -> Option<&PostProcessManager> {
        self.post_process.as_ref()
    }

    pub fn post_process_mut(&mut self) -> Option<&mut PostProcessManager> {
        self.post_process.as_mut()
    }

    pub fn set_post_process(&mut self, post_process: Option<PostProcessManager>) {
        self.post_process = post_process;
    }

    /// Draws and presents one frame.
    pub fn draw_frame(
        &self,
        gpu: &mut dyn Gpu,
        scene: &Scene,
        camera: &Camera,
        total_time: f32,
    ) -> Result<(), GpuError> {
        let back = gpu.back_buffer();
        let depth = gpu.depth_buffer();
        gpu.clear_render_target(&back, self.config.clear_color);
        gpu.clear_depth_stencil(&depth, 1.0);

        if let Some(shadows) = &self.shadows {
            shadows.draw(gpu, &scene.entities);
        }

        if let Some(post) = &self.post_process {
            post.pre_render(gpu, self.config.clear_color);
        }

        for entity in &scene.entities {
            self.stage_scene_parameters(gpu, entity, scene);
            entity.draw(gpu, camera, total_time);
        }

        if let Some(sky) = &self.sky {
            sky.draw(gpu, camera);
        }

        if let Some(post) = &self.post_process {
            post.post_render(gpu);
        }

        for slot in 0..MAX_SHADER_RESOURCE_SLOTS {
            gpu.set_shader_resource(ShaderStage::Pixel, slot, None);
        }

        gpu.present(self.config.vsync)?;

        gpu.set_render_targets(Some(&back), Some(&depth));
        Ok(())
    }

    fn stage_scene_parameters(&self, gpu: &mut dyn Gpu, entity: &Entity, scene: &Scene) {
        let vs = entity.material().vertex_shader();
        let ps = entity.material().pixel_shader();

        ps.set_float3("ambient", scene.ambient);
        ps.set_data("lights", bytemuck::cast_slice(&scene.lights));
        // lights beyond the array capacity were truncated by set_data
        let capacity = ps.variable_size("lights").unwrap_or(0) / Light::SIZE;
        ps.set_int("light_count", scene.lights.len().min(capacity) as i32);

        if let Some(shadows) = &self.shadows {
            vs.set_matrix4x4("light_view", shadows.light_view());
            vs.set_matrix4x4("light_projection", shadows.light_projection());
            ps.set_shader_resource_view(gpu, "shadow_map", Some(shadows.shadow_srv()));
            ps.set_sampler_state(gpu, "shadow_sampler", shadows.shadow_sampler());
        }
    }

    /// Resizes the swap chain, then updates camera projections and the
    /// post-process targets. A zero-sized (minimized) window is ignored.
    pub fn on_resize(
        &mut self,
        gpu: &mut dyn Gpu,
        width: u32,
        height: u32,
        cameras: &mut [Camera],
    ) -> Result<(), RenderError> {
        if width == 0 || height == 0 {
            log::trace!("ignoring resize to {}x{}", width, height);
            return Ok(());
        }
        gpu.resize(width, height)?;

        let aspect = gpu.aspect_ratio();
        for camera in cameras.iter_mut() {
            camera.update_projection(aspect);
        }
        if let Some(post) = &mut self.post_process {
            post.on_resize(gpu)?;
        }
        log::debug!("resized to {}x{}", width, height);
        Ok(())
    }
}
