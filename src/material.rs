use std::collections::BTreeMap;
use std::rc::Rc;

use glam::{Vec2, Vec4};

use crate::gpu::{Gpu, Sampler, ShaderResourceView};
use crate::shader::Shader;

/// Surface appearance: a shader pair plus the parameters and textures fed to it.
///
/// Cloning copies the slot maps; the views and samplers in them are shared
/// handles, so no GPU memory is duplicated.
#[derive(Clone)]
pub struct Material {
    vertex_shader: Rc<Shader>,
    pixel_shader: Rc<Shader>,
    color_tint: Vec4,
    roughness: f32,
    uv_scale: Vec2,
    uv_offset: Vec2,
    textures: BTreeMap<String, ShaderResourceView>,
    samplers: BTreeMap<String, Sampler>,
}

impl Material {
    pub fn new(vertex_shader: Rc<Shader>, pixel_shader: Rc<Shader>, color_tint: Vec4) -> Self {
        Self {
            vertex_shader,
            pixel_shader,
            color_tint,
            roughness: 0.5,
            uv_scale: Vec2::ONE,
            uv_offset: Vec2::ZERO,
            textures: BTreeMap::new(),
            samplers: BTreeMap::new(),
        }
    }

    pub fn with_roughness(mut self, roughness: f32) -> Self {
        self.roughness = roughness;
        self
    }

    pub fn with_uv_transform(mut self, scale: Vec2, offset: Vec2) -> Self {
        self.uv_scale = scale;
        self.uv_offset = offset;
        self
    }

    pub fn vertex_shader(&self) -> &Rc<Shader> {
        &self.vertex_shader
    }

    pub fn pixel_shader(&self) -> &Rc<Shader> {
        &self.pixel_shader
    }

    pub fn set_vertex_shader(&mut self, shader: Rc<Shader>) {
        self.vertex_shader = shader;
    }

    pub fn set_pixel_shader(&mut self, shader: Rc<Shader>) {
        self.pixel_shader = shader;
    }

    pub fn color_tint(&self) -> Vec4 {
        self.color_tint
    }

    pub fn set_color_tint(&mut self, color_tint: Vec4) {
        self.color_tint = color_tint;
    }

    pub fn roughness(&self) -> f32 {
        self.roughness
    }

    pub fn set_roughness(&mut self, roughness: f32) {
        self.roughness = roughness;
    }

    pub fn uv_scale(&self) -> Vec2 {
        self.uv_scale
    }

    pub fn set_uv_scale(&mut self, uv_scale: Vec2) {
        self.uv_scale = uv_scale;
    }

    pub fn uv_offset(&self) -> Vec2 {
        self.uv_offset
    }

    pub fn set_uv_offset(&mut self, uv_offset: Vec2) {
        self.uv_offset = uv_offset;
    }

    /// Registers a texture under a pixel shader slot name. Replaces any previous one.
    pub fn add_texture_srv(&mut self, name: impl Into<String>, view: ShaderResourceView) {
        self.textures.insert(name.into(), view);
    }

    /// Registers a sampler under a pixel shader slot name. Replaces any previous one.
    pub fn add_sampler(&mut self, name: impl Into<String>, sampler: Sampler) {
        self.samplers.insert(name.into(), sampler);
    }

    pub fn texture_srv(&self, name: &str) -> Option<&ShaderResourceView> {
        self.textures.get(name)
    }

    pub fn sampler(&self, name: &str) -> Option<&Sampler> {
        self.samplers.get(name)
    }

    /// Registered textures in name order.
    pub fn textures(&self) -> impl Iterator<Item = (&str, &ShaderResourceView)> {
        self.textures.iter().map(|(name, view)| (name.as_str(), view))
    }

    pub fn samplers(&self) -> impl Iterator<Item = (&str, &Sampler)> {
        self.samplers.iter().map(|(name, sampler)| (name.as_str(), sampler))
    }

    /// Binds every registered texture and sampler on the pixel shader. Names the
    /// shader does not declare are skipped.
    pub fn prep_for_draw(&self, gpu: &mut dyn Gpu) {
        for (name, view) in &self.textures {
            self.pixel_shader.set_shader_resource_view(gpu, name, Some(view));
        }
        for (name, sampler) in &self.samplers {
            self.pixel_shader.set_sampler_state(gpu, name, sampler);
        }
    }
}
