//! Fullscreen post-processing chain.
//!
//! When at least one effect is active the main pass renders into the first
//! effect's offscreen target instead of the back buffer. [`PostProcessManager::post_render`]
//! then runs every active effect as a fullscreen triangle, each one sampling
//! the previous target and writing into the next, with the last one writing
//! to the back buffer.
//!
//! Effect pixel shaders see:
//! - `pixels`: the previous pass output
//! - `clamp_sampler`: clamp-addressed linear sampler
//! - `pixel_size` (optional `vec2<f32>`): one over the target resolution

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use glam::Vec2;

use crate::error::{GpuError, RenderError};
use crate::gpu::{
    AddressMode, Filter, Gpu, RenderTargetView, Sampler, SamplerDesc, ShaderResourceView,
    Texture, TextureDesc, TextureFormat, TextureUsage, ViewDimension,
};
use crate::shader::Shader;

/// Color target an effect reads its input from.
struct OffscreenTarget {
    texture: Texture,
    render_target: RenderTargetView,
    shader_resource: ShaderResourceView,
}

impl OffscreenTarget {
    fn new(gpu: &mut dyn Gpu, label: &str) -> Result<Self, GpuError> {
        let texture = gpu.create_texture(
            &TextureDesc {
                label,
                width: gpu.width(),
                height: gpu.height(),
                array_layers: 1,
                format: TextureFormat::Rgba8Unorm,
                usage: TextureUsage::RENDER_TARGET | TextureUsage::SHADER_RESOURCE,
                cube_compatible: false,
            },
            None,
        )?;
        let render_target = gpu.create_render_target_view(&texture)?;
        let shader_resource = gpu.create_shader_resource_view(&texture, ViewDimension::D2)?;
        Ok(Self {
            texture,
            render_target,
            shader_resource,
        })
    }
}

/// One effect: a pixel shader plus the offscreen target holding its input.
pub struct PostProcess {
    pixel_shader: Rc<Shader>,
    target: Option<OffscreenTarget>,
}

impl PostProcess {
    /// The target is created once the effect is added to a manager.
    pub fn new(pixel_shader: Rc<Shader>) -> Self {
        Self {
            pixel_shader,
            target: None,
        }
    }

    pub fn pixel_shader(&self) -> &Rc<Shader> {
        &self.pixel_shader
    }

    pub fn render_target(&self) -> Option<&RenderTargetView> {
        self.target.as_ref().map(|t| &t.render_target)
    }

    pub fn shader_resource(&self) -> Option<&ShaderResourceView> {
        self.target.as_ref().map(|t| &t.shader_resource)
    }

    /// Size of the offscreen target, if it exists.
    pub fn target_size(&self) -> Option<(u32, u32)> {
        self.target
            .as_ref()
            .map(|t| (t.texture.width(), t.texture.height()))
    }

    fn ensure_target(&mut self, gpu: &mut dyn Gpu, name: &str) -> Result<(), GpuError> {
        if self.target.is_none() {
            self.target = Some(OffscreenTarget::new(gpu, &format!("post-process {}", name))?);
        }
        Ok(())
    }

    /// Clears the target and makes it the output of the main pass.
    fn pre_render(&self, gpu: &mut dyn Gpu, clear_color: [f32; 4]) {
        let Some(target) = &self.target else {
            log::warn!("post-process effect has no target");
            return;
        };
        gpu.clear_render_target(&target.render_target, clear_color);
        let depth = gpu.depth_buffer();
        gpu.set_render_targets(Some(&target.render_target), Some(&depth));
    }
}

pub struct PostProcessManager {
    vertex_shader: Rc<Shader>,
    sampler: Sampler,
    effects: HashMap<String, PostProcess>,
    chain: Vec<String>,
}

impl PostProcessManager {
    /// `vertex_shader` must generate a fullscreen triangle from the vertex
    /// index alone.
    pub fn new(gpu: &mut dyn Gpu, vertex_shader: Rc<Shader>) -> Result<Self, GpuError> {
        let sampler = gpu.create_sampler(&SamplerDesc {
            label: "post-process clamp sampler",
            address_mode: AddressMode::Clamp,
            filter: Filter::Linear,
            max_anisotropy: 1,
            comparison: None,
            border_color: [0.0; 4],
        })?;
        Ok(Self {
            vertex_shader,
            sampler,
            effects: HashMap::new(),
            chain: Vec::new(),
        })
    }

    /// Registers an effect under `name`, creating its target at the current
    /// swap chain size. An existing effect with that name is replaced.
    pub fn add_effect(
        &mut self,
        gpu: &mut dyn Gpu,
        name: impl Into<String>,
        mut effect: PostProcess,
    ) -> Result<(), GpuError> {
        let name = name.into();
        effect.ensure_target(gpu, &name)?;
        log::debug!("added post-process effect '{}'", name);
        self.effects.insert(name, effect);
        Ok(())
    }

    /// Unregisters an effect and drops it from the active chain.
    pub fn remove_effect(&mut self, name: &str) -> Option<PostProcess> {
        self.chain.retain(|n| n != name);
        self.effects.remove(name)
    }

    pub fn clear_effects(&mut self) {
        self.chain.clear();
        self.effects.clear();
    }

    pub fn effect(&self, name: &str) -> Option<&PostProcess> {
        self.effects.get(name)
    }

    pub fn effect_names(&self) -> impl Iterator<Item = &str> {
        self.effects.keys().map(String::as_str)
    }

    /// Activates a single effect, or none.
    pub fn set_active(&mut self, name: Option<&str>) -> Result<(), RenderError> {
        match name {
            Some(name) => self.set_chain(&[name]),
            None => {
                self.chain.clear();
                Ok(())
            }
        }
    }

    /// Activates several effects, applied in the given order. Each effect may
    /// appear once. On an unknown or repeated name the active chain is left
    /// unchanged.
    pub fn set_chain(&mut self, names: &[&str]) -> Result<(), RenderError> {
        if let Some(missing) = names.iter().find(|n| !self.effects.contains_key(**n)) {
            return Err(RenderError::UnknownEffect(missing.to_string()));
        }
        let mut seen = HashSet::new();
        if let Some(repeated) = names.iter().find(|n| !seen.insert(**n)) {
            return Err(RenderError::DuplicateEffect(repeated.to_string()));
        }
        self.chain = names.iter().map(|n| n.to_string()).collect();
        Ok(())
    }

    /// First active effect.
    pub fn active(&self) -> Option<&str> {
        self.chain.first().map(String::as_str)
    }

    pub fn chain(&self) -> &[String] {
        &self.chain
    }

    pub fn is_enabled(&self) -> bool {
        !self.chain.is_empty()
    }

    fn chain_effects(&self) -> impl Iterator<Item = &PostProcess> {
        self.chain.iter().filter_map(|name| self.effects.get(name))
    }

    /// Redirects the main pass into the first active effect's target.
    pub fn pre_render(&self, gpu: &mut dyn Gpu, clear_color: [f32; 4]) {
        if let Some(first) = self.chain_effects().next() {
            first.pre_render(gpu, clear_color);
        }
    }

    /// Runs the active chain, ending on the back buffer. The back buffer is
    /// left bound without depth; the caller rebinds depth for the next frame.
    pub fn post_render(&self, gpu: &mut dyn Gpu) {
        let effects: Vec<&PostProcess> = self.chain_effects().collect();
        if effects.is_empty() {
            return;
        }

        let pixel_size = Vec2::new(1.0 / gpu.width().max(1) as f32, 1.0 / gpu.height().max(1) as f32);
        for (i, effect) in effects.iter().enumerate() {
            let Some(input) = effect.shader_resource() else {
                log::warn!("skipping post-process effect without a target");
                continue;
            };

            match effects.get(i + 1).and_then(|next| next.render_target()) {
                Some(next) => gpu.set_render_targets(Some(next), None),
                None => {
                    let back = gpu.back_buffer();
                    gpu.set_render_targets(Some(&back), None);
                }
            }

            let ps = &effect.pixel_shader;
            self.vertex_shader.set_shader(gpu);
            ps.set_shader(gpu);
            ps.set_shader_resource_view(gpu, "pixels", Some(input));
            ps.set_sampler_state(gpu, "clamp_sampler", &self.sampler);
            ps.set_float2("pixel_size", pixel_size);
            ps.copy_all_buffer_data(gpu);

            gpu.draw(3, 0);

            // the input may be a render target again next frame
            ps.set_shader_resource_view(gpu, "pixels", None);
        }
    }

    /// Recreates every effect target at the current swap chain size. All old
    /// targets are released before any new one is created.
    pub fn on_resize(&mut self, gpu: &mut dyn Gpu) -> Result<(), GpuError> {
        for effect in self.effects.values_mut() {
            effect.target = None;
        }
        for (name, effect) in self.effects.iter_mut() {
            effect.ensure_target(gpu, name)?;
        }
        log::debug!(
            "resized {} post-process targets to {}x{}",
            self.effects.len(),
            gpu.width(),
            gpu.height()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::ShaderStage;
    use crate::headless::{GpuCommand, HeadlessGpu};
    use crate::shader::{BindingKind, ConstantBufferLayout, ShaderLayout, ShaderSource};

    fn shader(gpu: &mut HeadlessGpu, stage: ShaderStage, layout: ShaderLayout) -> Rc<Shader> {
        Rc::new(Shader::new(gpu, stage, &ShaderSource::new("pp", "", "main"), layout).unwrap())
    }

    fn manager(gpu: &mut HeadlessGpu) -> PostProcessManager {
        let vs = shader(gpu, ShaderStage::Vertex, ShaderLayout::new());
        PostProcessManager::new(gpu, vs).unwrap()
    }

    fn effect(gpu: &mut HeadlessGpu) -> PostProcess {
        let layout = ShaderLayout::new()
            .with_constant_buffer(ConstantBufferLayout::new("params", 0).float2("pixel_size"))
            .with_resource("pixels", 0, BindingKind::Texture2d)
            .with_resource("clamp_sampler", 0, BindingKind::Sampler);
        PostProcess::new(shader(gpu, ShaderStage::Pixel, layout))
    }

    #[test]
    fn unknown_effect_rejected() {
        let mut gpu = HeadlessGpu::new(64, 32);
        let mut pp = manager(&mut gpu);
        let blur = effect(&mut gpu);
        pp.add_effect(&mut gpu, "blur", blur).unwrap();
        pp.set_active(Some("blur")).unwrap();
        assert!(matches!(
            pp.set_active(Some("sepia")),
            Err(RenderError::UnknownEffect(name)) if name == "sepia"
        ));
        assert_eq!(pp.active(), Some("blur"));
    }

    #[test]
    fn repeated_effect_rejected() {
        let mut gpu = HeadlessGpu::new(64, 32);
        let mut pp = manager(&mut gpu);
        let blur = effect(&mut gpu);
        pp.add_effect(&mut gpu, "blur", blur).unwrap();
        pp.set_active(Some("blur")).unwrap();
        assert!(matches!(
            pp.set_chain(&["blur", "blur"]),
            Err(RenderError::DuplicateEffect(name)) if name == "blur"
        ));
        assert_eq!(pp.chain(), ["blur".to_string()]);
    }

    #[test]
    fn targets_match_swap_chain() {
        let mut gpu = HeadlessGpu::new(64, 32);
        let mut pp = manager(&mut gpu);
        let blur = effect(&mut gpu);
        pp.add_effect(&mut gpu, "blur", blur).unwrap();
        assert_eq!(pp.effect("blur").unwrap().target_size(), Some((64, 32)));
    }

    #[test]
    fn single_effect_draws_into_back_buffer() {
        let mut gpu = HeadlessGpu::new(64, 32);
        let mut pp = manager(&mut gpu);
        let blur = effect(&mut gpu);
        pp.add_effect(&mut gpu, "blur", blur).unwrap();
        pp.set_active(Some("blur")).unwrap();
        gpu.clear_commands();

        pp.post_render(&mut gpu);
        let back = gpu.back_buffer().id();
        let commands = gpu.take_commands();
        assert!(commands.contains(&GpuCommand::SetRenderTargets {
            color: Some(back),
            depth: None,
        }));
        assert_eq!(commands.iter().filter(|c| c.is_draw()).count(), 1);
        assert_eq!(gpu.bound_shader_resource(ShaderStage::Pixel, 0), None);
    }

    #[test]
    fn removing_an_effect_drops_it_from_the_chain() {
        let mut gpu = HeadlessGpu::new(64, 32);
        let mut pp = manager(&mut gpu);
        let (a, b) = (effect(&mut gpu), effect(&mut gpu));
        pp.add_effect(&mut gpu, "a", a).unwrap();
        pp.add_effect(&mut gpu, "b", b).unwrap();
        pp.set_chain(&["a", "b"]).unwrap();
        pp.remove_effect("a");
        assert_eq!(pp.chain(), ["b".to_string()]);
    }
}
