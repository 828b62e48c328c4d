//! Bundled WGSL programs and the layouts that describe them.
//!
//! The lit pixel stages share `lighting.wgsl`, which declares the per-frame
//! parameters, the light array and the shading helpers.

use std::rc::Rc;

use crate::error::GpuError;
use crate::gpu::{Gpu, ShaderStage};
use crate::light::Light;
use crate::shader::{BindingKind, ConstantBufferLayout, Shader, ShaderLayout, ShaderSource};

/// Capacity of the `lights` array in the lit pixel shaders.
pub const MAX_LIGHTS: u32 = 16;

const BASIC_VS: &str = include_str!("shaders/basic_vs.wgsl");
const BASIC_PS: &str = concat!(
    include_str!("shaders/lighting.wgsl"),
    include_str!("shaders/basic_ps.wgsl")
);
const NORMAL_MAP_PS: &str = concat!(
    include_str!("shaders/lighting.wgsl"),
    include_str!("shaders/normal_map_ps.wgsl")
);
const SHADOW_VS: &str = include_str!("shaders/shadow_vs.wgsl");
const SKY_VS: &str = include_str!("shaders/sky_vs.wgsl");
const SKY_PS: &str = include_str!("shaders/sky_ps.wgsl");
const FULLSCREEN_VS: &str = include_str!("shaders/fullscreen_vs.wgsl");
const BLUR_PS: &str = include_str!("shaders/blur_ps.wgsl");
const POSTERIZE_PS: &str = include_str!("shaders/posterize_ps.wgsl");
const INVERT_PS: &str = include_str!("shaders/invert_ps.wgsl");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinShader {
    /// Lit mesh vertex stage; also outputs the light-space position.
    BasicVertex,
    /// Textured, lit and shadowed surface.
    BasicPixel,
    /// [`BuiltinShader::BasicPixel`] with a tangent-space normal map.
    NormalMapPixel,
    /// Depth-only vertex stage for the shadow pass.
    ShadowVertex,
    SkyVertex,
    SkyPixel,
    /// Fullscreen triangle for post-process effects.
    FullscreenVertex,
    /// Box blur; reads `blur_radius`.
    BlurPixel,
    /// Color quantization; reads `levels`.
    PosterizePixel,
    InvertPixel,
}

impl BuiltinShader {
    pub const ALL: [BuiltinShader; 10] = [
        BuiltinShader::BasicVertex,
        BuiltinShader::BasicPixel,
        BuiltinShader::NormalMapPixel,
        BuiltinShader::ShadowVertex,
        BuiltinShader::SkyVertex,
        BuiltinShader::SkyPixel,
        BuiltinShader::FullscreenVertex,
        BuiltinShader::BlurPixel,
        BuiltinShader::PosterizePixel,
        BuiltinShader::InvertPixel,
    ];

    pub fn stage(self) -> ShaderStage {
        match self {
            BuiltinShader::BasicVertex
            | BuiltinShader::ShadowVertex
            | BuiltinShader::SkyVertex
            | BuiltinShader::FullscreenVertex => ShaderStage::Vertex,
            _ => ShaderStage::Pixel,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            BuiltinShader::BasicVertex => "basic vs",
            BuiltinShader::BasicPixel => "basic ps",
            BuiltinShader::NormalMapPixel => "normal map ps",
            BuiltinShader::ShadowVertex => "shadow vs",
            BuiltinShader::SkyVertex => "sky vs",
            BuiltinShader::SkyPixel => "sky ps",
            BuiltinShader::FullscreenVertex => "fullscreen vs",
            BuiltinShader::BlurPixel => "blur ps",
            BuiltinShader::PosterizePixel => "posterize ps",
            BuiltinShader::InvertPixel => "invert ps",
        }
    }

    pub fn source(self) -> ShaderSource {
        let code = match self {
            BuiltinShader::BasicVertex => BASIC_VS,
            BuiltinShader::BasicPixel => BASIC_PS,
            BuiltinShader::NormalMapPixel => NORMAL_MAP_PS,
            BuiltinShader::ShadowVertex => SHADOW_VS,
            BuiltinShader::SkyVertex => SKY_VS,
            BuiltinShader::SkyPixel => SKY_PS,
            BuiltinShader::FullscreenVertex => FULLSCREEN_VS,
            BuiltinShader::BlurPixel => BLUR_PS,
            BuiltinShader::PosterizePixel => POSTERIZE_PS,
            BuiltinShader::InvertPixel => INVERT_PS,
        };
        let entry_point = match self.stage() {
            ShaderStage::Vertex => "vs_main",
            ShaderStage::Pixel => "ps_main",
        };
        ShaderSource::new(self.label(), code, entry_point)
    }

    pub fn layout(self) -> ShaderLayout {
        match self {
            BuiltinShader::BasicVertex => ShaderLayout::new()
                .with_constant_buffer(
                    ConstantBufferLayout::new("per_object", 0)
                        .matrix4x4("world")
                        .matrix4x4("world_inverse_transpose")
                        .matrix4x4("view")
                        .matrix4x4("projection")
                        .matrix4x4("light_view")
                        .matrix4x4("light_projection"),
                )
                .with_vertex_input(),
            BuiltinShader::BasicPixel | BuiltinShader::NormalMapPixel => ShaderLayout::new()
                .with_constant_buffer(
                    ConstantBufferLayout::new("per_frame", 0)
                        .float4("color_tint")
                        .float3("camera_position")
                        .float("total_time")
                        .float2("uv_scale")
                        .float2("uv_offset")
                        .float3("ambient")
                        .float("roughness")
                        .int("light_count")
                        .struct_array("lights", Light::SIZE as u32, MAX_LIGHTS),
                )
                .with_resource("surface_texture", 0, BindingKind::Texture2d)
                .with_resource("normal_map", 1, BindingKind::Texture2d)
                .with_resource("shadow_map", 2, BindingKind::DepthTexture)
                .with_resource("basic_sampler", 0, BindingKind::Sampler)
                .with_resource("shadow_sampler", 1, BindingKind::ComparisonSampler),
            BuiltinShader::ShadowVertex => ShaderLayout::new()
                .with_constant_buffer(
                    ConstantBufferLayout::new("per_object", 0)
                        .matrix4x4("world")
                        .matrix4x4("view")
                        .matrix4x4("projection"),
                )
                .with_vertex_input(),
            BuiltinShader::SkyVertex => ShaderLayout::new()
                .with_constant_buffer(
                    ConstantBufferLayout::new("per_frame", 0)
                        .matrix4x4("view")
                        .matrix4x4("projection"),
                )
                .with_vertex_input(),
            BuiltinShader::SkyPixel => ShaderLayout::new()
                .with_resource("cube_map", 0, BindingKind::TextureCube)
                .with_resource("basic_sampler", 0, BindingKind::Sampler),
            BuiltinShader::FullscreenVertex => ShaderLayout::new(),
            BuiltinShader::BlurPixel => effect_layout(
                ConstantBufferLayout::new("params", 0)
                    .float2("pixel_size")
                    .int("blur_radius"),
            ),
            BuiltinShader::PosterizePixel => effect_layout(
                ConstantBufferLayout::new("params", 0)
                    .float2("pixel_size")
                    .float("levels"),
            ),
            BuiltinShader::InvertPixel => ShaderLayout::new()
                .with_resource("pixels", 0, BindingKind::Texture2d)
                .with_resource("clamp_sampler", 0, BindingKind::Sampler),
        }
    }

    pub fn create(self, gpu: &mut dyn Gpu) -> Result<Rc<Shader>, GpuError> {
        Ok(Rc::new(Shader::new(
            gpu,
            self.stage(),
            &self.source(),
            self.layout(),
        )?))
    }
}

fn effect_layout(params: ConstantBufferLayout) -> ShaderLayout {
    ShaderLayout::new()
        .with_constant_buffer(params)
        .with_resource("pixels", 0, BindingKind::Texture2d)
        .with_resource("clamp_sampler", 0, BindingKind::Sampler)
}
