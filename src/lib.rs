//! # Lantern
//!
//! **A small forward renderer core: entities, lights, shadows, a sky and a
//! post-processing chain on top of one narrow GPU trait.**
//!
//! Everything that touches the graphics device goes through [`Gpu`]. The crate
//! ships two implementations: [`HeadlessGpu`], which records every command so
//! frames can be inspected in tests, and `WgpuGpu` (feature `wgpu`, on by
//! default), which drives a real window surface.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::rc::Rc;
//! use lantern::*;
//!
//! fn main() -> Result<(), RenderError> {
//!     let mut gpu = HeadlessGpu::new(1280, 720);
//!     let config = RendererConfig::default();
//!
//!     let vs = BuiltinShader::BasicVertex.create(&mut gpu)?;
//!     let ps = BuiltinShader::BasicPixel.create(&mut gpu)?;
//!     let cube = Rc::new(Mesh::cube(&mut gpu)?);
//!
//!     let mut renderer = Renderer::new(config);
//!     let shadow_vertex = BuiltinShader::ShadowVertex.create(&mut gpu)?;
//!     renderer.enable_shadows(&mut gpu, Vec3::new(1.0, -1.0, 1.0), shadow_vertex)?;
//!
//!     let mut scene = renderer.new_scene();
//!     scene
//!         .add_entity(Entity::new(cube, Material::new(vs, ps, Vec4::ONE)))
//!         .transform_mut()
//!         .set_position(Vec3::new(0.0, 0.0, 5.0));
//!     scene.add_light(Light::directional(Vec3::new(1.0, -1.0, 1.0), Vec3::ONE, 1.0));
//!
//!     let camera = Camera::new(gpu.aspect_ratio(), Vec3::ZERO, 60.0);
//!     renderer.draw_frame(&mut gpu, &scene, &camera, 0.0)?;
//!     Ok(())
//! }
//! ```
//!
//! ## Conventions
//!
//! - Left-handed coordinates: +X right, +Y up, +Z forward. Front faces wind clockwise.
//! - World matrices are translation · rotation · scale, with rotation applied
//!   as yaw, then pitch, then roll.
//! - Matrices are uploaded column-major, matching WGSL `mat4x4<f32>`.

mod camera;
mod config;
mod entity;
mod error;
mod geometry;
mod gpu;
mod headless;
mod input;
mod light;
mod material;
mod mesh;
mod post_process;
mod render_state;
mod renderer;
mod shader;
mod shaders;
mod shadow;
mod sky;
mod texture;
mod transform;
#[cfg(feature = "wgpu")]
mod wgpu_backend;

pub use camera::Camera;
pub use config::{CameraConfig, ConfigError, RendererConfig, ShadowConfig};
pub use entity::Entity;
pub use error::{GpuError, RenderError};
pub use geometry::RawGeometry;
pub use gpu::{
    AddressMode, Buffer, BufferDesc, BufferUsage, CompareFunction, CullMode, DepthStencilDesc,
    DepthStencilState, DepthStencilView, Filter, Gpu, RasterizerDesc, RasterizerState,
    RenderTargetView, ResourceHandle, ResourceId, ResourceKind, ResourceRelease, Sampler,
    SamplerDesc, ShaderModule, ShaderResourceView, ShaderStage, Texture, TextureDesc,
    TextureFormat, TextureInfo, TextureUsage, ViewDimension, Viewport,
};
pub use headless::{GpuCommand, HeadlessGpu, ResourceEvent};
pub use input::{CameraInput, InputState, Key, MouseButton};
pub use light::{Light, LightType};
pub use material::Material;
pub use mesh::{Mesh, Vertex};
pub use post_process::{PostProcess, PostProcessManager};
pub use render_state::{RestoreFlags, RestoreGuard};
pub use renderer::{MAX_SHADER_RESOURCE_SLOTS, Renderer, Scene};
pub use shader::{
    BindingKind, ConstantBufferLayout, ResourceBinding, SAMPLER_BINDING_BASE, Shader,
    ShaderLayout, ShaderSource, TEXTURE_BINDING_BASE, VariableLayout,
};
pub use shaders::{BuiltinShader, MAX_LIGHTS};
pub use shadow::ShadowManager;
pub use sky::{CubemapFaces, Sky};
pub use texture::ImageTexture;
pub use transform::Transform;
#[cfg(feature = "wgpu")]
pub use wgpu_backend::WgpuGpu;

// Re-export glam math types for convenience
pub use glam::{Mat4, Quat, Vec2, Vec3, Vec4};
