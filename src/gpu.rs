//! The GPU seam: resource handles, descriptors and the [`Gpu`] trait.
//!
//! Everything above this module talks to the graphics device through [`Gpu`], an
//! immediate-mode interface shaped like a classic device + context + swap chain.
//! Two implementations ship with the crate:
//!
//! - [`HeadlessGpu`](crate::HeadlessGpu) records every command and resource
//!   lifetime event, which makes pass sequencing testable without a GPU.
//! - `WgpuGpu` (feature `wgpu`) translates the command stream into wgpu render
//!   passes, pipelines and bind groups.
//!
//! # Resource ownership
//!
//! Backends hand out typed handles ([`Buffer`], [`Texture`], [`RenderTargetView`],
//! ...) that wrap an opaque [`ResourceId`] in an `Rc`. Cloning a handle bumps the
//! reference count; it never duplicates GPU memory. When the last clone drops,
//! the backend is told to release the resource. Code that needs "release before
//! recreate" ordering simply drops the old handle before asking for a new one.
//!
//! # Bound state
//!
//! The context is stateful: render targets, viewport, rasterizer and
//! depth-stencil state, shaders and resource slots stay bound until something
//! else is bound. Passes that override any of them must put the defaults back
//! before returning (see [`RestoreGuard`](crate::RestoreGuard)).

use std::fmt;
use std::rc::Rc;

use crate::error::GpuError;
use crate::shader::{ShaderLayout, ShaderSource};

/// Opaque identifier of a backend resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(pub u64);

/// What a [`ResourceId`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Buffer,
    Texture,
    RenderTargetView,
    DepthStencilView,
    ShaderResourceView,
    Sampler,
    RasterizerState,
    DepthStencilState,
    ShaderModule,
}

/// Receives release notifications when the last handle to a resource drops.
pub trait ResourceRelease {
    fn release(&self, id: ResourceId, kind: ResourceKind);
}

struct HandleInner {
    id: ResourceId,
    kind: ResourceKind,
    label: String,
    releaser: Rc<dyn ResourceRelease>,
    // Views keep the viewed texture alive; released after the view itself.
    _parent: Option<ResourceHandle>,
}

impl Drop for HandleInner {
    fn drop(&mut self) {
        log::trace!("releasing {:?} {:?} '{}'", self.kind, self.id, self.label);
        self.releaser.release(self.id, self.kind);
    }
}

/// Reference-counted, untyped resource handle.
///
/// Backends construct these; the rest of the crate only sees the typed wrappers.
#[derive(Clone)]
pub struct ResourceHandle(Rc<HandleInner>);

impl ResourceHandle {
    pub fn new(
        id: ResourceId,
        kind: ResourceKind,
        label: impl Into<String>,
        releaser: Rc<dyn ResourceRelease>,
    ) -> Self {
        Self(Rc::new(HandleInner {
            id,
            kind,
            label: label.into(),
            releaser,
            _parent: None,
        }))
    }

    /// A handle that keeps `parent` alive for as long as it lives.
    pub fn with_parent(
        id: ResourceId,
        kind: ResourceKind,
        label: impl Into<String>,
        releaser: Rc<dyn ResourceRelease>,
        parent: ResourceHandle,
    ) -> Self {
        Self(Rc::new(HandleInner {
            id,
            kind,
            label: label.into(),
            releaser,
            _parent: Some(parent),
        }))
    }

    pub fn id(&self) -> ResourceId {
        self.0.id
    }

    pub fn kind(&self) -> ResourceKind {
        self.0.kind
    }

    pub fn label(&self) -> &str {
        &self.0.label
    }

    /// Number of live handles sharing this resource.
    pub fn ref_count(&self) -> usize {
        Rc::strong_count(&self.0)
    }
}

impl fmt::Debug for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({}, '{}')", self.0.kind, self.0.id.0, self.0.label)
    }
}

impl PartialEq for ResourceHandle {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for ResourceHandle {}

macro_rules! typed_handle {
    ($(#[$meta:meta])* $name:ident => $kind:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq)]
        pub struct $name(ResourceHandle);

        impl $name {
            /// Wraps a backend handle. The handle must be of the matching kind.
            pub fn from_handle(handle: ResourceHandle) -> Self {
                debug_assert_eq!(handle.kind(), ResourceKind::$kind);
                Self(handle)
            }

            pub fn id(&self) -> ResourceId {
                self.0.id()
            }

            pub fn label(&self) -> &str {
                self.0.label()
            }

            pub fn ref_count(&self) -> usize {
                self.0.ref_count()
            }

            pub fn handle(&self) -> &ResourceHandle {
                &self.0
            }
        }
    };
}

typed_handle!(
    /// A vertex, index or constant buffer.
    Buffer => Buffer
);
typed_handle!(
    /// A color target view over a texture (or the swap chain back buffer).
    RenderTargetView => RenderTargetView
);
typed_handle!(
    /// A depth target view over a depth texture.
    DepthStencilView => DepthStencilView
);
typed_handle!(
    /// A view that lets shaders sample a texture.
    ShaderResourceView => ShaderResourceView
);
typed_handle!(Sampler => Sampler);
typed_handle!(RasterizerState => RasterizerState);
typed_handle!(DepthStencilState => DepthStencilState);
typed_handle!(
    /// A compiled vertex or pixel program.
    ShaderModule => ShaderModule
);

/// A GPU texture plus the description it was created with.
#[derive(Clone, Debug, PartialEq)]
pub struct Texture {
    handle: ResourceHandle,
    info: TextureInfo,
}

impl Texture {
    pub fn from_handle(handle: ResourceHandle, info: TextureInfo) -> Self {
        debug_assert_eq!(handle.kind(), ResourceKind::Texture);
        Self { handle, info }
    }

    pub fn id(&self) -> ResourceId {
        self.handle.id()
    }

    pub fn label(&self) -> &str {
        self.handle.label()
    }

    pub fn ref_count(&self) -> usize {
        self.handle.ref_count()
    }

    pub fn handle(&self) -> &ResourceHandle {
        &self.handle
    }

    pub fn info(&self) -> &TextureInfo {
        &self.info
    }

    pub fn width(&self) -> u32 {
        self.info.width
    }

    pub fn height(&self) -> u32 {
        self.info.height
    }
}

/// What a buffer is bound as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BufferUsage {
    #[default]
    Vertex,
    Index,
    Constant,
}

#[derive(Debug, Clone, Default)]
pub struct BufferDesc<'a> {
    pub label: &'a str,
    pub usage: BufferUsage,
    pub size: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureFormat {
    #[default]
    Rgba8Unorm,
    Rgba8UnormSrgb,
    Depth32Float,
}

impl TextureFormat {
    pub fn bytes_per_pixel(self) -> u32 {
        4
    }

    pub fn is_depth(self) -> bool {
        matches!(self, TextureFormat::Depth32Float)
    }
}

bitflags::bitflags! {
    /// How a texture may be bound.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TextureUsage: u8 {
        const RENDER_TARGET = 1 << 0;
        const DEPTH_STENCIL = 1 << 1;
        const SHADER_RESOURCE = 1 << 2;
        const COPY_SRC = 1 << 3;
        const COPY_DST = 1 << 4;
    }
}

#[derive(Debug, Clone, Default)]
pub struct TextureDesc<'a> {
    pub label: &'a str,
    pub width: u32,
    pub height: u32,
    /// 1 for plain 2D textures, 6 for cubemaps.
    pub array_layers: u32,
    pub format: TextureFormat,
    pub usage: TextureUsage,
    /// Whether the array can be viewed as a cube.
    pub cube_compatible: bool,
}

impl TextureDesc<'_> {
    pub fn byte_size(&self) -> u64 {
        self.width as u64
            * self.height as u64
            * self.array_layers.max(1) as u64
            * self.format.bytes_per_pixel() as u64
    }
}

/// Creation parameters retained on every [`Texture`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureInfo {
    pub width: u32,
    pub height: u32,
    pub array_layers: u32,
    pub format: TextureFormat,
    pub usage: TextureUsage,
    pub cube_compatible: bool,
}

impl From<&TextureDesc<'_>> for TextureInfo {
    fn from(desc: &TextureDesc<'_>) -> Self {
        Self {
            width: desc.width,
            height: desc.height,
            array_layers: desc.array_layers.max(1),
            format: desc.format,
            usage: desc.usage,
            cube_compatible: desc.cube_compatible,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ViewDimension {
    #[default]
    D2,
    Cube,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AddressMode {
    #[default]
    Wrap,
    Clamp,
    Border,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Filter {
    Point,
    #[default]
    Linear,
    Anisotropic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CompareFunction {
    Never,
    #[default]
    Less,
    LessEqual,
    Equal,
    Greater,
    Always,
}

#[derive(Debug, Clone, Default)]
pub struct SamplerDesc<'a> {
    pub label: &'a str,
    pub address_mode: AddressMode,
    pub filter: Filter,
    pub max_anisotropy: u16,
    /// `Some` makes this a comparison sampler (used for shadow lookups).
    pub comparison: Option<CompareFunction>,
    pub border_color: [f32; 4],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CullMode {
    None,
    Front,
    #[default]
    Back,
}

#[derive(Debug, Clone, Default)]
pub struct RasterizerDesc<'a> {
    pub label: &'a str,
    pub cull_mode: CullMode,
    pub depth_bias: i32,
    pub depth_bias_clamp: f32,
    pub slope_scaled_depth_bias: f32,
}

#[derive(Debug, Clone)]
pub struct DepthStencilDesc<'a> {
    pub label: &'a str,
    pub depth_test: bool,
    pub depth_write: bool,
    pub compare: CompareFunction,
}

impl Default for DepthStencilDesc<'_> {
    fn default() -> Self {
        Self {
            label: "",
            depth_test: true,
            depth_write: true,
            compare: CompareFunction::Less,
        }
    }
}

/// Pipeline stage a shader, constant buffer or resource slot belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Pixel,
}

/// Rasterizer viewport in pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Viewport {
    /// Full-depth viewport anchored at the origin.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: width as f32,
            height: height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

/// Immediate-mode device, context and swap chain.
///
/// Resource creation is fallible. Binding and draw calls are not: backends log
/// and skip anything they cannot honor, so a bad binding degrades a frame
/// instead of aborting it.
pub trait Gpu {
    // --- device ---------------------------------------------------------

    fn create_buffer(&mut self, desc: &BufferDesc, contents: Option<&[u8]>)
    -> Result<Buffer, GpuError>;

    /// Creates a texture. `contents` holds tightly packed rows for every array layer.
    fn create_texture(
        &mut self,
        desc: &TextureDesc,
        contents: Option<&[u8]>,
    ) -> Result<Texture, GpuError>;

    fn create_render_target_view(&mut self, texture: &Texture)
    -> Result<RenderTargetView, GpuError>;

    fn create_depth_stencil_view(&mut self, texture: &Texture)
    -> Result<DepthStencilView, GpuError>;

    fn create_shader_resource_view(
        &mut self,
        texture: &Texture,
        dimension: ViewDimension,
    ) -> Result<ShaderResourceView, GpuError>;

    fn create_sampler(&mut self, desc: &SamplerDesc) -> Result<Sampler, GpuError>;

    fn create_rasterizer_state(&mut self, desc: &RasterizerDesc)
    -> Result<RasterizerState, GpuError>;

    fn create_depth_stencil_state(
        &mut self,
        desc: &DepthStencilDesc,
    ) -> Result<DepthStencilState, GpuError>;

    fn create_shader_module(
        &mut self,
        stage: ShaderStage,
        source: &ShaderSource,
        layout: &ShaderLayout,
    ) -> Result<ShaderModule, GpuError>;

    // --- context --------------------------------------------------------

    fn clear_render_target(&mut self, target: &RenderTargetView, color: [f32; 4]);

    fn clear_depth_stencil(&mut self, target: &DepthStencilView, depth: f32);

    /// Binds the output targets. `None` color means depth-only rendering.
    fn set_render_targets(
        &mut self,
        color: Option<&RenderTargetView>,
        depth: Option<&DepthStencilView>,
    );

    fn set_viewport(&mut self, viewport: Viewport);

    /// `None` restores the default rasterizer (solid, back-face culling, no bias).
    fn set_rasterizer_state(&mut self, state: Option<&RasterizerState>);

    /// `None` restores the default depth state (test + write, less-than).
    fn set_depth_stencil_state(&mut self, state: Option<&DepthStencilState>);

    /// `None` unbinds the stage. With no pixel shader only depth is written.
    fn set_shader(&mut self, stage: ShaderStage, shader: Option<&ShaderModule>);

    fn set_constant_buffer(&mut self, stage: ShaderStage, slot: u32, buffer: &Buffer);

    /// Replaces the contents of a constant buffer (discard semantics).
    fn update_buffer(&mut self, buffer: &Buffer, data: &[u8]);

    fn set_shader_resource(
        &mut self,
        stage: ShaderStage,
        slot: u32,
        view: Option<&ShaderResourceView>,
    );

    fn set_sampler(&mut self, stage: ShaderStage, slot: u32, sampler: Option<&Sampler>);

    fn set_vertex_buffer(&mut self, buffer: &Buffer, stride: u32);

    fn set_index_buffer(&mut self, buffer: &Buffer);

    /// Draws indexed triangles from the bound vertex and index buffers.
    fn draw_indexed(&mut self, index_count: u32, first_index: u32, base_vertex: i32);

    /// Draws non-indexed triangles (the fullscreen triangle uses no vertex buffer).
    fn draw(&mut self, vertex_count: u32, first_vertex: u32);

    /// Copies the first layer of `source` into one array slice of `destination`.
    fn copy_texture_to_array_slice(
        &mut self,
        source: &Texture,
        destination: &Texture,
        array_slice: u32,
    );

    // --- swap chain -----------------------------------------------------

    fn back_buffer(&self) -> RenderTargetView;

    fn depth_buffer(&self) -> DepthStencilView;

    fn width(&self) -> u32;

    fn height(&self) -> u32;

    fn aspect_ratio(&self) -> f32 {
        self.width() as f32 / self.height().max(1) as f32
    }

    /// Viewport covering the whole window.
    fn window_viewport(&self) -> Viewport {
        Viewport::new(self.width(), self.height())
    }

    /// Presents the back buffer. Without vsync tearing is allowed.
    fn present(&mut self, vsync: bool) -> Result<(), GpuError>;

    /// Recreates the back and depth buffers at a new size and binds them with
    /// a full-window viewport.
    fn resize(&mut self, width: u32, height: u32) -> Result<(), GpuError>;
}
