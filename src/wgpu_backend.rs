//! wgpu implementation of [`Gpu`].
//!
//! The immediate-mode command stream is translated lazily:
//!
//! - A render pass is opened on the first draw after the render targets
//!   change, and ended by anything that needs the encoder (clears, copies,
//!   target changes, present).
//! - Clears are standalone passes with a clear load op.
//! - Pipelines are built on demand from the bound shaders, target formats,
//!   rasterizer and depth-stencil state, and cached.
//! - Bind groups are built per draw: group 0 from the vertex shader's
//!   declared slots, group 1 from the pixel shader's. Unbound texture and
//!   sampler slots fall back to 1x1 defaults.
//! - Constant buffer updates replace the underlying wgpu buffer, so every
//!   draw in a frame sees the contents that were current when it was issued.
//!
//! The swap chain back buffer is acquired on first use in a frame and
//! presented by [`Gpu::present`].

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use wgpu::util::DeviceExt;
use winit::window::Window;

use crate::error::GpuError;
use crate::gpu::{
    AddressMode, Buffer, BufferDesc, BufferUsage, CompareFunction, CullMode, DepthStencilDesc,
    DepthStencilState, DepthStencilView, Filter, Gpu, RasterizerDesc, RasterizerState,
    RenderTargetView, ResourceHandle, ResourceId, ResourceKind, ResourceRelease, Sampler,
    SamplerDesc, ShaderModule, ShaderResourceView, ShaderStage, Texture, TextureDesc,
    TextureFormat, TextureInfo, TextureUsage, ViewDimension, Viewport,
};
use crate::mesh::Vertex;
use crate::shader::{
    BindingKind, SAMPLER_BINDING_BASE, ShaderLayout, ShaderSource, TEXTURE_BINDING_BASE,
};

struct BufferEntry {
    buffer: wgpu::Buffer,
    usage: wgpu::BufferUsages,
}

struct ViewEntry {
    view: wgpu::TextureView,
    format: wgpu::TextureFormat,
}

struct ShaderEntry {
    module: wgpu::ShaderModule,
    entry_point: String,
    layout: ShaderLayout,
    bind_group_layout: wgpu::BindGroupLayout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct RasterKey {
    cull_mode: CullMode,
    depth_bias: i32,
    slope_scaled_depth_bias: u32,
    depth_bias_clamp: u32,
}

impl Default for RasterKey {
    fn default() -> Self {
        Self::from(&RasterizerDesc::default())
    }
}

impl From<&RasterizerDesc<'_>> for RasterKey {
    fn from(desc: &RasterizerDesc<'_>) -> Self {
        Self {
            cull_mode: desc.cull_mode,
            depth_bias: desc.depth_bias,
            slope_scaled_depth_bias: desc.slope_scaled_depth_bias.to_bits(),
            depth_bias_clamp: desc.depth_bias_clamp.to_bits(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct DepthKey {
    test: bool,
    write: bool,
    compare: CompareFunction,
}

impl Default for DepthKey {
    fn default() -> Self {
        Self::from(&DepthStencilDesc::default())
    }
}

impl From<&DepthStencilDesc<'_>> for DepthKey {
    fn from(desc: &DepthStencilDesc<'_>) -> Self {
        Self {
            test: desc.depth_test,
            write: desc.depth_write,
            compare: desc.compare,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PipelineKey {
    vertex_shader: ResourceId,
    pixel_shader: Option<ResourceId>,
    color_format: Option<wgpu::TextureFormat>,
    depth_format: Option<wgpu::TextureFormat>,
    raster: RasterKey,
    depth: DepthKey,
}

/// Every live backend object, keyed by the id its handle carries.
#[derive(Default)]
struct Resources {
    buffers: HashMap<ResourceId, BufferEntry>,
    textures: HashMap<ResourceId, wgpu::Texture>,
    views: HashMap<ResourceId, ViewEntry>,
    samplers: HashMap<ResourceId, wgpu::Sampler>,
    rasterizers: HashMap<ResourceId, RasterKey>,
    depth_states: HashMap<ResourceId, DepthKey>,
    shaders: HashMap<ResourceId, ShaderEntry>,
    /// `None` caches a pipeline that failed validation.
    pipelines: HashMap<PipelineKey, Option<wgpu::RenderPipeline>>,
}

struct Releaser(Rc<RefCell<Resources>>);

impl ResourceRelease for Releaser {
    fn release(&self, id: ResourceId, kind: ResourceKind) {
        let mut res = self.0.borrow_mut();
        match kind {
            ResourceKind::Buffer => {
                res.buffers.remove(&id);
            }
            ResourceKind::Texture => {
                res.textures.remove(&id);
            }
            ResourceKind::RenderTargetView
            | ResourceKind::DepthStencilView
            | ResourceKind::ShaderResourceView => {
                res.views.remove(&id);
            }
            ResourceKind::Sampler => {
                res.samplers.remove(&id);
            }
            ResourceKind::RasterizerState => {
                res.rasterizers.remove(&id);
            }
            ResourceKind::DepthStencilState => {
                res.depth_states.remove(&id);
            }
            ResourceKind::ShaderModule => {
                res.shaders.remove(&id);
                res.pipelines
                    .retain(|key, _| key.vertex_shader != id && key.pixel_shader != Some(id));
            }
        }
    }
}

/// Issues ids and handles for objects stored in [`Resources`].
struct Allocator {
    resources: Rc<RefCell<Resources>>,
    releaser: Rc<dyn ResourceRelease>,
    next_id: u64,
}

impl Allocator {
    fn new() -> Self {
        let resources = Rc::new(RefCell::new(Resources::default()));
        let releaser: Rc<dyn ResourceRelease> = Rc::new(Releaser(resources.clone()));
        Self {
            resources,
            releaser,
            next_id: 1,
        }
    }

    fn next(&mut self) -> ResourceId {
        let id = ResourceId(self.next_id);
        self.next_id += 1;
        id
    }

    fn handle(&mut self, kind: ResourceKind, label: &str) -> ResourceHandle {
        let id = self.next();
        ResourceHandle::new(id, kind, label, self.releaser.clone())
    }

    fn view_handle(&mut self, kind: ResourceKind, label: &str, parent: &Texture) -> ResourceHandle {
        let id = self.next();
        ResourceHandle::with_parent(id, kind, label, self.releaser.clone(), parent.handle().clone())
    }

    fn depth_buffer(
        &mut self,
        device: &wgpu::Device,
        width: u32,
        height: u32,
    ) -> DepthStencilView {
        let desc = TextureDesc {
            label: "depth buffer",
            width,
            height,
            array_layers: 1,
            format: TextureFormat::Depth32Float,
            usage: TextureUsage::DEPTH_STENCIL,
            cube_compatible: false,
        };
        let texture = device.create_texture(&texture_descriptor(&desc, wgpu::TextureUsages::empty()));
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let handle = self.handle(ResourceKind::Texture, desc.label);
        let texture_handle = Texture::from_handle(handle, TextureInfo::from(&desc));
        let dsv = self.view_handle(ResourceKind::DepthStencilView, "depth buffer view", &texture_handle);

        let mut res = self.resources.borrow_mut();
        res.textures.insert(texture_handle.id(), texture);
        res.views.insert(
            dsv.id(),
            ViewEntry {
                view,
                format: wgpu::TextureFormat::Depth32Float,
            },
        );
        DepthStencilView::from_handle(dsv)
    }
}

#[derive(Default)]
struct BoundState {
    render_target: Option<ResourceId>,
    depth_stencil: Option<ResourceId>,
    viewport: Option<Viewport>,
    rasterizer: Option<ResourceId>,
    depth_state: Option<ResourceId>,
    vertex_shader: Option<ResourceId>,
    pixel_shader: Option<ResourceId>,
    constant_buffers: HashMap<(ShaderStage, u32), ResourceId>,
    shader_resources: HashMap<(ShaderStage, u32), ResourceId>,
    samplers: HashMap<(ShaderStage, u32), ResourceId>,
    vertex_buffer: Option<ResourceId>,
    index_buffer: Option<ResourceId>,
}

/// Bound in place of texture and sampler slots nothing was bound to.
struct Fallbacks {
    white: wgpu::TextureView,
    white_cube: wgpu::TextureView,
    depth: wgpu::TextureView,
    sampler: wgpu::Sampler,
    comparison_sampler: wgpu::Sampler,
}

impl Fallbacks {
    fn new(device: &wgpu::Device, queue: &wgpu::Queue) -> Self {
        let white_desc = |label, layers| wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: layers,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        };
        let white = device
            .create_texture_with_data(
                queue,
                &white_desc("fallback white", 1),
                wgpu::util::TextureDataOrder::LayerMajor,
                &[255; 4],
            )
            .create_view(&wgpu::TextureViewDescriptor::default());
        let white_cube = device
            .create_texture_with_data(
                queue,
                &white_desc("fallback white cube", 6),
                wgpu::util::TextureDataOrder::LayerMajor,
                &[255; 24],
            )
            .create_view(&wgpu::TextureViewDescriptor {
                dimension: Some(wgpu::TextureViewDimension::Cube),
                ..Default::default()
            });

        // Depth textures cannot be written from the CPU; clear it to the far plane instead.
        let depth_texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("fallback depth"),
            size: wgpu::Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Depth32Float,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let depth = depth_texture.create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("fallback depth clear"),
        });
        encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("fallback depth clear"),
            color_attachments: &[],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &depth,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        queue.submit(std::iter::once(encoder.finish()));

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("fallback sampler"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        let comparison_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("fallback comparison sampler"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            compare: Some(wgpu::CompareFunction::LessEqual),
            ..Default::default()
        });

        Self {
            white,
            white_cube,
            depth,
            sampler,
            comparison_sampler,
        }
    }
}

/// Windowed wgpu backend.
pub struct WgpuGpu {
    // Declared before `encoder`: an open pass must end before its encoder drops.
    pass: Option<wgpu::RenderPass<'static>>,
    encoder: Option<wgpu::CommandEncoder>,
    frame: Option<wgpu::SurfaceTexture>,
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    present_modes: Vec<wgpu::PresentMode>,
    clamp_to_border: bool,
    alloc: Allocator,
    back_buffer: RenderTargetView,
    depth_buffer: DepthStencilView,
    state: BoundState,
    fallbacks: Fallbacks,
}

impl WgpuGpu {
    /// Creates the device and configures the window surface.
    pub fn new(window: Arc<Window>) -> Result<Self, GpuError> {
        let size = window.inner_size();

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let surface = instance
            .create_surface(window)
            .map_err(|e| GpuError::Surface(e.to_string()))?;

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::default(),
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .map_err(|e| GpuError::Surface(format!("no suitable adapter: {}", e)))?;

        let optional = wgpu::Features::ADDRESS_MODE_CLAMP_TO_BORDER;
        let required_features = adapter.features() & optional;

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("Lantern Device"),
            required_features,
            required_limits: wgpu::Limits::default(),
            memory_hints: Default::default(),
            trace: Default::default(),
            experimental_features: Default::default(),
        }))
        .map_err(|e| GpuError::Surface(format!("device creation failed: {}", e)))?;

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .copied()
            .or_else(|| surface_caps.formats.first().copied())
            .ok_or_else(|| GpuError::Surface("surface reports no formats".into()))?;
        let alpha_mode = surface_caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let mut alloc = Allocator::new();
        let back_buffer =
            RenderTargetView::from_handle(alloc.handle(ResourceKind::RenderTargetView, "back buffer"));
        let depth_buffer = alloc.depth_buffer(&device, config.width, config.height);
        let fallbacks = Fallbacks::new(&device, &queue);

        let mut state = BoundState::default();
        state.render_target = Some(back_buffer.id());
        state.depth_stencil = Some(depth_buffer.id());
        state.viewport = Some(Viewport::new(config.width, config.height));

        log::debug!(
            "wgpu backend ready: {:?} {}x{} ({:?})",
            adapter.get_info().backend,
            config.width,
            config.height,
            surface_format
        );

        Ok(Self {
            pass: None,
            encoder: None,
            frame: None,
            surface,
            device,
            queue,
            config,
            present_modes: surface_caps.present_modes,
            clamp_to_border: required_features.contains(optional),
            alloc,
            back_buffer,
            depth_buffer,
            state,
            fallbacks,
        })
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.config.format
    }

    fn end_pass(&mut self) {
        self.pass = None;
    }

    fn ensure_encoder(&mut self) {
        if self.encoder.is_none() {
            self.encoder = Some(
                self.device
                    .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                        label: Some("Lantern Frame"),
                    }),
            );
        }
    }

    /// Acquires the surface texture for this frame and registers its view
    /// under the back buffer id.
    fn ensure_frame(&mut self) -> bool {
        if self.frame.is_some() {
            return true;
        }
        let frame = match self.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(wgpu::SurfaceError::Outdated | wgpu::SurfaceError::Lost) => {
                self.surface.configure(&self.device, &self.config);
                match self.surface.get_current_texture() {
                    Ok(frame) => frame,
                    Err(e) => {
                        log::error!("failed to acquire surface texture: {}", e);
                        return false;
                    }
                }
            }
            Err(e) => {
                log::error!("failed to acquire surface texture: {}", e);
                return false;
            }
        };
        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        self.alloc.resources.borrow_mut().views.insert(
            self.back_buffer.id(),
            ViewEntry {
                view,
                format: self.config.format,
            },
        );
        self.frame = Some(frame);
        true
    }

    fn needs_frame(&self, target: Option<ResourceId>) -> bool {
        target == Some(self.back_buffer.id())
    }

    fn ensure_pass(&mut self) -> bool {
        if self.pass.is_some() {
            return true;
        }
        if self.needs_frame(self.state.render_target) && !self.ensure_frame() {
            return false;
        }
        self.ensure_encoder();

        let res = self.alloc.resources.borrow();
        let color = self.state.render_target.and_then(|id| res.views.get(&id));
        let depth = self.state.depth_stencil.and_then(|id| res.views.get(&id));
        if color.is_none() && depth.is_none() {
            log::warn!("draw with no render target bound");
            return false;
        }
        let Some(encoder) = self.encoder.as_mut() else {
            return false;
        };

        let color_attachments: Vec<_> = color
            .map(|c| wgpu::RenderPassColorAttachment {
                view: &c.view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })
            .into_iter()
            .map(Some)
            .collect();
        let pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Lantern Pass"),
            color_attachments: &color_attachments,
            depth_stencil_attachment: depth.map(|d| wgpu::RenderPassDepthStencilAttachment {
                view: &d.view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        drop(res);
        self.pass = Some(pass.forget_lifetime());
        true
    }

    fn pipeline_key(&self) -> Option<PipelineKey> {
        let vertex_shader = self.state.vertex_shader?;
        let res = self.alloc.resources.borrow();
        let format = |id: Option<ResourceId>| id.and_then(|id| res.views.get(&id)).map(|v| v.format);
        Some(PipelineKey {
            vertex_shader,
            pixel_shader: self.state.pixel_shader,
            color_format: format(self.state.render_target),
            depth_format: format(self.state.depth_stencil),
            raster: self
                .state
                .rasterizer
                .and_then(|id| res.rasterizers.get(&id).copied())
                .unwrap_or_default(),
            depth: self
                .state
                .depth_state
                .and_then(|id| res.depth_states.get(&id).copied())
                .unwrap_or_default(),
        })
    }

    fn ensure_pipeline(&mut self, key: &PipelineKey) -> bool {
        let mut res = self.alloc.resources.borrow_mut();
        if !res.pipelines.contains_key(key) {
            let pipeline = match build_pipeline(&self.device, &res, key) {
                Ok(pipeline) => Some(pipeline),
                Err(reason) => {
                    log::error!("pipeline creation failed: {}", reason);
                    None
                }
            };
            res.pipelines.insert(key.clone(), pipeline);
        }
        matches!(res.pipelines.get(key), Some(Some(_)))
    }

    fn bind_group(
        &self,
        res: &Resources,
        stage: ShaderStage,
        shader: &ShaderEntry,
    ) -> Option<wgpu::BindGroup> {
        let mut entries = Vec::new();
        for cb in &shader.layout.constant_buffers {
            let Some(buffer) = self
                .state
                .constant_buffers
                .get(&(stage, cb.slot))
                .and_then(|id| res.buffers.get(id))
            else {
                log::warn!("{:?} constant buffer '{}' is not bound", stage, cb.name);
                return None;
            };
            entries.push(wgpu::BindGroupEntry {
                binding: cb.slot,
                resource: buffer.buffer.as_entire_binding(),
            });
        }
        for binding in &shader.layout.resources {
            let resource = if binding.kind.is_sampler() {
                let sampler = self
                    .state
                    .samplers
                    .get(&(stage, binding.slot))
                    .and_then(|id| res.samplers.get(id))
                    .unwrap_or(match binding.kind {
                        BindingKind::ComparisonSampler => &self.fallbacks.comparison_sampler,
                        _ => &self.fallbacks.sampler,
                    });
                (SAMPLER_BINDING_BASE + binding.slot, wgpu::BindingResource::Sampler(sampler))
            } else {
                let view = self
                    .state
                    .shader_resources
                    .get(&(stage, binding.slot))
                    .and_then(|id| res.views.get(id))
                    .map(|v| &v.view)
                    .unwrap_or(match binding.kind {
                        BindingKind::TextureCube => &self.fallbacks.white_cube,
                        BindingKind::DepthTexture => &self.fallbacks.depth,
                        _ => &self.fallbacks.white,
                    });
                (TEXTURE_BINDING_BASE + binding.slot, wgpu::BindingResource::TextureView(view))
            };
            entries.push(wgpu::BindGroupEntry {
                binding: resource.0,
                resource: resource.1,
            });
        }
        Some(self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Lantern Bind Group"),
            layout: &shader.bind_group_layout,
            entries: &entries,
        }))
    }

    /// Opens a pass if needed and sets pipeline, bind groups and viewport.
    /// Returns `false` when the draw must be skipped.
    fn prepare_draw(&mut self) -> bool {
        let Some(key) = self.pipeline_key() else {
            log::warn!("draw without a vertex shader");
            return false;
        };
        if key.color_format.is_some() && key.pixel_shader.is_none() {
            log::warn!("draw into a color target without a pixel shader");
            return false;
        }
        if !self.ensure_pipeline(&key) || !self.ensure_pass() {
            return false;
        }

        let res = self.alloc.resources.borrow();
        let mut groups = Vec::with_capacity(2);
        let stages = [
            (ShaderStage::Vertex, Some(key.vertex_shader)),
            (ShaderStage::Pixel, key.pixel_shader.filter(|_| key.color_format.is_some())),
        ];
        for (stage, shader) in stages {
            let Some(shader) = shader.and_then(|id| res.shaders.get(&id)) else {
                continue;
            };
            match self.bind_group(&res, stage, shader) {
                Some(group) => groups.push(group),
                None => return false,
            }
        }

        let viewport = self
            .state
            .viewport
            .unwrap_or_else(|| Viewport::new(self.config.width, self.config.height));
        let (Some(pass), Some(Some(pipeline))) = (self.pass.as_mut(), res.pipelines.get(&key)) else {
            return false;
        };
        pass.set_pipeline(pipeline);
        for (index, group) in groups.iter().enumerate() {
            pass.set_bind_group(index as u32, group, &[]);
        }
        pass.set_viewport(
            viewport.x,
            viewport.y,
            viewport.width,
            viewport.height,
            viewport.min_depth,
            viewport.max_depth,
        );
        true
    }
}

impl Gpu for WgpuGpu {
    fn create_buffer(
        &mut self,
        desc: &BufferDesc,
        contents: Option<&[u8]>,
    ) -> Result<Buffer, GpuError> {
        let size = contents.map_or(desc.size, |c| desc.size.max(c.len() as u64));
        if size == 0 {
            return Err(GpuError::InvalidDescriptor {
                label: desc.label.to_string(),
                reason: "buffer size is zero".into(),
            });
        }
        let usage = buffer_usage(desc.usage);
        let mut data = contents.map(<[u8]>::to_vec).unwrap_or_default();
        data.resize(size as usize, 0);
        let buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(desc.label),
                contents: &data,
                usage,
            });

        let handle = self.alloc.handle(ResourceKind::Buffer, desc.label);
        self.alloc
            .resources
            .borrow_mut()
            .buffers
            .insert(handle.id(), BufferEntry { buffer, usage });
        Ok(Buffer::from_handle(handle))
    }

    fn create_texture(
        &mut self,
        desc: &TextureDesc,
        contents: Option<&[u8]>,
    ) -> Result<Texture, GpuError> {
        if desc.width == 0 || desc.height == 0 {
            return Err(GpuError::InvalidDescriptor {
                label: desc.label.to_string(),
                reason: format!("texture size {}x{}", desc.width, desc.height),
            });
        }
        if desc.cube_compatible && desc.array_layers != 6 {
            return Err(GpuError::InvalidDescriptor {
                label: desc.label.to_string(),
                reason: format!("cube texture with {} layers", desc.array_layers),
            });
        }

        let texture = match contents {
            Some(data) => {
                if (data.len() as u64) < desc.byte_size() {
                    return Err(GpuError::InvalidDescriptor {
                        label: desc.label.to_string(),
                        reason: format!("{} bytes for a {} byte texture", data.len(), desc.byte_size()),
                    });
                }
                self.device.create_texture_with_data(
                    &self.queue,
                    &texture_descriptor(desc, wgpu::TextureUsages::COPY_DST),
                    wgpu::util::TextureDataOrder::LayerMajor,
                    &data[..desc.byte_size() as usize],
                )
            }
            None => self
                .device
                .create_texture(&texture_descriptor(desc, wgpu::TextureUsages::empty())),
        };

        let handle = self.alloc.handle(ResourceKind::Texture, desc.label);
        self.alloc
            .resources
            .borrow_mut()
            .textures
            .insert(handle.id(), texture);
        Ok(Texture::from_handle(handle, TextureInfo::from(desc)))
    }

    fn create_render_target_view(
        &mut self,
        texture: &Texture,
    ) -> Result<RenderTargetView, GpuError> {
        if !texture.info().usage.contains(TextureUsage::RENDER_TARGET) {
            return Err(GpuError::InvalidDescriptor {
                label: texture.label().to_string(),
                reason: "render target view of a texture without RENDER_TARGET usage".into(),
            });
        }
        let handle = self.create_view(ResourceKind::RenderTargetView, texture, |_| {
            wgpu::TextureViewDescriptor {
                dimension: Some(wgpu::TextureViewDimension::D2),
                array_layer_count: Some(1),
                ..Default::default()
            }
        })?;
        Ok(RenderTargetView::from_handle(handle))
    }

    fn create_depth_stencil_view(
        &mut self,
        texture: &Texture,
    ) -> Result<DepthStencilView, GpuError> {
        if !texture.info().format.is_depth() {
            return Err(GpuError::InvalidDescriptor {
                label: texture.label().to_string(),
                reason: "depth view of a color texture".into(),
            });
        }
        let handle = self.create_view(ResourceKind::DepthStencilView, texture, |_| {
            wgpu::TextureViewDescriptor {
                dimension: Some(wgpu::TextureViewDimension::D2),
                array_layer_count: Some(1),
                ..Default::default()
            }
        })?;
        Ok(DepthStencilView::from_handle(handle))
    }

    fn create_shader_resource_view(
        &mut self,
        texture: &Texture,
        dimension: ViewDimension,
    ) -> Result<ShaderResourceView, GpuError> {
        if dimension == ViewDimension::Cube && !texture.info().cube_compatible {
            return Err(GpuError::InvalidDescriptor {
                label: texture.label().to_string(),
                reason: "cube view of a texture that is not cube compatible".into(),
            });
        }
        let handle = self.create_view(ResourceKind::ShaderResourceView, texture, |info| {
            let aspect = if info.format.is_depth() {
                wgpu::TextureAspect::DepthOnly
            } else {
                wgpu::TextureAspect::All
            };
            match dimension {
                ViewDimension::D2 => wgpu::TextureViewDescriptor {
                    dimension: Some(wgpu::TextureViewDimension::D2),
                    array_layer_count: Some(1),
                    aspect,
                    ..Default::default()
                },
                ViewDimension::Cube => wgpu::TextureViewDescriptor {
                    dimension: Some(wgpu::TextureViewDimension::Cube),
                    array_layer_count: Some(6),
                    aspect,
                    ..Default::default()
                },
            }
        })?;
        Ok(ShaderResourceView::from_handle(handle))
    }

    fn create_sampler(&mut self, desc: &SamplerDesc) -> Result<Sampler, GpuError> {
        let border = desc.address_mode == AddressMode::Border && self.clamp_to_border;
        let address = match desc.address_mode {
            AddressMode::Wrap => wgpu::AddressMode::Repeat,
            AddressMode::Clamp => wgpu::AddressMode::ClampToEdge,
            AddressMode::Border if border => wgpu::AddressMode::ClampToBorder,
            AddressMode::Border => {
                log::debug!("clamp-to-border unsupported, '{}' clamps to edge", desc.label);
                wgpu::AddressMode::ClampToEdge
            }
        };
        let filter = match desc.filter {
            Filter::Point => wgpu::FilterMode::Nearest,
            Filter::Linear | Filter::Anisotropic => wgpu::FilterMode::Linear,
        };
        let anisotropy_clamp = match desc.filter {
            Filter::Anisotropic => desc.max_anisotropy.clamp(1, 16),
            _ => 1,
        };
        let border_color = border.then(|| {
            if desc.border_color[0] >= 0.5 {
                wgpu::SamplerBorderColor::OpaqueWhite
            } else {
                wgpu::SamplerBorderColor::TransparentBlack
            }
        });

        let sampler = self.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some(desc.label),
            address_mode_u: address,
            address_mode_v: address,
            address_mode_w: address,
            mag_filter: filter,
            min_filter: filter,
            mipmap_filter: filter,
            compare: desc.comparison.map(compare_function),
            anisotropy_clamp,
            border_color,
            ..Default::default()
        });

        let handle = self.alloc.handle(ResourceKind::Sampler, desc.label);
        self.alloc
            .resources
            .borrow_mut()
            .samplers
            .insert(handle.id(), sampler);
        Ok(Sampler::from_handle(handle))
    }

    fn create_rasterizer_state(
        &mut self,
        desc: &RasterizerDesc,
    ) -> Result<RasterizerState, GpuError> {
        let handle = self.alloc.handle(ResourceKind::RasterizerState, desc.label);
        self.alloc
            .resources
            .borrow_mut()
            .rasterizers
            .insert(handle.id(), RasterKey::from(desc));
        Ok(RasterizerState::from_handle(handle))
    }

    fn create_depth_stencil_state(
        &mut self,
        desc: &DepthStencilDesc,
    ) -> Result<DepthStencilState, GpuError> {
        let handle = self.alloc.handle(ResourceKind::DepthStencilState, desc.label);
        self.alloc
            .resources
            .borrow_mut()
            .depth_states
            .insert(handle.id(), DepthKey::from(desc));
        Ok(DepthStencilState::from_handle(handle))
    }

    fn create_shader_module(
        &mut self,
        stage: ShaderStage,
        source: &ShaderSource,
        layout: &ShaderLayout,
    ) -> Result<ShaderModule, GpuError> {
        if source.entry_point.is_empty() {
            return Err(GpuError::ShaderCompilation {
                label: source.label.clone(),
                reason: "empty entry point".into(),
            });
        }

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(&source.label),
                source: wgpu::ShaderSource::Wgsl(source.code.as_str().into()),
            });
        let bind_group_layout = self
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(&source.label),
                entries: &bind_group_layout_entries(stage, layout),
            });
        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(GpuError::ShaderCompilation {
                label: source.label.clone(),
                reason: error.to_string(),
            });
        }

        let handle = self.alloc.handle(ResourceKind::ShaderModule, &source.label);
        self.alloc.resources.borrow_mut().shaders.insert(
            handle.id(),
            ShaderEntry {
                module,
                entry_point: source.entry_point.clone(),
                layout: layout.clone(),
                bind_group_layout,
            },
        );
        Ok(ShaderModule::from_handle(handle))
    }

    fn clear_render_target(&mut self, target: &RenderTargetView, color: [f32; 4]) {
        self.end_pass();
        if self.needs_frame(Some(target.id())) && !self.ensure_frame() {
            return;
        }
        self.ensure_encoder();
        let res = self.alloc.resources.borrow();
        let (Some(entry), Some(encoder)) = (res.views.get(&target.id()), self.encoder.as_mut()) else {
            log::error!("clear of unknown render target '{}'", target.label());
            return;
        };
        let [r, g, b, a] = color.map(f64::from);
        encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Lantern Clear"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &entry.view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color { r, g, b, a }),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
    }

    fn clear_depth_stencil(&mut self, target: &DepthStencilView, depth: f32) {
        self.end_pass();
        self.ensure_encoder();
        let res = self.alloc.resources.borrow();
        let (Some(entry), Some(encoder)) = (res.views.get(&target.id()), self.encoder.as_mut()) else {
            log::error!("clear of unknown depth target '{}'", target.label());
            return;
        };
        encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Lantern Depth Clear"),
            color_attachments: &[],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &entry.view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(depth),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });
    }

    fn set_render_targets(
        &mut self,
        color: Option<&RenderTargetView>,
        depth: Option<&DepthStencilView>,
    ) {
        let color = color.map(RenderTargetView::id);
        let depth = depth.map(DepthStencilView::id);
        if color != self.state.render_target || depth != self.state.depth_stencil {
            self.end_pass();
        }
        self.state.render_target = color;
        self.state.depth_stencil = depth;
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.state.viewport = Some(viewport);
    }

    fn set_rasterizer_state(&mut self, state: Option<&RasterizerState>) {
        self.state.rasterizer = state.map(RasterizerState::id);
    }

    fn set_depth_stencil_state(&mut self, state: Option<&DepthStencilState>) {
        self.state.depth_state = state.map(DepthStencilState::id);
    }

    fn set_shader(&mut self, stage: ShaderStage, shader: Option<&ShaderModule>) {
        let id = shader.map(ShaderModule::id);
        match stage {
            ShaderStage::Vertex => self.state.vertex_shader = id,
            ShaderStage::Pixel => self.state.pixel_shader = id,
        }
    }

    fn set_constant_buffer(&mut self, stage: ShaderStage, slot: u32, buffer: &Buffer) {
        self.state.constant_buffers.insert((stage, slot), buffer.id());
    }

    fn update_buffer(&mut self, buffer: &Buffer, data: &[u8]) {
        let mut res = self.alloc.resources.borrow_mut();
        let Some(entry) = res.buffers.get_mut(&buffer.id()) else {
            log::error!("update of unknown buffer '{}'", buffer.label());
            return;
        };
        // A fresh buffer per update; earlier draws keep the one they were bound with.
        let mut contents = data.to_vec();
        contents.resize(entry.buffer.size() as usize, 0);
        entry.buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(buffer.label()),
                contents: &contents,
                usage: entry.usage,
            });
    }

    fn set_shader_resource(
        &mut self,
        stage: ShaderStage,
        slot: u32,
        view: Option<&ShaderResourceView>,
    ) {
        match view {
            Some(view) => self.state.shader_resources.insert((stage, slot), view.id()),
            None => self.state.shader_resources.remove(&(stage, slot)),
        };
    }

    fn set_sampler(&mut self, stage: ShaderStage, slot: u32, sampler: Option<&Sampler>) {
        match sampler {
            Some(sampler) => self.state.samplers.insert((stage, slot), sampler.id()),
            None => self.state.samplers.remove(&(stage, slot)),
        };
    }

    fn set_vertex_buffer(&mut self, buffer: &Buffer, stride: u32) {
        if stride != Vertex::STRIDE {
            log::warn!("vertex stride {} differs from the mesh layout", stride);
        }
        self.state.vertex_buffer = Some(buffer.id());
    }

    fn set_index_buffer(&mut self, buffer: &Buffer) {
        self.state.index_buffer = Some(buffer.id());
    }

    fn draw_indexed(&mut self, index_count: u32, first_index: u32, base_vertex: i32) {
        if !self.prepare_draw() {
            return;
        }
        let res = self.alloc.resources.borrow();
        let vertex = self.state.vertex_buffer.and_then(|id| res.buffers.get(&id));
        let index = self.state.index_buffer.and_then(|id| res.buffers.get(&id));
        let (Some(vertex), Some(index), Some(pass)) = (vertex, index, self.pass.as_mut()) else {
            log::warn!("indexed draw without vertex and index buffers");
            return;
        };
        pass.set_vertex_buffer(0, vertex.buffer.slice(..));
        pass.set_index_buffer(index.buffer.slice(..), wgpu::IndexFormat::Uint32);
        pass.draw_indexed(first_index..first_index + index_count, base_vertex, 0..1);
    }

    fn draw(&mut self, vertex_count: u32, first_vertex: u32) {
        if !self.prepare_draw() {
            return;
        }
        if let Some(pass) = self.pass.as_mut() {
            pass.draw(first_vertex..first_vertex + vertex_count, 0..1);
        }
    }

    fn copy_texture_to_array_slice(
        &mut self,
        source: &Texture,
        destination: &Texture,
        array_slice: u32,
    ) {
        if array_slice >= destination.info().array_layers {
            log::error!(
                "copy into slice {} of '{}' which has {} layers",
                array_slice,
                destination.label(),
                destination.info().array_layers
            );
            return;
        }
        self.end_pass();
        self.ensure_encoder();
        let res = self.alloc.resources.borrow();
        let (Some(src), Some(dst), Some(encoder)) = (
            res.textures.get(&source.id()),
            res.textures.get(&destination.id()),
            self.encoder.as_mut(),
        ) else {
            log::error!("copy between unknown textures");
            return;
        };
        encoder.copy_texture_to_texture(
            wgpu::TexelCopyTextureInfo {
                texture: src,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyTextureInfo {
                texture: dst,
                mip_level: 0,
                origin: wgpu::Origin3d {
                    x: 0,
                    y: 0,
                    z: array_slice,
                },
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::Extent3d {
                width: source.width(),
                height: source.height(),
                depth_or_array_layers: 1,
            },
        );
    }

    fn back_buffer(&self) -> RenderTargetView {
        self.back_buffer.clone()
    }

    fn depth_buffer(&self) -> DepthStencilView {
        self.depth_buffer.clone()
    }

    fn width(&self) -> u32 {
        self.config.width
    }

    fn height(&self) -> u32 {
        self.config.height
    }

    fn present(&mut self, vsync: bool) -> Result<(), GpuError> {
        self.end_pass();
        if let Some(encoder) = self.encoder.take() {
            self.queue.submit(std::iter::once(encoder.finish()));
        }
        self.alloc
            .resources
            .borrow_mut()
            .views
            .remove(&self.back_buffer.id());
        match self.frame.take() {
            Some(frame) => frame.present(),
            None => log::trace!("present with nothing drawn to the back buffer"),
        }

        let mode = if vsync {
            wgpu::PresentMode::Fifo
        } else {
            [wgpu::PresentMode::Immediate, wgpu::PresentMode::Mailbox]
                .into_iter()
                .find(|m| self.present_modes.contains(m))
                .unwrap_or(wgpu::PresentMode::Fifo)
        };
        if mode != self.config.present_mode {
            log::debug!("switching present mode to {:?}", mode);
            self.config.present_mode = mode;
            self.surface.configure(&self.device, &self.config);
        }
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<(), GpuError> {
        if width == 0 || height == 0 {
            return Err(GpuError::InvalidDescriptor {
                label: "swap chain".into(),
                reason: format!("resize to {}x{}", width, height),
            });
        }
        self.end_pass();
        if let Some(encoder) = self.encoder.take() {
            self.queue.submit(std::iter::once(encoder.finish()));
        }
        self.frame = None;

        self.config.width = width;
        self.config.height = height;
        self.surface.configure(&self.device, &self.config);

        self.back_buffer = RenderTargetView::from_handle(
            self.alloc.handle(ResourceKind::RenderTargetView, "back buffer"),
        );
        self.depth_buffer = self.alloc.depth_buffer(&self.device, width, height);
        self.state.render_target = Some(self.back_buffer.id());
        self.state.depth_stencil = Some(self.depth_buffer.id());
        self.state.viewport = Some(Viewport::new(width, height));
        log::debug!("resized surface to {}x{}", width, height);
        Ok(())
    }
}

impl WgpuGpu {
    fn create_view(
        &mut self,
        kind: ResourceKind,
        texture: &Texture,
        descriptor: impl FnOnce(&TextureInfo) -> wgpu::TextureViewDescriptor<'static>,
    ) -> Result<ResourceHandle, GpuError> {
        let view = {
            let res = self.alloc.resources.borrow();
            let wgpu_texture = res
                .textures
                .get(&texture.id())
                .ok_or(GpuError::UnknownResource(texture.id()))?;
            wgpu_texture.create_view(&descriptor(texture.info()))
        };
        let label = format!("{} view", texture.label());
        let handle = self.alloc.view_handle(kind, &label, texture);
        self.alloc.resources.borrow_mut().views.insert(
            handle.id(),
            ViewEntry {
                view,
                format: texture_format(texture.info().format),
            },
        );
        Ok(handle)
    }
}

fn buffer_usage(usage: BufferUsage) -> wgpu::BufferUsages {
    let base = match usage {
        BufferUsage::Vertex => wgpu::BufferUsages::VERTEX,
        BufferUsage::Index => wgpu::BufferUsages::INDEX,
        BufferUsage::Constant => wgpu::BufferUsages::UNIFORM,
    };
    base | wgpu::BufferUsages::COPY_DST
}

fn texture_format(format: TextureFormat) -> wgpu::TextureFormat {
    match format {
        TextureFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
        TextureFormat::Rgba8UnormSrgb => wgpu::TextureFormat::Rgba8UnormSrgb,
        TextureFormat::Depth32Float => wgpu::TextureFormat::Depth32Float,
    }
}

fn texture_descriptor<'a>(
    desc: &'a TextureDesc,
    extra: wgpu::TextureUsages,
) -> wgpu::TextureDescriptor<'a> {
    let mut usage = extra;
    if desc
        .usage
        .intersects(TextureUsage::RENDER_TARGET | TextureUsage::DEPTH_STENCIL)
    {
        usage |= wgpu::TextureUsages::RENDER_ATTACHMENT;
    }
    if desc.usage.contains(TextureUsage::SHADER_RESOURCE) {
        usage |= wgpu::TextureUsages::TEXTURE_BINDING;
    }
    if desc.usage.contains(TextureUsage::COPY_SRC) {
        usage |= wgpu::TextureUsages::COPY_SRC;
    }
    if desc.usage.contains(TextureUsage::COPY_DST) {
        usage |= wgpu::TextureUsages::COPY_DST;
    }
    wgpu::TextureDescriptor {
        label: Some(desc.label),
        size: wgpu::Extent3d {
            width: desc.width,
            height: desc.height,
            depth_or_array_layers: desc.array_layers.max(1),
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: texture_format(desc.format),
        usage,
        view_formats: &[],
    }
}

fn compare_function(compare: CompareFunction) -> wgpu::CompareFunction {
    match compare {
        CompareFunction::Never => wgpu::CompareFunction::Never,
        CompareFunction::Less => wgpu::CompareFunction::Less,
        CompareFunction::LessEqual => wgpu::CompareFunction::LessEqual,
        CompareFunction::Equal => wgpu::CompareFunction::Equal,
        CompareFunction::Greater => wgpu::CompareFunction::Greater,
        CompareFunction::Always => wgpu::CompareFunction::Always,
    }
}

fn bind_group_layout_entries(
    stage: ShaderStage,
    layout: &ShaderLayout,
) -> Vec<wgpu::BindGroupLayoutEntry> {
    let visibility = match stage {
        ShaderStage::Vertex => wgpu::ShaderStages::VERTEX,
        ShaderStage::Pixel => wgpu::ShaderStages::FRAGMENT,
    };
    let buffers = layout.constant_buffers.iter().map(|cb| wgpu::BindGroupLayoutEntry {
        binding: cb.slot,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    });
    let resources = layout.resources.iter().map(|r| {
        let texture = |sample_type, view_dimension| wgpu::BindingType::Texture {
            sample_type,
            view_dimension,
            multisampled: false,
        };
        let (binding, ty) = match r.kind {
            BindingKind::Texture2d => (
                TEXTURE_BINDING_BASE + r.slot,
                texture(
                    wgpu::TextureSampleType::Float { filterable: true },
                    wgpu::TextureViewDimension::D2,
                ),
            ),
            BindingKind::TextureCube => (
                TEXTURE_BINDING_BASE + r.slot,
                texture(
                    wgpu::TextureSampleType::Float { filterable: true },
                    wgpu::TextureViewDimension::Cube,
                ),
            ),
            BindingKind::DepthTexture => (
                TEXTURE_BINDING_BASE + r.slot,
                texture(wgpu::TextureSampleType::Depth, wgpu::TextureViewDimension::D2),
            ),
            BindingKind::Sampler => (
                SAMPLER_BINDING_BASE + r.slot,
                wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            ),
            BindingKind::ComparisonSampler => (
                SAMPLER_BINDING_BASE + r.slot,
                wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Comparison),
            ),
        };
        wgpu::BindGroupLayoutEntry {
            binding,
            visibility,
            ty,
            count: None,
        }
    });
    buffers.chain(resources).collect()
}

fn build_pipeline(
    device: &wgpu::Device,
    res: &Resources,
    key: &PipelineKey,
) -> Result<wgpu::RenderPipeline, String> {
    let vs = res
        .shaders
        .get(&key.vertex_shader)
        .ok_or("vertex shader was released")?;
    // Depth-only passes run without a fragment stage.
    let ps = match (key.pixel_shader, key.color_format) {
        (Some(id), Some(format)) => Some((
            res.shaders.get(&id).ok_or("pixel shader was released")?,
            format,
        )),
        _ => None,
    };

    let mut layouts = vec![&vs.bind_group_layout];
    if let Some((ps, _)) = ps {
        layouts.push(&ps.bind_group_layout);
    }

    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("Lantern Pipeline Layout"),
        bind_group_layouts: &layouts,
        push_constant_ranges: &[],
    });

    let vertex_buffers: &[wgpu::VertexBufferLayout] = if vs.layout.vertex_input {
        &[Vertex::LAYOUT]
    } else {
        &[]
    };
    let targets = ps.map(|(_, format)| {
        [Some(wgpu::ColorTargetState {
            format,
            blend: Some(wgpu::BlendState::REPLACE),
            write_mask: wgpu::ColorWrites::ALL,
        })]
    });

    let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("Lantern Pipeline"),
        layout: Some(&pipeline_layout),
        vertex: wgpu::VertexState {
            module: &vs.module,
            entry_point: Some(vs.entry_point.as_str()),
            buffers: vertex_buffers,
            compilation_options: Default::default(),
        },
        fragment: ps.zip(targets.as_ref()).map(|((ps, _), targets)| wgpu::FragmentState {
            module: &ps.module,
            entry_point: Some(ps.entry_point.as_str()),
            targets,
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            front_face: wgpu::FrontFace::Cw,
            cull_mode: match key.raster.cull_mode {
                CullMode::None => None,
                CullMode::Front => Some(wgpu::Face::Front),
                CullMode::Back => Some(wgpu::Face::Back),
            },
            ..Default::default()
        },
        depth_stencil: key.depth_format.map(|format| wgpu::DepthStencilState {
            format,
            depth_write_enabled: key.depth.test && key.depth.write,
            depth_compare: if key.depth.test {
                compare_function(key.depth.compare)
            } else {
                wgpu::CompareFunction::Always
            },
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState {
                constant: key.raster.depth_bias,
                slope_scale: f32::from_bits(key.raster.slope_scaled_depth_bias),
                clamp: f32::from_bits(key.raster.depth_bias_clamp),
            },
        }),
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    });

    match pollster::block_on(device.pop_error_scope()) {
        Some(error) => Err(error.to_string()),
        None => {
            log::debug!("built pipeline {:?}", key);
            Ok(pipeline)
        }
    }
}
