//! A recording [`Gpu`] backend with no device behind it.
//!
//! [`HeadlessGpu`] allocates ids, tracks bound state and buffer contents, and
//! appends every context call to a command list. Resource creation and release
//! are logged as [`ResourceEvent`]s. Tests inspect both to check pass ordering
//! and resource lifetimes; tools can use it to capture a frame.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::error::GpuError;
use crate::gpu::{
    Buffer, BufferDesc, DepthStencilDesc, DepthStencilState, DepthStencilView, Gpu,
    RasterizerDesc, RasterizerState, RenderTargetView, ResourceHandle, ResourceId, ResourceKind,
    ResourceRelease, Sampler, SamplerDesc, ShaderModule, ShaderResourceView, ShaderStage, Texture,
    TextureDesc, TextureFormat, TextureInfo, TextureUsage, ViewDimension, Viewport,
};
use crate::shader::{ShaderLayout, ShaderSource};

/// One recorded context call.
#[derive(Debug, Clone, PartialEq)]
pub enum GpuCommand {
    ClearRenderTarget {
        target: ResourceId,
        color: [f32; 4],
    },
    ClearDepthStencil {
        target: ResourceId,
        depth: f32,
    },
    SetRenderTargets {
        color: Option<ResourceId>,
        depth: Option<ResourceId>,
    },
    SetViewport(Viewport),
    SetRasterizerState(Option<ResourceId>),
    SetDepthStencilState(Option<ResourceId>),
    SetShader {
        stage: ShaderStage,
        shader: Option<ResourceId>,
    },
    SetConstantBuffer {
        stage: ShaderStage,
        slot: u32,
        buffer: ResourceId,
    },
    UpdateBuffer {
        buffer: ResourceId,
        data: Vec<u8>,
    },
    SetShaderResource {
        stage: ShaderStage,
        slot: u32,
        view: Option<ResourceId>,
    },
    SetSampler {
        stage: ShaderStage,
        slot: u32,
        sampler: Option<ResourceId>,
    },
    SetVertexBuffer {
        buffer: ResourceId,
        stride: u32,
    },
    SetIndexBuffer {
        buffer: ResourceId,
    },
    DrawIndexed {
        index_count: u32,
        first_index: u32,
        base_vertex: i32,
    },
    Draw {
        vertex_count: u32,
        first_vertex: u32,
    },
    CopyTextureToArraySlice {
        source: ResourceId,
        destination: ResourceId,
        array_slice: u32,
    },
    Present {
        vsync: bool,
    },
}

impl GpuCommand {
    pub fn is_draw(&self) -> bool {
        matches!(self, GpuCommand::Draw { .. } | GpuCommand::DrawIndexed { .. })
    }
}

/// Resource lifetime event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceEvent {
    Created {
        id: ResourceId,
        kind: ResourceKind,
        label: String,
    },
    Released {
        id: ResourceId,
        kind: ResourceKind,
    },
}

#[derive(Debug, Clone)]
struct LiveResource {
    kind: ResourceKind,
    label: String,
    bytes: u64,
}

/// Shared between the backend and the release hook of every handle it issued.
#[derive(Default)]
struct ResourceTable {
    live: HashMap<ResourceId, LiveResource>,
    buffers: HashMap<ResourceId, Vec<u8>>,
    textures: HashMap<ResourceId, TextureInfo>,
    /// View id -> texture id it was created over.
    views: HashMap<ResourceId, ResourceId>,
    events: Vec<ResourceEvent>,
    allocated_bytes: u64,
}

struct Releaser(Rc<RefCell<ResourceTable>>);

impl ResourceRelease for Releaser {
    fn release(&self, id: ResourceId, kind: ResourceKind) {
        let mut table = self.0.borrow_mut();
        match table.live.remove(&id) {
            Some(res) => {
                table.allocated_bytes -= res.bytes;
                table.buffers.remove(&id);
                table.textures.remove(&id);
                table.views.remove(&id);
                table.events.push(ResourceEvent::Released { id, kind });
            }
            None => log::warn!("double release of {:?} {:?}", kind, id),
        }
    }
}

/// State currently bound on the context. Ids only, so binding never keeps a
/// resource alive.
#[derive(Debug, Clone, Default)]
struct BoundState {
    render_target: Option<ResourceId>,
    depth_stencil: Option<ResourceId>,
    viewport: Option<Viewport>,
    rasterizer: Option<ResourceId>,
    depth_stencil_state: Option<ResourceId>,
    vertex_shader: Option<ResourceId>,
    pixel_shader: Option<ResourceId>,
    shader_resources: HashMap<(ShaderStage, u32), ResourceId>,
}

/// Issues ids and handles, and records creation in the shared table.
struct Allocator {
    table: Rc<RefCell<ResourceTable>>,
    releaser: Rc<dyn ResourceRelease>,
    next_id: u64,
}

impl Allocator {
    fn new() -> Self {
        let table = Rc::new(RefCell::new(ResourceTable::default()));
        let releaser: Rc<dyn ResourceRelease> = Rc::new(Releaser(table.clone()));
        Self {
            table,
            releaser,
            next_id: 1,
        }
    }

    fn next(&mut self, kind: ResourceKind, label: &str, bytes: u64) -> ResourceId {
        let id = ResourceId(self.next_id);
        self.next_id += 1;
        let mut table = self.table.borrow_mut();
        table.live.insert(
            id,
            LiveResource {
                kind,
                label: label.to_string(),
                bytes,
            },
        );
        table.allocated_bytes += bytes;
        table.events.push(ResourceEvent::Created {
            id,
            kind,
            label: label.to_string(),
        });
        log::trace!("created {:?} {:?} '{}'", kind, id, label);
        id
    }

    fn allocate(&mut self, kind: ResourceKind, label: &str, bytes: u64) -> ResourceHandle {
        let id = self.next(kind, label, bytes);
        ResourceHandle::new(id, kind, label, self.releaser.clone())
    }

    fn texture(&mut self, desc: &TextureDesc) -> Texture {
        let info = TextureInfo::from(desc);
        let handle = self.allocate(ResourceKind::Texture, desc.label, desc.byte_size());
        self.table.borrow_mut().textures.insert(handle.id(), info);
        Texture::from_handle(handle, info)
    }

    fn view(&mut self, kind: ResourceKind, label: &str, texture: &Texture) -> ResourceHandle {
        let id = self.next(kind, label, 0);
        self.table.borrow_mut().views.insert(id, texture.id());
        ResourceHandle::with_parent(
            id,
            kind,
            label,
            self.releaser.clone(),
            texture.handle().clone(),
        )
    }

    fn swap_chain(&mut self, width: u32, height: u32) -> (RenderTargetView, DepthStencilView) {
        let back = self.texture(&TextureDesc {
            label: "back buffer",
            width,
            height,
            array_layers: 1,
            format: TextureFormat::Rgba8UnormSrgb,
            usage: TextureUsage::RENDER_TARGET,
            cube_compatible: false,
        });
        let depth = self.texture(&TextureDesc {
            label: "depth buffer",
            width,
            height,
            array_layers: 1,
            format: TextureFormat::Depth32Float,
            usage: TextureUsage::DEPTH_STENCIL,
            cube_compatible: false,
        });
        let rtv = self.view(ResourceKind::RenderTargetView, "back buffer view", &back);
        let dsv = self.view(ResourceKind::DepthStencilView, "depth buffer view", &depth);
        (
            RenderTargetView::from_handle(rtv),
            DepthStencilView::from_handle(dsv),
        )
    }
}

/// Recording backend. See the module docs.
pub struct HeadlessGpu {
    alloc: Allocator,
    width: u32,
    height: u32,
    back_buffer: RenderTargetView,
    depth_buffer: DepthStencilView,
    commands: Vec<GpuCommand>,
    state: BoundState,
    memory_budget: Option<u64>,
    frames_presented: u64,
}

impl HeadlessGpu {
    /// Creates a backend with a `width` x `height` swap chain, bound as the
    /// current render targets with a full-window viewport.
    pub fn new(width: u32, height: u32) -> Self {
        let (width, height) = (width.max(1), height.max(1));
        let mut alloc = Allocator::new();
        let (back_buffer, depth_buffer) = alloc.swap_chain(width, height);
        let state = BoundState {
            render_target: Some(back_buffer.id()),
            depth_stencil: Some(depth_buffer.id()),
            viewport: Some(Viewport::new(width, height)),
            ..Default::default()
        };
        Self {
            alloc,
            width,
            height,
            back_buffer,
            depth_buffer,
            commands: Vec::new(),
            state,
            memory_budget: None,
            frames_presented: 0,
        }
    }

    fn table(&self) -> std::cell::Ref<'_, ResourceTable> {
        self.alloc.table.borrow()
    }

    fn check_budget(&self, label: &str, bytes: u64) -> Result<(), GpuError> {
        if let Some(budget) = self.memory_budget {
            if self.table().allocated_bytes + bytes > budget {
                return Err(GpuError::OutOfMemory(label.to_string()));
            }
        }
        Ok(())
    }

    fn check_live(&self, id: ResourceId) -> Result<(), GpuError> {
        if self.table().live.contains_key(&id) {
            Ok(())
        } else {
            Err(GpuError::UnknownResource(id))
        }
    }

    fn record(&mut self, command: GpuCommand) {
        self.commands.push(command);
    }

    /// Limits the total bytes of live buffers and textures. Allocations that
    /// would exceed it fail with [`GpuError::OutOfMemory`].
    pub fn set_memory_budget(&mut self, budget: Option<u64>) {
        self.memory_budget = budget;
    }

    pub fn commands(&self) -> &[GpuCommand] {
        &self.commands
    }

    pub fn take_commands(&mut self) -> Vec<GpuCommand> {
        std::mem::take(&mut self.commands)
    }

    pub fn clear_commands(&mut self) {
        self.commands.clear();
    }

    pub fn events(&self) -> Vec<ResourceEvent> {
        self.table().events.clone()
    }

    pub fn clear_events(&mut self) {
        self.alloc.table.borrow_mut().events.clear();
    }

    pub fn is_live(&self, id: ResourceId) -> bool {
        self.table().live.contains_key(&id)
    }

    pub fn live_count(&self, kind: ResourceKind) -> usize {
        self.table()
            .live
            .values()
            .filter(|r| r.kind == kind)
            .count()
    }

    pub fn resource_label(&self, id: ResourceId) -> Option<String> {
        self.table().live.get(&id).map(|r| r.label.clone())
    }

    pub fn allocated_bytes(&self) -> u64 {
        self.table().allocated_bytes
    }

    /// Last uploaded contents of a live buffer.
    pub fn buffer_contents(&self, id: ResourceId) -> Option<Vec<u8>> {
        self.table().buffers.get(&id).cloned()
    }

    /// Creation info of a live texture, or of the texture behind a live view.
    pub fn texture_info(&self, id: ResourceId) -> Option<TextureInfo> {
        let table = self.table();
        let texture = table.views.get(&id).copied().unwrap_or(id);
        table.textures.get(&texture).copied()
    }

    pub fn bound_render_target(&self) -> Option<ResourceId> {
        self.state.render_target
    }

    pub fn bound_depth_stencil(&self) -> Option<ResourceId> {
        self.state.depth_stencil
    }

    pub fn bound_viewport(&self) -> Option<Viewport> {
        self.state.viewport
    }

    pub fn bound_rasterizer_state(&self) -> Option<ResourceId> {
        self.state.rasterizer
    }

    pub fn bound_depth_stencil_state(&self) -> Option<ResourceId> {
        self.state.depth_stencil_state
    }

    pub fn bound_shader(&self, stage: ShaderStage) -> Option<ResourceId> {
        match stage {
            ShaderStage::Vertex => self.state.vertex_shader,
            ShaderStage::Pixel => self.state.pixel_shader,
        }
    }

    pub fn bound_shader_resource(&self, stage: ShaderStage, slot: u32) -> Option<ResourceId> {
        self.state.shader_resources.get(&(stage, slot)).copied()
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }
}

impl Gpu for HeadlessGpu {
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
        self.check_budget(desc.label, size)?;
        let handle = self.alloc.allocate(ResourceKind::Buffer, desc.label, size);
        let mut data = vec![0u8; size as usize];
        if let Some(contents) = contents {
            data[..contents.len()].copy_from_slice(contents);
        }
        self.alloc.table.borrow_mut().buffers.insert(handle.id(), data);
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
        if let Some(contents) = contents {
            if (contents.len() as u64) < desc.byte_size() {
                return Err(GpuError::InvalidDescriptor {
                    label: desc.label.to_string(),
                    reason: format!(
                        "{} bytes of data for a {} byte texture",
                        contents.len(),
                        desc.byte_size()
                    ),
                });
            }
        }
        self.check_budget(desc.label, desc.byte_size())?;
        Ok(self.alloc.texture(desc))
    }

    fn create_render_target_view(
        &mut self,
        texture: &Texture,
    ) -> Result<RenderTargetView, GpuError> {
        self.check_live(texture.id())?;
        if !texture.info().usage.contains(TextureUsage::RENDER_TARGET) {
            return Err(GpuError::InvalidDescriptor {
                label: texture.label().to_string(),
                reason: "texture was not created as a render target".into(),
            });
        }
        let label = format!("{} rtv", texture.label());
        let handle = self.alloc.view(ResourceKind::RenderTargetView, &label, texture);
        Ok(RenderTargetView::from_handle(handle))
    }

    fn create_depth_stencil_view(
        &mut self,
        texture: &Texture,
    ) -> Result<DepthStencilView, GpuError> {
        self.check_live(texture.id())?;
        if !texture.info().format.is_depth() {
            return Err(GpuError::InvalidDescriptor {
                label: texture.label().to_string(),
                reason: "depth view over a color format".into(),
            });
        }
        let label = format!("{} dsv", texture.label());
        let handle = self.alloc.view(ResourceKind::DepthStencilView, &label, texture);
        Ok(DepthStencilView::from_handle(handle))
    }

    fn create_shader_resource_view(
        &mut self,
        texture: &Texture,
        dimension: ViewDimension,
    ) -> Result<ShaderResourceView, GpuError> {
        self.check_live(texture.id())?;
        if dimension == ViewDimension::Cube && !texture.info().cube_compatible {
            return Err(GpuError::InvalidDescriptor {
                label: texture.label().to_string(),
                reason: "cube view over a non-cube texture".into(),
            });
        }
        let label = format!("{} srv", texture.label());
        let handle = self.alloc.view(ResourceKind::ShaderResourceView, &label, texture);
        Ok(ShaderResourceView::from_handle(handle))
    }

    fn create_sampler(&mut self, desc: &SamplerDesc) -> Result<Sampler, GpuError> {
        Ok(Sampler::from_handle(self.alloc.allocate(
            ResourceKind::Sampler,
            desc.label,
            0,
        )))
    }

    fn create_rasterizer_state(
        &mut self,
        desc: &RasterizerDesc,
    ) -> Result<RasterizerState, GpuError> {
        Ok(RasterizerState::from_handle(self.alloc.allocate(
            ResourceKind::RasterizerState,
            desc.label,
            0,
        )))
    }

    fn create_depth_stencil_state(
        &mut self,
        desc: &DepthStencilDesc,
    ) -> Result<DepthStencilState, GpuError> {
        Ok(DepthStencilState::from_handle(self.alloc.allocate(
            ResourceKind::DepthStencilState,
            desc.label,
            0,
        )))
    }

    fn create_shader_module(
        &mut self,
        stage: ShaderStage,
        source: &ShaderSource,
        _layout: &ShaderLayout,
    ) -> Result<ShaderModule, GpuError> {
        if source.entry_point.is_empty() {
            return Err(GpuError::ShaderCompilation {
                label: source.label.clone(),
                reason: format!("{:?} shader has no entry point", stage),
            });
        }
        Ok(ShaderModule::from_handle(self.alloc.allocate(
            ResourceKind::ShaderModule,
            &source.label,
            0,
        )))
    }

    fn clear_render_target(&mut self, target: &RenderTargetView, color: [f32; 4]) {
        self.record(GpuCommand::ClearRenderTarget {
            target: target.id(),
            color,
        });
    }

    fn clear_depth_stencil(&mut self, target: &DepthStencilView, depth: f32) {
        self.record(GpuCommand::ClearDepthStencil {
            target: target.id(),
            depth,
        });
    }

    fn set_render_targets(
        &mut self,
        color: Option<&RenderTargetView>,
        depth: Option<&DepthStencilView>,
    ) {
        let color = color.map(RenderTargetView::id);
        let depth = depth.map(DepthStencilView::id);
        self.state.render_target = color;
        self.state.depth_stencil = depth;
        self.record(GpuCommand::SetRenderTargets { color, depth });
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.state.viewport = Some(viewport);
        self.record(GpuCommand::SetViewport(viewport));
    }

    fn set_rasterizer_state(&mut self, state: Option<&RasterizerState>) {
        let id = state.map(RasterizerState::id);
        self.state.rasterizer = id;
        self.record(GpuCommand::SetRasterizerState(id));
    }

    fn set_depth_stencil_state(&mut self, state: Option<&DepthStencilState>) {
        let id = state.map(DepthStencilState::id);
        self.state.depth_stencil_state = id;
        self.record(GpuCommand::SetDepthStencilState(id));
    }

    fn set_shader(&mut self, stage: ShaderStage, shader: Option<&ShaderModule>) {
        let id = shader.map(ShaderModule::id);
        match stage {
            ShaderStage::Vertex => self.state.vertex_shader = id,
            ShaderStage::Pixel => self.state.pixel_shader = id,
        }
        self.record(GpuCommand::SetShader { stage, shader: id });
    }

    fn set_constant_buffer(&mut self, stage: ShaderStage, slot: u32, buffer: &Buffer) {
        self.record(GpuCommand::SetConstantBuffer {
            stage,
            slot,
            buffer: buffer.id(),
        });
    }

    fn update_buffer(&mut self, buffer: &Buffer, data: &[u8]) {
        {
            let mut table = self.alloc.table.borrow_mut();
            match table.buffers.get_mut(&buffer.id()) {
                Some(contents) => {
                    let len = data.len().min(contents.len());
                    if len < data.len() {
                        log::warn!(
                            "update of '{}' truncated from {} to {} bytes",
                            buffer.label(),
                            data.len(),
                            len
                        );
                    }
                    contents[..len].copy_from_slice(&data[..len]);
                }
                None => {
                    log::error!("update of unknown buffer {:?}", buffer.id());
                    return;
                }
            }
        }
        self.record(GpuCommand::UpdateBuffer {
            buffer: buffer.id(),
            data: data.to_vec(),
        });
    }

    fn set_shader_resource(
        &mut self,
        stage: ShaderStage,
        slot: u32,
        view: Option<&ShaderResourceView>,
    ) {
        let id = view.map(ShaderResourceView::id);
        match id {
            Some(id) => self.state.shader_resources.insert((stage, slot), id),
            None => self.state.shader_resources.remove(&(stage, slot)),
        };
        self.record(GpuCommand::SetShaderResource {
            stage,
            slot,
            view: id,
        });
    }

    fn set_sampler(&mut self, stage: ShaderStage, slot: u32, sampler: Option<&Sampler>) {
        self.record(GpuCommand::SetSampler {
            stage,
            slot,
            sampler: sampler.map(Sampler::id),
        });
    }

    fn set_vertex_buffer(&mut self, buffer: &Buffer, stride: u32) {
        self.record(GpuCommand::SetVertexBuffer {
            buffer: buffer.id(),
            stride,
        });
    }

    fn set_index_buffer(&mut self, buffer: &Buffer) {
        self.record(GpuCommand::SetIndexBuffer {
            buffer: buffer.id(),
        });
    }

    fn draw_indexed(&mut self, index_count: u32, first_index: u32, base_vertex: i32) {
        if self.state.vertex_shader.is_none() {
            log::warn!("indexed draw with no vertex shader bound");
        }
        self.record(GpuCommand::DrawIndexed {
            index_count,
            first_index,
            base_vertex,
        });
    }

    fn draw(&mut self, vertex_count: u32, first_vertex: u32) {
        if self.state.vertex_shader.is_none() {
            log::warn!("draw with no vertex shader bound");
        }
        self.record(GpuCommand::Draw {
            vertex_count,
            first_vertex,
        });
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
        self.record(GpuCommand::CopyTextureToArraySlice {
            source: source.id(),
            destination: destination.id(),
            array_slice,
        });
    }

    fn back_buffer(&self) -> RenderTargetView {
        self.back_buffer.clone()
    }

    fn depth_buffer(&self) -> DepthStencilView {
        self.depth_buffer.clone()
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn present(&mut self, vsync: bool) -> Result<(), GpuError> {
        self.frames_presented += 1;
        self.record(GpuCommand::Present { vsync });
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<(), GpuError> {
        if width == 0 || height == 0 {
            return Err(GpuError::InvalidDescriptor {
                label: "swap chain".into(),
                reason: format!("resize to {}x{}", width, height),
            });
        }
        log::debug!("resizing swap chain to {}x{}", width, height);
        let (back_buffer, depth_buffer) = self.alloc.swap_chain(width, height);
        self.back_buffer = back_buffer;
        self.depth_buffer = depth_buffer;
        self.width = width;
        self.height = height;
        self.state.render_target = Some(self.back_buffer.id());
        self.state.depth_stencil = Some(self.depth_buffer.id());
        self.state.viewport = Some(Viewport::new(width, height));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::BufferUsage;

    #[test]
    fn test_new_binds_swap_chain() {
        let gpu = HeadlessGpu::new(800, 600);
        assert_eq!(gpu.bound_render_target(), Some(gpu.back_buffer().id()));
        assert_eq!(gpu.bound_depth_stencil(), Some(gpu.depth_buffer().id()));
        assert_eq!(gpu.bound_viewport(), Some(Viewport::new(800, 600)));
        assert!(gpu.commands().is_empty());
    }

    #[test]
    fn test_drop_releases_resource() {
        let mut gpu = HeadlessGpu::new(4, 4);
        let desc = BufferDesc {
            label: "vb",
            usage: BufferUsage::Vertex,
            size: 16,
        };
        let buffer = gpu.create_buffer(&desc, None).unwrap();
        let id = buffer.id();
        let copy = buffer.clone();
        assert_eq!(buffer.ref_count(), 2);

        drop(buffer);
        assert!(gpu.is_live(id));
        drop(copy);
        assert!(!gpu.is_live(id));
        assert_eq!(
            gpu.events().last(),
            Some(&ResourceEvent::Released {
                id,
                kind: ResourceKind::Buffer
            })
        );
    }

    #[test]
    fn test_zero_sized_resources_rejected() {
        let mut gpu = HeadlessGpu::new(4, 4);
        assert!(matches!(
            gpu.create_buffer(&BufferDesc::default(), None),
            Err(GpuError::InvalidDescriptor { .. })
        ));
        assert!(gpu.create_texture(&TextureDesc::default(), None).is_err());
    }

    #[test]
    fn test_memory_budget() {
        let mut gpu = HeadlessGpu::new(4, 4);
        let baseline = gpu.allocated_bytes();
        gpu.set_memory_budget(Some(baseline + 64));
        let desc = BufferDesc {
            label: "big",
            usage: BufferUsage::Vertex,
            size: 128,
        };
        assert!(matches!(
            gpu.create_buffer(&desc, None),
            Err(GpuError::OutOfMemory(_))
        ));
    }

    #[test]
    fn test_resize_replaces_swap_chain() {
        let mut gpu = HeadlessGpu::new(100, 100);
        let old = gpu.back_buffer().id();
        gpu.resize(200, 50).unwrap();
        assert!(!gpu.is_live(old));
        assert_eq!(gpu.width(), 200);
        assert_eq!(gpu.bound_render_target(), Some(gpu.back_buffer().id()));
        assert_eq!(gpu.bound_viewport(), Some(Viewport::new(200, 50)));
        assert!((gpu.aspect_ratio() - 4.0).abs() < 0.001);
        assert!(gpu.resize(0, 10).is_err());
    }
}
