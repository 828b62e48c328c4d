//! Named shader parameters backed by CPU staging copies of constant buffers.
//!
//! A [`Shader`] is created from WGSL source plus a [`ShaderLayout`] that declares
//! its constant buffers, variables and resource slots. Setters look a variable
//! up by name and write into the staging bytes; nothing reaches the GPU until
//! [`Shader::copy_all_buffer_data`] uploads every buffer. Unknown names are
//! skipped so one shader can be driven by code written for a richer one.
//!
//! # Binding convention
//!
//! Within a stage's bind group, constant buffer slot `n` lives at binding `n`,
//! texture slot `n` at binding `16 + n` and sampler slot `n` at binding `32 + n`.
//! Vertex resources use group 0, pixel resources group 1.
//!
//! # Example
//!
//! ```ignore
//! let layout = ShaderLayout::new()
//!     .with_constant_buffer(
//!         ConstantBufferLayout::new("per_object", 0)
//!             .matrix4x4("world")
//!             .float4("color_tint"),
//!     )
//!     .with_vertex_input();
//! let shader = Shader::new(gpu, ShaderStage::Vertex, &source, layout)?;
//! shader.set_matrix4x4("world", Mat4::IDENTITY);
//! shader.copy_all_buffer_data(gpu);
//! ```

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

use glam::{Mat4, Vec2, Vec3, Vec4};

use crate::error::GpuError;
use crate::gpu::{
    Buffer, BufferDesc, BufferUsage, Gpu, Sampler, ShaderModule, ShaderResourceView, ShaderStage,
};

/// First binding index used for texture slots inside a stage's bind group.
pub const TEXTURE_BINDING_BASE: u32 = 16;
/// First binding index used for sampler slots inside a stage's bind group.
pub const SAMPLER_BINDING_BASE: u32 = 32;

/// Program text handed to the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderSource {
    pub label: String,
    /// WGSL source.
    pub code: String,
    pub entry_point: String,
}

impl ShaderSource {
    pub fn new(
        label: impl Into<String>,
        code: impl Into<String>,
        entry_point: impl Into<String>,
    ) -> Self {
        Self {
            label: label.into(),
            code: code.into(),
            entry_point: entry_point.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableLayout {
    pub name: String,
    pub offset: u32,
    pub size: u32,
}

/// One constant buffer: its slot, total size and variable placement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstantBufferLayout {
    pub name: String,
    pub slot: u32,
    pub size: u32,
    pub variables: Vec<VariableLayout>,
}

impl ConstantBufferLayout {
    pub fn new(name: impl Into<String>, slot: u32) -> Self {
        Self {
            name: name.into(),
            slot,
            size: 0,
            variables: Vec::new(),
        }
    }

    /// Appends a variable following WGSL uniform alignment and keeps the
    /// buffer size a multiple of 16.
    pub fn variable(mut self, name: impl Into<String>, size: u32, align: u32) -> Self {
        let end = self
            .variables
            .iter()
            .map(|v| v.offset + v.size)
            .max()
            .unwrap_or(0);
        let offset = end.next_multiple_of(align.max(1));
        self.variables.push(VariableLayout {
            name: name.into(),
            offset,
            size,
        });
        self.size = (offset + size).next_multiple_of(16);
        self
    }

    /// Places a variable at an explicit byte offset.
    pub fn variable_at(mut self, name: impl Into<String>, offset: u32, size: u32) -> Self {
        self.variables.push(VariableLayout {
            name: name.into(),
            offset,
            size,
        });
        self.size = self.size.max((offset + size).next_multiple_of(16));
        self
    }

    pub fn float(self, name: impl Into<String>) -> Self {
        self.variable(name, 4, 4)
    }

    pub fn int(self, name: impl Into<String>) -> Self {
        self.variable(name, 4, 4)
    }

    pub fn float2(self, name: impl Into<String>) -> Self {
        self.variable(name, 8, 8)
    }

    pub fn float3(self, name: impl Into<String>) -> Self {
        self.variable(name, 12, 16)
    }

    pub fn float4(self, name: impl Into<String>) -> Self {
        self.variable(name, 16, 16)
    }

    pub fn matrix4x4(self, name: impl Into<String>) -> Self {
        self.variable(name, 64, 16)
    }

    /// An array of 16-byte aligned structs, e.g. `array<Light, 8>`.
    pub fn struct_array(self, name: impl Into<String>, stride: u32, count: u32) -> Self {
        self.variable(name, stride * count, 16)
    }
}

/// Kind of a texture or sampler slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingKind {
    Texture2d,
    TextureCube,
    DepthTexture,
    Sampler,
    ComparisonSampler,
}

impl BindingKind {
    pub fn is_sampler(self) -> bool {
        matches!(self, BindingKind::Sampler | BindingKind::ComparisonSampler)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceBinding {
    pub name: String,
    pub slot: u32,
    pub kind: BindingKind,
}

/// Everything a backend and the parameter setters need to know about a program.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShaderLayout {
    pub constant_buffers: Vec<ConstantBufferLayout>,
    pub resources: Vec<ResourceBinding>,
    /// Whether the program reads the mesh [`Vertex`](crate::Vertex) layout.
    pub vertex_input: bool,
}

impl ShaderLayout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_constant_buffer(mut self, buffer: ConstantBufferLayout) -> Self {
        self.constant_buffers.push(buffer);
        self
    }

    pub fn with_resource(mut self, name: impl Into<String>, slot: u32, kind: BindingKind) -> Self {
        self.resources.push(ResourceBinding {
            name: name.into(),
            slot,
            kind,
        });
        self
    }

    pub fn with_vertex_input(mut self) -> Self {
        self.vertex_input = true;
        self
    }
}

struct ConstantBuffer {
    slot: u32,
    buffer: Buffer,
    staging: RefCell<Vec<u8>>,
}

#[derive(Clone, Copy)]
struct VariableSlot {
    buffer: usize,
    offset: usize,
    size: usize,
}

/// A compiled program with named, CPU-staged parameters.
///
/// Setters take `&self` so a shader can be shared between materials as `Rc<Shader>`.
pub struct Shader {
    stage: ShaderStage,
    module: ShaderModule,
    layout: ShaderLayout,
    buffers: Vec<ConstantBuffer>,
    variables: HashMap<String, VariableSlot>,
    resources: HashMap<String, ResourceBinding>,
}

impl Shader {
    /// Creates the program module and one GPU constant buffer per declared buffer.
    pub fn new(
        gpu: &mut dyn Gpu,
        stage: ShaderStage,
        source: &ShaderSource,
        layout: ShaderLayout,
    ) -> Result<Self, GpuError> {
        let mut seen = HashSet::new();
        for var in layout.constant_buffers.iter().flat_map(|cb| &cb.variables) {
            if !seen.insert(var.name.as_str()) {
                log::warn!("shader '{}' declares '{}' twice", source.label, var.name);
                return Err(GpuError::InvalidDescriptor {
                    label: source.label.clone(),
                    reason: format!("variable '{}' is declared more than once", var.name),
                });
            }
        }

        let module = gpu.create_shader_module(stage, source, &layout)?;

        let mut buffers = Vec::with_capacity(layout.constant_buffers.len());
        let mut variables = HashMap::new();
        for (index, cb) in layout.constant_buffers.iter().enumerate() {
            let size = cb.size.max(16);
            let label = format!("{} {}", source.label, cb.name);
            let buffer = gpu.create_buffer(
                &BufferDesc {
                    label: &label,
                    usage: BufferUsage::Constant,
                    size: size as u64,
                },
                None,
            )?;
            for var in &cb.variables {
                variables.insert(
                    var.name.clone(),
                    VariableSlot {
                        buffer: index,
                        offset: var.offset as usize,
                        size: var.size as usize,
                    },
                );
            }
            buffers.push(ConstantBuffer {
                slot: cb.slot,
                buffer,
                staging: RefCell::new(vec![0; size as usize]),
            });
        }

        let resources = layout
            .resources
            .iter()
            .map(|r| (r.name.clone(), r.clone()))
            .collect();

        log::debug!(
            "created {:?} shader '{}' ({} constant buffers, {} variables)",
            stage,
            source.label,
            buffers.len(),
            variables.len()
        );

        Ok(Self {
            stage,
            module,
            layout,
            buffers,
            variables,
            resources,
        })
    }

    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    pub fn module(&self) -> &ShaderModule {
        &self.module
    }

    pub fn layout(&self) -> &ShaderLayout {
        &self.layout
    }

    /// Binds the program and its constant buffers.
    pub fn set_shader(&self, gpu: &mut dyn Gpu) {
        gpu.set_shader(self.stage, Some(&self.module));
        for cb in &self.buffers {
            gpu.set_constant_buffer(self.stage, cb.slot, &cb.buffer);
        }
    }

    /// Uploads every staging buffer. Call after the setters, before the draw.
    pub fn copy_all_buffer_data(&self, gpu: &mut dyn Gpu) {
        for cb in &self.buffers {
            gpu.update_buffer(&cb.buffer, &cb.staging.borrow());
        }
    }

    pub fn has_variable(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    pub fn has_resource(&self, name: &str) -> bool {
        self.resources.contains_key(name)
    }

    /// Declared byte size of a variable.
    pub fn variable_size(&self, name: &str) -> Option<usize> {
        self.variables.get(name).map(|slot| slot.size)
    }

    /// Writes raw bytes into a variable, truncated to the variable's size.
    pub fn set_data(&self, name: &str, data: &[u8]) -> bool {
        let Some(slot) = self.variables.get(name).copied() else {
            log::trace!("{:?} shader has no variable '{}'", self.stage, name);
            return false;
        };
        let len = data.len().min(slot.size);
        let mut staging = self.buffers[slot.buffer].staging.borrow_mut();
        staging[slot.offset..slot.offset + len].copy_from_slice(&data[..len]);
        true
    }

    pub fn set_int(&self, name: &str, value: i32) -> bool {
        self.set_data(name, bytemuck::bytes_of(&value))
    }

    pub fn set_float(&self, name: &str, value: f32) -> bool {
        self.set_data(name, bytemuck::bytes_of(&value))
    }

    pub fn set_float2(&self, name: &str, value: Vec2) -> bool {
        self.set_data(name, bytemuck::cast_slice(&value.to_array()))
    }

    pub fn set_float3(&self, name: &str, value: Vec3) -> bool {
        self.set_data(name, bytemuck::cast_slice(&value.to_array()))
    }

    pub fn set_float4(&self, name: &str, value: Vec4) -> bool {
        self.set_data(name, bytemuck::cast_slice(&value.to_array()))
    }

    pub fn set_matrix4x4(&self, name: &str, value: Mat4) -> bool {
        self.set_data(name, bytemuck::cast_slice(&value.to_cols_array()))
    }

    /// Current staged bytes of a variable.
    pub fn variable_data(&self, name: &str) -> Option<Vec<u8>> {
        let slot = self.variables.get(name)?;
        let staging = self.buffers[slot.buffer].staging.borrow();
        Some(staging[slot.offset..slot.offset + slot.size].to_vec())
    }

    /// GPU buffer backing the named constant buffer.
    pub fn constant_buffer(&self, name: &str) -> Option<&Buffer> {
        self.layout
            .constant_buffers
            .iter()
            .position(|cb| cb.name == name)
            .map(|i| &self.buffers[i].buffer)
    }

    /// Binds (or with `None` unbinds) a texture slot immediately.
    pub fn set_shader_resource_view(
        &self,
        gpu: &mut dyn Gpu,
        name: &str,
        view: Option<&ShaderResourceView>,
    ) -> bool {
        match self.resources.get(name) {
            Some(binding) if !binding.kind.is_sampler() => {
                gpu.set_shader_resource(self.stage, binding.slot, view);
                true
            }
            _ => {
                log::trace!("{:?} shader has no texture slot '{}'", self.stage, name);
                false
            }
        }
    }

    /// Binds a sampler slot immediately.
    pub fn set_sampler_state(&self, gpu: &mut dyn Gpu, name: &str, sampler: &Sampler) -> bool {
        match self.resources.get(name) {
            Some(binding) if binding.kind.is_sampler() => {
                gpu.set_sampler(self.stage, binding.slot, Some(sampler));
                true
            }
            _ => {
                log::trace!("{:?} shader has no sampler slot '{}'", self.stage, name);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::ResourceKind;
    use crate::headless::{GpuCommand, HeadlessGpu};

    fn layout() -> ShaderLayout {
        ShaderLayout::new()
            .with_constant_buffer(
                ConstantBufferLayout::new("per_object", 0)
                    .matrix4x4("world")
                    .float3("camera_position")
                    .float("total_time")
                    .float2("uv_scale"),
            )
            .with_resource("surface_texture", 0, BindingKind::Texture2d)
            .with_resource("basic_sampler", 0, BindingKind::Sampler)
    }

    fn shader(gpu: &mut HeadlessGpu) -> Shader {
        let source = ShaderSource::new("test", "", "main");
        Shader::new(gpu, ShaderStage::Pixel, &source, layout()).unwrap()
    }

    #[test]
    fn test_layout_packing() {
        let cb = &layout().constant_buffers[0];
        let offsets: Vec<_> = cb.variables.iter().map(|v| v.offset).collect();
        // vec3 followed by an f32 shares the 16-byte row
        assert_eq!(offsets, vec![0, 64, 76, 80]);
        assert_eq!(cb.size, 96);
    }

    #[test]
    fn test_unknown_variable_is_skipped() {
        let mut gpu = HeadlessGpu::new(64, 64);
        let shader = shader(&mut gpu);
        assert!(!shader.set_float("does_not_exist", 1.0));
        assert!(shader.set_float("total_time", 2.5));
        assert_eq!(
            shader.variable_data("total_time").unwrap(),
            2.5f32.to_ne_bytes().to_vec()
        );
    }

    #[test]
    fn test_set_data_truncates() {
        let mut gpu = HeadlessGpu::new(64, 64);
        let shader = shader(&mut gpu);
        let bytes = [7u8; 32];
        assert!(shader.set_data("uv_scale", &bytes));
        assert_eq!(shader.variable_data("uv_scale").unwrap(), vec![7u8; 8]);
    }

    #[test]
    fn test_copy_all_uploads_staging() {
        let mut gpu = HeadlessGpu::new(64, 64);
        let shader = shader(&mut gpu);
        shader.set_float3("camera_position", Vec3::new(1.0, 2.0, 3.0));
        gpu.clear_commands();
        shader.copy_all_buffer_data(&mut gpu);

        let buffer = shader.constant_buffer("per_object").unwrap().id();
        let contents = gpu.buffer_contents(buffer).unwrap();
        let position: &[f32] = bytemuck::cast_slice(&contents[64..76]);
        assert_eq!(position, &[1.0, 2.0, 3.0]);
        assert!(matches!(gpu.commands(), [GpuCommand::UpdateBuffer { .. }]));
    }

    #[test]
    fn test_resource_slots_by_kind() {
        let mut gpu = HeadlessGpu::new(64, 64);
        let shader = shader(&mut gpu);
        let sampler = gpu.create_sampler(&Default::default()).unwrap();
        assert!(shader.set_sampler_state(&mut gpu, "basic_sampler", &sampler));
        assert!(!shader.set_sampler_state(&mut gpu, "surface_texture", &sampler));
        assert!(!shader.set_shader_resource_view(&mut gpu, "basic_sampler", None));
        assert!(shader.set_shader_resource_view(&mut gpu, "surface_texture", None));
    }

    #[test]
    fn test_variable_names_unique_across_buffers() {
        let mut gpu = HeadlessGpu::new(64, 64);
        let layout = layout().with_constant_buffer(
            ConstantBufferLayout::new("per_frame", 1)
                .float4("color_tint")
                .float("total_time"),
        );
        let source = ShaderSource::new("clash", "", "main");
        let result = Shader::new(&mut gpu, ShaderStage::Pixel, &source, layout);
        assert!(matches!(
            result,
            Err(GpuError::InvalidDescriptor { reason, .. }) if reason.contains("total_time")
        ));
        assert_eq!(gpu.live_count(ResourceKind::ShaderModule), 0);
    }
}
