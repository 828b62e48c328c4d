//! GPU meshes and the vertex format they use.
//!
//! - [`Vertex`]: position, UV, normal and tangent (44 bytes)
//! - [`Mesh`]: immutable vertex and index buffers plus their counts
//!
//! Meshes are created from explicit slices, from a [`RawGeometry`], from one of
//! the built-in primitives, or from an `.obj` / `.stl` file:
//!
//! ```ignore
//! let cube = Rc::new(Mesh::cube(gpu)?);
//! let helix = Rc::new(Mesh::from_file(gpu, "assets/helix.obj")?);
//! ```
//!
//! # Vertex Layout
//!
//! | Attribute | Format    | Offset | Shader Location |
//! |-----------|-----------|--------|-----------------|
//! | position  | Float32x3 | 0      | 0               |
//! | uv        | Float32x2 | 12     | 1               |
//! | normal    | Float32x3 | 20     | 2               |
//! | tangent   | Float32x3 | 32     | 3               |

use std::path::Path;

use crate::error::{GpuError, RenderError};
use crate::geometry::RawGeometry;
use crate::gpu::{Buffer, BufferDesc, BufferUsage, Gpu};

/// A mesh vertex. `#[repr(C)]` so a slice can be uploaded as-is.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub uv: [f32; 2],
    pub normal: [f32; 3],
    /// Filled in by tangent generation; zero until then.
    pub tangent: [f32; 3],
}

impl Vertex {
    pub const STRIDE: u32 = std::mem::size_of::<Vertex>() as u32;

    /// The wgpu vertex buffer layout matching the table in the module docs.
    #[cfg(feature = "wgpu")]
    pub const LAYOUT: wgpu::VertexBufferLayout<'static> = wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<Vertex>() as u64,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &[
            // position
            wgpu::VertexAttribute {
                offset: 0,
                shader_location: 0,
                format: wgpu::VertexFormat::Float32x3,
            },
            // uv
            wgpu::VertexAttribute {
                offset: 12,
                shader_location: 1,
                format: wgpu::VertexFormat::Float32x2,
            },
            // normal
            wgpu::VertexAttribute {
                offset: 20,
                shader_location: 2,
                format: wgpu::VertexFormat::Float32x3,
            },
            // tangent
            wgpu::VertexAttribute {
                offset: 32,
                shader_location: 3,
                format: wgpu::VertexFormat::Float32x3,
            },
        ],
    };

    pub const fn new(position: [f32; 3], uv: [f32; 2], normal: [f32; 3]) -> Self {
        Self {
            position,
            uv,
            normal,
            tangent: [0.0; 3],
        }
    }
}

/// GPU-resident geometry. Buffers never change after creation.
///
/// Share between entities with `Rc<Mesh>`.
#[derive(Debug)]
pub struct Mesh {
    vertex_buffer: Buffer,
    index_buffer: Buffer,
    vertex_count: u32,
    index_count: u32,
}

impl Mesh {
    pub fn new(gpu: &mut dyn Gpu, vertices: &[Vertex], indices: &[u32]) -> Result<Self, GpuError> {
        let vertex_bytes: &[u8] = bytemuck::cast_slice(vertices);
        let index_bytes: &[u8] = bytemuck::cast_slice(indices);

        let vertex_buffer = gpu.create_buffer(
            &BufferDesc {
                label: "mesh vertices",
                usage: BufferUsage::Vertex,
                size: vertex_bytes.len() as u64,
            },
            Some(vertex_bytes),
        )?;
        let index_buffer = gpu.create_buffer(
            &BufferDesc {
                label: "mesh indices",
                usage: BufferUsage::Index,
                size: index_bytes.len() as u64,
            },
            Some(index_bytes),
        )?;

        Ok(Self {
            vertex_buffer,
            index_buffer,
            vertex_count: vertices.len() as u32,
            index_count: indices.len() as u32,
        })
    }

    pub fn from_geometry(gpu: &mut dyn Gpu, geometry: &RawGeometry) -> Result<Self, GpuError> {
        Self::new(gpu, &geometry.vertices, &geometry.indices)
    }

    /// Loads an `.obj` or `.stl` file. Nothing is uploaded if parsing fails.
    pub fn from_file(gpu: &mut dyn Gpu, path: impl AsRef<Path>) -> Result<Self, RenderError> {
        let path = path.as_ref();
        let geometry = RawGeometry::load(path)?;
        log::debug!(
            "loaded {} ({} vertices, {} indices)",
            path.display(),
            geometry.vertices.len(),
            geometry.indices.len()
        );
        Ok(Self::from_geometry(gpu, &geometry)?)
    }

    /// Unit cube centered at the origin.
    pub fn cube(gpu: &mut dyn Gpu) -> Result<Self, GpuError> {
        Self::from_geometry(gpu, &RawGeometry::cube())
    }

    /// UV sphere of radius 0.5.
    pub fn sphere(gpu: &mut dyn Gpu, segments: u32, rings: u32) -> Result<Self, GpuError> {
        Self::from_geometry(gpu, &RawGeometry::sphere(segments, rings))
    }

    /// Square on the XZ plane facing +Y.
    pub fn plane(gpu: &mut dyn Gpu, size: f32) -> Result<Self, GpuError> {
        Self::from_geometry(gpu, &RawGeometry::plane(size))
    }

    pub fn vertex_buffer(&self) -> &Buffer {
        &self.vertex_buffer
    }

    pub fn index_buffer(&self) -> &Buffer {
        &self.index_buffer
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    /// Binds the buffers and issues one indexed draw. No other state is touched.
    pub fn draw(&self, gpu: &mut dyn Gpu) {
        gpu.set_vertex_buffer(&self.vertex_buffer, Vertex::STRIDE);
        gpu.set_index_buffer(&self.index_buffer);
        gpu.draw_indexed(self.index_count, 0, 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::{GpuCommand, HeadlessGpu};

    #[test]
    fn vertex_is_44_bytes() {
        assert_eq!(std::mem::size_of::<Vertex>(), 44);
        assert_eq!(std::mem::offset_of!(Vertex, uv), 12);
        assert_eq!(std::mem::offset_of!(Vertex, normal), 20);
        assert_eq!(std::mem::offset_of!(Vertex, tangent), 32);
    }

    #[test]
    fn counts_match_inputs() {
        let mut gpu = HeadlessGpu::new(8, 8);
        let vertices = [
            Vertex::new([0.0, 1.0, 0.0], [0.5, 0.0], [0.0, 0.0, -1.0]),
            Vertex::new([1.0, -1.0, 0.0], [1.0, 1.0], [0.0, 0.0, -1.0]),
            Vertex::new([-1.0, -1.0, 0.0], [0.0, 1.0], [0.0, 0.0, -1.0]),
        ];
        let mesh = Mesh::new(&mut gpu, &vertices, &[0, 1, 2]).unwrap();
        assert_eq!(mesh.vertex_count(), 3);
        assert_eq!(mesh.index_count(), 3);

        let stored = gpu.buffer_contents(mesh.vertex_buffer().id()).unwrap();
        assert_eq!(stored.len(), 3 * 44);
    }

    #[test]
    fn draw_binds_buffers_and_draws_once() {
        let mut gpu = HeadlessGpu::new(8, 8);
        let mesh = Mesh::cube(&mut gpu).unwrap();
        mesh.draw(&mut gpu);
        assert_eq!(
            gpu.commands(),
            &[
                GpuCommand::SetVertexBuffer {
                    buffer: mesh.vertex_buffer().id(),
                    stride: 44
                },
                GpuCommand::SetIndexBuffer {
                    buffer: mesh.index_buffer().id()
                },
                GpuCommand::DrawIndexed {
                    index_count: 36,
                    first_index: 0,
                    base_vertex: 0
                },
            ]
        );
    }

    #[test]
    fn empty_mesh_is_rejected() {
        let mut gpu = HeadlessGpu::new(8, 8);
        assert!(Mesh::new(&mut gpu, &[], &[]).is_err());
    }
}
