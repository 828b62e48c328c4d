//! Cubemap skybox.
//!
//! The sky is a cube mesh drawn around the camera after the opaque pass. Two
//! state overrides make that work:
//!
//! - front-face culling, because the camera sits inside the cube
//! - a less-or-equal depth test, because the sky vertex shader pins every
//!   fragment to the far plane (depth 1.0, the value the depth buffer is
//!   cleared to)
//!
//! Both are restored to the defaults once the sky is drawn.

use std::path::Path;
use std::rc::Rc;

use image::RgbaImage;

use crate::camera::Camera;
use crate::error::{GpuError, RenderError};
use crate::gpu::{
    CompareFunction, CullMode, DepthStencilDesc, DepthStencilState, Gpu, RasterizerDesc,
    RasterizerState, Sampler, ShaderResourceView, TextureDesc, TextureFormat, TextureUsage,
    ViewDimension,
};
use crate::mesh::Mesh;
use crate::render_state::{RestoreFlags, RestoreGuard};
use crate::shader::Shader;

/// The six faces of a cubemap, named so their order cannot be mixed up.
#[derive(Debug, Clone, PartialEq)]
pub struct CubemapFaces<T> {
    pub positive_x: T,
    pub negative_x: T,
    pub positive_y: T,
    pub negative_y: T,
    pub positive_z: T,
    pub negative_z: T,
}

impl<T> CubemapFaces<T> {
    /// Faces in array-slice order (+X, -X, +Y, -Y, +Z, -Z) with their names.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &T)> {
        [
            ("+X", &self.positive_x),
            ("-X", &self.negative_x),
            ("+Y", &self.positive_y),
            ("-Y", &self.negative_y),
            ("+Z", &self.positive_z),
            ("-Z", &self.negative_z),
        ]
        .into_iter()
    }

    pub fn try_map<U, E>(&self, mut f: impl FnMut(&T) -> Result<U, E>) -> Result<CubemapFaces<U>, E> {
        Ok(CubemapFaces {
            positive_x: f(&self.positive_x)?,
            negative_x: f(&self.negative_x)?,
            positive_y: f(&self.positive_y)?,
            negative_y: f(&self.negative_y)?,
            positive_z: f(&self.positive_z)?,
            negative_z: f(&self.negative_z)?,
        })
    }
}

pub struct Sky {
    mesh: Rc<Mesh>,
    cube_map: ShaderResourceView,
    sampler: Sampler,
    vertex_shader: Rc<Shader>,
    pixel_shader: Rc<Shader>,
    rasterizer: RasterizerState,
    depth_state: DepthStencilState,
}

impl Sky {
    /// `vertex_shader` must declare `view` and `projection`; `pixel_shader`
    /// must declare the `cube_map` texture and `basic_sampler`.
    pub fn new(
        gpu: &mut dyn Gpu,
        mesh: Rc<Mesh>,
        cube_map: ShaderResourceView,
        sampler: Sampler,
        vertex_shader: Rc<Shader>,
        pixel_shader: Rc<Shader>,
    ) -> Result<Self, GpuError> {
        let rasterizer = gpu.create_rasterizer_state(&RasterizerDesc {
            label: "sky rasterizer",
            cull_mode: CullMode::Front,
            ..Default::default()
        })?;
        let depth_state = gpu.create_depth_stencil_state(&DepthStencilDesc {
            label: "sky depth",
            depth_test: true,
            depth_write: true,
            compare: CompareFunction::LessEqual,
        })?;

        Ok(Self {
            mesh,
            cube_map,
            sampler,
            vertex_shader,
            pixel_shader,
            rasterizer,
            depth_state,
        })
    }

    pub fn cube_map(&self) -> &ShaderResourceView {
        &self.cube_map
    }

    pub fn set_cube_map(&mut self, cube_map: ShaderResourceView) {
        self.cube_map = cube_map;
    }

    pub fn draw(&self, gpu: &mut dyn Gpu, camera: &Camera) {
        let mut gpu = RestoreGuard::new(gpu, RestoreFlags::RASTERIZER | RestoreFlags::DEPTH_STENCIL);
        gpu.set_rasterizer_state(Some(&self.rasterizer));
        gpu.set_depth_stencil_state(Some(&self.depth_state));

        let (vs, ps) = (&self.vertex_shader, &self.pixel_shader);
        vs.set_shader(&mut *gpu);
        ps.set_shader(&mut *gpu);

        vs.set_matrix4x4("view", camera.view());
        vs.set_matrix4x4("projection", camera.projection());
        vs.copy_all_buffer_data(&mut *gpu);

        ps.set_shader_resource_view(&mut *gpu, "cube_map", Some(&self.cube_map));
        ps.set_sampler_state(&mut *gpu, "basic_sampler", &self.sampler);
        ps.copy_all_buffer_data(&mut *gpu);

        self.mesh.draw(&mut *gpu);
    }

    /// Builds a cube texture from six square RGBA faces of the same size and
    /// returns its cube view. Face `i` of [`CubemapFaces::iter`] lands in array
    /// slice `i`.
    pub fn create_cubemap(
        gpu: &mut dyn Gpu,
        faces: &CubemapFaces<RgbaImage>,
    ) -> Result<ShaderResourceView, RenderError> {
        let expected = faces.positive_x.width();
        for (face, image) in faces.iter() {
            let (width, height) = image.dimensions();
            if width != height || width != expected || width == 0 {
                return Err(RenderError::CubemapFace {
                    face,
                    width,
                    height,
                    expected,
                });
            }
        }

        let cube = gpu.create_texture(
            &TextureDesc {
                label: "cubemap",
                width: expected,
                height: expected,
                array_layers: 6,
                format: TextureFormat::Rgba8UnormSrgb,
                usage: TextureUsage::SHADER_RESOURCE | TextureUsage::COPY_DST,
                cube_compatible: true,
            },
            None,
        )?;

        for (slice, (face, image)) in faces.iter().enumerate() {
            let label = format!("cubemap face {}", face);
            let staging = gpu.create_texture(
                &TextureDesc {
                    label: &label,
                    width: expected,
                    height: expected,
                    array_layers: 1,
                    format: TextureFormat::Rgba8UnormSrgb,
                    usage: TextureUsage::COPY_SRC,
                    cube_compatible: false,
                },
                Some(image.as_raw()),
            )?;
            gpu.copy_texture_to_array_slice(&staging, &cube, slice as u32);
        }

        Ok(gpu.create_shader_resource_view(&cube, ViewDimension::Cube)?)
    }

    /// Loads the six faces from image files and builds a cubemap from them.
    pub fn load_cubemap<P: AsRef<Path>>(
        gpu: &mut dyn Gpu,
        paths: &CubemapFaces<P>,
    ) -> Result<ShaderResourceView, RenderError> {
        let faces = paths.try_map(|path| -> Result<RgbaImage, RenderError> {
            Ok(image::open(path.as_ref())?.to_rgba8())
        })?;
        log::debug!("loaded cubemap faces ({}px)", faces.positive_x.width());
        Self::create_cubemap(gpu, &faces)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::ResourceId;
    use crate::headless::{GpuCommand, HeadlessGpu, ResourceEvent};
    use std::collections::HashMap;

    fn faces(size: u32) -> CubemapFaces<RgbaImage> {
        let face = |shade: u8| RgbaImage::from_pixel(size, size, image::Rgba([shade, 0, 0, 255]));
        CubemapFaces {
            positive_x: face(0),
            negative_x: face(1),
            positive_y: face(2),
            negative_y: face(3),
            positive_z: face(4),
            negative_z: face(5),
        }
    }

    #[test]
    fn faces_copied_in_fixed_order() {
        let mut gpu = HeadlessGpu::new(8, 8);
        let srv = Sky::create_cubemap(&mut gpu, &faces(4)).unwrap();

        // Staging faces are released once copied, so labels come from the event log.
        let labels: HashMap<ResourceId, String> = gpu
            .events()
            .into_iter()
            .filter_map(|e| match e {
                ResourceEvent::Created { id, label, .. } => Some((id, label)),
                _ => None,
            })
            .collect();
        let copies: Vec<(String, u32)> = gpu
            .commands()
            .iter()
            .filter_map(|c| match c {
                GpuCommand::CopyTextureToArraySlice {
                    source, array_slice, ..
                } => Some((labels[source].clone(), *array_slice)),
                _ => None,
            })
            .collect();
        let expected: Vec<(String, u32)> = ["+X", "-X", "+Y", "-Y", "+Z", "-Z"]
            .iter()
            .enumerate()
            .map(|(i, f)| (format!("cubemap face {}", f), i as u32))
            .collect();
        assert_eq!(copies, expected);

        let info = gpu.texture_info(srv.id()).unwrap();
        assert_eq!(info.array_layers, 6);
        assert!(info.cube_compatible);
    }

    #[test]
    fn non_square_face_rejected() {
        let mut gpu = HeadlessGpu::new(8, 8);
        let mut faces = faces(4);
        faces.negative_y = RgbaImage::new(4, 2);
        let err = Sky::create_cubemap(&mut gpu, &faces).unwrap_err();
        assert!(matches!(
            err,
            RenderError::CubemapFace { face: "-Y", width: 4, height: 2, expected: 4 }
        ));
    }

    #[test]
    fn mismatched_face_rejected() {
        let mut gpu = HeadlessGpu::new(8, 8);
        let mut faces = faces(4);
        faces.positive_z = RgbaImage::new(8, 8);
        assert!(matches!(
            Sky::create_cubemap(&mut gpu, &faces),
            Err(RenderError::CubemapFace { face: "+Z", .. })
        ));
    }
}
