use std::rc::Rc;

use crate::camera::Camera;
use crate::gpu::Gpu;
use crate::material::Material;
use crate::mesh::Mesh;
use crate::transform::Transform;

/// A drawable object: shared mesh, own material copy, own transform.
#[derive(Clone)]
pub struct Entity {
    mesh: Rc<Mesh>,
    material: Material,
    transform: Transform,
}

impl Entity {
    pub fn new(mesh: Rc<Mesh>, material: Material) -> Self {
        Self {
            mesh,
            material,
            transform: Transform::new(),
        }
    }

    pub fn mesh(&self) -> &Rc<Mesh> {
        &self.mesh
    }

    pub fn set_mesh(&mut self, mesh: Rc<Mesh>) {
        self.mesh = mesh;
    }

    pub fn material(&self) -> &Material {
        &self.material
    }

    pub fn material_mut(&mut self) -> &mut Material {
        &mut self.material
    }

    /// Replaces the material with a copy of `material`.
    pub fn set_material(&mut self, material: &Material) {
        self.material = material.clone();
    }

    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    pub fn transform_mut(&mut self) -> &mut Transform {
        &mut self.transform
    }

    /// Draws with this entity's material.
    ///
    /// Order: activate both shaders, bind material textures and samplers, stage
    /// per-object parameters, upload both shaders' constant buffers, draw. Any
    /// scene-wide parameters (lights, shadows) must already be staged on the
    /// material's shaders, since the upload here sends them along.
    pub fn draw(&self, gpu: &mut dyn Gpu, camera: &Camera, total_time: f32) {
        let vs = self.material.vertex_shader();
        let ps = self.material.pixel_shader();

        vs.set_shader(gpu);
        ps.set_shader(gpu);

        self.material.prep_for_draw(gpu);

        vs.set_matrix4x4("world", self.transform.world_matrix());
        vs.set_matrix4x4(
            "world_inverse_transpose",
            self.transform.world_inverse_transpose_matrix(),
        );
        vs.set_matrix4x4("view", camera.view());
        vs.set_matrix4x4("projection", camera.projection());

        ps.set_float4("color_tint", self.material.color_tint());
        ps.set_float("total_time", total_time);
        ps.set_float3("camera_position", camera.position());
        ps.set_float("roughness", self.material.roughness());
        ps.set_float2("uv_scale", self.material.uv_scale());
        ps.set_float2("uv_offset", self.material.uv_offset());

        vs.copy_all_buffer_data(gpu);
        ps.copy_all_buffer_data(gpu);

        self.mesh.draw(gpu);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::HeadlessGpu;
    use crate::shaders::BuiltinShader;
    use crate::texture::ImageTexture;
    use glam::Vec4;

    #[test]
    fn set_material_keeps_its_own_copy() {
        let mut gpu = HeadlessGpu::new(16, 16);
        let mesh = Rc::new(Mesh::cube(&mut gpu).unwrap());
        let vs = BuiltinShader::BasicVertex.create(&mut gpu).unwrap();
        let ps = BuiltinShader::BasicPixel.create(&mut gpu).unwrap();
        let white = ImageTexture::solid(&mut gpu, [255; 4], "white").unwrap();
        let black = ImageTexture::solid(&mut gpu, [0, 0, 0, 255], "black").unwrap();

        let mut source = Material::new(vs.clone(), ps.clone(), Vec4::ONE);
        source.add_texture_srv("surface_texture", white.view().clone());
        let mut entity = Entity::new(mesh, Material::new(vs, ps, Vec4::ZERO));
        entity.set_material(&source);

        source.set_color_tint(Vec4::new(1.0, 0.0, 0.0, 1.0));
        source.add_texture_srv("surface_texture", black.view().clone());

        assert_eq!(entity.material().color_tint(), Vec4::ONE);
        assert_eq!(
            entity.material().texture_srv("surface_texture").unwrap().id(),
            white.view().id()
        );
        assert_eq!(
            source.texture_srv("surface_texture").unwrap().id(),
            black.view().id()
        );
    }
}
