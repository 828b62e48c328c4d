#![allow(dead_code)]

use std::rc::Rc;

use lantern::{
    BuiltinShader, Entity, Gpu, GpuCommand, HeadlessGpu, ImageTexture, Material, Mesh, ResourceId,
    SamplerDesc, Vec4,
};

/// Entity with the lit builtin shaders, a white texture and a sampler.
pub fn lit_entity(gpu: &mut HeadlessGpu, mesh: Rc<Mesh>) -> Entity {
    Entity::new(mesh, lit_material(gpu))
}

pub fn lit_material(gpu: &mut HeadlessGpu) -> Material {
    let vs = BuiltinShader::BasicVertex.create(gpu).unwrap();
    let ps = BuiltinShader::BasicPixel.create(gpu).unwrap();
    let texture = ImageTexture::solid(gpu, [255; 4], "white").unwrap();
    let sampler = gpu
        .create_sampler(&SamplerDesc {
            label: "basic",
            ..Default::default()
        })
        .unwrap();

    let mut material = Material::new(vs, ps, Vec4::ONE);
    material.add_texture_srv("surface_texture", texture.view().clone());
    material.add_sampler("basic_sampler", sampler);
    material
}

/// What kind of draw happened and which targets were bound when it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawRecord {
    pub indexed: bool,
    pub color: Option<ResourceId>,
    pub depth: Option<ResourceId>,
}

pub fn draws_with_targets(commands: &[GpuCommand]) -> Vec<DrawRecord> {
    let mut color = None;
    let mut depth = None;
    let mut draws = Vec::new();
    for command in commands {
        match command {
            GpuCommand::SetRenderTargets { color: c, depth: d } => {
                color = *c;
                depth = *d;
            }
            GpuCommand::DrawIndexed { .. } => draws.push(DrawRecord {
                indexed: true,
                color,
                depth,
            }),
            GpuCommand::Draw { .. } => draws.push(DrawRecord {
                indexed: false,
                color,
                depth,
            }),
            _ => {}
        }
    }
    draws
}

pub fn count(commands: &[GpuCommand], wanted: &GpuCommand) -> usize {
    commands.iter().filter(|c| *c == wanted).count()
}
