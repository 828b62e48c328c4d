mod common;

use std::rc::Rc;

use image::RgbaImage;
use lantern::{
    BuiltinShader, Camera, CubemapFaces, Gpu, GpuCommand, HeadlessGpu, Light, Mesh, PostProcess,
    PostProcessManager, Renderer, RendererConfig, SamplerDesc, ShaderStage, Sky, Vec3,
    MAX_SHADER_RESOURCE_SLOTS,
};

use common::{DrawRecord, draws_with_targets, lit_entity};

fn full_renderer(gpu: &mut HeadlessGpu, cube: Rc<Mesh>) -> Renderer {
    let mut renderer = Renderer::new(RendererConfig::default());
    let shadow_vertex = BuiltinShader::ShadowVertex.create(gpu).unwrap();
    renderer
        .enable_shadows(gpu, Vec3::new(0.3, -1.0, 0.5), shadow_vertex)
        .unwrap();

    let face = RgbaImage::new(2, 2);
    let faces = CubemapFaces {
        positive_x: face.clone(),
        negative_x: face.clone(),
        positive_y: face.clone(),
        negative_y: face.clone(),
        positive_z: face.clone(),
        negative_z: face,
    };
    let cube_map = Sky::create_cubemap(gpu, &faces).unwrap();
    let sampler = gpu
        .create_sampler(&SamplerDesc {
            label: "sky",
            ..Default::default()
        })
        .unwrap();
    let sky_vertex = BuiltinShader::SkyVertex.create(gpu).unwrap();
    let sky_pixel = BuiltinShader::SkyPixel.create(gpu).unwrap();
    let sky = Sky::new(gpu, cube, cube_map, sampler, sky_vertex, sky_pixel)
    .unwrap();
    renderer.set_sky(Some(sky));

    let fullscreen_vertex = BuiltinShader::FullscreenVertex.create(gpu).unwrap();
    let mut post = PostProcessManager::new(gpu, fullscreen_vertex).unwrap();
    let blur = PostProcess::new(BuiltinShader::BlurPixel.create(gpu).unwrap());
    post.add_effect(gpu, "blur", blur).unwrap();
    post.set_active(Some("blur")).unwrap();
    renderer.set_post_process(Some(post));
    renderer
}

#[test]
fn passes_run_in_order_against_the_right_targets() {
    let mut gpu = HeadlessGpu::new(320, 240);
    let cube = Rc::new(Mesh::cube(&mut gpu).unwrap());
    let renderer = full_renderer(&mut gpu, cube.clone());

    let mut scene = renderer.new_scene();
    for x in 0..3 {
        scene
            .add_entity(lit_entity(&mut gpu, cube.clone()))
            .transform_mut()
            .set_position(Vec3::new(x as f32 * 2.0, 0.0, 5.0));
    }
    scene.add_light(Light::directional(Vec3::new(0.3, -1.0, 0.5), Vec3::ONE, 1.0));
    scene.add_light(Light::point(Vec3::Y, 5.0, Vec3::ONE, 1.0));
    let camera = Camera::new(gpu.aspect_ratio(), Vec3::ZERO, 60.0);

    gpu.clear_commands();
    renderer.draw_frame(&mut gpu, &scene, &camera, 1.5).unwrap();
    let commands = gpu.take_commands();

    let back = gpu.back_buffer().id();
    let depth = gpu.depth_buffer().id();
    let shadow_dsv = renderer.shadows().unwrap().shadow_dsv().id();
    let post_target = renderer
        .post_process()
        .unwrap()
        .effect("blur")
        .unwrap()
        .render_target()
        .unwrap()
        .id();

    let shadow = DrawRecord {
        indexed: true,
        color: None,
        depth: Some(shadow_dsv),
    };
    let main = DrawRecord {
        indexed: true,
        color: Some(post_target),
        depth: Some(depth),
    };
    let fullscreen = DrawRecord {
        indexed: false,
        color: Some(back),
        depth: None,
    };
    // three shadow casters, three lit entities, the sky, one effect
    let expected = vec![shadow, shadow, shadow, main, main, main, main, fullscreen];
    assert_eq!(draws_with_targets(&commands), expected);

    assert_eq!(
        &commands[..2],
        &[
            GpuCommand::ClearRenderTarget {
                target: back,
                color: renderer.config().clear_color,
            },
            GpuCommand::ClearDepthStencil {
                target: depth,
                depth: 1.0,
            },
        ]
    );
    let n = commands.len();
    assert_eq!(commands[n - 2], GpuCommand::Present { vsync: false });
    assert_eq!(
        commands[n - 1],
        GpuCommand::SetRenderTargets {
            color: Some(back),
            depth: Some(depth),
        }
    );
}

#[test]
fn frame_leaves_default_state_behind() {
    let mut gpu = HeadlessGpu::new(320, 240);
    let cube = Rc::new(Mesh::cube(&mut gpu).unwrap());
    let renderer = full_renderer(&mut gpu, cube.clone());
    let mut scene = renderer.new_scene();
    scene.add_entity(lit_entity(&mut gpu, cube));
    let camera = Camera::new(gpu.aspect_ratio(), Vec3::ZERO, 60.0);

    renderer.draw_frame(&mut gpu, &scene, &camera, 0.0).unwrap();

    for slot in 0..MAX_SHADER_RESOURCE_SLOTS {
        assert_eq!(gpu.bound_shader_resource(ShaderStage::Pixel, slot), None);
    }
    assert_eq!(gpu.bound_rasterizer_state(), None);
    assert_eq!(gpu.bound_depth_stencil_state(), None);
    assert_eq!(gpu.bound_viewport(), Some(gpu.window_viewport()));
    assert_eq!(gpu.bound_render_target(), Some(gpu.back_buffer().id()));
    assert_eq!(gpu.frames_presented(), 1);
}

#[test]
fn scene_parameters_reach_every_lit_shader() {
    let mut gpu = HeadlessGpu::new(64, 64);
    let cube = Rc::new(Mesh::cube(&mut gpu).unwrap());
    let renderer = full_renderer(&mut gpu, cube.clone());
    let mut scene = renderer.new_scene();
    scene.add_entity(lit_entity(&mut gpu, cube));
    scene.add_light(Light::directional(Vec3::NEG_Y, Vec3::ONE, 1.0));
    scene.add_light(Light::point(Vec3::ZERO, 3.0, Vec3::X, 2.0));
    scene.add_light(Light::point(Vec3::ONE, 3.0, Vec3::Z, 2.0));
    let camera = Camera::new(1.0, Vec3::new(0.0, 1.0, -3.0), 60.0);

    renderer.draw_frame(&mut gpu, &scene, &camera, 2.0).unwrap();

    let material = scene.entities[0].material();
    let ps = material.pixel_shader();
    let vs = material.vertex_shader();
    assert_eq!(ps.variable_data("light_count").unwrap(), 3i32.to_ne_bytes());
    let lights = ps.variable_data("lights").unwrap();
    assert_eq!(&lights[..3 * Light::SIZE], bytemuck::cast_slice::<Light, u8>(&scene.lights));
    assert_eq!(
        ps.variable_data("total_time").unwrap(),
        2.0f32.to_ne_bytes()
    );

    let shadows = renderer.shadows().unwrap();
    assert_eq!(
        vs.variable_data("light_view").unwrap(),
        bytemuck::cast_slice::<f32, u8>(&shadows.light_view().to_cols_array())
    );
}

#[test]
fn lights_past_capacity_are_dropped() {
    let mut gpu = HeadlessGpu::new(64, 64);
    let cube = Rc::new(Mesh::cube(&mut gpu).unwrap());
    let renderer = Renderer::new(RendererConfig::default());
    let mut scene = renderer.new_scene();
    scene.add_entity(lit_entity(&mut gpu, cube));
    for i in 0..(lantern::MAX_LIGHTS + 4) {
        scene.add_light(Light::point(Vec3::splat(i as f32), 1.0, Vec3::ONE, 1.0));
    }
    let camera = Camera::new(1.0, Vec3::ZERO, 60.0);

    renderer.draw_frame(&mut gpu, &scene, &camera, 0.0).unwrap();

    let ps = scene.entities[0].material().pixel_shader();
    assert_eq!(
        ps.variable_data("light_count").unwrap(),
        (lantern::MAX_LIGHTS as i32).to_ne_bytes()
    );
}
