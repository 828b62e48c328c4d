//! Windowed demo: lit, shadowed entities under a procedural sky, with
//! switchable post-processing.
//!
//! Controls: WASD move, Space/X rise and sink, hold the left mouse button to
//! look around, Q/E switch cameras, 1-4 switch post-processing, Esc quits. An optional first
//! argument names a TOML file overriding the renderer config.

use std::error::Error;
use std::f32::consts::TAU;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Instant;

use image::{Rgba, RgbaImage};
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

use lantern::{
    AddressMode, BuiltinShader, Camera, CameraInput, CubemapFaces, Entity, Filter, Gpu,
    ImageTexture, InputState, Key, Light, Material, Mesh, PostProcess, PostProcessManager,
    RenderError, Renderer, RendererConfig, SamplerDesc, Scene, Sky, Vec2, Vec3, Vec4, WgpuGpu,
};

const SKY_FACE_SIZE: u32 = 128;

/// Everything that needs a live device.
struct DemoState {
    gpu: WgpuGpu,
    renderer: Renderer,
    scene: Scene,
    cameras: Vec<Camera>,
    active_camera: usize,
    spinners: Vec<usize>,
}

struct Demo {
    config: RendererConfig,
    window: Option<Arc<Window>>,
    state: Option<DemoState>,
    input: InputState,
    start_time: Instant,
    last_frame: Instant,
}

impl Demo {
    fn new(config: RendererConfig) -> Self {
        Self {
            config,
            window: None,
            state: None,
            input: InputState::new(),
            start_time: Instant::now(),
            last_frame: Instant::now(),
        }
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        let Some(state) = &mut self.state else {
            return;
        };
        let now = Instant::now();
        let dt = (now - self.last_frame).as_secs_f32();
        self.last_frame = now;

        if self.input.key_down(Key::Escape) {
            event_loop.exit();
            return;
        }
        state.select_effect(&self.input);
        state.select_camera(&self.input);
        state.cameras[state.active_camera].update(dt, &self.input);
        for &index in &state.spinners {
            state.scene.entities[index]
                .transform_mut()
                .rotate(Vec3::new(0.0, dt * 0.5, 0.0));
        }
        self.input.begin_frame();

        let total_time = self.start_time.elapsed().as_secs_f32();
        if let Err(e) = state
            .renderer
            .draw_frame(
                &mut state.gpu,
                &state.scene,
                &state.cameras[state.active_camera],
                total_time,
            )
        {
            log::error!("frame failed: {}", e);
        }
    }
}

impl ApplicationHandler for Demo {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        let attributes = Window::default_attributes().with_title("Lantern");
        let window = match event_loop.create_window(attributes) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                log::error!("failed to create window: {}", e);
                event_loop.exit();
                return;
            }
        };

        match DemoState::new(window.clone(), self.config.clone()) {
            Ok(state) => {
                self.state = Some(state);
                self.window = Some(window);
                self.last_frame = Instant::now();
            }
            Err(e) => {
                log::error!("failed to set up the demo: {}", e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        self.input.handle_event(&event);

        match event {
            WindowEvent::CloseRequested => {
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(state) = &mut self.state {
                    if let Err(e) = state.renderer.on_resize(
                        &mut state.gpu,
                        size.width,
                        size.height,
                        &mut state.cameras,
                    ) {
                        log::error!("resize failed: {}", e);
                    }
                }
            }
            WindowEvent::RedrawRequested => {
                self.redraw(event_loop);
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }
}

impl DemoState {
    fn new(window: Arc<Window>, config: RendererConfig) -> Result<Self, RenderError> {
        let mut gpu = WgpuGpu::new(window)?;

        let vs = BuiltinShader::BasicVertex.create(&mut gpu)?;
        let ps = BuiltinShader::BasicPixel.create(&mut gpu)?;
        let normal_ps = BuiltinShader::NormalMapPixel.create(&mut gpu)?;

        let sampler = gpu.create_sampler(&SamplerDesc {
            label: "anisotropic wrap",
            address_mode: AddressMode::Wrap,
            filter: Filter::Anisotropic,
            max_anisotropy: 16,
            comparison: None,
            border_color: [0.0; 4],
        })?;

        let floor_texture = ImageTexture::noise(&mut gpu, 256, 7, [96, 110, 88])?;
        let checker = ImageTexture::checkerboard(&mut gpu, 256, 8, [230, 230, 230, 255], [40, 40, 48, 255])?;
        let ripples = ripple_normal_map(&mut gpu, 256)?;

        let material = |texture: &ImageTexture, ps: &Rc<lantern::Shader>, tint: Vec4| {
            let mut material = Material::new(vs.clone(), ps.clone(), tint);
            material.add_texture_srv("surface_texture", texture.view().clone());
            material.add_sampler("basic_sampler", sampler.clone());
            material
        };

        let floor = material(&floor_texture, &ps, Vec4::ONE)
            .with_roughness(0.9)
            .with_uv_transform(Vec2::splat(4.0), Vec2::ZERO);
        let crate_material = material(&checker, &ps, Vec4::new(1.0, 0.8, 0.6, 1.0)).with_roughness(0.4);
        let mut rippled = material(&checker, &normal_ps, Vec4::new(0.6, 0.8, 1.0, 1.0)).with_roughness(0.1);
        rippled.add_texture_srv("normal_map", ripples.view().clone());

        let plane = Rc::new(Mesh::plane(&mut gpu, 20.0)?);
        let cube = Rc::new(Mesh::cube(&mut gpu)?);
        let sphere = Rc::new(Mesh::sphere(&mut gpu, 32, 16)?);

        let mut renderer = Renderer::new(config);
        let mut scene = renderer.new_scene();

        scene
            .add_entity(Entity::new(plane, floor))
            .transform_mut()
            .set_position(Vec3::new(0.0, -1.0, 0.0));

        let mut spinners = Vec::new();
        for i in 0..5 {
            let angle = i as f32 / 5.0 * TAU;
            let entity = scene.add_entity(Entity::new(cube.clone(), crate_material.clone()));
            entity
                .transform_mut()
                .set_position(Vec3::new(angle.cos() * 4.0, 0.0, angle.sin() * 4.0 + 6.0));
            entity.transform_mut().set_rotation(Vec3::new(0.0, angle, 0.0));
            spinners.push(scene.entities.len() - 1);
        }
        let ball = scene.add_entity(Entity::new(sphere, rippled));
        ball.transform_mut().set_position(Vec3::new(0.0, 0.5, 6.0));
        ball.transform_mut().set_scale(Vec3::splat(2.0));

        let sun = Vec3::new(0.5, -1.0, 0.8);
        scene.add_light(Light::directional(sun, Vec3::new(1.0, 0.95, 0.8), 1.0));
        scene.add_light(Light::point(Vec3::new(-3.0, 1.5, 3.0), 8.0, Vec3::new(1.0, 0.3, 0.2), 2.0));
        scene.add_light(Light::spot(
            Vec3::new(3.0, 4.0, 6.0),
            Vec3::new(-0.3, -1.0, 0.0),
            12.0,
            0.3,
            0.5,
            Vec3::new(0.3, 0.5, 1.0),
            3.0,
        ));

        let shadow_vertex = BuiltinShader::ShadowVertex.create(&mut gpu)?;
        renderer.enable_shadows(&mut gpu, sun, shadow_vertex)?;

        let cube_map = Sky::create_cubemap(&mut gpu, &gradient_sky(SKY_FACE_SIZE))?;
        let sky_vertex = BuiltinShader::SkyVertex.create(&mut gpu)?;
        let sky_pixel = BuiltinShader::SkyPixel.create(&mut gpu)?;
        let sky = Sky::new(
            &mut gpu,
            cube.clone(),
            cube_map,
            sampler.clone(),
            sky_vertex,
            sky_pixel,
        )?;
        renderer.set_sky(Some(sky));

        let fullscreen_vertex = BuiltinShader::FullscreenVertex.create(&mut gpu)?;
        let mut post = PostProcessManager::new(&mut gpu, fullscreen_vertex)?;
        let blur = BuiltinShader::BlurPixel.create(&mut gpu)?;
        blur.set_int("blur_radius", 3);
        let posterize = BuiltinShader::PosterizePixel.create(&mut gpu)?;
        posterize.set_float("levels", 5.0);
        post.add_effect(&mut gpu, "blur", PostProcess::new(blur))?;
        post.add_effect(&mut gpu, "posterize", PostProcess::new(posterize))?;
        let invert = BuiltinShader::InvertPixel.create(&mut gpu)?;
        post.add_effect(&mut gpu, "invert", PostProcess::new(invert))?;
        renderer.set_post_process(Some(post));

        let aspect = gpu.aspect_ratio();
        let camera_config = renderer.config().camera.clone();
        let mut overhead = Camera::with_config(aspect, Vec3::new(0.0, 12.0, -2.0), &camera_config);
        overhead.transform_mut().set_rotation(Vec3::new(1.4, 0.0, 0.0));
        overhead.update_view();
        let mut wide = Camera::new(aspect, Vec3::new(-9.0, 3.0, -9.0), 90.0);
        wide.transform_mut().set_rotation(Vec3::new(0.2, std::f32::consts::FRAC_PI_4, 0.0));
        wide.update_view();
        let cameras = vec![
            Camera::with_config(aspect, Vec3::new(0.0, 1.5, -4.0), &camera_config),
            overhead,
            wide,
        ];

        log::info!(
            "demo scene: {} entities, {} lights",
            scene.entities.len(),
            scene.lights.len()
        );
        Ok(Self {
            gpu,
            renderer,
            scene,
            cameras,
            active_camera: 0,
            spinners,
        })
    }

    /// Q and E cycle through the cameras; only the active one takes input.
    fn select_camera(&mut self, input: &InputState) {
        let count = self.cameras.len();
        let next = if input.key_pressed(Key::E) {
            (self.active_camera + 1) % count
        } else if input.key_pressed(Key::Q) {
            (self.active_camera + count - 1) % count
        } else {
            return;
        };
        self.active_camera = next;
        log::info!("camera {} of {}", next + 1, count);
    }

    fn select_effect(&mut self, input: &InputState) {
        let chain: &[&str] = if input.key_pressed(Key::Digit1) {
            &[]
        } else if input.key_pressed(Key::Digit2) {
            &["blur"]
        } else if input.key_pressed(Key::Digit3) {
            &["posterize"]
        } else if input.key_pressed(Key::Digit4) {
            &["blur", "invert"]
        } else {
            return;
        };
        if let Some(post) = self.renderer.post_process_mut() {
            match post.set_chain(chain) {
                Ok(()) => log::info!("post-processing: {:?}", chain),
                Err(e) => log::warn!("{}", e),
            }
        }
    }
}

/// Sky faces shading from a warm horizon to a deep zenith.
fn gradient_sky(size: u32) -> CubemapFaces<RgbaImage> {
    let zenith = [40.0, 80.0, 160.0];
    let horizon = [200.0, 180.0, 150.0];
    let ground = [60.0, 55.0, 50.0];
    let mix = |a: [f32; 3], b: [f32; 3], t: f32| -> Rgba<u8> {
        let c = |i: usize| (a[i] + (b[i] - a[i]) * t.clamp(0.0, 1.0)) as u8;
        Rgba([c(0), c(1), c(2), 255])
    };
    // Row 0 of a side face is its top edge.
    let side = RgbaImage::from_fn(size, size, |_, y| {
        let t = 1.0 - y as f32 / (size - 1).max(1) as f32;
        if t >= 0.5 {
            mix(horizon, zenith, (t - 0.5) * 2.0)
        } else {
            mix(ground, horizon, t * 2.0)
        }
    });
    CubemapFaces {
        positive_x: side.clone(),
        negative_x: side.clone(),
        positive_y: RgbaImage::from_pixel(size, size, mix(horizon, zenith, 1.0)),
        negative_y: RgbaImage::from_pixel(size, size, mix(ground, horizon, 0.0)),
        positive_z: side.clone(),
        negative_z: side,
    }
}

/// Concentric ripples encoded as a tangent-space normal map.
fn ripple_normal_map(gpu: &mut dyn Gpu, size: u32) -> Result<ImageTexture, lantern::GpuError> {
    let mut data = Vec::with_capacity((size * size * 4) as usize);
    let center = size as f32 * 0.5;
    for y in 0..size {
        for x in 0..size {
            let offset = Vec2::new(x as f32 - center, y as f32 - center);
            let distance = offset.length().max(1e-3);
            let slope = (distance * 0.25).cos() * 0.35;
            let tilt = offset / distance * slope;
            let normal = Vec3::new(tilt.x, tilt.y, 1.0).normalize();
            let encode = |v: f32| ((v * 0.5 + 0.5) * 255.0) as u8;
            data.extend_from_slice(&[encode(normal.x), encode(normal.y), encode(normal.z), 255]);
        }
    }
    ImageTexture::from_rgba_linear(gpu, &data, size, size, "ripples")
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match std::env::args().nth(1) {
        Some(path) => {
            log::info!("loading config from {}", path);
            RendererConfig::load(&path)?
        }
        None => RendererConfig::default(),
    };

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);
    let mut demo = Demo::new(config);
    event_loop.run_app(&mut demo)?;
    Ok(())
}
