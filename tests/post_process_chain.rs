use std::collections::HashSet;

use lantern::{
    BuiltinShader, Camera, Gpu, GpuCommand, HeadlessGpu, PostProcess, PostProcessManager,
    RenderError, Renderer, RendererConfig, ResourceEvent, Vec3,
};

fn manager(gpu: &mut HeadlessGpu, effects: &[&str]) -> PostProcessManager {
    let vs = BuiltinShader::FullscreenVertex.create(gpu).unwrap();
    let mut post = PostProcessManager::new(gpu, vs).unwrap();
    for name in effects {
        let ps = BuiltinShader::PosterizePixel.create(gpu).unwrap();
        post.add_effect(gpu, *name, PostProcess::new(ps)).unwrap();
    }
    post
}

#[test]
fn empty_chain_issues_nothing() {
    let mut gpu = HeadlessGpu::new(128, 64);
    let post = manager(&mut gpu, &[]);
    gpu.clear_commands();

    post.pre_render(&mut gpu, [0.0; 4]);
    post.post_render(&mut gpu);
    assert!(gpu.commands().is_empty());
}

#[test]
fn registered_but_inactive_effects_issue_nothing() {
    let mut gpu = HeadlessGpu::new(128, 64);
    let post = manager(&mut gpu, &["a", "b"]);
    assert!(!post.is_enabled());
    gpu.clear_commands();

    post.pre_render(&mut gpu, [0.0; 4]);
    post.post_render(&mut gpu);
    assert!(
        !gpu
            .commands()
            .iter()
            .any(|c| matches!(c, GpuCommand::SetRenderTargets { .. }))
    );
}

#[test]
fn chain_feeds_each_effect_into_the_next() {
    let mut gpu = HeadlessGpu::new(128, 64);
    let mut post = manager(&mut gpu, &["a", "b"]);
    post.set_chain(&["a", "b"]).unwrap();
    gpu.clear_commands();

    post.pre_render(&mut gpu, [0.0; 4]);
    post.post_render(&mut gpu);

    let a = post.effect("a").unwrap();
    let b = post.effect("b").unwrap();
    let back = gpu.back_buffer().id();
    let depth = gpu.depth_buffer().id();
    let targets: Vec<(Option<_>, Option<_>)> = gpu
        .commands()
        .iter()
        .filter_map(|c| match c {
            GpuCommand::SetRenderTargets { color, depth } => Some((*color, *depth)),
            _ => None,
        })
        .collect();
    assert_eq!(
        targets,
        vec![
            (Some(a.render_target().unwrap().id()), Some(depth)),
            (Some(b.render_target().unwrap().id()), None),
            (Some(back), None),
        ]
    );

    // each effect samples the previous output
    let inputs: Vec<_> = gpu
        .commands()
        .iter()
        .filter_map(|c| match c {
            GpuCommand::SetShaderResource { view: Some(view), .. } => Some(*view),
            _ => None,
        })
        .collect();
    assert_eq!(
        inputs,
        vec![
            a.shader_resource().unwrap().id(),
            b.shader_resource().unwrap().id(),
        ]
    );
    assert_eq!(gpu.commands().iter().filter(|c| c.is_draw()).count(), 2);
}

#[test]
fn unknown_name_in_chain_keeps_previous_chain() {
    let mut gpu = HeadlessGpu::new(128, 64);
    let mut post = manager(&mut gpu, &["a", "b"]);
    post.set_chain(&["b", "a"]).unwrap();
    let result = post.set_chain(&["a", "missing"]);
    assert!(matches!(result, Err(RenderError::UnknownEffect(name)) if name == "missing"));
    assert_eq!(post.chain(), ["b".to_string(), "a".to_string()]);
    assert_eq!(post.active(), Some("b"));

    post.set_active(None).unwrap();
    assert_eq!(post.active(), None);
}

#[test]
fn repeated_effect_never_samples_its_own_target() {
    let mut gpu = HeadlessGpu::new(128, 64);
    let mut post = manager(&mut gpu, &["blur"]);
    post.set_active(Some("blur")).unwrap();

    let result = post.set_chain(&["blur", "blur"]);
    assert!(matches!(result, Err(RenderError::DuplicateEffect(name)) if name == "blur"));
    assert_eq!(post.chain(), ["blur".to_string()]);

    gpu.clear_commands();
    post.pre_render(&mut gpu, [0.0; 4]);
    post.post_render(&mut gpu);

    let effect = post.effect("blur").unwrap();
    let own_target = effect.render_target().unwrap().id();
    let own_view = effect.shader_resource().unwrap().id();
    let mut bound = None;
    for command in gpu.commands() {
        match command {
            GpuCommand::SetRenderTargets { color, .. } => bound = *color,
            GpuCommand::SetShaderResource { view: Some(view), .. } if *view == own_view => {
                assert_ne!(bound, Some(own_target), "effect reads the target it writes");
            }
            _ => {}
        }
    }
}

#[test]
fn resize_releases_old_targets_before_creating_new_ones() {
    let mut gpu = HeadlessGpu::new(128, 64);
    let mut post = manager(&mut gpu, &["a", "b", "c"]);
    let old: HashSet<_> = ["a", "b", "c"]
        .iter()
        .flat_map(|name| {
            let effect = post.effect(name).unwrap();
            [
                effect.render_target().unwrap().id(),
                effect.shader_resource().unwrap().id(),
            ]
        })
        .collect();

    gpu.resize(256, 32).unwrap();
    gpu.clear_events();
    post.on_resize(&mut gpu).unwrap();

    let events = gpu.events();
    let last_release = events
        .iter()
        .rposition(|e| matches!(e, ResourceEvent::Released { .. }))
        .unwrap();
    let first_create = events
        .iter()
        .position(|e| matches!(e, ResourceEvent::Created { .. }))
        .unwrap();
    assert!(last_release < first_create);

    for id in &old {
        assert!(!gpu.is_live(*id));
        assert!(events.iter().any(
            |e| matches!(e, ResourceEvent::Released { id: released, .. } if released == id)
        ));
    }
    for name in ["a", "b", "c"] {
        assert_eq!(post.effect(name).unwrap().target_size(), Some((256, 32)));
    }
}

#[test]
fn renderer_resize_updates_targets_and_cameras() {
    let mut gpu = HeadlessGpu::new(128, 64);
    let post = manager(&mut gpu, &["a"]);
    let mut renderer = Renderer::new(RendererConfig::default());
    renderer.set_post_process(Some(post));
    let mut cameras = [
        Camera::new(2.0, Vec3::ZERO, 60.0),
        Camera::new(2.0, Vec3::ONE, 90.0),
    ];

    renderer.on_resize(&mut gpu, 300, 300, &mut cameras).unwrap();

    assert_eq!((gpu.width(), gpu.height()), (300, 300));
    for camera in &cameras {
        assert_eq!(camera.aspect_ratio(), 1.0);
    }
    let effect = renderer.post_process().unwrap().effect("a").unwrap();
    assert_eq!(effect.target_size(), Some((300, 300)));
}

#[test]
fn pixel_size_tracks_the_swap_chain() {
    let mut gpu = HeadlessGpu::new(200, 100);
    let mut post = manager(&mut gpu, &["a"]);
    post.set_active(Some("a")).unwrap();
    post.post_render(&mut gpu);

    let ps = post.effect("a").unwrap().pixel_shader();
    assert_eq!(
        ps.variable_data("pixel_size").unwrap(),
        bytemuck::cast_slice::<f32, u8>(&[1.0 / 200.0, 1.0 / 100.0])
    );
}
