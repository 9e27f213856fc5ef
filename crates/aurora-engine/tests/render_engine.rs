use aurora_engine::EngineError;
use aurora_engine::device::{Call, Device, DeviceError, RecordingDevice};
use aurora_engine::paint::Color;
use aurora_engine::render::{EngineState, RenderEngine};
use aurora_engine::scene::{
    BackgroundLayer, BackgroundTile, Drawable, DrawableError, Layer, Mesh, Scene,
};
use aurora_engine::shader::ShaderStage;
use image::RgbaImage;

const VS: &str = "attribute vec3 position;\nattribute vec3 color;\nvarying vec3 vColor;\nvoid main(void) { vColor = color; }";
const FS: &str = "precision mediump float;\nvarying vec3 vColor;\nvoid main(void) { }";

const BG_VS: &str = "in vec2 position;\nin vec2 texcoord;\nuniform vec2 offset;\nvoid main(void) { }";
const BG_FS: &str = "uniform sampler2D uSampler;\nvoid main(void) { }";

/// Mesh of `triangles` triangles whose colors are all `shade`.
fn mesh(triangles: usize, shade: f32) -> Mesh {
    Mesh {
        positions: vec![0.0; triangles * 9],
        colors: vec![shade; triangles * 9],
    }
}

fn two_layer_scene() -> Scene {
    Scene::new(Color::rgba(0.95, 0.95, 0.95, 1.0))
        .with_layer(
            Layer::new("a", VS, FS)
                .with_drawable(mesh(1, 0.1))
                .with_drawable(mesh(2, 0.2)),
        )
        .with_layer(
            Layer::new("b", VS, FS)
                .with_drawable(mesh(3, 0.3))
                .with_drawable(mesh(4, 0.4)),
        )
}

fn initialized(scene: &Scene) -> RenderEngine<RecordingDevice> {
    let mut engine = RenderEngine::new(RecordingDevice::new(320, 200));
    engine.init(scene).unwrap();
    engine
}

fn draw_counts(calls: &[Call]) -> Vec<u32> {
    calls
        .iter()
        .filter_map(|c| match c {
            Call::DrawArrays { count, .. } => Some(*count),
            _ => None,
        })
        .collect()
}

// ── ordering ────────────────────────────────────────────────────────────────

#[test]
fn draws_follow_layer_then_drawable_order() {
    let scene = two_layer_scene();
    let mut engine = RenderEngine::new(RecordingDevice::new(320, 200));
    engine.init(&scene).unwrap();

    let init_calls = engine.device_mut().take_calls();
    let created: Vec<u32> = init_calls
        .iter()
        .filter_map(|c| match c {
            Call::CreateBuffer(id) => Some(*id),
            _ => None,
        })
        .collect();
    let linked: Vec<u32> = init_calls
        .iter()
        .filter_map(|c| match c {
            Call::LinkProgram(id) => Some(*id),
            _ => None,
        })
        .collect();
    assert_eq!(created.len(), 8);
    assert_eq!(linked.len(), 2);

    engine.render(&scene).unwrap();
    let frame = engine.device().calls().to_vec();

    let used: Vec<u32> = frame
        .iter()
        .filter_map(|c| match c {
            Call::UseProgram(id) => Some(*id),
            _ => None,
        })
        .collect();
    assert_eq!(used, linked);

    // Positions then colors, per drawable, in declaration order.
    let bound: Vec<u32> = frame
        .iter()
        .filter_map(|c| match c {
            Call::BindBuffer { buffer, .. } => Some(*buffer),
            _ => None,
        })
        .collect();
    assert_eq!(bound, created);

    assert_eq!(draw_counts(&frame), vec![3, 6, 9, 12]);

    // All of A's draws precede B's program switch.
    let b_switch = frame.iter().position(|c| *c == Call::UseProgram(linked[1])).unwrap();
    let draws_before: usize = frame[..b_switch]
        .iter()
        .filter(|c| matches!(c, Call::DrawArrays { .. }))
        .count();
    assert_eq!(draws_before, 2);
}

#[test]
fn per_drawable_command_sequence() {
    let scene = Scene::new(Color::WHITE)
        .with_layer(Layer::new("only", VS, FS).with_drawable(mesh(1, 0.5)));
    let mut engine = initialized(&scene);
    engine.device_mut().take_calls();

    engine.render(&scene).unwrap();
    let names: Vec<&str> = engine.device().calls().iter().map(Call::name).collect();
    assert_eq!(
        names,
        vec![
            "clear_color",
            "clear",
            "use_program",
            "bind_buffer",
            "vertex_attrib_pointer",
            "enable_vertex_attrib_array",
            "bind_buffer",
            "buffer_data",
            "vertex_attrib_pointer",
            "enable_vertex_attrib_array",
            "viewport",
            "draw_arrays",
            "flush",
        ]
    );

    let c = engine.device().consts().clone();
    let frame = engine.device().calls();
    assert!(frame.contains(&Call::Viewport { x: 0, y: 0, width: 320, height: 200 }));
    assert!(frame.contains(&Call::DrawArrays { mode: c.triangles, first: 0, count: 3 }));
    assert!(frame.iter().any(|call| matches!(
        call,
        Call::VertexAttribPointer { size: 3, stride: 0, offset: 0, normalized: false, .. }
    )));
}

#[test]
fn colors_are_reuploaded_every_frame_with_dynamic_hint() {
    let mut scene = Scene::new(Color::WHITE)
        .with_layer(Layer::new("only", VS, FS).with_drawable(mesh(1, 0.0)));
    let mut engine = initialized(&scene);
    let c = engine.device().consts().clone();
    engine.device_mut().take_calls();

    scene.layers[0].drawable_mut::<Mesh>(0).unwrap().colors[0] = 1.0;
    engine.render(&scene).unwrap();

    let uploads: Vec<(Vec<u8>, _)> = engine
        .device()
        .calls()
        .iter()
        .filter_map(|call| match call {
            Call::BufferData { bytes, usage, .. } => Some((bytes.clone(), *usage)),
            _ => None,
        })
        .collect();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].1, c.dynamic_copy);
    assert_eq!(&uploads[0].0[0..4], &1.0f32.to_le_bytes());
    assert_eq!(uploads[0].0.len(), 9 * 4);
}

#[test]
fn static_geometry_is_uploaded_once_at_init() {
    let scene = two_layer_scene();
    let mut engine = RenderEngine::new(RecordingDevice::new(320, 200));
    engine.init(&scene).unwrap();
    let c = engine.device().consts().clone();

    let static_uploads = engine
        .device()
        .calls()
        .iter()
        .filter(|call| matches!(call, Call::BufferData { usage, .. } if *usage == c.static_draw))
        .count();
    assert_eq!(static_uploads, 4);

    engine.device_mut().take_calls();
    engine.render(&scene).unwrap();
    assert!(!engine.device().calls().iter().any(
        |call| matches!(call, Call::BufferData { usage, .. } if *usage == c.static_draw)
    ));
}

#[test]
fn moved_positions_are_reuploaded_before_draw() {
    let mut scene = Scene::new(Color::WHITE)
        .with_layer(Layer::new("only", VS, FS).with_drawable(mesh(1, 0.5)));
    let mut engine = initialized(&scene);
    let c = engine.device().consts().clone();
    let static_upload = |call: &Call| match call {
        Call::BufferData { buffer, bytes, usage, .. } if *usage == c.static_draw => {
            Some((*buffer, bytes.clone()))
        }
        _ => None,
    };
    let init_calls = engine.device_mut().take_calls();
    let (positions_buffer, _) = init_calls.iter().find_map(static_upload).unwrap();

    scene.layers[0].drawable_mut::<Mesh>(0).unwrap().positions[0] = 0.75;
    engine.render(&scene).unwrap();

    let calls = engine.device_mut().take_calls();
    let uploads: Vec<(usize, u32, Vec<u8>)> = calls
        .iter()
        .enumerate()
        .filter_map(|(i, call)| static_upload(call).map(|(buffer, bytes)| (i, buffer, bytes)))
        .collect();
    assert_eq!(uploads.len(), 1);
    let (at, buffer, bytes) = &uploads[0];
    assert_eq!(*buffer, positions_buffer);
    assert_eq!(&bytes[0..4], &0.75f32.to_le_bytes());
    assert_eq!(bytes.len(), 9 * 4);
    let draw_at = calls.iter().position(|call| matches!(call, Call::DrawArrays { .. })).unwrap();
    assert!(*at < draw_at);
    assert_eq!(draw_counts(&calls), vec![3]);

    engine.render(&scene).unwrap();
    assert!(!engine.device().calls().iter().any(|call| static_upload(call).is_some()));
}

// ── clear ───────────────────────────────────────────────────────────────────

#[test]
fn one_clear_per_frame_before_any_draw() {
    let scene = two_layer_scene();
    let mut engine = initialized(&scene);
    let c = engine.device().consts().clone();

    for _ in 0..2 {
        engine.device_mut().take_calls();
        engine.render(&scene).unwrap();
        let frame = engine.device().calls();

        let clear_colors: Vec<usize> = frame
            .iter()
            .enumerate()
            .filter(|(_, call)| matches!(call, Call::ClearColor(_)))
            .map(|(i, _)| i)
            .collect();
        let clears: Vec<usize> = frame
            .iter()
            .enumerate()
            .filter(|(_, call)| matches!(call, Call::Clear(_)))
            .map(|(i, _)| i)
            .collect();
        let first_draw = frame.iter().position(|call| matches!(call, Call::DrawArrays { .. })).unwrap();

        assert_eq!(clear_colors, vec![0]);
        assert_eq!(clears, vec![1]);
        assert_eq!(frame[0], Call::ClearColor([0.95, 0.95, 0.95, 1.0]));
        assert_eq!(frame[1], Call::Clear(c.color_buffer_bit));
        assert!(clears[0] < first_draw);
    }
}

// ── compile failures ────────────────────────────────────────────────────────

fn init_error(scene: &Scene, dev: RecordingDevice) -> (EngineError, RenderEngine<RecordingDevice>) {
    let mut engine = RenderEngine::new(dev);
    let err = engine.init(scene).unwrap_err();
    (err, engine)
}

fn stage_of(err: &EngineError) -> Option<(String, ShaderStage)> {
    match err {
        EngineError::Compile { layer, source } => Some((layer.clone(), source.stage)),
        _ => None,
    }
}

#[test]
fn vertex_syntax_error_names_layer_and_stage() {
    let scene = Scene::new(Color::WHITE)
        .with_layer(Layer::new("good", VS, FS))
        .with_layer(Layer::new("bad", "void main( {", FS));
    let (err, engine) = init_error(&scene, RecordingDevice::new(8, 8));

    assert_eq!(stage_of(&err), Some(("bad".to_string(), ShaderStage::Vertex)));
    assert_eq!(engine.state(), EngineState::Uninitialized);
    assert_eq!(engine.device().live_programs(), 0);
    assert_eq!(engine.device().live_shaders(), 0);
}

#[test]
fn fragment_syntax_error_names_fragment_stage() {
    let scene = Scene::new(Color::WHITE).with_layer(Layer::new("f", VS, "void main() }{"));
    let (err, _) = init_error(&scene, RecordingDevice::new(8, 8));
    assert_eq!(stage_of(&err), Some(("f".to_string(), ShaderStage::Fragment)));
}

#[test]
fn link_failure_names_link_stage() {
    let fs = format!("// LINK_FAIL\n{FS}");
    let scene = Scene::new(Color::WHITE).with_layer(Layer::new("l", VS, fs));
    let (err, engine) = init_error(&scene, RecordingDevice::new(8, 8).fail_link_when("LINK_FAIL"));

    assert_eq!(stage_of(&err), Some(("l".to_string(), ShaderStage::Link)));
    assert!(engine.program_names().is_empty());
}

// ── init ────────────────────────────────────────────────────────────────────

#[test]
fn init_twice_resolves_same_layer_names() {
    let scene = two_layer_scene();
    let mut engine = RenderEngine::new(RecordingDevice::new(320, 200));

    engine.init(&scene).unwrap();
    let first: Vec<String> = engine.program_names().into_iter().map(String::from).collect();
    let buffers = engine.device().live_buffers();

    engine.init(&scene).unwrap();
    let second: Vec<String> = engine.program_names().into_iter().map(String::from).collect();

    assert_eq!(first, vec!["a", "b"]);
    assert_eq!(first, second);
    assert_eq!(engine.device().live_programs(), 2);
    assert_eq!(engine.device().live_buffers(), buffers);
    assert_eq!(engine.state(), EngineState::Initialized);
}

#[test]
fn mismatched_drawable_never_reaches_device() {
    let scene = Scene::new(Color::WHITE).with_layer(
        Layer::new("a", VS, FS)
            .with_drawable(mesh(1, 0.0))
            .with_drawable(Mesh { positions: vec![0.0; 9], colors: vec![0.0; 6] }),
    );
    let mut engine = RenderEngine::new(RecordingDevice::new(8, 8));

    let err = engine.init(&scene).unwrap_err();
    assert!(matches!(
        err,
        EngineError::InvalidDrawable {
            ref layer,
            index: 1,
            source: DrawableError::LengthMismatch { positions: 9, colors: 6 },
        } if layer == "a"
    ));
    assert!(engine.device().calls().is_empty());
}

#[test]
fn vertex_count_change_after_init_is_rejected_before_upload() {
    let mut scene = Scene::new(Color::WHITE)
        .with_layer(Layer::new("a", VS, FS).with_drawable(mesh(1, 0.0)));
    let mut engine = initialized(&scene);
    engine.device_mut().take_calls();

    *scene.layers[0].drawable_mut::<Mesh>(0).unwrap() = mesh(2, 0.0);
    let err = engine.render(&scene).unwrap_err();

    assert!(matches!(
        err,
        EngineError::InvalidDrawable {
            source: DrawableError::VertexCountChanged { expected: 3, actual: 6 },
            ..
        }
    ));
    assert!(engine.device().calls().is_empty());
    assert_eq!(engine.state(), EngineState::Terminated);
}

// ── frame failure ───────────────────────────────────────────────────────────

#[test]
fn device_failure_mid_frame_terminates_engine() {
    let scene = two_layer_scene();
    let mut engine = initialized(&scene);
    engine.device_mut().fail_next("draw_arrays");

    let err = engine.render(&scene).unwrap_err();
    assert!(matches!(
        err,
        EngineError::FrameRender(DeviceError::CallFailed { call: "draw_arrays", .. })
    ));
    assert_eq!(engine.state(), EngineState::Terminated);
    assert!(matches!(engine.render(&scene), Err(EngineError::NotInitialized)));
}

// ── background ──────────────────────────────────────────────────────────────

fn tile(w: u32, h: u32) -> BackgroundTile {
    let image = RgbaImage::from_raw(w, h, vec![128; (w * h * 4) as usize]).unwrap();
    BackgroundTile::from_parts("t", image, vec![0.0; (w * h * 2) as usize]).unwrap()
}

#[test]
fn background_renders_before_layers_with_offset() {
    let mut bg_tile = tile(4, 2);
    bg_tile.x = 0.25;
    bg_tile.y = -0.5;
    let scene = two_layer_scene()
        .with_background(BackgroundLayer::new("bg", BG_VS, BG_FS).with_tile(bg_tile));

    let mut engine = RenderEngine::new(RecordingDevice::new(64, 64));
    engine.init(&scene).unwrap();

    let init_calls = engine.device_mut().take_calls();
    let c = engine.device().consts().clone();
    assert!(init_calls.iter().any(|call| matches!(
        call,
        Call::TexImage2D { level: 0, width: 4, height: 2, len: 32, .. }
    )));
    assert!(init_calls.iter().any(|call| matches!(call, Call::GenerateMipmap { .. })));
    assert_eq!(engine.program_names().len(), 3);

    engine.render(&scene).unwrap();
    let frame = engine.device().calls();

    assert_eq!(draw_counts(frame), vec![6, 3, 6, 9, 12]);
    let uniform = frame
        .iter()
        .find_map(|call| match call {
            Call::Uniform2f { x, y, .. } => Some((*x, *y)),
            _ => None,
        })
        .unwrap();
    assert_eq!(uniform, (0.25, -0.5));
    assert!(frame.iter().any(|call| matches!(
        call,
        Call::VertexAttribPointer { size: 2, .. }
    )));
    let bind_texture = frame.iter().position(|call| matches!(call, Call::BindTexture { .. })).unwrap();
    let first_draw = frame.iter().position(|call| matches!(call, Call::DrawArrays { .. })).unwrap();
    assert!(bind_texture < first_draw);
    assert!(frame.contains(&Call::DrawArrays { mode: c.triangles, first: 0, count: 6 }));
}

#[test]
fn background_name_must_not_clash_with_layer() {
    let scene = two_layer_scene()
        .with_background(BackgroundLayer::new("a", BG_VS, BG_FS).with_tile(tile(1, 1)));
    let mut engine = RenderEngine::new(RecordingDevice::new(8, 8));
    assert!(matches!(engine.init(&scene), Err(EngineError::DuplicateLayer(name)) if name == "a"));
}

#[test]
fn shutdown_returns_all_device_objects() {
    let scene = two_layer_scene()
        .with_background(BackgroundLayer::new("bg", BG_VS, BG_FS).with_tile(tile(2, 2)));
    let mut engine = initialized(&scene);
    engine.render(&scene).unwrap();
    engine.shutdown().unwrap();

    let dev = engine.device();
    assert_eq!(dev.live_buffers(), 0);
    assert_eq!(dev.live_textures(), 0);
    assert_eq!(dev.live_programs(), 0);
    assert_eq!(engine.state(), EngineState::Terminated);
}

#[test]
fn drawable_trait_objects_are_accepted() {
    struct Fixed;
    impl Drawable for Fixed {
        fn positions(&self) -> &[f32] {
            &[0.0; 9]
        }
        fn colors(&self) -> &[f32] {
            &[1.0; 9]
        }
    }

    let scene = Scene::new(Color::BLACK).with_layer(Layer::new("x", VS, FS).with_drawable(Fixed));
    let mut engine = initialized(&scene);
    engine.device_mut().take_calls();
    engine.render(&scene).unwrap();
    assert_eq!(draw_counts(engine.device().calls()), vec![3]);
}
