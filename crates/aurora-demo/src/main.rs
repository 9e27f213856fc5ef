use std::path::PathBuf;

use anyhow::{Context, Result};

use aurora_engine::assets::{AssetError, FsAssetSource};
use aurora_engine::device::GpuInit;
use aurora_engine::logging::{LoggingConfig, init_logging};
use aurora_engine::paint::Color;
use aurora_engine::scene::{BackgroundLayer, BackgroundTile, Layer, Mesh, Scene};
use aurora_engine::time::FrameTime;
use aurora_engine::window::{Runtime, RuntimeConfig};

const TRIANGLE_SHADER: &str = include_str!("shaders/triangle.wgsl");
const BACKGROUND_SHADER: &str = include_str!("shaders/background.wgsl");

/// Background scroll speed in texture units per second.
const SCROLL_SPEED: f32 = 0.02;

fn main() {
    init_logging(LoggingConfig::default());

    if let Err(e) = run() {
        log::error!("{e:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let assets = PathBuf::from(std::env::var("AURORA_ASSETS").unwrap_or_else(|_| "assets".into()));
    let refresh_rate = match std::env::var("AURORA_FPS") {
        Ok(v) => v.parse().with_context(|| format!("AURORA_FPS={v} is not a frame rate"))?,
        Err(_) => RuntimeConfig::default().refresh_rate,
    };

    let scene = build_scene(&FsAssetSource::new(assets))?;
    let config = RuntimeConfig {
        title: "aurora".to_string(),
        refresh_rate,
        ..RuntimeConfig::default()
    };

    Runtime::run(config, GpuInit::default(), scene, animate)
}

fn build_scene(assets: &FsAssetSource) -> Result<Scene> {
    let triangle = Mesh::triangle(
        [
            -0.5, -0.5, 0.0, //
            0.5, -0.5, 0.0, //
            0.0, 0.5, 0.0,
        ],
        [
            1.0, 0.0, 0.0, //
            0.0, 1.0, 0.0, //
            0.0, 0.0, 1.0,
        ],
    );

    let mut scene = Scene::new(Color::rgba(0.95, 0.95, 0.95, 1.0))
        .with_layer(Layer::new("triangle", TRIANGLE_SHADER, TRIANGLE_SHADER).with_drawable(triangle));

    match BackgroundTile::load(assets, "tile1") {
        Ok(tile) => {
            log::info!("background tile1: {}x{}", tile.width(), tile.height());
            scene = scene.with_background(
                BackgroundLayer::new("background", BACKGROUND_SHADER, BACKGROUND_SHADER).with_tile(tile),
            );
        }
        Err(AssetError::NotFound { path }) => {
            log::warn!("no background ({} missing), drawing layers only", path.display());
        }
        Err(e) => return Err(e).context("failed to load background tile1"),
    }

    Ok(scene)
}

/// Randomizes one color channel per vertex and scrolls the background.
fn animate(scene: &mut Scene, time: &FrameTime) {
    if let Some(mesh) = scene
        .layer_mut("triangle")
        .and_then(|layer| layer.drawable_mut::<Mesh>(0))
    {
        mesh.colors[0] = fastrand::f32();
        mesh.colors[4] = fastrand::f32();
        mesh.colors[8] = fastrand::f32();
    }

    if let Some(bg) = scene.background.as_mut() {
        for tile in &mut bg.tiles {
            tile.x = (tile.x + SCROLL_SPEED * time.dt).fract();
        }
    }
}
