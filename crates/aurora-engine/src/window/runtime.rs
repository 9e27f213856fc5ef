use anyhow::{Context, Result, anyhow};
use ouroboros::self_referencing;

use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

use crate::device::{GpuInit, WgpuDevice};
use crate::error::EngineError;
use crate::render::RenderEngine;
use crate::scene::Scene;
use crate::time::{FrameClock, FrameScheduler, FrameTime};

/// Window/runtime configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub title: String,
    /// Drawable size, fixed for the lifetime of the window.
    pub initial_size: LogicalSize<f64>,
    /// Target frames per second.
    pub refresh_rate: u32,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            title: "aurora".to_string(),
            initial_size: LogicalSize::new(800.0, 600.0),
            refresh_rate: 60,
        }
    }
}

/// Entry point for the runtime.
pub struct Runtime;

impl Runtime {
    /// Opens one window, initializes the engine with `scene` and renders it at
    /// the configured rate until the window closes or a frame fails.
    ///
    /// `on_frame` runs before every render and may mutate drawable contents
    /// and background offsets.
    pub fn run<F>(config: RuntimeConfig, gpu_init: GpuInit, scene: Scene, on_frame: F) -> Result<()>
    where
        F: FnMut(&mut Scene, &FrameTime) + 'static,
    {
        let scheduler = FrameScheduler::new(config.refresh_rate).context("invalid refresh rate")?;
        let event_loop = EventLoop::new().context("failed to create winit EventLoop")?;

        let mut state = AppState {
            config,
            gpu_init,
            scene,
            on_frame,
            scheduler,
            frame_clock: FrameClock::new(),
            entry: None,
            failure: None,
            exit_requested: false,
        };

        log::info!("runtime starting at {} Hz", state.config.refresh_rate);
        event_loop
            .run_app(&mut state)
            .context("winit event loop terminated with error")?;
        log::info!("runtime stopped after {} frames", state.scheduler.frames());

        match state.failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[self_referencing]
struct WindowEntry {
    window: Window,

    #[borrows(window)]
    #[covariant]
    engine: RenderEngine<WgpuDevice<'this>>,
}

struct AppState<F> {
    config: RuntimeConfig,
    gpu_init: GpuInit,
    scene: Scene,
    on_frame: F,

    scheduler: FrameScheduler,
    frame_clock: FrameClock,

    entry: Option<WindowEntry>,
    failure: Option<anyhow::Error>,
    exit_requested: bool,
}

impl<F> AppState<F>
where
    F: FnMut(&mut Scene, &FrameTime) + 'static,
{
    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        log::error!("{err:#}");
        self.failure.get_or_insert(err);
        self.request_exit(event_loop);
    }

    fn request_exit(&mut self, event_loop: &ActiveEventLoop) {
        self.exit_requested = true;
        if let Some(mut entry) = self.entry.take() {
            if let Err(e) = entry.with_engine_mut(|engine| engine.shutdown()) {
                log::warn!("engine shutdown: {e}");
            }
        }
        event_loop.exit();
    }

    fn create_window_entry(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let attrs = Window::default_attributes()
            .with_title(self.config.title.clone())
            .with_inner_size(self.config.initial_size)
            .with_resizable(false);

        let window = event_loop
            .create_window(attrs)
            .context("failed to create window")?;

        let gpu_init = self.gpu_init.clone();
        let mut entry = WindowEntry::try_new(window, |w| {
            WgpuDevice::connect(w, gpu_init)
                .map(RenderEngine::new)
                .map_err(EngineError::DeviceUnavailable)
        })?;

        let scene = &self.scene;
        entry
            .with_engine_mut(|engine| engine.init(scene))
            .context("failed to initialize scene")?;

        self.frame_clock.reset();
        self.entry = Some(entry);
        Ok(())
    }

    fn render_frame(&mut self) -> Result<()> {
        let Self { entry, scene, on_frame, scheduler, frame_clock, .. } = self;
        let Some(entry) = entry.as_mut() else {
            return Err(anyhow!("no window to render into"));
        };

        entry.with_engine_mut(|engine| {
            scheduler.step(|| {
                let ft = frame_clock.tick();
                on_frame(scene, &ft);
                engine.render(scene)
            })
        })?;
        Ok(())
    }
}

impl<F> ApplicationHandler for AppState<F>
where
    F: FnMut(&mut Scene, &FrameTime) + 'static,
{
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.entry.is_some() || self.exit_requested {
            return;
        }

        if let Err(e) = self.create_window_entry(event_loop) {
            self.fail(event_loop, e.context("failed to start renderer"));
            return;
        }

        if let Some(entry) = &self.entry {
            entry.with_window(|w| w.request_redraw());
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.exit_requested {
            event_loop.exit();
            return;
        }

        // Pacing happens inside the frame; just keep frames coming.
        event_loop.set_control_flow(ControlFlow::Wait);
        if let Some(entry) = &self.entry {
            entry.with_window(|w| w.request_redraw());
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        if self.exit_requested {
            event_loop.exit();
            return;
        }

        match event {
            WindowEvent::CloseRequested => self.request_exit(event_loop),

            WindowEvent::RedrawRequested => {
                if let Err(e) = self.render_frame() {
                    self.fail(event_loop, e);
                }
            }

            _ => {}
        }
    }
}
