//! Multipass renderer demo.
//!
//! Renders a cube (or a configured OBJ mesh) over a ground grid through the
//! shadow, multi-sampled color and post-process passes. See `controls` for
//! the key bindings.

mod controls;

use std::time::Duration;

use anyhow::{Context, Result};
use multipass_core::{Config, FrameTimer};
use multipass_platform::{InputState, KeyCode, MouseButton, Window};
use multipass_renderer::{FrameOrchestrator, Renderer};
use tracing::{error, info};
use winit::application::ApplicationHandler;
use winit::event::{ElementState, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::PhysicalKey;
use winit::window::WindowId;

use crate::controls::{Action, SceneState};

const STATS_INTERVAL: Duration = Duration::from_secs(2);

/// Everything that exists while the window is open. The renderer drops
/// before the window its surface belongs to.
struct Running {
    renderer: Renderer,
    window: Window,
    scene: SceneState,
    orchestrator: FrameOrchestrator,
}

impl Running {
    fn new(event_loop: &ActiveEventLoop, config: &Config) -> Result<Self> {
        let window = Window::new(
            event_loop,
            config.window.width,
            config.window.height,
            &config.window.title,
        )
        .context("failed to create window")?;
        let renderer = Renderer::new(&window, config).context("failed to initialize renderer")?;
        let scene = SceneState::new(window.aspect_ratio());

        Ok(Self {
            renderer,
            window,
            scene,
            orchestrator: FrameOrchestrator::new(config.sync.max_consecutive_skipped_frames),
        })
    }

    fn apply(&mut self, action: Action) {
        match action {
            Action::Lighting(mode) => self.renderer.set_lighting_mode(mode),
            Action::PostProcess(mode) => self.renderer.set_post_process_mode(mode),
            Action::ToggleMsaaInput => {
                let enabled = !self.renderer.msaa_input();
                self.renderer.set_msaa_input(enabled);
            }
        }
    }
}

struct App {
    config: Config,
    running: Option<Running>,
    input: InputState,
    timer: FrameTimer,
    /// Why the loop stopped, if it did not stop cleanly.
    failure: Option<anyhow::Error>,
}

impl App {
    fn new(config: Config) -> Self {
        Self {
            config,
            running: None,
            input: InputState::new(),
            timer: FrameTimer::new(STATS_INTERVAL),
            failure: None,
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        error!("{:#}", err);
        self.failure = Some(err);
        event_loop.exit();
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        let Some(running) = self.running.as_mut() else {
            return;
        };

        for action in running.scene.apply_input(&self.input) {
            running.apply(action);
        }
        self.input.begin_frame();
        running.scene.advance();

        let frame = running.scene.frame_scene();
        if let Err(e) = running.orchestrator.run_frame(&mut running.renderer, &frame) {
            self.fail(event_loop, anyhow::Error::new(e).context("frame loop stopped"));
            return;
        }

        self.timer.tick();
        if let Some(stats) = self.timer.take_report() {
            info!(
                "{:.3} ms/frame ({:.1} FPS), {} skipped so far",
                stats.avg_frame_ms,
                stats.fps,
                running.orchestrator.skipped()
            );
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.running.is_some() {
            return;
        }
        match Running::new(event_loop, &self.config) {
            Ok(running) => {
                info!("Initialization complete, entering main loop");
                self.running = Some(running);
            }
            Err(e) => self.fail(event_loop, e),
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested, shutting down");
                event_loop.exit();
            }
            WindowEvent::KeyboardInput { event, .. } => {
                let PhysicalKey::Code(key) = event.physical_key else {
                    return;
                };
                match event.state {
                    ElementState::Pressed if key == KeyCode::Escape => event_loop.exit(),
                    ElementState::Pressed => self.input.on_key_pressed(key),
                    ElementState::Released => self.input.on_key_released(key),
                }
            }
            WindowEvent::MouseInput { state, button, .. } => {
                if let Some(button) = MouseButton::from_winit(button) {
                    match state {
                        ElementState::Pressed => self.input.on_mouse_pressed(button),
                        ElementState::Released => self.input.on_mouse_released(button),
                    }
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.input
                    .on_mouse_moved(position.x as f32, position.y as f32);
            }
            WindowEvent::Focused(false) => self.input.release_all(),
            WindowEvent::RedrawRequested => self.redraw(event_loop),
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(running) = &self.running {
            running.window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(running) = self.running.take() {
            info!(
                "Rendered {} frames, {} skipped",
                running.orchestrator.presented(),
                running.orchestrator.skipped()
            );
        }
    }
}

fn main() -> Result<()> {
    multipass_core::init_logging();
    let config = Config::discover().context("failed to load configuration")?;
    info!("Starting multipass renderer");

    let event_loop = EventLoop::new().context("failed to create event loop")?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    match app.failure.take() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
