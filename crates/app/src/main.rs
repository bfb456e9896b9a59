//! Shadow map viewer.
//!
//! Renders a glTF scene lit by one shadow-casting light.
//!
//! ```text
//! shadowmap [scene.gltf|scene.glb]
//! ```
//!
//! Settings come from `config.toml` in the working directory, when present.
//! A scene path on the command line overrides `[scene] path`.

mod controls;

use std::path::PathBuf;

use anyhow::{Context, Result};
use glam::Vec3;
use tracing::{error, info, warn};

use renderer_core::{Config, Timer};
use renderer_platform::{
    ActiveEventLoop, ApplicationHandler, ControlFlow, DeviceEvent, DeviceId, EventLoop,
    InputState, MouseScrollDelta, PhysicalKey, Window, WindowEvent, WindowId,
};
use renderer_renderer::{FrameView, Renderer, RendererConfig};
use renderer_scene::{Camera, ShadowLight};

use crate::controls::{ControlTarget, Controls};

const CONFIG_PATH: &str = "config.toml";

/// Pixel scroll (touchpads) converted to lines.
const PIXELS_PER_SCROLL_LINE: f64 = 20.0;

struct App {
    config: Config,
    // Dropped before the window.
    renderer: Option<Renderer>,
    window: Option<Window>,
    input: InputState,
    timer: Timer,
    controls: Controls,
    camera: Camera,
    light: ShadowLight,
    /// Set when the loop stopped because of an error.
    failure: Option<anyhow::Error>,
}

impl App {
    fn new(config: Config) -> Self {
        let light = ShadowLight::new(
            Camera::looking_at(Vec3::new(4.0, 4.0, 4.0), Vec3::ZERO),
            config.light.radius,
            config.light.target_distance,
            config.light.perspective,
        );

        Self {
            renderer: None,
            window: None,
            input: InputState::new(),
            timer: Timer::new(),
            controls: Controls::new(config.camera.clone()),
            camera: Camera::looking_at(Vec3::new(0.0, 0.0, 4.0), Vec3::ZERO),
            light,
            failure: None,
            config,
        }
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let settings = &self.config.window;
        let window = Window::new(event_loop, settings.width, settings.height, &settings.title)
            .context("Failed to create window")?;
        let renderer = Renderer::new(&window, &self.config, RendererConfig::default())
            .context("Failed to create renderer")?;

        let bounds = renderer.scene_bounds();
        info!(
            "Scene bounds: center {:?}, extent {:?}",
            bounds.center(),
            bounds.extent()
        );
        info!("Initialization complete, entering main loop");
        self.renderer = Some(renderer);
        self.window = Some(window);
        self.adopt_scene_camera();
        Ok(())
    }

    /// Moves the main camera to the first camera of the loaded scene, if any.
    fn adopt_scene_camera(&mut self) {
        let Some(scene_camera) = self
            .renderer
            .as_ref()
            .and_then(|renderer| renderer.scene_cameras().first())
        else {
            return;
        };
        info!(
            "Using scene camera '{}'",
            scene_camera.name.as_deref().unwrap_or("unnamed")
        );
        self.camera = Camera::from_scene_camera(scene_camera);
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        error!("{:#}", err);
        self.failure = Some(err);
        event_loop.exit();
    }

    fn frame(&mut self, event_loop: &ActiveEventLoop) {
        let (Some(window), Some(renderer)) = (self.window.as_mut(), self.renderer.as_mut()) else {
            return;
        };

        let dt = self.timer.delta_secs();
        let actions = self.controls.actions(&self.input);

        if actions.quit {
            info!("Escape pressed, shutting down");
            event_loop.exit();
            return;
        }
        if actions.toggle_capture {
            window.set_cursor_captured(!window.is_cursor_captured());
        }
        if actions.toggle_debug_quad {
            renderer.toggle_debug_quad();
        }
        if actions.toggle_light_projection {
            self.light.toggle_projection();
            info!(
                "Light projection: {}",
                if self.light.perspective { "perspective" } else { "orthographic" }
            );
        }
        if actions.toggle_light_color {
            renderer.toggle_light_color_animation();
        }
        if actions.reload_shaders
            && let Err(e) = renderer.reload_shaders()
        {
            warn!("Shader reload failed, keeping current pipelines: {}", e);
        }

        let camera = match self.controls.target() {
            ControlTarget::Main => &mut self.camera,
            ControlTarget::Light => &mut self.light.camera,
        };
        self.controls
            .update_camera(&self.input, camera, dt, window.is_cursor_captured());
        self.input.end_frame();

        let view = FrameView {
            camera: &self.camera,
            light: &self.light,
        };
        match renderer.draw_frame(view, dt) {
            Ok(()) => {}
            Err(e) if e.is_fatal() => {
                self.fail(event_loop, anyhow::Error::new(e).context("Fatal render error"));
                return;
            }
            Err(e) => warn!("Frame dropped: {}", e),
        }

        if let Some(fps) = self.timer.frame_rate() {
            let title = format!("{} - {:.0} fps", self.config.window.title, fps);
            window.inner().set_title(&title);
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none()
            && let Err(e) = self.init(event_loop)
        {
            self.fail(event_loop, e);
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested, shutting down");
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(window) = self.window.as_mut() {
                    window.resize(size.width, size.height);
                }
                if let Some(renderer) = self.renderer.as_mut() {
                    renderer.resize(size.width, size.height);
                }
            }
            WindowEvent::Focused(false) => {
                self.input.on_focus_lost();
                if let Some(window) = self.window.as_mut()
                    && window.is_cursor_captured()
                {
                    window.set_cursor_captured(false);
                }
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(key) = event.physical_key {
                    self.input.on_key(key, event.state.is_pressed());
                }
            }
            WindowEvent::MouseInput { state, button, .. } => {
                self.input.on_mouse_button(button.into(), state.is_pressed());
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.input
                    .on_cursor_moved(position.x as f32, position.y as f32);
            }
            WindowEvent::MouseWheel { delta, .. } => match delta {
                MouseScrollDelta::LineDelta(x, y) => self.input.on_scroll(x, y),
                MouseScrollDelta::PixelDelta(p) => self.input.on_scroll(
                    (p.x / PIXELS_PER_SCROLL_LINE) as f32,
                    (p.y / PIXELS_PER_SCROLL_LINE) as f32,
                ),
            },
            WindowEvent::DroppedFile(path) => {
                let loaded = self
                    .renderer
                    .as_mut()
                    .is_some_and(|renderer| renderer.load_scene(&path));
                if loaded {
                    info!("Loaded dropped scene {}", path.display());
                    self.adopt_scene_camera();
                }
            }
            WindowEvent::RedrawRequested => self.frame(event_loop),
            _ => {}
        }
    }

    fn device_event(&mut self, _event_loop: &ActiveEventLoop, _id: DeviceId, event: DeviceEvent) {
        if let DeviceEvent::MouseMotion { delta: (dx, dy) } = event {
            self.input.on_mouse_motion(dx as f32, dy as f32);
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = self.window.as_ref() {
            window.request_redraw();
        }
    }
}

fn main() -> Result<()> {
    renderer_core::init_logging();
    info!("Starting shadow map viewer");

    let mut config = Config::load(CONFIG_PATH)?;
    if let Some(path) = std::env::args_os().nth(1) {
        config.scene.path = Some(PathBuf::from(path));
    }

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    match app.failure.take() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
