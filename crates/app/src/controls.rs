//! Keyboard and mouse controls for the viewer.
//!
//! | input | effect |
//! |---|---|
//! | W A S D, R F | move forward/left/back/right, up/down |
//! | Shift | move faster |
//! | right mouse | toggle mouse-look |
//! | scroll | zoom |
//! | L | switch between main camera and light |
//! | Q | toggle the shadow map overlay |
//! | P | toggle light perspective/orthographic |
//! | C | toggle animated light color |
//! | B | reload shaders |
//! | Escape | quit |

use glam::Vec3;

use renderer_core::CameraConfig;
use renderer_platform::{ButtonState, InputState, KeyCode, MouseButton};
use renderer_scene::Camera;

/// Camera that movement and mouse-look apply to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ControlTarget {
    #[default]
    Main,
    Light,
}

impl ControlTarget {
    fn toggled(self) -> Self {
        match self {
            ControlTarget::Main => ControlTarget::Light,
            ControlTarget::Light => ControlTarget::Main,
        }
    }
}

/// One-shot actions triggered this frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Actions {
    pub quit: bool,
    pub toggle_capture: bool,
    pub toggle_debug_quad: bool,
    pub toggle_light_projection: bool,
    pub toggle_light_color: bool,
    pub reload_shaders: bool,
}

/// Turns input state into camera motion and actions.
#[derive(Debug)]
pub struct Controls {
    config: CameraConfig,
    target: ControlTarget,
}

impl Controls {
    pub fn new(config: CameraConfig) -> Self {
        Self {
            config,
            target: ControlTarget::default(),
        }
    }

    #[inline]
    pub fn target(&self) -> ControlTarget {
        self.target
    }

    /// Reads this frame's edges. Also flips the control target on `L`.
    pub fn actions(&mut self, input: &InputState) -> Actions {
        if input.is_rising(KeyCode::KeyL) {
            self.target = self.target.toggled();
            tracing::info!("Controlling {:?} camera", self.target);
        }

        Actions {
            quit: input.is_rising(KeyCode::Escape),
            toggle_capture: input.mouse_button(MouseButton::Right) == ButtonState::Rising,
            toggle_debug_quad: input.is_falling(KeyCode::KeyQ),
            toggle_light_projection: input.is_falling(KeyCode::KeyP),
            toggle_light_color: input.is_falling(KeyCode::KeyC),
            reload_shaders: input.is_rising(KeyCode::KeyB),
        }
    }

    /// Moves, turns and zooms `camera` for a frame of `dt` seconds.
    ///
    /// Mouse motion only turns the camera while the cursor is captured.
    pub fn update_camera(&self, input: &InputState, camera: &mut Camera, dt: f32, captured: bool) {
        let axis = |positive: KeyCode, negative: KeyCode| {
            f32::from(u8::from(input.is_held_down(positive)))
                - f32::from(u8::from(input.is_held_down(negative)))
        };

        let direction = camera.forward() * axis(KeyCode::KeyW, KeyCode::KeyS)
            + camera.right() * axis(KeyCode::KeyD, KeyCode::KeyA)
            + Vec3::Y * axis(KeyCode::KeyR, KeyCode::KeyF);

        let fast = input.is_held_down(KeyCode::ShiftLeft) || input.is_held_down(KeyCode::ShiftRight);
        let speed = if fast {
            self.config.move_speed * self.config.fast_multiplier
        } else {
            self.config.move_speed
        };
        camera.translate(direction.normalize_or_zero() * speed * dt);

        if captured {
            let (dx, dy) = input.mouse_delta();
            camera.rotate(dy * self.config.rotate_speed, dx * self.config.rotate_speed);
        }

        let (_, scroll) = input.scroll_delta();
        if scroll != 0.0 {
            camera.zoom(-scroll * self.config.zoom_sensitivity);
        }
    }
}
