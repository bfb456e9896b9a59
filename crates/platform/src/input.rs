//! Edge-triggered keyboard and mouse state.
//!
//! Every key and button moves through
//!
//! ```text
//! Low -> Rising -> High -> Falling -> Low
//! ```
//!
//! Events move `Low`/`Falling` to `Rising` and `Rising`/`High` to `Falling`;
//! [`InputState::end_frame`] settles `Rising` to `High` and `Falling` to
//! `Low`. A press is therefore visible as `Rising` for exactly one frame.

use std::collections::HashMap;
use std::hash::Hash;

pub use winit::keyboard::KeyCode;

/// Mouse button identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
    Other(u16),
}

impl From<winit::event::MouseButton> for MouseButton {
    fn from(button: winit::event::MouseButton) -> Self {
        match button {
            winit::event::MouseButton::Left => MouseButton::Left,
            winit::event::MouseButton::Right => MouseButton::Right,
            winit::event::MouseButton::Middle => MouseButton::Middle,
            winit::event::MouseButton::Back => MouseButton::Other(3),
            winit::event::MouseButton::Forward => MouseButton::Other(4),
            winit::event::MouseButton::Other(id) => MouseButton::Other(id),
        }
    }
}

/// Per-frame state of one button.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ButtonState {
    #[default]
    Low,
    /// Went down this frame.
    Rising,
    High,
    /// Went up this frame.
    Falling,
}

impl ButtonState {
    /// Down this frame, whether it just went down or was already held.
    #[inline]
    pub fn is_held_down(self) -> bool {
        matches!(self, ButtonState::Rising | ButtonState::High)
    }

    fn on_event(self, pressed: bool) -> Self {
        match (self, pressed) {
            (ButtonState::Low | ButtonState::Falling, true) => ButtonState::Rising,
            (ButtonState::Rising | ButtonState::High, false) => ButtonState::Falling,
            (state, _) => state,
        }
    }

    fn settle(self) -> Self {
        match self {
            ButtonState::Rising => ButtonState::High,
            ButtonState::Falling => ButtonState::Low,
            state => state,
        }
    }
}

#[derive(Debug)]
struct Buttons<K> {
    states: HashMap<K, ButtonState>,
}

impl<K> Default for Buttons<K> {
    fn default() -> Self {
        Self {
            states: HashMap::new(),
        }
    }
}

impl<K: Copy + Eq + Hash> Buttons<K> {
    fn get(&self, key: K) -> ButtonState {
        self.states.get(&key).copied().unwrap_or_default()
    }

    fn on_event(&mut self, key: K, pressed: bool) {
        let state = self.states.entry(key).or_default();
        *state = state.on_event(pressed);
    }

    fn settle(&mut self) {
        self.states.retain(|_, state| {
            *state = state.settle();
            *state != ButtonState::Low
        });
    }

    fn release_all(&mut self) {
        for state in self.states.values_mut() {
            *state = state.on_event(false);
        }
    }
}

/// Keyboard and mouse state for the current frame.
#[derive(Debug, Default)]
pub struct InputState {
    keys: Buttons<KeyCode>,
    buttons: Buttons<MouseButton>,
    cursor_position: Option<(f32, f32)>,
    /// Accumulated raw motion since the last frame.
    mouse_delta: (f32, f32),
    /// Accumulated scroll in lines since the last frame.
    scroll_delta: (f32, f32),
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Settles edges and clears per-frame deltas. Call after the frame has
    /// consumed the input.
    pub fn end_frame(&mut self) {
        self.keys.settle();
        self.buttons.settle();
        self.mouse_delta = (0.0, 0.0);
        self.scroll_delta = (0.0, 0.0);
    }

    pub fn on_key(&mut self, key: KeyCode, pressed: bool) {
        self.keys.on_event(key, pressed);
    }

    pub fn on_mouse_button(&mut self, button: MouseButton, pressed: bool) {
        self.buttons.on_event(button, pressed);
    }

    pub fn on_cursor_moved(&mut self, x: f32, y: f32) {
        self.cursor_position = Some((x, y));
    }

    /// Raw device motion; keeps working while the cursor is grabbed.
    pub fn on_mouse_motion(&mut self, dx: f32, dy: f32) {
        self.mouse_delta.0 += dx;
        self.mouse_delta.1 += dy;
    }

    pub fn on_scroll(&mut self, dx: f32, dy: f32) {
        self.scroll_delta.0 += dx;
        self.scroll_delta.1 += dy;
    }

    /// Focus lost: every held key and button goes `Falling`.
    pub fn on_focus_lost(&mut self) {
        self.keys.release_all();
        self.buttons.release_all();
    }

    #[inline]
    pub fn key(&self, key: KeyCode) -> ButtonState {
        self.keys.get(key)
    }

    #[inline]
    pub fn mouse_button(&self, button: MouseButton) -> ButtonState {
        self.buttons.get(button)
    }

    #[inline]
    pub fn is_held_down(&self, key: KeyCode) -> bool {
        self.key(key).is_held_down()
    }

    #[inline]
    pub fn is_rising(&self, key: KeyCode) -> bool {
        self.key(key) == ButtonState::Rising
    }

    #[inline]
    pub fn is_falling(&self, key: KeyCode) -> bool {
        self.key(key) == ButtonState::Falling
    }

    /// Last cursor position in window pixels, if the cursor entered the window.
    #[inline]
    pub fn cursor_position(&self) -> Option<(f32, f32)> {
        self.cursor_position
    }

    #[inline]
    pub fn mouse_delta(&self) -> (f32, f32) {
        self.mouse_delta
    }

    #[inline]
    pub fn scroll_delta(&self) -> (f32, f32) {
        self.scroll_delta
    }
}
