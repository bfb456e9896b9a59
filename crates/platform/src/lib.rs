//! Platform layer: window, Vulkan surface and input.
//!
//! - Window management via winit
//! - Surface creation via ash-window
//! - Edge-triggered keyboard and mouse state

mod input;
mod window;

pub use input::{ButtonState, InputState, KeyCode, MouseButton};
pub use window::{Surface, Window};

// Re-export winit types the application loop needs
pub use winit::application::ApplicationHandler;
pub use winit::event::{DeviceEvent, DeviceId, ElementState, MouseScrollDelta, WindowEvent};
pub use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
pub use winit::keyboard::PhysicalKey;
pub use winit::window::WindowId;
