//! Vulkan abstraction layer (Render Hardware Interface).
//!
//! A thin, safe layer over `ash` covering what the shadow-map renderer needs:
//! - Instance, physical-device selection and logical device with its allocator
//! - Buffers, depth images with explicit layout tracking, samplers
//! - Shaders, pipelines (including depth-only), descriptors
//! - Command recording with synchronization2 barriers
//! - Fences, semaphores and the swapchain
//! - Blocking staging uploads
//!
//! Every wrapper keeps an `Arc<Device>` back-reference and destroys its
//! Vulkan object in `Drop`, so resources always go away before the device.

mod error;

pub mod buffer;
pub mod command;
pub mod descriptor;
pub mod device;
pub mod image;
pub mod instance;
pub mod physical_device;
pub mod pipeline;
pub mod rendering;
pub mod sampler;
pub mod shader;
pub mod swapchain;
pub mod sync;
pub mod transfer;
pub mod vertex;

pub use error::{RhiError, RhiResult};

// Re-export ash types that users might need
pub use ash::vk;
