//! Shadow-mapped frame rendering.
//!
//! This crate orchestrates one frame:
//! - Graphics context ownership and teardown order
//! - Frame pacing across slots in flight
//! - Shadow, forward and debug-quad pass recording
//! - Scene geometry upload and swapchain presentation

pub mod context;
pub mod error;
pub mod frame_sync;
pub mod pass_graph;
pub mod pipelines;
pub mod presentation;
pub mod recorder;
pub mod renderer;
pub mod scene_manager;
pub mod targets;
pub mod ubo;

pub use context::GraphicsContext;
pub use error::{RendererError, RendererResult};
pub use frame_sync::{FrameSyncController, MAX_FRAMES_IN_FLIGHT};
pub use pass_graph::{Pass, RendererConfig, Resource};
pub use presentation::{FrameAction, PresentationState, SurfaceState};
pub use recorder::CommandRecorder;
pub use renderer::{FrameView, Renderer};
pub use scene_manager::SceneManager;
