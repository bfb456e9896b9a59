//! Renderer error types.

use renderer_resources::ResourceError;
use renderer_rhi::RhiError;
use renderer_scene::SceneError;
use thiserror::Error;

/// Error type for renderer setup and frame execution.
#[derive(Error, Debug)]
pub enum RendererError {
    /// GPU API failure
    #[error(transparent)]
    Rhi(#[from] RhiError),

    /// Window or surface failure
    #[error(transparent)]
    Platform(#[from] renderer_core::Error),

    /// Asset loading failure
    #[error(transparent)]
    Resource(#[from] ResourceError),

    /// Scene construction failure
    #[error(transparent)]
    Scene(#[from] SceneError),

    /// The pass graph cannot be executed
    #[error("Invalid pass graph: {0}")]
    PassGraph(String),
}

impl RendererError {
    /// Returns `true` when the renderer cannot continue.
    pub fn is_fatal(&self) -> bool {
        match self {
            RendererError::Rhi(e) => e.is_fatal(),
            _ => false,
        }
    }
}

/// Result type alias for renderer operations.
pub type RendererResult<T> = Result<T, RendererError>;
