//! RHI-specific error types.

use ash::vk;
use thiserror::Error;

/// RHI-specific error type.
#[derive(Error, Debug)]
pub enum RhiError {
    /// Vulkan API error
    #[error("Vulkan error: {0}")]
    VulkanError(vk::Result),

    /// Failed to load Vulkan
    #[error("Failed to load Vulkan: {0}")]
    LoadingError(#[from] ash::LoadingError),

    /// GPU allocator error
    #[error("Allocator error: {0}")]
    AllocatorError(#[from] gpu_allocator::AllocationError),

    /// The logical device was lost; nothing recorded against it can complete.
    #[error("Device lost")]
    DeviceLost,

    /// A fence did not signal within the wait timeout.
    #[error("Fence wait timed out after {timeout_ns} ns")]
    FenceTimeout { timeout_ns: u64 },

    /// No suitable GPU found
    #[error("No suitable GPU found")]
    NoSuitableGpu,

    /// SPIR-V loading error
    #[error("Shader error: {0}")]
    ShaderError(String),

    /// Surface creation error
    #[error("Surface error: {0}")]
    SurfaceError(String),

    /// Swapchain error
    #[error("Swapchain error: {0}")]
    SwapchainError(String),

    /// Invalid handle or argument
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    /// Pipeline creation error
    #[error("Pipeline error: {0}")]
    PipelineError(String),
}

impl From<vk::Result> for RhiError {
    fn from(result: vk::Result) -> Self {
        match result {
            vk::Result::ERROR_DEVICE_LOST => RhiError::DeviceLost,
            other => RhiError::VulkanError(other),
        }
    }
}

impl RhiError {
    /// Returns `true` for errors the renderer cannot recover from.
    ///
    /// Out-of-date and suboptimal swapchains are recoverable; acquire and
    /// present report them as values, not errors. Every other Vulkan result
    /// that surfaces as an error (surface loss, memory exhaustion, a failed
    /// command buffer begin or submit) is fatal, as are allocator failures.
    /// Shader and pipeline errors are not, so a bad shader reload can be
    /// rejected while the old pipelines stay.
    pub fn is_fatal(&self) -> bool {
        match self {
            RhiError::DeviceLost | RhiError::FenceTimeout { .. } => true,
            RhiError::VulkanError(result) => !matches!(
                *result,
                vk::Result::ERROR_OUT_OF_DATE_KHR | vk::Result::SUBOPTIMAL_KHR
            ),
            RhiError::AllocatorError(_) | RhiError::SurfaceError(_) | RhiError::SwapchainError(_) => {
                true
            }
            _ => false,
        }
    }
}

/// Result type alias for RHI operations.
pub type RhiResult<T> = std::result::Result<T, RhiError>;
