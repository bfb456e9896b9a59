//! Error types shared by the platform layer and the application.

use thiserror::Error;

/// Error type for platform and configuration failures.
#[derive(Error, Debug)]
pub enum Error {
    /// Surface or instance-extension failures
    #[error("Vulkan error: {0}")]
    Vulkan(String),

    /// Window creation or management errors
    #[error("Window error: {0}")]
    Window(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),
}

/// Result type alias using the shared [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
