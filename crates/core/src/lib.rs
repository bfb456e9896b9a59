//! Shared foundations of the renderer crates:
//! - Error type and result alias
//! - Logging initialization
//! - Frame timer
//! - TOML configuration

mod config;
mod error;
mod logging;
mod timer;

pub use config::{
    CameraConfig, Config, FRAMES_IN_FLIGHT_RANGE, LightConfig, RendererSettings, SceneConfig,
    WindowConfig,
};
pub use error::{Error, Result};
pub use logging::init_logging;
pub use timer::Timer;
