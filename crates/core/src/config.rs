//! Application configuration loaded from TOML.
//!
//! Every section and key is optional; missing values take the defaults
//! below. Unknown keys are rejected so typos do not go unnoticed.
//!
//! ```toml
//! [window]
//! width = 1280
//! height = 720
//! title = "Shadow Map"
//! vsync = true
//!
//! [renderer]
//! frames_in_flight = 2
//! shadow_map_size = 2048
//! validation = true
//!
//! [scene]
//! path = "assets/scene.gltf"
//!
//! [light]
//! radius = 5.0
//! target_distance = 20.0
//! perspective = true
//!
//! [camera]
//! move_speed = 1.0
//! fast_multiplier = 10.0
//! rotate_speed = 0.1
//! zoom_sensitivity = 0.2
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};

/// Frames in flight are clamped to this range.
pub const FRAMES_IN_FLIGHT_RANGE: std::ops::RangeInclusive<usize> = 1..=3;

/// Top-level configuration.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub window: WindowConfig,
    pub renderer: RendererSettings,
    pub scene: SceneConfig,
    pub light: LightConfig,
    pub camera: CameraConfig,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WindowConfig {
    pub width: u32,
    pub height: u32,
    pub title: String,
    pub vsync: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            title: "Shadow Map".to_string(),
            vsync: true,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RendererSettings {
    pub frames_in_flight: usize,
    pub shadow_map_size: u32,
    /// Vulkan validation layers; on in debug builds by default.
    pub validation: bool,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            frames_in_flight: 2,
            shadow_map_size: 2048,
            validation: cfg!(debug_assertions),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SceneConfig {
    /// glTF file to load at startup; the built-in triangle otherwise.
    pub path: Option<PathBuf>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LightConfig {
    pub radius: f32,
    pub target_distance: f32,
    pub perspective: bool,
}

impl Default for LightConfig {
    fn default() -> Self {
        Self {
            radius: 5.0,
            target_distance: 20.0,
            perspective: true,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CameraConfig {
    /// Units per second.
    pub move_speed: f32,
    /// Speed factor while Shift is held.
    pub fast_multiplier: f32,
    /// Degrees per pixel of mouse motion.
    pub rotate_speed: f32,
    /// Degrees of fov per scroll line.
    pub zoom_sensitivity: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            move_speed: 1.0,
            fast_multiplier: 10.0,
            rotate_speed: 0.1,
            zoom_sensitivity: 0.2,
        }
    }
}

impl Config {
    /// Loads `path`, or returns the defaults if the file does not exist.
    ///
    /// # Errors
    ///
    /// [`Error::Io`] if the file exists but cannot be read, [`Error::Config`]
    /// for malformed TOML or unknown keys.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&content)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        tracing::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Parses TOML text and normalizes the result.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] for malformed TOML or unknown keys.
    pub fn from_toml(content: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        config.normalize();
        Ok(config)
    }

    fn normalize(&mut self) {
        let requested = self.renderer.frames_in_flight;
        let clamped = requested.clamp(*FRAMES_IN_FLIGHT_RANGE.start(), *FRAMES_IN_FLIGHT_RANGE.end());
        if clamped != requested {
            tracing::warn!(
                "frames_in_flight = {} is out of range, using {}",
                requested,
                clamped
            );
            self.renderer.frames_in_flight = clamped;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.window.width, 1280);
        assert_eq!(config.window.height, 720);
        assert!(config.window.vsync);
        assert_eq!(config.renderer.frames_in_flight, 2);
        assert_eq!(config.renderer.shadow_map_size, 2048);
        assert_eq!(config.light.radius, 5.0);
        assert_eq!(config.light.target_distance, 20.0);
        assert!(config.light.perspective);
        assert_eq!(config.camera.fast_multiplier, 10.0);
        assert!(config.scene.path.is_none());
    }

    #[test]
    fn test_empty_document_is_default() {
        assert_eq!(Config::from_toml("").unwrap(), Config::default());
    }

    #[test]
    fn test_partial_sections() {
        let config = Config::from_toml(
            r#"
            [window]
            width = 640

            [scene]
            path = "assets/sponza.glb"
            "#,
        )
        .unwrap();
        assert_eq!(config.window.width, 640);
        assert_eq!(config.window.height, 720);
        assert_eq!(config.scene.path, Some(PathBuf::from("assets/sponza.glb")));
    }

    #[test]
    fn test_frames_in_flight_clamped() {
        let high = Config::from_toml("[renderer]\nframes_in_flight = 8").unwrap();
        assert_eq!(high.renderer.frames_in_flight, 3);
        let low = Config::from_toml("[renderer]\nframes_in_flight = 0").unwrap();
        assert_eq!(low.renderer.frames_in_flight, 1);
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = Config::from_toml("[window]\nwidht = 640").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(Config::from_toml("[unknown]\nx = 1").is_err());
    }

    #[test]
    fn test_malformed_toml_rejected() {
        assert!(matches!(
            Config::from_toml("[window").unwrap_err(),
            Error::Config(_)
        ));
    }

    #[test]
    fn test_missing_file_is_default() {
        let path = std::env::temp_dir().join(format!(
            "renderer_core_missing_{}.toml",
            std::process::id()
        ));
        assert_eq!(Config::load(&path).unwrap(), Config::default());
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!(
            "renderer_core_config_{}.toml",
            std::process::id()
        ));
        std::fs::write(&path, "[light]\nperspective = false\n").unwrap();
        let config = Config::load(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert!(!config.light.perspective);
    }
}
