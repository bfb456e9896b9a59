//! Asset loading.
//!
//! Turns glTF 2.0 files into [`renderer_scene::SceneData`] ready for upload.

pub mod error;
pub mod gltf_loader;

pub use error::{ResourceError, ResourceResult};
pub use gltf_loader::{LoadedScene, load_scene};
