//! Error types for resource loading.

use std::path::PathBuf;

use renderer_scene::SceneError;
use thiserror::Error;

/// Error type for resource loading operations.
#[derive(Error, Debug)]
pub enum ResourceError {
    /// File not found.
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// Only `.gltf` and `.glb` files are accepted.
    #[error("Unsupported scene file extension '{extension}' for '{path}', expected .gltf or .glb")]
    UnsupportedExtension { path: PathBuf, extension: String },

    /// The glTF document or one of its buffers could not be read.
    #[error("Failed to load glTF file '{path}': {message}")]
    GltfLoad {
        /// Path to the file that failed to load.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    /// The document has no scene to traverse.
    #[error("glTF file '{0}' contains no scenes")]
    NoScene(PathBuf),

    /// A triangle primitive has no POSITION attribute.
    #[error("Mesh '{mesh}' primitive {primitive} has no position data")]
    MissingPositions { mesh: String, primitive: usize },

    /// A triangle primitive is not indexed.
    #[error("Mesh '{mesh}' primitive {primitive} has no indices")]
    MissingIndices { mesh: String, primitive: usize },

    /// An optional attribute disagrees with the position count.
    #[error("Mesh '{mesh}' primitive {primitive}: {attribute} has {found} entries, expected {expected}")]
    AttributeCount {
        mesh: String,
        primitive: usize,
        attribute: &'static str,
        found: usize,
        expected: usize,
    },

    /// The data was read but does not form a valid scene.
    #[error(transparent)]
    Scene(#[from] SceneError),
}

/// Result type alias for resource operations.
pub type ResourceResult<T> = Result<T, ResourceError>;
