//! Scene construction errors.

use thiserror::Error;

/// Errors raised while building [`SceneData`](crate::SceneData).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SceneError {
    /// A triangle primitive without vertices or indices.
    #[error("Mesh '{mesh}' has an empty primitive ({vertices} vertices, {indices} indices)")]
    EmptyPrimitive {
        mesh: String,
        vertices: usize,
        indices: usize,
    },

    /// An index that points past the primitive's own vertices.
    #[error("Mesh '{mesh}' references vertex {index} but the primitive has {vertex_count}")]
    IndexOutOfRange {
        mesh: String,
        index: u32,
        vertex_count: usize,
    },

    /// An instance of a mesh id that was never appended.
    #[error("Instance refers to unknown mesh {mesh_id} ({mesh_count} meshes loaded)")]
    UnknownMesh { mesh_id: u32, mesh_count: usize },

    /// The unified buffers outgrew 32-bit offsets.
    #[error("Scene exceeds 32-bit vertex/index offsets")]
    TooLarge,
}

/// Result type alias for scene operations.
pub type SceneResult<T> = std::result::Result<T, SceneError>;
