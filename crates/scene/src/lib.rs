//! CPU-side scene data.
//!
//! - Packed mesh tables over unified vertex/index arrays ([`SceneData`])
//! - Bounding boxes ([`Aabb`])
//! - The viewer [`Camera`] and the shadow-casting [`ShadowLight`]

pub mod bounds;
pub mod camera;
pub mod error;
pub mod light;
pub mod scene_data;

pub use bounds::Aabb;
pub use camera::Camera;
pub use error::{SceneError, SceneResult};
pub use light::ShadowLight;
pub use scene_data::{
    Mesh, MeshInstance, PrimitiveData, RenderElement, SceneCamera, SceneData, Topology,
};
