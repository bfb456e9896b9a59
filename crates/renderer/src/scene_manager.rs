//! Scene Manager: owns the loaded scene and its GPU geometry.
//!
//! A load either replaces everything (tables, cameras, vertex and index
//! buffers) or nothing. Until the first successful load the built-in
//! triangle is shown.

use std::path::Path;
use std::sync::Arc;

use tracing::{error, info, warn};

use renderer_resources::{LoadedScene, load_scene};
use renderer_rhi::RhiResult;
use renderer_rhi::buffer::{Buffer, BufferUsage};
use renderer_rhi::device::Device;
use renderer_rhi::transfer::upload_buffers;
use renderer_scene::{Aabb, SceneCamera, SceneData};

use crate::error::RendererResult;
use crate::recorder::SceneGeometry;

/// Uploads unified geometry.
pub trait GeometryUpload {
    type Buffers;

    /// Creates GPU buffers holding `scene`'s vertices and indices.
    ///
    /// When this returns, the new buffers are ready for drawing and no
    /// submitted work references buffers handed out earlier.
    fn upload(&self, scene: &SceneData) -> RhiResult<Self::Buffers>;
}

/// Device-local unified vertex and index buffers.
pub struct GeometryBuffers {
    pub vertex: Buffer,
    pub index: Buffer,
}

/// Blocking staging upload on the graphics queue.
pub struct GpuUpload {
    device: Arc<Device>,
}

impl GpuUpload {
    pub fn new(device: Arc<Device>) -> Self {
        Self { device }
    }
}

impl GeometryUpload for GpuUpload {
    type Buffers = GeometryBuffers;

    fn upload(&self, scene: &SceneData) -> RhiResult<GeometryBuffers> {
        let mut buffers = upload_buffers(
            &self.device,
            &[
                (
                    BufferUsage::Vertex,
                    bytemuck::cast_slice(scene.vertices()),
                    "scene vertices",
                ),
                (
                    BufferUsage::Index,
                    bytemuck::cast_slice(scene.indices()),
                    "scene indices",
                ),
            ],
        )?
        .into_iter();

        // Frames in flight may still read the buffers being replaced.
        self.device.wait_idle()?;

        match (buffers.next(), buffers.next()) {
            (Some(vertex), Some(index)) => Ok(GeometryBuffers { vertex, index }),
            _ => Err(renderer_rhi::RhiError::InvalidHandle(
                "Geometry upload returned too few buffers".to_string(),
            )),
        }
    }
}

/// Loaded scene plus its GPU buffers.
pub struct SceneManager<U: GeometryUpload = GpuUpload> {
    uploader: U,
    scene: SceneData,
    cameras: Vec<SceneCamera>,
    buffers: U::Buffers,
}

impl<U: GeometryUpload> SceneManager<U> {
    /// Starts with the built-in triangle.
    ///
    /// # Errors
    ///
    /// Returns an error if the triangle cannot be uploaded.
    pub fn new(uploader: U) -> RendererResult<Self> {
        let scene = SceneData::triangle();
        let buffers = uploader.upload(&scene)?;
        Ok(Self {
            uploader,
            scene,
            cameras: Vec::new(),
            buffers,
        })
    }

    /// Loads the scene at `path`, replacing the current one.
    ///
    /// Returns `false` and keeps the current scene and buffers if loading or
    /// uploading fails. The error is logged.
    pub fn load(&mut self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        match self.try_load(path) {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to load scene {}: {}", path.display(), e);
                false
            }
        }
    }

    /// Like [`load`](Self::load) but returns the error.
    ///
    /// # Errors
    ///
    /// Any asset loading or upload error. The current scene is unchanged.
    pub fn try_load(&mut self, path: &Path) -> RendererResult<()> {
        let loaded = load_scene(path)?;
        self.replace(loaded)?;
        info!(
            "Scene {}: {} vertices, {} indices, {} elements, {} instances",
            path.display(),
            self.scene.vertices().len(),
            self.scene.indices().len(),
            self.scene.render_elements().len(),
            self.scene.instances().len()
        );
        Ok(())
    }

    /// Uploads `loaded` and swaps it in. Nothing changes on error.
    ///
    /// # Errors
    ///
    /// Returns an error if the upload fails.
    pub fn replace(&mut self, loaded: LoadedScene) -> RendererResult<()> {
        let LoadedScene { data, cameras } = loaded;
        let data = if data.is_empty() {
            warn!("Scene has nothing to draw, showing the built-in triangle");
            SceneData::triangle()
        } else {
            data
        };

        let buffers = self.uploader.upload(&data)?;
        self.buffers = buffers;
        self.scene = data;
        self.cameras = cameras;
        Ok(())
    }

    #[inline]
    pub fn scene(&self) -> &SceneData {
        &self.scene
    }

    #[inline]
    pub fn cameras(&self) -> &[SceneCamera] {
        &self.cameras
    }

    #[inline]
    pub fn bounds(&self) -> Aabb {
        self.scene.bounds()
    }

    #[inline]
    pub fn buffers(&self) -> &U::Buffers {
        &self.buffers
    }
}

impl SceneManager<GpuUpload> {
    /// Geometry handles for the recorder.
    pub fn geometry(&self) -> SceneGeometry<'_> {
        SceneGeometry {
            scene: &self.scene,
            vertex_buffer: self.buffers.vertex.handle(),
            index_buffer: self.buffers.index.handle(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Mat4, Vec2, Vec3};
    use renderer_rhi::RhiError;
    use renderer_rhi::vertex::Vertex;
    use renderer_scene::PrimitiveData;
    use std::cell::Cell;
    use std::path::PathBuf;

    /// Hands out increasing generation numbers; fails on request.
    #[derive(Default)]
    struct FakeUpload {
        next: Cell<u32>,
        fail: Cell<bool>,
    }

    #[derive(Debug, PartialEq)]
    struct FakeBuffers {
        generation: u32,
        vertex_bytes: usize,
        index_bytes: usize,
    }

    impl GeometryUpload for FakeUpload {
        type Buffers = FakeBuffers;

        fn upload(&self, scene: &SceneData) -> RhiResult<FakeBuffers> {
            if self.fail.get() {
                return Err(RhiError::DeviceLost);
            }
            let generation = self.next.get();
            self.next.set(generation + 1);
            Ok(FakeBuffers {
                generation,
                vertex_bytes: std::mem::size_of_val(scene.vertices()),
                index_bytes: std::mem::size_of_val(scene.indices()),
            })
        }
    }

    fn quad_scene() -> LoadedScene {
        let v = |x: f32, y: f32| Vertex::from_attributes(Vec3::new(x, y, 0.0), Vec3::Z, Vec2::ZERO, Vec3::X);
        let mut data = SceneData::new();
        let mesh = data
            .append_mesh(
                "quad",
                vec![PrimitiveData::triangles(
                    vec![v(0.0, 0.0), v(1.0, 0.0), v(1.0, 1.0), v(0.0, 1.0)],
                    vec![0, 1, 2, 0, 2, 3],
                )],
            )
            .unwrap();
        data.add_instance(mesh, Mat4::IDENTITY).unwrap();
        LoadedScene {
            data,
            cameras: vec![SceneCamera {
                name: Some("overview".to_string()),
                transform: Mat4::from_translation(Vec3::new(0.0, 0.0, 3.0)),
                fov_deg: Some(60.0),
                near: 0.1,
                far: None,
            }],
        }
    }

    fn temp_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "renderer_scene_manager_{}_{}",
            name,
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_starts_with_triangle() {
        let manager = SceneManager::new(FakeUpload::default()).unwrap();
        let elements = manager.scene().render_elements();
        assert_eq!(elements.len(), 1);
        assert_eq!(elements[0].index_count, 3);
        assert_eq!(elements[0].index_offset, 0);
        assert_eq!(elements[0].vertex_offset, 0);
        assert_eq!(manager.buffers().generation, 0);
        assert_eq!(manager.buffers().index_bytes, 12);
    }

    #[test]
    fn test_replace_swaps_everything() {
        let mut manager = SceneManager::new(FakeUpload::default()).unwrap();
        manager.replace(quad_scene()).unwrap();
        assert_eq!(manager.buffers().generation, 1);
        assert_eq!(manager.buffers().index_bytes, 24);
        assert_eq!(manager.scene().vertices().len(), 4);
        assert_eq!(manager.cameras().len(), 1);
        assert_eq!(manager.cameras()[0].fov_deg, Some(60.0));
    }

    #[test]
    fn test_failed_upload_keeps_previous_buffers() {
        let mut manager = SceneManager::new(FakeUpload::default()).unwrap();
        manager.uploader.fail.set(true);
        assert!(manager.replace(quad_scene()).is_err());

        assert_eq!(manager.buffers().generation, 0);
        assert_eq!(manager.scene().vertices().len(), 3);
        assert!(manager.cameras().is_empty());
    }

    #[test]
    fn test_missing_file_returns_false_and_keeps_scene() {
        let mut manager = SceneManager::new(FakeUpload::default()).unwrap();
        manager.replace(quad_scene()).unwrap();

        let missing = temp_path("missing").join("nope.gltf");
        assert!(!manager.load(&missing));
        assert_eq!(manager.buffers().generation, 1);
        assert_eq!(manager.scene().vertices().len(), 4);
    }

    #[test]
    fn test_malformed_file_returns_false() {
        let mut manager = SceneManager::new(FakeUpload::default()).unwrap();
        let path = temp_path("malformed").join("broken.gltf");
        std::fs::write(&path, b"{ this is not gltf").unwrap();

        assert!(!manager.load(&path));
        assert_eq!(manager.buffers().generation, 0);
    }

    /// One-triangle glTF whose third index points past its three vertices.
    fn write_out_of_range_gltf(dir: &Path) -> PathBuf {
        let positions: [[f32; 3]; 3] = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
        let mut bin: Vec<u8> = positions
            .iter()
            .flatten()
            .flat_map(|f| f.to_le_bytes())
            .collect();
        bin.extend([0u16, 1, 7].iter().flat_map(|i| i.to_le_bytes()));
        std::fs::write(dir.join("broken.bin"), &bin).unwrap();

        let json = format!(
            r#"{{"asset":{{"version":"2.0"}},"scene":0,"scenes":[{{"nodes":[0]}}],"nodes":[{{"mesh":0}}],"meshes":[{{"name":"broken","primitives":[{{"attributes":{{"POSITION":0}},"indices":1,"mode":4}}]}}],"accessors":[{{"bufferView":0,"componentType":5126,"count":3,"type":"VEC3","min":[0,0,0],"max":[1,1,0]}},{{"bufferView":1,"componentType":5123,"count":3,"type":"SCALAR"}}],"bufferViews":[{{"buffer":0,"byteOffset":0,"byteLength":36}},{{"buffer":0,"byteOffset":36,"byteLength":6}}],"buffers":[{{"byteLength":{},"uri":"broken.bin"}}]}}"#,
            bin.len()
        );
        let path = dir.join("broken.gltf");
        std::fs::write(&path, json).unwrap();
        path
    }

    #[test]
    fn test_invalid_mesh_file_keeps_scene() {
        let mut manager = SceneManager::new(FakeUpload::default()).unwrap();
        manager.replace(quad_scene()).unwrap();

        let path = write_out_of_range_gltf(&temp_path("index_range"));
        assert!(!manager.load(&path));
        assert!(manager.try_load(&path).is_err());

        assert_eq!(manager.buffers().generation, 1);
        assert_eq!(manager.scene().vertices().len(), 4);
        assert_eq!(manager.scene().render_elements().len(), 1);
        assert_eq!(manager.cameras().len(), 1);
    }

    #[test]
    fn test_empty_scene_falls_back_to_triangle() {
        let mut manager = SceneManager::new(FakeUpload::default()).unwrap();
        manager.replace(LoadedScene::default()).unwrap();
        assert_eq!(manager.scene().render_elements().len(), 1);
        assert_eq!(manager.buffers().generation, 1);
    }
}
