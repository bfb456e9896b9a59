//! glTF 2.0 scene loading.
//!
//! Reads a `.gltf` (with external or embedded buffers) or `.glb` file and
//! flattens it into [`SceneData`]:
//!
//! - every document mesh is appended in document order, so a glTF mesh index
//!   is also its scene mesh id
//! - the default scene (or the first one) is walked depth-first; each node
//!   carrying a mesh becomes one instance with its accumulated world transform
//! - camera nodes are collected as [`SceneCamera`]s
//!
//! Images are never decoded; only buffer data is read.

use std::path::{Path, PathBuf};

use glam::{Mat4, Vec2, Vec3};
use gltf::mesh::Mode;
use renderer_rhi::vertex::Vertex;
use renderer_scene::{PrimitiveData, SceneCamera, SceneData, Topology};
use tracing::{debug, info, warn};

use crate::error::{ResourceError, ResourceResult};

/// A loaded scene plus the cameras the asset declares.
#[derive(Clone, Debug, Default)]
pub struct LoadedScene {
    pub data: SceneData,
    pub cameras: Vec<SceneCamera>,
}

/// Loads a glTF scene from disk.
///
/// # Errors
///
/// Fails for extensions other than `.gltf`/`.glb`, missing files, parse or
/// buffer errors, documents without scenes, and triangle primitives lacking
/// positions or indices.
pub fn load_scene(path: impl AsRef<Path>) -> ResourceResult<LoadedScene> {
    let path = path.as_ref();
    check_extension(path)?;
    if !path.is_file() {
        return Err(ResourceError::FileNotFound(path.to_path_buf()));
    }

    let gltf_err = |e: gltf::Error| ResourceError::GltfLoad {
        path: path.to_path_buf(),
        message: e.to_string(),
    };

    let gltf::Gltf { document, blob } = gltf::Gltf::open(path).map_err(gltf_err)?;
    let buffers = gltf::import_buffers(&document, path.parent(), blob).map_err(gltf_err)?;

    let extensions: Vec<&str> = document.extensions_used().collect();
    if !extensions.is_empty() {
        warn!(
            "{}: uses extensions {:?}; they are ignored",
            path.display(),
            extensions
        );
    }

    let mut data = SceneData::new();
    for mesh in document.meshes() {
        let name = mesh_name(&mesh);
        let primitives = mesh
            .primitives()
            .enumerate()
            .map(|(i, primitive)| read_primitive(&name, i, &primitive, &buffers))
            .collect::<ResourceResult<Vec<_>>>()?;
        data.append_mesh(&name, primitives)?;
    }

    let scene = document
        .default_scene()
        .or_else(|| document.scenes().next())
        .ok_or_else(|| ResourceError::NoScene(path.to_path_buf()))?;

    let mut cameras = Vec::new();
    let mut stack: Vec<(gltf::Node<'_>, Mat4)> =
        scene.nodes().map(|node| (node, Mat4::IDENTITY)).collect();
    // Popped from the back, so keep siblings reversed.
    stack.reverse();
    while let Some((node, parent)) = stack.pop() {
        let world = parent * Mat4::from_cols_array_2d(&node.transform().matrix());

        if let Some(mesh) = node.mesh() {
            data.add_instance(mesh.index() as u32, world)?;
        }
        if let Some(camera) = node.camera() {
            cameras.push(scene_camera(&camera, world));
        }
        let first_child = stack.len();
        stack.extend(node.children().map(|child| (child, world)));
        stack[first_child..].reverse();
    }

    info!(
        "Loaded {}: {} mesh(es), {} instance(s), {} vertices, {} indices, {} camera(s)",
        path.display(),
        data.meshes().len(),
        data.instances().len(),
        data.vertices().len(),
        data.indices().len(),
        cameras.len()
    );

    Ok(LoadedScene { data, cameras })
}

fn check_extension(path: &Path) -> ResourceResult<()> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match extension.as_str() {
        "gltf" | "glb" => Ok(()),
        _ => Err(ResourceError::UnsupportedExtension {
            path: PathBuf::from(path),
            extension,
        }),
    }
}

fn mesh_name(mesh: &gltf::Mesh) -> String {
    mesh.name()
        .map(str::to_owned)
        .unwrap_or_else(|| format!("mesh_{}", mesh.index()))
}

fn topology(mode: Mode) -> Topology {
    match mode {
        Mode::Points => Topology::Points,
        Mode::Lines => Topology::Lines,
        Mode::LineLoop => Topology::LineLoop,
        Mode::LineStrip => Topology::LineStrip,
        Mode::Triangles => Topology::TriangleList,
        Mode::TriangleStrip => Topology::TriangleStrip,
        Mode::TriangleFan => Topology::TriangleFan,
    }
}

fn read_primitive(
    mesh: &str,
    index: usize,
    primitive: &gltf::Primitive,
    buffers: &[gltf::buffer::Data],
) -> ResourceResult<PrimitiveData> {
    let topology = topology(primitive.mode());
    if topology != Topology::TriangleList {
        // SceneData skips these; no need to read their data.
        return Ok(PrimitiveData {
            topology,
            vertices: Vec::new(),
            indices: Vec::new(),
        });
    }

    let reader = primitive.reader(|buffer| Some(&buffers[buffer.index()]));

    let positions: Vec<Vec3> = reader
        .read_positions()
        .ok_or_else(|| ResourceError::MissingPositions {
            mesh: mesh.to_string(),
            primitive: index,
        })?
        .map(Vec3::from)
        .collect();
    let count = positions.len();

    let indices: Vec<u32> = reader
        .read_indices()
        .ok_or_else(|| ResourceError::MissingIndices {
            mesh: mesh.to_string(),
            primitive: index,
        })?
        .into_u32()
        .collect();

    let normals = optional_attribute(
        mesh,
        index,
        "NORMAL",
        count,
        reader.read_normals().map(|it| it.map(Vec3::from).collect()),
    )?;
    let tangents = optional_attribute(
        mesh,
        index,
        "TANGENT",
        count,
        reader
            .read_tangents()
            .map(|it| it.map(|[x, y, z, _]| Vec3::new(x, y, z)).collect()),
    )?;
    let uvs = optional_attribute(
        mesh,
        index,
        "TEXCOORD_0",
        count,
        reader
            .read_tex_coords(0)
            .map(|tc| tc.into_f32().map(Vec2::from).collect()),
    )?;

    let vertices = (0..count)
        .map(|i| {
            Vertex::from_attributes(
                positions[i],
                normals.get(i).copied().unwrap_or(Vec3::ZERO),
                uvs.get(i).copied().unwrap_or(Vec2::ZERO),
                tangents.get(i).copied().unwrap_or(Vec3::ZERO),
            )
        })
        .collect();

    debug!(
        "Mesh '{}' primitive {}: {} vertices, {} indices",
        mesh,
        index,
        count,
        indices.len()
    );

    Ok(PrimitiveData::triangles(vertices, indices))
}

/// Missing attributes are returned empty and default to zero per vertex.
fn optional_attribute<T>(
    mesh: &str,
    primitive: usize,
    attribute: &'static str,
    expected: usize,
    values: Option<Vec<T>>,
) -> ResourceResult<Vec<T>> {
    match values {
        None => {
            warn!(
                "Mesh '{}' primitive {}: no {} attribute, using zeros",
                mesh, primitive, attribute
            );
            Ok(Vec::new())
        }
        Some(values) if values.len() != expected => Err(ResourceError::AttributeCount {
            mesh: mesh.to_string(),
            primitive,
            attribute,
            found: values.len(),
            expected,
        }),
        Some(values) => Ok(values),
    }
}

fn scene_camera(camera: &gltf::Camera, transform: Mat4) -> SceneCamera {
    let (fov_deg, near, far) = match camera.projection() {
        gltf::camera::Projection::Perspective(p) => {
            (Some(p.yfov().to_degrees()), p.znear(), p.zfar())
        }
        gltf::camera::Projection::Orthographic(o) => (None, o.znear(), Some(o.zfar())),
    };
    SceneCamera {
        name: camera.name().map(str::to_owned),
        transform,
        fov_deg,
        near,
        far,
    }
}
