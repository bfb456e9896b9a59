//! Flattened, GPU-ready scene description.
//!
//! All meshes share one vertex array and one index array. Each triangle-list
//! primitive becomes a [`RenderElement`] whose offsets are running totals
//! into those arrays; a [`Mesh`] is a contiguous run of elements; a
//! [`MeshInstance`] places a mesh in the world.
//!
//! Indices stay local to their primitive and are rebased at draw time through
//! `vertex_offset`.

use glam::{Mat4, Vec2, Vec3};
use renderer_rhi::vertex::Vertex;
use tracing::{debug, warn};

use crate::bounds::Aabb;
use crate::error::{SceneError, SceneResult};

/// One indexed draw's worth of geometry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderElement {
    /// First vertex of the primitive in the unified vertex buffer.
    pub vertex_offset: u32,
    /// First index of the primitive in the unified index buffer.
    pub index_offset: u32,
    pub index_count: u32,
}

/// Contiguous range of render elements.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Mesh {
    pub first_element: u32,
    pub element_count: u32,
}

impl Mesh {
    pub fn elements(&self) -> std::ops::Range<usize> {
        let first = self.first_element as usize;
        first..first + self.element_count as usize
    }
}

/// A mesh placed in the world.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MeshInstance {
    pub mesh_id: u32,
    pub transform: Mat4,
}

/// Primitive assembly modes an asset can declare. Only triangle lists are
/// drawn.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Topology {
    Points,
    Lines,
    LineLoop,
    LineStrip,
    TriangleList,
    TriangleStrip,
    TriangleFan,
}

/// One primitive of a mesh before it is appended.
#[derive(Clone, Debug)]
pub struct PrimitiveData {
    pub topology: Topology,
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl PrimitiveData {
    pub fn triangles(vertices: Vec<Vertex>, indices: Vec<u32>) -> Self {
        Self {
            topology: Topology::TriangleList,
            vertices,
            indices,
        }
    }
}

/// Camera found in an asset.
#[derive(Clone, Debug, PartialEq)]
pub struct SceneCamera {
    pub name: Option<String>,
    /// Node world transform; the camera looks down its local -Z.
    pub transform: Mat4,
    /// Vertical field of view in degrees, if perspective.
    pub fov_deg: Option<f32>,
    pub near: f32,
    pub far: Option<f32>,
}

/// Packed scene: unified geometry, mesh tables, instances and bounds.
#[derive(Clone, Debug, Default)]
pub struct SceneData {
    vertices: Vec<Vertex>,
    indices: Vec<u32>,
    elements: Vec<RenderElement>,
    meshes: Vec<Mesh>,
    mesh_bounds: Vec<Aabb>,
    instances: Vec<MeshInstance>,
    instance_bounds: Vec<Aabb>,
    bounds: Aabb,
}

impl SceneData {
    pub fn new() -> Self {
        Self::default()
    }

    /// One triangle in the z=0 plane facing +Z, instanced once at identity.
    pub fn triangle() -> Self {
        let normal = Vec3::Z;
        let tangent = Vec3::X;
        let vertices = vec![
            Vertex::from_attributes(Vec3::new(-0.5, -0.5, 0.0), normal, Vec2::new(0.0, 0.0), tangent),
            Vertex::from_attributes(Vec3::new(0.5, -0.5, 0.0), normal, Vec2::new(1.0, 0.0), tangent),
            Vertex::from_attributes(Vec3::new(0.0, 0.5, 0.0), normal, Vec2::new(0.5, 1.0), tangent),
        ];

        let bounds = Aabb::from_points(vertices.iter().map(Vertex::position));
        Self {
            vertices,
            indices: vec![0, 1, 2],
            elements: vec![RenderElement {
                vertex_offset: 0,
                index_offset: 0,
                index_count: 3,
            }],
            meshes: vec![Mesh {
                first_element: 0,
                element_count: 1,
            }],
            mesh_bounds: vec![bounds],
            instances: vec![MeshInstance {
                mesh_id: 0,
                transform: Mat4::IDENTITY,
            }],
            instance_bounds: vec![bounds],
            bounds,
        }
    }

    /// Appends a mesh and returns its id.
    ///
    /// Non-triangle-list primitives are skipped with a warning and do not
    /// count toward the mesh's element count. On error the scene is left
    /// unchanged.
    ///
    /// # Errors
    ///
    /// [`SceneError::EmptyPrimitive`] for a triangle primitive with no
    /// vertices or indices, [`SceneError::IndexOutOfRange`] for an index past
    /// the primitive's vertices.
    pub fn append_mesh(&mut self, name: &str, primitives: Vec<PrimitiveData>) -> SceneResult<u32> {
        let mut accepted = Vec::with_capacity(primitives.len());
        for primitive in primitives {
            if primitive.topology != Topology::TriangleList {
                warn!(
                    "Mesh '{}': skipping {:?} primitive, only triangle lists are supported",
                    name, primitive.topology
                );
                continue;
            }
            validate_primitive(name, &primitive)?;
            accepted.push(primitive);
        }

        let mesh_id = u32::try_from(self.meshes.len()).map_err(|_| SceneError::TooLarge)?;
        let first_element = u32::try_from(self.elements.len()).map_err(|_| SceneError::TooLarge)?;

        // Check every offset before mutating anything.
        let added_vertices: usize = accepted.iter().map(|p| p.vertices.len()).sum();
        let added_indices: usize = accepted.iter().map(|p| p.indices.len()).sum();
        u32::try_from(self.vertices.len() + added_vertices).map_err(|_| SceneError::TooLarge)?;
        u32::try_from(self.indices.len() + added_indices).map_err(|_| SceneError::TooLarge)?;

        let mut bounds = Aabb::EMPTY;
        for primitive in &accepted {
            bounds = bounds.union(&Aabb::from_points(
                primitive.vertices.iter().map(Vertex::position),
            ));
            self.elements.push(RenderElement {
                vertex_offset: self.vertices.len() as u32,
                index_offset: self.indices.len() as u32,
                index_count: primitive.indices.len() as u32,
            });
            self.vertices.extend_from_slice(&primitive.vertices);
            self.indices.extend_from_slice(&primitive.indices);
        }

        let mesh = Mesh {
            first_element,
            element_count: accepted.len() as u32,
        };
        if mesh.element_count == 0 {
            warn!("Mesh '{}' has no drawable primitives", name);
        }
        debug!(
            "Appended mesh '{}' (id {}): {} element(s), {} vertices, {} indices",
            name, mesh_id, mesh.element_count, added_vertices, added_indices
        );

        self.meshes.push(mesh);
        self.mesh_bounds.push(bounds);
        Ok(mesh_id)
    }

    /// Places `mesh_id` in the world.
    ///
    /// # Errors
    ///
    /// [`SceneError::UnknownMesh`] if the mesh was not appended.
    pub fn add_instance(&mut self, mesh_id: u32, transform: Mat4) -> SceneResult<()> {
        let bounds = self
            .mesh_bounds
            .get(mesh_id as usize)
            .ok_or(SceneError::UnknownMesh {
                mesh_id,
                mesh_count: self.meshes.len(),
            })?
            .transformed(&transform);

        self.instances.push(MeshInstance { mesh_id, transform });
        self.instance_bounds.push(bounds);
        self.bounds = self.bounds.union(&bounds);
        Ok(())
    }

    #[inline]
    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    #[inline]
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    #[inline]
    pub fn render_elements(&self) -> &[RenderElement] {
        &self.elements
    }

    #[inline]
    pub fn meshes(&self) -> &[Mesh] {
        &self.meshes
    }

    #[inline]
    pub fn instances(&self) -> &[MeshInstance] {
        &self.instances
    }

    #[inline]
    pub fn mesh_bounds(&self) -> &[Aabb] {
        &self.mesh_bounds
    }

    #[inline]
    pub fn instance_bounds(&self) -> &[Aabb] {
        &self.instance_bounds
    }

    /// Union of all instance bounds.
    #[inline]
    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    /// True when there is nothing to upload or draw.
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() || self.indices.is_empty() || self.instances.is_empty()
    }

    /// Draw traversal: instances in order, each with its mesh's elements in
    /// order.
    pub fn draw_batches(&self) -> impl Iterator<Item = (&MeshInstance, &[RenderElement])> {
        self.instances.iter().map(|instance| {
            let elements = self
                .meshes
                .get(instance.mesh_id as usize)
                .map(|mesh| &self.elements[mesh.elements()])
                .unwrap_or(&[]);
            (instance, elements)
        })
    }
}

fn validate_primitive(mesh: &str, primitive: &PrimitiveData) -> SceneResult<()> {
    if primitive.vertices.is_empty() || primitive.indices.is_empty() {
        return Err(SceneError::EmptyPrimitive {
            mesh: mesh.to_string(),
            vertices: primitive.vertices.len(),
            indices: primitive.indices.len(),
        });
    }
    let vertex_count = primitive.vertices.len();
    if let Some(&index) = primitive
        .indices
        .iter()
        .find(|&&i| i as usize >= vertex_count)
    {
        return Err(SceneError::IndexOutOfRange {
            mesh: mesh.to_string(),
            index,
            vertex_count,
        });
    }
    Ok(())
}
