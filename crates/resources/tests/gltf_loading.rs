//! Integration tests for glTF scene loading.
//!
//! Each test writes a small asset to its own temp directory, either as
//! `.gltf` + `.bin` or as a single `.glb`.

use std::path::{Path, PathBuf};

use glam::{Mat4, Vec3};
use renderer_resources::{ResourceError, load_scene};
use renderer_scene::{RenderElement, SceneError};

const FLOAT: u32 = 5126;
const UNSIGNED_BYTE: u32 = 5121;
const UNSIGNED_SHORT: u32 = 5123;
const UNSIGNED_INT: u32 = 5125;

const MODE_LINES: u32 = 1;
const MODE_TRIANGLES: u32 = 4;

/// Builds a glTF document and its binary buffer by hand.
#[derive(Default)]
struct AssetBuilder {
    bin: Vec<u8>,
    views: Vec<String>,
    accessors: Vec<String>,
    meshes: Vec<String>,
    nodes: Vec<String>,
    cameras: Vec<String>,
    scene_nodes: Vec<usize>,
    extensions_used: Vec<&'static str>,
}

struct Prim {
    position: usize,
    normal: Option<usize>,
    indices: Option<usize>,
    mode: u32,
}

impl Prim {
    fn triangles(position: usize, indices: usize) -> Self {
        Self {
            position,
            normal: None,
            indices: Some(indices),
            mode: MODE_TRIANGLES,
        }
    }

    fn with_normal(mut self, normal: usize) -> Self {
        self.normal = Some(normal);
        self
    }
}

impl AssetBuilder {
    fn push_view(&mut self, bytes: &[u8]) -> usize {
        while self.bin.len() % 4 != 0 {
            self.bin.push(0);
        }
        self.views.push(format!(
            r#"{{"buffer":0,"byteOffset":{},"byteLength":{}}}"#,
            self.bin.len(),
            bytes.len()
        ));
        self.bin.extend_from_slice(bytes);
        self.views.len() - 1
    }

    fn push_accessor(&mut self, json: String) -> usize {
        self.accessors.push(json);
        self.accessors.len() - 1
    }

    fn vec3(&mut self, values: &[[f32; 3]], with_bounds: bool) -> usize {
        let bytes: Vec<u8> = values.iter().flatten().flat_map(|f| f.to_le_bytes()).collect();
        let view = self.push_view(&bytes);
        let bounds = if with_bounds {
            let min = values.iter().fold([f32::MAX; 3], |m, v| {
                [m[0].min(v[0]), m[1].min(v[1]), m[2].min(v[2])]
            });
            let max = values.iter().fold([f32::MIN; 3], |m, v| {
                [m[0].max(v[0]), m[1].max(v[1]), m[2].max(v[2])]
            });
            format!(
                r#","min":[{},{},{}],"max":[{},{},{}]"#,
                min[0], min[1], min[2], max[0], max[1], max[2]
            )
        } else {
            String::new()
        };
        self.push_accessor(format!(
            r#"{{"bufferView":{view},"componentType":{FLOAT},"count":{},"type":"VEC3"{bounds}}}"#,
            values.len()
        ))
    }

    fn positions(&mut self, values: &[[f32; 3]]) -> usize {
        self.vec3(values, true)
    }

    fn normals(&mut self, values: &[[f32; 3]]) -> usize {
        self.vec3(values, false)
    }

    fn index_accessor(&mut self, bytes: Vec<u8>, component: u32, count: usize) -> usize {
        let view = self.push_view(&bytes);
        self.push_accessor(format!(
            r#"{{"bufferView":{view},"componentType":{component},"count":{count},"type":"SCALAR"}}"#
        ))
    }

    fn indices_u8(&mut self, values: &[u8]) -> usize {
        self.index_accessor(values.to_vec(), UNSIGNED_BYTE, values.len())
    }

    fn indices_u16(&mut self, values: &[u16]) -> usize {
        let bytes = values.iter().flat_map(|i| i.to_le_bytes()).collect();
        self.index_accessor(bytes, UNSIGNED_SHORT, values.len())
    }

    fn indices_u32(&mut self, values: &[u32]) -> usize {
        let bytes = values.iter().flat_map(|i| i.to_le_bytes()).collect();
        self.index_accessor(bytes, UNSIGNED_INT, values.len())
    }

    fn mesh(&mut self, name: &str, primitives: &[Prim]) -> usize {
        let prims: Vec<String> = primitives
            .iter()
            .map(|p| {
                let mut attributes = format!(r#""POSITION":{}"#, p.position);
                if let Some(n) = p.normal {
                    attributes.push_str(&format!(r#","NORMAL":{n}"#));
                }
                let indices = p
                    .indices
                    .map(|i| format!(r#","indices":{i}"#))
                    .unwrap_or_default();
                format!(
                    r#"{{"attributes":{{{attributes}}}{indices},"mode":{}}}"#,
                    p.mode
                )
            })
            .collect();
        self.meshes.push(format!(
            r#"{{"name":"{name}","primitives":[{}]}}"#,
            prims.join(",")
        ));
        self.meshes.len() - 1
    }

    /// Adds a node from its JSON properties (without braces).
    fn node(&mut self, properties: &str) -> usize {
        self.nodes.push(format!("{{{properties}}}"));
        self.nodes.len() - 1
    }

    fn perspective_camera(&mut self, name: &str, yfov: f32, znear: f32, zfar: f32) -> usize {
        self.cameras.push(format!(
            r#"{{"name":"{name}","type":"perspective","perspective":{{"yfov":{yfov},"znear":{znear},"zfar":{zfar}}}}}"#
        ));
        self.cameras.len() - 1
    }

    fn root(&mut self, node: usize) {
        self.scene_nodes.push(node);
    }

    fn to_json(&self, buffer_uri: Option<&str>) -> String {
        let uri = buffer_uri
            .map(|u| format!(r#","uri":"{u}""#))
            .unwrap_or_default();
        let mut json = format!(
            r#"{{"asset":{{"version":"2.0"}},"scene":0,"scenes":[{{"nodes":{:?}}}],"nodes":[{}],"meshes":[{}],"accessors":[{}],"bufferViews":[{}],"buffers":[{{"byteLength":{}{uri}}}]"#,
            self.scene_nodes,
            self.nodes.join(","),
            self.meshes.join(","),
            self.accessors.join(","),
            self.views.join(","),
            self.bin.len(),
        );
        if !self.cameras.is_empty() {
            json.push_str(&format!(r#","cameras":[{}]"#, self.cameras.join(",")));
        }
        if !self.extensions_used.is_empty() {
            json.push_str(&format!(r#","extensionsUsed":{:?}"#, self.extensions_used));
        }
        json.push('}');
        json
    }

    fn write_gltf(&self, dir: &Path, name: &str) -> PathBuf {
        let bin_name = format!("{name}.bin");
        std::fs::write(dir.join(&bin_name), &self.bin).unwrap();
        let path = dir.join(format!("{name}.gltf"));
        std::fs::write(&path, self.to_json(Some(&bin_name))).unwrap();
        path
    }

    fn write_glb(&self, dir: &Path, name: &str) -> PathBuf {
        let mut json = self.to_json(None).into_bytes();
        while json.len() % 4 != 0 {
            json.push(b' ');
        }
        let mut bin = self.bin.clone();
        while bin.len() % 4 != 0 {
            bin.push(0);
        }

        let total = 12 + 8 + json.len() + 8 + bin.len();
        let mut glb = Vec::with_capacity(total);
        glb.extend_from_slice(b"glTF");
        glb.extend_from_slice(&2u32.to_le_bytes());
        glb.extend_from_slice(&(total as u32).to_le_bytes());
        glb.extend_from_slice(&(json.len() as u32).to_le_bytes());
        glb.extend_from_slice(b"JSON");
        glb.extend_from_slice(&json);
        glb.extend_from_slice(&(bin.len() as u32).to_le_bytes());
        glb.extend_from_slice(b"BIN\0");
        glb.extend_from_slice(&bin);

        let path = dir.join(format!("{name}.glb"));
        std::fs::write(&path, glb).unwrap();
        path
    }
}

fn temp_dir(test: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "renderer_resources_{}_{}",
        test,
        std::process::id()
    ));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

const TRIANGLE: [[f32; 3]; 3] = [[-0.5, -0.5, 0.0], [0.5, -0.5, 0.0], [0.0, 0.5, 0.0]];
const QUAD: [[f32; 3]; 4] = [
    [0.0, 0.0, 0.0],
    [1.0, 0.0, 0.0],
    [1.0, 1.0, 0.0],
    [0.0, 1.0, 0.0],
];

fn triangle_asset() -> AssetBuilder {
    let mut asset = AssetBuilder::default();
    let pos = asset.positions(&TRIANGLE);
    let nrm = asset.normals(&[[0.0, 0.0, 1.0]; 3]);
    let idx = asset.indices_u16(&[0, 1, 2]);
    let mesh = asset.mesh("triangle", &[Prim::triangles(pos, idx).with_normal(nrm)]);
    let node = asset.node(&format!(r#""mesh":{mesh}"#));
    asset.root(node);
    asset
}

fn assert_triangle_scene(scene: &renderer_scene::SceneData) {
    assert_eq!(scene.vertices().len(), 3);
    assert_eq!(scene.indices(), &[0, 1, 2]);
    assert_eq!(
        scene.render_elements(),
        &[RenderElement {
            vertex_offset: 0,
            index_offset: 0,
            index_count: 3
        }]
    );
    assert_eq!(scene.instances().len(), 1);
    assert_eq!(scene.instances()[0].transform, Mat4::IDENTITY);
    assert_eq!(scene.vertices()[1].position(), Vec3::new(0.5, -0.5, 0.0));
    assert!((scene.vertices()[0].normal() - Vec3::Z).length() < 1e-3);
}

#[test]
fn test_load_triangle_gltf() {
    let dir = temp_dir("triangle");
    let path = triangle_asset().write_gltf(&dir, "triangle");

    let loaded = load_scene(&path).expect("Failed to load triangle");
    assert_triangle_scene(&loaded.data);
    assert!(loaded.cameras.is_empty());
}

#[test]
fn test_load_triangle_glb() {
    let dir = temp_dir("triangle_glb");
    let path = triangle_asset().write_glb(&dir, "triangle");

    let loaded = load_scene(&path).expect("Failed to load GLB");
    assert_triangle_scene(&loaded.data);
}

#[test]
fn test_extensions_used_still_loads() {
    let dir = temp_dir("extensions");
    let mut asset = triangle_asset();
    asset.extensions_used.push("KHR_materials_unlit");
    let path = asset.write_gltf(&dir, "unlit");

    let loaded = load_scene(&path).unwrap();
    assert_eq!(loaded.data.instances().len(), 1);
}

#[test]
fn test_hierarchy_and_offsets() {
    let dir = temp_dir("hierarchy");
    let mut asset = AssetBuilder::default();

    let tri_pos = asset.positions(&TRIANGLE);
    let tri_idx = asset.indices_u8(&[0, 1, 2]);
    let tri = asset.mesh("tri", &[Prim::triangles(tri_pos, tri_idx)]);

    let quad_pos = asset.positions(&QUAD);
    let quad_idx = asset.indices_u32(&[0, 1, 2, 2, 3, 0]);
    let second_pos = asset.positions(&TRIANGLE);
    let second_idx = asset.indices_u16(&[2, 1, 0]);
    let quad = asset.mesh(
        "quad",
        &[
            Prim::triangles(quad_pos, quad_idx),
            Prim::triangles(second_pos, second_idx),
        ],
    );

    // parent (translated, no mesh) -> child quad; sibling root triangle
    let child = asset.node(&format!(r#""mesh":{quad},"translation":[0,2,0]"#));
    let parent = asset.node(&format!(r#""children":[{child}],"translation":[1,0,0]"#));
    let sibling = asset.node(&format!(r#""mesh":{tri},"scale":[2,2,2]"#));
    asset.root(parent);
    asset.root(sibling);

    let path = asset.write_gltf(&dir, "hierarchy");
    let scene = load_scene(&path).unwrap().data;

    assert_eq!(scene.meshes().len(), 2);
    assert_eq!(scene.meshes()[1].element_count, 2);
    assert_eq!(
        scene.render_elements(),
        &[
            RenderElement { vertex_offset: 0, index_offset: 0, index_count: 3 },
            RenderElement { vertex_offset: 3, index_offset: 3, index_count: 6 },
            RenderElement { vertex_offset: 7, index_offset: 9, index_count: 3 },
        ]
    );
    // indices stay local to their primitive
    assert_eq!(&scene.indices()[3..9], &[0, 1, 2, 2, 3, 0]);
    assert_eq!(&scene.indices()[9..], &[2, 1, 0]);

    // depth-first: the quad under the parent comes before the root sibling
    let instances = scene.instances();
    assert_eq!(instances.len(), 2);
    assert_eq!(instances[0].mesh_id, quad as u32);
    assert_eq!(
        instances[0].transform,
        Mat4::from_translation(Vec3::new(1.0, 2.0, 0.0))
    );
    assert_eq!(instances[1].mesh_id, tri as u32);
    assert_eq!(instances[1].transform, Mat4::from_scale(Vec3::splat(2.0)));

    assert_eq!(scene.bounds().min, Vec3::new(-1.0, -1.0, 0.0));
    assert_eq!(scene.bounds().max, Vec3::new(2.0, 3.0, 0.0));
}

#[test]
fn test_camera_node() {
    let dir = temp_dir("camera");
    let mut asset = triangle_asset();
    let camera = asset.perspective_camera("main", 0.8, 0.1, 100.0);
    let node = asset.node(&format!(r#""camera":{camera},"translation":[0,0,5]"#));
    asset.root(node);

    let path = asset.write_gltf(&dir, "camera");
    let loaded = load_scene(&path).unwrap();

    assert_eq!(loaded.cameras.len(), 1);
    let cam = &loaded.cameras[0];
    assert_eq!(cam.name.as_deref(), Some("main"));
    assert!((cam.fov_deg.unwrap() - 0.8f32.to_degrees()).abs() < 1e-4);
    assert_eq!(cam.near, 0.1);
    assert_eq!(cam.far, Some(100.0));
    assert_eq!(cam.transform, Mat4::from_translation(Vec3::new(0.0, 0.0, 5.0)));
}

#[test]
fn test_non_triangle_primitive_skipped() {
    let dir = temp_dir("lines");
    let mut asset = AssetBuilder::default();
    let line_pos = asset.positions(&[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]]);
    let line_idx = asset.indices_u16(&[0, 1]);
    let tri_pos = asset.positions(&TRIANGLE);
    let tri_idx = asset.indices_u16(&[0, 1, 2]);
    let mesh = asset.mesh(
        "mixed",
        &[
            Prim {
                position: line_pos,
                normal: None,
                indices: Some(line_idx),
                mode: MODE_LINES,
            },
            Prim::triangles(tri_pos, tri_idx),
        ],
    );
    let node = asset.node(&format!(r#""mesh":{mesh}"#));
    asset.root(node);

    let scene = load_scene(asset.write_gltf(&dir, "lines")).unwrap().data;
    assert_eq!(scene.meshes()[0].element_count, 1);
    assert_eq!(scene.vertices().len(), 3);
    // no NORMAL attribute: packs as +Z
    assert_eq!(scene.vertices()[0].normal(), Vec3::Z);
}

#[test]
fn test_missing_indices_is_error() {
    let dir = temp_dir("no_indices");
    let mut asset = AssetBuilder::default();
    let pos = asset.positions(&TRIANGLE);
    let mesh = asset.mesh(
        "unindexed",
        &[Prim {
            position: pos,
            normal: None,
            indices: None,
            mode: MODE_TRIANGLES,
        }],
    );
    let node = asset.node(&format!(r#""mesh":{mesh}"#));
    asset.root(node);

    let err = load_scene(asset.write_gltf(&dir, "unindexed")).unwrap_err();
    assert!(matches!(
        err,
        ResourceError::MissingIndices { ref mesh, primitive: 0 } if mesh == "unindexed"
    ));
}

#[test]
fn test_index_past_vertices_is_error() {
    let dir = temp_dir("index_range");
    let mut asset = AssetBuilder::default();
    let pos = asset.positions(&TRIANGLE);
    let idx = asset.indices_u16(&[0, 1, 7]);
    let mesh = asset.mesh("broken", &[Prim::triangles(pos, idx)]);
    let node = asset.node(&format!(r#""mesh":{mesh}"#));
    asset.root(node);

    let err = load_scene(asset.write_gltf(&dir, "broken")).unwrap_err();
    assert!(matches!(
        err,
        ResourceError::Scene(SceneError::IndexOutOfRange { index: 7, vertex_count: 3, .. })
    ));
}

#[test]
fn test_unsupported_extension() {
    let dir = temp_dir("obj");
    let path = dir.join("scene.obj");
    std::fs::write(&path, "v 0 0 0").unwrap();

    assert!(matches!(
        load_scene(&path),
        Err(ResourceError::UnsupportedExtension { .. })
    ));
}

#[test]
fn test_missing_file() {
    let path = temp_dir("missing").join("does_not_exist.gltf");
    assert!(matches!(
        load_scene(&path),
        Err(ResourceError::FileNotFound(p)) if p == path
    ));
}

#[test]
fn test_malformed_json() {
    let dir = temp_dir("malformed");
    let path = dir.join("broken.gltf");
    std::fs::write(&path, "{ not json").unwrap();

    assert!(matches!(
        load_scene(&path),
        Err(ResourceError::GltfLoad { .. })
    ));
}
