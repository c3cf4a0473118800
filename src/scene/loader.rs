use std::{collections::HashMap, path::Path, sync::Arc};

use anyhow::{anyhow, bail, Context, Result};
use glam::{Mat4, Vec3};
use image::{DynamicImage, RgbImage, RgbaImage};
use log::{info, warn};

use crate::render::{
    material::Material,
    mesh::{MeshData, StaticMesh, Vertex},
    shader::Program,
    texture::Texture,
};

use super::{PointLight, Scene, SceneObject};

/// Tangent-space normal pointing straight out of the surface.
const FLAT_NORMAL: [u8; 4] = [128, 128, 255, 255];

impl Scene {
    /// Loads a `.gltf`, `.glb` or `.obj` file. Every material of the scene
    /// uses `program`.
    pub fn load(
        path: impl AsRef<Path>,
        program: &Arc<Program>,
    ) -> Result<Self> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);
        match extension.as_deref() {
            Some("gltf" | "glb") => Self::from_gltf(path, program),
            Some("obj") => Self::from_obj(path, program),
            _ => bail!("Unsupported scene file {}", path.display()),
        }
    }

    pub fn from_gltf(
        path: impl AsRef<Path>,
        program: &Arc<Program>,
    ) -> Result<Self> {
        let path = path.as_ref();
        let (document, buffers, images) = gltf::import(path)
            .with_context(|| format!("Importing {}", path.display()))?;

        let gltf_scene = document
            .default_scene()
            .or_else(|| document.scenes().next())
            .ok_or_else(|| anyhow!("{} has no scene", path.display()))?;

        let mut import = GltfImport {
            buffers: &buffers,
            images: &images,
            program,
            flat_normal: Arc::new(Texture::solid(FLAT_NORMAL, false)),
            materials: HashMap::new(),
            meshes: HashMap::new(),
            scene: Scene::new(),
            textures: HashMap::new(),
        };
        for node in gltf_scene.nodes() {
            import
                .visit(&node, Mat4::IDENTITY)
                .with_context(|| format!("Loading {}", path.display()))?;
        }

        info!(
            "Scene loaded: {} ({} objects, {} meshes, {} materials)",
            path.display(),
            import.scene.objects.len(),
            import.meshes.len(),
            import.materials.len()
        );
        Ok(import.scene)
    }

    pub fn from_obj(
        path: impl AsRef<Path>,
        program: &Arc<Program>,
    ) -> Result<Self> {
        let path = path.as_ref();
        let (models, _) = tobj::load_obj(
            path,
            &tobj::LoadOptions {
                single_index: true,
                triangulate: true,
                ..Default::default()
            },
        )
        .with_context(|| format!("Loading {}", path.display()))?;

        let material = Arc::new(Material::textured_normal_mapped(
            program.clone(),
            Arc::new(Texture::solid([255; 4], true)),
            Arc::new(Texture::solid(FLAT_NORMAL, false)),
        ));

        let mut scene = Scene::new();
        for model in models {
            let data = obj_mesh(&model.mesh);
            if data.indices.is_empty() {
                warn!("Skipping empty model {}", model.name);
                continue;
            }
            scene.add_object(SceneObject::new(
                Mat4::IDENTITY,
                Arc::new(StaticMesh::new(data)),
                material.clone(),
            ));
        }

        info!(
            "Scene loaded: {} ({} objects)",
            path.display(),
            scene.objects.len()
        );
        Ok(scene)
    }

    /// White unit cube at the origin, lit by a green and a red point light.
    pub fn cube(program: &Arc<Program>) -> Self {
        let material = Arc::new(Material::textured_normal_mapped(
            program.clone(),
            Arc::new(Texture::solid([255; 4], true)),
            Arc::new(Texture::solid(FLAT_NORMAL, false)),
        ));

        let mut scene = Scene::new();
        scene.add_object(SceneObject::new(
            Mat4::IDENTITY,
            Arc::new(StaticMesh::new(MeshData::cube())),
            material,
        ));
        scene.add_point_light(PointLight::new(
            Vec3::new(1.0, 2.0, 4.0),
            Vec3::new(0.0, 10.0, 0.0),
            100.0,
        ));
        scene.add_point_light(PointLight::new(
            Vec3::new(1.0, 2.0, -4.0),
            Vec3::new(10.0, 0.0, 0.0),
            50.0,
        ));
        scene
    }
}

fn obj_mesh(mesh: &tobj::Mesh) -> MeshData {
    let vertices = mesh
        .positions
        .chunks_exact(3)
        .enumerate()
        .map(|(i, position)| {
            let normal = mesh
                .normals
                .get(i * 3..i * 3 + 3)
                .map_or([0.0, 1.0, 0.0], |n| [n[0], n[1], n[2]]);
            let uv = mesh
                .texcoords
                .get(i * 2..i * 2 + 2)
                .map_or([0.0; 2], |t| [t[0], 1.0 - t[1]]);
            let color = mesh
                .vertex_color
                .get(i * 3..i * 3 + 3)
                .map_or([1.0; 3], |c| [c[0], c[1], c[2]]);
            Vertex {
                position: [position[0], position[1], position[2]],
                normal,
                uv,
                tangent_bitangent_sign: default_tangent(normal),
                color,
            }
        })
        .collect();

    MeshData {
        vertices,
        indices: mesh.indices.clone(),
    }
}

/// Any unit vector orthogonal to `normal`, with a positive bitangent sign.
fn default_tangent(normal: [f32; 3]) -> [f32; 4] {
    let normal = Vec3::from_array(normal);
    let reference = if normal.x.abs() < 0.9 { Vec3::X } else { Vec3::Y };
    let tangent = reference - normal * reference.dot(normal);
    tangent.normalize_or_zero().extend(1.0).to_array()
}

struct GltfImport<'a> {
    buffers: &'a [gltf::buffer::Data],
    images: &'a [gltf::image::Data],
    program: &'a Arc<Program>,
    flat_normal: Arc<Texture>,
    /// Keyed by glTF material index, `None` being the default material.
    materials: HashMap<Option<usize>, Arc<Material>>,
    /// Keyed by (mesh, primitive) index.
    meshes: HashMap<(usize, usize), Arc<StaticMesh>>,
    scene: Scene,
    /// Keyed by (image index, srgb).
    textures: HashMap<(usize, bool), Arc<Texture>>,
}

impl GltfImport<'_> {
    fn visit(&mut self, node: &gltf::Node, parent: Mat4) -> Result<()> {
        let transform =
            parent * Mat4::from_cols_array_2d(&node.transform().matrix());

        if let Some(mesh) = node.mesh() {
            for primitive in mesh.primitives() {
                if primitive.mode() != gltf::mesh::Mode::Triangles {
                    warn!(
                        "Skipping primitive {} of mesh {}: {:?}",
                        primitive.index(),
                        mesh.index(),
                        primitive.mode()
                    );
                    continue;
                }
                let static_mesh = self.mesh(&mesh, &primitive)?;
                let material = self.material(&primitive.material())?;
                self.scene.add_object(SceneObject::new(
                    transform,
                    static_mesh,
                    material,
                ));
            }
        }

        for child in node.children() {
            self.visit(&child, transform)?;
        }
        Ok(())
    }

    fn mesh(
        &mut self,
        mesh: &gltf::Mesh,
        primitive: &gltf::Primitive,
    ) -> Result<Arc<StaticMesh>> {
        let key = (mesh.index(), primitive.index());
        if let Some(static_mesh) = self.meshes.get(&key) {
            return Ok(static_mesh.clone());
        }

        let buffers = self.buffers;
        let reader =
            primitive.reader(|buffer| Some(&buffers[buffer.index()].0[..]));

        let positions: Vec<[f32; 3]> = reader
            .read_positions()
            .ok_or_else(|| {
                anyhow!("Mesh {} has a primitive without positions", key.0)
            })?
            .collect();
        let count = positions.len();

        let normals: Vec<[f32; 3]> = match reader.read_normals() {
            Some(normals) => normals.collect(),
            None => vec![[0.0, 1.0, 0.0]; count],
        };
        let uvs: Vec<[f32; 2]> = match reader.read_tex_coords(0) {
            Some(uvs) => uvs.into_f32().collect(),
            None => vec![[0.0; 2]; count],
        };
        let colors: Vec<[f32; 3]> = match reader.read_colors(0) {
            Some(colors) => colors.into_rgb_f32().collect(),
            None => vec![[1.0; 3]; count],
        };
        let tangents: Vec<[f32; 4]> = match reader.read_tangents() {
            Some(tangents) => tangents.collect(),
            None => normals.iter().copied().map(default_tangent).collect(),
        };
        let indices: Vec<u32> = reader
            .read_indices()
            .ok_or_else(|| anyhow!("Mesh {} is not indexed", key.0))?
            .into_u32()
            .collect();

        let vertices = (0..count)
            .map(|i| Vertex {
                position: positions[i],
                normal: normals.get(i).copied().unwrap_or([0.0, 1.0, 0.0]),
                uv: uvs.get(i).copied().unwrap_or_default(),
                tangent_bitangent_sign: tangents
                    .get(i)
                    .copied()
                    .unwrap_or([1.0, 0.0, 0.0, 1.0]),
                color: colors.get(i).copied().unwrap_or([1.0; 3]),
            })
            .collect();

        let static_mesh =
            Arc::new(StaticMesh::new(MeshData { vertices, indices }));
        self.meshes.insert(key, static_mesh.clone());
        Ok(static_mesh)
    }

    fn material(
        &mut self,
        material: &gltf::Material,
    ) -> Result<Arc<Material>> {
        let key = material.index();
        if let Some(cached) = self.materials.get(&key) {
            return Ok(cached.clone());
        }

        let pbr = material.pbr_metallic_roughness();
        let albedo = match pbr.base_color_texture() {
            Some(info) => self.texture(info.texture().source().index(), true)?,
            None => {
                let factor = pbr.base_color_factor();
                Arc::new(Texture::solid(factor.map(unorm8), true))
            }
        };
        let normal = match material.normal_texture() {
            Some(normal) => {
                self.texture(normal.texture().source().index(), false)?
            }
            None => self.flat_normal.clone(),
        };

        let loaded = Arc::new(Material::textured_normal_mapped(
            self.program.clone(),
            albedo,
            normal,
        ));
        self.materials.insert(key, loaded.clone());
        Ok(loaded)
    }

    fn texture(&mut self, index: usize, srgb: bool) -> Result<Arc<Texture>> {
        if let Some(texture) = self.textures.get(&(index, srgb)) {
            return Ok(texture.clone());
        }
        let data = self
            .images
            .get(index)
            .ok_or_else(|| anyhow!("Missing image {}", index))?;
        let image = decoded_image(data)
            .with_context(|| format!("Decoding image {}", index))?;
        let texture = Arc::new(Texture::from_image(&image, srgb));
        self.textures.insert((index, srgb), texture.clone());
        Ok(texture)
    }
}

fn unorm8(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

fn decoded_image(data: &gltf::image::Data) -> Result<DynamicImage> {
    let pixels = data.pixels.clone();
    let image = match data.format {
        gltf::image::Format::R8G8B8 => {
            RgbImage::from_raw(data.width, data.height, pixels)
                .map(DynamicImage::ImageRgb8)
        }
        gltf::image::Format::R8G8B8A8 => {
            RgbaImage::from_raw(data.width, data.height, pixels)
                .map(DynamicImage::ImageRgba8)
        }
        format => bail!("Unsupported image format {:?}", format),
    };
    image.ok_or_else(|| anyhow!("Image data does not match its size"))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::render::shader::ProgramStage;

    fn program() -> Arc<Program> {
        Arc::new(Program::new("gbuffer", String::new(), ProgramStage::Render))
    }

    fn temp_file(name: &str, contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir()
            .join(format!("wgpu_deferred_{}_{}", std::process::id(), name));
        fs::write(&path, contents).unwrap();
        path
    }

    // One triangle, positions then u16 indices, referenced by two nodes.
    const TRIANGLE_GLTF: &str = r#"{
        "asset": { "version": "2.0" },
        "scene": 0,
        "scenes": [{ "nodes": [0, 1] }],
        "nodes": [
            { "mesh": 0 },
            { "mesh": 0, "translation": [3.0, 0.0, 0.0], "children": [2] },
            { "mesh": 0, "translation": [0.0, 1.0, 0.0] }
        ],
        "meshes": [{
            "primitives": [{
                "attributes": { "POSITION": 0 },
                "indices": 1,
                "material": 0
            }]
        }],
        "materials": [{
            "pbrMetallicRoughness": { "baseColorFactor": [1.0, 0.0, 0.0, 1.0] }
        }],
        "buffers": [{
            "byteLength": 44,
            "uri": "data:application/octet-stream;base64,AAAAAAAAAAAAAAAAAACAPwAAAAAAAAAAAAAAAAAAgD8AAAAAAAABAAIAAAA="
        }],
        "bufferViews": [
            { "buffer": 0, "byteOffset": 0, "byteLength": 36 },
            { "buffer": 0, "byteOffset": 36, "byteLength": 6 }
        ],
        "accessors": [
            {
                "bufferView": 0, "componentType": 5126, "count": 3,
                "type": "VEC3", "min": [0.0, 0.0, 0.0], "max": [1.0, 1.0, 0.0]
            },
            {
                "bufferView": 1, "componentType": 5123, "count": 3,
                "type": "SCALAR"
            }
        ]
    }"#;

    #[test]
    fn test_gltf_shares_meshes_and_materials() {
        let path = temp_file("triangle.gltf", TRIANGLE_GLTF);
        let scene = Scene::load(&path, &program()).unwrap();
        fs::remove_file(&path).ok();

        let objects = scene.objects();
        assert_eq!(objects.len(), 3);
        assert!(Arc::ptr_eq(&objects[0].mesh, &objects[2].mesh));
        assert!(Arc::ptr_eq(&objects[0].material, &objects[1].material));
        assert_eq!(objects[0].mesh.index_count(), 3);

        // Child transforms accumulate the parent's.
        let origin = objects[2].transform.transform_point3(Vec3::ZERO);
        assert!(origin.abs_diff_eq(Vec3::new(3.0, 1.0, 0.0), 1e-6));

        let sphere = objects[0].mesh.bounding_sphere();
        assert!(sphere.center.abs_diff_eq(Vec3::new(0.5, 0.5, 0.0), 1e-6));
    }

    #[test]
    fn test_obj_scene() {
        let path = temp_file(
            "quad.obj",
            "v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nvt 0 0\nvt 1 0\nvt 1 1\n\
             vt 0 1\nf 1/1 2/2 3/3 4/4\n",
        );
        let scene = Scene::load(&path, &program()).unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(scene.objects().len(), 1);
        let mesh = &scene.objects()[0].mesh;
        assert_eq!(mesh.index_count(), 6);
        let first = mesh.data().vertices[mesh.data().indices[0] as usize];
        assert_eq!(first.uv, [0.0, 1.0]);
    }

    #[test]
    fn test_load_failures() {
        let program = program();
        assert!(Scene::load("missing.glb", &program).is_err());
        assert!(Scene::load("missing.obj", &program).is_err());
        assert!(Scene::load("scene.fbx", &program).is_err());
        assert!(Scene::load("no_extension", &program).is_err());

        let path = temp_file("broken.gltf", "{ not json");
        assert!(Scene::load(&path, &program).is_err());
        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_default_tangent_is_orthogonal() {
        for normal in [Vec3::X, Vec3::Y, Vec3::new(0.6, 0.0, 0.8)] {
            let tangent = Vec3::from_slice(&default_tangent(normal.to_array()));
            assert!(tangent.dot(normal).abs() < 1e-5);
            assert!((tangent.length() - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_cube_scene() {
        let scene = Scene::cube(&program());
        assert_eq!(scene.objects().len(), 1);
        assert_eq!(scene.objects()[0].material.textures().len(), 2);
        let lights = scene.point_lights();
        assert_eq!(lights.len(), 2);
        assert_eq!(lights[0].color, Vec3::new(0.0, 10.0, 0.0));
        assert_eq!(lights[1].radius, 50.0);
        assert!(scene.point_light_volume().is_none());
    }
}
