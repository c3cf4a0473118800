use std::{
    f32::consts::PI,
    mem,
    sync::{Arc, OnceLock},
};

use bytemuck::{cast_slice, Pod, Zeroable};
use glam::Vec3;
use wgpu::util::DeviceExt;

use super::{context::RenderContext, MeshId};

pub trait VertexTrait: Pod {
    fn desc() -> wgpu::VertexBufferLayout<'static>;
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
    pub tangent_bitangent_sign: [f32; 4],
    pub color: [f32; 3],
}

impl Vertex {
    pub fn at(position: Vec3) -> Self {
        Self {
            position: position.to_array(),
            color: [1.0; 3],
            ..Default::default()
        }
    }
}

impl VertexTrait for Vertex {
    fn desc() -> wgpu::VertexBufferLayout<'static> {
        const ATTRIBUTES: [wgpu::VertexAttribute; 5] = wgpu::vertex_attr_array![
            0 => Float32x3,
            1 => Float32x3,
            2 => Float32x2,
            3 => Float32x4,
            4 => Float32x3
        ];
        wgpu::VertexBufferLayout {
            array_stride: mem::size_of::<Self>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &ATTRIBUTES,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl MeshData {
    /// Unit cube centred on the origin, 24 vertices so each face gets its own
    /// normal and tangent frame.
    pub fn cube() -> Self {
        let faces = [
            (Vec3::X, Vec3::NEG_Z, Vec3::Y),
            (Vec3::NEG_X, Vec3::Z, Vec3::Y),
            (Vec3::Y, Vec3::X, Vec3::NEG_Z),
            (Vec3::NEG_Y, Vec3::X, Vec3::Z),
            (Vec3::Z, Vec3::X, Vec3::Y),
            (Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y),
        ];
        let corners = [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)];

        let mut data = Self::default();
        for (normal, u, v) in faces {
            let base = data.vertices.len() as u32;
            for (su, sv) in corners {
                let position = (normal + u * su + v * sv) * 0.5;
                data.vertices.push(Vertex {
                    position: position.to_array(),
                    normal: normal.to_array(),
                    uv: [(su + 1.0) * 0.5, (1.0 - sv) * 0.5],
                    tangent_bitangent_sign: u.extend(1.0).to_array(),
                    color: [1.0; 3],
                });
            }
            data.indices.extend_from_slice(&[
                base,
                base + 1,
                base + 2,
                base,
                base + 2,
                base + 3,
            ]);
        }
        data
    }

    /// UV sphere of radius 1, counter-clockwise seen from outside.
    pub fn sphere(rings: u32, segments: u32) -> Self {
        let rings = rings.max(2);
        let segments = segments.max(3);

        let mut data = Self::default();
        for ring in 0..=rings {
            let theta = ring as f32 / rings as f32 * PI;
            for segment in 0..=segments {
                let phi = segment as f32 / segments as f32 * 2.0 * PI;
                let normal = Vec3::new(
                    theta.sin() * phi.cos(),
                    theta.cos(),
                    theta.sin() * phi.sin(),
                );
                let tangent = Vec3::new(-phi.sin(), 0.0, phi.cos());
                data.vertices.push(Vertex {
                    position: normal.to_array(),
                    normal: normal.to_array(),
                    uv: [
                        segment as f32 / segments as f32,
                        ring as f32 / rings as f32,
                    ],
                    tangent_bitangent_sign: tangent.extend(1.0).to_array(),
                    color: [1.0; 3],
                });
            }
        }

        let stride = segments + 1;
        for ring in 0..rings {
            for segment in 0..segments {
                let a = ring * stride + segment;
                let b = a + stride;
                data.indices.extend_from_slice(&[a, a + 1, b, a + 1, b + 1, b]);
            }
        }
        data
    }
}

/// Local-space sphere enclosing every vertex of a mesh. The centre is the
/// midpoint of the axis-aligned extents, not the minimal enclosing centre.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BoundingSphere {
    pub center: Vec3,
    pub radius: f32,
}

impl BoundingSphere {
    pub fn from_vertices(vertices: &[Vertex]) -> Self {
        let Some(first) = vertices.first() else {
            return Self::default();
        };

        let first = Vec3::from_array(first.position);
        let (min, max) = vertices.iter().fold((first, first), |(min, max), v| {
            let pos = Vec3::from_array(v.position);
            (min.min(pos), max.max(pos))
        });
        let center = (min + max) * 0.5;

        let radius = vertices
            .iter()
            .map(|v| Vec3::from_array(v.position).distance(center))
            .fold(0.0, f32::max);

        Self { center, radius }
    }
}

pub struct GpuMesh {
    pub vertex_buffer: wgpu::Buffer,
    pub index_buffer: wgpu::Buffer,
    pub num_indices: u32,
}

impl GpuMesh {
    pub fn new<V: VertexTrait>(
        device: &wgpu::Device,
        vertices: &[V],
        indices: &[u32],
    ) -> Self {
        let vertex_buffer =
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("mesh_vertex_buffer"),
                contents: cast_slice(vertices),
                usage: wgpu::BufferUsages::VERTEX,
            });

        let index_buffer =
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("mesh_index_buffer"),
                contents: cast_slice(indices),
                usage: wgpu::BufferUsages::INDEX,
            });

        Self {
            vertex_buffer,
            index_buffer,
            num_indices: indices.len() as u32,
        }
    }
}

/// Indexed geometry shared between scene objects through `Arc`.
///
/// The bounding sphere is computed once here. Vertex and index buffers are
/// created on the first draw against a device and live as long as the mesh.
pub struct StaticMesh {
    bounding_sphere: BoundingSphere,
    data: MeshData,
    gpu: OnceLock<Arc<GpuMesh>>,
    id: MeshId,
}

impl StaticMesh {
    pub fn new(data: MeshData) -> Self {
        Self {
            bounding_sphere: BoundingSphere::from_vertices(&data.vertices),
            data,
            gpu: OnceLock::new(),
            id: MeshId::next(),
        }
    }

    pub fn id(&self) -> MeshId {
        self.id
    }

    pub fn bounding_sphere(&self) -> BoundingSphere {
        self.bounding_sphere
    }

    pub fn index_count(&self) -> u32 {
        self.data.indices.len() as u32
    }

    pub fn data(&self) -> &MeshData {
        &self.data
    }

    pub fn draw(&self, ctx: &mut impl RenderContext, instance_count: u32) {
        ctx.draw_mesh(self, instance_count);
    }

    pub fn resident(&self, device: &wgpu::Device) -> &Arc<GpuMesh> {
        self.gpu.get_or_init(|| {
            Arc::new(GpuMesh::new(
                device,
                &self.data.vertices,
                &self.data.indices,
            ))
        })
    }
}

impl std::fmt::Debug for StaticMesh {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticMesh")
            .field("id", &self.id)
            .field("index_count", &self.index_count())
            .field("bounding_sphere", &self.bounding_sphere)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_layout() {
        assert_eq!(mem::size_of::<Vertex>(), 15 * 4);
        let layout = Vertex::desc();
        let offsets: Vec<_> =
            layout.attributes.iter().map(|attr| attr.offset).collect();
        assert_eq!(offsets, vec![0, 12, 24, 32, 48]);
    }

    #[test]
    fn test_bounding_sphere_uses_extents_midpoint() {
        // Extents midpoint is (1, 0, 0) even though the points cluster left.
        let vertices = [
            Vertex::at(Vec3::new(0.0, 0.0, 0.0)),
            Vertex::at(Vec3::new(0.1, 0.0, 0.0)),
            Vertex::at(Vec3::new(0.2, 0.0, 0.0)),
            Vertex::at(Vec3::new(2.0, 0.0, 0.0)),
        ];
        let sphere = BoundingSphere::from_vertices(&vertices);
        assert!(sphere.center.abs_diff_eq(Vec3::new(1.0, 0.0, 0.0), 1e-6));
        assert!((sphere.radius - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_bounding_sphere_reaches_farthest_vertex() {
        let vertices = [
            Vertex::at(Vec3::new(-1.0, -1.0, -1.0)),
            Vertex::at(Vec3::new(1.0, 1.0, 1.0)),
            Vertex::at(Vec3::new(1.0, -1.0, 0.0)),
        ];
        let sphere = BoundingSphere::from_vertices(&vertices);
        assert!(sphere.center.abs_diff_eq(Vec3::ZERO, 1e-6));
        assert!((sphere.radius - 3.0_f32.sqrt()).abs() < 1e-6);
        for v in &vertices {
            let pos = Vec3::from_array(v.position);
            assert!(pos.distance(sphere.center) <= sphere.radius + 1e-6);
        }
    }

    #[test]
    fn test_empty_mesh_has_empty_sphere() {
        let mesh = StaticMesh::new(MeshData::default());
        assert_eq!(mesh.bounding_sphere(), BoundingSphere::default());
        assert_eq!(mesh.index_count(), 0);
    }

    #[test]
    fn test_meshes_have_distinct_ids() {
        let a = StaticMesh::new(MeshData::cube());
        let b = StaticMesh::new(MeshData::cube());
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_cube_faces_wind_outward() {
        let cube = MeshData::cube();
        assert_eq!(cube.vertices.len(), 24);
        assert_eq!(cube.indices.len(), 36);
        for tri in cube.indices.chunks(3) {
            let [a, b, c] = [tri[0], tri[1], tri[2]]
                .map(|i| Vec3::from_array(cube.vertices[i as usize].position));
            let normal = Vec3::from_array(cube.vertices[tri[0] as usize].normal);
            assert!((b - a).cross(c - a).dot(normal) > 0.0);
        }
        let sphere = StaticMesh::new(cube).bounding_sphere();
        assert!((sphere.radius - 0.75_f32.sqrt()).abs() < 1e-6);
    }

    #[test]
    fn test_sphere_winds_outward() {
        let sphere = MeshData::sphere(8, 12);
        for tri in sphere.indices.chunks(3) {
            let [a, b, c] = [tri[0], tri[1], tri[2]]
                .map(|i| Vec3::from_array(sphere.vertices[i as usize].position));
            let cross = (b - a).cross(c - a);
            // Pole triangles are degenerate.
            if cross.length() > 1e-6 {
                assert!(cross.dot(a + b + c) > 0.0);
            }
        }
        let bounds = BoundingSphere::from_vertices(&sphere.vertices);
        assert!((bounds.radius - 1.0).abs() < 1e-5);
    }
}
