use std::{collections::HashMap, sync::Arc};

use glam::Mat4;
use log::debug;

use crate::{
    render::{
        context::{BufferUsage, RenderContext},
        material::Material,
        mesh::StaticMesh,
        MaterialId, MeshId,
    },
    scene::SceneObject,
};

use super::INSTANCES_SLOT;

/// Column-major `mat4x4<f32>` per instance, as read from slot 2.
pub fn encode_transforms(transforms: &[Mat4]) -> Vec<u8> {
    let columns: Vec<[f32; 16]> =
        transforms.iter().map(Mat4::to_cols_array).collect();
    bytemuck::cast_slice(&columns).to_vec()
}

pub fn bind_transforms(ctx: &mut impl RenderContext, transforms: &[Mat4]) {
    ctx.bind_buffer(
        BufferUsage::Storage,
        INSTANCES_SLOT,
        "instance_transforms",
        &encode_transforms(transforms),
    );
}

/// Objects batch together only when they share both the material and the
/// mesh handle.
pub type BatchKey = (MaterialId, MeshId);

#[derive(Debug)]
pub struct Batch {
    pub material: Arc<Material>,
    pub mesh: Arc<StaticMesh>,
    pub transforms: Vec<Mat4>,
}

impl Batch {
    pub fn render(&self, ctx: &mut impl RenderContext) {
        bind_transforms(ctx, &self.transforms);
        self.material.bind(ctx);
        self.mesh.draw(ctx, self.transforms.len() as u32);
    }
}

/// Groups objects for one frame into instanced draws. Batch order is
/// unspecified, transform order inside a batch follows insertion.
#[derive(Debug, Default)]
pub struct ObjectBatcher {
    batches: HashMap<BatchKey, Batch>,
}

impl ObjectBatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_object(&mut self, object: &SceneObject) {
        let key = (object.material.id(), object.mesh.id());
        self.batches
            .entry(key)
            .or_insert_with(|| Batch {
                material: object.material.clone(),
                mesh: object.mesh.clone(),
                transforms: Vec::new(),
            })
            .transforms
            .push(object.transform);
    }

    pub fn batches(&self) -> impl Iterator<Item = &Batch> {
        self.batches.values()
    }

    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    pub fn render(&self, ctx: &mut impl RenderContext) {
        debug!("Rendering {} batches", self.batches.len());
        for batch in self.batches.values() {
            batch.render(ctx);
        }
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use super::*;
    use crate::render::{
        context::{Command, CommandLog},
        mesh::MeshData,
        shader::{Program, ProgramStage},
    };

    fn material() -> Arc<Material> {
        Material::empty(Arc::new(Program::new(
            "gbuffer",
            String::new(),
            ProgramStage::Render,
        )))
    }

    fn at(x: f32) -> Mat4 {
        Mat4::from_translation(Vec3::new(x, 0.0, 0.0))
    }

    #[test]
    fn test_groups_by_material() {
        let mesh = Arc::new(StaticMesh::new(MeshData::cube()));
        let a = material();
        let b = material();

        let mut batcher = ObjectBatcher::new();
        for (i, material) in [&a, &b, &a, &b, &a].into_iter().enumerate() {
            batcher.add_object(&SceneObject::new(
                at(i as f32 + 1.0),
                mesh.clone(),
                material.clone(),
            ));
        }

        let mut log = CommandLog::new();
        batcher.render(&mut log);

        let mut counts: Vec<_> =
            log.mesh_draws().iter().map(|(_, count)| *count).collect();
        counts.sort();
        assert_eq!(counts, vec![2, 3]);

        for (index, command) in log.commands().iter().enumerate() {
            let Command::DrawMesh { instance_count, .. } = command else {
                continue;
            };
            let expected: &[f32] = if log.material_at(index) == Some(a.id()) {
                &[1.0, 3.0, 5.0]
            } else {
                &[2.0, 4.0]
            };
            assert_eq!(*instance_count as usize, expected.len());
            let transforms: Vec<Mat4> =
                expected.iter().map(|x| at(*x)).collect();
            assert_eq!(
                log.bound_at(index, BufferUsage::Storage, INSTANCES_SLOT),
                Some(encode_transforms(&transforms).as_slice())
            );
        }
    }

    #[test]
    fn test_same_material_different_meshes_split() {
        let material = material();
        let cube = Arc::new(StaticMesh::new(MeshData::cube()));
        let sphere = Arc::new(StaticMesh::new(MeshData::sphere(4, 6)));

        let mut batcher = ObjectBatcher::new();
        batcher.add_object(&SceneObject::new(
            Mat4::IDENTITY,
            cube.clone(),
            material.clone(),
        ));
        batcher.add_object(&SceneObject::new(
            Mat4::IDENTITY,
            sphere.clone(),
            material.clone(),
        ));
        batcher.add_object(&SceneObject::new(at(1.0), cube.clone(), material));
        assert_eq!(batcher.len(), 2);

        let mut log = CommandLog::new();
        batcher.render(&mut log);
        let mut draws = log.mesh_draws();
        draws.sort();
        let mut expected = vec![(cube.id(), 2), (sphere.id(), 1)];
        expected.sort();
        assert_eq!(draws, expected);
    }

    #[test]
    fn test_empty_batcher_draws_nothing() {
        let mut log = CommandLog::new();
        ObjectBatcher::new().render(&mut log);
        assert!(log.commands().is_empty());
    }

    #[test]
    fn test_transform_encoding_is_column_major() {
        let bytes = encode_transforms(&[at(7.0)]);
        assert_eq!(bytes.len(), 64);
        assert_eq!(f32::from_le_bytes(bytes[48..52].try_into().unwrap()), 7.0);
    }
}
