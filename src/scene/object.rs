use std::sync::Arc;

use glam::Mat4;

use crate::render::{
    bundle::model::bind_transforms, context::RenderContext,
    material::Material, mesh::StaticMesh,
};

/// A mesh placed in the world. Mesh and material are shared handles, several
/// objects holding the same pair end up in the same batch.
#[derive(Debug, Clone)]
pub struct SceneObject {
    /// World from local.
    pub transform: Mat4,
    pub mesh: Arc<StaticMesh>,
    pub material: Arc<Material>,
}

impl SceneObject {
    pub fn new(
        transform: Mat4,
        mesh: Arc<StaticMesh>,
        material: Arc<Material>,
    ) -> Self {
        Self {
            transform,
            mesh,
            material,
        }
    }

    /// Draws this object alone, outside of any batch.
    pub fn render(&self, ctx: &mut impl RenderContext) {
        bind_transforms(ctx, &[self.transform]);
        self.material.bind(ctx);
        self.mesh.draw(ctx, 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{
        bundle::{model::encode_transforms, INSTANCES_SLOT},
        context::{BufferUsage, Command, CommandLog},
        mesh::MeshData,
        shader::{Program, ProgramStage},
    };

    #[test]
    fn test_single_object_render() {
        let transform = Mat4::from_scale(glam::Vec3::splat(2.0));
        let object = SceneObject::new(
            transform,
            Arc::new(StaticMesh::new(MeshData::cube())),
            Material::empty(Arc::new(Program::new(
                "gbuffer",
                String::new(),
                ProgramStage::Render,
            ))),
        );

        let mut log = CommandLog::new();
        object.render(&mut log);

        assert_eq!(log.mesh_draws(), vec![(object.mesh.id(), 1)]);
        assert_eq!(
            log.commands()[1],
            Command::BindMaterial(object.material.id())
        );
        assert_eq!(
            log.bound_at(2, BufferUsage::Storage, INSTANCES_SLOT),
            Some(encode_transforms(&[transform]).as_slice())
        );
    }
}
