use std::sync::Arc;

use crate::render::{
    camera::Camera,
    context::RenderContext,
    material::Material,
    shader::Program,
    texture::{GBuffer, Texture},
};

use super::Scene;

/// A camera looking at an optional scene. Every pass is a no-op until a
/// scene is attached.
#[derive(Debug, Default)]
pub struct SceneView {
    pub camera: Camera,
    scene: Option<Arc<Scene>>,
}

impl SceneView {
    pub fn new(scene: Option<Arc<Scene>>) -> Self {
        Self {
            camera: Camera::new(),
            scene,
        }
    }

    pub fn scene(&self) -> Option<&Arc<Scene>> {
        self.scene.as_ref()
    }

    /// Swaps the scene, keeping the camera where it is.
    pub fn set_scene(&mut self, scene: Arc<Scene>) {
        self.scene = Some(scene);
    }

    pub fn render(&self, ctx: &mut impl RenderContext) {
        if let Some(scene) = &self.scene {
            scene.render(ctx, &self.camera);
        }
    }

    pub fn deferred_lighting(
        &self,
        ctx: &mut impl RenderContext,
        sun_material: &Material,
        point_light_material: &Material,
    ) {
        if let Some(scene) = &self.scene {
            scene.deferred_lighting(
                ctx,
                &self.camera,
                sun_material,
                point_light_material,
            );
        }
    }

    pub fn debug_light_volumes(
        &self,
        ctx: &mut impl RenderContext,
        debug_material: &Material,
    ) {
        if let Some(scene) = &self.scene {
            scene.debug_light_volumes(ctx, &self.camera, debug_material);
        }
    }

    pub fn tiled_deferred_lighting(
        &self,
        ctx: &mut impl RenderContext,
        program: &Arc<Program>,
        g_buffer: &GBuffer,
        out: &Arc<Texture>,
    ) {
        if let Some(scene) = &self.scene {
            scene.tiled_deferred_lighting(
                ctx,
                &self.camera,
                program,
                g_buffer,
                out,
            );
        }
    }
}
