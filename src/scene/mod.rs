use std::sync::Arc;

use glam::{UVec2, UVec3, Vec3};
use log::debug;

use crate::{
    fatal,
    render::{
        bundle::{
            globals::FrameData,
            lights::PointLightData,
            model::{bind_transforms, ObjectBatcher},
        },
        camera::Camera,
        context::{AccessType, RenderContext},
        culling::cull_in_view,
        material::Material,
        mesh::StaticMesh,
        shader::{Program, UniformValue},
        texture::{GBuffer, Texture},
    },
};

pub mod light;
pub mod loader;
pub mod object;
pub mod view;

pub use light::PointLight;
pub use object::SceneObject;
pub use view::SceneView;

pub const SUN_COLOR: Vec3 = Vec3::ONE;

/// Parameter of the point light program holding the index of the light being
/// shaded in the light storage array.
pub const LIGHT_INDEX_UNIFORM: &str = "light_index";

/// Tiled lighting workgroups cover `TILE_SIZE` x `TILE_SIZE` pixels.
pub const TILE_SIZE: u32 = 16;

/// Texture slots read by the lighting passes.
pub const G_COLOR_SLOT: u32 = 0;
pub const G_NORMAL_SLOT: u32 = 1;
pub const G_DEPTH_SLOT: u32 = 2;
/// Image slot written by tiled lighting.
pub const LIT_IMAGE_SLOT: u32 = 3;

pub fn tile_count(screen_size: UVec2) -> UVec3 {
    UVec3::new(
        screen_size.x.div_ceil(TILE_SIZE),
        screen_size.y.div_ceil(TILE_SIZE),
        1,
    )
}

/// Objects and point lights, plus the per-frame passes that draw them.
///
/// Nothing is kept between frames: each pass uploads what it needs and the
/// batches it builds are dropped before it returns. Light order is the index
/// seen by shaders and stays fixed while a frame is recorded.
#[derive(Debug)]
pub struct Scene {
    objects: Vec<SceneObject>,
    point_light_volume: Option<Arc<StaticMesh>>,
    point_lights: Vec<PointLight>,
    sun_direction: Vec3,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene {
    pub fn new() -> Self {
        Self {
            objects: Vec::new(),
            point_light_volume: None,
            point_lights: Vec::new(),
            sun_direction: Vec3::new(0.2, 1.0, 0.1),
        }
    }

    pub fn add_object(&mut self, object: SceneObject) {
        self.objects.push(object);
    }

    pub fn add_point_light(&mut self, light: PointLight) {
        self.point_lights.push(light);
    }

    pub fn object(&self, index: usize) -> Option<&SceneObject> {
        self.objects.get(index)
    }

    pub fn objects(&self) -> &[SceneObject] {
        &self.objects
    }

    pub fn point_lights(&self) -> &[PointLight] {
        &self.point_lights
    }

    pub fn point_light_volume(&self) -> Option<&Arc<StaticMesh>> {
        self.point_light_volume.as_ref()
    }

    pub fn set_point_light_volume(&mut self, mesh: Arc<StaticMesh>) {
        self.point_light_volume = Some(mesh);
    }

    /// Direction towards the sun. Normalized when uploaded.
    pub fn set_sun_direction(&mut self, direction: Vec3) {
        self.sun_direction = direction;
    }

    pub fn sun_direction(&self) -> Vec3 {
        self.sun_direction
    }

    pub fn frame_data(&self, camera: &Camera) -> FrameData {
        FrameData {
            view_proj: camera.view_proj_matrix(),
            point_light_count: self.point_lights.len() as u32,
            sun_color: SUN_COLOR,
            sun_dir: self.sun_direction.normalize_or_zero(),
        }
    }

    pub fn light_data(&self) -> PointLightData {
        PointLightData::new(
            self.point_lights.iter().map(PointLight::record).collect(),
        )
    }

    /// Binds slot 0 (frame uniform) and slot 1 (light array).
    pub fn upload_frame(&self, ctx: &mut impl RenderContext, camera: &Camera) {
        self.frame_data(camera).bind(ctx);
        self.light_data().bind(ctx);
    }

    /// Geometry pass: culls every object against the camera frustum and
    /// draws the survivors in batches.
    pub fn render(&self, ctx: &mut impl RenderContext, camera: &Camera) {
        self.upload_frame(ctx, camera);

        let frustum = camera.build_frustum();
        let view = camera.view_matrix();
        let mut batcher = ObjectBatcher::new();
        let mut visible = 0;
        for object in &self.objects {
            let sphere = object.mesh.bounding_sphere();
            if cull_in_view(&sphere, &object.transform, &view, &frustum) {
                continue;
            }
            batcher.add_object(object);
            visible += 1;
        }
        debug!(
            "{}/{} objects visible in {} batches",
            visible,
            self.objects.len(),
            batcher.len()
        );

        batcher.render(ctx);
    }

    /// Accumulates the sun with a fullscreen triangle, then every point light
    /// through its light volume. `point_light_material` is expected to blend
    /// additively and cull front faces.
    pub fn deferred_lighting(
        &self,
        ctx: &mut impl RenderContext,
        camera: &Camera,
        sun_material: &Material,
        point_light_material: &Material,
    ) {
        self.upload_frame(ctx, camera);

        sun_material.bind(ctx);
        ctx.draw_fullscreen_triangle();

        self.draw_light_volumes(ctx, point_light_material, true);
    }

    /// Draws each light volume with `debug_material`.
    pub fn debug_light_volumes(
        &self,
        ctx: &mut impl RenderContext,
        camera: &Camera,
        debug_material: &Material,
    ) {
        self.upload_frame(ctx, camera);
        self.draw_light_volumes(ctx, debug_material, false);
    }

    fn draw_light_volumes(
        &self,
        ctx: &mut impl RenderContext,
        material: &Material,
        with_index: bool,
    ) {
        if self.point_lights.is_empty() {
            return;
        }
        let Some(volume) = &self.point_light_volume else {
            fatal!(
                "{} point lights but no light volume mesh set",
                self.point_lights.len()
            );
        };

        material.bind(ctx);
        for (index, light) in self.point_lights.iter().enumerate() {
            bind_transforms(ctx, &[light.volume_transform()]);
            if with_index {
                material.set_uniform(
                    ctx,
                    LIGHT_INDEX_UNIFORM,
                    UniformValue::U32(index as u32),
                );
            }
            volume.draw(ctx, 1);
        }
    }

    /// Compute variant of the lighting pass: one workgroup per screen tile,
    /// each shading its pixels against every light. `out` is complete once
    /// the trailing barrier is passed.
    pub fn tiled_deferred_lighting(
        &self,
        ctx: &mut impl RenderContext,
        camera: &Camera,
        program: &Arc<Program>,
        g_buffer: &GBuffer,
        out: &Arc<Texture>,
    ) {
        let screen_size = g_buffer.size();
        if screen_size.x == 0 || screen_size.y == 0 {
            fatal!("Tiled lighting on an empty screen {}", screen_size);
        }

        self.upload_frame(ctx, camera);

        ctx.bind_program(program);
        ctx.bind_texture(&g_buffer.color, G_COLOR_SLOT);
        ctx.bind_texture(&g_buffer.normal, G_NORMAL_SLOT);
        ctx.bind_texture(&g_buffer.depth, G_DEPTH_SLOT);
        ctx.bind_image(out, LIT_IMAGE_SLOT, AccessType::WriteOnly);
        ctx.dispatch(tile_count(screen_size));
        ctx.memory_barrier();
    }
}

#[cfg(test)]
mod tests {
    use glam::Mat4;

    use super::*;
    use crate::render::{
        bundle::{
            model::encode_transforms, FRAME_SLOT, INSTANCES_SLOT, LIGHTS_SLOT,
        },
        context::{BufferUsage, Command, CommandLog},
        material::{BlendMode, CullMode},
        mesh::MeshData,
        shader::ProgramStage,
        texture::ImageFormat,
    };

    fn program(name: &str, uniforms: &[&str]) -> Arc<Program> {
        Arc::new(
            Program::new(name, String::new(), ProgramStage::Render)
                .with_uniforms(uniforms),
        )
    }

    fn camera() -> Camera {
        Camera::looking_at(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO)
    }

    fn lit_scene() -> Scene {
        let mut scene = Scene::new();
        let cube = Arc::new(StaticMesh::new(MeshData::cube()));
        let material = Material::empty(program("gbuffer", &[]));
        scene.add_object(SceneObject::new(
            Mat4::IDENTITY,
            cube.clone(),
            material.clone(),
        ));
        scene.add_object(SceneObject::new(
            Mat4::from_translation(Vec3::new(1.0, 0.0, 0.0)),
            cube,
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
        scene.add_point_light(PointLight::new(Vec3::ZERO, Vec3::ONE, 3.0));
        scene.set_point_light_volume(Arc::new(StaticMesh::new(
            MeshData::sphere(8, 12),
        )));
        scene
    }

    fn point_light_material() -> Material {
        let mut material = Material::deferred_light(program(
            "deferred_point_light",
            &[LIGHT_INDEX_UNIFORM],
        ));
        material.set_blend_mode(BlendMode::Add);
        material.set_cull_mode(CullMode::Frontface);
        material
    }

    #[test]
    fn test_render_is_idempotent() {
        let scene = lit_scene();
        let camera = camera();

        let mut first = CommandLog::new();
        scene.render(&mut first, &camera);
        let mut second = CommandLog::new();
        scene.render(&mut second, &camera);

        for (usage, slot) in [
            (BufferUsage::Uniform, FRAME_SLOT),
            (BufferUsage::Storage, LIGHTS_SLOT),
            (BufferUsage::Storage, INSTANCES_SLOT),
        ] {
            assert_eq!(first.uploads(usage, slot), second.uploads(usage, slot));
        }
    }

    #[test]
    fn test_point_lights_draw_with_their_index() {
        let scene = lit_scene();
        let sun = Material::deferred_light(program("deferred_sun", &[]));
        let point = point_light_material();

        let mut log = CommandLog::new();
        scene.deferred_lighting(&mut log, &camera(), &sun, &point);

        let volume = scene.point_light_volume().unwrap().id();
        let lights = log.uploads(BufferUsage::Storage, LIGHTS_SLOT);
        assert_eq!(lights.len(), 1);
        let lights = lights[0];

        let mut drawn = 0;
        for (index, command) in log.commands().iter().enumerate() {
            let Command::DrawMesh {
                mesh,
                instance_count,
            } = command
            else {
                continue;
            };
            assert_eq!(*mesh, volume);
            assert_eq!(*instance_count, 1);
            assert_eq!(log.material_at(index), Some(point.id()));
            assert_eq!(
                log.uniform_at(index, LIGHT_INDEX_UNIFORM),
                Some(UniformValue::U32(drawn as u32))
            );

            // Record `drawn` of the uploaded array is this light.
            let record = &lights[drawn * 32..drawn * 32 + 32];
            let light = scene.point_lights()[drawn];
            let radius = f32::from_le_bytes(record[12..16].try_into().unwrap());
            assert_eq!(radius, light.radius);
            assert_eq!(
                log.bound_at(index, BufferUsage::Storage, INSTANCES_SLOT),
                Some(encode_transforms(&[light.volume_transform()]).as_slice())
            );
            drawn += 1;
        }
        assert_eq!(drawn, 3);
    }

    #[test]
    fn test_debug_volumes_draw_each_light_unindexed() {
        let scene = lit_scene();
        let debug = Material::empty(program("debug_volume", &[]));

        let mut log = CommandLog::new();
        scene.debug_light_volumes(&mut log, &camera(), &debug);

        let volume = scene.point_light_volume().unwrap().id();
        assert_eq!(log.mesh_draws(), vec![(volume, 1); 3]);
        assert_eq!(log.uploads(BufferUsage::Uniform, FRAME_SLOT).len(), 1);
        assert_eq!(log.uploads(BufferUsage::Storage, INSTANCES_SLOT).len(), 3);
        assert!(!log
            .commands()
            .iter()
            .any(|cmd| matches!(cmd, Command::SetUniform { .. })));
    }

    #[test]
    fn test_sun_pass_comes_first() {
        let scene = lit_scene();
        let sun = Material::deferred_light(program("deferred_sun", &[]));
        let point = point_light_material();

        let mut log = CommandLog::new();
        scene.deferred_lighting(&mut log, &camera(), &sun, &point);

        let first_draw = log
            .commands()
            .iter()
            .position(|cmd| {
                matches!(
                    cmd,
                    Command::DrawMesh { .. } | Command::DrawFullscreenTriangle
                )
            })
            .unwrap();
        assert_eq!(
            log.commands()[first_draw],
            Command::DrawFullscreenTriangle
        );
        assert_eq!(log.material_at(first_draw), Some(sun.id()));
        assert_eq!(log.draw_count(), 4);
    }

    #[test]
    fn test_lighting_matches_geometry_pass_uploads() {
        let scene = lit_scene();
        let camera = camera();
        let sun = Material::deferred_light(program("deferred_sun", &[]));

        let mut log = CommandLog::new();
        scene.render(&mut log, &camera);
        let point = point_light_material();
        scene.deferred_lighting(&mut log, &camera, &sun, &point);

        let frames = log.uploads(BufferUsage::Uniform, FRAME_SLOT);
        let lights = log.uploads(BufferUsage::Storage, LIGHTS_SLOT);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0], frames[1]);
        assert_eq!(lights[0], lights[1]);
    }

    #[test]
    fn test_empty_scene() {
        let scene = Scene::new();
        let mut log = CommandLog::new();
        scene.render(&mut log, &camera());

        let lights = log.uploads(BufferUsage::Storage, LIGHTS_SLOT);
        assert_eq!(lights.len(), 1);
        assert_eq!(lights[0].len(), 32);
        assert_eq!(log.draw_count(), 0);

        let sun = Material::deferred_light(program("deferred_sun", &[]));
        scene.deferred_lighting(&mut log, &camera(), &sun, &sun);
        assert_eq!(log.draw_count(), 1);
    }

    #[test]
    fn test_single_visible_object() {
        let mut scene = Scene::new();
        let mesh = Arc::new(StaticMesh::new(MeshData::sphere(8, 12)));
        let sphere = mesh.bounding_sphere();
        assert!(sphere.center.abs_diff_eq(Vec3::ZERO, 1e-5));
        assert!((sphere.radius - 1.0).abs() < 1e-5);
        let material = Material::empty(program("gbuffer", &[]));
        scene.add_object(SceneObject::new(
            Mat4::IDENTITY,
            mesh.clone(),
            material.clone(),
        ));

        let mut log = CommandLog::new();
        scene.render(&mut log, &camera());

        assert_eq!(log.draw_count(), 1);
        assert_eq!(log.mesh_draws(), vec![(mesh.id(), 1)]);
        let draw = log.commands().len() - 1;
        assert_eq!(log.material_at(draw), Some(material.id()));
    }

    #[test]
    fn test_objects_behind_camera_are_culled() {
        let mut scene = lit_scene();
        let objects = scene.objects().to_vec();
        scene.add_object(SceneObject::new(
            Mat4::from_translation(Vec3::new(0.0, 0.0, 20.0)),
            objects[0].mesh.clone(),
            Material::empty(program("gbuffer", &[])),
        ));

        let mut log = CommandLog::new();
        scene.render(&mut log, &camera());
        assert_eq!(log.mesh_draws(), vec![(objects[0].mesh.id(), 2)]);
    }

    #[test]
    fn test_frame_data() {
        let mut scene = lit_scene();
        scene.set_sun_direction(Vec3::new(0.0, 2.0, 0.0));
        let data = scene.frame_data(&camera());
        assert_eq!(data.point_light_count, 3);
        assert_eq!(data.sun_dir, Vec3::Y);
        assert_eq!(data.sun_color, SUN_COLOR);
        assert_eq!(data.view_proj, camera().view_proj_matrix());
    }

    #[test]
    #[should_panic]
    fn test_lights_without_volume_are_fatal() {
        let mut scene = Scene::new();
        scene.add_point_light(PointLight::default());
        let sun = Material::deferred_light(program("deferred_sun", &[]));
        let mut log = CommandLog::new();
        scene.debug_light_volumes(&mut log, &camera(), &sun);
    }

    #[test]
    fn test_tiled_lighting_dispatch() {
        let scene = lit_scene();
        let g_buffer = GBuffer::new(UVec2::new(1600, 900));
        let out = Arc::new(Texture::new(
            g_buffer.size(),
            ImageFormat::Rgba16Float,
        ));
        let compute = Arc::new(Program::new(
            "tiled_lighting",
            String::new(),
            ProgramStage::Compute,
        ));

        let mut log = CommandLog::new();
        scene.tiled_deferred_lighting(
            &mut log,
            &camera(),
            &compute,
            &g_buffer,
            &out,
        );

        let commands = log.commands();
        let dispatch = commands
            .iter()
            .position(|cmd| matches!(cmd, Command::Dispatch(_)))
            .unwrap();
        assert_eq!(
            commands[dispatch],
            Command::Dispatch(UVec3::new(100, 57, 1))
        );
        assert_eq!(commands[dispatch + 1], Command::MemoryBarrier);
        assert!(commands.contains(&Command::BindImage {
            texture: out.id(),
            slot: LIT_IMAGE_SLOT,
            access: AccessType::WriteOnly,
        }));
        assert!(commands.contains(&Command::BindTexture {
            texture: g_buffer.depth.id(),
            slot: G_DEPTH_SLOT,
        }));
    }

    #[test]
    fn test_tile_count_rounds_up() {
        assert_eq!(tile_count(UVec2::new(16, 16)), UVec3::new(1, 1, 1));
        assert_eq!(tile_count(UVec2::new(17, 1)), UVec3::new(2, 1, 1));
    }

    #[test]
    #[should_panic]
    fn test_tiled_lighting_on_empty_screen_is_fatal() {
        let scene = Scene::new();
        let g_buffer = GBuffer::new(UVec2::ZERO);
        let out = Arc::new(Texture::new(UVec2::ZERO, ImageFormat::Rgba16Float));
        let compute = Arc::new(Program::new(
            "tiled_lighting",
            String::new(),
            ProgramStage::Compute,
        ));
        scene.tiled_deferred_lighting(
            &mut CommandLog::new(),
            &camera(),
            &compute,
            &g_buffer,
            &out,
        );
    }
}
