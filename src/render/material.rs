use std::sync::Arc;

use super::{
    context::RenderContext,
    shader::{Program, UniformValue},
    texture::Texture,
    MaterialId,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum BlendMode {
    #[default]
    None,
    Alpha,
    Add,
}

/// Depth comparison against a reverse-Z buffer (cleared to 0, nearer is
/// larger). `Standard` keeps fragments in front of what is stored,
/// `Reversed` keeps fragments behind it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum DepthTestMode {
    #[default]
    Standard,
    Reversed,
    Equal,
    Always,
    None,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum CullMode {
    #[default]
    Backface,
    Frontface,
}

/// Program, textures and fixed-function state applied together by
/// [`RenderContext::bind_material`].
///
/// Identity matters: two objects batch together only when they hold the same
/// `Arc<Material>`, never because two materials have equal settings.
#[derive(Debug)]
pub struct Material {
    blend_mode: BlendMode,
    cull_mode: CullMode,
    depth_test_mode: DepthTestMode,
    id: MaterialId,
    program: Arc<Program>,
    textures: Vec<(u32, Arc<Texture>)>,
    write_depth: bool,
}

impl Material {
    pub fn new(program: Arc<Program>) -> Self {
        Self {
            blend_mode: BlendMode::None,
            cull_mode: CullMode::Backface,
            depth_test_mode: DepthTestMode::Standard,
            id: MaterialId::next(),
            program,
            textures: Vec::new(),
            write_depth: true,
        }
    }

    pub fn empty(program: Arc<Program>) -> Arc<Self> {
        Arc::new(Self::new(program))
    }

    /// Albedo at slot 0.
    pub fn textured(program: Arc<Program>, albedo: Arc<Texture>) -> Self {
        let mut material = Self::new(program);
        material.set_texture(0, albedo);
        material
    }

    /// Albedo at slot 0, tangent-space normals at slot 1.
    pub fn textured_normal_mapped(
        program: Arc<Program>,
        albedo: Arc<Texture>,
        normal: Arc<Texture>,
    ) -> Self {
        let mut material = Self::textured(program, albedo);
        material.set_texture(1, normal);
        material
    }

    /// Lighting pass material: reads the g-buffer, never writes depth.
    pub fn deferred_light(program: Arc<Program>) -> Self {
        let mut material = Self::new(program);
        material.set_write_depth(false);
        material
    }

    pub fn id(&self) -> MaterialId {
        self.id
    }

    pub fn program(&self) -> &Arc<Program> {
        &self.program
    }

    pub fn textures(&self) -> &[(u32, Arc<Texture>)] {
        &self.textures
    }

    pub fn blend_mode(&self) -> BlendMode {
        self.blend_mode
    }

    pub fn depth_test_mode(&self) -> DepthTestMode {
        self.depth_test_mode
    }

    pub fn write_depth(&self) -> bool {
        self.write_depth
    }

    pub fn cull_mode(&self) -> CullMode {
        self.cull_mode
    }

    pub fn set_blend_mode(&mut self, blend: BlendMode) {
        self.blend_mode = blend;
    }

    pub fn set_depth_test_mode(&mut self, depth: DepthTestMode) {
        self.depth_test_mode = depth;
    }

    pub fn set_write_depth(&mut self, write: bool) {
        self.write_depth = write;
    }

    pub fn set_cull_mode(&mut self, face: CullMode) {
        self.cull_mode = face;
    }

    /// Binds `texture` at `slot`, replacing the texture already there.
    pub fn set_texture(&mut self, slot: u32, texture: Arc<Texture>) {
        match self.textures.iter_mut().find(|(s, _)| *s == slot) {
            Some(entry) => entry.1 = texture,
            None => {
                self.textures.push((slot, texture));
                self.textures.sort_by_key(|(s, _)| *s);
            }
        }
    }

    pub fn bind(&self, ctx: &mut impl RenderContext) {
        ctx.bind_material(self);
    }

    /// Only meaningful after [`Material::bind`].
    pub fn set_uniform(
        &self,
        ctx: &mut impl RenderContext,
        name: &str,
        value: UniformValue,
    ) {
        ctx.set_uniform(name, value);
    }
}
