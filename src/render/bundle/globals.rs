use encase::ShaderType;
use glam::{Mat4, Vec3};

use crate::{
    fatal,
    render::context::{BufferUsage, RenderContext},
};

use super::FRAME_SLOT;

/// Per-frame uniform. WGSL:
///
/// ```wgsl
/// struct FrameData {
///     view_proj: mat4x4<f32>,
///     point_light_count: u32,
///     sun_color: vec3<f32>,
///     sun_dir: vec3<f32>,
/// }
/// ```
#[derive(Debug, Default, Clone, Copy, PartialEq, ShaderType)]
pub struct FrameData {
    pub view_proj: Mat4,
    pub point_light_count: u32,
    pub sun_color: Vec3,
    pub sun_dir: Vec3,
}

impl FrameData {
    pub fn as_bytes(&self) -> Vec<u8> {
        let mut buffer = encase::UniformBuffer::new(Vec::<u8>::new());
        if let Err(err) = buffer.write(self) {
            fatal!("Encoding frame data: {}", err);
        }
        buffer.into_inner()
    }

    pub fn bind(&self, ctx: &mut impl RenderContext) {
        ctx.bind_buffer(
            BufferUsage::Uniform,
            FRAME_SLOT,
            "frame_data",
            &self.as_bytes(),
        );
    }
}
