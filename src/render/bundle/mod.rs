//! Shader-visible records bound at the fixed scene slots.

pub mod globals;
pub mod lights;
pub mod model;

/// `FrameData`, uniform.
pub const FRAME_SLOT: u32 = 0;
/// `PointLightData`, storage.
pub const LIGHTS_SLOT: u32 = 1;
/// One `mat4x4<f32>` per instance, storage.
pub const INSTANCES_SLOT: u32 = 2;

pub fn layout_entries() -> [wgpu::BindGroupLayoutEntry; 3] {
    let stages = wgpu::ShaderStages::VERTEX
        | wgpu::ShaderStages::FRAGMENT
        | wgpu::ShaderStages::COMPUTE;
    let entry = |binding, ty| wgpu::BindGroupLayoutEntry {
        binding,
        visibility: stages,
        ty: wgpu::BindingType::Buffer {
            ty,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    };
    [
        entry(FRAME_SLOT, wgpu::BufferBindingType::Uniform),
        entry(
            LIGHTS_SLOT,
            wgpu::BufferBindingType::Storage { read_only: true },
        ),
        entry(
            INSTANCES_SLOT,
            wgpu::BufferBindingType::Storage { read_only: true },
        ),
    ]
}
