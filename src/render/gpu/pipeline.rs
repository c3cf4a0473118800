use std::sync::Arc;

use log::info;

use crate::render::{
    material::{BlendMode, CullMode, DepthTestMode},
    mesh::{Vertex, VertexTrait},
    shader::Program,
    ProgramId,
};

use super::layouts::{Layouts, TextureBinding};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexInput {
    Mesh,
    /// Positions come from `vertex_index`.
    None,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RenderPipelineKey {
    pub program: ProgramId,
    pub blend: BlendMode,
    pub depth_test: DepthTestMode,
    pub write_depth: bool,
    pub cull: CullMode,
    pub vertex: VertexInput,
    pub colors: Vec<wgpu::TextureFormat>,
    pub depth: Option<wgpu::TextureFormat>,
    pub textures: Vec<TextureBinding>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ComputePipelineKey {
    pub program: ProgramId,
    pub textures: Vec<TextureBinding>,
}

pub fn blend_state(mode: BlendMode) -> wgpu::BlendState {
    match mode {
        BlendMode::None => wgpu::BlendState::REPLACE,
        BlendMode::Alpha => wgpu::BlendState::ALPHA_BLENDING,
        BlendMode::Add => {
            let add = wgpu::BlendComponent {
                src_factor: wgpu::BlendFactor::One,
                dst_factor: wgpu::BlendFactor::One,
                operation: wgpu::BlendOperation::Add,
            };
            wgpu::BlendState {
                color: add,
                alpha: add,
            }
        }
    }
}

/// Depth is reverse-Z, cleared to 0.
pub fn depth_compare(mode: DepthTestMode) -> wgpu::CompareFunction {
    match mode {
        DepthTestMode::Standard => wgpu::CompareFunction::GreaterEqual,
        DepthTestMode::Reversed => wgpu::CompareFunction::LessEqual,
        DepthTestMode::Equal => wgpu::CompareFunction::Equal,
        DepthTestMode::Always | DepthTestMode::None => {
            wgpu::CompareFunction::Always
        }
    }
}

pub fn cull_face(mode: CullMode) -> wgpu::Face {
    match mode {
        CullMode::Backface => wgpu::Face::Back,
        CullMode::Frontface => wgpu::Face::Front,
    }
}

fn pipeline_layout(
    device: &wgpu::Device,
    layouts: &Layouts,
    label: &str,
    textures: &[TextureBinding],
) -> wgpu::PipelineLayout {
    let texture_layout = layouts.textures(device, textures);
    device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(label),
        bind_group_layouts: &[&layouts.frame, &texture_layout, &layouts.params],
        push_constant_ranges: &[],
    })
}

pub fn create_render_pipeline(
    device: &wgpu::Device,
    layouts: &Layouts,
    program: &Program,
    key: &RenderPipelineKey,
) -> Arc<wgpu::RenderPipeline> {
    info!("Creating render pipeline for {} ({:?})", program.name(), key.vertex);
    let module = program.resident(device);
    let layout = pipeline_layout(
        device,
        layouts,
        &format!("{}_layout", program.name()),
        &key.textures,
    );

    let mesh_layout = [Vertex::desc()];
    let buffers: &[wgpu::VertexBufferLayout] = match key.vertex {
        VertexInput::Mesh => &mesh_layout,
        VertexInput::None => &[],
    };

    let targets: Vec<_> = key
        .colors
        .iter()
        .map(|format| {
            Some(wgpu::ColorTargetState {
                format: *format,
                blend: Some(blend_state(key.blend)),
                write_mask: wgpu::ColorWrites::ALL,
            })
        })
        .collect();

    let depth_stencil = key.depth.map(|format| wgpu::DepthStencilState {
        format,
        depth_write_enabled: key.write_depth,
        depth_compare: depth_compare(key.depth_test),
        stencil: wgpu::StencilState::default(),
        bias: wgpu::DepthBiasState::default(),
    });

    Arc::new(device.create_render_pipeline(
        &wgpu::RenderPipelineDescriptor {
            label: Some(&format!("{}_pipeline", program.name())),
            layout: Some(&layout),
            vertex: wgpu::VertexState {
                module,
                entry_point: "vs_main",
                buffers,
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module,
                entry_point: "fs_main",
                compilation_options: Default::default(),
                targets: &targets,
            }),
            primitive: wgpu::PrimitiveState {
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: Some(cull_face(key.cull)),
                ..Default::default()
            },
            depth_stencil,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        },
    ))
}

pub fn create_compute_pipeline(
    device: &wgpu::Device,
    layouts: &Layouts,
    program: &Program,
    key: &ComputePipelineKey,
) -> Arc<wgpu::ComputePipeline> {
    info!("Creating compute pipeline for {}", program.name());
    let layout = pipeline_layout(
        device,
        layouts,
        &format!("{}_layout", program.name()),
        &key.textures,
    );
    Arc::new(device.create_compute_pipeline(
        &wgpu::ComputePipelineDescriptor {
            label: Some(&format!("{}_pipeline", program.name())),
            layout: Some(&layout),
            module: program.resident(device),
            entry_point: "cs_main",
            compilation_options: Default::default(),
            cache: None,
        },
    ))
}
