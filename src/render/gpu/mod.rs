//! wgpu implementation of [`RenderContext`].
//!
//! A [`FrameRecorder`] resolves every bind into concrete wgpu objects while
//! recording (pipelines, bind groups, buffers) and keeps them in an op list.
//! [`FrameRecorder::finish`] replays that list into passes: consecutive draws
//! share a render pass, consecutive dispatches share a compute pass and a
//! memory barrier closes whichever pass is open.

use std::{cell::RefCell, collections::HashMap, sync::Arc};

use glam::UVec3;
use log::debug;
use wgpu::util::DeviceExt;

use crate::fatal;

use super::{
    bundle::{FRAME_SLOT, INSTANCES_SLOT, LIGHTS_SLOT},
    context::{AccessType, BufferUsage, RenderContext},
    material::{DepthTestMode, Material},
    mesh::{GpuMesh, StaticMesh},
    shader::{Program, ProgramStage, UniformValue, PARAM_WORDS},
    texture::Texture,
};

pub mod layouts;
pub mod pipeline;

use layouts::{Layouts, TextureBinding, SAMPLER_BINDING};
use pipeline::{
    create_compute_pipeline, create_render_pipeline, ComputePipelineKey,
    RenderPipelineKey, VertexInput,
};

const DUMMY_BUFFER_SIZE: u64 = 256;

/// Device-wide objects shared by every recorder: layouts, pipeline caches,
/// the sampler and the buffer standing in for unbound scene slots.
pub struct GpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    compute_pipelines:
        RefCell<HashMap<ComputePipelineKey, Arc<wgpu::ComputePipeline>>>,
    dummy: wgpu::Buffer,
    layouts: Layouts,
    render_pipelines:
        RefCell<HashMap<RenderPipelineKey, Arc<wgpu::RenderPipeline>>>,
    sampler: wgpu::Sampler,
}

impl GpuContext {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        let dummy = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("unbound_slot_buffer"),
            size: DUMMY_BUFFER_SIZE,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::STORAGE,
            mapped_at_creation: false,
        });
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("material_sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        let layouts = Layouts::new(&device);
        Self {
            device,
            queue,
            compute_pipelines: RefCell::new(HashMap::new()),
            dummy,
            layouts,
            render_pipelines: RefCell::new(HashMap::new()),
            sampler,
        }
    }

    pub fn recorder<'a>(
        &'a self,
        framebuffer: Framebuffer<'a>,
    ) -> FrameRecorder<'a> {
        FrameRecorder::new(self, framebuffer)
    }

    pub fn color_target<'a>(
        &'a self,
        texture: &'a Texture,
        clear: Option<wgpu::Color>,
    ) -> ColorTarget<'a> {
        ColorTarget {
            view: &texture.resident(&self.device, &self.queue).view,
            format: texture.format().to_wgpu(),
            clear,
        }
    }

    pub fn depth_target<'a>(
        &'a self,
        texture: &'a Texture,
        ops: DepthOps,
    ) -> DepthTarget<'a> {
        if !texture.format().is_depth() {
            fatal!("{:?} is not a depth format", texture.format());
        }
        DepthTarget {
            view: &texture.resident(&self.device, &self.queue).view,
            format: texture.format().to_wgpu(),
            ops,
        }
    }

    fn render_pipeline(
        &self,
        program: &Program,
        key: RenderPipelineKey,
    ) -> Arc<wgpu::RenderPipeline> {
        self.render_pipelines
            .borrow_mut()
            .entry(key)
            .or_insert_with_key(|key| {
                create_render_pipeline(
                    &self.device,
                    &self.layouts,
                    program,
                    key,
                )
            })
            .clone()
    }

    fn compute_pipeline(
        &self,
        program: &Program,
        key: ComputePipelineKey,
    ) -> Arc<wgpu::ComputePipeline> {
        self.compute_pipelines
            .borrow_mut()
            .entry(key)
            .or_insert_with_key(|key| {
                create_compute_pipeline(
                    &self.device,
                    &self.layouts,
                    program,
                    key,
                )
            })
            .clone()
    }

    fn texture_group(
        &self,
        bindings: &[(TextureBinding, Arc<Texture>)],
    ) -> Arc<wgpu::BindGroup> {
        let signature: Vec<_> =
            bindings.iter().map(|(binding, _)| *binding).collect();
        let layout = self.layouts.textures(&self.device, &signature);

        let mut entries: Vec<_> = bindings
            .iter()
            .map(|(binding, texture)| wgpu::BindGroupEntry {
                binding: binding.slot(),
                resource: wgpu::BindingResource::TextureView(
                    &texture.resident(&self.device, &self.queue).view,
                ),
            })
            .collect();
        entries.push(wgpu::BindGroupEntry {
            binding: SAMPLER_BINDING,
            resource: wgpu::BindingResource::Sampler(&self.sampler),
        });

        Arc::new(self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("textures_bind_group"),
            layout: &layout,
            entries: &entries,
        }))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ColorTarget<'a> {
    pub view: &'a wgpu::TextureView,
    pub format: wgpu::TextureFormat,
    /// Cleared by the first render pass when set, loaded otherwise.
    pub clear: Option<wgpu::Color>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepthOps {
    /// Cleared to 0 (far plane under reverse-Z) by the first render pass.
    Clear,
    Load,
    /// Attached for depth testing only, so the same texture can be sampled.
    ReadOnly,
}

#[derive(Debug, Clone, Copy)]
pub struct DepthTarget<'a> {
    pub view: &'a wgpu::TextureView,
    pub format: wgpu::TextureFormat,
    pub ops: DepthOps,
}

/// Attachments shared by every draw of a recorder.
#[derive(Debug, Clone, Default)]
pub struct Framebuffer<'a> {
    pub colors: Vec<ColorTarget<'a>>,
    pub depth: Option<DepthTarget<'a>>,
}

impl<'a> Framebuffer<'a> {
    /// For compute-only recorders.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn color(target: ColorTarget<'a>) -> Self {
        Self {
            colors: vec![target],
            depth: None,
        }
    }

    pub fn with_depth(mut self, depth: DepthTarget<'a>) -> Self {
        self.depth = Some(depth);
        self
    }

    fn is_empty(&self) -> bool {
        self.colors.is_empty() && self.depth.is_none()
    }
}

struct DrawOp {
    bind_groups: [Arc<wgpu::BindGroup>; 3],
    instance_count: u32,
    mesh: Option<Arc<GpuMesh>>,
    pipeline: Arc<wgpu::RenderPipeline>,
}

struct DispatchOp {
    bind_groups: [Arc<wgpu::BindGroup>; 3],
    groups: UVec3,
    pipeline: Arc<wgpu::ComputePipeline>,
}

enum Op {
    Barrier,
    Dispatch(DispatchOp),
    Draw(DrawOp),
}

impl Op {
    fn is_draw(&self) -> bool {
        matches!(self, Self::Draw(_))
    }

    fn is_dispatch(&self) -> bool {
        matches!(self, Self::Dispatch(_))
    }
}

/// Material state resolved at `bind_material`.
struct BoundMaterial {
    key: RenderPipelineKey,
    program: Arc<Program>,
    textures: Arc<wgpu::BindGroup>,
}

pub struct FrameRecorder<'a> {
    buffers: [Option<wgpu::Buffer>; 3],
    compute_program: Option<Arc<Program>>,
    compute_textures: Vec<(TextureBinding, Arc<Texture>)>,
    frame_group: Option<Arc<wgpu::BindGroup>>,
    framebuffer: Framebuffer<'a>,
    gpu: &'a GpuContext,
    material: Option<BoundMaterial>,
    ops: Vec<Op>,
    params: [u32; PARAM_WORDS],
    params_group: Option<Arc<wgpu::BindGroup>>,
    /// Program that `set_uniform` names resolve against.
    uniform_program: Option<Arc<Program>>,
}

impl<'a> FrameRecorder<'a> {
    fn new(gpu: &'a GpuContext, framebuffer: Framebuffer<'a>) -> Self {
        Self {
            buffers: [None, None, None],
            compute_program: None,
            compute_textures: Vec::new(),
            frame_group: None,
            framebuffer,
            gpu,
            material: None,
            ops: Vec::new(),
            params: [0; PARAM_WORDS],
            params_group: None,
            uniform_program: None,
        }
    }

    fn reset_params(&mut self, program: &Arc<Program>) {
        self.params = [0; PARAM_WORDS];
        self.params_group = None;
        self.uniform_program = Some(program.clone());
    }

    fn frame_group(&mut self) -> Arc<wgpu::BindGroup> {
        if let Some(group) = &self.frame_group {
            return group.clone();
        }

        let entries: Vec<_> = [FRAME_SLOT, LIGHTS_SLOT, INSTANCES_SLOT]
            .into_iter()
            .map(|slot| wgpu::BindGroupEntry {
                binding: slot,
                resource: self.buffers[slot as usize]
                    .as_ref()
                    .unwrap_or(&self.gpu.dummy)
                    .as_entire_binding(),
            })
            .collect();
        let group = Arc::new(self.gpu.device.create_bind_group(
            &wgpu::BindGroupDescriptor {
                label: Some("frame_bind_group"),
                layout: &self.gpu.layouts.frame,
                entries: &entries,
            },
        ));
        self.frame_group = Some(group.clone());
        group
    }

    fn params_group(&mut self) -> Arc<wgpu::BindGroup> {
        if let Some(group) = &self.params_group {
            return group.clone();
        }

        let buffer = self.gpu.device.create_buffer_init(
            &wgpu::util::BufferInitDescriptor {
                label: Some("params_buffer"),
                contents: bytemuck::cast_slice(&self.params),
                usage: wgpu::BufferUsages::UNIFORM,
            },
        );
        let group = Arc::new(self.gpu.device.create_bind_group(
            &wgpu::BindGroupDescriptor {
                label: Some("params_bind_group"),
                layout: &self.gpu.layouts.params,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: buffer.as_entire_binding(),
                }],
            },
        ));
        self.params_group = Some(group.clone());
        group
    }

    fn record_draw(&mut self, mesh: Option<Arc<GpuMesh>>, instances: u32) {
        if self.framebuffer.is_empty() {
            fatal!("Draw recorded without a framebuffer");
        }
        let Some(material) = &self.material else {
            fatal!("Draw recorded without a bound material");
        };

        let vertex = match &mesh {
            Some(_) => VertexInput::Mesh,
            None => VertexInput::None,
        };
        let key = RenderPipelineKey {
            vertex,
            ..material.key.clone()
        };
        let pipeline = self.gpu.render_pipeline(&material.program, key);
        let textures = material.textures.clone();

        let bind_groups = [self.frame_group(), textures, self.params_group()];
        self.ops.push(Op::Draw(DrawOp {
            bind_groups,
            instance_count: instances,
            mesh,
            pipeline,
        }));
    }

    /// Replays everything recorded into `encoder`.
    pub fn finish(self, encoder: &mut wgpu::CommandEncoder) {
        debug!("Replaying {} recorded ops", self.ops.len());
        let mut cleared = false;
        let mut start = 0;
        while start < self.ops.len() {
            let rest = &self.ops[start..];
            let op = &rest[0];
            if op.is_draw() {
                let len = rest.iter().take_while(|op| op.is_draw()).count();
                self.render_pass(encoder, &rest[..len], !cleared);
                cleared = true;
                start += len;
            } else if op.is_dispatch() {
                let len =
                    rest.iter().take_while(|op| op.is_dispatch()).count();
                Self::compute_pass(encoder, &rest[..len]);
                start += len;
            } else {
                start += 1;
            }
        }

        if !cleared && !self.framebuffer.is_empty() {
            self.render_pass(encoder, &[], true);
        }
    }

    fn render_pass(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        ops: &[Op],
        clear: bool,
    ) {
        let colors: Vec<_> = self
            .framebuffer
            .colors
            .iter()
            .map(|target| {
                Some(wgpu::RenderPassColorAttachment {
                    view: target.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: match target.clear {
                            Some(color) if clear => wgpu::LoadOp::Clear(color),
                            _ => wgpu::LoadOp::Load,
                        },
                        store: wgpu::StoreOp::Store,
                    },
                })
            })
            .collect();

        let depth = self.framebuffer.depth.as_ref().map(|target| {
            wgpu::RenderPassDepthStencilAttachment {
                view: target.view,
                depth_ops: match target.ops {
                    DepthOps::ReadOnly => None,
                    DepthOps::Clear if clear => Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(0.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    _ => Some(wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    }),
                },
                stencil_ops: None,
            }
        });

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("render_pass"),
            color_attachments: &colors,
            depth_stencil_attachment: depth,
            ..Default::default()
        });

        for op in ops {
            let Op::Draw(draw) = op else {
                continue;
            };
            pass.set_pipeline(&draw.pipeline);
            for (index, group) in draw.bind_groups.iter().enumerate() {
                pass.set_bind_group(index as u32, group, &[]);
            }
            match &draw.mesh {
                Some(mesh) => {
                    pass.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
                    pass.set_index_buffer(
                        mesh.index_buffer.slice(..),
                        wgpu::IndexFormat::Uint32,
                    );
                    pass.draw_indexed(
                        0..mesh.num_indices,
                        0,
                        0..draw.instance_count,
                    );
                }
                None => pass.draw(0..3, 0..1),
            }
        }
    }

    fn compute_pass(encoder: &mut wgpu::CommandEncoder, ops: &[Op]) {
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("compute_pass"),
            timestamp_writes: None,
        });
        for op in ops {
            let Op::Dispatch(dispatch) = op else {
                continue;
            };
            pass.set_pipeline(&dispatch.pipeline);
            for (index, group) in dispatch.bind_groups.iter().enumerate() {
                pass.set_bind_group(index as u32, group, &[]);
            }
            let groups = dispatch.groups;
            pass.dispatch_workgroups(groups.x, groups.y, groups.z);
        }
    }

    fn bind_compute_texture(
        &mut self,
        binding: TextureBinding,
        texture: &Arc<Texture>,
    ) {
        self.compute_textures
            .retain(|(bound, _)| bound.slot() != binding.slot());
        self.compute_textures.push((binding, texture.clone()));
        self.compute_textures.sort_by_key(|(bound, _)| bound.slot());
    }
}

impl RenderContext for FrameRecorder<'_> {
    fn bind_buffer(
        &mut self,
        usage: BufferUsage,
        slot: u32,
        label: &str,
        contents: &[u8],
    ) {
        let usages = match (usage, slot) {
            (BufferUsage::Uniform, FRAME_SLOT) => wgpu::BufferUsages::UNIFORM,
            (BufferUsage::Storage, LIGHTS_SLOT | INSTANCES_SLOT) => {
                wgpu::BufferUsages::STORAGE
            }
            _ => fatal!(
                "{:?} buffer {} cannot bind at slot {}",
                usage,
                label,
                slot
            ),
        };

        // Bindings cannot be empty and uniform sizes must be 16-aligned.
        let mut bytes = contents.to_vec();
        bytes.resize(bytes.len().max(16).next_multiple_of(16), 0);
        let buffer = self.gpu.device.create_buffer_init(
            &wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: &bytes,
                usage: usages,
            },
        );
        self.buffers[slot as usize] = Some(buffer);
        self.frame_group = None;
    }

    fn bind_material(&mut self, material: &Material) {
        let program = material.program();
        if program.stage() != ProgramStage::Render {
            fatal!("Material uses compute program {}", program.name());
        }

        let bindings: Vec<_> = material
            .textures()
            .iter()
            .map(|(slot, texture)| {
                let binding = TextureBinding::Sampled {
                    slot: *slot,
                    depth: texture.format().is_depth(),
                };
                (binding, texture.clone())
            })
            .collect();

        let colors = self
            .framebuffer
            .colors
            .iter()
            .map(|target| target.format)
            .collect();
        let depth = self.framebuffer.depth.as_ref();
        let depth_test = material.depth_test_mode();
        let write_depth = material.write_depth()
            && depth_test != DepthTestMode::None
            && depth.is_some_and(|target| target.ops != DepthOps::ReadOnly);

        let key = RenderPipelineKey {
            program: program.id(),
            blend: material.blend_mode(),
            depth_test,
            write_depth,
            cull: material.cull_mode(),
            vertex: VertexInput::Mesh,
            colors,
            depth: depth.map(|target| target.format),
            textures: bindings.iter().map(|(binding, _)| *binding).collect(),
        };

        self.material = Some(BoundMaterial {
            key,
            program: program.clone(),
            textures: self.gpu.texture_group(&bindings),
        });
        self.reset_params(program);
    }

    fn set_uniform(&mut self, name: &str, value: UniformValue) {
        let Some(program) = &self.uniform_program else {
            fatal!("Uniform {} set without a bound program", name);
        };
        let Some(index) = program.uniform_index(name) else {
            fatal!("Program {} has no uniform {}", program.name(), name);
        };
        self.params[index] = value.to_bits();
        self.params_group = None;
    }

    fn draw_mesh(&mut self, mesh: &StaticMesh, instance_count: u32) {
        if mesh.index_count() == 0 || instance_count == 0 {
            return;
        }
        let gpu_mesh = mesh.resident(&self.gpu.device).clone();
        self.record_draw(Some(gpu_mesh), instance_count);
    }

    fn draw_fullscreen_triangle(&mut self) {
        self.record_draw(None, 1);
    }

    fn bind_program(&mut self, program: &Arc<Program>) {
        if program.stage() != ProgramStage::Compute {
            fatal!("{} is not a compute program", program.name());
        }
        self.compute_program = Some(program.clone());
        self.compute_textures.clear();
        self.reset_params(program);
    }

    fn bind_texture(&mut self, texture: &Arc<Texture>, slot: u32) {
        let binding = TextureBinding::Sampled {
            slot,
            depth: texture.format().is_depth(),
        };
        self.bind_compute_texture(binding, texture);
    }

    fn bind_image(
        &mut self,
        texture: &Arc<Texture>,
        slot: u32,
        access: AccessType,
    ) {
        if !texture.format().supports_storage() {
            fatal!("{:?} cannot be bound as a storage image", texture.format());
        }
        let binding = TextureBinding::Storage {
            slot,
            format: texture.format().to_wgpu(),
            access,
        };
        self.bind_compute_texture(binding, texture);
    }

    fn dispatch(&mut self, groups: UVec3) {
        let Some(program) = self.compute_program.clone() else {
            fatal!("Dispatch recorded without a bound program");
        };
        let key = ComputePipelineKey {
            program: program.id(),
            textures: self
                .compute_textures
                .iter()
                .map(|(binding, _)| *binding)
                .collect(),
        };
        let pipeline = self.gpu.compute_pipeline(&program, key);
        let textures = self.gpu.texture_group(&self.compute_textures);
        let bind_groups = [self.frame_group(), textures, self.params_group()];
        self.ops.push(Op::Dispatch(DispatchOp {
            bind_groups,
            groups,
            pipeline,
        }));
    }

    fn memory_barrier(&mut self) {
        self.ops.push(Op::Barrier);
    }
}
