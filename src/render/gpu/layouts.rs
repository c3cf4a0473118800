use std::{cell::RefCell, collections::HashMap, sync::Arc};

use crate::render::{bundle, context::AccessType, shader::PARAM_WORDS};

/// Binding of the shared filtering sampler in group 1.
pub const SAMPLER_BINDING: u32 = 8;

/// One texture entry of group 1, as seen by the bind group layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureBinding {
    Sampled {
        slot: u32,
        depth: bool,
    },
    Storage {
        slot: u32,
        format: wgpu::TextureFormat,
        access: AccessType,
    },
}

impl TextureBinding {
    pub fn slot(&self) -> u32 {
        match self {
            Self::Sampled { slot, .. } | Self::Storage { slot, .. } => *slot,
        }
    }

    fn layout_entry(&self) -> wgpu::BindGroupLayoutEntry {
        let ty = match *self {
            Self::Sampled { depth: true, .. } => wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Depth,
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            Self::Sampled { depth: false, .. } => wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            Self::Storage { format, access, .. } => {
                wgpu::BindingType::StorageTexture {
                    access: match access {
                        AccessType::ReadOnly => {
                            wgpu::StorageTextureAccess::ReadOnly
                        }
                        AccessType::ReadWrite => {
                            wgpu::StorageTextureAccess::ReadWrite
                        }
                        AccessType::WriteOnly => {
                            wgpu::StorageTextureAccess::WriteOnly
                        }
                    },
                    format,
                    view_dimension: wgpu::TextureViewDimension::D2,
                }
            }
        };
        wgpu::BindGroupLayoutEntry {
            binding: self.slot(),
            visibility: wgpu::ShaderStages::FRAGMENT
                | wgpu::ShaderStages::COMPUTE,
            ty,
            count: None,
        }
    }
}

/// Group 0 (scene slots) and group 2 (parameters) are fixed. Group 1 depends
/// on which textures are bound, its layouts are created once per signature.
pub struct Layouts {
    pub frame: wgpu::BindGroupLayout,
    pub params: wgpu::BindGroupLayout,
    textures: RefCell<HashMap<Vec<TextureBinding>, Arc<wgpu::BindGroupLayout>>>,
}

impl Layouts {
    pub fn new(device: &wgpu::Device) -> Self {
        let frame =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("frame_layout"),
                entries: &bundle::layout_entries(),
            });

        let params =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("params_layout"),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX
                        | wgpu::ShaderStages::FRAGMENT
                        | wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: wgpu::BufferSize::new(
                            (PARAM_WORDS * 4) as u64,
                        ),
                    },
                    count: None,
                }],
            });

        Self {
            frame,
            params,
            textures: RefCell::new(HashMap::new()),
        }
    }

    pub fn textures(
        &self,
        device: &wgpu::Device,
        signature: &[TextureBinding],
    ) -> Arc<wgpu::BindGroupLayout> {
        if let Some(layout) = self.textures.borrow().get(signature) {
            return layout.clone();
        }

        let mut entries: Vec<_> =
            signature.iter().map(TextureBinding::layout_entry).collect();
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: SAMPLER_BINDING,
            visibility: wgpu::ShaderStages::FRAGMENT
                | wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        });

        let layout = Arc::new(device.create_bind_group_layout(
            &wgpu::BindGroupLayoutDescriptor {
                label: Some("textures_layout"),
                entries: &entries,
            },
        ));
        self.textures
            .borrow_mut()
            .insert(signature.to_vec(), layout.clone());
        layout
    }
}
