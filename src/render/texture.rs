use std::sync::{Arc, OnceLock};

use glam::UVec2;
use image::{DynamicImage, GenericImageView};

use super::TextureId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    Depth32Float,
    Rgba16Float,
    Rgba8Srgb,
    Rgba8Unorm,
}

impl ImageFormat {
    pub fn to_wgpu(self) -> wgpu::TextureFormat {
        match self {
            Self::Depth32Float => wgpu::TextureFormat::Depth32Float,
            Self::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
            Self::Rgba8Srgb => wgpu::TextureFormat::Rgba8UnormSrgb,
            Self::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
        }
    }

    pub fn is_depth(self) -> bool {
        matches!(self, Self::Depth32Float)
    }

    /// Whether compute shaders may bind it with `bind_image`.
    pub fn supports_storage(self) -> bool {
        matches!(self, Self::Rgba16Float | Self::Rgba8Unorm)
    }
}

pub struct GpuTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
}

/// Texture description, optionally with initial RGBA8 pixels. The GPU side
/// is allocated on first use and released with the last `Arc`.
pub struct Texture {
    format: ImageFormat,
    gpu: OnceLock<GpuTexture>,
    id: TextureId,
    pixels: Option<Vec<u8>>,
    size: UVec2,
}

impl Texture {
    /// Render target or storage image.
    pub fn new(size: UVec2, format: ImageFormat) -> Self {
        Self {
            format,
            gpu: OnceLock::new(),
            id: TextureId::next(),
            pixels: None,
            size,
        }
    }

    pub fn from_rgba8(size: UVec2, pixels: Vec<u8>, srgb: bool) -> Self {
        debug_assert_eq!(pixels.len(), (size.x * size.y * 4) as usize);
        let format = if srgb {
            ImageFormat::Rgba8Srgb
        } else {
            ImageFormat::Rgba8Unorm
        };
        Self {
            pixels: Some(pixels),
            ..Self::new(size, format)
        }
    }

    pub fn from_image(image: &DynamicImage, srgb: bool) -> Self {
        let (width, height) = image.dimensions();
        Self::from_rgba8(
            UVec2::new(width, height),
            image.to_rgba8().into_raw(),
            srgb,
        )
    }

    pub fn solid(color: [u8; 4], srgb: bool) -> Self {
        Self::from_rgba8(UVec2::ONE, color.to_vec(), srgb)
    }

    pub fn id(&self) -> TextureId {
        self.id
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    pub fn size(&self) -> UVec2 {
        self.size
    }

    pub fn resident(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
    ) -> &GpuTexture {
        self.gpu.get_or_init(|| self.create(device, queue))
    }

    fn create(&self, device: &wgpu::Device, queue: &wgpu::Queue) -> GpuTexture {
        let size = wgpu::Extent3d {
            width: self.size.x.max(1),
            height: self.size.y.max(1),
            depth_or_array_layers: 1,
        };

        let mut usage = wgpu::TextureUsages::TEXTURE_BINDING;
        if self.pixels.is_some() {
            usage |= wgpu::TextureUsages::COPY_DST;
        } else {
            usage |= wgpu::TextureUsages::RENDER_ATTACHMENT;
            if self.format.supports_storage() {
                usage |= wgpu::TextureUsages::STORAGE_BINDING;
            }
        }

        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("texture"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: self.format.to_wgpu(),
            usage,
            view_formats: &[],
        });

        if let Some(pixels) = &self.pixels {
            queue.write_texture(
                texture.as_image_copy(),
                pixels,
                wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(4 * size.width),
                    rows_per_image: Some(size.height),
                },
                size,
            );
        }

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        GpuTexture { texture, view }
    }
}

/// Geometry pass outputs read by the lighting passes.
#[derive(Debug, Clone)]
pub struct GBuffer {
    pub color: Arc<Texture>,
    pub normal: Arc<Texture>,
    pub depth: Arc<Texture>,
}

impl GBuffer {
    pub fn new(size: UVec2) -> Self {
        Self {
            color: Arc::new(Texture::new(size, ImageFormat::Rgba8Srgb)),
            normal: Arc::new(Texture::new(size, ImageFormat::Rgba8Unorm)),
            depth: Arc::new(Texture::new(size, ImageFormat::Depth32Float)),
        }
    }

    pub fn size(&self) -> UVec2 {
        self.color.size()
    }
}

impl std::fmt::Debug for Texture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Texture")
            .field("id", &self.id)
            .field("format", &self.format)
            .field("size", &self.size)
            .finish()
    }
}
