use std::{fmt, sync::Arc};

use anyhow::{Context, Result};
use glam::{UVec2, UVec3};
use log::{info, warn};
use winit::{dpi::PhysicalSize, window::Window};

use crate::scene::{
    SceneView, G_COLOR_SLOT, G_DEPTH_SLOT, G_NORMAL_SLOT, LIGHT_INDEX_UNIFORM,
};

use super::{
    context::{AccessType, RenderContext},
    gpu::{ColorTarget, DepthOps, Framebuffer, GpuContext},
    material::{BlendMode, CullMode, DepthTestMode, Material},
    shader::{Program, ProgramStage, ShaderAssets},
    texture::{GBuffer, ImageFormat, Texture},
};

const TONEMAP_GROUP_SIZE: u32 = 8;

const BLACK: wgpu::Color = wgpu::Color::BLACK;

/// Which texture feeds the tonemap pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DebugView {
    #[default]
    Lit,
    Color,
    Normal,
    Depth,
}

impl DebugView {
    pub fn next(self) -> Self {
        match self {
            Self::Lit => Self::Color,
            Self::Color => Self::Normal,
            Self::Normal => Self::Depth,
            Self::Depth => Self::Lit,
        }
    }
}

pub struct Programs {
    pub blit: Arc<Program>,
    pub debug_volume: Arc<Program>,
    pub deferred_point_light: Arc<Program>,
    pub deferred_sun: Arc<Program>,
    pub gbuffer: Arc<Program>,
    pub tiled_lighting: Arc<Program>,
    pub tonemap: Arc<Program>,
    pub tonemap_depth: Arc<Program>,
}

impl Programs {
    pub fn load(shaders: &mut ShaderAssets) -> Result<Self> {
        use ProgramStage::{Compute, Render};
        Ok(Self {
            blit: shaders.load("blit", Render, &[])?,
            debug_volume: shaders.load("debug_volume", Render, &[])?,
            deferred_point_light: shaders.load(
                "deferred_point_light",
                Render,
                &[LIGHT_INDEX_UNIFORM],
            )?,
            deferred_sun: shaders.load("deferred_sun", Render, &[])?,
            gbuffer: shaders.load("gbuffer", Render, &[])?,
            tiled_lighting: shaders.load("tiled_lighting", Compute, &[])?,
            tonemap: shaders.load("tonemap", Compute, &[])?,
            tonemap_depth: shaders.load("tonemap_depth", Compute, &[])?,
        })
    }
}

/// Everything sized by the window, rebuilt on resize together with the
/// materials that sample it.
pub struct Targets {
    pub blit: Material,
    pub color: Arc<Texture>,
    pub debug_volume: Material,
    pub g_buffer: GBuffer,
    pub lit: Arc<Texture>,
    pub point_light: Material,
    pub size: UVec2,
    pub sun: Material,
}

impl Targets {
    pub fn new(size: UVec2, programs: &Programs) -> Self {
        let g_buffer = GBuffer::new(size);
        let lit = Arc::new(Texture::new(size, ImageFormat::Rgba16Float));
        let color = Arc::new(Texture::new(size, ImageFormat::Rgba8Unorm));

        let mut sun = Material::deferred_light(programs.deferred_sun.clone());
        sun.set_texture(G_COLOR_SLOT, g_buffer.color.clone());
        sun.set_texture(G_NORMAL_SLOT, g_buffer.normal.clone());
        sun.set_depth_test_mode(DepthTestMode::Always);

        let mut point_light =
            Material::deferred_light(programs.deferred_point_light.clone());
        point_light.set_texture(G_COLOR_SLOT, g_buffer.color.clone());
        point_light.set_texture(G_NORMAL_SLOT, g_buffer.normal.clone());
        point_light.set_texture(G_DEPTH_SLOT, g_buffer.depth.clone());
        point_light.set_blend_mode(BlendMode::Add);
        point_light.set_depth_test_mode(DepthTestMode::Reversed);
        point_light.set_cull_mode(CullMode::Frontface);

        let mut debug_volume =
            Material::deferred_light(programs.debug_volume.clone());
        debug_volume.set_blend_mode(BlendMode::Alpha);

        let blit = Material::textured(programs.blit.clone(), color.clone());

        Self {
            blit,
            color,
            debug_volume,
            g_buffer,
            lit,
            point_light,
            size,
            sun,
        }
    }

    fn debug_source(&self, view: DebugView) -> &Arc<Texture> {
        match view {
            DebugView::Lit => &self.lit,
            DebugView::Color => &self.g_buffer.color,
            DebugView::Normal => &self.g_buffer.normal,
            DebugView::Depth => &self.g_buffer.depth,
        }
    }
}

pub struct RenderState {
    _adapter: wgpu::Adapter,
    _instance: wgpu::Instance,
    config: wgpu::SurfaceConfiguration,
    pub debug_view: DebugView,
    gpu: GpuContext,
    programs: Programs,
    pub show_light_volumes: bool,
    surface: wgpu::Surface<'static>,
    targets: Targets,
    pub tiled_lighting: bool,
}

impl fmt::Debug for RenderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RenderState")
    }
}

impl RenderState {
    pub async fn new(window: Arc<Window>) -> Result<Self> {
        let instance = wgpu::Instance::default();
        let surface = instance
            .create_surface(window.clone())
            .context("Creating surface")?;
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                compatible_surface: Some(&surface),
                ..Default::default()
            })
            .await
            .context("No suitable adapter")?;
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor::default(), None)
            .await
            .context("Requesting device")?;
        info!("Adapter: {:?}", adapter.get_info());

        let size = window.inner_size();
        let config = surface
            .get_default_config(&adapter, size.width.max(1), size.height.max(1))
            .context("Surface is not supported by the adapter")?;
        surface.configure(&device, &config);

        let mut shaders = ShaderAssets::new()?;
        let programs = Programs::load(&mut shaders)?;
        let targets =
            Targets::new(UVec2::new(config.width, config.height), &programs);

        Ok(Self {
            _adapter: adapter,
            _instance: instance,
            config,
            debug_view: DebugView::default(),
            gpu: GpuContext::new(device, queue),
            programs,
            show_light_volumes: false,
            surface,
            targets,
            tiled_lighting: false,
        })
    }

    pub fn programs(&self) -> &Programs {
        &self.programs
    }

    pub fn size(&self) -> UVec2 {
        self.targets.size
    }

    pub fn resize(&mut self, size: PhysicalSize<u32>) {
        if size.width == 0 || size.height == 0 {
            return;
        }
        self.config.width = size.width;
        self.config.height = size.height;
        self.surface.configure(&self.gpu.device, &self.config);
        self.targets =
            Targets::new(UVec2::new(size.width, size.height), &self.programs);
        info!("Resized to {}x{}", size.width, size.height);
    }

    pub fn render(&mut self, view: &SceneView) {
        let frame = match self.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                warn!("Surface lost, reconfiguring");
                self.surface.configure(&self.gpu.device, &self.config);
                return;
            }
            Err(err) => {
                warn!("Skipping frame: {}", err);
                return;
            }
        };
        let surface_view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self.gpu.device.create_command_encoder(
            &wgpu::CommandEncoderDescriptor {
                label: Some("frame_encoder"),
            },
        );

        self.geometry_pass(&mut encoder, view);
        self.lighting_pass(&mut encoder, view);
        self.tonemap_pass(&mut encoder);

        let mut blit = self.gpu.recorder(Framebuffer::color(ColorTarget {
            view: &surface_view,
            format: self.config.format,
            clear: Some(BLACK),
        }));
        blit.bind_material(&self.targets.blit);
        blit.draw_fullscreen_triangle();
        blit.finish(&mut encoder);

        self.gpu.queue.submit(Some(encoder.finish()));
        frame.present();
    }

    fn geometry_pass(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        view: &SceneView,
    ) {
        let gpu = &self.gpu;
        let g_buffer = &self.targets.g_buffer;
        let framebuffer = Framebuffer {
            colors: vec![
                gpu.color_target(&g_buffer.color, Some(BLACK)),
                gpu.color_target(&g_buffer.normal, Some(BLACK)),
            ],
            depth: Some(gpu.depth_target(&g_buffer.depth, DepthOps::Clear)),
        };
        let mut recorder = gpu.recorder(framebuffer);
        view.render(&mut recorder);
        recorder.finish(encoder);
    }

    fn lighting_pass(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        view: &SceneView,
    ) {
        let gpu = &self.gpu;
        let targets = &self.targets;

        if self.tiled_lighting {
            let mut recorder = gpu.recorder(Framebuffer::none());
            view.tiled_deferred_lighting(
                &mut recorder,
                &self.programs.tiled_lighting,
                &targets.g_buffer,
                &targets.lit,
            );
            recorder.finish(encoder);
            return;
        }

        let framebuffer =
            Framebuffer::color(gpu.color_target(&targets.lit, Some(BLACK)))
                .with_depth(gpu.depth_target(
                    &targets.g_buffer.depth,
                    DepthOps::ReadOnly,
                ));
        let mut recorder = gpu.recorder(framebuffer);
        view.deferred_lighting(
            &mut recorder,
            &targets.sun,
            &targets.point_light,
        );
        if self.show_light_volumes {
            view.debug_light_volumes(&mut recorder, &targets.debug_volume);
        }
        recorder.finish(encoder);
    }

    fn tonemap_pass(&self, encoder: &mut wgpu::CommandEncoder) {
        let targets = &self.targets;
        let program = match self.debug_view {
            DebugView::Depth => &self.programs.tonemap_depth,
            _ => &self.programs.tonemap,
        };

        let mut recorder = self.gpu.recorder(Framebuffer::none());
        recorder.bind_program(program);
        recorder.bind_texture(targets.debug_source(self.debug_view), 0);
        recorder.bind_image(&targets.color, 1, AccessType::WriteOnly);
        recorder.dispatch(UVec3::new(
            targets.size.x.div_ceil(TONEMAP_GROUP_SIZE),
            targets.size.y.div_ceil(TONEMAP_GROUP_SIZE),
            1,
        ));
        recorder.memory_barrier();
        recorder.finish(encoder);
    }
}
