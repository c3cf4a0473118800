use std::sync::Arc;
use std::time::Instant;

use log::{error, info, warn};
use threadpool::ThreadPool;
use winit::application::ApplicationHandler;
use winit::dpi::{LogicalPosition, LogicalSize};
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, EventLoopProxy};
use winit::keyboard::KeyCode;
use winit::window::{Window, WindowId, WindowLevel};

use glam::Vec3;
use wgpu_deferred::render::{
    camera::Camera,
    mesh::{MeshData, StaticMesh},
    state::RenderState,
};
use wgpu_deferred::scene::{Scene, SceneView};

use crate::config::ViewerConfig;
use crate::input::{Inputs, UserEvent};

pub struct App {
    config: ViewerConfig,
    current: Instant,
    inputs: Inputs,
    loader: ThreadPool,
    proxy: EventLoopProxy<UserEvent>,
    render_state: Option<RenderState>,
    view: SceneView,
    volume: Arc<StaticMesh>,
    window: Option<Arc<Window>>,
}

impl App {
    pub fn new(proxy: EventLoopProxy<UserEvent>, config: ViewerConfig) -> Self {
        let mut view = SceneView::default();
        view.camera = Camera::looking_at(Vec3::new(4.0, 3.0, 6.0), Vec3::ZERO);
        Self {
            config,
            current: Instant::now(),
            inputs: Inputs::default(),
            loader: ThreadPool::new(1),
            proxy,
            render_state: None,
            view,
            volume: Arc::new(StaticMesh::new(MeshData::sphere(16, 32))),
            window: None,
        }
    }

    fn init(&mut self, event_loop: &ActiveEventLoop, window: Arc<Window>) {
        let state = match pollster::block_on(RenderState::new(window.clone())) {
            Ok(state) => state,
            Err(err) => {
                error!("Renderer initialization failed: {:#}", err);
                event_loop.exit();
                return;
            }
        };

        let size = state.size();
        self.view.camera.set_aspect_ratio(size.x, size.y);

        let mut scene = Scene::cube(&state.programs().gbuffer);
        scene.set_point_light_volume(self.volume.clone());
        self.view.set_scene(Arc::new(scene));

        self.render_state = Some(state);
        self.window = Some(window);
        self.load_scene();
    }

    /// Loads the configured scene file off the event loop thread. The
    /// current scene stays up until the new one is ready.
    fn load_scene(&self) {
        let (Some(path), Some(state)) = (&self.config.scene, &self.render_state)
        else {
            return;
        };
        info!("Loading scene {}", path.display());

        let path = path.clone();
        let program = state.programs().gbuffer.clone();
        let proxy = self.proxy.clone();
        let volume = self.volume.clone();
        self.loader.execute(move || {
            let scene = Scene::load(&path, &program).map(|mut scene| {
                scene.set_point_light_volume(volume);
                Arc::new(scene)
            });
            if proxy.send_event(UserEvent::SceneLoaded(scene)).is_err() {
                warn!("Event loop closed before scene load finished");
            }
        });
    }

    fn on_scene_loaded(&mut self, scene: anyhow::Result<Arc<Scene>>) {
        match scene {
            Ok(scene) => self.view.set_scene(scene),
            Err(err) => error!("Keeping previous scene: {:#}", err),
        }
    }

    pub fn update(&mut self) {
        let delta = self.current.elapsed();
        self.current = Instant::now();

        self.inputs.update();
        if self.inputs.key_pressed(KeyCode::Escape)
            && self.proxy.send_event(UserEvent::ExitApp).is_err()
        {
            warn!("Event loop already closed");
        }
        if self.inputs.key_pressed(KeyCode::KeyR) {
            self.load_scene();
        }
        self.inputs
            .fly_camera(&mut self.view.camera, delta.as_secs_f32());

        let Some(state) = self.render_state.as_mut() else {
            return;
        };
        if self.inputs.key_pressed(KeyCode::Tab) {
            state.debug_view = state.debug_view.next();
            info!("Debug view: {:?}", state.debug_view);
        }
        if self.inputs.key_pressed(KeyCode::KeyV) {
            state.show_light_volumes = !state.show_light_volumes;
        }
        if self.inputs.key_pressed(KeyCode::KeyT) {
            state.tiled_lighting = !state.tiled_lighting;
            info!("Tiled lighting: {}", state.tiled_lighting);
        }
        state.render(&self.view);
    }
}

impl ApplicationHandler<UserEvent> for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let level = if self.config.always_on_top {
            WindowLevel::AlwaysOnTop
        } else {
            WindowLevel::Normal
        };
        let window = event_loop.create_window(
            Window::default_attributes()
                .with_title("wgpu deferred")
                .with_inner_size(LogicalSize::new(
                    self.config.width,
                    self.config.height,
                ))
                .with_position(LogicalPosition::new(0, 0))
                .with_window_level(level),
        );
        match window {
            Ok(window) => self.init(event_loop, Arc::new(window)),
            Err(err) => {
                error!("Window creation failed: {}", err);
                event_loop.exit();
            }
        }
    }

    fn user_event(&mut self, event_loop: &ActiveEventLoop, event: UserEvent) {
        match event {
            UserEvent::ExitApp => {
                info!("User event: exit app");
                event_loop.exit();
            }
            UserEvent::SceneLoaded(scene) => self.on_scene_loaded(scene),
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _id: WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(state) = self.render_state.as_mut() {
                    state.resize(size);
                    self.view.camera.set_aspect_ratio(size.width, size.height);
                }
            }
            WindowEvent::RedrawRequested => {
                self.update();
                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }
            _ => (),
        }
        self.inputs.on_event(event);
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }
}
