use std::sync::Arc;

use anyhow::Result;
use glam::{DVec2, Vec2, Vec3};
use winit::{
    event::{ElementState, KeyEvent, MouseButton, WindowEvent},
    keyboard::{KeyCode, PhysicalKey},
};

use wgpu_deferred::{render::camera::Camera, scene::Scene};

pub enum UserEvent {
    ExitApp,
    SceneLoaded(Result<Arc<Scene>>),
}

impl std::fmt::Debug for UserEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ExitApp => write!(f, "ExitApp"),
            Self::SceneLoaded(Ok(_)) => write!(f, "SceneLoaded(Ok)"),
            Self::SceneLoaded(Err(err)) => write!(f, "SceneLoaded({})", err),
        }
    }
}

const MOVE_SPEED: f32 = 10.0;
const BOOST: f32 = 10.0;
const ROTATE_SPEED: f32 = 0.01;

#[derive(Debug)]
pub struct Inputs {
    cursor: Option<DVec2>,
    cursor_delta: DVec2,
    drag: bool,
    frame_events: Vec<WindowEvent>,
    keys_state: [bool; 256],
    last_keys_state: [bool; 256],
}

impl Default for Inputs {
    fn default() -> Self {
        Self {
            cursor: None,
            cursor_delta: DVec2::ZERO,
            drag: false,
            frame_events: vec![],
            keys_state: [false; 256],
            last_keys_state: [false; 256],
        }
    }
}

impl Inputs {
    fn handle_event(&mut self, event: WindowEvent) {
        match event {
            WindowEvent::KeyboardInput { event, .. } => self.handle_key(event),
            WindowEvent::MouseInput {
                state,
                button: MouseButton::Left,
                ..
            } => self.drag = state == ElementState::Pressed,
            WindowEvent::CursorMoved { position, .. } => {
                let position = DVec2::new(position.x, position.y);
                if let Some(last) = self.cursor {
                    self.cursor_delta += position - last;
                }
                self.cursor = Some(position);
            }
            _ => (),
        }
    }

    fn handle_key(&mut self, event: KeyEvent) {
        let PhysicalKey::Code(code) = event.physical_key else {
            return;
        };
        let Some(state) = self.keys_state.get_mut(code as usize) else {
            return;
        };
        *state = event.state == ElementState::Pressed;
    }

    pub fn key_down(&self, code: KeyCode) -> bool {
        self.keys_state[code as usize]
    }

    pub fn key_pressed(&self, code: KeyCode) -> bool {
        self.keys_state[code as usize] && !self.last_keys_state[code as usize]
    }

    pub fn on_event(&mut self, event: WindowEvent) {
        self.frame_events.push(event);
    }

    pub fn update(&mut self) {
        self.last_keys_state.copy_from_slice(&self.keys_state);
        self.cursor_delta = DVec2::ZERO;
        // Oldest first, cursor deltas depend on the order.
        for event in std::mem::take(&mut self.frame_events) {
            self.handle_event(event);
        }
    }

    /// WASD + Space/Ctrl to fly, Shift to go faster, left drag to look.
    pub fn fly_camera(&self, camera: &mut Camera, delta: f32) {
        let mut movement = Vec3::ZERO;
        let axes = [
            (KeyCode::KeyW, camera.forward()),
            (KeyCode::KeyS, -camera.forward()),
            (KeyCode::KeyD, camera.right()),
            (KeyCode::KeyA, -camera.right()),
            (KeyCode::Space, Vec3::Y),
            (KeyCode::ControlLeft, Vec3::NEG_Y),
        ];
        for (key, direction) in axes {
            if self.key_down(key) {
                movement += direction;
            }
        }

        let mut speed = MOVE_SPEED;
        if self.key_down(KeyCode::ShiftLeft) {
            speed *= BOOST;
        }
        if movement.length_squared() > 0.0 {
            camera.transform.translate(movement * delta * speed);
        }

        if self.drag {
            let rotation = -self.cursor_delta.as_vec2() * ROTATE_SPEED;
            if rotation != Vec2::ZERO {
                let right = camera.right();
                camera.transform.rotate(right, rotation.y);
                camera.transform.rotate(Vec3::Y, rotation.x);
            }
        }
    }
}
