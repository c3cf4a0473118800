use std::sync::Arc;

use glam::UVec3;

use super::{
    material::Material,
    mesh::StaticMesh,
    shader::{Program, UniformValue},
    texture::Texture,
    MaterialId, MeshId, ProgramId, TextureId,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferUsage {
    Attribute,
    Index,
    Storage,
    Uniform,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessType {
    ReadOnly,
    ReadWrite,
    WriteOnly,
}

/// Explicit GPU state. Every bind is a write into the context and every draw
/// sees the state left by the calls submitted before it.
pub trait RenderContext {
    /// Uploads `contents` into a new fixed-size buffer and binds it at
    /// `(usage, slot)`, replacing whatever was bound there.
    fn bind_buffer(
        &mut self,
        usage: BufferUsage,
        slot: u32,
        label: &str,
        contents: &[u8],
    );

    /// Applies program, textures and blend/depth/cull state.
    fn bind_material(&mut self, material: &Material);

    /// Sets a named parameter of the currently bound program.
    fn set_uniform(&mut self, name: &str, value: UniformValue);

    fn draw_mesh(&mut self, mesh: &StaticMesh, instance_count: u32);

    /// Three vertices, no vertex buffer. Screen position is derived from the
    /// vertex index in the shader.
    fn draw_fullscreen_triangle(&mut self);

    fn bind_program(&mut self, program: &Arc<Program>);

    fn bind_texture(&mut self, texture: &Arc<Texture>, slot: u32);

    fn bind_image(
        &mut self,
        texture: &Arc<Texture>,
        slot: u32,
        access: AccessType,
    );

    fn dispatch(&mut self, groups: UVec3);

    /// Makes writes from everything submitted so far visible to everything
    /// submitted afterwards.
    fn memory_barrier(&mut self);
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    BindBuffer {
        usage: BufferUsage,
        slot: u32,
        label: String,
        contents: Vec<u8>,
    },
    BindImage {
        texture: TextureId,
        slot: u32,
        access: AccessType,
    },
    BindMaterial(MaterialId),
    BindProgram(ProgramId),
    BindTexture {
        texture: TextureId,
        slot: u32,
    },
    Dispatch(UVec3),
    DrawFullscreenTriangle,
    DrawMesh {
        mesh: MeshId,
        instance_count: u32,
    },
    MemoryBarrier,
    SetUniform {
        name: String,
        value: UniformValue,
    },
}

/// Context that only records what it is asked to do, in submission order.
/// Useful to inspect a frame without a device.
#[derive(Debug, Default)]
pub struct CommandLog {
    commands: Vec<Command>,
}

impl CommandLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn clear(&mut self) {
        self.commands.clear();
    }

    pub fn draw_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|cmd| {
                matches!(
                    cmd,
                    Command::DrawMesh { .. } | Command::DrawFullscreenTriangle
                )
            })
            .count()
    }

    pub fn mesh_draws(&self) -> Vec<(MeshId, u32)> {
        self.commands
            .iter()
            .filter_map(|cmd| match cmd {
                Command::DrawMesh {
                    mesh,
                    instance_count,
                } => Some((*mesh, *instance_count)),
                _ => None,
            })
            .collect()
    }

    /// Contents of every upload made at `(usage, slot)`, oldest first.
    pub fn uploads(&self, usage: BufferUsage, slot: u32) -> Vec<&[u8]> {
        self.commands
            .iter()
            .filter_map(|cmd| match cmd {
                Command::BindBuffer {
                    usage: u,
                    slot: s,
                    contents,
                    ..
                } if *u == usage && *s == slot => Some(contents.as_slice()),
                _ => None,
            })
            .collect()
    }

    /// Buffer contents bound at `(usage, slot)` when the command at
    /// `index` executes.
    pub fn bound_at(
        &self,
        index: usize,
        usage: BufferUsage,
        slot: u32,
    ) -> Option<&[u8]> {
        self.commands[..index].iter().rev().find_map(|cmd| match cmd {
            Command::BindBuffer {
                usage: u,
                slot: s,
                contents,
                ..
            } if *u == usage && *s == slot => Some(contents.as_slice()),
            _ => None,
        })
    }

    /// Value of the uniform `name` most recently set before `index`.
    pub fn uniform_at(&self, index: usize, name: &str) -> Option<UniformValue> {
        self.commands[..index].iter().rev().find_map(|cmd| match cmd {
            Command::SetUniform { name: n, value } if n == name => Some(*value),
            _ => None,
        })
    }

    /// Material bound when the command at `index` executes.
    pub fn material_at(&self, index: usize) -> Option<MaterialId> {
        self.commands[..index].iter().rev().find_map(|cmd| match cmd {
            Command::BindMaterial(id) => Some(*id),
            _ => None,
        })
    }
}

impl RenderContext for CommandLog {
    fn bind_buffer(
        &mut self,
        usage: BufferUsage,
        slot: u32,
        label: &str,
        contents: &[u8],
    ) {
        self.commands.push(Command::BindBuffer {
            usage,
            slot,
            label: label.to_string(),
            contents: contents.to_vec(),
        });
    }

    fn bind_material(&mut self, material: &Material) {
        self.commands.push(Command::BindMaterial(material.id()));
    }

    fn set_uniform(&mut self, name: &str, value: UniformValue) {
        self.commands.push(Command::SetUniform {
            name: name.to_string(),
            value,
        });
    }

    fn draw_mesh(&mut self, mesh: &StaticMesh, instance_count: u32) {
        self.commands.push(Command::DrawMesh {
            mesh: mesh.id(),
            instance_count,
        });
    }

    fn draw_fullscreen_triangle(&mut self) {
        self.commands.push(Command::DrawFullscreenTriangle);
    }

    fn bind_program(&mut self, program: &Arc<Program>) {
        self.commands.push(Command::BindProgram(program.id()));
    }

    fn bind_texture(&mut self, texture: &Arc<Texture>, slot: u32) {
        self.commands.push(Command::BindTexture {
            texture: texture.id(),
            slot,
        });
    }

    fn bind_image(
        &mut self,
        texture: &Arc<Texture>,
        slot: u32,
        access: AccessType,
    ) {
        self.commands.push(Command::BindImage {
            texture: texture.id(),
            slot,
            access,
        });
    }

    fn dispatch(&mut self, groups: UVec3) {
        self.commands.push(Command::Dispatch(groups));
    }

    fn memory_barrier(&mut self) {
        self.commands.push(Command::MemoryBarrier);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::mesh::MeshData;

    #[test]
    fn test_log_tracks_bound_state() {
        let mesh = StaticMesh::new(MeshData::cube());
        let mut log = CommandLog::new();
        log.bind_buffer(BufferUsage::Storage, 2, "a", &[1]);
        log.set_uniform("light_index", UniformValue::U32(4));
        log.bind_buffer(BufferUsage::Storage, 2, "b", &[2]);
        mesh.draw(&mut log, 3);

        assert_eq!(log.draw_count(), 1);
        assert_eq!(log.mesh_draws(), vec![(mesh.id(), 3)]);
        assert_eq!(log.bound_at(3, BufferUsage::Storage, 2), Some(&[2u8][..]));
        assert_eq!(log.bound_at(3, BufferUsage::Uniform, 0), None);
        assert_eq!(
            log.uniform_at(3, "light_index"),
            Some(UniformValue::U32(4))
        );
        assert_eq!(log.uploads(BufferUsage::Storage, 2).len(), 2);
    }
}
