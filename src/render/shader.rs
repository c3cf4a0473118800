use std::{collections::HashMap, sync::Arc, sync::OnceLock};

use anyhow::{Context, Result};
use assets_manager::{loader, Asset, AssetCache};
use log::info;

use crate::fatal;

use super::ProgramId;

pub const SHADERS_DIR: &str = "assets/shaders";

/// Size of the per-draw parameter block, in 32-bit words.
pub const PARAM_WORDS: usize = 16;

pub struct WgslSource(String);

impl From<String> for WgslSource {
    fn from(value: String) -> Self {
        WgslSource(value)
    }
}

impl Asset for WgslSource {
    const EXTENSION: &'static str = "wgsl";
    type Loader = loader::LoadFrom<String, loader::StringLoader>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    F32(f32),
    I32(i32),
    U32(u32),
}

impl UniformValue {
    pub fn to_bits(self) -> u32 {
        match self {
            Self::F32(value) => value.to_bits(),
            Self::I32(value) => value as u32,
            Self::U32(value) => value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgramStage {
    /// `vs_main` + `fs_main`.
    Render,
    /// `cs_main`.
    Compute,
}

/// A WGSL module with its entry points and named scalar parameters.
///
/// Parameter `i` of `uniforms` is word `i` of the parameter block bound at
/// group 2 (`params.words[i / 4][i % 4]` in WGSL).
pub struct Program {
    id: ProgramId,
    module: OnceLock<wgpu::ShaderModule>,
    name: String,
    source: String,
    stage: ProgramStage,
    uniforms: Vec<String>,
}

impl Program {
    pub fn new(name: &str, source: String, stage: ProgramStage) -> Self {
        Self {
            id: ProgramId::next(),
            module: OnceLock::new(),
            name: name.to_string(),
            source,
            stage,
            uniforms: Vec::new(),
        }
    }

    pub fn with_uniforms(mut self, names: &[&str]) -> Self {
        if names.len() > PARAM_WORDS {
            fatal!(
                "Program {} declares {} uniforms, at most {} fit",
                self.name,
                names.len(),
                PARAM_WORDS
            );
        }
        self.uniforms = names.iter().map(|name| name.to_string()).collect();
        self
    }

    pub fn id(&self) -> ProgramId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stage(&self) -> ProgramStage {
        self.stage
    }

    pub fn uniform_index(&self, name: &str) -> Option<usize> {
        self.uniforms.iter().position(|uniform| uniform == name)
    }

    pub fn resident(&self, device: &wgpu::Device) -> &wgpu::ShaderModule {
        self.module.get_or_init(|| {
            device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(&format!("{}_module", self.name)),
                source: wgpu::ShaderSource::Wgsl(self.source.as_str().into()),
            })
        })
    }
}

impl std::fmt::Debug for Program {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Program")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("stage", &self.stage)
            .field("uniforms", &self.uniforms)
            .finish()
    }
}

/// WGSL programs read from [`SHADERS_DIR`], one `Program` per shader id.
pub struct ShaderAssets {
    cache: AssetCache,
    programs: HashMap<String, Arc<Program>>,
}

impl ShaderAssets {
    pub fn new() -> Result<Self> {
        Self::from_dir(SHADERS_DIR)
    }

    pub fn from_dir(dir: &str) -> Result<Self> {
        let cache = AssetCache::new(dir)
            .with_context(|| format!("Opening shader directory {}", dir))?;
        Ok(Self {
            cache,
            programs: HashMap::new(),
        })
    }

    pub fn load(
        &mut self,
        shader_id: &str,
        stage: ProgramStage,
        uniforms: &[&str],
    ) -> Result<Arc<Program>> {
        if let Some(program) = self.programs.get(shader_id) {
            return Ok(program.clone());
        }

        let source = self
            .cache
            .load::<WgslSource>(shader_id)
            .with_context(|| format!("Loading shader {}.wgsl", shader_id))?
            .read()
            .0
            .clone();
        info!("Shader loaded: {}", shader_id);

        let program = Arc::new(
            Program::new(shader_id, source, stage).with_uniforms(uniforms),
        );
        self.programs.insert(shader_id.to_string(), program.clone());
        Ok(program)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_lookup() {
        let program = Program::new("light", String::new(), ProgramStage::Render)
            .with_uniforms(&["light_index", "intensity"]);
        assert_eq!(program.uniform_index("light_index"), Some(0));
        assert_eq!(program.uniform_index("intensity"), Some(1));
        assert_eq!(program.uniform_index("missing"), None);
    }

    #[test]
    fn test_uniform_bits() {
        assert_eq!(UniformValue::U32(7).to_bits(), 7);
        assert_eq!(UniformValue::I32(-1).to_bits(), u32::MAX);
        assert_eq!(UniformValue::F32(1.0).to_bits(), 0x3f80_0000);
    }

    #[test]
    #[should_panic]
    fn test_too_many_uniforms() {
        let names = ["u"; PARAM_WORDS + 1];
        let _ = Program::new("big", String::new(), ProgramStage::Compute)
            .with_uniforms(&names);
    }

    #[test]
    fn test_load_shipped_shaders() {
        let mut shaders = ShaderAssets::from_dir(
            concat!(env!("CARGO_MANIFEST_DIR"), "/assets/shaders"),
        )
        .unwrap();
        let program = shaders
            .load("deferred_point_light", ProgramStage::Render, &["light_index"])
            .unwrap();
        assert_eq!(program.uniform_index("light_index"), Some(0));
        let again = shaders
            .load("deferred_point_light", ProgramStage::Render, &[])
            .unwrap();
        assert_eq!(program.id(), again.id());
        assert!(shaders.load("missing", ProgramStage::Render, &[]).is_err());
    }
}
