use std::{env, path::PathBuf};

use log::warn;

const DEFAULT_WIDTH: u32 = 1600;
const DEFAULT_HEIGHT: u32 = 900;

/// Viewer settings, read from the environment:
///
/// - `SCENE`: `.gltf`, `.glb` or `.obj` file to show instead of the built-in
///   cube scene
/// - `WINDOW_WIDTH` / `WINDOW_HEIGHT`: initial window size
/// - `NOT_ON_TOP`: set to keep the window at the normal level
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewerConfig {
    pub always_on_top: bool,
    pub height: u32,
    pub scene: Option<PathBuf>,
    pub width: u32,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            always_on_top: true,
            height: DEFAULT_HEIGHT,
            scene: None,
            width: DEFAULT_WIDTH,
        }
    }
}

impl ViewerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let size = |key: &str, default: u32| match lookup(key) {
            None => default,
            Some(value) => match value.trim().parse::<u32>() {
                Ok(size) if size > 0 => size,
                _ => {
                    warn!("Ignoring {}={:?}, using {}", key, value, default);
                    default
                }
            },
        };

        Self {
            always_on_top: lookup("NOT_ON_TOP").is_none(),
            height: size("WINDOW_HEIGHT", DEFAULT_HEIGHT),
            scene: lookup("SCENE")
                .filter(|path| !path.is_empty())
                .map(PathBuf::from),
            width: size("WINDOW_WIDTH", DEFAULT_WIDTH),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> ViewerConfig {
        let vars: HashMap<_, _> = vars
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        ViewerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        assert_eq!(config(&[]), ViewerConfig::default());
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("SCENE", "assets/sponza.glb"),
            ("WINDOW_WIDTH", "800"),
            ("WINDOW_HEIGHT", " 600 "),
            ("NOT_ON_TOP", "1"),
        ]);
        assert_eq!(config.scene, Some(PathBuf::from("assets/sponza.glb")));
        assert_eq!((config.width, config.height), (800, 600));
        assert!(!config.always_on_top);
    }

    #[test]
    fn test_invalid_sizes_fall_back() {
        let config = config(&[("WINDOW_WIDTH", "wide"), ("WINDOW_HEIGHT", "0")]);
        assert_eq!(config.width, DEFAULT_WIDTH);
        assert_eq!(config.height, DEFAULT_HEIGHT);
    }
}
