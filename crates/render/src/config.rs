use std::path::Path;

use glam::Vec4;
use serde::{Deserialize, Serialize};
use tessera_scene::ThreadPolicy;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Pipeline settings. Every field has a default, so a config file only
/// needs the keys it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// When false every renderable reaches the passes.
    pub frustum_culling: bool,
    /// Clear and present the target even when no pass is registered.
    pub clear_on_empty: bool,
    pub thread_policy: ThreadPolicy,
    /// Minimum number of renderables before culling is split across the pool.
    pub parallel_threshold: usize,
    /// Upper bound for every intermediate buffer dimension.
    pub max_texture: u32,
    pub shadow_resolution: u32,
    pub width: u32,
    pub height: u32,
    /// Background of the presented target behind the composited frame.
    pub clear_color: Vec4,
    /// Outline the world bound with gizmo lines.
    pub show_bounds: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            frustum_culling: true,
            clear_on_empty: true,
            thread_policy: ThreadPolicy::Main,
            parallel_threshold: 1024,
            max_texture: 4096,
            shadow_resolution: 2048,
            width: 1280,
            height: 720,
            clear_color: Vec4::new(0.1, 0.1, 0.12, 1.0),
            show_bounds: false,
        }
    }
}

impl PipelineConfig {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&text)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        std::fs::write(path.as_ref(), serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_fills_defaults() {
        let cfg = PipelineConfig::from_json(r#"{ "thread_policy": "pool", "width": 64 }"#).unwrap();
        assert_eq!(cfg.thread_policy, ThreadPolicy::Pool);
        assert_eq!(cfg.width, 64);
        assert_eq!(cfg.height, 720);
        assert!(cfg.frustum_culling);
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.json");
        let cfg = PipelineConfig {
            clear_on_empty: false,
            max_texture: 512,
            ..PipelineConfig::default()
        };
        cfg.save(&path).unwrap();
        assert_eq!(PipelineConfig::load(&path).unwrap(), cfg);
    }

    #[test]
    fn bad_json_is_an_error() {
        assert!(matches!(
            PipelineConfig::from_json("{ nope"),
            Err(ConfigError::Json(_))
        ));
        assert!(matches!(
            PipelineConfig::load("/definitely/not/here.json"),
            Err(ConfigError::Io(_))
        ));
    }
}
