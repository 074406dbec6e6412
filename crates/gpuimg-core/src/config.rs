//! JSON engine configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::coords::ScaleType;
use crate::error::EngineError;
use crate::kind::FilterKind;

/// When the render thread draws a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderMode {
    /// Draw only after a render request (filter or image change).
    #[default]
    WhenDirty,
    /// Draw every frame interval; used for live sources.
    Continuously,
}

/// Engine settings shared by the façade, the renderer and the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Clear color (RGB, 0..=1) drawn behind the image.
    pub background: [f32; 3],
    pub scale_type: ScaleType,
    pub render_mode: RenderMode,
    pub frame_interval_ms: u64,
    /// Upper bound for decoded still images on either axis.
    pub max_texture_size: u32,
    pub snapshot_timeout_ms: u64,
    /// `tracing-subscriber` directive used when `RUST_LOG` is unset.
    pub log_filter: String,
    /// Filter chain built at start-up, in pass order.
    pub filters: Vec<FilterKind>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            background: [0.0, 0.0, 0.0],
            scale_type: ScaleType::CenterCrop,
            render_mode: RenderMode::WhenDirty,
            frame_interval_ms: 16,
            max_texture_size: 2048,
            snapshot_timeout_ms: 5000,
            log_filter: "info".to_string(),
            filters: Vec::new(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), String> {
        if let Some(c) = self
            .background
            .iter()
            .find(|c| !c.is_finite() || **c < 0.0 || **c > 1.0)
        {
            return Err(format!("background component {c} is outside 0..=1"));
        }
        if self.frame_interval_ms == 0 {
            return Err("frame_interval_ms must be > 0".to_string());
        }
        if self.max_texture_size == 0 {
            return Err("max_texture_size must be > 0".to_string());
        }
        if self.snapshot_timeout_ms == 0 {
            return Err("snapshot_timeout_ms must be > 0".to_string());
        }
        Ok(())
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }

    pub fn snapshot_timeout(&self) -> Duration {
        Duration::from_millis(self.snapshot_timeout_ms)
    }
}

/// Parse and validate config text. `path` is only used for error context.
pub fn parse_engine_config(path: &Path, text: &str) -> Result<EngineConfig, EngineError> {
    let cfg: EngineConfig = serde_json::from_str(text).map_err(|e| EngineError::Json {
        path: path.to_path_buf(),
        source: e,
    })?;
    cfg.validate().map_err(|msg| EngineError::InvalidConfig {
        path: path.to_path_buf(),
        msg,
    })?;
    Ok(cfg)
}

pub fn load_engine_config_from(path: impl AsRef<Path>) -> Result<EngineConfig, EngineError> {
    let path: PathBuf = path.as_ref().to_path_buf();
    let text = std::fs::read_to_string(&path).map_err(|e| EngineError::Io {
        path: path.clone(),
        source: e,
    })?;
    parse_engine_config(&path, &text)
}
