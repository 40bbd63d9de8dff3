use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::audio::FeatureKind;
use crate::error::{Result, VisualizerError};

/// Runtime configuration. Every field has a default so a partial JSON file
/// only needs to name what it overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VisualizerConfig {
    /// Samples per analysis frame.
    pub frame_size: usize,
    pub features: Vec<FeatureKind>,
    pub history_interval_ms: u64,
    pub position_update_interval_ms: u64,
    pub volume: f32,
    pub spectrum: SpectrumConfig,
    pub canvas: CanvasConfig,
}

/// Analyser-node settings for the frequency bars.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectrumConfig {
    pub fft_size: usize,
    pub smoothing: f32,
    pub min_decibels: f32,
    pub max_decibels: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CanvasConfig {
    pub width: u32,
    pub height: u32,
    pub heatmap_height: u32,
    pub history_height: u32,
}

impl Default for VisualizerConfig {
    fn default() -> Self {
        Self {
            frame_size: 512,
            features: FeatureKind::ALL.to_vec(),
            history_interval_ms: 1000,
            position_update_interval_ms: 250,
            volume: 0.8,
            spectrum: SpectrumConfig::default(),
            canvas: CanvasConfig::default(),
        }
    }
}

impl Default for SpectrumConfig {
    fn default() -> Self {
        Self {
            fft_size: 256,
            smoothing: 0.8,
            min_decibels: -100.0,
            max_decibels: -30.0,
        }
    }
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            width: 500,
            height: 150,
            heatmap_height: 120,
            history_height: 60,
        }
    }
}

impl VisualizerConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| VisualizerError::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::from_json(&content).map_err(|e| VisualizerError::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    pub fn from_json(content: &str) -> serde_json::Result<Self> {
        serde_json::from_str(content)
    }

    pub fn history_interval(&self) -> Duration {
        Duration::from_millis(self.history_interval_ms)
    }

    pub fn position_update_interval(&self) -> Duration {
        Duration::from_millis(self.position_update_interval_ms)
    }
}
