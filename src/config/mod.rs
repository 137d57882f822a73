//! Application Configuration
//!
//! User settings stored in TOML format. Every section falls back to its
//! defaults when missing from the file.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::translation::{HttpEngineConfig, LanguageSettings};
use crate::vision::{ChangeConfig, PipelineConfig};

/// Application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Capture settings
    pub capture: CaptureSettings,
    /// Change detection tuning
    pub change: ChangeConfig,
    /// Recognition pipeline tuning
    pub recognition: PipelineConfig,
    /// Translation settings
    pub translation: TranslationSettings,
}

/// Capture-related settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    /// Target window title or frame directory
    pub target_window: Option<String>,
    /// Interval between periodic ticks
    pub tick_interval_ms: u64,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            target_window: None,
            tick_interval_ms: 500,
        }
    }
}

/// Translation-related settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslationSettings {
    #[serde(flatten)]
    pub languages: LanguageSettings,
    /// Translation cache capacity
    pub cache_capacity: usize,
    /// Max center distance for two regions to count as the same text
    pub similar_distance_px: f32,
    /// Min normalized similarity for two texts to count as the same
    pub text_similarity: f64,
    /// Features granted by the license
    pub licensed_features: Vec<String>,
    /// Primary engine
    pub primary: Option<HttpEngineConfig>,
    /// Engine used when the primary one fails
    pub fallback: Option<HttpEngineConfig>,
}

impl Default for TranslationSettings {
    fn default() -> Self {
        Self {
            languages: LanguageSettings::default(),
            cache_capacity: 1000,
            similar_distance_px: 10.0,
            text_similarity: 0.9,
            licensed_features: Vec::new(),
            primary: Some(HttpEngineConfig::default()),
            fallback: None,
        }
    }
}

impl AppConfig {
    /// Clamp out-of-range values back into range, logging each correction
    pub fn validate(&mut self) {
        let recognition = &mut self.recognition;
        recognition.confidence_threshold =
            clamp_unit("recognition.confidence_threshold", recognition.confidence_threshold, 0.5);
        recognition.threshold_step = clamp_unit("recognition.threshold_step", recognition.threshold_step, 0.1);
        recognition.threshold_floor =
            clamp_unit("recognition.threshold_floor", recognition.threshold_floor, 0.1);
        if recognition.cache_capacity == 0 {
            warn!("recognition.cache_capacity must be at least 1");
            recognition.cache_capacity = 1;
        }
        if recognition.hash_grid == 0 {
            warn!("recognition.hash_grid must be at least 1");
            recognition.hash_grid = 1;
        }

        self.change.difference_threshold =
            clamp_unit("change.difference_threshold", self.change.difference_threshold, 0.01);
        if self.change.grid_size == 0 {
            warn!("change.grid_size must be at least 1");
            self.change.grid_size = 1;
        }

        if self.capture.tick_interval_ms == 0 {
            warn!("capture.tick_interval_ms must be at least 1");
            self.capture.tick_interval_ms = 1;
        }

        let translation = &mut self.translation;
        translation.text_similarity = if translation.text_similarity.is_finite() {
            let clamped = translation.text_similarity.clamp(0.0, 1.0);
            if clamped != translation.text_similarity {
                warn!(
                    "translation.text_similarity {} out of range, using {}",
                    translation.text_similarity, clamped
                );
            }
            clamped
        } else {
            warn!("translation.text_similarity is not a number, using 0.9");
            0.9
        };
        if !translation.similar_distance_px.is_finite() || translation.similar_distance_px < 0.0 {
            warn!("translation.similar_distance_px invalid, using 10");
            translation.similar_distance_px = 10.0;
        }
        if translation.cache_capacity == 0 {
            warn!("translation.cache_capacity must be at least 1");
            translation.cache_capacity = 1;
        }
    }
}

fn clamp_unit(name: &str, value: f32, default: f32) -> f32 {
    if !value.is_finite() {
        warn!("{} is not a number, using {}", name, default);
        return default;
    }
    let clamped = value.clamp(0.0, 1.0);
    if clamped != value {
        warn!("{} {} out of range, using {}", name, value, clamped);
    }
    clamped
}

/// Default configuration file location
pub fn default_config_path() -> Result<PathBuf> {
    Ok(crate::storage::get_config_dir()?.join("config.toml"))
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {:?}", path))?;
    let mut config: AppConfig =
        toml::from_str(&content).with_context(|| format!("Failed to parse config {:?}", path))?;
    config.validate();
    Ok(config)
}

/// Load configuration, using defaults when the file does not exist
pub fn load_or_default(path: &Path) -> Result<AppConfig> {
    if path.exists() {
        load_config(path)
    } else {
        info!("No config at {:?}, using defaults", path);
        Ok(AppConfig::default())
    }
}

/// Save configuration to file
pub fn save_config(config: &AppConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}
