//! Per-target recognition profiles
//!
//! The optimizer records which confidence threshold and preset worked best
//! for a given target (usually a game title); the recognition pipeline reads
//! it back at session start.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::vision::PreprocessingPreset;

/// Best-known recognition settings for one target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimalSettings {
    /// Always within [0, 1]
    pub confidence_threshold: f32,
    pub preset: PreprocessingPreset,
    pub last_optimized: SystemTime,
    /// Number of configurations the optimizer evaluated
    pub attempts: u32,
    pub is_optimized: bool,
}

impl Default for OptimalSettings {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.5,
            preset: PreprocessingPreset::neutral(),
            last_optimized: SystemTime::UNIX_EPOCH,
            attempts: 0,
            is_optimized: false,
        }
    }
}

impl OptimalSettings {
    pub fn new(confidence_threshold: f32, preset: PreprocessingPreset) -> Self {
        Self {
            preset,
            ..Default::default()
        }
        .with_threshold(confidence_threshold)
    }

    /// Replace the threshold, clamping it into [0, 1]
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = clamp_threshold(threshold);
        self
    }

    /// Restore the threshold invariant on values read from disk
    fn sanitized(mut self) -> Self {
        let clamped = clamp_threshold(self.confidence_threshold);
        if clamped != self.confidence_threshold {
            warn!(
                "Stored confidence threshold {} out of range, using {}",
                self.confidence_threshold, clamped
            );
            self.confidence_threshold = clamped;
        }
        self
    }

    /// Reset every field to its default individually, keeping nothing from the
    /// optimizer run
    pub fn reset_to_defaults(&mut self) {
        let defaults = Self::default();
        self.confidence_threshold = defaults.confidence_threshold;
        self.preset = defaults.preset;
        self.last_optimized = defaults.last_optimized;
        self.attempts = defaults.attempts;
        self.is_optimized = defaults.is_optimized;
    }
}

fn clamp_threshold(threshold: f32) -> f32 {
    if threshold.is_nan() {
        0.5
    } else {
        threshold.clamp(0.0, 1.0)
    }
}

/// Persistence for [`OptimalSettings`], one entry per target id
pub trait ProfileStore: Send + Sync {
    fn load(&self, target_id: &str) -> Result<Option<OptimalSettings>>;
    fn save(&self, target_id: &str, settings: &OptimalSettings) -> Result<()>;
    fn remove(&self, target_id: &str) -> Result<bool>;
}

/// All profiles in a single pretty-printed JSON file
pub struct JsonProfileStore {
    path: PathBuf,
    profiles: Mutex<HashMap<String, OptimalSettings>>,
}

impl JsonProfileStore {
    /// Open the store at `path`, reading existing profiles if the file exists
    pub fn open(path: &Path) -> Result<Self> {
        let profiles = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read profile store {:?}", path))?;
            let raw: HashMap<String, OptimalSettings> = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse profile store {:?}", path))?;
            raw.into_iter().map(|(k, v)| (k, v.sanitized())).collect()
        } else {
            HashMap::new()
        };

        info!("Opened profile store {:?} ({} profiles)", path, profiles.len());

        Ok(Self {
            path: path.to_path_buf(),
            profiles: Mutex::new(profiles),
        })
    }

    /// Open `profiles.json` in the application data directory
    pub fn open_default() -> Result<Self> {
        let dir = super::get_data_dir()?;
        Self::open(&dir.join("profiles.json"))
    }

    /// Target ids with a stored profile, sorted
    pub fn targets(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.profiles.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    fn flush(&self, profiles: &HashMap<String, OptimalSettings>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(profiles)?;
        std::fs::write(&self.path, content)
            .with_context(|| format!("Failed to write profile store {:?}", self.path))?;
        Ok(())
    }
}

impl ProfileStore for JsonProfileStore {
    fn load(&self, target_id: &str) -> Result<Option<OptimalSettings>> {
        Ok(self.profiles.lock().get(target_id).cloned())
    }

    fn save(&self, target_id: &str, settings: &OptimalSettings) -> Result<()> {
        let mut profiles = self.profiles.lock();
        profiles.insert(target_id.to_string(), settings.clone().sanitized());
        self.flush(&profiles)?;
        debug!("Saved profile for '{}'", target_id);
        Ok(())
    }

    fn remove(&self, target_id: &str) -> Result<bool> {
        let mut profiles = self.profiles.lock();
        let removed = profiles.remove(target_id).is_some();
        if removed {
            self.flush(&profiles)?;
        }
        Ok(removed)
    }
}

/// Volatile store, for sessions that should not touch disk
#[derive(Default)]
pub struct MemoryProfileStore {
    profiles: Mutex<HashMap<String, OptimalSettings>>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProfileStore for MemoryProfileStore {
    fn load(&self, target_id: &str) -> Result<Option<OptimalSettings>> {
        Ok(self.profiles.lock().get(target_id).cloned())
    }

    fn save(&self, target_id: &str, settings: &OptimalSettings) -> Result<()> {
        self.profiles
            .lock()
            .insert(target_id.to_string(), settings.clone().sanitized());
        Ok(())
    }

    fn remove(&self, target_id: &str) -> Result<bool> {
        Ok(self.profiles.lock().remove(target_id).is_some())
    }
}
