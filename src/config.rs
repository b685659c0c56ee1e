// Player configuration
// Read-only: values come from an optional JSON file and are never written back
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{AudioError, Result};

/// Volume applied before anyone calls `set_volume`
pub const DEFAULT_VOLUME: f32 = 0.5;

/// Startup configuration for an [`AudioPlayer`](crate::AudioPlayer)
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Initial value of the global enable toggle
    pub enabled: bool,
    /// Initial volume, clamped to 0.0 - 1.0 when applied
    pub volume: f32,
    /// Build the output stream paused, as browsers do under autoplay policy
    pub start_suspended: bool,
    /// Output device name; the default device is used when absent or not found
    pub output_device: Option<String>,
    /// Base directory for relative clip paths
    pub asset_root: Option<PathBuf>,
    pub fetch_timeout_secs: u64,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            volume: DEFAULT_VOLUME,
            start_suspended: false,
            output_device: None,
            asset_root: None,
            fetch_timeout_secs: 10,
        }
    }
}

impl PlayerConfig {
    /// Load config from file, or return defaults if the file doesn't exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "No config file found, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .map_err(|e| AudioError::Config(format!("Failed to read {}: {}", path.display(), e)))?;

        let config: PlayerConfig = serde_json::from_str(&content)
            .map_err(|e| AudioError::Config(format!("Failed to parse {}: {}", path.display(), e)))?;

        info!(path = %path.display(), "Loaded player config");
        Ok(config)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}
