use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::features::DEFAULT_MAX_DEVICES;
use crate::geofence::GeofenceParams;

/// Service configuration, loaded from a JSON file. Every section and field
/// is defaulted so a partial file parses; the model hyperparameters are
/// carried for the external training job, not consumed by the engine.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub geofence: GeofenceParams,
    pub api: ApiConfig,
    pub features: FeatureConfig,
    pub model: ModelConfig,
    pub limits: LimitsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub alarm_verbose: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            alarm_verbose: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scaler {
    Standard,
    None,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Feature scaling applied inside the model artifact by the training job.
    pub scaler: Scaler,
    /// Target duration of the batch rolling-mean window, seconds.
    pub window_sec: f64,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            scaler: Scaler::Standard,
            window_sec: 5.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub n_estimators: u32,
    pub max_samples: u32,
    pub contamination: f64,
    pub random_state: u64,
    /// Path to the training job's manifest; validated at startup when set.
    pub meta_path: Option<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            n_estimators: 256,
            max_samples: 1024,
            contamination: 0.10,
            random_state: 42,
            meta_path: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Bound on per-device state entries before least-recently-seen eviction.
    pub max_devices: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_devices: DEFAULT_MAX_DEVICES,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Config> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config at {}", path.display()))?;
        let cfg = serde_json::from_str(&raw)
            .with_context(|| format!("invalid config JSON at {}", path.display()))?;
        Ok(cfg)
    }
}

/// Locate the config file: `CONFIG_PATH` wins, then the usual run locations,
/// then a path next to the executable.
pub fn resolve_config_path() -> PathBuf {
    if let Ok(p) = std::env::var("CONFIG_PATH") {
        return PathBuf::from(p);
    }

    let candidates = [
        PathBuf::from("configs/config.json"),
        PathBuf::from("config.json"),
        {
            let mut p = std::env::current_exe().unwrap_or_else(|_| PathBuf::from("."));
            p.pop();
            p.push("configs/config.json");
            p
        },
    ];

    for c in candidates {
        if c.exists() {
            return c;
        }
    }

    // Fallback to the default relative path; load() will report the miss.
    PathBuf::from("configs/config.json")
}
