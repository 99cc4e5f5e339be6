//! Contract with the offline-trained anomaly model.
//!
//! The model itself (an isolation forest fitted by the training job) runs
//! behind the [`AnomalyScorer`] trait; this crate only guarantees that the
//! features it feeds the scorer are the ones the model was trained on. The
//! training job records that contract in a manifest next to the artifact,
//! and a mismatch is a configuration error caught at load time — never
//! coerced per request.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::types::{FeatureVector, FEATURE_NAMES};

#[derive(Debug, thiserror::Error)]
pub enum ScoringError {
    #[error("failed to read model manifest at {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse model manifest: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("model manifest features {found:?} do not match engine features {expected:?}")]
    FeatureMismatch {
        expected: Vec<String>,
        found: Vec<String>,
    },
}

/// Sidecar metadata written by the training job (`isoforest.meta.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelManifest {
    /// Ordered feature names the model expects as input.
    pub features: Vec<String>,
    /// Training sample count, informational.
    pub count: u64,
}

impl ModelManifest {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ScoringError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ScoringError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let manifest: ModelManifest = serde_json::from_str(&raw)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Require exact agreement, names and order, with the engine's feature
    /// vector layout.
    pub fn validate(&self) -> Result<(), ScoringError> {
        if self.features.len() != FEATURE_NAMES.len()
            || self.features.iter().zip(FEATURE_NAMES).any(|(a, b)| a != b)
        {
            return Err(ScoringError::FeatureMismatch {
                expected: FEATURE_NAMES.iter().map(|s| s.to_string()).collect(),
                found: self.features.clone(),
            });
        }
        Ok(())
    }
}

/// Verdict for one feature vector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Score {
    pub anomaly_score: f32,
    pub is_anomaly: bool,
}

/// A trained outlier model consumed as a pure function.
///
/// Implementations live outside this crate; the decision threshold is fixed
/// at training time and only echoed into alarm payloads here.
pub trait AnomalyScorer: Send + Sync {
    fn score(&self, features: &FeatureVector) -> Score;
    fn decision_threshold(&self) -> f32;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_matching_engine_features_validates() {
        let manifest = ModelManifest {
            features: FEATURE_NAMES.iter().map(|s| s.to_string()).collect(),
            count: 4096,
        };
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn manifest_with_reordered_features_is_rejected() {
        let mut names: Vec<String> = FEATURE_NAMES.iter().map(|s| s.to_string()).collect();
        names.swap(0, 1);
        let manifest = ModelManifest {
            features: names,
            count: 4096,
        };
        assert!(matches!(
            manifest.validate(),
            Err(ScoringError::FeatureMismatch { .. })
        ));
    }

    #[test]
    fn manifest_with_missing_feature_is_rejected() {
        let manifest = ModelManifest {
            features: vec!["speed".to_string()],
            count: 10,
        };
        assert!(manifest.validate().is_err());
    }

    #[test]
    fn manifest_parses_training_job_output() {
        let raw = r#"{"features": ["speed", "accel_abs", "turn_rate_abs", "dist_center_m"], "count": 12345}"#;
        let manifest: ModelManifest = serde_json::from_str(raw).unwrap();
        assert_eq!(manifest.count, 12345);
        assert!(manifest.validate().is_ok());
    }
}
