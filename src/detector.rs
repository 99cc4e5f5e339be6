//! Per-fix detection pipeline: geofence debounce first, model score second.
//!
//! One `Detector` instance owns all per-device state. The state maps live
//! behind `parking_lot` mutexes so fixes for different devices can arrive
//! from concurrent request handlers; a single device's fixes are serialized
//! by arrival order at the lock. Nothing here awaits, so the locks are only
//! ever held for the in-memory transition.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::Config;
use crate::features::OnlineFeatureEngine;
use crate::geofence::{DebouncedGeofence, GeofenceParams};
use crate::scoring::AnomalyScorer;
use crate::types::{Alarm, AlarmLabel};

/// Outcome of processing one fix. Consumed immediately by the caller; the
/// detector stores nothing about past verdicts.
#[derive(Debug, Clone)]
pub enum Detection {
    Alarm {
        reason: AlarmLabel,
        alarm: Alarm,
        distance_m: f64,
    },
    Normal {
        distance_m: f64,
    },
}

pub struct Detector {
    geofence: Mutex<DebouncedGeofence>,
    features: Mutex<OnlineFeatureEngine>,
    scorer: Option<Arc<dyn AnomalyScorer>>,
    debounce_sec: u32,
}

impl Detector {
    pub fn new(cfg: &Config, scorer: Option<Arc<dyn AnomalyScorer>>) -> Self {
        let gf = cfg.geofence;
        Self {
            geofence: Mutex::new(DebouncedGeofence::new(gf, cfg.limits.max_devices)),
            features: Mutex::new(OnlineFeatureEngine::new(
                gf.lat0,
                gf.lon0,
                cfg.limits.max_devices,
            )),
            scorer,
            debounce_sec: gf.debounce_sec,
        }
    }

    pub fn geofence_params(&self) -> GeofenceParams {
        *self.geofence.lock().params()
    }

    /// Run one fix through the pipeline. `ts` is event time, epoch seconds.
    ///
    /// A geofence trigger outranks a model verdict; the feature engine is
    /// fed either way so its per-device state stays warm.
    pub fn process(&self, device_id: &str, ts: f64, lat: f64, lon: f64, speed: f64) -> Detection {
        let (triggered, distance_m) = self.geofence.lock().check(device_id, lat, lon, ts);
        let features = self.features.lock().observe(device_id, ts, lat, lon, speed);

        if triggered {
            tracing::info!(device_id, distance_m, "geofence exit alarm");
            return Detection::Alarm {
                reason: AlarmLabel::GeofenceExit,
                alarm: Alarm::geofence_exit(self.debounce_sec),
                distance_m,
            };
        }

        if let (Some(scorer), Some(fv)) = (&self.scorer, features) {
            let verdict = scorer.score(&fv);
            if verdict.is_anomaly {
                tracing::info!(
                    device_id,
                    score = verdict.anomaly_score,
                    "model anomaly alarm"
                );
                return Detection::Alarm {
                    reason: AlarmLabel::ModelAnomaly,
                    alarm: Alarm::model_anomaly(
                        verdict.anomaly_score,
                        scorer.decision_threshold(),
                    ),
                    distance_m,
                };
            }
        }

        Detection::Normal { distance_m }
    }
}
