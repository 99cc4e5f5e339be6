//! Online (strictly causal) kinematic feature extraction.
//!
//! Keeps exactly one last-observation record per device and turns each
//! accepted fix into the same instantaneous features the batch pipeline in
//! [`crate::batch`] computes offline. Any numeric divergence between the two
//! silently skews the model against live traffic, so both sides share the
//! helpers in [`crate::geo`] and the column definitions in
//! [`crate::types::FeatureVector`].

use std::collections::HashMap;

use crate::geo::{angular_diff_deg, bearing_deg, distance_m};
use crate::types::{finite_or_zero, FeatureVector};

/// Default bound on tracked devices before least-recently-seen eviction.
pub const DEFAULT_MAX_DEVICES: usize = 10_000;

#[derive(Debug, Clone)]
struct LastFix {
    ts: f64,
    lat: f64,
    lon: f64,
    speed: f64,
    bearing: Option<f64>,
}

/// Per-device incremental feature state.
///
/// Exclusively owned; callers serialize access per device (the service wraps
/// the whole engine in a mutex). The map is bounded: once `max_devices`
/// distinct ids are tracked, seeing a new id evicts the device whose state
/// was updated longest ago.
pub struct OnlineFeatureEngine {
    lat0: f64,
    lon0: f64,
    max_devices: usize,
    last: HashMap<String, LastFix>,
}

impl OnlineFeatureEngine {
    pub fn new(lat0: f64, lon0: f64, max_devices: usize) -> Self {
        Self {
            lat0,
            lon0,
            max_devices: max_devices.max(1),
            last: HashMap::new(),
        }
    }

    /// Feed one fix; returns the feature vector once the device is warm.
    ///
    /// Returns `None` for a device's first fix and for non-causal input
    /// (`dt <= 0`). In both cases the stored state still advances to the new
    /// observation, so a device recovers after a clock step without manual
    /// intervention.
    pub fn observe(
        &mut self,
        device_id: &str,
        ts: f64,
        lat: f64,
        lon: f64,
        speed: f64,
    ) -> Option<FeatureVector> {
        let Some(prev) = self.last.get(device_id).cloned() else {
            self.evict_if_full();
            self.last.insert(
                device_id.to_string(),
                LastFix {
                    ts,
                    lat,
                    lon,
                    speed,
                    bearing: None,
                },
            );
            return None;
        };

        let dt = ts - prev.ts;
        let bearing = bearing_deg(prev.lat, prev.lon, lat, lon);

        if dt <= 0.0 {
            // Clock went backward or duplicate timestamp: absorb silently,
            // no emission for non-causal input.
            self.last.insert(
                device_id.to_string(),
                LastFix {
                    ts,
                    lat,
                    lon,
                    speed,
                    bearing: Some(bearing),
                },
            );
            return None;
        }

        let accel = (speed - prev.speed) / dt;
        let turn_rate = match prev.bearing {
            Some(pb) => angular_diff_deg(bearing, pb) / dt,
            None => 0.0,
        };
        let dist_center = distance_m(self.lat0, self.lon0, lat, lon);

        let features = FeatureVector {
            speed: finite_or_zero(speed),
            accel_abs: finite_or_zero(accel.abs()),
            turn_rate_abs: finite_or_zero(turn_rate.abs()),
            dist_center_m: finite_or_zero(dist_center),
        };

        self.last.insert(
            device_id.to_string(),
            LastFix {
                ts,
                lat,
                lon,
                speed,
                bearing: Some(bearing),
            },
        );
        Some(features)
    }

    /// Number of devices currently tracked.
    pub fn device_count(&self) -> usize {
        self.last.len()
    }

    fn evict_if_full(&mut self) {
        if self.last.len() < self.max_devices {
            return;
        }
        let stale = self
            .last
            .iter()
            .min_by(|a, b| a.1.ts.total_cmp(&b.1.ts))
            .map(|(id, _)| id.clone());
        if let Some(id) = stale {
            tracing::warn!(device_id = %id, "device cap reached, evicting least-recently-seen state");
            self.last.remove(&id);
        }
    }
}
