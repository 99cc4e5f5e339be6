//! Debounced circular geofence.
//!
//! Converts instantaneous inside/outside observations into a low-noise alarm
//! signal: a device must dwell outside the radius for at least the debounce
//! window before `check` reports a trigger. The alarm is level-triggered —
//! once past the threshold it keeps reporting on every call until the device
//! is observed back inside, which is the only thing that clears the marker.

use std::collections::HashMap;

use serde::Deserialize;

use crate::geo::distance_m;

/// Immutable fence configuration, shared read-only by all devices.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct GeofenceParams {
    pub lat0: f64,
    pub lon0: f64,
    pub radius_m: f64,
    pub debounce_sec: u32,
}

impl Default for GeofenceParams {
    fn default() -> Self {
        Self {
            lat0: 0.0,
            lon0: 0.0,
            radius_m: 500.0,
            debounce_sec: 10,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct DeviceState {
    /// Set while the device dwells outside the radius.
    outside_since: Option<f64>,
    /// Last check time, used only for eviction ordering.
    last_seen: f64,
}

/// Per-device debounce state machine. Unseen devices start Inside.
pub struct DebouncedGeofence {
    params: GeofenceParams,
    max_devices: usize,
    state: HashMap<String, DeviceState>,
}

impl DebouncedGeofence {
    pub fn new(params: GeofenceParams, max_devices: usize) -> Self {
        Self {
            params,
            max_devices: max_devices.max(1),
            state: HashMap::new(),
        }
    }

    pub fn params(&self) -> &GeofenceParams {
        &self.params
    }

    /// Evaluate one observation at event time `now` (epoch seconds).
    ///
    /// Returns `(triggered, distance_m)`. A point at exactly the radius
    /// counts as inside. `triggered` holds only once the device has been
    /// outside for at least `debounce_sec`, and keeps holding on every later
    /// check until the device re-enters.
    pub fn check(&mut self, device_id: &str, lat: f64, lon: f64, now: f64) -> (bool, f64) {
        let d = distance_m(self.params.lat0, self.params.lon0, lat, lon);
        let outside = d > self.params.radius_m;

        let since = self.state.get(device_id).and_then(|s| s.outside_since);
        let marker = if outside {
            since.or(Some(now))
        } else {
            None
        };

        if !self.state.contains_key(device_id) {
            self.evict_if_full();
        }
        self.state.insert(
            device_id.to_string(),
            DeviceState {
                outside_since: marker,
                last_seen: now,
            },
        );

        let triggered = match (outside, since) {
            (true, Some(since)) => now - since >= f64::from(self.params.debounce_sec),
            _ => false,
        };
        (triggered, d)
    }

    /// Number of devices with tracked state.
    pub fn device_count(&self) -> usize {
        self.state.len()
    }

    fn evict_if_full(&mut self) {
        if self.state.len() < self.max_devices {
            return;
        }
        let stale = self
            .state
            .iter()
            .min_by(|a, b| a.1.last_seen.total_cmp(&b.1.last_seen))
            .map(|(id, _)| id.clone());
        if let Some(id) = stale {
            tracing::warn!(device_id = %id, "device cap reached, evicting least-recently-seen marker");
            self.state.remove(&id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::DEFAULT_MAX_DEVICES;

    const LAT0: f64 = 41.015137;
    const LON0: f64 = 28.979530;

    fn fence(radius_m: f64, debounce_sec: u32) -> DebouncedGeofence {
        DebouncedGeofence::new(
            GeofenceParams {
                lat0: LAT0,
                lon0: LON0,
                radius_m,
                debounce_sec,
            },
            DEFAULT_MAX_DEVICES,
        )
    }

    /// A point roughly `meters` north of the fence center.
    fn north_of_center(meters: f64) -> (f64, f64) {
        (LAT0 + meters / 111_194.9, LON0)
    }

    #[test]
    fn excursion_scenario_triggers_after_debounce() {
        let mut gf = fence(1000.0, 10);
        let (far_lat, far_lon) = north_of_center(1500.0);

        // A: inside at the center
        let (trig, d) = gf.check("dev", LAT0, LON0, 0.0);
        assert!(!trig);
        assert_eq!(d, 0.0);

        // B: outside, marker set, not yet due
        let (trig, d) = gf.check("dev", far_lat, far_lon, 1.0);
        assert!(!trig);
        assert!((d - 1500.0).abs() < 5.0, "distance {d}");

        // C: still outside past the window → alarm
        let (trig, d) = gf.check("dev", far_lat, far_lon, 12.0);
        assert!(trig);
        assert!((d - 1500.0).abs() < 5.0);

        // D: back inside clears the marker
        let (trig, d) = gf.check("dev", LAT0, LON0, 13.0);
        assert!(!trig);
        assert_eq!(d, 0.0);
    }

    #[test]
    fn short_excursion_never_triggers() {
        let mut gf = fence(1000.0, 10);
        let (far_lat, far_lon) = north_of_center(1500.0);

        assert!(!gf.check("dev", far_lat, far_lon, 0.0).0);
        assert!(!gf.check("dev", far_lat, far_lon, 9.0).0);
        assert!(!gf.check("dev", LAT0, LON0, 9.5).0);
        // marker was cleared; going out again restarts the window
        assert!(!gf.check("dev", far_lat, far_lon, 10.0).0);
        assert!(!gf.check("dev", far_lat, far_lon, 19.0).0);
        assert!(gf.check("dev", far_lat, far_lon, 20.0).0);
    }

    #[test]
    fn alarm_is_level_triggered_until_reentry() {
        let mut gf = fence(1000.0, 10);
        let (far_lat, far_lon) = north_of_center(2000.0);

        gf.check("dev", far_lat, far_lon, 0.0);
        assert!(gf.check("dev", far_lat, far_lon, 10.0).0);
        assert!(gf.check("dev", far_lat, far_lon, 11.0).0);
        assert!(gf.check("dev", far_lat, far_lon, 500.0).0);
        assert!(!gf.check("dev", LAT0, LON0, 501.0).0);
        // next excursion debounces from scratch
        assert!(!gf.check("dev", far_lat, far_lon, 502.0).0);
    }

    #[test]
    fn point_exactly_on_radius_is_inside() {
        let (lat, lon) = north_of_center(800.0);
        let exact = distance_m(LAT0, LON0, lat, lon);
        let mut gf = fence(exact, 0);
        let (trig, d) = gf.check("dev", lat, lon, 0.0);
        assert!(!trig);
        assert_eq!(d, exact);
        // marker must not even have been set
        let (trig, _) = gf.check("dev", lat, lon, 100.0);
        assert!(!trig);
    }

    #[test]
    fn trigger_exactly_at_debounce_boundary() {
        let mut gf = fence(1000.0, 10);
        let (far_lat, far_lon) = north_of_center(1500.0);
        gf.check("dev", far_lat, far_lon, 0.0);
        assert!(!gf.check("dev", far_lat, far_lon, 9.999).0);
        assert!(gf.check("dev", far_lat, far_lon, 10.0).0);
    }

    #[test]
    fn devices_debounce_independently() {
        let mut gf = fence(1000.0, 10);
        let (far_lat, far_lon) = north_of_center(1500.0);
        gf.check("a", far_lat, far_lon, 0.0);
        gf.check("b", far_lat, far_lon, 8.0);
        assert!(gf.check("a", far_lat, far_lon, 12.0).0);
        assert!(!gf.check("b", far_lat, far_lon, 12.0).0);
    }

    #[test]
    fn eviction_respects_bound() {
        let mut gf = DebouncedGeofence::new(
            GeofenceParams {
                lat0: LAT0,
                lon0: LON0,
                radius_m: 1000.0,
                debounce_sec: 10,
            },
            2,
        );
        let (far_lat, far_lon) = north_of_center(1500.0);
        gf.check("old", far_lat, far_lon, 0.0);
        gf.check("mid", far_lat, far_lon, 1.0);
        gf.check("new", far_lat, far_lon, 2.0);
        assert_eq!(gf.device_count(), 2);
        // "mid" kept its marker across "old"'s eviction.
        assert!(gf.check("mid", far_lat, far_lon, 12.0).0);
        // "old" lost its marker, so it debounces from scratch and cannot
        // trigger immediately even though 13 s have passed.
        assert!(!gf.check("old", far_lat, far_lon, 13.0).0);
    }
}
