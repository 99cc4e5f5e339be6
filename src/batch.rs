//! Batch (offline) kinematic feature extraction over whole recorded tracks.
//!
//! Recomputes the instantaneous columns of [`crate::features`] for every row
//! of a fix table and adds the trailing rolling means the training job
//! consumes. The instantaneous columns share their definitions (and the
//! [`crate::geo`] helpers) with the online engine: for any two consecutive
//! causally-ordered fixes of one device, the batch values of the second row
//! equal the online engine's emitted vector. The one intentional asymmetry
//! is the device's first row, which is kept as a zero-rate boundary row
//! (previous = current) instead of being dropped, because training code
//! expects one feature row per input row.

use std::collections::VecDeque;

use crate::geo::{angular_diff_deg, bearing_deg, distance_m};
use crate::types::{finite_or_zero, BatchFeatureRow, Fix};

struct PrevPoint {
    ts: f64,
    lat: f64,
    lon: f64,
    speed: f64,
    bearing: Option<f64>,
    dist_center: f64,
}

struct Scratch {
    orig: usize,
    device_start: bool,
    speed: f64,
    accel_abs: f64,
    turn_signed: f64,
    dist_center: f64,
    radial: f64,
}

/// Build one feature row per input fix, aligned to the input order.
///
/// The table may interleave devices and arrive unsorted; rows are processed
/// in stable `(device_id, timestamp)` order (ties keep input order) and the
/// results are scattered back to the original row positions. Invalid
/// inter-sample gaps (`dt <= 0`, non-finite) contribute zero rates. A missing
/// speed value falls back to the observed speed (step distance / dt), then
/// to 0. `window_sec` sizes the rolling means: window length is
/// `max(1, round(window_sec / median_dt))` samples, per device, trailing
/// samples only.
pub fn build_features(
    fixes: &[Fix],
    lat0: f64,
    lon0: f64,
    window_sec: f64,
) -> Vec<BatchFeatureRow> {
    let mut order: Vec<usize> = (0..fixes.len()).collect();
    order.sort_by(|&a, &b| {
        fixes[a]
            .device_id
            .cmp(&fixes[b].device_id)
            .then(fixes[a].timestamp.cmp(&fixes[b].timestamp))
    });

    // First pass: instantaneous columns in sorted order.
    let mut scratch: Vec<Scratch> = Vec::with_capacity(fixes.len());
    let mut valid_dts: Vec<f64> = Vec::new();
    let mut prev: Option<PrevPoint> = None;
    let mut prev_device: Option<&str> = None;

    for &idx in &order {
        let fix = &fixes[idx];
        let ts = fix.epoch_s();
        let device_start = prev_device != Some(fix.device_id.as_str());
        if device_start {
            prev = None;
        }
        prev_device = Some(fix.device_id.as_str());

        let dist_center = distance_m(lat0, lon0, fix.lat, fix.lon);
        let row = match &prev {
            None => {
                // Boundary row: previous = current, zero step and zero rates.
                let speed = fix.speed.filter(|s| s.is_finite()).unwrap_or(0.0);
                prev = Some(PrevPoint {
                    ts,
                    lat: fix.lat,
                    lon: fix.lon,
                    speed,
                    bearing: None,
                    dist_center,
                });
                Scratch {
                    orig: idx,
                    device_start,
                    speed,
                    accel_abs: 0.0,
                    turn_signed: 0.0,
                    dist_center,
                    radial: 0.0,
                }
            }
            Some(p) => {
                let dt_raw = ts - p.ts;
                let dt = (dt_raw > 0.0 && dt_raw.is_finite()).then_some(dt_raw);
                if let Some(dt) = dt {
                    valid_dts.push(dt);
                }

                let step_m = distance_m(p.lat, p.lon, fix.lat, fix.lon);
                let observed_speed = dt.map(|dt| step_m / dt).filter(|v| v.is_finite());
                let speed = fix
                    .speed
                    .filter(|s| s.is_finite())
                    .or(observed_speed)
                    .unwrap_or(0.0);

                let bearing = bearing_deg(p.lat, p.lon, fix.lat, fix.lon);
                let accel = dt.map(|dt| (speed - p.speed) / dt).unwrap_or(0.0);
                let turn_signed = match (dt, p.bearing) {
                    (Some(dt), Some(pb)) => angular_diff_deg(bearing, pb) / dt,
                    _ => 0.0,
                };
                let radial = dt.map(|dt| (dist_center - p.dist_center) / dt).unwrap_or(0.0);

                prev = Some(PrevPoint {
                    ts,
                    lat: fix.lat,
                    lon: fix.lon,
                    speed,
                    bearing: Some(bearing),
                    dist_center,
                });
                Scratch {
                    orig: idx,
                    device_start,
                    speed,
                    accel_abs: accel.abs(),
                    turn_signed,
                    dist_center,
                    radial,
                }
            }
        };
        scratch.push(row);
    }

    let win = window_len(&mut valid_dts, window_sec);

    // Second pass: trailing rolling means per device, then scatter back.
    let zero = BatchFeatureRow {
        speed: 0.0,
        accel_abs: 0.0,
        turn_rate_abs: 0.0,
        dist_center_m: 0.0,
        turn_rate_signed: 0.0,
        radial_speed: 0.0,
        speed_ma: 0.0,
        accel_ma: 0.0,
        radial_speed_ma: 0.0,
    };
    let mut out = vec![zero; fixes.len()];
    let mut speed_win = RollingMean::new(win);
    let mut accel_win = RollingMean::new(win);
    let mut radial_win = RollingMean::new(win);

    for row in &scratch {
        if row.device_start {
            speed_win.clear();
            accel_win.clear();
            radial_win.clear();
        }
        let speed = sanitize(row.speed);
        let accel_abs = sanitize(row.accel_abs);
        let turn_signed = sanitize(row.turn_signed);
        let radial = sanitize(row.radial);

        out[row.orig] = BatchFeatureRow {
            speed: finite_or_zero(speed),
            accel_abs: finite_or_zero(accel_abs),
            turn_rate_abs: finite_or_zero(turn_signed.abs()),
            dist_center_m: finite_or_zero(row.dist_center),
            turn_rate_signed: finite_or_zero(turn_signed),
            radial_speed: finite_or_zero(radial),
            speed_ma: finite_or_zero(speed_win.push(speed)),
            accel_ma: finite_or_zero(accel_win.push(accel_abs)),
            radial_speed_ma: finite_or_zero(radial_win.push(radial)),
        };
    }
    out
}

fn sanitize(v: f64) -> f64 {
    if v.is_finite() {
        v
    } else {
        0.0
    }
}

/// Window length in samples: target duration over the median inter-sample
/// interval of the whole table, never below one sample.
fn window_len(valid_dts: &mut [f64], window_sec: f64) -> usize {
    if window_sec <= 0.0 || valid_dts.is_empty() {
        return 1;
    }
    valid_dts.sort_by(f64::total_cmp);
    let n = valid_dts.len();
    let median = if n % 2 == 1 {
        valid_dts[n / 2]
    } else {
        (valid_dts[n / 2 - 1] + valid_dts[n / 2]) / 2.0
    };
    if !median.is_finite() || median <= 0.0 {
        return 1;
    }
    ((window_sec / median).round() as usize).max(1)
}

/// Trailing mean over the last `win` samples, at least one.
struct RollingMean {
    win: usize,
    buf: VecDeque<f64>,
    sum: f64,
}

impl RollingMean {
    fn new(win: usize) -> Self {
        Self {
            win: win.max(1),
            buf: VecDeque::with_capacity(win.max(1)),
            sum: 0.0,
        }
    }

    fn push(&mut self, v: f64) -> f64 {
        if self.buf.len() == self.win {
            if let Some(old) = self.buf.pop_front() {
                self.sum -= old;
            }
        }
        self.buf.push_back(v);
        self.sum += v;
        self.sum / self.buf.len() as f64
    }

    fn clear(&mut self) {
        self.buf.clear();
        self.sum = 0.0;
    }
}
