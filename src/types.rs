use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------- Inbound records ----------

/// One GPS observation as carried in JSONL files and on the wire.
///
/// `speed` is meters per second and may be absent in recorded tracks; the
/// batch feature builder substitutes the observed speed (distance / dt) then.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Fix {
    pub device_id: String,
    pub timestamp: DateTime<Utc>,
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub speed: Option<f64>,
}

impl Fix {
    /// Event time as fractional epoch seconds, the unit the engines use.
    pub fn epoch_s(&self) -> f64 {
        self.timestamp.timestamp_millis() as f64 / 1000.0
    }
}

// ---------- Feature vectors ----------

/// Model-input feature names, in the authoritative order. The training
/// job's manifest must list exactly these (see `scoring::ModelManifest`).
pub const FEATURE_NAMES: [&str; 4] = ["speed", "accel_abs", "turn_rate_abs", "dist_center_m"];

/// Instantaneous kinematic features emitted by the online engine, one per
/// warm fix. Values are finite by construction (NaN/±inf collapse to 0.0).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FeatureVector {
    /// Reported speed, m/s.
    pub speed: f32,
    /// |Δspeed / Δt|, m/s².
    pub accel_abs: f32,
    /// |Δbearing / Δt|, deg/s.
    pub turn_rate_abs: f32,
    /// Great-circle distance to the geofence center, m.
    pub dist_center_m: f32,
}

impl FeatureVector {
    /// Values in `FEATURE_NAMES` order.
    pub fn to_array(self) -> [f32; 4] {
        [self.speed, self.accel_abs, self.turn_rate_abs, self.dist_center_m]
    }
}

/// One batch-mode feature row. The first four columns repeat the online
/// `FeatureVector` definitions; the rest exist only offline and feed the
/// training job (rolling means use trailing samples only).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BatchFeatureRow {
    pub speed: f32,
    pub accel_abs: f32,
    pub turn_rate_abs: f32,
    pub dist_center_m: f32,
    pub turn_rate_signed: f32,
    pub radial_speed: f32,
    pub speed_ma: f32,
    pub accel_ma: f32,
    pub radial_speed_ma: f32,
}

/// Collapse non-finite intermediates to 0.0 at the f32 output boundary.
pub(crate) fn finite_or_zero(v: f64) -> f32 {
    let v = v as f32;
    if v.is_finite() {
        v
    } else {
        0.0
    }
}

// ---------- Alarms ----------

pub const CODE_GEOFENCE_EXIT: u32 = 1000;
pub const CODE_MODEL_ANOMALY: u32 = 2000;
pub const CODE_SPEED_ANOMALY: u32 = 3000;
pub const CODE_ROUTE_JUMP: u32 = 3001;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlarmLabel {
    GeofenceExit,
    ModelAnomaly,
    SpeedAnomaly,
    RouteJump,
}

impl AlarmLabel {
    pub fn as_str(self) -> &'static str {
        match self {
            AlarmLabel::GeofenceExit => "GEOFENCE_EXIT",
            AlarmLabel::ModelAnomaly => "MODEL_ANOMALY",
            AlarmLabel::SpeedAnomaly => "SPEED_ANOMALY",
            AlarmLabel::RouteJump => "ROUTE_JUMP",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlarmSource {
    Geofence,
    Model,
    Rule,
}

/// Alarm payload embedded in a `/detect` alarm response. Produced, never
/// stored; the optional fields depend on the source (window for geofence,
/// score/threshold for model verdicts).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alarm {
    pub code: u32,
    pub label: AlarmLabel,
    pub source: AlarmSource,
    pub window_sec: Option<u32>,
    pub score: Option<f32>,
    pub threshold: Option<f32>,
}

impl Alarm {
    pub fn geofence_exit(window_sec: u32) -> Self {
        Self {
            code: CODE_GEOFENCE_EXIT,
            label: AlarmLabel::GeofenceExit,
            source: AlarmSource::Geofence,
            window_sec: Some(window_sec),
            score: None,
            threshold: None,
        }
    }

    pub fn model_anomaly(score: f32, threshold: f32) -> Self {
        Self {
            code: CODE_MODEL_ANOMALY,
            label: AlarmLabel::ModelAnomaly,
            source: AlarmSource::Model,
            window_sec: None,
            score: Some(score),
            threshold: Some(threshold),
        }
    }
}

// ---------- /detect wire types ----------

/// Inbound detection request. Schema validation happens here at
/// deserialization; the engine assumes sane, finite values past this point.
#[derive(Debug, Clone, Deserialize)]
pub struct DetectIn {
    pub device_id: String,
    pub timestamp: DateTime<Utc>,
    pub lat: f64,
    pub lon: f64,
    /// m/s
    pub speed: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DetectOutAlarm {
    pub device_id: String,
    pub timestamp: String,
    pub location: Location,
    pub anomaly_reason: String,
    pub alarm: Alarm,
}

#[derive(Debug, Clone, Serialize)]
pub struct DetectOutNormal {
    pub device_id: String,
    pub timestamp: String,
    pub anomaly: bool,
    /// Present only in verbose mode.
    pub distance_m: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum DetectOut {
    Alarm(DetectOutAlarm),
    Normal(DetectOutNormal),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fix_parses_iso8601_utc() {
        let line = r#"{"device_id":"bus-7","timestamp":"2024-03-01T12:00:05Z","lat":41.0,"lon":29.0,"speed":4.2}"#;
        let fix: Fix = serde_json::from_str(line).unwrap();
        assert_eq!(fix.device_id, "bus-7");
        assert_eq!(fix.speed, Some(4.2));
        assert_eq!(fix.epoch_s(), 1_709_294_405.0);
    }

    #[test]
    fn fix_speed_is_optional() {
        let line = r#"{"device_id":"d","timestamp":"2024-03-01T12:00:05Z","lat":1.0,"lon":2.0}"#;
        let fix: Fix = serde_json::from_str(line).unwrap();
        assert_eq!(fix.speed, None);
    }

    #[test]
    fn alarm_labels_serialize_screaming_snake() {
        let alarm = Alarm::geofence_exit(10);
        let json = serde_json::to_string(&alarm).unwrap();
        assert!(json.contains(r#""label":"GEOFENCE_EXIT""#));
        assert!(json.contains(r#""source":"GEOFENCE""#));
        assert!(json.contains(r#""code":1000"#));
    }

    #[test]
    fn finite_or_zero_collapses_non_finite() {
        assert_eq!(finite_or_zero(f64::NAN), 0.0);
        assert_eq!(finite_or_zero(f64::INFINITY), 0.0);
        assert_eq!(finite_or_zero(f64::NEG_INFINITY), 0.0);
        assert_eq!(finite_or_zero(3.5), 3.5);
    }
}
