use axum::{
    extract::State,
    routing::{get, post},
    Json,
};
use serde_json::json;
use std::sync::Arc;

use rt_detector::config::{self, Config};
use rt_detector::detector::{Detection, Detector};
use rt_detector::scoring::ModelManifest;
use rt_detector::types::{DetectIn, DetectOut, DetectOutAlarm, DetectOutNormal, Location};

// ---------- Server state ----------

#[derive(Clone)]
struct AppState {
    detector: Arc<Detector>,
    cfg: Arc<Config>,
    verbose: bool,
}

// ---------- Handlers ----------

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let gf = state.cfg.geofence;
    Json(json!({
        "ok": true,
        "version": env!("CARGO_PKG_VERSION"),
        "mode": if state.verbose { "verbose" } else { "minimal" },
        "geofence": {
            "lat0": gf.lat0,
            "lon0": gf.lon0,
            "radius_m": gf.radius_m,
            "debounce_sec": gf.debounce_sec,
        },
    }))
}

async fn detect(State(state): State<AppState>, Json(inp): Json<DetectIn>) -> Json<DetectOut> {
    let ts = inp.timestamp.timestamp_millis() as f64 / 1000.0;
    let detection = state
        .detector
        .process(&inp.device_id, ts, inp.lat, inp.lon, inp.speed);
    let ts_str = inp.timestamp.format("%Y-%m-%dT%H:%M:%SZ").to_string();

    let out = match detection {
        Detection::Alarm {
            reason,
            alarm,
            distance_m: _,
        } => DetectOut::Alarm(DetectOutAlarm {
            device_id: inp.device_id,
            timestamp: ts_str,
            location: Location {
                lat: inp.lat,
                lon: inp.lon,
            },
            anomaly_reason: reason.as_str().to_string(),
            alarm,
        }),
        Detection::Normal { distance_m } => DetectOut::Normal(DetectOutNormal {
            device_id: inp.device_id,
            timestamp: ts_str,
            anomaly: false,
            distance_m: state.verbose.then_some(distance_m),
        }),
    };
    Json(out)
}

// ---------- Startup ----------

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cfg_path = config::resolve_config_path();
    let cfg = Config::load(&cfg_path)?;
    tracing::info!(path = %cfg_path.display(), "config loaded");

    // API_MODE takes precedence over config.api.alarm_verbose.
    let verbose = match std::env::var("API_MODE").ok().as_deref() {
        Some("verbose") => true,
        Some("minimal") => false,
        _ => cfg.api.alarm_verbose,
    };

    // Fail fast on training/serving feature skew before taking traffic.
    if let Some(meta_path) = &cfg.model.meta_path {
        let manifest = ModelManifest::load(meta_path)?;
        tracing::info!(
            features = ?manifest.features,
            count = manifest.count,
            "model manifest validated"
        );
    }

    // The scorer artifact runs in an external runtime; without one wired in,
    // detection is geofence-only.
    let detector = Arc::new(Detector::new(&cfg, None));
    tracing::warn!("no anomaly scorer configured; model alarms disabled");

    let gf = cfg.geofence;
    tracing::info!(
        lat0 = gf.lat0,
        lon0 = gf.lon0,
        radius_m = gf.radius_m,
        debounce_sec = gf.debounce_sec,
        "geofence armed"
    );

    let state = AppState {
        detector,
        cfg: Arc::new(cfg),
        verbose,
    };

    let app = axum::Router::new()
        .route("/health", get(health))
        .route("/detect", post(detect))
        .with_state(state);

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(8080);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
