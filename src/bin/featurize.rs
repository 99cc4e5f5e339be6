//! Offline feature extraction: JSONL fixes in, JSONL feature rows out.
//!
//! Runs the batch pipeline the training job consumes, so a recorded track
//! can be featurized without standing up the service:
//!
//!   featurize data/processed/tracks.jsonl [out.jsonl]
//!
//! Output rows align one-to-one with input lines. A malformed line is a hard
//! error before any output is written.

use std::fs;
use std::io::Write;

use anyhow::{bail, Context, Result};

use rt_detector::batch::build_features;
use rt_detector::config::{self, Config};
use rt_detector::types::Fix;

fn main() -> Result<()> {
    // Logs to stderr; stdout carries the feature rows.
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let mut args = std::env::args().skip(1);
    let Some(input) = args.next() else {
        bail!("usage: featurize <fixes.jsonl> [out.jsonl]");
    };
    let output = args.next();

    let cfg_path = config::resolve_config_path();
    let cfg = Config::load(&cfg_path)?;

    let raw = fs::read_to_string(&input)
        .with_context(|| format!("failed to read fixes at {input}"))?;

    // Parse everything up front: a bad line aborts with no partial output.
    let mut fixes: Vec<Fix> = Vec::new();
    for (lineno, line) in raw.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let fix: Fix = serde_json::from_str(line)
            .with_context(|| format!("{input}:{}: invalid fix record", lineno + 1))?;
        fixes.push(fix);
    }
    tracing::info!(count = fixes.len(), "fixes loaded");

    let rows = build_features(
        &fixes,
        cfg.geofence.lat0,
        cfg.geofence.lon0,
        cfg.features.window_sec,
    );

    let mut buf = String::with_capacity(rows.len() * 128);
    for row in &rows {
        buf.push_str(&serde_json::to_string(row)?);
        buf.push('\n');
    }

    match output {
        Some(path) => {
            fs::write(&path, buf).with_context(|| format!("failed to write {path}"))?;
            tracing::info!(rows = rows.len(), path = %path, "feature table written");
        }
        None => {
            std::io::stdout().write_all(buf.as_bytes())?;
        }
    }
    Ok(())
}
