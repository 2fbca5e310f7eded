//! Health check endpoint handler.
//!
//! This module provides the `/health` endpoint handler that returns
//! the monitor session state and round statistics as plain text.

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use tracing::{debug, instrument};

use crate::state::SharedState;

// Time conversion constants
const SECONDS_PER_HOUR: f64 = 3600.0;
const MINUTES_PER_HOUR: f64 = 60.0;
const HOURS_PER_DAY: f64 = 24.0;

/// Footer text for human-readable HTTP endpoints.
pub const FOOTER_TEXT: &str = concat!("adb-perf-monitor ", env!("CARGO_PKG_VERSION"));

/// Handler for the /health endpoint.
///
/// Answers 503 while no session is running so a supervisor can tell an idle
/// monitor from a sampling one.
#[instrument(skip(state))]
pub async fn health_handler(State(state): State<SharedState>) -> impl IntoResponse {
    debug!("Processing /health request");

    let session = state.monitor.session();
    let (status, message) = if session.is_running {
        (StatusCode::OK, "OK - Monitoring")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "Idle - no session running")
    };

    let stats = state.monitor.stats();
    let uptime_hours = stats.uptime_seconds() as f64 / SECONDS_PER_HOUR;
    let uptime_str = if uptime_hours < 1.0 {
        format!("{:.1} minutes", uptime_hours * MINUTES_PER_HOUR)
    } else if uptime_hours < HOURS_PER_DAY {
        format!("{:.1} hours", uptime_hours)
    } else {
        format!("{:.1} days", uptime_hours / HOURS_PER_DAY)
    };

    let target = match (&session.target_package, session.target_pid) {
        (Some(package), Some(pid)) => format!("{} (pid {})", package, pid),
        (Some(package), None) => package.clone(),
        _ => "-".to_string(),
    };
    let data_points = state.monitor.store().read().await.len();

    let table = stats.render_table();

    debug!("Health check: {} - {}", status, message);
    (
        status,
        [("Content-Type", "text/plain; charset=utf-8")],
        format!(
            "{message}\n\nTarget: {target}\nInterval: {}ms\nData points: {data_points}\nUptime: {uptime_str}\n\n{table}\n{FOOTER_TEXT}",
            session.interval_ms
        ),
    )
}
