//! Serve command implementation.
//!
//! Runs a monitoring session and exposes the store over HTTP until SIGINT or
//! SIGTERM.

use adb_perf_monitor::monitor::Monitor;
use anyhow::Context;
use axum::{routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::commands::resolve_target;
use crate::config::{Config, DEFAULT_BIND_ADDR, DEFAULT_PORT};
use crate::handlers::{
    health_handler, latest_handler, metrics_handler, root_handler, series_handler,
};
use crate::state::{AppState, SharedState};

/// Configures the HTTP routes of the read view.
pub fn build_router(state: SharedState) -> Router {
    let mut app = Router::new()
        .route("/", get(root_handler))
        .route("/metrics", get(metrics_handler))
        .route("/latest", get(latest_handler))
        .route("/series", get(series_handler));

    if state.config.enable_health.unwrap_or(true) {
        app = app.route("/health", get(health_handler));
    } else {
        debug!("/health endpoint disabled");
    }

    app.with_state(state)
}

/// Starts monitoring (when a target can be found) and serves the read view.
pub async fn command_serve(
    package: Option<String>,
    pid: Option<u32>,
    config: Config,
) -> anyhow::Result<()> {
    let channel = config.command_channel();
    let monitor = Arc::new(Monitor::new(channel.clone(), config.monitor_settings()));

    match resolve_target(channel, &config, package, pid).await {
        Some((package, pid)) => {
            if let Err(e) = monitor.try_start(&package, pid).await {
                warn!("Could not start monitoring {}: {} - serving idle", package, e);
            }
        }
        None => warn!("No package given and no foreground app detected - serving idle"),
    }

    let bind_ip_str = config
        .bind
        .clone()
        .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
    let port = config.port.unwrap_or(DEFAULT_PORT);
    let addr: SocketAddr = format!("{}:{}", bind_ip_str, port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", bind_ip_str, port))?;

    let state = Arc::new(AppState::new(monitor.clone(), config)?);
    let app = build_router(state);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("adb-perf-monitor listening on http://{}", addr);

    let server = axum::serve(listener, app);

    tokio::select! {
        result = server => {
            if let Err(e) = result {
                error!("Server error: {}", e);
                monitor.stop();
                return Err(e.into());
            }
        }
        _ = crate::shutdown_signal() => {
            info!("Shutdown signal received, exiting...");
        }
    }

    monitor.stop();
    info!("adb-perf-monitor stopped gracefully");
    Ok(())
}
