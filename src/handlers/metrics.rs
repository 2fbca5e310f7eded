//! Metrics endpoint handler for Prometheus scraping.
//!
//! This module provides the `/metrics` endpoint handler that copies the newest
//! store values into the registered gauges and returns them in Prometheus text
//! format.

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use prometheus::{Encoder, TextEncoder};
use std::time::Instant;
use tracing::{debug, error, instrument};

use crate::state::SharedState;

/// Buffer capacity for metrics encoding.
const BUFFER_CAP: usize = 16 * 1024;

/// Error type for metrics endpoint failures.
#[derive(Debug)]
pub enum MetricsError {
    EncodingFailed,
}

impl IntoResponse for MetricsError {
    fn into_response(self) -> axum::response::Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to encode metrics",
        )
            .into_response()
    }
}

/// Handler for the /metrics endpoint.
#[instrument(skip(state))]
pub async fn metrics_handler(State(state): State<SharedState>) -> Result<String, MetricsError> {
    let start = Instant::now();
    debug!("Processing /metrics request");

    let session = state.monitor.session();
    let stats = state.monitor.stats();
    {
        let store_lock = state.monitor.store();
        let store = store_lock.read().await;
        state.metrics.update(&store, &stats, &session);
    }

    state.scrape_duration.set(start.elapsed().as_secs_f64());

    let families = state.registry.gather();
    let mut buffer = Vec::with_capacity(BUFFER_CAP);
    let encoder = TextEncoder::new();

    if encoder.encode(&families, &mut buffer).is_err() {
        error!("Failed to encode Prometheus metrics");
        return Err(MetricsError::EncodingFailed);
    }

    debug!(
        "Metrics request completed: {} bytes, {:.3}ms",
        buffer.len(),
        start.elapsed().as_secs_f64() * 1000.0
    );

    String::from_utf8(buffer).map_err(|_| MetricsError::EncodingFailed)
}
