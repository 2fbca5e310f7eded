//! HTTP endpoint handlers for the monitor.
//!
//! This module provides handlers for all HTTP endpoints:
//! - `/`: Landing page
//! - `/metrics`: Prometheus metrics endpoint
//! - `/health`: Round statistics
//! - `/latest`: Newest value of every series (JSON)
//! - `/series`: Full time-aligned history (JSON)

pub mod data;
pub mod health;
pub mod metrics;
pub mod root;

// Re-export handlers
pub use data::{latest_handler, series_handler};
pub use health::health_handler;
pub use metrics::metrics_handler;
pub use root::root_handler;

#[cfg(test)]
pub(crate) fn test_state(
    channel: std::sync::Arc<dyn adb_perf_monitor::channel::CommandChannel>,
) -> crate::state::SharedState {
    use adb_perf_monitor::monitor::{Monitor, MonitorSettings};
    use std::sync::Arc;

    let monitor = Arc::new(Monitor::new(channel, MonitorSettings::default()));
    Arc::new(
        crate::state::AppState::new(monitor, crate::config::Config::default())
            .expect("register metrics"),
    )
}
