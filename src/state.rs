//! Application state management for the HTTP read view.
//!
//! This module defines the shared application state that is passed
//! to HTTP handlers. Handlers only read from the monitor.

use adb_perf_monitor::monitor::Monitor;
use prometheus::{Gauge, Registry};
use std::sync::Arc;
use std::time::Instant;

use crate::config::Config;
use crate::metrics::MonitorMetrics;

/// Type alias for shared application state.
pub type SharedState = Arc<AppState>;

/// Global application state shared across requests.
pub struct AppState {
    pub registry: Registry,
    pub metrics: MonitorMetrics,
    pub scrape_duration: Gauge,
    pub monitor: Arc<Monitor>,
    pub config: Arc<Config>,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    pub fn new(monitor: Arc<Monitor>, config: Config) -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let metrics = MonitorMetrics::new(&registry)?;
        let scrape_duration = Gauge::new(
            "adbperf_scrape_duration_seconds",
            "Time spent serving /metrics request",
        )?;
        registry.register(Box::new(scrape_duration.clone()))?;

        Ok(Self {
            registry,
            metrics,
            scrape_duration,
            monitor,
            config: Arc::new(config),
            start_time: Instant::now(),
        })
    }
}
