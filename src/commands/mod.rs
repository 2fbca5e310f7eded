//! CLI command implementations for adb-perf-monitor.
//!
//! This module provides implementations for all CLI subcommands:
//! - `monitor`: Terminal monitoring session
//! - `serve`: Monitoring session with the HTTP read view
//! - `sample`: Direct collector runs
//! - `foreground`: Foreground app lookup
//! - `config`: Configuration file generation

pub mod config;
pub mod foreground;
pub mod monitor;
pub mod sample;
pub mod serve;

// Re-export command functions
pub use config::command_config;
pub use foreground::command_foreground;
pub use monitor::command_monitor;
pub use sample::command_sample;
pub use serve::command_serve;

use adb_perf_monitor::channel::CommandChannel;
use adb_perf_monitor::collectors::ForegroundAppCollector;
use std::sync::Arc;
use tracing::info;

use crate::config::Config;

/// Picks the package to monitor: the given one, else the foreground app.
///
/// Returns `None` when no package was given and no foreground app could be
/// detected.
pub async fn resolve_target(
    channel: Arc<dyn CommandChannel>,
    config: &Config,
    package: Option<String>,
    pid: Option<u32>,
) -> Option<(String, Option<u32>)> {
    if let Some(package) = package {
        return Some((package, pid));
    }

    let settings = config.monitor_settings();
    let collector = ForegroundAppCollector::with_timeouts(
        channel,
        settings.foreground_query_timeout,
        settings.foreground_info_timeout,
    );
    let app = collector.sample().await.value()?;
    info!(
        "No package given, using foreground app {} ({})",
        app.package_name, app.app_name
    );
    Some((app.package_name, pid.or(app.pid)))
}
