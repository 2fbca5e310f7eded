//! Error types for the monitor controller.

use crate::monitor::MIN_INTERVAL_MS;

#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("No package name given")]
    EmptyPackage,

    #[error("Could not resolve a process id for {0}")]
    PidNotFound(String),

    #[error("Sampling interval {0}ms is below the {min}ms floor", min = MIN_INTERVAL_MS)]
    IntervalTooShort(u64),
}
