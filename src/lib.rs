//! adb-perf-monitor library
//!
//! Device performance telemetry for Android apps, collected over a text
//! command channel (normally `adb shell`). Six independent collectors (CPU,
//! memory, battery, network, frame rate/jank and foreground app) are run
//! concurrently once per sampling round by the [`Monitor`], and their results
//! land in a bounded, time-aligned [`Store`].
//!
//! # Usage
//!
//! ```rust,no_run
//! use adb_perf_monitor::{AdbShell, Metric, Monitor, MonitorSettings};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn run() {
//! let channel = Arc::new(AdbShell::new("adb", None, Duration::from_secs(10)));
//! let monitor = Monitor::new(channel, MonitorSettings::default());
//!
//! if monitor.start("com.example.app", None).await {
//!     tokio::time::sleep(Duration::from_secs(5)).await;
//!     let store = monitor.store();
//!     println!("fps: {:?}", store.read().await.series(Metric::Fps));
//!     monitor.stop();
//! }
//! # }
//! ```
//!
//! Any `Fn(&str) -> String` closure is a [`CommandChannel`], which is how the
//! tests stub the device.

pub mod channel;
pub mod collectors;
pub mod error;
pub mod monitor;
pub mod round_stats;
pub mod sample;
pub mod series;
pub mod store;

// Re-export main types for convenience
pub use channel::{AdbShell, CommandChannel};
pub use collectors::{CollectorKind, Collectors};
pub use error::MonitorError;
pub use monitor::{Monitor, MonitorSession, MonitorSettings};
pub use round_stats::RoundStats;
pub use sample::Sample;
pub use store::{Metric, RoundRecord, Store};
