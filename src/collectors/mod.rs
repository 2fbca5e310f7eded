//! Device metric collectors.
//!
//! Each collector owns its inter-round state and talks to the device only
//! through the injected [`CommandChannel`]. The [`Collectors`] bundle groups
//! the six of them for the monitor controller and the `sample` command.

pub mod battery;
pub mod cpu;
pub mod foreground;
pub mod frame;
pub mod memory;
pub mod network;

use clap::ValueEnum;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::channel::CommandChannel;

pub use battery::{BatteryCollector, BatteryHealth, BatteryReading};
pub use cpu::{CpuCollector, CpuUsage};
pub use foreground::{ForegroundApp, ForegroundAppCollector, ForegroundSource};
pub use frame::{FrameCollector, FrameStats};
pub use memory::{MemoryCollector, MemoryDetail, MemoryReport, MemoryUsage};
pub use network::{NetworkCollector, NetworkRate};

/// Identifies one collector in logs, statistics and on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CollectorKind {
    Cpu,
    Memory,
    Battery,
    Network,
    Frame,
    Foreground,
}

impl CollectorKind {
    pub const ALL: [CollectorKind; 6] = [
        CollectorKind::Cpu,
        CollectorKind::Memory,
        CollectorKind::Battery,
        CollectorKind::Network,
        CollectorKind::Frame,
        CollectorKind::Foreground,
    ];

    pub fn name(self) -> &'static str {
        match self {
            CollectorKind::Cpu => "cpu",
            CollectorKind::Memory => "memory",
            CollectorKind::Battery => "battery",
            CollectorKind::Network => "network",
            CollectorKind::Frame => "frame",
            CollectorKind::Foreground => "foreground",
        }
    }
}

impl std::fmt::Display for CollectorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// The six collectors sharing one command channel.
pub struct Collectors {
    pub cpu: CpuCollector,
    pub memory: MemoryCollector,
    pub battery: BatteryCollector,
    pub network: NetworkCollector,
    pub frame: FrameCollector,
    pub foreground: ForegroundAppCollector,
}

impl Collectors {
    pub fn new(
        channel: Arc<dyn CommandChannel>,
        foreground_query_timeout: Duration,
        foreground_info_timeout: Duration,
    ) -> Self {
        Self {
            cpu: CpuCollector::new(channel.clone()),
            memory: MemoryCollector::new(channel.clone()),
            battery: BatteryCollector::new(channel.clone()),
            network: NetworkCollector::new(channel.clone()),
            frame: FrameCollector::new(channel.clone()),
            foreground: ForegroundAppCollector::with_timeouts(
                channel,
                foreground_query_timeout,
                foreground_info_timeout,
            ),
        }
    }

    pub fn with_default_timeouts(channel: Arc<dyn CommandChannel>) -> Self {
        Self::new(
            channel,
            foreground::DEFAULT_QUERY_TIMEOUT,
            foreground::DEFAULT_INFO_TIMEOUT,
        )
    }

    /// Returns every collector to its first-round state.
    pub fn reset(&self) {
        self.cpu.reset();
        self.battery.reset();
        self.network.reset();
        self.frame.reset();
        self.foreground.reset();
    }
}

/// Inter-round state of one collector, tagged with a reset epoch.
///
/// `reset` bumps the epoch under the lock. A sample that read the epoch before
/// a reset finds it outdated and leaves the state alone, so a collector call
/// that outlives a restart cannot seed the next session.
pub(crate) struct RoundState<T> {
    inner: Mutex<(u64, T)>,
}

impl<T: Default> RoundState<T> {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new((0, T::default())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, (u64, T)> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub(crate) fn epoch(&self) -> u64 {
        self.lock().0
    }

    pub(crate) fn reset(&self) {
        let mut guard = self.lock();
        guard.0 = guard.0.wrapping_add(1);
        guard.1 = T::default();
    }

    /// Runs `f` on the state unless it was reset after `epoch` was read.
    pub(crate) fn with_current<R>(&self, epoch: u64, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let mut guard = self.lock();
        if guard.0 != epoch {
            return None;
        }
        Some(f(&mut guard.1))
    }
}
