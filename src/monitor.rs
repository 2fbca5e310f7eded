//! Monitor controller: session lifecycle and the sampling loop.
//!
//! A session is `Idle -> Running -> Idle`. While running, a ticker fires one
//! round per interval; each round runs all six collectors concurrently, waits
//! for every one of them, and writes the merged result into the [`Store`].
//!
//! Rounds run inline in the ticker task, so they never overlap. Ticks missed
//! while a slow round was still running are skipped and counted as overruns.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument, warn};

use crate::channel::CommandChannel;
use crate::collectors::{CollectorKind, Collectors};
use crate::error::MonitorError;
use crate::round_stats::RoundStats;
use crate::sample::Sample;
use crate::store::{RoundRecord, Store, DEFAULT_MAX_DATA_POINTS};

pub const MIN_INTERVAL_MS: u64 = 500;
pub const DEFAULT_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_COLLECTOR_TIMEOUT: Duration = Duration::from_millis(5000);

/// Tunables for a [`Monitor`].
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub interval_ms: u64,
    pub collector_timeout: Duration,
    pub max_data_points: usize,
    pub foreground_query_timeout: Duration,
    pub foreground_info_timeout: Duration,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_INTERVAL_MS,
            collector_timeout: DEFAULT_COLLECTOR_TIMEOUT,
            max_data_points: DEFAULT_MAX_DATA_POINTS,
            foreground_query_timeout: crate::collectors::foreground::DEFAULT_QUERY_TIMEOUT,
            foreground_info_timeout: crate::collectors::foreground::DEFAULT_INFO_TIMEOUT,
        }
    }
}

/// The monitored target and schedule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MonitorSession {
    pub target_pid: Option<u32>,
    pub target_package: Option<String>,
    pub interval_ms: u64,
    pub is_running: bool,
}

/// What a round samples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundTarget {
    pub pid: u32,
    pub package: String,
}

pub struct Monitor {
    channel: Arc<dyn CommandChannel>,
    collectors: Arc<Collectors>,
    store: Arc<RwLock<Store>>,
    stats: Arc<RoundStats>,
    collector_timeout: Duration,
    session: Mutex<MonitorSession>,
    /// Bumped on every start and stop; rounds of an older generation never
    /// write into the store.
    generation: Arc<AtomicU64>,
    cancel: Mutex<Option<watch::Sender<bool>>>,
}

impl Monitor {
    pub fn new(channel: Arc<dyn CommandChannel>, settings: MonitorSettings) -> Self {
        let collectors = Collectors::new(
            channel.clone(),
            settings.foreground_query_timeout,
            settings.foreground_info_timeout,
        );
        Self::with_collectors(channel, collectors, settings)
    }

    pub fn with_collectors(
        channel: Arc<dyn CommandChannel>,
        collectors: Collectors,
        settings: MonitorSettings,
    ) -> Self {
        let interval_ms = if settings.interval_ms < MIN_INTERVAL_MS {
            warn!(
                "Interval {}ms below floor, using {}ms",
                settings.interval_ms, MIN_INTERVAL_MS
            );
            MIN_INTERVAL_MS
        } else {
            settings.interval_ms
        };

        Self {
            channel,
            collectors: Arc::new(collectors),
            store: Arc::new(RwLock::new(Store::new(settings.max_data_points))),
            stats: Arc::new(RoundStats::new()),
            collector_timeout: settings.collector_timeout,
            session: Mutex::new(MonitorSession {
                interval_ms,
                ..MonitorSession::default()
            }),
            generation: Arc::new(AtomicU64::new(0)),
            cancel: Mutex::new(None),
        }
    }

    pub fn store(&self) -> Arc<RwLock<Store>> {
        self.store.clone()
    }

    pub fn stats(&self) -> Arc<RoundStats> {
        self.stats.clone()
    }

    pub fn collectors(&self) -> Arc<Collectors> {
        self.collectors.clone()
    }

    pub fn session(&self) -> MonitorSession {
        lock(&self.session).clone()
    }

    pub fn is_running(&self) -> bool {
        lock(&self.session).is_running
    }

    pub fn round_count(&self) -> u64 {
        self.stats.rounds()
    }

    /// Starts (or restarts) monitoring `package`; `false` if it cannot start.
    pub async fn start(&self, package: &str, pid: Option<u32>) -> bool {
        match self.try_start(package, pid).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Monitor start failed: {}", e);
                false
            }
        }
    }

    /// Starts monitoring, reporting why a start was refused.
    ///
    /// A running session for any target is stopped first, so a start that
    /// fails leaves the monitor idle. Collector state and the store are reset
    /// even when the target is unchanged.
    pub async fn try_start(&self, package: &str, pid: Option<u32>) -> Result<(), MonitorError> {
        let package = package.trim();
        if package.is_empty() {
            return Err(MonitorError::EmptyPackage);
        }

        self.stop();

        let pid = match pid {
            Some(pid) => pid,
            None => {
                let channel = self.channel.clone();
                let pkg = package.to_string();
                tokio::task::spawn_blocking(move || resolve_pid(channel.as_ref(), &pkg))
                    .await
                    .ok()
                    .flatten()
                    .ok_or_else(|| MonitorError::PidNotFound(package.to_string()))?
            }
        };

        let collectors = self.collectors.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || collectors.reset()).await {
            warn!("Collector reset failed: {}", e);
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.store.write().await.clear();

        let interval_ms = {
            let mut session = lock(&self.session);
            session.target_pid = Some(pid);
            session.target_package = Some(package.to_string());
            session.is_running = true;
            session.interval_ms
        };

        let (cancel, cancelled) = watch::channel(false);
        tokio::spawn(run_loop(
            LoopContext {
                collectors: self.collectors.clone(),
                store: self.store.clone(),
                stats: self.stats.clone(),
                generation: self.generation.clone(),
                collector_timeout: self.collector_timeout,
            },
            generation,
            RoundTarget {
                pid,
                package: package.to_string(),
            },
            Duration::from_millis(interval_ms),
            cancelled,
        ));
        *lock(&self.cancel) = Some(cancel);

        info!(
            "Monitoring {} (pid {}) every {}ms",
            package, pid, interval_ms
        );
        Ok(())
    }

    /// Stops scheduling rounds and clears the target. A round already in
    /// flight finishes but its result is discarded.
    pub fn stop(&self) {
        if let Some(cancel) = lock(&self.cancel).take() {
            self.generation.fetch_add(1, Ordering::SeqCst);
            let _ = cancel.send(true);
            debug!("Ticker cancelled");
        }

        let mut session = lock(&self.session);
        if session.is_running {
            info!(
                "Monitoring stopped for {}",
                session.target_package.as_deref().unwrap_or("-")
            );
        }
        session.is_running = false;
        session.target_pid = None;
        session.target_package = None;
    }

    /// Changes the sampling period; a running session restarts with it.
    pub async fn set_interval(&self, interval_ms: u64) -> Result<(), MonitorError> {
        if interval_ms < MIN_INTERVAL_MS {
            return Err(MonitorError::IntervalTooShort(interval_ms));
        }

        let restart = {
            let mut session = lock(&self.session);
            session.interval_ms = interval_ms;
            if session.is_running {
                session.target_package.clone().zip(session.target_pid)
            } else {
                None
            }
        };

        if let Some((package, pid)) = restart {
            self.try_start(&package, Some(pid)).await?;
        }
        Ok(())
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        self.stop();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

struct LoopContext {
    collectors: Arc<Collectors>,
    store: Arc<RwLock<Store>>,
    stats: Arc<RoundStats>,
    generation: Arc<AtomicU64>,
    collector_timeout: Duration,
}

async fn run_loop(
    ctx: LoopContext,
    generation: u64,
    target: RoundTarget,
    period: Duration,
    mut cancelled: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = cancelled.changed() => break,
        }
        if *cancelled.borrow() || ctx.generation.load(Ordering::SeqCst) != generation {
            break;
        }

        let started = Instant::now();
        let timestamp = Store::now_timestamp();
        let record =
            collect_round(&ctx.collectors, &target, ctx.collector_timeout, &ctx.stats).await;

        {
            let mut store = ctx.store.write().await;
            if ctx.generation.load(Ordering::SeqCst) != generation {
                debug!("Discarding round of a finished session");
                ctx.stats.record_stale_round();
                break;
            }
            store.append_round(timestamp.clone(), &record);
            let repaired = store.ensure_aligned();
            ctx.stats.record_repairs(repaired);
        }

        let elapsed = started.elapsed();
        ctx.stats
            .record_round(elapsed.as_secs_f64() * 1000.0, &timestamp);
        if elapsed > period {
            warn!(
                "Round took {}ms, longer than the {}ms interval",
                elapsed.as_millis(),
                period.as_millis()
            );
            ctx.stats.record_overrun();
        }
    }

    debug!("Sampling loop for {} exited", target.package);
}

/// Waits for a collector task, converting timeouts and panics into `None`.
async fn guarded<T>(
    kind: CollectorKind,
    limit: Duration,
    stats: &RoundStats,
    task: Option<JoinHandle<T>>,
) -> Option<T> {
    let task = task?;
    match tokio::time::timeout(limit, task).await {
        Ok(Ok(value)) => Some(value),
        Ok(Err(e)) => {
            warn!("Collector {} failed: {}", kind, e);
            stats.record_failure(kind);
            None
        }
        Err(_) => {
            warn!("Collector {} timed out after {}ms", kind, limit.as_millis());
            stats.record_failure(kind);
            None
        }
    }
}

/// Runs all six collectors concurrently and merges their outcomes.
///
/// Never fails: a collector that panics or exceeds `limit` contributes
/// `NoData`, and the round waits for every collector either way.
pub async fn collect_round(
    collectors: &Arc<Collectors>,
    target: &RoundTarget,
    limit: Duration,
    stats: &RoundStats,
) -> RoundRecord {
    collect_selected(collectors, target, limit, stats, &CollectorKind::ALL).await
}

/// Like [`collect_round`], restricted to `kinds`; the rest are `NoData`.
#[instrument(skip(collectors, stats))]
pub async fn collect_selected(
    collectors: &Arc<Collectors>,
    target: &RoundTarget,
    limit: Duration,
    stats: &RoundStats,
    kinds: &[CollectorKind],
) -> RoundRecord {
    let wants = |kind: CollectorKind| kinds.contains(&kind);
    let pid = target.pid;

    let cpu = wants(CollectorKind::Cpu).then(|| {
        let c = collectors.clone();
        tokio::task::spawn_blocking(move || c.cpu.sample(pid))
    });
    let memory = wants(CollectorKind::Memory).then(|| {
        let c = collectors.clone();
        tokio::task::spawn_blocking(move || c.memory.sample_report(pid))
    });
    let battery = wants(CollectorKind::Battery).then(|| {
        let c = collectors.clone();
        tokio::task::spawn_blocking(move || c.battery.sample())
    });
    let network = wants(CollectorKind::Network).then(|| {
        let c = collectors.clone();
        let package = target.package.clone();
        tokio::task::spawn_blocking(move || c.network.sample(Some(&package)))
    });
    let frame = wants(CollectorKind::Frame).then(|| {
        let c = collectors.clone();
        let package = target.package.clone();
        tokio::task::spawn_blocking(move || c.frame.sample(Some(&package)))
    });
    let foreground = wants(CollectorKind::Foreground).then(|| {
        let c = collectors.clone();
        tokio::spawn(async move { c.foreground.sample().await })
    });

    let (cpu, memory, battery, network, frame, foreground) = tokio::join!(
        guarded(CollectorKind::Cpu, limit, stats, cpu),
        guarded(CollectorKind::Memory, limit, stats, memory),
        guarded(CollectorKind::Battery, limit, stats, battery),
        guarded(CollectorKind::Network, limit, stats, network),
        guarded(CollectorKind::Frame, limit, stats, frame),
        guarded(CollectorKind::Foreground, limit, stats, foreground),
    );

    let (memory, memory_detail) = match memory {
        Some(report) => (report.total, report.detail),
        None => (Sample::NoData, Sample::NoData),
    };

    RoundRecord {
        cpu: cpu.unwrap_or(Sample::NoData),
        memory,
        memory_detail,
        battery: battery.map(Sample::Value).unwrap_or(Sample::NoData),
        network: network.map(Sample::Value).unwrap_or(Sample::NoData),
        frame: frame.map(Sample::Value).unwrap_or(Sample::NoData),
        foreground: foreground.unwrap_or(Sample::NoData),
    }
}

/// Finds the pid of `package` with `ps -A`.
pub fn resolve_pid(channel: &dyn CommandChannel, package: &str) -> Option<u32> {
    let output = channel.execute(&format!("ps -A | grep {}", package));
    parse_pid_for_package(&output, package)
}

/// Picks the line whose process name is exactly `package`, falling back to the
/// first line that mentions it, and returns its pid column.
pub fn parse_pid_for_package(output: &str, package: &str) -> Option<u32> {
    let lines: Vec<Vec<&str>> = output
        .lines()
        .filter(|l| l.contains(package))
        .map(|l| l.split_whitespace().collect())
        .filter(|fields: &Vec<&str>| fields.len() >= 2)
        .collect();

    let line = lines
        .iter()
        .find(|fields| fields.last() == Some(&package))
        .or_else(|| lines.first())?;
    line[1].parse().ok()
}
