//! Prometheus metrics definitions for adb-perf-monitor.
//!
//! Gauges mirror the newest value of every store series and are refreshed on
//! each scrape. A metric whose newest round had no data is exported as NaN.

use ahash::AHashMap as HashMap;
use adb_perf_monitor::collectors::CollectorKind;
use adb_perf_monitor::monitor::MonitorSession;
use adb_perf_monitor::round_stats::RoundStats;
use adb_perf_monitor::store::{Metric, Store};
use prometheus::{Counter, CounterVec, Gauge, GaugeVec, Opts, Registry};
use std::sync::atomic::Ordering;

fn describe(metric: Metric) -> (&'static str, &'static str) {
    match metric {
        Metric::CpuApp => (
            "adbperf_cpu_app_percent",
            "CPU usage of the monitored app in percent of total device CPU time",
        ),
        Metric::CpuSystem => (
            "adbperf_cpu_system_percent",
            "Non-idle device CPU time in percent",
        ),
        Metric::MemoryTotal => (
            "adbperf_memory_total_pss_mb",
            "Total PSS of the monitored app in MB",
        ),
        Metric::BatteryLevel => ("adbperf_battery_level_percent", "Smoothed battery level"),
        Metric::BatteryTemperature => (
            "adbperf_battery_temperature_celsius",
            "Smoothed battery temperature",
        ),
        Metric::NetworkRx => (
            "adbperf_network_download_kbs",
            "Download rate of the monitored app in KB/s",
        ),
        Metric::NetworkTx => (
            "adbperf_network_upload_kbs",
            "Upload rate of the monitored app in KB/s",
        ),
        Metric::Fps => ("adbperf_fps", "Frames composited per second"),
        Metric::JankCount => ("adbperf_jank_frames", "Janky frames in the last round"),
    }
}

#[derive(Clone)]
pub struct MonitorMetrics {
    // ========== Latest Values ==========
    pub latest: HashMap<Metric, Gauge>,
    pub memory_detail_mb: GaugeVec, // labels: region
    pub foreground_app_info: GaugeVec, // labels: package, activity, source

    // ========== Session ==========
    pub running: Gauge,
    pub interval_ms: Gauge,
    pub data_points: Gauge,

    // ========== Rounds ==========
    pub rounds_total: Counter,
    pub round_overruns_total: Counter,
    pub alignment_repairs_total: Counter,
    pub stale_rounds_total: Counter,
    pub collector_failures_total: CounterVec, // labels: collector
    pub round_duration_seconds: Gauge,
}

impl MonitorMetrics {
    /// Creates and registers all Prometheus metrics with the registry.
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let mut latest = HashMap::new();
        for metric in Metric::ALL {
            let (name, help) = describe(metric);
            let gauge = Gauge::new(name, help)?;
            registry.register(Box::new(gauge.clone()))?;
            latest.insert(metric, gauge);
        }

        let memory_detail_mb = GaugeVec::new(
            Opts::new(
                "adbperf_memory_detail_mb",
                "Memory breakdown of the monitored app in MB",
            ),
            &["region"],
        )?;
        let foreground_app_info = GaugeVec::new(
            Opts::new(
                "adbperf_foreground_app_info",
                "Foreground app seen in the latest round (always 1)",
            ),
            &["package", "activity", "source"],
        )?;

        let running = Gauge::new("adbperf_monitor_running", "Whether a session is running")?;
        let interval_ms = Gauge::new("adbperf_monitor_interval_ms", "Sampling interval")?;
        let data_points = Gauge::new(
            "adbperf_store_data_points",
            "Rounds currently held by the store",
        )?;

        let rounds_total = Counter::new("adbperf_rounds_total", "Sampling rounds completed")?;
        let round_overruns_total = Counter::new(
            "adbperf_round_overruns_total",
            "Rounds that took longer than the sampling interval",
        )?;
        let alignment_repairs_total = Counter::new(
            "adbperf_alignment_repairs_total",
            "Series padded or trimmed to match the timestamp sequence",
        )?;
        let stale_rounds_total = Counter::new(
            "adbperf_stale_rounds_total",
            "Rounds discarded because their session ended",
        )?;
        let collector_failures_total = CounterVec::new(
            Opts::new(
                "adbperf_collector_failures_total",
                "Collector invocations that panicked or timed out",
            ),
            &["collector"],
        )?;
        let round_duration_seconds = Gauge::new(
            "adbperf_round_duration_seconds",
            "Duration of the latest sampling round",
        )?;

        registry.register(Box::new(memory_detail_mb.clone()))?;
        registry.register(Box::new(foreground_app_info.clone()))?;
        registry.register(Box::new(running.clone()))?;
        registry.register(Box::new(interval_ms.clone()))?;
        registry.register(Box::new(data_points.clone()))?;
        registry.register(Box::new(rounds_total.clone()))?;
        registry.register(Box::new(round_overruns_total.clone()))?;
        registry.register(Box::new(alignment_repairs_total.clone()))?;
        registry.register(Box::new(stale_rounds_total.clone()))?;
        registry.register(Box::new(collector_failures_total.clone()))?;
        registry.register(Box::new(round_duration_seconds.clone()))?;

        Ok(Self {
            latest,
            memory_detail_mb,
            foreground_app_info,
            running,
            interval_ms,
            data_points,
            rounds_total,
            round_overruns_total,
            alignment_repairs_total,
            stale_rounds_total,
            collector_failures_total,
            round_duration_seconds,
        })
    }

    /// Copies the store's newest values and the round statistics into the
    /// registered metrics.
    pub fn update(&self, store: &Store, stats: &RoundStats, session: &MonitorSession) {
        for (metric, gauge) in &self.latest {
            gauge.set(store.latest(*metric).unwrap_or(f64::NAN));
        }

        self.memory_detail_mb.reset();
        if let Some(Some(detail)) = store.memory_detail_series().last() {
            for (region, value) in [
                ("java_heap", detail.java_heap_mb),
                ("native_heap", detail.native_heap_mb),
                ("code", detail.code_mb),
                ("stack", detail.stack_mb),
                ("graphics", detail.graphics_mb),
                ("private_other", detail.private_other_mb),
                ("system", detail.system_mb),
            ] {
                self.memory_detail_mb
                    .with_label_values(&[region])
                    .set(value);
            }
        }

        self.foreground_app_info.reset();
        if let Some(app) = store.latest_foreground() {
            self.foreground_app_info
                .with_label_values(&[
                    app.package_name.as_str(),
                    app.activity_name.as_str(),
                    app.source.name(),
                ])
                .set(1.0);
        }

        self.running.set(if session.is_running { 1.0 } else { 0.0 });
        self.interval_ms.set(session.interval_ms as f64);
        self.data_points.set(store.len() as f64);

        // Counters mirror the monitor's own totals
        set_counter(&self.rounds_total, stats.rounds());
        set_counter(
            &self.round_overruns_total,
            stats.overruns.load(Ordering::Relaxed),
        );
        set_counter(
            &self.alignment_repairs_total,
            stats.alignment_repairs.load(Ordering::Relaxed),
        );
        set_counter(
            &self.stale_rounds_total,
            stats.stale_rounds.load(Ordering::Relaxed),
        );
        for kind in CollectorKind::ALL {
            set_counter(
                &self
                    .collector_failures_total
                    .with_label_values(&[kind.name()]),
                stats.failures(kind),
            );
        }

        self.round_duration_seconds
            .set(stats.round_duration_ms.snapshot().last / 1000.0);
    }
}

fn set_counter(counter: &Counter, value: u64) {
    counter.reset();
    counter.inc_by(value as f64);
}
