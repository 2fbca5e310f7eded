//! Sampling round statistics.
//!
//! Tracks how the monitor's rounds behave over time: how many ran, which
//! collectors failed, how long rounds took and how often the store needed an
//! alignment repair. Rendered as a plain-text table for `/health`.

use std::fmt::Write as FmtWrite;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};
use std::time::Instant;

use crate::collectors::CollectorKind;

/// Running statistics for a single metric.
#[derive(Clone, Copy, Default)]
pub struct RunningStat {
    count: u64,
    sum: f64,
    min: f64,
    max: f64,
    last: f64,
}

impl RunningStat {
    pub fn add(&mut self, value: f64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.count += 1;
        self.sum += value;
        self.last = value;
    }

    pub fn avg(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / (self.count as f64)
        }
    }
}

/// Point-in-time copy of a [`Stat`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StatSnapshot {
    pub last: f64,
    pub avg: f64,
    pub max: f64,
    pub min: f64,
    pub count: u64,
}

/// Thread-safe wrapper for running statistics.
#[derive(Default)]
pub struct Stat {
    inner: Mutex<RunningStat>,
}

impl Stat {
    pub fn add_sample(&self, value: f64) {
        if let Ok(mut s) = self.inner.lock() {
            s.add(value);
        }
    }

    pub fn snapshot(&self) -> StatSnapshot {
        match self.inner.lock() {
            Ok(s) => StatSnapshot {
                last: s.last,
                avg: s.avg(),
                max: s.max,
                min: s.min,
                count: s.count,
            },
            Err(_) => StatSnapshot::default(),
        }
    }
}

pub struct RoundStats {
    pub rounds: AtomicU64,
    pub overruns: AtomicU64,
    pub alignment_repairs: AtomicU64,
    /// Rounds discarded because the session changed while they ran.
    pub stale_rounds: AtomicU64,
    collector_failures: [AtomicU64; 6],
    pub round_duration_ms: Stat,
    pub start_time: Instant,
    last_round: RwLock<Option<String>>,
}

impl Default for RoundStats {
    fn default() -> Self {
        Self {
            rounds: AtomicU64::new(0),
            overruns: AtomicU64::new(0),
            alignment_repairs: AtomicU64::new(0),
            stale_rounds: AtomicU64::new(0),
            collector_failures: Default::default(),
            round_duration_ms: Stat::default(),
            start_time: Instant::now(),
            last_round: RwLock::new(None),
        }
    }
}

fn slot(kind: CollectorKind) -> usize {
    match kind {
        CollectorKind::Cpu => 0,
        CollectorKind::Memory => 1,
        CollectorKind::Battery => 2,
        CollectorKind::Network => 3,
        CollectorKind::Frame => 4,
        CollectorKind::Foreground => 5,
    }
}

impl RoundStats {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn record_round(&self, duration_ms: f64, timestamp: &str) {
        self.rounds.fetch_add(1, Ordering::Relaxed);
        self.round_duration_ms.add_sample(duration_ms);
        if let Ok(mut guard) = self.last_round.write() {
            *guard = Some(timestamp.to_string());
        }
    }

    pub fn record_failure(&self, kind: CollectorKind) {
        self.collector_failures[slot(kind)].fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_overrun(&self) {
        self.overruns.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_repairs(&self, count: usize) {
        self.alignment_repairs
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_stale_round(&self) {
        self.stale_rounds.fetch_add(1, Ordering::Relaxed);
    }

    pub fn rounds(&self) -> u64 {
        self.rounds.load(Ordering::Relaxed)
    }

    pub fn failures(&self, kind: CollectorKind) -> u64 {
        self.collector_failures[slot(kind)].load(Ordering::Relaxed)
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn last_round_str(&self) -> String {
        self.last_round
            .read()
            .ok()
            .and_then(|g| g.clone())
            .unwrap_or_else(|| "N/A".to_string())
    }

    pub fn render_table(&self) -> String {
        let duration = self.round_duration_ms.snapshot();
        let left_col = 24usize;
        let col_w = 12usize;

        let mut out = String::new();

        writeln!(out, "HEALTH ENDPOINT - MONITOR ROUND STATS").ok();
        writeln!(out, "=====================================").ok();
        writeln!(out).ok();

        writeln!(
            out,
            "{:left$} | {:^col$} | {:^col$} | {:^col$} | {:^col$}",
            "",
            "current",
            "average",
            "max",
            "min",
            left = left_col,
            col = col_w
        )
        .ok();
        writeln!(
            out,
            "{:left$} | {:^col$} | {:^col$} | {:^col$} | {:^col$}",
            "round_duration (ms)",
            format!("{:.1}", duration.last),
            format!("{:.1}", duration.avg),
            format!("{:.1}", duration.max),
            format!("{:.1}", duration.min),
            left = left_col,
            col = col_w
        )
        .ok();

        writeln!(out).ok();
        writeln!(out, "ROUNDS").ok();
        writeln!(out, "------").ok();
        for (name, value) in [
            ("rounds_total", self.rounds()),
            ("overruns_total", self.overruns.load(Ordering::Relaxed)),
            (
                "alignment_repairs_total",
                self.alignment_repairs.load(Ordering::Relaxed),
            ),
            ("stale_rounds_total", self.stale_rounds.load(Ordering::Relaxed)),
        ] {
            writeln!(out, "{:left$} | {:>col$}", name, value, left = left_col, col = col_w).ok();
        }

        writeln!(out).ok();
        writeln!(out, "COLLECTOR FAILURES").ok();
        writeln!(out, "------------------").ok();
        for kind in CollectorKind::ALL {
            writeln!(
                out,
                "{:left$} | {:>col$}",
                kind.name(),
                self.failures(kind),
                left = left_col,
                col = col_w
            )
            .ok();
        }

        writeln!(out).ok();
        writeln!(out, "uptime: {}s", self.uptime_seconds()).ok();
        writeln!(out, "last round: {}", self.last_round_str()).ok();

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_running_stat() {
        let mut stat = RunningStat::default();
        stat.add(10.0);
        stat.add(30.0);
        stat.add(20.0);
        assert_eq!(stat.avg(), 20.0);
        assert_eq!(stat.min, 10.0);
        assert_eq!(stat.max, 30.0);
        assert_eq!(stat.last, 20.0);
    }

    #[test]
    fn test_stat_snapshot_empty() {
        let stat = Stat::default();
        assert_eq!(stat.snapshot(), StatSnapshot::default());
    }

    #[test]
    fn test_round_stats_counters() {
        let stats = RoundStats::new();
        stats.record_round(120.0, "10:00:00");
        stats.record_round(80.0, "10:00:01");
        stats.record_failure(CollectorKind::Frame);
        stats.record_failure(CollectorKind::Frame);
        stats.record_repairs(3);
        stats.record_overrun();

        assert_eq!(stats.rounds(), 2);
        assert_eq!(stats.failures(CollectorKind::Frame), 2);
        assert_eq!(stats.failures(CollectorKind::Cpu), 0);
        assert_eq!(stats.alignment_repairs.load(Ordering::Relaxed), 3);
        assert_eq!(stats.round_duration_ms.snapshot().avg, 100.0);
        assert_eq!(stats.last_round_str(), "10:00:01");
    }

    #[test]
    fn test_render_table() {
        let stats = RoundStats::new();
        stats.record_failure(CollectorKind::Network);
        let table = stats.render_table();
        assert!(table.contains("MONITOR ROUND STATS"));
        assert!(table.contains("network"));
        assert!(table.contains("last round: N/A"));
    }
}
