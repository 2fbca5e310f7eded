//! Time-aligned multi-series store.
//!
//! The store holds one [`TimeSeries`] per tracked metric plus a shared
//! timestamp sequence. After every round each series has exactly as many
//! entries as there are timestamps; [`Store::ensure_aligned`] detects and
//! repairs any violation.

use ahash::AHashMap;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::warn;

use crate::collectors::{
    BatteryReading, CpuUsage, ForegroundApp, FrameStats, MemoryDetail, MemoryUsage, NetworkRate,
};
use crate::sample::Sample;
use crate::series::TimeSeries;

pub const DEFAULT_MAX_DATA_POINTS: usize = 300;

/// Scalar metrics tracked by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    CpuApp,
    CpuSystem,
    MemoryTotal,
    BatteryLevel,
    BatteryTemperature,
    /// Download rate.
    NetworkRx,
    /// Upload rate.
    NetworkTx,
    Fps,
    JankCount,
}

impl Metric {
    pub const ALL: [Metric; 9] = [
        Metric::CpuApp,
        Metric::CpuSystem,
        Metric::MemoryTotal,
        Metric::BatteryLevel,
        Metric::BatteryTemperature,
        Metric::NetworkRx,
        Metric::NetworkTx,
        Metric::Fps,
        Metric::JankCount,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Metric::CpuApp => "cpu_app",
            Metric::CpuSystem => "cpu_system",
            Metric::MemoryTotal => "memory_total",
            Metric::BatteryLevel => "battery_level",
            Metric::BatteryTemperature => "battery_temperature",
            Metric::NetworkRx => "network_rx",
            Metric::NetworkTx => "network_tx",
            Metric::Fps => "fps",
            Metric::JankCount => "jank_count",
        }
    }

    pub fn from_name(name: &str) -> Option<Metric> {
        Metric::ALL.into_iter().find(|m| m.name() == name)
    }
}

/// Everything one round produced, one outcome per collector.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundRecord {
    pub cpu: Sample<CpuUsage>,
    pub memory: Sample<MemoryUsage>,
    pub memory_detail: Sample<MemoryDetail>,
    pub battery: Sample<BatteryReading>,
    pub network: Sample<NetworkRate>,
    pub frame: Sample<FrameStats>,
    pub foreground: Sample<ForegroundApp>,
}

impl Default for RoundRecord {
    fn default() -> Self {
        Self {
            cpu: Sample::NoData,
            memory: Sample::NoData,
            memory_detail: Sample::NoData,
            battery: Sample::NoData,
            network: Sample::NoData,
            frame: Sample::NoData,
            foreground: Sample::NoData,
        }
    }
}

impl RoundRecord {
    /// The scalar value of `metric` in this round, `None` for no data.
    pub fn scalar(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::CpuApp => self.cpu.value().map(|c| c.app_percent),
            Metric::CpuSystem => self.cpu.value().map(|c| c.system_percent),
            Metric::MemoryTotal => self.memory.value().map(|m| m.total_pss_mb),
            Metric::BatteryLevel => self.battery.value().map(|b| b.level_percent),
            Metric::BatteryTemperature => self.battery.value().map(|b| b.temperature_c),
            Metric::NetworkRx => self.network.value().map(|n| n.download_kbs),
            Metric::NetworkTx => self.network.value().map(|n| n.upload_kbs),
            Metric::Fps => self.frame.value().map(|f| f.fps as f64),
            Metric::JankCount => self.frame.value().map(|f| f.jank_count as f64),
        }
    }
}

/// Serializable view of the whole store.
#[derive(Debug, Clone, Serialize)]
pub struct StoreSnapshot {
    pub timestamps: Vec<String>,
    pub series: BTreeMap<&'static str, Vec<Option<f64>>>,
    pub memory_detail: Vec<Option<MemoryDetail>>,
    pub foreground: Vec<Option<ForegroundApp>>,
}

pub struct Store {
    capacity: usize,
    timestamps: TimeSeries<String>,
    scalars: AHashMap<Metric, TimeSeries<f64>>,
    memory_detail: TimeSeries<MemoryDetail>,
    foreground: TimeSeries<ForegroundApp>,
}

impl Default for Store {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DATA_POINTS)
    }
}

impl Store {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            timestamps: TimeSeries::new(capacity),
            scalars: Metric::ALL
                .into_iter()
                .map(|m| (m, TimeSeries::new(capacity)))
                .collect(),
            memory_detail: TimeSeries::new(capacity),
            foreground: TimeSeries::new(capacity),
        }
    }

    /// Local wall-clock `HH:MM:SS`, the store's timestamp format.
    pub fn now_timestamp() -> String {
        chrono::Local::now().format("%H:%M:%S").to_string()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn latest(&self, metric: Metric) -> Option<f64> {
        self.scalars.get(&metric).and_then(|s| s.latest().copied())
    }

    pub fn series(&self, metric: Metric) -> Vec<Option<f64>> {
        self.scalars
            .get(&metric)
            .map(TimeSeries::history)
            .unwrap_or_default()
    }

    pub fn timestamps(&self) -> Vec<String> {
        self.timestamps.iter().flatten().cloned().collect()
    }

    pub fn memory_detail_series(&self) -> Vec<Option<MemoryDetail>> {
        self.memory_detail.history()
    }

    pub fn foreground_series(&self) -> Vec<Option<ForegroundApp>> {
        self.foreground.history()
    }

    pub fn latest_foreground(&self) -> Option<&ForegroundApp> {
        self.foreground.latest()
    }

    pub fn clear(&mut self) {
        self.timestamps.clear();
        for series in self.scalars.values_mut() {
            series.clear();
        }
        self.memory_detail.clear();
        self.foreground.clear();
    }

    /// Changes the bound of every series; 0 means unbounded.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
        self.timestamps.set_capacity(capacity);
        for series in self.scalars.values_mut() {
            series.set_capacity(capacity);
        }
        self.memory_detail.set_capacity(capacity);
        self.foreground.set_capacity(capacity);
    }

    pub fn push_timestamp(&mut self, timestamp: String) {
        self.timestamps.push(Some(timestamp));
    }

    pub fn push_value(&mut self, metric: Metric, value: Option<f64>) {
        if let Some(series) = self.scalars.get_mut(&metric) {
            series.push(value);
        }
    }

    /// Writes one round: exactly one timestamp plus one value or gap per series.
    pub fn append_round(&mut self, timestamp: String, record: &RoundRecord) {
        self.push_timestamp(timestamp);
        for metric in Metric::ALL {
            self.push_value(metric, record.scalar(metric));
        }
        self.memory_detail.push(record.memory_detail.value());
        self.foreground.push(record.foreground.clone().value());
    }

    /// Whether every series has as many entries as there are timestamps.
    pub fn is_aligned(&self) -> bool {
        let expected = self.timestamps.len();
        self.scalars.values().all(|s| s.len() == expected)
            && self.memory_detail.len() == expected
            && self.foreground.len() == expected
    }

    /// Pads short series with gaps and trims long ones to the timestamp count.
    ///
    /// Returns the number of series that had to be repaired.
    pub fn ensure_aligned(&mut self) -> usize {
        let expected = self.timestamps.len();
        let mut repaired = 0;

        for metric in Metric::ALL {
            if let Some(series) = self.scalars.get_mut(&metric) {
                if series.len() != expected {
                    warn!(
                        "Series {} has {} entries, expected {}; repairing",
                        metric.name(),
                        series.len(),
                        expected
                    );
                    series.resize_to(expected);
                    repaired += 1;
                }
            }
        }

        if self.memory_detail.len() != expected {
            warn!(
                "Series memory_detail has {} entries, expected {}; repairing",
                self.memory_detail.len(),
                expected
            );
            self.memory_detail.resize_to(expected);
            repaired += 1;
        }

        if self.foreground.len() != expected {
            warn!(
                "Series foreground has {} entries, expected {}; repairing",
                self.foreground.len(),
                expected
            );
            self.foreground.resize_to(expected);
            repaired += 1;
        }

        repaired
    }

    pub fn latest_all(&self) -> BTreeMap<&'static str, Option<f64>> {
        Metric::ALL
            .into_iter()
            .map(|m| (m.name(), self.latest(m)))
            .collect()
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            timestamps: self.timestamps(),
            series: Metric::ALL
                .into_iter()
                .map(|m| (m.name(), self.series(m)))
                .collect(),
            memory_detail: self.memory_detail_series(),
            foreground: self.foreground_series(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_with_cpu(app: f64) -> RoundRecord {
        RoundRecord {
            cpu: Sample::Value(CpuUsage {
                app_percent: app,
                system_percent: 40.0,
            }),
            ..RoundRecord::default()
        }
    }

    #[test]
    fn test_append_round_keeps_alignment() {
        let mut store = Store::new(10);
        store.append_round("10:00:00".into(), &record_with_cpu(5.0));
        store.append_round("10:00:01".into(), &RoundRecord::default());

        assert!(store.is_aligned());
        assert_eq!(store.timestamps(), vec!["10:00:00", "10:00:01"]);
        assert_eq!(store.series(Metric::CpuApp), vec![Some(5.0), None]);
        assert_eq!(store.series(Metric::Fps), vec![None, None]);
        assert_eq!(store.latest(Metric::CpuApp), None);
    }

    #[test]
    fn test_ensure_aligned_pads_and_trims() {
        let mut store = Store::new(10);
        store.push_timestamp("10:00:00".into());
        store.push_timestamp("10:00:01".into());
        store.push_value(Metric::CpuApp, Some(1.0));
        store.push_value(Metric::Fps, Some(60.0));
        store.push_value(Metric::Fps, Some(59.0));
        store.push_value(Metric::Fps, Some(58.0));
        assert!(!store.is_aligned());

        let repaired = store.ensure_aligned();
        // Every series except fps was short or empty; fps was long.
        assert_eq!(repaired, Metric::ALL.len() + 2);
        assert!(store.is_aligned());
        assert_eq!(store.series(Metric::CpuApp), vec![Some(1.0), None]);
        assert_eq!(store.series(Metric::Fps), vec![Some(60.0), Some(59.0)]);
        assert_eq!(store.ensure_aligned(), 0);
    }

    #[test]
    fn test_capacity_and_eviction() {
        let mut store = Store::new(3);
        for i in 0..5 {
            store.append_round(format!("10:00:0{}", i), &record_with_cpu(i as f64));
        }
        assert_eq!(store.len(), 3);
        assert_eq!(store.timestamps()[0], "10:00:02");
        assert_eq!(
            store.series(Metric::CpuApp),
            vec![Some(2.0), Some(3.0), Some(4.0)]
        );

        store.set_capacity(1);
        assert_eq!(store.len(), 1);
        assert!(store.is_aligned());
        assert_eq!(store.latest(Metric::CpuApp), Some(4.0));
    }

    #[test]
    fn test_clear() {
        let mut store = Store::default();
        assert_eq!(store.capacity(), DEFAULT_MAX_DATA_POINTS);
        store.append_round("10:00:00".into(), &record_with_cpu(1.0));
        store.clear();
        assert!(store.is_empty());
        assert!(store.series(Metric::CpuApp).is_empty());
        assert!(store.is_aligned());
    }

    #[test]
    fn test_snapshot_serializes() {
        let mut store = Store::new(5);
        store.append_round("10:00:00".into(), &record_with_cpu(12.5));
        let json = serde_json::to_value(store.snapshot()).expect("serializable");
        assert_eq!(json["timestamps"][0], "10:00:00");
        assert_eq!(json["series"]["cpu_app"][0], 12.5);
        assert!(json["series"]["fps"][0].is_null());
        assert_eq!(store.latest_all()["cpu_system"], Some(40.0));
    }

    #[test]
    fn test_metric_names_round_trip() {
        for metric in Metric::ALL {
            assert_eq!(Metric::from_name(metric.name()), Some(metric));
        }
        assert_eq!(Metric::from_name("unknown"), None);
    }

    #[test]
    fn test_timestamp_format() {
        let ts = Store::now_timestamp();
        assert_eq!(ts.len(), 8);
        assert_eq!(&ts[2..3], ":");
        assert_eq!(&ts[5..6], ":");
    }
}
