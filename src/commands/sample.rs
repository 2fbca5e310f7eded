//! Sample command implementation.
//!
//! Runs collectors directly, without the monitor or store, and prints what
//! each of them returned.

use adb_perf_monitor::collectors::{CollectorKind, Collectors};
use adb_perf_monitor::error::MonitorError;
use adb_perf_monitor::monitor::{collect_selected, resolve_pid, RoundTarget};
use adb_perf_monitor::round_stats::RoundStats;
use adb_perf_monitor::sample::Sample;
use adb_perf_monitor::store::RoundRecord;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::cli::CollectorChoice;
use crate::config::Config;

/// Runs the selected collectors `iterations` times, one interval apart.
pub async fn command_sample(
    package: String,
    pid: Option<u32>,
    choice: CollectorChoice,
    iterations: usize,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("🧪 adb-perf-monitor - Sample Mode");
    println!("=================================");

    let channel = config.command_channel();
    let settings = config.monitor_settings();

    let pid = match pid {
        Some(pid) => pid,
        None => {
            let ch = channel.clone();
            let pkg = package.clone();
            tokio::task::spawn_blocking(move || resolve_pid(ch.as_ref(), &pkg))
                .await?
                .ok_or_else(|| MonitorError::PidNotFound(package.clone()))?
        }
    };
    println!("   📦 {} (pid {})", package, pid);

    let collectors = Arc::new(Collectors::new(
        channel,
        settings.foreground_query_timeout,
        settings.foreground_info_timeout,
    ));
    let target = RoundTarget { pid, package };
    let stats = RoundStats::new();
    let kinds: Vec<CollectorKind> = match choice.kind() {
        Some(kind) => vec![kind],
        None => CollectorKind::ALL.to_vec(),
    };

    for iteration in 1..=iterations {
        if iteration > 1 {
            tokio::time::sleep(Duration::from_millis(settings.interval_ms)).await;
        }
        println!("\n🔄 Iteration {}/{}:", iteration, iterations);

        let start = Instant::now();
        let record = collect_selected(
            &collectors,
            &target,
            settings.collector_timeout,
            &stats,
            &kinds,
        )
        .await;
        let duration = start.elapsed();

        for line in describe_record(&record, &kinds) {
            println!("   ├─ {}", line);
        }
        println!(
            "   └─ ⏱️  Duration: {:.2}ms",
            duration.as_secs_f64() * 1000.0
        );
    }

    if kinds.contains(&CollectorKind::Battery) {
        let c = collectors.clone();
        let health = tokio::task::spawn_blocking(move || c.battery.health()).await?;
        println!("\n🔋 Battery health:");
        println!("   ├─ Health: {}", health.health.as_deref().unwrap_or("unknown"));
        println!(
            "   ├─ Voltage: {}",
            health
                .voltage_mv
                .map_or("unknown".to_string(), |v| format!("{} mV", v))
        );
        println!(
            "   └─ Current: {}",
            health
                .current_ma
                .map_or("unknown".to_string(), |c| format!("{:.1} mA", c))
        );
    }

    let failures: u64 = kinds.iter().map(|k| stats.failures(*k)).sum();
    if failures > 0 {
        println!("\n❌ Collector failures: {}", failures);
    }
    println!("\n✅ Sampling completed");
    Ok(())
}

fn or_no_data<T>(sample: &Sample<T>, render: impl FnOnce(&T) -> String) -> String {
    match sample {
        Sample::Value(v) => render(v),
        Sample::NoData => "no data".to_string(),
    }
}

/// One line per selected collector.
pub fn describe_record(record: &RoundRecord, kinds: &[CollectorKind]) -> Vec<String> {
    kinds
        .iter()
        .map(|kind| match kind {
            CollectorKind::Cpu => format!(
                "CPU: {}",
                or_no_data(&record.cpu, |c| format!(
                    "app {:.2}% / system {:.2}%",
                    c.app_percent, c.system_percent
                ))
            ),
            CollectorKind::Memory => {
                let detail = match &record.memory_detail {
                    Sample::Value(d) => format!(
                        " (java {:.2}, native {:.2}, graphics {:.2} MB)",
                        d.java_heap_mb, d.native_heap_mb, d.graphics_mb
                    ),
                    Sample::NoData => String::new(),
                };
                format!(
                    "Memory: {}{}",
                    or_no_data(&record.memory, |m| format!("{:.2} MB PSS", m.total_pss_mb)),
                    detail
                )
            }
            CollectorKind::Battery => format!(
                "Battery: {}",
                or_no_data(&record.battery, |b| format!(
                    "{:.0}% {:.1}°C",
                    b.level_percent, b.temperature_c
                ))
            ),
            CollectorKind::Network => format!(
                "Network: {}",
                or_no_data(&record.network, |n| format!(
                    "up {:.2} KB/s / down {:.2} KB/s",
                    n.upload_kbs, n.download_kbs
                ))
            ),
            CollectorKind::Frame => format!(
                "Frames: {}",
                or_no_data(&record.frame, |f| format!(
                    "{} fps, {} janky",
                    f.fps, f.jank_count
                ))
            ),
            CollectorKind::Foreground => format!(
                "Foreground: {}",
                or_no_data(&record.foreground, |a| format!(
                    "{} ({})",
                    a.package_name, a.app_name
                ))
            ),
        })
        .collect()
}
