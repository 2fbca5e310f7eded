//! Monitor command implementation.
//!
//! Runs a monitoring session in the terminal, printing one line per round.

use adb_perf_monitor::monitor::Monitor;
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

use crate::commands::resolve_target;
use crate::config::Config;

/// How often the terminal view checks for a finished round.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Runs a monitoring session until Ctrl+C or `rounds` rounds completed.
pub async fn command_monitor(
    package: Option<String>,
    pid: Option<u32>,
    rounds: Option<u64>,
    output: Option<PathBuf>,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    let channel = config.command_channel();
    let (package, pid) = resolve_target(channel.clone(), config, package, pid)
        .await
        .ok_or("No package given and no foreground app detected")?;

    let monitor = Monitor::new(channel, config.monitor_settings());
    monitor.try_start(&package, pid).await?;

    let session = monitor.session();
    println!(
        "📱 Monitoring {} (pid {}) every {}ms - Ctrl+C to stop",
        package,
        session.target_pid.map_or("-".to_string(), |p| p.to_string()),
        session.interval_ms
    );
    println!("{}", header_line());

    let shutdown = crate::shutdown_signal();
    tokio::pin!(shutdown);
    let mut poll = tokio::time::interval(POLL_INTERVAL);
    let mut printed = 0u64;

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = poll.tick() => {}
        }

        let completed = monitor.round_count();
        if completed > printed {
            printed = completed;
            let store_lock = monitor.store();
            let store = store_lock.read().await;
            if let Some(timestamp) = store.timestamps().pop() {
                println!("{}", format_round_line(&timestamp, &store.latest_all()));
            }
        }

        if rounds.is_some_and(|n| printed >= n) {
            break;
        }
    }

    monitor.stop();
    info!("Monitoring finished after {} rounds", printed);

    if let Some(path) = output {
        let snapshot = monitor.store().read().await.snapshot();
        fs::write(&path, serde_json::to_string_pretty(&snapshot)?)?;
        println!("✅ Series written to: {}", path.display());
    }

    Ok(())
}

fn header_line() -> String {
    format!(
        "{:8} | {:>13} | {:>9} | {:>12} | {:>17} | {:>3} | {:>4}",
        "time", "cpu app/sys %", "pss MB", "battery", "net up/down KB/s", "fps", "jank"
    )
}

fn cell(values: &BTreeMap<&'static str, Option<f64>>, name: &str, precision: usize) -> String {
    match values.get(name).copied().flatten() {
        Some(v) => format!("{:.*}", precision, v),
        None => "-".to_string(),
    }
}

/// Formats the newest values of a round; missing values print as `-`.
pub fn format_round_line(timestamp: &str, values: &BTreeMap<&'static str, Option<f64>>) -> String {
    format!(
        "{:8} | {:>13} | {:>9} | {:>12} | {:>17} | {:>3} | {:>4}",
        timestamp,
        format!("{}/{}", cell(values, "cpu_app", 1), cell(values, "cpu_system", 1)),
        cell(values, "memory_total", 2),
        format!(
            "{}% {}°C",
            cell(values, "battery_level", 0),
            cell(values, "battery_temperature", 1)
        ),
        format!("{}/{}", cell(values, "network_tx", 1), cell(values, "network_rx", 1)),
        cell(values, "fps", 0),
        cell(values, "jank_count", 0),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_round_line_marks_missing_values() {
        let mut values = BTreeMap::new();
        values.insert("cpu_app", Some(12.345));
        values.insert("cpu_system", None);
        values.insert("fps", Some(59.0));
        values.insert("jank_count", Some(0.0));

        let line = format_round_line("10:00:01", &values);
        assert!(line.starts_with("10:00:01"));
        assert!(line.contains("12.3/-"));
        assert!(line.contains(" 59 | "));
        assert!(line.contains("-% -°C"));
    }
}
