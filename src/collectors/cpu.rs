//! CPU usage collector.
//!
//! Reads the target process's accumulated scheduling ticks from
//! `/proc/<pid>/stat` and the device totals from the aggregate `cpu ` line of
//! `/proc/stat`, then derives app and system usage from the deltas between two
//! consecutive rounds.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::channel::CommandChannel;
use crate::collectors::RoundState;
use crate::sample::{round2, Sample};

/// Command that prints the aggregate CPU line of /proc/stat.
const PROC_STAT_CMD: &str = "cat /proc/stat | grep ^cpu ";

/// CPU usage for one round, both in percent of total device capacity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CpuUsage {
    pub app_percent: f64,
    pub system_percent: f64,
}

/// Counter snapshot carried between rounds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CpuCounters {
    pub process_ticks: u64,
    pub total_ticks: u64,
    pub idle_ticks: u64,
}

/// Delta-based CPU collector.
pub struct CpuCollector {
    channel: Arc<dyn CommandChannel>,
    previous: RoundState<Option<CpuCounters>>,
}

impl CpuCollector {
    pub fn new(channel: Arc<dyn CommandChannel>) -> Self {
        Self {
            channel,
            previous: RoundState::new(),
        }
    }

    /// Forgets the previous counter snapshot.
    pub fn reset(&self) {
        self.previous.reset();
    }

    /// Samples CPU usage for `pid`.
    ///
    /// The first call after a reset only records a baseline and returns
    /// `NoData`. A round where any counter cannot be read also returns
    /// `NoData` and keeps the previous baseline, so the next successful round
    /// averages over the longer window instead of reporting a bogus spike.
    pub fn sample(&self, pid: u32) -> Sample<CpuUsage> {
        let epoch = self.previous.epoch();
        let process_ticks =
            parse_process_ticks(&self.channel.execute(&format!("cat /proc/{}/stat", pid)));
        let total_ticks = parse_total_ticks(&self.channel.execute(PROC_STAT_CMD));
        let idle_ticks = parse_idle_ticks(&self.channel.execute(PROC_STAT_CMD));

        let current = match (process_ticks, total_ticks, idle_ticks) {
            (Some(process_ticks), Some(total_ticks), Some(idle_ticks)) => CpuCounters {
                process_ticks,
                total_ticks,
                idle_ticks,
            },
            _ => {
                warn!(
                    "CPU counters unreadable for pid {} (process={:?}, total={:?}, idle={:?})",
                    pid, process_ticks, total_ticks, idle_ticks
                );
                return Sample::NoData;
            }
        };

        let outcome = self.previous.with_current(epoch, |prev| {
            let result = match *prev {
                Some(baseline) => compute_usage(&baseline, &current).into(),
                None => {
                    debug!("CPU baseline recorded for pid {}", pid);
                    Sample::NoData
                }
            };
            *prev = Some(current);
            result
        });

        outcome.unwrap_or_else(|| {
            debug!("CPU sample for pid {} outlived a reset, discarded", pid);
            Sample::NoData
        })
    }
}

/// Computes app/system usage between two snapshots.
///
/// Returns `None` when the total tick delta is not positive.
pub fn compute_usage(previous: &CpuCounters, current: &CpuCounters) -> Option<CpuUsage> {
    let delta_total = current.total_ticks as f64 - previous.total_ticks as f64;
    if delta_total <= 0.0 {
        debug!("CPU total tick delta is {}, skipping round", delta_total);
        return None;
    }

    let delta_process = current.process_ticks as f64 - previous.process_ticks as f64;
    let delta_idle = current.idle_ticks as f64 - previous.idle_ticks as f64;

    let app = 100.0 * delta_process / delta_total;
    let system = 100.0 * (delta_total - delta_idle) / delta_total;

    Some(CpuUsage {
        app_percent: round2(app.clamp(0.0, 100.0)),
        system_percent: round2(system.clamp(0.0, 100.0)),
    })
}

/// Parses utime + stime + cutime + cstime from `/proc/<pid>/stat` output.
///
/// Fields are taken after the closing parenthesis of the command name, which
/// may itself contain spaces.
pub fn parse_process_ticks(output: &str) -> Option<u64> {
    let line = output.trim();
    if line.is_empty() {
        return None;
    }
    let rest = match line.rfind(')') {
        Some(idx) => &line[idx + 1..],
        None => line,
    };

    // After the comm field: state(0) ppid(1) ... utime(11) stime(12) cutime(13) cstime(14)
    let parts: Vec<&str> = rest.split_whitespace().collect();
    if parts.len() <= 14 {
        return None;
    }

    let mut ticks: u64 = 0;
    for field in &parts[11..=14] {
        // cutime/cstime are signed in the kernel ABI; negative values never
        // occur in practice but must not poison the sum.
        let value: i64 = field.parse().ok()?;
        ticks += value.max(0) as u64;
    }
    Some(ticks)
}

/// Returns the numeric fields of the aggregate `cpu ` line.
fn aggregate_cpu_fields(output: &str) -> Option<Vec<u64>> {
    let line = output
        .lines()
        .map(str::trim)
        .find(|l| l.starts_with("cpu ") || *l == "cpu")?;
    let fields: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .map(|f| f.parse::<u64>())
        .collect::<Result<_, _>>()
        .ok()?;
    Some(fields)
}

/// Sum of user, nice, system, idle, iowait, irq and softirq ticks.
pub fn parse_total_ticks(output: &str) -> Option<u64> {
    let fields = aggregate_cpu_fields(output)?;
    if fields.len() < 7 {
        return None;
    }
    Some(fields[..7].iter().sum())
}

/// Idle ticks (fourth numeric field of the aggregate line).
pub fn parse_idle_ticks(output: &str) -> Option<u64> {
    let fields = aggregate_cpu_fields(output)?;
    fields.get(3).copied()
}
