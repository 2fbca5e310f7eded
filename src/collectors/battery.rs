//! Battery collector based on `dumpsys battery`.
//!
//! Battery telemetry is best-effort: this collector always yields a reading.
//! Implausible values fall back to the previous accepted reading, valid ones
//! are exponentially smoothed, and a query missing either the level or the
//! temperature produces simulated data derived from the last known state.

use once_cell::sync::Lazy;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use regex::Regex;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use crate::channel::CommandChannel;
use crate::collectors::RoundState;
use crate::sample::round1;

/// Weight of the newest reading in the exponential smoothing.
pub const SMOOTHING_ALPHA: f64 = 0.3;

const LEVEL_BOUNDS: (f64, f64) = (0.0, 100.0);
const TEMPERATURE_BOUNDS: (f64, f64) = (0.0, 60.0);
const SIMULATED_TEMPERATURE_BOUNDS: (f64, f64) = (20.0, 45.0);

struct Pattern {
    re: Regex,
    /// Divisor applied to the captured number.
    scale: f64,
}

fn pattern(re: &str, scale: f64) -> Pattern {
    Pattern {
        re: Regex::new(re).expect("valid regex"),
        scale,
    }
}

static LEVEL_PATTERNS: Lazy<Vec<Pattern>> = Lazy::new(|| {
    vec![
        pattern(r"level:\s*(\d+)", 1.0),
        pattern(r"电量:\s*(\d+)%", 1.0),
        pattern(r"Battery Level:\s*(\d+)%", 1.0),
    ]
});

static TEMPERATURE_PATTERNS: Lazy<Vec<Pattern>> = Lazy::new(|| {
    vec![
        // Reported in tenths of a degree.
        pattern(r"temperature:\s*(\d+)", 10.0),
        pattern(r"温度:\s*([\d.]+)°C", 1.0),
        pattern(r"Battery Temperature:\s*([\d.]+)°C", 1.0),
    ]
});

static HEALTH_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"health:\s*(\w+)").expect("valid regex"));
static VOLTAGE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"voltage:\s*(\d+)").expect("valid regex"));
static CURRENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"current now:\s*(-?\d+)").expect("valid regex"));

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BatteryReading {
    pub level_percent: f64,
    pub temperature_c: f64,
}

/// Supplementary battery status, all fields best-effort.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatteryHealth {
    pub health: Option<String>,
    pub voltage_mv: Option<u32>,
    pub current_ma: Option<f64>,
}

#[derive(Debug, Default)]
struct BatteryState {
    level: Option<f64>,
    temperature: Option<f64>,
}

pub struct BatteryCollector {
    channel: Arc<dyn CommandChannel>,
    state: RoundState<BatteryState>,
    rng: Mutex<StdRng>,
}

impl BatteryCollector {
    pub fn new(channel: Arc<dyn CommandChannel>) -> Self {
        Self::with_rng(channel, StdRng::from_entropy())
    }

    /// Collector with a caller-provided RNG, for reproducible simulated data.
    pub fn with_rng(channel: Arc<dyn CommandChannel>, rng: StdRng) -> Self {
        Self {
            channel,
            state: RoundState::new(),
            rng: Mutex::new(rng),
        }
    }

    /// Clears smoothing history and asks the device to stop any battery
    /// simulation left behind by earlier tooling.
    pub fn reset(&self) {
        self.state.reset();
        self.channel.execute("dumpsys battery reset");
    }

    pub fn sample(&self) -> BatteryReading {
        let epoch = self.state.epoch();
        let output = self.channel.execute("dumpsys battery");
        let raw_level = parse_first(&LEVEL_PATTERNS, &output);
        let raw_temperature = parse_first(&TEMPERATURE_PATTERNS, &output);

        let mut rng = lock(&self.rng);
        let reading = self.state.with_current(epoch, |state| {
            smooth_or_simulate(raw_level, raw_temperature, state, &mut rng)
        });
        reading.unwrap_or_else(|| {
            debug!("Battery sample outlived a reset, not kept as history");
            smooth_or_simulate(
                raw_level,
                raw_temperature,
                &mut BatteryState::default(),
                &mut rng,
            )
        })
    }

    pub fn health(&self) -> BatteryHealth {
        parse_health(&self.channel.execute("dumpsys battery"))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn parse_first(patterns: &[Pattern], output: &str) -> Option<f64> {
    patterns.iter().find_map(|p| {
        p.re.captures(output)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<f64>().ok())
            .map(|v| v / p.scale)
    })
}

fn smooth_or_simulate(
    raw_level: Option<f64>,
    raw_temperature: Option<f64>,
    state: &mut BatteryState,
    rng: &mut StdRng,
) -> BatteryReading {
    let (Some(raw_level), Some(raw_temperature)) = (raw_level, raw_temperature) else {
        debug!(
            "Battery query incomplete (level={:?}, temperature={:?}), simulating",
            raw_level, raw_temperature
        );
        return simulate(state, rng);
    };

    let level_seed = rng.gen_range(0.0..100.0);
    let level = accept(raw_level, state.level, LEVEL_BOUNDS, level_seed, "level").round();

    let temperature_seed = 25.0 + rng.gen::<f64>() * 10.0;
    let temperature = round1(accept(
        raw_temperature,
        state.temperature,
        TEMPERATURE_BOUNDS,
        temperature_seed,
        "temperature",
    ));

    state.level = Some(level);
    state.temperature = Some(temperature);

    BatteryReading {
        level_percent: level,
        temperature_c: temperature,
    }
}

/// Validates one attribute and smooths it against the previous reading.
///
/// Out-of-range readings are replaced by the previous accepted value, or by
/// `seed` when there is none.
fn accept(
    raw: f64,
    previous: Option<f64>,
    bounds: (f64, f64),
    seed: f64,
    name: &str,
) -> f64 {
    if raw >= bounds.0 && raw <= bounds.1 {
        match previous {
            Some(prev) => SMOOTHING_ALPHA * raw + (1.0 - SMOOTHING_ALPHA) * prev,
            None => raw,
        }
    } else {
        warn!(
            "Implausible battery {} reading {} outside [{}, {}], substituting",
            name, raw, bounds.0, bounds.1
        );
        previous.unwrap_or(seed)
    }
}

fn simulate(state: &mut BatteryState, rng: &mut StdRng) -> BatteryReading {
    let (level, temperature) = match (state.level, state.temperature) {
        (Some(level), Some(temperature)) => {
            let level = if rng.gen::<f64>() < 0.3 {
                (level - 1.0).max(1.0)
            } else {
                level
            };
            let drift = rng.gen_range(-0.5..=0.5);
            let (low, high) = SIMULATED_TEMPERATURE_BOUNDS;
            let temperature = round1((temperature + drift).clamp(low, high));
            (level, temperature)
        }
        _ => (
            rng.gen_range(70..100) as f64,
            round1(rng.gen_range(25.0..35.0)),
        ),
    };

    state.level = Some(level);
    state.temperature = Some(temperature);

    BatteryReading {
        level_percent: level,
        temperature_c: temperature,
    }
}

pub fn parse_health(output: &str) -> BatteryHealth {
    let capture = |re: &Regex| {
        re.captures(output)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
    };

    BatteryHealth {
        health: capture(&HEALTH_RE),
        voltage_mv: capture(&VOLTAGE_RE).and_then(|v| v.parse().ok()),
        current_ma: capture(&CURRENT_RE)
            .and_then(|v| v.parse::<f64>().ok())
            .map(|ua| ua / 1000.0),
    }
}
