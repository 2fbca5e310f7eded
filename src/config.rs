//! Configuration management for adb-perf-monitor.
//!
//! This module handles loading, merging, and validating configuration from files
//! and CLI arguments. It supports YAML, JSON, and TOML formats.

use crate::cli::{Args, ConfigFormat};
use adb_perf_monitor::channel::{AdbShell, CommandChannel};
use adb_perf_monitor::monitor::{MonitorSettings, MIN_INTERVAL_MS};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

// Default configuration constants
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 9230;
pub const DEFAULT_ADB_PATH: &str = "adb";
pub const DEFAULT_COMMAND_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_COLLECTOR_TIMEOUT_MS: u64 = 5_000;

/// Default config file locations, searched in order.
const DEFAULT_CONFIG_PATHS: [&str; 6] = [
    "/etc/adb-perf-monitor/config.yaml",
    "/etc/adb-perf-monitor/config.yml",
    "/etc/adb-perf-monitor/config.json",
    "./adb-perf-monitor.yaml",
    "./adb-perf-monitor.yml",
    "./adb-perf-monitor.json",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    // Device
    #[serde(alias = "adb-path")]
    pub adb_path: Option<String>,
    /// Device serial passed as `adb -s`; None uses the only attached device.
    pub serial: Option<String>,
    #[serde(alias = "command-timeout-ms")]
    pub command_timeout_ms: Option<u64>,

    // Sampling
    #[serde(alias = "interval-ms")]
    pub interval_ms: Option<u64>,
    /// Points kept per series (0 = unbounded)
    #[serde(alias = "max-data-points")]
    pub max_data_points: Option<usize>,
    #[serde(alias = "collector-timeout-ms")]
    pub collector_timeout_ms: Option<u64>,
    #[serde(alias = "foreground-query-timeout-ms")]
    pub foreground_query_timeout_ms: Option<u64>,
    #[serde(alias = "foreground-info-timeout-ms")]
    pub foreground_info_timeout_ms: Option<u64>,

    // Server configuration
    pub bind: Option<String>,
    pub port: Option<u16>,
    #[serde(alias = "enable-health")]
    pub enable_health: Option<bool>,

    // Logging
    #[serde(alias = "log-level")]
    pub log_level: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            adb_path: Some(DEFAULT_ADB_PATH.to_string()),
            serial: None,
            command_timeout_ms: Some(DEFAULT_COMMAND_TIMEOUT_MS),
            interval_ms: Some(adb_perf_monitor::monitor::DEFAULT_INTERVAL_MS),
            max_data_points: Some(adb_perf_monitor::store::DEFAULT_MAX_DATA_POINTS),
            collector_timeout_ms: Some(DEFAULT_COLLECTOR_TIMEOUT_MS),
            foreground_query_timeout_ms: Some(2500),
            foreground_info_timeout_ms: Some(1500),
            bind: Some(DEFAULT_BIND_ADDR.to_string()),
            port: Some(DEFAULT_PORT),
            enable_health: Some(true),
            log_level: Some("info".into()),
        }
    }
}

impl Config {
    /// Builds the adb shell channel described by this config.
    pub fn command_channel(&self) -> Arc<dyn CommandChannel> {
        Arc::new(AdbShell::new(
            self.adb_path.as_deref().unwrap_or(DEFAULT_ADB_PATH),
            self.serial.clone(),
            Duration::from_millis(
                self.command_timeout_ms
                    .unwrap_or(DEFAULT_COMMAND_TIMEOUT_MS),
            ),
        ))
    }

    pub fn monitor_settings(&self) -> MonitorSettings {
        let defaults = MonitorSettings::default();
        MonitorSettings {
            interval_ms: self.interval_ms.unwrap_or(defaults.interval_ms),
            collector_timeout: self
                .collector_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.collector_timeout),
            max_data_points: self.max_data_points.unwrap_or(defaults.max_data_points),
            foreground_query_timeout: self
                .foreground_query_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.foreground_query_timeout),
            foreground_info_timeout: self
                .foreground_info_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.foreground_info_timeout),
        }
    }
}

/// Validate effective config (used by --check-config and at startup)
pub fn validate_effective_config(cfg: &Config) -> Result<(), Box<dyn std::error::Error>> {
    if cfg.adb_path.as_deref().is_some_and(|p| p.trim().is_empty()) {
        return Err("adb_path must not be empty".into());
    }

    if let Some(interval) = cfg.interval_ms {
        if interval < MIN_INTERVAL_MS {
            return Err(format!(
                "interval_ms {} is below the minimum of {}ms",
                interval, MIN_INTERVAL_MS
            )
            .into());
        }
    }

    for (name, value) in [
        ("command_timeout_ms", cfg.command_timeout_ms),
        ("collector_timeout_ms", cfg.collector_timeout_ms),
        ("foreground_query_timeout_ms", cfg.foreground_query_timeout_ms),
        ("foreground_info_timeout_ms", cfg.foreground_info_timeout_ms),
    ] {
        if value == Some(0) {
            return Err(format!("{} must be greater than 0", name).into());
        }
    }

    if let Some(level) = cfg.log_level.as_deref() {
        if crate::cli::parse_log_level(level).is_none() {
            return Err(format!(
                "Invalid log_level '{}', expected off, error, warn, info, debug or trace",
                level
            )
            .into());
        }
    }

    Ok(())
}

/// Resolves configuration from CLI args, config file, and defaults.
/// This enforces precedence: CLI (if provided) > config file > default.
pub fn resolve_config(args: &Args) -> Result<Config, Box<dyn std::error::Error>> {
    let mut config = if args.no_config {
        Config::default()
    } else {
        load_config(args.config.as_deref())?
    };

    if let Some(adb_path) = &args.adb_path {
        config.adb_path = Some(adb_path.clone());
    }
    if let Some(serial) = &args.serial {
        config.serial = Some(serial.clone());
    }
    if let Some(interval_ms) = args.interval_ms {
        config.interval_ms = Some(interval_ms);
    }
    if let Some(max_data_points) = args.max_data_points {
        config.max_data_points = Some(max_data_points);
    }

    if let Some(bind_ip) = args.bind {
        config.bind = Some(bind_ip.to_string());
    }
    if let Some(cli_port) = args.port {
        config.port = Some(cli_port);
    }
    if args.disable_health {
        config.enable_health = Some(false);
    }

    if let Some(level) = &args.log_level {
        config.log_level = Some(crate::cli::log_level_name(level).to_string());
    }

    Ok(config)
}

/// Loads a config file, falling back to the default locations and then to
/// built-in defaults. Keys missing from the file keep their default values.
pub fn load_config(path: Option<&Path>) -> Result<Config, Box<dyn std::error::Error>> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => match DEFAULT_CONFIG_PATHS
            .iter()
            .find(|p| Path::new(p).exists())
            .map(PathBuf::from)
        {
            Some(p) => p,
            None => return Ok(Config::default()),
        },
    };

    if !path.exists() {
        return Err(format!("Config file not found: {}", path.display()).into());
    }

    let content = fs::read_to_string(&path)?;

    let loaded: Config = match path.extension().and_then(|s| s.to_str()) {
        Some("json") => {
            let config: PartialConfig = serde_json::from_str(&content)?;
            info!("Loaded JSON configuration from: {}", path.display());
            config.into()
        }
        Some("toml") => {
            let config: PartialConfig = toml::from_str(&content)?;
            info!("Loaded TOML configuration from: {}", path.display());
            config.into()
        }
        _ => {
            // Default to YAML
            let config: PartialConfig = serde_yaml::from_str(&content)?;
            info!("Loaded YAML configuration from: {}", path.display());
            config.into()
        }
    };
    Ok(loaded)
}

/// File representation: every key optional, merged over [`Config::default`].
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PartialConfig {
    #[serde(alias = "adb-path")]
    adb_path: Option<String>,
    serial: Option<String>,
    #[serde(alias = "command-timeout-ms")]
    command_timeout_ms: Option<u64>,
    #[serde(alias = "interval-ms")]
    interval_ms: Option<u64>,
    #[serde(alias = "max-data-points")]
    max_data_points: Option<usize>,
    #[serde(alias = "collector-timeout-ms")]
    collector_timeout_ms: Option<u64>,
    #[serde(alias = "foreground-query-timeout-ms")]
    foreground_query_timeout_ms: Option<u64>,
    #[serde(alias = "foreground-info-timeout-ms")]
    foreground_info_timeout_ms: Option<u64>,
    bind: Option<String>,
    port: Option<u16>,
    #[serde(alias = "enable-health")]
    enable_health: Option<bool>,
    #[serde(alias = "log-level")]
    log_level: Option<String>,
}

impl From<PartialConfig> for Config {
    fn from(p: PartialConfig) -> Self {
        let d = Config::default();
        Config {
            adb_path: p.adb_path.or(d.adb_path),
            serial: p.serial.or(d.serial),
            command_timeout_ms: p.command_timeout_ms.or(d.command_timeout_ms),
            interval_ms: p.interval_ms.or(d.interval_ms),
            max_data_points: p.max_data_points.or(d.max_data_points),
            collector_timeout_ms: p.collector_timeout_ms.or(d.collector_timeout_ms),
            foreground_query_timeout_ms: p
                .foreground_query_timeout_ms
                .or(d.foreground_query_timeout_ms),
            foreground_info_timeout_ms: p
                .foreground_info_timeout_ms
                .or(d.foreground_info_timeout_ms),
            bind: p.bind.or(d.bind),
            port: p.port.or(d.port),
            enable_health: p.enable_health.or(d.enable_health),
            log_level: p.log_level.or(d.log_level),
        }
    }
}

/// Renders a config in the requested format.
pub fn render_config(
    config: &Config,
    format: ConfigFormat,
) -> Result<String, Box<dyn std::error::Error>> {
    Ok(match format {
        ConfigFormat::Json => serde_json::to_string_pretty(config)?,
        ConfigFormat::Toml => toml::to_string_pretty(config)?,
        ConfigFormat::Yaml => serde_yaml::to_string(config)?,
    })
}

/// Shows configuration in requested format
pub fn show_config(config: &Config, format: ConfigFormat) -> Result<(), Box<dyn std::error::Error>> {
    let output = render_config(config, format)?;
    println!("{output}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(suffix: &str, content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(suffix)
            .tempfile()
            .expect("temp file");
        file.write_all(content.as_bytes()).expect("write config");
        file
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_effective_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let file = write_temp(".yaml", "interval-ms: 750\nserial: emulator-5554\n");
        let config = load_config(Some(file.path())).expect("load yaml");

        assert_eq!(config.interval_ms, Some(750));
        assert_eq!(config.serial.as_deref(), Some("emulator-5554"));
        assert_eq!(config.port, Some(DEFAULT_PORT));
        assert_eq!(config.adb_path.as_deref(), Some(DEFAULT_ADB_PATH));
    }

    #[test]
    fn test_round_trip_in_every_format() {
        let mut config = Config::default();
        config.max_data_points = Some(42);
        config.serial = Some("R58M123".into());

        for (format, suffix) in [
            (ConfigFormat::Yaml, ".yaml"),
            (ConfigFormat::Json, ".json"),
            (ConfigFormat::Toml, ".toml"),
        ] {
            let rendered = render_config(&config, format).expect("render");
            let file = write_temp(suffix, &rendered);
            let loaded = load_config(Some(file.path())).expect("reload");
            assert_eq!(loaded, config, "round trip through {}", suffix);
        }
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        assert!(load_config(Some(Path::new("/nonexistent/adb-perf-monitor.yaml"))).is_err());
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let short = Config {
            interval_ms: Some(499),
            ..Config::default()
        };
        assert!(validate_effective_config(&short).is_err());

        let floor = Config {
            interval_ms: Some(500),
            ..Config::default()
        };
        assert!(validate_effective_config(&floor).is_ok());

        let zero_timeout = Config {
            collector_timeout_ms: Some(0),
            ..Config::default()
        };
        assert!(validate_effective_config(&zero_timeout).is_err());

        let empty_adb = Config {
            adb_path: Some("  ".into()),
            ..Config::default()
        };
        assert!(validate_effective_config(&empty_adb).is_err());

        let bad_level = Config {
            log_level: Some("loud".into()),
            ..Config::default()
        };
        assert!(validate_effective_config(&bad_level).is_err());
    }

    #[test]
    fn test_monitor_settings_from_config() {
        let config = Config {
            interval_ms: Some(2000),
            collector_timeout_ms: Some(3000),
            ..Config::default()
        };
        let settings = config.monitor_settings();
        assert_eq!(settings.interval_ms, 2000);
        assert_eq!(settings.collector_timeout, Duration::from_millis(3000));
        assert_eq!(settings.max_data_points, 300);
    }
}
