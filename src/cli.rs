//! CLI arguments and subcommands for adb-perf-monitor.
//!
//! This module defines the command-line interface structure using the clap library,
//! including all flags, options, and subcommands.

use adb_perf_monitor::collectors::CollectorKind;
use clap::{Parser, Subcommand, ValueEnum};
use std::net::IpAddr;
use std::path::PathBuf;

/// Log level options for CLI parsing
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

pub fn parse_log_level(value: &str) -> Option<LogLevel> {
    LogLevel::from_str(value.trim(), true).ok()
}

pub fn log_level_name(level: &LogLevel) -> &'static str {
    match level {
        LogLevel::Off => "off",
        LogLevel::Error => "error",
        LogLevel::Warn => "warn",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
        LogLevel::Trace => "trace",
    }
}

/// Configuration format options for output
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ConfigFormat {
    Yaml,
    Json,
    Toml,
}

/// Collector selection for the `sample` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CollectorChoice {
    All,
    Cpu,
    Memory,
    Battery,
    Network,
    Frame,
    Foreground,
}

impl CollectorChoice {
    pub fn kind(self) -> Option<CollectorKind> {
        match self {
            CollectorChoice::All => None,
            CollectorChoice::Cpu => Some(CollectorKind::Cpu),
            CollectorChoice::Memory => Some(CollectorKind::Memory),
            CollectorChoice::Battery => Some(CollectorKind::Battery),
            CollectorChoice::Network => Some(CollectorKind::Network),
            CollectorChoice::Frame => Some(CollectorKind::Frame),
            CollectorChoice::Foreground => Some(CollectorKind::Foreground),
        }
    }
}

/// Main CLI arguments structure
#[derive(Parser, Debug)]
#[command(
    name = "adb-perf-monitor",
    about = "Android app performance monitor over adb",
    long_about = "Android app performance monitor over adb.\n\n\
                  Samples CPU, memory, battery, network, frame rate/jank and the foreground \
                  app of a device on a fixed interval, keeps a bounded time-aligned history \
                  and exposes it on the terminal, as JSON and as Prometheus metrics.",
    version,
    propagate_version = true
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// HTTP listen port
    #[arg(short = 'p', long, global = true)]
    pub port: Option<u16>,

    /// Bind to specific interface/IP
    #[arg(long, global = true)]
    pub bind: Option<IpAddr>,

    /// Log level (overrides config)
    #[arg(long, value_enum, global = true)]
    pub log_level: Option<LogLevel>,

    /// Config file (YAML/JSON/TOML)
    #[arg(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,

    /// Disable all config file loading
    #[arg(long, global = true)]
    pub no_config: bool,

    /// Print effective merged config and exit
    #[arg(long)]
    pub show_config: bool,

    /// Output format for --show-config
    #[arg(long, value_enum, default_value = "yaml")]
    pub config_format: ConfigFormat,

    /// Validate config and exit (return code 1 on error)
    #[arg(long)]
    pub check_config: bool,

    /// Path to the adb binary
    #[arg(long, global = true)]
    pub adb_path: Option<String>,

    /// Device serial (adb -s)
    #[arg(short = 's', long, global = true)]
    pub serial: Option<String>,

    /// Sampling interval in milliseconds (minimum 500)
    #[arg(short = 'i', long, global = true)]
    pub interval_ms: Option<u64>,

    /// Points kept per series (0 = unbounded)
    #[arg(long, global = true)]
    pub max_data_points: Option<usize>,

    /// Disable /health endpoint
    #[arg(long, global = true)]
    pub disable_health: bool,
}

/// Subcommands for additional functionality
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Monitor an app and print one line per sampling round
    Monitor {
        /// Package to monitor (defaults to the foreground app)
        #[arg(long)]
        package: Option<String>,

        /// Process id (resolved from the package when omitted)
        #[arg(long)]
        pid: Option<u32>,

        /// Stop after N rounds (runs until Ctrl+C when omitted)
        #[arg(short = 'n', long)]
        rounds: Option<u64>,

        /// Write the collected series as JSON on exit
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,
    },

    /// Monitor an app and serve the collected data over HTTP
    Serve {
        /// Package to monitor (defaults to the foreground app)
        #[arg(long)]
        package: Option<String>,

        /// Process id (resolved from the package when omitted)
        #[arg(long)]
        pid: Option<u32>,
    },

    /// Run collectors directly and print their results
    Sample {
        /// Package to sample
        #[arg(long)]
        package: String,

        /// Process id (resolved from the package when omitted)
        #[arg(long)]
        pid: Option<u32>,

        /// Collector to run
        #[arg(long, value_enum, default_value = "all")]
        collector: CollectorChoice,

        /// Number of iterations, one interval apart
        #[arg(short = 'n', long, default_value_t = 2)]
        iterations: usize,
    },

    /// Print the current foreground app
    Foreground {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Generate configuration files
    Config {
        /// Output file path ("-" for stdout)
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,

        /// Output format
        #[arg(long, value_enum, default_value = "yaml")]
        format: ConfigFormat,

        /// Include comments and examples
        #[arg(long)]
        commented: bool,
    },
}
