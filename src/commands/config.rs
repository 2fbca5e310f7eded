//! Config command implementation.
//!
//! Generates configuration files in various formats.

use std::fs;
use std::path::PathBuf;

use crate::cli::ConfigFormat;
use crate::config::{render_config, Config};

/// Generates configuration files.
pub fn command_config(
    output: Option<PathBuf>,
    format: ConfigFormat,
    commented: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::default();
    let output = match output {
        Some(path) => path,
        None => PathBuf::from(match format {
            ConfigFormat::Yaml => "adb-perf-monitor.yaml",
            ConfigFormat::Json => "adb-perf-monitor.json",
            ConfigFormat::Toml => "adb-perf-monitor.toml",
        }),
    };

    let mut content = render_config(&config, format)?;
    // JSON has no comment syntax
    if commented && matches!(format, ConfigFormat::Yaml | ConfigFormat::Toml) {
        content = add_config_comments(content);
    }

    if output.to_string_lossy() == "-" {
        print!("{}", content);
    } else {
        fs::write(&output, content)?;
        println!("✅ Configuration written to: {}", output.display());
    }

    Ok(())
}

/// Prepends a commented reference of every key.
fn add_config_comments(body: String) -> String {
    let comments = r#"# adb-perf-monitor Configuration
# ==============================
#
# Device
# ------
# adb_path: "adb"                    # adb binary
# serial: null                       # Device serial (adb -s); null = only attached device
# command_timeout_ms: 10000          # Kill an adb shell command after this long
#
# Sampling
# --------
# interval_ms: 1000                  # Round period (minimum 500)
# max_data_points: 300               # Points kept per series (0 = unbounded)
# collector_timeout_ms: 5000         # A collector slower than this yields no data
# foreground_query_timeout_ms: 2500  # Per foreground-app query
# foreground_info_timeout_ms: 1500   # App label and pid lookups
#
# Server Configuration
# --------------------
# bind: "127.0.0.1"                  # Bind IP
# port: 9230                         # HTTP port
# enable_health: true                # Enable /health endpoint
#
# Logging
# -------
# log_level: "info"                  # off, error, warn, info, debug, trace
"#;

    format!("{comments}\n{body}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writes_commented_yaml() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("generated.yaml");

        command_config(Some(path.clone()), ConfigFormat::Yaml, true).expect("generate");

        let content = fs::read_to_string(&path).expect("read back");
        assert!(content.starts_with("# adb-perf-monitor Configuration"));
        let parsed: Config = serde_yaml::from_str(&content).expect("valid yaml");
        assert_eq!(parsed, Config::default());
    }
}
