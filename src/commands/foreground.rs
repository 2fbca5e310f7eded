//! Foreground command implementation.
//!
//! Prints the app currently in the foreground of the device.

use adb_perf_monitor::collectors::ForegroundAppCollector;
use adb_perf_monitor::sample::Sample;

use crate::config::Config;

pub async fn command_foreground(
    json: bool,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    let settings = config.monitor_settings();
    let collector = ForegroundAppCollector::with_timeouts(
        config.command_channel(),
        settings.foreground_query_timeout,
        settings.foreground_info_timeout,
    );

    let app = match collector.sample().await {
        Sample::Value(app) => app,
        Sample::NoData => return Err("No foreground app detected".into()),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&app)?);
        return Ok(());
    }

    println!("📱 {} ({})", app.app_name, app.package_name);
    println!("   ├─ Activity: {}", app.activity_name);
    println!(
        "   ├─ PID: {}",
        app.pid.map_or("unknown".to_string(), |p| p.to_string())
    );
    println!(
        "   ├─ System app: {}",
        if app.is_system_app { "yes" } else { "no" }
    );
    println!("   └─ Detected via: {} query", app.source.name());
    Ok(())
}
