//! adb-perf-monitor
//!
//! Android app performance monitor with tracing logging.
//! This is the main entry point that resolves configuration and dispatches
//! subcommands. Without a subcommand the HTTP read view is served.

mod cli;
mod commands;
mod config;
mod handlers;
mod metrics;
mod state;

use clap::Parser;
use tokio::signal;
use tracing::{info, Level};

use cli::{parse_log_level, Args, Commands, LogLevel};
use commands::{
    command_config, command_foreground, command_monitor, command_sample, command_serve,
};
use config::{resolve_config, show_config, validate_effective_config, Config};

/// Initializes tracing logging subsystem with configured log level.
fn setup_logging(config: &Config) {
    let level = config
        .log_level
        .as_deref()
        .and_then(parse_log_level)
        .unwrap_or(LogLevel::Info);

    let max_level = match level {
        LogLevel::Off => return,
        LogLevel::Error => Level::ERROR,
        LogLevel::Warn => Level::WARN,
        LogLevel::Info => Level::INFO,
        LogLevel::Debug => Level::DEBUG,
        LogLevel::Trace => Level::TRACE,
    };

    // Logs go to stderr so round lines and JSON on stdout stay clean
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(max_level)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");

    info!("Logging initialized with level: {:?}", level);
}

/// Helper function to load and validate configuration.
/// Exits the process with error code 1 if validation fails.
fn load_validated_config(args: &Args) -> Result<Config, Box<dyn std::error::Error>> {
    let config = resolve_config(args)?;
    if let Err(e) = validate_effective_config(&config) {
        eprintln!("❌ Configuration invalid: {}", e);
        std::process::exit(1);
    }
    Ok(config)
}

/// Resolves on SIGINT (Ctrl+C) or SIGTERM.
pub(crate) async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), shutting down gracefully...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down gracefully...");
        }
    }
}

/// Main application entry point.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Early config resolution for show/check modes
    if args.show_config || args.check_config {
        let config = resolve_config(&args)?;

        if args.check_config {
            if let Err(e) = validate_effective_config(&config) {
                eprintln!("❌ Configuration invalid: {}", e);
                std::process::exit(1);
            }
            println!("✅ Configuration is valid");
            return Ok(());
        }

        return show_config(&config, args.config_format);
    }

    // Config generation needs neither a device nor a valid config
    if let Some(Commands::Config {
        output,
        format,
        commented,
    }) = &args.command
    {
        return command_config(output.clone(), *format, *commented);
    }

    let config = load_validated_config(&args)?;
    setup_logging(&config);

    match args.command {
        Some(Commands::Monitor {
            package,
            pid,
            rounds,
            output,
        }) => command_monitor(package, pid, rounds, output, &config).await,

        Some(Commands::Sample {
            package,
            pid,
            collector,
            iterations,
        }) => command_sample(package, pid, collector, iterations, &config).await,

        Some(Commands::Foreground { json }) => command_foreground(json, &config).await,

        Some(Commands::Serve { package, pid }) => {
            info!("Starting adb-perf-monitor server");
            Ok(command_serve(package, pid, config).await?)
        }

        None => {
            info!("Starting adb-perf-monitor server");
            Ok(command_serve(None, None, config).await?)
        }

        Some(Commands::Config { .. }) => unreachable!("Config handled above"),
    }
}
