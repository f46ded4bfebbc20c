//! NoiseBuster - Sound level meter monitor
//!
//! Entry point for the monitoring service.

use anyhow::{Context, Result};
use noisebuster::config::{Config, LoggingConfig};
use noisebuster::meter::usb::{list_devices, DeviceMatch, DeviceSelector};
use noisebuster::sinks::build_collaborators;
use noisebuster::Monitor;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();

    let mut config_path: Option<PathBuf> = None;
    let mut check_only = false;
    let mut list_usb = false;
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "--version" | "-v" => {
                println!("noisebuster {}", noisebuster::VERSION);
                return Ok(());
            }
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            "--config" | "-c" => {
                if i + 1 >= args.len() {
                    eprintln!("Error: --config requires a path");
                    std::process::exit(2);
                }
                config_path = Some(PathBuf::from(&args[i + 1]));
                i += 2;
                continue;
            }
            "--check" => check_only = true,
            "--list-usb" => list_usb = true,
            arg => {
                eprintln!("Unknown argument: {}", arg);
                print_help();
                std::process::exit(2);
            }
        }
        i += 1;
    }

    let config_path = config_path.unwrap_or_else(Config::default_path);
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    let _log_guard = init_logging(&config.logging)?;
    info!(
        version = noisebuster::VERSION,
        config = %config_path.display(),
        "NoiseBuster starting"
    );

    if check_only {
        println!("{}", serde_json::to_string_pretty(&config)?);
        println!();
        println!("Configuration OK.");
        return Ok(());
    }

    if list_usb {
        return print_usb_devices(&config);
    }

    let collaborators = build_collaborators(&config)?;

    let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(1);
    ctrlc::set_handler(move || {
        let _ = shutdown_tx.try_send(());
    })
    .context("Failed to install Ctrl+C handler")?;

    println!("Monitoring started. Press Ctrl+C to stop.");

    match Monitor::new(config, collaborators).run(&shutdown_rx) {
        Ok(report) => {
            info!(lost_jobs = report.lost_jobs, "Manual interruption by user");
            println!("Done.");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Failed to start monitoring");
            eprintln!("Error: {}", e);
            eprintln!("Ensure the sound meter is connected and its ids are correct in the config.");
            std::process::exit(1);
        }
    }
}

/// Console logging plus an optional daily log file
///
/// The returned guard flushes the file writer when dropped and must live
/// until the end of `main`.
fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::from_default_env().add_directive("noisebuster=info".parse()?);

    let (file_layer, guard) = match &config.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log dir {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, "noisebuster.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .init();

    Ok(guard)
}

fn print_usb_devices(config: &Config) -> Result<()> {
    println!("Scanning for USB sound meters...");
    println!();

    let selector = DeviceSelector::from_config(&config.device)?;
    let devices = list_devices(&selector)?;
    if devices.is_empty() {
        println!("No USB devices found.");
        return Ok(());
    }

    for device in &devices {
        let status = match &device.matched {
            Some(DeviceMatch::Configured { model }) => format!("configured meter ({})", model),
            Some(DeviceMatch::UserDefined) => "configured meter (user-defined)".to_string(),
            Some(DeviceMatch::Known { model }) => format!("known meter ({})", model),
            None => "ignored".to_string(),
        };
        println!(
            "  {:04x}:{:04x}  {}",
            device.vendor_id, device.product_id, status
        );
    }
    println!();
    println!(
        "{} device(s), {} usable as a meter.",
        devices.len(),
        devices.iter().filter(|d| d.matched.is_some()).count()
    );
    Ok(())
}

fn print_help() {
    println!("Usage: noisebuster [OPTIONS]");
    println!();
    println!("Options:");
    println!("  -c, --config PATH   Config file (default: ./config.json, then the data dir)");
    println!("      --check         Validate the config, print it and exit");
    println!("      --list-usb      List visible USB devices and whether each is a known meter");
    println!("  -v, --version       Show version");
    println!("  -h, --help          Show this help");
    println!();
    println!("Logging is controlled by RUST_LOG, e.g. RUST_LOG=noisebuster=debug");
}
