//! Roomwatch Environmental Monitoring Node
//!
//! Main application entry point: reads the sensors, publishes on a fixed
//! heartbeat and immediately on motion.

use anyhow::Result;
use clap::Parser;
use roomwatch::config::NodeConfig;
use roomwatch::hardware::{Hardware, LinuxHardware, SimulatedHardware};
use roomwatch::sink::{self, JsonLinesDiscovery, JsonLinesPublisher};
use roomwatch_sensors::{Discovery, TomlConfigStore};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "roomwatch")]
#[command(version)]
#[command(about = "Roomwatch environmental monitoring node", long_about = None)]
struct Args {
    /// Configuration file (default: search standard locations)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Use simulated hardware regardless of the configuration
    #[arg(long)]
    simulate: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    init_logging();

    // Load configuration
    let mut config = match &args.config {
        Some(path) => NodeConfig::load_from(path)?,
        None => NodeConfig::load()?,
    };
    if args.simulate {
        config.simulate = true;
    }

    tracing::info!("╔══════════════════════════════════════════╗");
    tracing::info!("║   Roomwatch Environmental Monitor        ║");
    tracing::info!("║   {:<38} ║", config.device.software);
    tracing::info!("╚══════════════════════════════════════════╝");
    tracing::info!("Configuration loaded from {:?}", config.config_path);

    let boot = tokio::time::Instant::now();

    // Publish sink
    let publisher = JsonLinesPublisher::new(sink::open_writer(&config.publish)?, config.device.clone());
    let discovery: Option<Box<dyn Discovery>> = if config.publish.discovery {
        Some(Box::new(JsonLinesDiscovery::new(
            sink::open_writer(&config.publish)?,
            config.device.clone(),
            &config.monitor_options().group,
        )))
    } else {
        None
    };

    // Calibration store
    let store = TomlConfigStore::new(&config.config_dir);
    tracing::info!("Calibration store at {:?}", store.dir());

    // Hardware
    let mut hardware: Box<dyn Hardware> = if config.simulate {
        tracing::info!("Using simulated hardware");
        Box::new(SimulatedHardware::default())
    } else {
        Box::new(LinuxHardware)
    };

    let mut monitor = roomwatch::build_monitor(
        &config,
        hardware.as_mut(),
        Duration::ZERO,
        Box::new(publisher),
        Box::new(store),
        discovery,
    )?;
    monitor.start(boot.elapsed());

    // Print system status
    print_system_status(&config, &monitor.channel_names());

    tracing::info!("Roomwatch is now monitoring {}", config.device.name);
    tracing::info!("Press Ctrl+C to stop, send SIGHUP to reload calibration");

    let (reload_tx, reload_rx) = tokio::sync::mpsc::channel(1);
    spawn_reload_listener(reload_tx);

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
    };
    let updates = roomwatch::run(&mut monitor, boot, config.tick(), reload_rx, shutdown).await;

    tracing::info!("Roomwatch shutdown complete after {} update(s)", updates);

    Ok(())
}

/// Forward SIGHUP to the control loop as a calibration reload request
#[cfg(unix)]
fn spawn_reload_listener(tx: tokio::sync::mpsc::Sender<()>) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = match signal(SignalKind::hangup()) {
        Ok(hangup) => hangup,
        Err(e) => {
            tracing::warn!("SIGHUP reload unavailable: {}", e);
            return;
        }
    };
    tokio::spawn(async move {
        while hangup.recv().await.is_some() {
            tracing::info!("SIGHUP received, reloading calibration");
            // A reload already queued covers this one.
            let _ = tx.try_send(());
        }
    });
}

#[cfg(not(unix))]
fn spawn_reload_listener(tx: tokio::sync::mpsc::Sender<()>) {
    drop(tx);
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,roomwatch=debug,roomwatch_hal=debug,roomwatch_sensors=debug"));

    // Published snapshots may go to stdout, so logs go to stderr.
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false))
        .init();
}

fn print_system_status(config: &NodeConfig, channels: &[&str]) {
    use sysinfo::System;

    let mut sys = System::new_all();
    sys.refresh_all();

    tracing::info!("╭─────────────── System Status ───────────────╮");
    tracing::info!("│ Hostname: {:>33} │", System::host_name().unwrap_or_default());
    tracing::info!("│ OS: {:>39} │", System::name().unwrap_or_default());
    tracing::info!("│ Kernel: {:>35} │", System::kernel_version().unwrap_or_default());
    tracing::info!("│ Memory: {:>27} MB / {} MB │",
        sys.used_memory() / 1024 / 1024,
        sys.total_memory() / 1024 / 1024);
    tracing::info!("├──────────────── Node ───────────────────────┤");
    tracing::info!("│ Device: {:>35} │", config.device.name);
    tracing::info!("│ Model: {:>36} │", format!("{} {}", config.device.manufacturer, config.device.model));
    tracing::info!("│ Channels: {:>33} │", channels.join(","));
    tracing::info!("│ Heartbeat: {:>22}s, every {}s │",
        config.schedule.initial_delay_secs, config.schedule.period_secs);
    tracing::info!("│ Tick: {:>35} ms │", config.tick_ms);
    tracing::info!("│ Hardware: {:>33} │", if config.simulate { "simulated" } else { "linux" });
    tracing::info!("╰─────────────────────────────────────────────╯");
}
