//! Roomwatch CLI Tool
//!
//! Command-line interface for inspecting a node and editing its stored
//! calibration.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use roomwatch::config::NodeConfig;
use roomwatch::hardware::{Hardware, LinuxHardware, SimulatedHardware};
use roomwatch_sensors::{MemoryPublisher, Monitor, TomlConfigStore};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "roomwatch-cli")]
#[command(author = "Roomwatch Team")]
#[command(version)]
#[command(about = "Roomwatch environmental monitoring node CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (default: search standard locations)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Read every sensor once and print the values
    Status {
        /// Use simulated hardware
        #[arg(long)]
        simulate: bool,

        /// Output format (json, table)
        #[arg(short, long, default_value = "table")]
        format: String,
    },

    /// Show the calibration settings
    Show,

    /// Change calibration settings, e.g. `set leak_in_min=20 leak_in_max=3900`
    Set {
        /// `<channel>_<field>=<value>` pairs
        #[arg(required = true)]
        values: Vec<String>,
    },

    /// Map a raw ADC count through a channel's calibration
    Map {
        /// Channel name
        channel: String,

        /// Raw count
        raw: f64,
    },

    /// Generate sample configuration
    Config {
        /// Output path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// System information
    Info,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => NodeConfig::load_from(path)?,
        None => NodeConfig::load()?,
    };

    match cli.command {
        Commands::Status { simulate, format } => {
            show_status(&config, simulate, &format)?;
        }

        Commands::Show => {
            show_calibration(&config)?;
        }

        Commands::Set { values } => {
            set_calibration(&config, &values)?;
        }

        Commands::Map { channel, raw } => {
            map_raw(&config, &channel, raw)?;
        }

        Commands::Config { output } => {
            generate_config(output)?;
        }

        Commands::Info => {
            show_info(&config)?;
        }
    }

    Ok(())
}

/// Monitor over the configured channels, using the on-disk calibration store
fn open_monitor(config: &NodeConfig, hardware: &mut dyn Hardware) -> Result<Monitor> {
    let mut monitor = roomwatch::build_monitor(
        config,
        hardware,
        Duration::ZERO,
        Box::new(MemoryPublisher::new()),
        Box::new(TomlConfigStore::new(&config.config_dir)),
        None,
    )?;
    monitor.start(Duration::ZERO);
    Ok(monitor)
}

/// Monitor for calibration work; never touches the hardware
fn offline_monitor(config: &NodeConfig) -> Result<Monitor> {
    open_monitor(config, &mut SimulatedHardware::quiet())
}

fn show_status(config: &NodeConfig, simulate: bool, format: &str) -> Result<()> {
    let mut hardware: Box<dyn Hardware> = if simulate || config.simulate {
        Box::new(SimulatedHardware::default())
    } else {
        Box::new(LinuxHardware)
    };
    let mut monitor = open_monitor(config, hardware.as_mut())?;
    let statuses = monitor.read_sensors(Duration::ZERO);

    match format {
        "json" => {
            let json = serde_json::to_string_pretty(&monitor.vars().to_json())?;
            println!("{}", json);
        }
        _ => {
            println!("╭──────────────────────────────────────────────────────────────╮");
            println!("│                     Sensor Status                            │");
            println!("╰──────────────────────────────────────────────────────────────╯\n");
            print!("{}", monitor.vars().render_table());

            println!("\nChannels:");
            for status in &statuses {
                println!("  {:10} {} {}", status.name, if status.ok { "✓" } else { "✗" }, status.summary);
            }
        }
    }

    Ok(())
}

fn show_calibration(config: &NodeConfig) -> Result<()> {
    let monitor = offline_monitor(config)?;
    print!("{}", monitor.config_vars().render_table());
    println!("\nStored in: {}", config.config_dir);
    Ok(())
}

fn parse_assignments(values: &[String]) -> Result<BTreeMap<String, String>> {
    let mut form = BTreeMap::new();
    for value in values {
        let (key, val) = value
            .split_once('=')
            .with_context(|| format!("Expected KEY=VALUE, got {:?}", value))?;
        form.insert(key.trim().to_string(), val.trim().to_string());
    }
    Ok(form)
}

fn set_calibration(config: &NodeConfig, values: &[String]) -> Result<()> {
    let form = parse_assignments(values)?;
    let mut monitor = offline_monitor(config)?;

    let changed = monitor.submit_config(&form)?;
    if changed.is_empty() {
        println!("No changes.");
    } else {
        println!("Updated: {}", changed.join(", "));
        print!("{}", monitor.config_vars().render_table());
        println!("\nA running roomwatch applies this on SIGHUP (e.g. `pkill -HUP roomwatch`).");
    }
    Ok(())
}

fn map_raw(config: &NodeConfig, channel: &str, raw: f64) -> Result<()> {
    let monitor = offline_monitor(config)?;
    let mapper = monitor
        .mapper(channel)
        .with_context(|| format!("No calibrated channel named {:?}", channel))?;

    let c = mapper.config();
    println!(
        "{}: {} -> {:.*}  (in {}..{}, out {}..{})",
        channel,
        raw,
        c.decimals as usize,
        mapper.map(raw),
        c.in_min,
        c.in_max,
        c.out_min,
        c.out_max
    );
    Ok(())
}

fn generate_config(output: Option<PathBuf>) -> Result<()> {
    let example = format!(
        "# Roomwatch Configuration File\n\
         #\n\
         # Copy this file to /etc/roomwatch/config.toml or ~/.config/roomwatch/config.toml\n\n{}",
        NodeConfig::example()
    );

    if let Some(path) = output {
        std::fs::write(&path, example)?;
        println!("Configuration written to: {:?}", path);
    } else {
        println!("{}", example);
    }

    Ok(())
}

fn show_info(config: &NodeConfig) -> Result<()> {
    use sysinfo::System;

    let mut sys = System::new_all();
    sys.refresh_all();

    println!("╭──────────────────────────────────────────────────────────────╮");
    println!("│             Roomwatch System Information                     │");
    println!("╰──────────────────────────────────────────────────────────────╯\n");

    println!("System:");
    println!("  Hostname: {}", System::host_name().unwrap_or_default());
    println!("  OS: {} {}",
        System::name().unwrap_or_default(),
        System::os_version().unwrap_or_default());
    println!("  Kernel: {}", System::kernel_version().unwrap_or_default());

    println!("\nHardware:");
    println!("  CPU: {}", sys.cpus().first().map(|c| c.brand()).unwrap_or("Unknown"));
    println!("  Cores: {}", sys.cpus().len());
    println!("  Memory: {} MB total, {} MB used",
        sys.total_memory() / 1024 / 1024,
        sys.used_memory() / 1024 / 1024);

    println!("\nNode:");
    println!("  Device: {}", config.device.name);
    println!("  Manufacturer: {}", config.device.manufacturer);
    println!("  Model: {}", config.device.model);
    println!("  Software: {}", config.device.software);

    println!("\nHardware Availability:");
    println!("  I2C: {}", if std::path::Path::new(&config.climate.bus).exists() { "✓" } else { "✗" });
    println!("  GPIO: {}", if std::path::Path::new("/sys/class/gpio").exists() { "✓" } else { "✗" });
    println!("  IIO: {}", if std::path::Path::new("/sys/bus/iio/devices").exists() { "✓" } else { "✗" });

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_assignments() {
        let values = vec!["leak_in_min=20".to_string(), " light_decimals = 2 ".to_string()];
        let form = parse_assignments(&values).unwrap();
        assert_eq!(form.get("leak_in_min").map(String::as_str), Some("20"));
        assert_eq!(form.get("light_decimals").map(String::as_str), Some("2"));
    }

    #[test]
    fn test_parse_assignments_requires_equals() {
        assert!(parse_assignments(&["leak_in_min".to_string()]).is_err());
    }

    #[test]
    fn test_set_persists_to_store() {
        let dir = std::env::temp_dir().join(format!("roomwatch-cli-{}", std::process::id()));
        let config = NodeConfig {
            config_dir: dir.to_string_lossy().into_owned(),
            ..NodeConfig::default()
        };

        set_calibration(&config, &["leak_in_max=3900".to_string()]).unwrap();
        let monitor = offline_monitor(&config).unwrap();
        assert_eq!(monitor.mapper("leak").unwrap().config().in_max, 3900.0);
        assert!(dir.join("room_cfg.toml").exists());

        assert!(set_calibration(&config, &["leak_in_max=9".to_string()]).is_err());
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_set_reaches_running_node_on_reload() {
        let dir = std::env::temp_dir().join(format!("roomwatch-cli-reload-{}", std::process::id()));
        let config = NodeConfig {
            config_dir: dir.to_string_lossy().into_owned(),
            ..NodeConfig::default()
        };
        let mut daemon = offline_monitor(&config).unwrap();

        set_calibration(&config, &["leak_in_max=3900".to_string()]).unwrap();
        assert_eq!(daemon.mapper("leak").unwrap().config().in_max, 4095.0);

        assert_eq!(daemon.reload_config().unwrap(), vec!["leak"]);
        assert_eq!(daemon.mapper("leak").unwrap().config().in_max, 3900.0);
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
