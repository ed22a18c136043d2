// Node Configuration

use anyhow::{Context, Result};
use roomwatch_hal::ActiveLevel;
use roomwatch_sensors::{
    CalibrationConfig, ConditionedOptions, DeviceInfo, MonitorOptions, SensorKind, ValidRange,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Run against simulated hardware
    #[serde(default)]
    pub simulate: bool,

    /// Directory holding stored calibration groups
    #[serde(default = "default_config_dir")]
    pub config_dir: String,

    /// Control loop tick in milliseconds
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,

    /// Identity announced to home-automation controllers
    #[serde(default)]
    pub device: DeviceInfo,

    #[serde(default)]
    pub schedule: ScheduleConfig,

    #[serde(default)]
    pub publish: PublishConfig,

    /// Temperature/humidity chip
    #[serde(default)]
    pub climate: ClimateConfig,

    /// Conditioned analog channels, in publish order
    #[serde(default = "default_analog")]
    pub analog: Vec<AnalogConfig>,

    /// PIR inputs; the first one blinks the indicator once, the second twice
    #[serde(default = "default_motion")]
    pub motion: Vec<MotionConfig>,

    /// Indicator LED
    #[serde(default)]
    pub led: LedConfig,

    /// Path to config file (for reference)
    #[serde(skip)]
    pub config_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Seconds from startup to the first heartbeat update
    #[serde(default = "default_initial_delay")]
    pub initial_delay_secs: u64,
    /// Seconds between heartbeat updates
    #[serde(default = "default_period")]
    pub period_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            initial_delay_secs: default_initial_delay(),
            period_secs: default_period(),
        }
    }
}

/// Where published snapshots go
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PublishSink {
    #[default]
    Stdout,
    File { path: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishConfig {
    #[serde(default)]
    pub sink: PublishSink,
    /// Emit discovery payloads at startup
    #[serde(default = "default_true")]
    pub discovery: bool,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            sink: PublishSink::default(),
            discovery: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClimateConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_climate_name")]
    pub name: String,
    #[serde(default = "default_i2c_bus")]
    pub bus: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalogConfig {
    pub name: String,
    #[serde(default)]
    pub iio_device: u32,
    pub iio_channel: u32,
    #[serde(default)]
    pub units: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_kind")]
    pub kind: SensorKind,
    /// Smoothing time constant in seconds
    pub sigma_secs: f64,
    #[serde(default = "default_filter_decimals")]
    pub filter_decimals: u8,
    /// Raw counts the ADC can produce
    #[serde(default)]
    pub valid: ValidRange,
    /// Calibration used until one is stored
    pub calibration: CalibrationConfig,
}

impl AnalogConfig {
    fn from_options(options: ConditionedOptions, iio_channel: u32) -> Self {
        Self {
            name: options.name,
            iio_device: 0,
            iio_channel,
            units: options.units,
            description: options.description,
            kind: options.kind,
            sigma_secs: options.sigma.as_secs_f64(),
            filter_decimals: options.filter_decimals,
            valid: options.valid,
            calibration: options.calibration,
        }
    }

    pub fn to_options(&self) -> Result<ConditionedOptions> {
        let sigma = Duration::try_from_secs_f64(self.sigma_secs)
            .with_context(|| format!("{}: invalid sigma_secs {}", self.name, self.sigma_secs))?;
        Ok(ConditionedOptions {
            name: self.name.clone(),
            units: self.units.clone(),
            description: self.description.clone(),
            kind: self.kind,
            calibration: self.calibration,
            valid: self.valid,
            sigma,
            filter_decimals: self.filter_decimals,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotionConfig {
    pub name: String,
    /// GPIO line number
    pub pin: u32,
    #[serde(default)]
    pub active: ActiveLevel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_led_pin")]
    pub pin: u32,
    #[serde(default)]
    pub active: ActiveLevel,
    #[serde(default = "default_half_period")]
    pub half_period_ms: u64,
}

fn default_config_dir() -> String { "/var/lib/roomwatch".to_string() }
fn default_tick_ms() -> u64 { 100 }
fn default_initial_delay() -> u64 { 10 }
fn default_period() -> u64 { 60 }
fn default_true() -> bool { true }
fn default_climate_name() -> String { "shtc3".to_string() }
fn default_i2c_bus() -> String { "/dev/i2c-1".to_string() }
fn default_kind() -> SensorKind { SensorKind::Generic }
fn default_filter_decimals() -> u8 { 1 }
fn default_half_period() -> u64 { 500 }
fn default_led_pin() -> u32 { 27 }

impl Default for ClimateConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            name: default_climate_name(),
            bus: default_i2c_bus(),
        }
    }
}

impl Default for LedConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            pin: default_led_pin(),
            active: ActiveLevel::High,
            half_period_ms: default_half_period(),
        }
    }
}

fn default_analog() -> Vec<AnalogConfig> {
    vec![
        AnalogConfig::from_options(ConditionedOptions::light(), 0),
        AnalogConfig::from_options(ConditionedOptions::leak(), 1),
    ]
}

fn default_motion() -> Vec<MotionConfig> {
    vec![
        MotionConfig { name: "motion".to_string(), pin: 25, active: ActiveLevel::High },
        MotionConfig { name: "motion2".to_string(), pin: 23, active: ActiveLevel::High },
    ]
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            simulate: false,
            config_dir: default_config_dir(),
            tick_ms: default_tick_ms(),
            device: DeviceInfo::default(),
            schedule: ScheduleConfig::default(),
            publish: PublishConfig::default(),
            climate: ClimateConfig::default(),
            analog: default_analog(),
            motion: default_motion(),
            led: LedConfig::default(),
            config_path: PathBuf::new(),
        }
    }
}

impl NodeConfig {
    /// Load configuration from standard paths
    pub fn load() -> Result<Self> {
        let config_paths = [
            PathBuf::from("/etc/roomwatch/config.toml"),
            dirs::config_dir()
                .map(|p| p.join("roomwatch/config.toml"))
                .unwrap_or_default(),
            PathBuf::from("./config.toml"),
        ];

        for path in &config_paths {
            if path.exists() {
                return Self::load_from(path);
            }
        }

        tracing::warn!("No configuration file found, using defaults");
        Ok(Self::default())
    }

    /// Load configuration from specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {:?}", path))?;
        let mut config: NodeConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {:?}", path))?;
        config.config_path = path.to_path_buf();
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject configurations the monitor could not run with
    pub fn validate(&self) -> Result<()> {
        if self.tick_ms == 0 {
            anyhow::bail!("tick_ms must be positive");
        }
        if self.schedule.period_secs == 0 {
            anyhow::bail!("schedule.period_secs must be positive");
        }

        let mut names: Vec<&str> = self.analog.iter().map(|a| a.name.as_str()).collect();
        names.extend(self.motion.iter().map(|m| m.name.as_str()));
        if self.climate.enabled {
            names.push(self.climate.name.as_str());
        }
        for (i, name) in names.iter().enumerate() {
            if names[..i].contains(name) {
                anyhow::bail!("Channel name {:?} used more than once", name);
            }
        }

        for analog in &self.analog {
            if !(analog.sigma_secs > 0.0) {
                anyhow::bail!("{}: sigma_secs must be positive", analog.name);
            }
            analog
                .calibration
                .validate(&analog.name, analog.valid)
                .with_context(|| format!("Invalid default calibration for {}", analog.name))?;
            analog.to_options()?;
        }
        Ok(())
    }

    pub fn monitor_options(&self) -> MonitorOptions {
        MonitorOptions {
            initial_delay: Duration::from_secs(self.schedule.initial_delay_secs),
            period: Duration::from_secs(self.schedule.period_secs),
            ..MonitorOptions::default()
        }
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    /// Generate example configuration
    pub fn example() -> String {
        let config = Self {
            device: DeviceInfo {
                name: "rooml33".to_string(),
                ..DeviceInfo::default()
            },
            publish: PublishConfig {
                sink: PublishSink::File { path: "/var/log/roomwatch/room.jsonl".to_string() },
                discovery: true,
            },
            ..Default::default()
        };

        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Helper for getting config directories
mod dirs {
    use std::path::PathBuf;

    pub fn config_dir() -> Option<PathBuf> {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| {
                std::env::var("HOME")
                    .ok()
                    .map(|h| PathBuf::from(h).join(".config"))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_room_layout() {
        let config = NodeConfig::default();
        let names: Vec<&str> = config.analog.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["light", "leak"]);
        assert_eq!(config.motion[1].name, "motion2");
        assert_eq!(config.schedule, ScheduleConfig { initial_delay_secs: 10, period_secs: 60 });
        assert_eq!(config.led.half_period_ms, 500);
        assert!(config.climate.enabled);
        config.validate().unwrap();
    }

    #[test]
    fn test_example_roundtrips() {
        let example = NodeConfig::example();
        let parsed: NodeConfig = toml::from_str(&example).unwrap();
        assert_eq!(parsed.device.name, "rooml33");
        assert_eq!(parsed.analog, NodeConfig::default().analog);
        assert!(matches!(parsed.publish.sink, PublishSink::File { .. }));
    }

    #[test]
    fn test_minimal_file_uses_defaults() {
        let config: NodeConfig = toml::from_str("simulate = true\n").unwrap();
        assert!(config.simulate);
        assert_eq!(config.tick_ms, 100);
        assert_eq!(config.analog.len(), 2);
        assert_eq!(config.publish.sink, PublishSink::Stdout);
    }

    #[test]
    fn test_partial_analog_list() {
        let content = r#"
            motion = []

            [climate]
            bus = "/dev/i2c-3"

            [led]
            enabled = false

            [[analog]]
            name = "soil"
            iio_channel = 2
            units = "%"
            kind = "moisture"
            sigma_secs = 300.0

            [analog.calibration]
            in_min = 3000.0
            in_max = 1200.0
            out_min = 0.0
            out_max = 100.0
        "#;
        let config: NodeConfig = toml::from_str(content).unwrap();
        config.validate().unwrap();

        let soil = config.analog[0].to_options().unwrap();
        assert_eq!(soil.sigma, Duration::from_secs(300));
        assert_eq!(soil.kind, SensorKind::Moisture);
        assert_eq!(soil.valid, ValidRange::ADC_12BIT);
        assert_eq!(soil.calibration.decimals, 0);
        assert!(config.motion.is_empty());
        assert_eq!(config.climate.bus, "/dev/i2c-3");
        assert_eq!(config.climate.name, "shtc3");
        assert!(!config.led.enabled);
    }

    #[test]
    fn test_validation_errors() {
        let mut config = NodeConfig::default();
        config.motion[1].name = "light".to_string();
        assert!(config.validate().is_err());

        let mut config = NodeConfig::default();
        config.analog[1].calibration.in_min = config.analog[1].calibration.in_max;
        assert!(config.validate().is_err());

        let mut config = NodeConfig::default();
        config.schedule.period_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("roomwatch-config-{}.toml", std::process::id()));
        let mut config = NodeConfig::default();
        config.tick_ms = 250;
        config.save(&path).unwrap();

        let loaded = NodeConfig::load_from(&path).unwrap();
        assert_eq!(loaded.tick(), Duration::from_millis(250));
        assert_eq!(loaded.config_path, path);
        std::fs::remove_file(&path).unwrap();
    }
}
