//! Roomwatch Sensor Conditioning Library
//!
//! Turns raw hardware samples into calibrated, smoothed readings and
//! publishes them on two triggers: a fixed-phase heartbeat and an immediate
//! push whenever a motion channel sees a rising edge. Both triggers run the
//! same collect-and-publish pass in [`monitor::Monitor`].

pub mod calibration;
pub mod climate;
pub mod conditioned;
pub mod monitor;
pub mod motion;
pub mod publish;
pub mod scheduler;
pub mod smoothing;
pub mod store;
pub mod variables;

use roomwatch_hal::HalError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use calibration::{CalibratedMapper, CalibrationConfig, ValidRange};
pub use climate::ClimateChannel;
pub use conditioned::{ConditionedOptions, ConditionedReading, ConditionedSensor};
pub use monitor::{Monitor, MonitorOptions, Trigger};
pub use motion::{MotionChannel, MotionEdge, MotionState};
pub use publish::{DeviceInfo, Discovery, MemoryDiscovery, MemoryPublisher, Publisher};
pub use scheduler::PeriodicScheduler;
pub use smoothing::TemporalSmoother;
pub use store::{ConfigGroup, ConfigStore, MemoryConfigStore, TomlConfigStore};
pub use variables::{Flags, Value, Variable, VariableSet};

/// Kind of physical quantity a channel measures, used for discovery
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    Temperature,
    Humidity,
    Illuminance,
    Moisture,
    Motion,
    Generic,
}

impl SensorKind {
    /// Home Assistant device class, if one applies
    pub fn device_class(&self) -> Option<&'static str> {
        match self {
            SensorKind::Temperature => Some("temperature"),
            SensorKind::Humidity => Some("humidity"),
            SensorKind::Illuminance => Some("illuminance"),
            SensorKind::Moisture => Some("moisture"),
            SensorKind::Motion => Some("motion"),
            SensorKind::Generic => None,
        }
    }

    /// Whether the value is a binary sensor rather than a measurement
    pub fn is_binary(&self) -> bool {
        matches!(self, SensorKind::Motion)
    }
}

/// A variable a channel wants announced to the discovery collaborator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryItem {
    pub variable: String,
    pub kind: SensorKind,
}

/// Outcome of one channel read, used for the per-update diagnostic line
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelStatus {
    pub name: String,
    pub ok: bool,
    pub summary: String,
}

impl std::fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{} {}", self.name, if self.ok { "T" } else { "F" }, self.summary)
    }
}

/// One physical input owned by the monitor.
///
/// Which channels a node has is decided when the monitor is built; the
/// monitor only ever talks to them through this trait.
pub trait Channel: Send {
    fn name(&self) -> &str;

    /// Called on every control-loop tick; edge-detecting channels read
    /// their input here.
    fn poll(&mut self, _now: Duration) {}

    /// Take a fresh reading and write this channel's variables into `vars`.
    ///
    /// Must not fail: a channel that cannot read reports its last values
    /// with `ok = false`.
    fn read(&mut self, now: Duration, vars: &mut VariableSet) -> ChannelStatus;

    /// Variables to announce once at startup
    fn discovery(&self) -> Vec<DiscoveryItem> {
        Vec::new()
    }

    /// Calibration of this channel, if it has one
    fn mapper(&self) -> Option<&CalibratedMapper> {
        None
    }

    fn mapper_mut(&mut self) -> Option<&mut CalibratedMapper> {
        None
    }

    /// Write this channel's settable configuration variables into `vars`
    fn config_variables(&self, _vars: &mut VariableSet) {}
}

/// Calibration and user-configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{field}: in_min and in_max must differ (both {value})")]
    EmptyDomain { field: String, value: f64 },

    #[error("{field}: {value} outside valid range [{min}, {max}]")]
    OutOfRange { field: String, value: f64, min: f64, max: f64 },

    #[error("{0}: value must be a finite number")]
    NotFinite(String),

    #[error("{field}: at most {max} decimals allowed, got {value}")]
    TooManyDecimals { field: String, value: u8, max: u8 },

    #[error("{name}: cannot parse {value:?}")]
    Parse { name: String, value: String },

    #[error("Unknown configuration field: {0}")]
    UnknownField(String),

    #[error("Smoothing time constant must be positive")]
    InvalidSigma,

    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),

    #[error("Invalid configuration group name: {0:?}")]
    InvalidGroup(String),

    #[error("Configuration I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse stored configuration: {0}")]
    Deserialize(#[from] toml::de::Error),

    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum SensorError {
    #[error("HAL error: {0}")]
    Hal(#[from] HalError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Duplicate channel name: {0}")]
    DuplicateChannel(String),
}

pub type Result<T> = std::result::Result<T, SensorError>;

/// Units used by the built-in channels
pub mod units {
    pub const CELSIUS: &str = "°C";
    pub const PERCENTAGE: &str = "%";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_status_display() {
        let status = ChannelStatus {
            name: "light".to_string(),
            ok: false,
            summary: "lr:2048 l:50.0".to_string(),
        };
        assert_eq!(status.to_string(), "light:F lr:2048 l:50.0");
    }

    #[test]
    fn test_sensor_kind_classes() {
        assert_eq!(SensorKind::Moisture.device_class(), Some("moisture"));
        assert!(SensorKind::Motion.is_binary());
        assert!(!SensorKind::Temperature.is_binary());
    }
}
