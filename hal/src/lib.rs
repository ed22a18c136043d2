//! Roomwatch Hardware Abstraction Layer
//!
//! Provides the raw read primitives the monitoring node needs from its
//! hardware: analog counts, digital levels, a temperature/humidity chip and
//! an indicator LED.
//!
//! # Modules
//!
//! - [`gpio`] - sysfs GPIO for PIR motion sensors and the indicator LED
//! - [`iio`] - Linux IIO ADC channels for light and leak sensors
//! - [`i2c`] - I2C bus access
//! - [`shtc3`] - SHTC3 temperature/humidity sensor
//! - [`led`] - non-blocking blink patterns
//! - [`sim`] - simulated devices for tests and bench runs
//!
//! # Example
//!
//! ```rust
//! use roomwatch_hal::{sim::SimAnalog, AnalogInput};
//!
//! let mut light = SimAnalog::new("light", 2048);
//! assert_eq!(light.read_raw().unwrap(), 2048);
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[cfg(feature = "gpio")]
pub mod gpio;
#[cfg(feature = "i2c")]
pub mod i2c;
#[cfg(feature = "i2c")]
pub mod shtc3;
#[cfg(feature = "iio")]
pub mod iio;
pub mod led;
pub mod sim;

// Re-exports for convenience
#[cfg(feature = "gpio")]
pub use gpio::{GpioPin, GpioLed, Direction, Level, PirInput};
#[cfg(feature = "i2c")]
pub use i2c::I2CBus;
#[cfg(feature = "i2c")]
pub use shtc3::Shtc3;
#[cfg(feature = "iio")]
pub use iio::IioAdc;
pub use led::{BlinkLed, LedOutput};

/// Hardware device trait
pub trait HardwareDevice: Send {
    /// Device name
    fn name(&self) -> &str;

    /// Device type
    fn device_type(&self) -> DeviceType;

    /// Initialize the device
    fn init(&mut self) -> Result<(), HalError>;

    /// Check if device is ready
    fn is_ready(&self) -> bool;

    /// Close the device
    fn close(&mut self) -> Result<(), HalError>;
}

/// Analog input returning unconverted ADC counts.
pub trait AnalogInput: Send {
    fn name(&self) -> &str;

    /// Read one raw sample.
    fn read_raw(&mut self) -> Result<u16, HalError>;
}

/// Digital input; `true` means the input is active (e.g. motion present).
pub trait DigitalInput: Send {
    fn name(&self) -> &str;

    fn read_level(&mut self) -> Result<bool, HalError>;
}

/// Combined temperature/humidity measurement
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClimateReading {
    /// Degrees Celsius
    pub temperature: f64,
    /// Relative humidity, percent
    pub humidity: f64,
}

/// Temperature/humidity sensor
pub trait ClimateSensor: Send {
    fn name(&self) -> &str;

    fn measure(&mut self) -> Result<ClimateReading, HalError>;
}

/// Visual signaling output.
///
/// `blink` must not block; the pattern advances on `tick`.
pub trait Indicator: Send {
    /// Queue `count` blinks.
    fn blink(&mut self, count: u32);

    /// Advance the pattern to monotonic time `now`.
    fn tick(&mut self, now: Duration);
}

/// Which electrical level counts as "active" for an input or output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ActiveLevel {
    #[default]
    High,
    Low,
}

impl ActiveLevel {
    /// Translate an electrical level into a logical state.
    pub fn is_active(self, high: bool) -> bool {
        match self {
            ActiveLevel::High => high,
            ActiveLevel::Low => !high,
        }
    }
}

/// Device types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceType {
    I2C,
    GPIO,
    ADC,
}

/// HAL Error types
#[derive(Debug, thiserror::Error)]
pub enum HalError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Communication error: {0}")]
    CommunicationError(String),

    #[error("CRC mismatch: expected 0x{expected:02X}, got 0x{actual:02X}")]
    CrcMismatch { expected: u8, actual: u8 },

    #[error("Invalid reading from {0}: {1}")]
    InvalidReading(String, String),

    #[error("Timeout")]
    Timeout,
}
