//! GPIO interface for Roomwatch HAL

use crate::led::LedOutput;
use crate::{ActiveLevel, DeviceType, DigitalInput, HalError, HardwareDevice};
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::Path;

/// GPIO direction
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Direction {
    Input,
    Output,
}

/// GPIO edge trigger mode
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Edge {
    None,
    Rising,
    Falling,
    Both,
}

/// GPIO pin state
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Level {
    Low = 0,
    High = 1,
}

impl From<bool> for Level {
    fn from(val: bool) -> Self {
        if val { Level::High } else { Level::Low }
    }
}

impl From<Level> for bool {
    fn from(level: Level) -> Self {
        level == Level::High
    }
}

impl Level {
    fn parse(raw: &str) -> Result<Self, HalError> {
        match raw.trim() {
            "0" => Ok(Level::Low),
            "1" => Ok(Level::High),
            other => Err(HalError::InvalidConfig(format!("Invalid GPIO value: {:?}", other))),
        }
    }
}

/// Sysfs GPIO controller
pub struct SysfsGpio {
    pin: u32,
    exported: bool,
}

impl SysfsGpio {
    const GPIO_PATH: &'static str = "/sys/class/gpio";

    /// Export a GPIO pin
    pub fn export(pin: u32) -> Result<Self, HalError> {
        let pin_path = format!("{}/gpio{}", Self::GPIO_PATH, pin);
        if Path::new(&pin_path).exists() {
            return Ok(Self { pin, exported: true });
        }

        let export_path = format!("{}/export", Self::GPIO_PATH);
        let mut file = OpenOptions::new()
            .write(true)
            .open(&export_path)
            .map_err(|e| HalError::DeviceNotFound(format!("{}: {}", export_path, e)))?;

        file.write_all(pin.to_string().as_bytes())?;

        // Wait for sysfs to create the directory
        std::thread::sleep(std::time::Duration::from_millis(50));

        Ok(Self { pin, exported: true })
    }

    /// Unexport GPIO pin
    pub fn unexport(&mut self) -> Result<(), HalError> {
        if !self.exported {
            return Ok(());
        }

        let unexport_path = format!("{}/unexport", Self::GPIO_PATH);
        let mut file = OpenOptions::new()
            .write(true)
            .open(&unexport_path)?;

        file.write_all(self.pin.to_string().as_bytes())?;
        self.exported = false;
        Ok(())
    }

    fn attribute_path(&self, attr: &str) -> String {
        format!("{}/gpio{}/{}", Self::GPIO_PATH, self.pin, attr)
    }

    /// Set direction
    pub fn set_direction(&self, direction: Direction) -> Result<(), HalError> {
        let mut file = OpenOptions::new()
            .write(true)
            .open(self.attribute_path("direction"))?;

        let dir_str = match direction {
            Direction::Input => "in",
            Direction::Output => "out",
        };

        file.write_all(dir_str.as_bytes())?;
        Ok(())
    }

    /// Set output value
    pub fn set_value(&self, level: Level) -> Result<(), HalError> {
        let mut file = OpenOptions::new()
            .write(true)
            .open(self.attribute_path("value"))?;

        file.write_all((level as u8).to_string().as_bytes())?;
        Ok(())
    }

    /// Get input value
    pub fn get_value(&self) -> Result<Level, HalError> {
        let mut file = File::open(self.attribute_path("value"))?;
        let mut buf = String::new();
        file.read_to_string(&mut buf)?;
        Level::parse(&buf)
    }

    /// Set edge trigger mode
    pub fn set_edge(&self, edge: Edge) -> Result<(), HalError> {
        let mut file = OpenOptions::new()
            .write(true)
            .open(self.attribute_path("edge"))?;

        let edge_str = match edge {
            Edge::None => "none",
            Edge::Rising => "rising",
            Edge::Falling => "falling",
            Edge::Both => "both",
        };

        file.write_all(edge_str.as_bytes())?;
        Ok(())
    }
}

impl Drop for SysfsGpio {
    fn drop(&mut self) {
        let _ = self.unexport();
    }
}

/// GPIO Pin wrapper with higher-level interface
pub struct GpioPin {
    gpio: SysfsGpio,
    name: String,
    direction: Direction,
}

impl GpioPin {
    /// Create new GPIO pin
    pub fn new(name: &str, pin: u32, direction: Direction) -> Result<Self, HalError> {
        let gpio = SysfsGpio::export(pin)?;
        gpio.set_direction(direction)?;

        Ok(Self {
            gpio,
            name: name.to_string(),
            direction,
        })
    }

    /// Read pin value
    pub fn read(&self) -> Result<bool, HalError> {
        Ok(self.gpio.get_value()? == Level::High)
    }

    /// Write pin value
    pub fn write(&self, value: bool) -> Result<(), HalError> {
        self.gpio.set_value(value.into())
    }
}

impl HardwareDevice for GpioPin {
    fn name(&self) -> &str {
        &self.name
    }

    fn device_type(&self) -> DeviceType {
        DeviceType::GPIO
    }

    fn init(&mut self) -> Result<(), HalError> {
        self.gpio.set_direction(self.direction)?;
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.gpio.exported
    }

    fn close(&mut self) -> Result<(), HalError> {
        self.gpio.unexport()
    }
}

/// LED wired to a GPIO output
pub struct GpioLed {
    gpio: GpioPin,
    active: ActiveLevel,
}

impl GpioLed {
    pub fn new(name: &str, pin: u32, active: ActiveLevel) -> Result<Self, HalError> {
        let gpio = GpioPin::new(name, pin, Direction::Output)?;
        let mut led = Self { gpio, active };
        led.set(false)?;
        Ok(led)
    }
}

impl LedOutput for GpioLed {
    fn set(&mut self, on: bool) -> Result<(), HalError> {
        self.gpio.write(self.active.is_active(on))
    }
}

/// PIR motion sensor input.
///
/// Reports the debounced output level of the PIR module; edge detection is
/// left to the caller, which polls once per control-loop tick.
pub struct PirInput {
    gpio: GpioPin,
    active: ActiveLevel,
}

impl PirInput {
    pub fn new(name: &str, pin: u32, active: ActiveLevel) -> Result<Self, HalError> {
        let gpio = GpioPin::new(name, pin, Direction::Input)?;
        gpio.gpio.set_edge(Edge::Both)?;
        Ok(Self { gpio, active })
    }
}

impl DigitalInput for PirInput {
    fn name(&self) -> &str {
        &self.gpio.name
    }

    fn read_level(&mut self) -> Result<bool, HalError> {
        Ok(self.active.is_active(self.gpio.read()?))
    }
}
