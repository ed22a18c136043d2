//! Hardware construction
//!
//! The composition root asks a [`Hardware`] for every device the node
//! configuration declares. [`LinuxHardware`] opens the real sysfs/I2C
//! devices; [`SimulatedHardware`] hands out in-memory stand-ins.

use crate::config::{AnalogConfig, ClimateConfig, LedConfig, MotionConfig};
use anyhow::{Context, Result};
use roomwatch_hal::sim::{SimAnalog, SimClimate, SimDigital};
use roomwatch_hal::{AnalogInput, BlinkLed, ClimateSensor, DigitalInput, HardwareDevice, Indicator};
use std::time::Duration;

/// Source of the devices a node is built from
pub trait Hardware {
    fn climate(&mut self, config: &ClimateConfig) -> Result<Box<dyn ClimateSensor>>;

    fn analog(&mut self, config: &AnalogConfig) -> Result<Box<dyn AnalogInput>>;

    fn motion(&mut self, config: &MotionConfig) -> Result<Box<dyn DigitalInput>>;

    /// `Ok(None)` when the hardware has no indicator
    fn indicator(&mut self, config: &LedConfig) -> Result<Option<Box<dyn Indicator>>>;
}

/// Real devices through sysfs GPIO, IIO and i2c-dev
#[derive(Debug, Default)]
pub struct LinuxHardware;

impl Hardware for LinuxHardware {
    fn climate(&mut self, config: &ClimateConfig) -> Result<Box<dyn ClimateSensor>> {
        let bus = roomwatch_hal::I2CBus::open(&config.bus)
            .with_context(|| format!("Failed to open I2C bus {}", config.bus))?;
        let mut chip = roomwatch_hal::Shtc3::new(&config.name, bus);
        // A chip that fails to initialize still gets a channel; its reads
        // report ok=false until it answers.
        if let Err(e) = chip.init() {
            tracing::warn!("Failed to initialize {}: {}", config.name, e);
        }
        Ok(Box::new(chip))
    }

    fn analog(&mut self, config: &AnalogConfig) -> Result<Box<dyn AnalogInput>> {
        let max_count = config.valid.max.clamp(0.0, u16::MAX as f64) as u16;
        let adc = roomwatch_hal::IioAdc::new(&config.name, config.iio_device, config.iio_channel, max_count)
            .with_context(|| format!("Failed to open ADC channel for {}", config.name))?;
        Ok(Box::new(adc))
    }

    fn motion(&mut self, config: &MotionConfig) -> Result<Box<dyn DigitalInput>> {
        let pir = roomwatch_hal::PirInput::new(&config.name, config.pin, config.active)
            .with_context(|| format!("Failed to open GPIO {} for {}", config.pin, config.name))?;
        Ok(Box::new(pir))
    }

    fn indicator(&mut self, config: &LedConfig) -> Result<Option<Box<dyn Indicator>>> {
        let led = roomwatch_hal::GpioLed::new("blue_led", config.pin, config.active)
            .with_context(|| format!("Failed to open LED on GPIO {}", config.pin))?;
        Ok(Some(Box::new(BlinkLed::new(
            "blue_led",
            led,
            Duration::from_millis(config.half_period_ms),
        ))))
    }
}

/// In-memory devices with noisy analog inputs and randomly toggling PIRs
#[derive(Debug, Clone)]
pub struct SimulatedHardware {
    seed: u64,
    noise: u16,
    motion_probability: f64,
}

impl Default for SimulatedHardware {
    fn default() -> Self {
        Self {
            seed: 0x5EED,
            noise: 20,
            motion_probability: 0.002,
        }
    }
}

impl SimulatedHardware {
    /// Steady inputs: no noise, no motion
    pub fn quiet() -> Self {
        Self {
            noise: 0,
            motion_probability: 0.0,
            ..Self::default()
        }
    }

    fn next_seed(&mut self) -> u64 {
        self.seed = self.seed.wrapping_add(0x9E37_79B9_7F4A_7C15);
        self.seed
    }
}

impl Hardware for SimulatedHardware {
    fn climate(&mut self, config: &ClimateConfig) -> Result<Box<dyn ClimateSensor>> {
        Ok(Box::new(SimClimate::new(&config.name, 21.5, 45.0)))
    }

    fn analog(&mut self, config: &AnalogConfig) -> Result<Box<dyn AnalogInput>> {
        let c = &config.calibration;
        let mid = ((c.in_min + c.in_max) / 2.0).clamp(0.0, u16::MAX as f64) as u16;
        let seed = self.next_seed();
        Ok(Box::new(SimAnalog::new(&config.name, mid).with_noise(self.noise, seed)))
    }

    fn motion(&mut self, config: &MotionConfig) -> Result<Box<dyn DigitalInput>> {
        let seed = self.next_seed();
        Ok(Box::new(
            SimDigital::new(&config.name, false).with_random_toggle(self.motion_probability, seed),
        ))
    }

    fn indicator(&mut self, _config: &LedConfig) -> Result<Option<Box<dyn Indicator>>> {
        Ok(None)
    }
}
