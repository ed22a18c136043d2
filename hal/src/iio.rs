//! Linux IIO ADC channels

use crate::{AnalogInput, DeviceType, HalError, HardwareDevice};
use std::fs;
use std::path::PathBuf;

/// One voltage channel of an IIO ADC, read through sysfs
pub struct IioAdc {
    name: String,
    path: PathBuf,
    max_count: u16,
}

impl IioAdc {
    const IIO_PATH: &'static str = "/sys/bus/iio/devices";

    /// Open `in_voltage<channel>_raw` on `iio:device<device>`.
    ///
    /// `max_count` is the largest count the converter can report; larger
    /// values are treated as read failures.
    pub fn new(name: &str, device: u32, channel: u32, max_count: u16) -> Result<Self, HalError> {
        let path = PathBuf::from(format!(
            "{}/iio:device{}/in_voltage{}_raw",
            Self::IIO_PATH,
            device,
            channel
        ));
        Self::at_path(name, path, max_count)
    }

    /// Use an explicit sysfs attribute path
    pub fn at_path(name: &str, path: PathBuf, max_count: u16) -> Result<Self, HalError> {
        if !path.exists() {
            return Err(HalError::DeviceNotFound(path.display().to_string()));
        }
        Ok(Self {
            name: name.to_string(),
            path,
            max_count,
        })
    }

    fn parse(&self, text: &str) -> Result<u16, HalError> {
        let count: u32 = text
            .trim()
            .parse()
            .map_err(|_| HalError::InvalidReading(self.name.clone(), format!("{:?}", text.trim())))?;

        if count > self.max_count as u32 {
            return Err(HalError::InvalidReading(
                self.name.clone(),
                format!("count {} above converter maximum {}", count, self.max_count),
            ));
        }
        Ok(count as u16)
    }
}

impl HardwareDevice for IioAdc {
    fn name(&self) -> &str {
        &self.name
    }

    fn device_type(&self) -> DeviceType {
        DeviceType::ADC
    }

    fn init(&mut self) -> Result<(), HalError> {
        self.read_raw().map(|_| ())
    }

    fn is_ready(&self) -> bool {
        self.path.exists()
    }

    fn close(&mut self) -> Result<(), HalError> {
        Ok(())
    }
}

impl AnalogInput for IioAdc {
    fn name(&self) -> &str {
        &self.name
    }

    fn read_raw(&mut self) -> Result<u16, HalError> {
        let text = fs::read_to_string(&self.path)?;
        self.parse(&text)
    }
}
