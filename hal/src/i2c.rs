//! I2C interface for Roomwatch HAL

use crate::HalError;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};

/// ioctl request selecting the target address on a Linux i2c-dev bus
#[cfg(target_os = "linux")]
const I2C_SLAVE: libc::c_ulong = 0x0703;

/// Command/response transfers with an addressed I2C device
pub trait I2cTransfer: Send {
    /// Write a 16-bit command word, most significant byte first
    fn write_command(&mut self, addr: u8, command: u16) -> Result<(), HalError>;

    /// Read exactly `buf.len()` bytes
    fn read_exact(&mut self, addr: u8, buf: &mut [u8]) -> Result<(), HalError>;
}

/// I2C Bus wrapper
pub struct I2CBus {
    path: String,
    file: File,
    address: Option<u8>,
}

impl I2CBus {
    /// Open I2C bus
    pub fn open(path: &str) -> Result<Self, HalError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| HalError::DeviceNotFound(format!("{}: {}", path, e)))?;

        Ok(Self {
            path: path.to_string(),
            file,
            address: None,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Set slave address
    pub fn set_slave(&mut self, addr: u8) -> Result<(), HalError> {
        if self.address == Some(addr) {
            return Ok(());
        }

        #[cfg(target_os = "linux")]
        {
            use std::os::unix::io::AsRawFd;

            // SAFETY: the descriptor is owned by `self.file` and stays open for the call.
            let ret = unsafe { libc::ioctl(self.file.as_raw_fd(), I2C_SLAVE, addr as libc::c_ulong) };
            if ret < 0 {
                return Err(HalError::CommunicationError(
                    format!("Failed to set I2C slave address 0x{:02X} on {}", addr, self.path)
                ));
            }
            self.address = Some(addr);
            Ok(())
        }

        #[cfg(not(target_os = "linux"))]
        {
            Err(HalError::CommunicationError(
                format!("I2C address selection unsupported on this platform (0x{:02X})", addr)
            ))
        }
    }

    /// Read bytes from the selected device
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, HalError> {
        self.file
            .read(buf)
            .map_err(|e| HalError::CommunicationError(format!("I2C read failed: {}", e)))
    }

    /// Write bytes to the selected device
    pub fn write(&mut self, buf: &[u8]) -> Result<usize, HalError> {
        self.file
            .write(buf)
            .map_err(|e| HalError::CommunicationError(format!("I2C write failed: {}", e)))
    }
}

impl I2cTransfer for I2CBus {
    fn write_command(&mut self, addr: u8, command: u16) -> Result<(), HalError> {
        self.set_slave(addr)?;
        let written = self.write(&command.to_be_bytes())?;
        if written != 2 {
            return Err(HalError::CommunicationError(
                format!("Short I2C write to 0x{:02X}: {} of 2 bytes", addr, written)
            ));
        }
        Ok(())
    }

    fn read_exact(&mut self, addr: u8, buf: &mut [u8]) -> Result<(), HalError> {
        self.set_slave(addr)?;
        let read = self.read(buf)?;
        if read != buf.len() {
            return Err(HalError::CommunicationError(
                format!("Short I2C read from 0x{:02X}: {} of {} bytes", addr, read, buf.len())
            ));
        }
        Ok(())
    }
}
