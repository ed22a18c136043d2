//! SHTC3 temperature/humidity sensor
//!
//! Each measurement wakes the chip, triggers a normal-power reading with
//! temperature first, verifies both CRC bytes and puts the chip back to
//! sleep.

use crate::i2c::I2cTransfer;
use crate::{ClimateReading, ClimateSensor, DeviceType, HalError, HardwareDevice};
use std::time::Duration;

/// Fixed bus address of the SHTC3
pub const SHTC3_ADDRESS: u8 = 0x70;

const CMD_WAKEUP: u16 = 0x3517;
const CMD_SLEEP: u16 = 0xB098;
const CMD_SOFT_RESET: u16 = 0x805D;
const CMD_READ_ID: u16 = 0xEFC8;
const CMD_MEASURE_T_FIRST: u16 = 0x7866;

const WAKEUP_DELAY: Duration = Duration::from_micros(240);
const MEASURE_DELAY: Duration = Duration::from_millis(13);

/// Product code bits of the ID register
const ID_MASK: u16 = 0x083F;
const ID_SHTC3: u16 = 0x0807;

/// CRC-8 used by Sensirion parts (polynomial 0x31, init 0xFF)
pub fn crc8(data: &[u8]) -> u8 {
    let mut crc: u8 = 0xFF;
    for byte in data {
        crc ^= byte;
        for _ in 0..8 {
            crc = if crc & 0x80 != 0 { (crc << 1) ^ 0x31 } else { crc << 1 };
        }
    }
    crc
}

fn checked_word(bytes: &[u8]) -> Result<u16, HalError> {
    let expected = crc8(&bytes[..2]);
    if expected != bytes[2] {
        return Err(HalError::CrcMismatch { expected, actual: bytes[2] });
    }
    Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
}

/// Convert the six measurement bytes (T, CRC, RH, CRC) into physical units
pub fn decode_measurement(buf: &[u8; 6]) -> Result<ClimateReading, HalError> {
    let raw_t = checked_word(&buf[0..3])? as f64;
    let raw_rh = checked_word(&buf[3..6])? as f64;

    Ok(ClimateReading {
        temperature: -45.0 + 175.0 * raw_t / 65536.0,
        humidity: 100.0 * raw_rh / 65536.0,
    })
}

/// SHTC3 on an I2C bus
pub struct Shtc3<B: I2cTransfer> {
    name: String,
    bus: B,
    ready: bool,
}

impl<B: I2cTransfer> Shtc3<B> {
    pub fn new(name: &str, bus: B) -> Self {
        Self {
            name: name.to_string(),
            bus,
            ready: false,
        }
    }

    fn command(&mut self, command: u16) -> Result<(), HalError> {
        self.bus.write_command(SHTC3_ADDRESS, command)
    }

    /// Read and verify the product ID register
    pub fn read_id(&mut self) -> Result<u16, HalError> {
        self.command(CMD_READ_ID)?;
        let mut buf = [0u8; 3];
        self.bus.read_exact(SHTC3_ADDRESS, &mut buf)?;
        checked_word(&buf)
    }

    fn measure_once(&mut self) -> Result<ClimateReading, HalError> {
        self.command(CMD_WAKEUP)?;
        std::thread::sleep(WAKEUP_DELAY);

        self.command(CMD_MEASURE_T_FIRST)?;
        std::thread::sleep(MEASURE_DELAY);

        let mut buf = [0u8; 6];
        self.bus.read_exact(SHTC3_ADDRESS, &mut buf)?;
        decode_measurement(&buf)
    }
}

impl<B: I2cTransfer> HardwareDevice for Shtc3<B> {
    fn name(&self) -> &str {
        &self.name
    }

    fn device_type(&self) -> DeviceType {
        DeviceType::I2C
    }

    fn init(&mut self) -> Result<(), HalError> {
        self.command(CMD_WAKEUP)?;
        std::thread::sleep(WAKEUP_DELAY);
        self.command(CMD_SOFT_RESET)?;
        std::thread::sleep(WAKEUP_DELAY);

        let id = self.read_id()?;
        if id & ID_MASK != ID_SHTC3 {
            return Err(HalError::DeviceNotFound(format!("{}: unexpected ID 0x{:04X}", self.name, id)));
        }

        self.command(CMD_SLEEP)?;
        self.ready = true;
        tracing::info!("SHTC3 {} ready (ID 0x{:04X})", self.name, id);
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.ready
    }

    fn close(&mut self) -> Result<(), HalError> {
        self.ready = false;
        self.command(CMD_SLEEP)
    }
}

impl<B: I2cTransfer> ClimateSensor for Shtc3<B> {
    fn name(&self) -> &str {
        &self.name
    }

    fn measure(&mut self) -> Result<ClimateReading, HalError> {
        let result = self.measure_once();
        // The chip must go back to sleep even after a failed read.
        if let Err(e) = self.command(CMD_SLEEP) {
            tracing::debug!("SHTC3 {} sleep failed: {}", self.name, e);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Bus that records commands and replays canned responses
    #[derive(Default)]
    struct FakeBus {
        commands: Vec<u16>,
        responses: VecDeque<Vec<u8>>,
        nack: bool,
    }

    impl I2cTransfer for FakeBus {
        fn write_command(&mut self, addr: u8, command: u16) -> Result<(), HalError> {
            assert_eq!(addr, SHTC3_ADDRESS);
            if self.nack {
                return Err(HalError::CommunicationError("NACK".to_string()));
            }
            self.commands.push(command);
            Ok(())
        }

        fn read_exact(&mut self, _addr: u8, buf: &mut [u8]) -> Result<(), HalError> {
            let data = self.responses.pop_front().ok_or(HalError::Timeout)?;
            buf.copy_from_slice(&data);
            Ok(())
        }
    }

    fn word(value: u16) -> Vec<u8> {
        let bytes = value.to_be_bytes();
        vec![bytes[0], bytes[1], crc8(&bytes)]
    }

    #[test]
    fn test_crc8_reference_vector() {
        assert_eq!(crc8(&[0xBE, 0xEF]), 0x92);
    }

    #[test]
    fn test_decode_measurement() {
        let mut buf = [0u8; 6];
        buf[..3].copy_from_slice(&word(0x6666));
        buf[3..].copy_from_slice(&word(0x8000));

        let reading = decode_measurement(&buf).unwrap();
        // 0x6666 / 65536 = 0.4
        assert!((reading.temperature - 25.0).abs() < 0.01);
        assert!((reading.humidity - 50.0).abs() < 0.01);
    }

    #[test]
    fn test_decode_rejects_bad_crc() {
        let mut buf = [0u8; 6];
        buf[..3].copy_from_slice(&word(0x6666));
        buf[3..].copy_from_slice(&word(0x8000));
        buf[5] ^= 0xFF;

        assert!(matches!(decode_measurement(&buf), Err(HalError::CrcMismatch { .. })));
    }

    #[test]
    fn test_measure_command_sequence() {
        let mut bus = FakeBus::default();
        let mut response = word(0x6666);
        response.extend(word(0x8000));
        bus.responses.push_back(response);

        let mut sensor = Shtc3::new("shtc3", bus);
        let reading = sensor.measure().unwrap();
        assert!((reading.humidity - 50.0).abs() < 0.01);
        assert_eq!(sensor.bus.commands, vec![CMD_WAKEUP, CMD_MEASURE_T_FIRST, CMD_SLEEP]);
    }

    #[test]
    fn test_init_checks_id() {
        let mut bus = FakeBus::default();
        bus.responses.push_back(word(0x0887));
        let mut sensor = Shtc3::new("shtc3", bus);
        sensor.init().unwrap();
        assert!(sensor.is_ready());

        let mut bus = FakeBus::default();
        bus.responses.push_back(word(0x1234));
        let mut other = Shtc3::new("other", bus);
        assert!(other.init().is_err());
    }

    #[test]
    fn test_nack_is_reported() {
        let bus = FakeBus { nack: true, ..Default::default() };
        let mut sensor = Shtc3::new("shtc3", bus);
        assert!(sensor.measure().is_err());
    }
}
