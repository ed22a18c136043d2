//! Simulated devices
//!
//! Every simulated device hands out a cloneable handle so a test (or the
//! bench runner) can change what the device reports while the device itself
//! is owned by the monitor.

use crate::{AnalogInput, ClimateReading, ClimateSensor, DigitalInput, HalError, Indicator};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// Small xorshift generator; enough for bench-run jitter.
#[derive(Debug, Clone)]
struct XorShift(u64);

impl XorShift {
    fn new(seed: u64) -> Self {
        Self(seed.max(1))
    }

    fn next(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }

    /// Uniform in [0, 1)
    fn unit(&mut self) -> f64 {
        (self.next() >> 11) as f64 / (1u64 << 53) as f64
    }
}

#[derive(Debug)]
struct AnalogState {
    raw: u16,
    noise: u16,
    failing: bool,
    rng: XorShift,
}

/// Simulated analog input
pub struct SimAnalog {
    name: String,
    state: Arc<Mutex<AnalogState>>,
}

/// Control handle for a [`SimAnalog`]
#[derive(Clone)]
pub struct SimAnalogHandle(Arc<Mutex<AnalogState>>);

impl SimAnalog {
    pub fn new(name: &str, raw: u16) -> Self {
        Self {
            name: name.to_string(),
            state: Arc::new(Mutex::new(AnalogState {
                raw,
                noise: 0,
                failing: false,
                rng: XorShift::new(1),
            })),
        }
    }

    /// Add uniform noise of up to `amplitude` counts around the set value
    pub fn with_noise(self, amplitude: u16, seed: u64) -> Self {
        {
            let mut state = lock(&self.state);
            state.noise = amplitude;
            state.rng = XorShift::new(seed);
        }
        self
    }

    pub fn handle(&self) -> SimAnalogHandle {
        SimAnalogHandle(self.state.clone())
    }
}

impl SimAnalogHandle {
    pub fn set(&self, raw: u16) {
        lock(&self.0).raw = raw;
    }

    pub fn set_failing(&self, failing: bool) {
        lock(&self.0).failing = failing;
    }
}

impl AnalogInput for SimAnalog {
    fn name(&self) -> &str {
        &self.name
    }

    fn read_raw(&mut self) -> Result<u16, HalError> {
        let mut state = lock(&self.state);
        if state.failing {
            return Err(HalError::CommunicationError(format!("{}: simulated failure", self.name)));
        }
        if state.noise == 0 {
            return Ok(state.raw);
        }
        let span = 2.0 * state.noise as f64;
        let offset = state.rng.unit() * span - state.noise as f64;
        Ok((state.raw as f64 + offset).round().clamp(0.0, u16::MAX as f64) as u16)
    }
}

#[derive(Debug)]
struct DigitalState {
    level: bool,
    failing: bool,
    toggle_probability: f64,
    rng: XorShift,
}

/// Simulated digital input
pub struct SimDigital {
    name: String,
    state: Arc<Mutex<DigitalState>>,
}

/// Control handle for a [`SimDigital`]
#[derive(Clone)]
pub struct SimDigitalHandle(Arc<Mutex<DigitalState>>);

impl SimDigital {
    pub fn new(name: &str, level: bool) -> Self {
        Self {
            name: name.to_string(),
            state: Arc::new(Mutex::new(DigitalState {
                level,
                failing: false,
                toggle_probability: 0.0,
                rng: XorShift::new(1),
            })),
        }
    }

    /// Flip the level with the given probability on every read
    pub fn with_random_toggle(self, probability: f64, seed: u64) -> Self {
        {
            let mut state = lock(&self.state);
            state.toggle_probability = probability.clamp(0.0, 1.0);
            state.rng = XorShift::new(seed);
        }
        self
    }

    pub fn handle(&self) -> SimDigitalHandle {
        SimDigitalHandle(self.state.clone())
    }
}

impl SimDigitalHandle {
    pub fn set(&self, level: bool) {
        lock(&self.0).level = level;
    }

    pub fn set_failing(&self, failing: bool) {
        lock(&self.0).failing = failing;
    }
}

impl DigitalInput for SimDigital {
    fn name(&self) -> &str {
        &self.name
    }

    fn read_level(&mut self) -> Result<bool, HalError> {
        let mut state = lock(&self.state);
        if state.failing {
            return Err(HalError::CommunicationError(format!("{}: simulated failure", self.name)));
        }
        if state.toggle_probability > 0.0 && state.rng.unit() < state.toggle_probability {
            state.level = !state.level;
        }
        Ok(state.level)
    }
}

#[derive(Debug)]
struct ClimateState {
    reading: ClimateReading,
    failing: bool,
}

/// Simulated temperature/humidity chip
pub struct SimClimate {
    name: String,
    state: Arc<Mutex<ClimateState>>,
}

/// Control handle for a [`SimClimate`]
#[derive(Clone)]
pub struct SimClimateHandle(Arc<Mutex<ClimateState>>);

impl SimClimate {
    pub fn new(name: &str, temperature: f64, humidity: f64) -> Self {
        Self {
            name: name.to_string(),
            state: Arc::new(Mutex::new(ClimateState {
                reading: ClimateReading { temperature, humidity },
                failing: false,
            })),
        }
    }

    pub fn handle(&self) -> SimClimateHandle {
        SimClimateHandle(self.state.clone())
    }
}

impl SimClimateHandle {
    pub fn set(&self, temperature: f64, humidity: f64) {
        lock(&self.0).reading = ClimateReading { temperature, humidity };
    }

    /// Make the chip NACK every measurement
    pub fn set_failing(&self, failing: bool) {
        lock(&self.0).failing = failing;
    }
}

impl ClimateSensor for SimClimate {
    fn name(&self) -> &str {
        &self.name
    }

    fn measure(&mut self) -> Result<ClimateReading, HalError> {
        let state = lock(&self.state);
        if state.failing {
            return Err(HalError::CommunicationError(format!("{}: NACK", self.name)));
        }
        Ok(state.reading)
    }
}

/// Indicator that records every blink request
#[derive(Clone, Default)]
pub struct SimIndicator {
    blinks: Arc<Mutex<Vec<u32>>>,
}

impl SimIndicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blink counts requested so far, oldest first
    pub fn blinks(&self) -> Vec<u32> {
        lock(&self.blinks).clone()
    }
}

impl Indicator for SimIndicator {
    fn blink(&mut self, count: u32) {
        lock(&self.blinks).push(count);
    }

    fn tick(&mut self, _now: Duration) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analog_handle_controls_device() {
        let mut adc = SimAnalog::new("leak", 100);
        let handle = adc.handle();
        assert_eq!(adc.read_raw().unwrap(), 100);

        handle.set(3000);
        assert_eq!(adc.read_raw().unwrap(), 3000);

        handle.set_failing(true);
        assert!(adc.read_raw().is_err());
    }

    #[test]
    fn test_analog_noise_stays_in_band() {
        let mut adc = SimAnalog::new("light", 2000).with_noise(10, 42);
        for _ in 0..200 {
            let raw = adc.read_raw().unwrap();
            assert!((1990..=2010).contains(&raw));
        }
    }

    #[test]
    fn test_digital_handle() {
        let mut pir = SimDigital::new("pir", false);
        let handle = pir.handle();
        assert!(!pir.read_level().unwrap());
        handle.set(true);
        assert!(pir.read_level().unwrap());
    }

    #[test]
    fn test_digital_random_toggle_changes_level() {
        let mut pir = SimDigital::new("pir", false).with_random_toggle(0.5, 7);
        let levels: Vec<bool> = (0..100).map(|_| pir.read_level().unwrap()).collect();
        assert!(levels.iter().any(|l| *l));
        assert!(levels.iter().any(|l| !*l));
    }

    #[test]
    fn test_climate_failure() {
        let mut chip = SimClimate::new("shtc3", 21.5, 40.0);
        let handle = chip.handle();
        assert_eq!(chip.measure().unwrap().temperature, 21.5);
        handle.set_failing(true);
        assert!(chip.measure().is_err());
    }

    #[test]
    fn test_indicator_records_blinks() {
        let indicator = SimIndicator::new();
        let mut boxed: Box<dyn Indicator> = Box::new(indicator.clone());
        boxed.blink(1);
        boxed.blink(2);
        assert_eq!(indicator.blinks(), vec![1, 2]);
    }
}
