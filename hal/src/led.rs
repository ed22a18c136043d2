//! Non-blocking LED blink patterns

use crate::{HalError, Indicator};
use std::time::Duration;

/// Something that can be switched on and off
pub trait LedOutput: Send {
    fn set(&mut self, on: bool) -> Result<(), HalError>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Phase {
    Idle,
    On { until: Duration },
    Off { until: Duration },
}

/// Blinks an LED a requested number of times without blocking the caller.
///
/// Each blink is `half_period` on followed by `half_period` off. Requests
/// made while a pattern is running are appended to it.
pub struct BlinkLed<O: LedOutput> {
    name: String,
    output: O,
    half_period: Duration,
    pending: u32,
    phase: Phase,
}

impl<O: LedOutput> BlinkLed<O> {
    pub fn new(name: &str, output: O, half_period: Duration) -> Self {
        Self {
            name: name.to_string(),
            output,
            half_period,
            pending: 0,
            phase: Phase::Idle,
        }
    }

    /// Blinks still queued, including the one in progress
    pub fn pending(&self) -> u32 {
        self.pending
    }

    pub fn is_lit(&self) -> bool {
        matches!(self.phase, Phase::On { .. })
    }

    fn drive(&mut self, on: bool) {
        if let Err(e) = self.output.set(on) {
            tracing::warn!("Failed to drive LED {}: {}", self.name, e);
        }
    }
}

impl<O: LedOutput> Indicator for BlinkLed<O> {
    fn blink(&mut self, count: u32) {
        self.pending = self.pending.saturating_add(count);
    }

    fn tick(&mut self, now: Duration) {
        match self.phase {
            Phase::Idle if self.pending > 0 => {
                self.drive(true);
                self.phase = Phase::On { until: now + self.half_period };
            }
            Phase::On { until } if now >= until => {
                self.drive(false);
                self.phase = Phase::Off { until: now + self.half_period };
            }
            Phase::Off { until } if now >= until => {
                self.pending -= 1;
                self.phase = Phase::Idle;
                if self.pending > 0 {
                    self.drive(true);
                    self.phase = Phase::On { until: now + self.half_period };
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<bool>>>);

    impl LedOutput for Recorder {
        fn set(&mut self, on: bool) -> Result<(), HalError> {
            self.0.lock().unwrap().push(on);
            Ok(())
        }
    }

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn test_idle_led_stays_dark() {
        let rec = Recorder::default();
        let mut led = BlinkLed::new("blue", rec.clone(), ms(500));
        led.tick(ms(0));
        led.tick(ms(1000));
        assert!(rec.0.lock().unwrap().is_empty());
        assert!(!led.is_lit());
    }

    #[test]
    fn test_two_blinks() {
        let rec = Recorder::default();
        let mut led = BlinkLed::new("blue", rec.clone(), ms(500));
        led.blink(2);

        let mut t = 0;
        while t <= 3000 {
            led.tick(ms(t));
            t += 50;
        }

        assert_eq!(*rec.0.lock().unwrap(), vec![true, false, true, false]);
        assert_eq!(led.pending(), 0);
    }

    #[test]
    fn test_blink_request_while_running_is_appended() {
        let rec = Recorder::default();
        let mut led = BlinkLed::new("blue", rec.clone(), ms(100));
        led.blink(1);
        led.tick(ms(0));
        assert!(led.is_lit());
        led.blink(1);
        assert_eq!(led.pending(), 2);

        for t in (0..=1000).step_by(10) {
            led.tick(ms(t));
        }
        assert_eq!(rec.0.lock().unwrap().iter().filter(|on| **on).count(), 2);
    }
}
