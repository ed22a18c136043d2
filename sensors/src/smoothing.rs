//! Continuous-time exponential smoothing
//!
//! Samples arrive whenever a trigger fires, not on a fixed tick, so the
//! filter weights each sample by the time elapsed since the previous one:
//!
//! ```text
//! smoothed' = smoothed + (value - smoothed) * (1 - exp(-dt / sigma))
//! ```

use crate::ConfigError;
use std::time::Duration;

/// Internal filter state
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmoothedValue {
    pub value: f64,
    /// Seconds on the monotonic clock
    pub last_update: f64,
}

/// First-order low-pass filter evaluated at irregular intervals
#[derive(Debug, Clone)]
pub struct TemporalSmoother {
    sigma: f64,
    state: Option<SmoothedValue>,
}

impl TemporalSmoother {
    /// `sigma` is the time constant; it must be positive.
    pub fn new(sigma: Duration) -> Result<Self, ConfigError> {
        if sigma.is_zero() {
            return Err(ConfigError::InvalidSigma);
        }
        Ok(Self {
            sigma: sigma.as_secs_f64(),
            state: None,
        })
    }

    pub fn sigma(&self) -> Duration {
        Duration::from_secs_f64(self.sigma)
    }

    /// Feed one sample taken at `time` seconds and return the new smoothed value.
    ///
    /// The first sample seeds the filter. A sample whose timestamp is not
    /// after the previous one leaves the state untouched, as does a
    /// non-finite value.
    pub fn add_sample(&mut self, time: f64, value: f64) -> Option<f64> {
        if !value.is_finite() || !time.is_finite() {
            return self.current_value();
        }

        match self.state.as_mut() {
            None => {
                self.state = Some(SmoothedValue { value, last_update: time });
            }
            Some(state) => {
                let dt = time - state.last_update;
                if dt > 0.0 {
                    let weight = 1.0 - (-dt / self.sigma).exp();
                    state.value += (value - state.value) * weight;
                    state.last_update = time;
                }
            }
        }
        self.current_value()
    }

    /// Smoothed value at full precision, `None` before the first sample
    pub fn current_value(&self) -> Option<f64> {
        self.state.map(|s| s.value)
    }

    pub fn state(&self) -> Option<SmoothedValue> {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn smoother(sigma_secs: u64) -> TemporalSmoother {
        TemporalSmoother::new(Duration::from_secs(sigma_secs)).unwrap()
    }

    #[test]
    fn test_zero_sigma_rejected() {
        assert!(TemporalSmoother::new(Duration::ZERO).is_err());
    }

    #[test]
    fn test_first_sample_seeds() {
        let mut f = smoother(120);
        assert_eq!(f.current_value(), None);
        assert_eq!(f.add_sample(5.0, 42.0), Some(42.0));
    }

    #[test]
    fn test_one_time_constant() {
        let mut f = smoother(120);
        f.add_sample(0.0, 0.0);
        let v = f.add_sample(120.0, 100.0).unwrap();
        let expected = 100.0 * (1.0 - (-1.0f64).exp());
        assert!((v - expected).abs() < 1e-9);
        assert!((v - 63.2).abs() < 0.1);
    }

    #[test]
    fn test_one_time_constant_in_small_steps() {
        // The kernel composes: many small steps equal one large step.
        let mut f = smoother(60);
        f.add_sample(0.0, 10.0);
        let mut t = 0.0;
        for _ in 0..60 {
            t += 1.0;
            f.add_sample(t, 20.0);
        }
        let v = f.current_value().unwrap();
        assert!((v - (10.0 + 10.0 * (1.0 - (-1.0f64).exp()))).abs() < 1e-9);
    }

    #[test]
    fn test_monotonic_convergence() {
        let mut f = smoother(30);
        f.add_sample(0.0, 0.0);
        let mut prev = 0.0;
        for i in 1..=600 {
            let v = f.add_sample(i as f64, 5.0).unwrap();
            assert!(v >= prev);
            assert!(v <= 5.0 + 1e-12);
            prev = v;
        }
        assert!((prev - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_same_timestamp_is_noop() {
        let mut f = smoother(120);
        f.add_sample(10.0, 1.0);
        f.add_sample(20.0, 50.0);
        let before = f.state();
        f.add_sample(20.0, 1000.0);
        assert_eq!(f.state(), before);
    }

    #[test]
    fn test_clock_going_backwards_is_noop() {
        let mut f = smoother(120);
        f.add_sample(100.0, 1.0);
        let before = f.state();
        f.add_sample(50.0, 1000.0);
        assert_eq!(f.state(), before);
    }

    #[test]
    fn test_nan_sample_ignored() {
        let mut f = smoother(120);
        f.add_sample(0.0, 3.0);
        assert_eq!(f.add_sample(10.0, f64::NAN), Some(3.0));
    }
}
