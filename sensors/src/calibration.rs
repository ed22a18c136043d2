//! Raw-count to physical-unit calibration
//!
//! A [`CalibratedMapper`] is a clamped affine map from the raw domain
//! `[in_min, in_max]` to `[out_min, out_max]`. Either interval may be
//! reversed. Configuration is validated when it is written, so mapping
//! itself never fails.

use crate::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Most decimals a user may request for display
pub const MAX_DECIMALS: u8 = 6;

/// Names of the user-settable fields, as they appear after the channel
/// prefix in form submissions (`light_in_min`, ...)
pub const FIELDS: [&str; 5] = ["in_min", "in_max", "out_min", "out_max", "decimals"];

/// Range of raw values the hardware can produce
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValidRange {
    pub min: f64,
    pub max: f64,
}

impl ValidRange {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// 12-bit ADC
    pub const ADC_12BIT: Self = Self::new(0.0, 4095.0);

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }
}

impl Default for ValidRange {
    fn default() -> Self {
        Self::ADC_12BIT
    }
}

/// One instantaneous reading together with the range the hardware allows
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawSample {
    pub value: f64,
    pub valid: ValidRange,
}

impl RawSample {
    pub fn is_valid(&self) -> bool {
        self.value.is_finite() && self.valid.contains(self.value)
    }
}

/// User-adjustable calibration of one analog channel
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationConfig {
    pub in_min: f64,
    pub in_max: f64,
    pub out_min: f64,
    pub out_max: f64,
    #[serde(default)]
    pub decimals: u8,
}

impl CalibrationConfig {
    pub const fn new(in_min: f64, in_max: f64, out_min: f64, out_max: f64, decimals: u8) -> Self {
        Self { in_min, in_max, out_min, out_max, decimals }
    }

    /// Check the configuration for channel `channel` against the hardware range.
    pub fn validate(&self, channel: &str, valid: ValidRange) -> Result<(), ConfigError> {
        let fields = [
            ("in_min", self.in_min),
            ("in_max", self.in_max),
            ("out_min", self.out_min),
            ("out_max", self.out_max),
        ];
        for (field, value) in fields {
            if !value.is_finite() {
                return Err(ConfigError::NotFinite(format!("{}_{}", channel, field)));
            }
        }

        for (field, value) in [("in_min", self.in_min), ("in_max", self.in_max)] {
            if !valid.contains(value) {
                return Err(ConfigError::OutOfRange {
                    field: format!("{}_{}", channel, field),
                    value,
                    min: valid.min,
                    max: valid.max,
                });
            }
        }

        if self.in_min == self.in_max {
            return Err(ConfigError::EmptyDomain {
                field: format!("{}_in_max", channel),
                value: self.in_max,
            });
        }

        if self.decimals > MAX_DECIMALS {
            return Err(ConfigError::TooManyDecimals {
                field: format!("{}_decimals", channel),
                value: self.decimals,
                max: MAX_DECIMALS,
            });
        }

        Ok(())
    }

    /// Copy of this config with any `<channel>_<field>` entries of `form` applied.
    ///
    /// Only parses; call [`validate`](Self::validate) on the result.
    pub fn with_form_values(
        &self,
        channel: &str,
        form: &BTreeMap<String, String>,
    ) -> Result<Self, ConfigError> {
        let mut updated = *self;
        for field in FIELDS {
            let key = format!("{}_{}", channel, field);
            let Some(raw) = form.get(&key) else {
                continue;
            };
            let parse_err = || ConfigError::Parse { name: key.clone(), value: raw.clone() };
            let text = raw.trim();
            match field {
                "decimals" => updated.decimals = text.parse().map_err(|_| parse_err())?,
                _ => {
                    let value: f64 = text.parse().map_err(|_| parse_err())?;
                    match field {
                        "in_min" => updated.in_min = value,
                        "in_max" => updated.in_max = value,
                        "out_min" => updated.out_min = value,
                        _ => updated.out_max = value,
                    }
                }
            }
        }
        Ok(updated)
    }
}

/// Clamped linear interpolation with validated configuration
#[derive(Debug, Clone, PartialEq)]
pub struct CalibratedMapper {
    channel: String,
    config: CalibrationConfig,
    valid: ValidRange,
}

impl CalibratedMapper {
    pub fn new(channel: &str, config: CalibrationConfig, valid: ValidRange) -> Result<Self, ConfigError> {
        config.validate(channel, valid)?;
        Ok(Self {
            channel: channel.to_string(),
            config,
            valid,
        })
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn config(&self) -> CalibrationConfig {
        self.config
    }

    pub fn valid_range(&self) -> ValidRange {
        self.valid
    }

    /// Replace the configuration; rejected configs leave the mapper unchanged.
    pub fn set_config(&mut self, config: CalibrationConfig) -> Result<(), ConfigError> {
        config.validate(&self.channel, self.valid)?;
        self.config = config;
        Ok(())
    }

    /// Map a raw sample to calibrated units.
    ///
    /// Raw values are clamped to the hardware range and then to the
    /// calibration domain, so the result always lies between `out_min` and
    /// `out_max`.
    pub fn map(&self, raw: f64) -> f64 {
        let c = &self.config;
        let lo = c.in_min.min(c.in_max);
        let hi = c.in_min.max(c.in_max);
        let x = if raw.is_nan() { lo } else { self.valid.clamp(raw).clamp(lo, hi) };
        c.out_min + (x - c.in_min) * (c.out_max - c.out_min) / (c.in_max - c.in_min)
    }
}
