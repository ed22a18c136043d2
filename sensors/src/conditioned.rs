//! Calibrated and smoothed analog channels

use crate::calibration::{CalibratedMapper, CalibrationConfig, RawSample, ValidRange};
use crate::smoothing::TemporalSmoother;
use crate::variables::{Flags, Value, Variable, VariableSet};
use crate::{Channel, ChannelStatus, DiscoveryItem, Result, SensorKind};
use roomwatch_hal::AnalogInput;
use std::time::Duration;

/// Static description of one conditioned analog channel
#[derive(Debug, Clone)]
pub struct ConditionedOptions {
    pub name: String,
    pub units: String,
    pub description: String,
    pub kind: SensorKind,
    /// Calibration used until a stored one is loaded
    pub calibration: CalibrationConfig,
    /// Counts the hardware can produce
    pub valid: ValidRange,
    /// Smoothing time constant
    pub sigma: Duration,
    pub filter_decimals: u8,
}

impl ConditionedOptions {
    /// Light sensor: the photo-transistor pulls the line low in bright light.
    pub fn light() -> Self {
        Self {
            name: "light".to_string(),
            units: crate::units::PERCENTAGE.to_string(),
            description: "light %".to_string(),
            kind: SensorKind::Illuminance,
            calibration: CalibrationConfig::new(4095.0, 600.0, 0.0, 100.0, 1),
            valid: ValidRange::ADC_12BIT,
            sigma: Duration::from_secs(30),
            filter_decimals: 1,
        }
    }

    /// Moisture/leak probe
    pub fn leak() -> Self {
        Self {
            name: "leak".to_string(),
            units: crate::units::PERCENTAGE.to_string(),
            description: "leak %".to_string(),
            kind: SensorKind::Moisture,
            calibration: CalibrationConfig::new(9.0, 4095.0, 0.0, 100.0, 0),
            valid: ValidRange::ADC_12BIT,
            sigma: Duration::from_secs(120),
            filter_decimals: 1,
        }
    }

    pub fn raw_name(&self) -> String {
        format!("{}_raw", self.name)
    }

    pub fn filtered_name(&self) -> String {
        format!("{}_filtered", self.name)
    }
}

/// One pass through the conditioning pipeline
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConditionedReading {
    pub raw: u16,
    pub calibrated: f64,
    pub smoothed: f64,
}

/// Analog input followed by calibration and temporal smoothing
pub struct ConditionedSensor {
    options: ConditionedOptions,
    input: Box<dyn AnalogInput>,
    mapper: CalibratedMapper,
    smoother: TemporalSmoother,
    last: Option<ConditionedReading>,
    ok: bool,
}

impl ConditionedSensor {
    pub fn new(options: ConditionedOptions, input: Box<dyn AnalogInput>) -> Result<Self> {
        let mapper = CalibratedMapper::new(&options.name, options.calibration, options.valid)?;
        let smoother = TemporalSmoother::new(options.sigma)?;
        Ok(Self {
            options,
            input,
            mapper,
            smoother,
            last: None,
            ok: false,
        })
    }

    pub fn options(&self) -> &ConditionedOptions {
        &self.options
    }

    pub fn last(&self) -> Option<ConditionedReading> {
        self.last
    }

    pub fn ok(&self) -> bool {
        self.ok
    }

    /// Read the hardware once and run the sample through mapping and smoothing.
    ///
    /// Every call feeds the smoother, even when the hardware value has not
    /// changed since the previous call. A count outside the hardware's valid
    /// range is clamped and mapped as usual but leaves the channel `ok=false`.
    pub fn sample(&mut self, now: Duration) -> Result<ConditionedReading> {
        let raw = match self.input.read_raw() {
            Ok(raw) => raw,
            Err(e) => {
                self.ok = false;
                return Err(e.into());
            }
        };

        let sample = RawSample { value: raw as f64, valid: self.options.valid };
        let valid = sample.is_valid();
        if !valid {
            tracing::warn!(
                "{}: raw {} outside [{}, {}], clamping",
                self.options.name, raw, sample.valid.min, sample.valid.max
            );
        }

        let calibrated = self.mapper.map(sample.value);
        let smoothed = self
            .smoother
            .add_sample(now.as_secs_f64(), calibrated)
            .unwrap_or(calibrated);

        let reading = ConditionedReading { raw, calibrated, smoothed };
        self.last = Some(reading);
        self.ok = valid;
        Ok(reading)
    }
}

impl Channel for ConditionedSensor {
    fn name(&self) -> &str {
        &self.options.name
    }

    fn read(&mut self, now: Duration, vars: &mut VariableSet) -> ChannelStatus {
        if let Err(e) = self.sample(now) {
            tracing::warn!("Failed to read {}: {}", self.options.name, e);
        }

        let opts = &self.options;
        let last = self.last;
        let decimals = self.mapper.config().decimals;

        vars.upsert(
            Variable::new(
                &opts.raw_name(),
                last.map(|r| Value::Int(r.raw as i64)).unwrap_or(Value::Missing),
            )
            .with_description(&format!("{} raw counts", opts.name))
            .with_ok(self.ok),
        );
        vars.upsert(
            Variable::float(&opts.name, last.map(|r| r.calibrated), decimals)
                .with_units(&opts.units)
                .with_description(&opts.description)
                .with_ok(self.ok),
        );
        vars.upsert(
            Variable::float(&opts.filtered_name(), last.map(|r| r.smoothed), opts.filter_decimals)
                .with_units(&opts.units)
                .with_description(&format!("filtered {}", opts.description))
                .with_ok(self.ok),
        );

        let summary = match last {
            Some(r) => format!(
                "r:{} v:{:.*} f:{:.*}",
                r.raw, decimals as usize, r.calibrated, opts.filter_decimals as usize, r.smoothed
            ),
            None => "r:- v:- f:-".to_string(),
        };
        ChannelStatus { name: opts.name.clone(), ok: self.ok, summary }
    }

    fn discovery(&self) -> Vec<DiscoveryItem> {
        vec![
            DiscoveryItem { variable: self.options.name.clone(), kind: self.options.kind },
            DiscoveryItem { variable: self.options.filtered_name(), kind: self.options.kind },
        ]
    }

    fn mapper(&self) -> Option<&CalibratedMapper> {
        Some(&self.mapper)
    }

    fn mapper_mut(&mut self) -> Option<&mut CalibratedMapper> {
        Some(&mut self.mapper)
    }

    /// `<name>_in_min`, `<name>_in_max`, `<name>_out_min`, `<name>_out_max`
    /// and `<name>_decimals`
    fn config_variables(&self, vars: &mut VariableSet) {
        let config = self.mapper.config();
        let flags = Flags::CONFIG | Flags::SETTABLE;
        let name = &self.options.name;
        let fields = [
            ("in_min", config.in_min, "raw count at the low end"),
            ("in_max", config.in_max, "raw count at the high end"),
            ("out_min", config.out_min, "output at in_min"),
            ("out_max", config.out_max, "output at in_max"),
        ];
        for (field, value, description) in fields {
            vars.upsert(
                Variable::float(&format!("{}_{}", name, field), Some(value), 0)
                    .with_description(description)
                    .with_flags(flags),
            );
        }
        vars.upsert(
            Variable::new(&format!("{}_decimals", name), Value::Int(config.decimals as i64))
                .with_description("display decimals")
                .with_flags(flags),
        );
    }
}
