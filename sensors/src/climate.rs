//! Temperature/humidity channel

use crate::variables::{Variable, VariableSet};
use crate::{units, Channel, ChannelStatus, DiscoveryItem, SensorKind};
use roomwatch_hal::{ClimateReading, ClimateSensor};
use std::time::Duration;

/// Publishes `temperature` and `humidity` from a climate chip.
///
/// A failed measurement keeps the previous values and marks both
/// variables invalid.
pub struct ClimateChannel {
    name: String,
    temperature_name: String,
    humidity_name: String,
    sensor: Box<dyn ClimateSensor>,
    last: Option<ClimateReading>,
    ok: bool,
}

impl ClimateChannel {
    pub fn new(name: &str, sensor: Box<dyn ClimateSensor>) -> Self {
        Self {
            name: name.to_string(),
            temperature_name: "temperature".to_string(),
            humidity_name: "humidity".to_string(),
            sensor,
            last: None,
            ok: false,
        }
    }

    pub fn last(&self) -> Option<ClimateReading> {
        self.last
    }

    pub fn ok(&self) -> bool {
        self.ok
    }
}

impl Channel for ClimateChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn read(&mut self, _now: Duration, vars: &mut VariableSet) -> ChannelStatus {
        match self.sensor.measure() {
            Ok(reading) => {
                self.last = Some(reading);
                self.ok = true;
            }
            Err(e) => {
                self.ok = false;
                tracing::warn!("Failed to read {}: {}", self.name, e);
            }
        }

        vars.upsert(
            Variable::float(&self.temperature_name, self.last.map(|r| r.temperature), 1)
                .with_units(units::CELSIUS)
                .with_description("temperature")
                .with_ok(self.ok),
        );
        vars.upsert(
            Variable::float(&self.humidity_name, self.last.map(|r| r.humidity), 1)
                .with_units(units::PERCENTAGE)
                .with_description("relative humidity")
                .with_ok(self.ok),
        );

        let summary = match self.last {
            Some(r) => format!("t:{:.1} h:{:.1}%", r.temperature, r.humidity),
            None => "t:- h:-".to_string(),
        };
        ChannelStatus { name: self.name.clone(), ok: self.ok, summary }
    }

    fn discovery(&self) -> Vec<DiscoveryItem> {
        vec![
            DiscoveryItem { variable: self.temperature_name.clone(), kind: SensorKind::Temperature },
            DiscoveryItem { variable: self.humidity_name.clone(), kind: SensorKind::Humidity },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roomwatch_hal::sim::SimClimate;

    #[test]
    fn test_read_publishes_both_values() {
        let mut channel = ClimateChannel::new("shtc3", Box::new(SimClimate::new("shtc3", 21.46, 40.0)));
        let mut vars = VariableSet::new("room");
        let status = channel.read(Duration::ZERO, &mut vars);

        assert!(status.ok);
        assert_eq!(status.summary, "t:21.5 h:40.0%");
        assert_eq!(vars.names(), vec!["temperature", "humidity"]);
        assert_eq!(vars.get("temperature").unwrap().units, "°C");
    }

    #[test]
    fn test_nack_keeps_last_values() {
        let chip = SimClimate::new("shtc3", 20.0, 55.0);
        let handle = chip.handle();
        let mut channel = ClimateChannel::new("shtc3", Box::new(chip));
        let mut vars = VariableSet::new("room");
        channel.read(Duration::ZERO, &mut vars);

        handle.set(30.0, 10.0);
        handle.set_failing(true);
        let status = channel.read(Duration::from_secs(60), &mut vars);

        assert!(!status.ok);
        let t = vars.get("temperature").unwrap();
        assert_eq!(t.as_f64(), Some(20.0));
        assert!(!t.ok);
        assert!(!vars.get("humidity").unwrap().ok);
    }
}
