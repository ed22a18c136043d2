//! Composition root: node configuration to a running [`Monitor`]

use crate::config::NodeConfig;
use crate::hardware::Hardware;
use anyhow::{Context, Result};
use roomwatch_sensors::{
    ClimateChannel, ConditionedSensor, ConfigStore, Discovery, Monitor, MotionChannel, Publisher,
};
use std::time::Duration;

/// Build a monitor with every channel `config` declares, in publish order:
/// climate, analog channels, then motion channels.
///
/// `start` anchors the heartbeat schedule. The monitor is not started.
pub fn build_monitor(
    config: &NodeConfig,
    hardware: &mut dyn Hardware,
    start: Duration,
    publisher: Box<dyn Publisher>,
    store: Box<dyn ConfigStore>,
    discovery: Option<Box<dyn Discovery>>,
) -> Result<Monitor> {
    let mut monitor = Monitor::new(config.monitor_options(), start, publisher, store)?;

    if let Some(discovery) = discovery {
        monitor = monitor.with_discovery(discovery);
    }

    if config.led.enabled {
        if let Some(indicator) = hardware.indicator(&config.led)? {
            monitor = monitor.with_indicator(indicator);
        }
    }

    if config.climate.enabled {
        let chip = hardware.climate(&config.climate)?;
        monitor.add_channel(Box::new(ClimateChannel::new(&config.climate.name, chip)))?;
    }

    for analog in &config.analog {
        let input = hardware.analog(analog)?;
        let sensor = ConditionedSensor::new(analog.to_options()?, input)
            .with_context(|| format!("Failed to set up {}", analog.name))?;
        monitor.add_channel(Box::new(sensor))?;
    }

    for motion in &config.motion {
        let input = hardware.motion(motion)?;
        let ordinal = monitor.add_motion(MotionChannel::new(&motion.name, input))?;
        tracing::debug!("Motion channel {} is #{}", motion.name, ordinal);
    }

    Ok(monitor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::SimulatedHardware;
    use roomwatch_sensors::{MemoryConfigStore, MemoryPublisher};

    fn build(config: &NodeConfig) -> Result<Monitor> {
        build_monitor(
            config,
            &mut SimulatedHardware::quiet(),
            Duration::ZERO,
            Box::new(MemoryPublisher::new()),
            Box::new(MemoryConfigStore::new()),
            None,
        )
    }

    #[test]
    fn test_default_node_layout() {
        let monitor = build(&NodeConfig::default()).unwrap();
        assert_eq!(monitor.channel_names(), vec!["shtc3", "light", "leak", "motion", "motion2"]);
        assert_eq!(monitor.options().group, "room");
        assert_eq!(monitor.next_update(), Duration::from_secs(10));
    }

    #[test]
    fn test_disabled_climate_is_skipped() {
        let mut config = NodeConfig::default();
        config.climate.enabled = false;
        config.motion.truncate(1);
        let monitor = build(&config).unwrap();
        assert_eq!(monitor.channel_names(), vec!["light", "leak", "motion"]);
    }

    #[test]
    fn test_published_variables() {
        let publisher = MemoryPublisher::new();
        let mut monitor = build_monitor(
            &NodeConfig::default(),
            &mut SimulatedHardware::quiet(),
            Duration::ZERO,
            Box::new(publisher.clone()),
            Box::new(MemoryConfigStore::new()),
            None,
        )
        .unwrap();
        monitor.start(Duration::ZERO);
        monitor.tick(Duration::from_secs(10));

        let published = publisher.last().unwrap();
        assert_eq!(
            published.names(),
            vec![
                "temperature",
                "humidity",
                "light_raw",
                "light",
                "light_filtered",
                "leak_raw",
                "leak",
                "leak_filtered",
                "motion",
                "motion2",
            ]
        );
        assert!(published.iter().all(|v| v.ok));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let mut config = NodeConfig::default();
        config.motion[0].name = "leak".to_string();
        assert!(build(&config).is_err());
    }
}
