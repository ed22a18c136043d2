//! Node orchestration
//!
//! The [`Monitor`] owns every channel, the heartbeat scheduler and the
//! collaborators (publisher, config store, discovery, indicator). The
//! control loop calls [`Monitor::tick`] with the current monotonic time;
//! everything else happens from there.

use crate::calibration::{CalibratedMapper, FIELDS};
use crate::motion::{MotionChannel, MotionEdge};
use crate::publish::{Discovery, Publisher};
use crate::scheduler::PeriodicScheduler;
use crate::store::{ConfigGroup, ConfigStore};
use crate::variables::{Value, Variable, VariableSet};
use crate::{Channel, ChannelStatus, ConfigError, Result, SensorError};
use roomwatch_hal::Indicator;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::mpsc;

/// Monitor settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorOptions {
    /// Name of the published live group
    pub group: String,
    /// Name of the persisted configuration group
    pub config_group: String,
    /// Delay before the first heartbeat update
    pub initial_delay: Duration,
    /// Heartbeat period
    pub period: Duration,
}

impl Default for MonitorOptions {
    fn default() -> Self {
        Self {
            group: "room".to_string(),
            config_group: "room_cfg".to_string(),
            initial_delay: Duration::from_secs(10),
            period: Duration::from_secs(60),
        }
    }
}

/// Why an update ran
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    Schedule,
    /// Rising edge on the `ordinal`-th motion channel (1-based)
    Motion { ordinal: u32, channel: String },
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Trigger::Schedule => write!(f, "schedule"),
            Trigger::Motion { channel, .. } => write!(f, "motion on {}", channel),
        }
    }
}

#[derive(Debug)]
struct MotionEvent {
    ordinal: u32,
    edge: MotionEdge,
}

pub struct Monitor {
    options: MonitorOptions,
    channels: Vec<Box<dyn Channel>>,
    scheduler: PeriodicScheduler,
    vars: VariableSet,
    config_vars: VariableSet,
    publisher: Box<dyn Publisher>,
    store: Box<dyn ConfigStore>,
    discovery: Option<Box<dyn Discovery>>,
    indicator: Option<Box<dyn Indicator>>,
    motion_tx: mpsc::UnboundedSender<MotionEvent>,
    motion_rx: mpsc::UnboundedReceiver<MotionEvent>,
    motion_channels: u32,
    updates: u64,
}

impl Monitor {
    /// Create a monitor whose heartbeat is anchored at `start`
    pub fn new(
        options: MonitorOptions,
        start: Duration,
        publisher: Box<dyn Publisher>,
        store: Box<dyn ConfigStore>,
    ) -> Result<Self> {
        let scheduler = PeriodicScheduler::new(start, options.initial_delay, options.period)?;
        let (motion_tx, motion_rx) = mpsc::unbounded_channel();
        Ok(Self {
            vars: VariableSet::new(&options.group),
            config_vars: VariableSet::new(&options.config_group),
            options,
            channels: Vec::new(),
            scheduler,
            publisher,
            store,
            discovery: None,
            indicator: None,
            motion_tx,
            motion_rx,
            motion_channels: 0,
            updates: 0,
        })
    }

    pub fn with_indicator(mut self, indicator: Box<dyn Indicator>) -> Self {
        self.indicator = Some(indicator);
        self
    }

    pub fn with_discovery(mut self, discovery: Box<dyn Discovery>) -> Self {
        self.discovery = Some(discovery);
        self
    }

    /// Add a channel; channels are read in the order they were added.
    pub fn add_channel(&mut self, channel: Box<dyn Channel>) -> Result<()> {
        if self.channels.iter().any(|c| c.name() == channel.name()) {
            return Err(SensorError::DuplicateChannel(channel.name().to_string()));
        }
        tracing::debug!("Added channel {}", channel.name());
        self.channels.push(channel);
        Ok(())
    }

    /// Add a motion channel whose rising edges trigger an update.
    ///
    /// Returns the channel's 1-based ordinal, which is also the number of
    /// indicator blinks its edges produce.
    pub fn add_motion(&mut self, mut channel: MotionChannel) -> Result<u32> {
        let ordinal = self.motion_channels + 1;
        let tx = self.motion_tx.clone();
        channel.on_motion(move |edge| {
            // The receiver lives as long as the monitor that owns this channel.
            let _ = tx.send(MotionEvent { ordinal, edge });
        });
        self.add_channel(Box::new(channel))?;
        self.motion_channels = ordinal;
        Ok(ordinal)
    }

    pub fn options(&self) -> &MonitorOptions {
        &self.options
    }

    pub fn channel_names(&self) -> Vec<&str> {
        self.channels.iter().map(|c| c.name()).collect()
    }

    /// Live group as of the last read pass
    pub fn vars(&self) -> &VariableSet {
        &self.vars
    }

    pub fn config_vars(&self) -> &VariableSet {
        &self.config_vars
    }

    pub fn update_count(&self) -> u64 {
        self.updates
    }

    pub fn next_update(&self) -> Duration {
        self.scheduler.next_fire()
    }

    /// Calibration of the channel called `name`, if it has one
    pub fn mapper(&self, name: &str) -> Option<&CalibratedMapper> {
        self.channels.iter().find(|c| c.name() == name).and_then(|c| c.mapper())
    }

    /// Current calibration of every calibrated channel
    pub fn config_group(&self) -> ConfigGroup {
        let mut group = ConfigGroup::new();
        for channel in &self.channels {
            if let Some(mapper) = channel.mapper() {
                group.insert(channel.name(), mapper.config());
            }
        }
        group
    }

    /// Apply the stored configuration, take a first reading and announce
    /// every measurement to discovery.
    ///
    /// Stored entries that fail validation are skipped with a warning and
    /// the channel keeps its default calibration.
    pub fn start(&mut self, now: Duration) {
        if let Err(e) = self.reload_config() {
            tracing::warn!("Failed to load {} configuration: {}", self.options.config_group, e);
            self.rebuild_config_vars();
        }

        self.read_sensors(now);

        if let Some(discovery) = self.discovery.as_mut() {
            for channel in &self.channels {
                for item in channel.discovery() {
                    let var = self
                        .vars
                        .get(&item.variable)
                        .cloned()
                        .unwrap_or_else(|| Variable::new(&item.variable, Value::Missing));
                    discovery.register(&var, item.kind);
                }
            }
        }

        tracing::info!(
            "Monitor started with {} channel(s), first update at {:?}",
            self.channels.len(),
            self.scheduler.next_fire()
        );
    }

    /// Re-read the stored configuration group and apply it to the running
    /// channels. Returns the channels whose calibration changed.
    ///
    /// A store error leaves every channel untouched. Invalid entries are
    /// skipped as in [`start`](Monitor::start).
    pub fn reload_config(&mut self) -> Result<Vec<String>> {
        let Some(group) = self.store.load(&self.options.config_group)? else {
            tracing::info!("No stored {} configuration, keeping current calibration", self.options.config_group);
            self.rebuild_config_vars();
            return Ok(Vec::new());
        };

        let before = self.config_group();
        self.apply_stored(&group);
        self.rebuild_config_vars();

        let changed: Vec<String> = self
            .config_group()
            .iter()
            .filter(|(name, config)| before.get(name) != Some(*config))
            .map(|(name, _)| name.clone())
            .collect();
        if !changed.is_empty() {
            tracing::info!("Reloaded calibration for {}", changed.join(", "));
        }
        Ok(changed)
    }

    fn apply_stored(&mut self, group: &ConfigGroup) {
        for (name, config) in group.iter() {
            let Some(mapper) = self
                .channels
                .iter_mut()
                .find(|c| c.name() == name.as_str())
                .and_then(|c| c.mapper_mut())
            else {
                tracing::warn!("Stored configuration for unknown channel {}", name);
                continue;
            };
            match mapper.set_config(*config) {
                Ok(()) => tracing::debug!("Loaded calibration for {}", name),
                Err(e) => tracing::warn!("Ignoring stored calibration for {}: {}", name, e),
            }
        }
    }

    fn rebuild_config_vars(&mut self) {
        self.config_vars.clear();
        for channel in &self.channels {
            channel.config_variables(&mut self.config_vars);
        }
    }

    /// One control-loop iteration.
    ///
    /// Polls every channel, runs the heartbeat if it is due and then one
    /// update per queued motion edge. Returns the number of updates run.
    pub fn tick(&mut self, now: Duration) -> usize {
        for channel in self.channels.iter_mut() {
            channel.poll(now);
        }

        let mut updates = 0;
        if self.scheduler.poll(now) {
            self.send_update(now, Trigger::Schedule);
            updates += 1;
        }

        while let Ok(event) = self.motion_rx.try_recv() {
            self.on_motion(now, event);
            updates += 1;
        }

        if let Some(indicator) = self.indicator.as_mut() {
            indicator.tick(now);
        }
        updates
    }

    fn on_motion(&mut self, now: Duration, event: MotionEvent) {
        let MotionEvent { ordinal, edge } = event;
        self.send_update(now, Trigger::Motion { ordinal, channel: edge.channel });
        if let Some(indicator) = self.indicator.as_mut() {
            indicator.blink(ordinal);
        }
        tracing::debug!("Motion{}!", ordinal);
    }

    /// Read every channel in order and rebuild the live group, without
    /// publishing.
    pub fn read_sensors(&mut self, now: Duration) -> Vec<ChannelStatus> {
        self.vars.clear();
        let vars = &mut self.vars;
        self.channels.iter_mut().map(|c| c.read(now, vars)).collect()
    }

    /// Read all channels and publish the result. Never fails: channels that
    /// cannot read are published with their last values marked invalid.
    pub fn send_update(&mut self, now: Duration, trigger: Trigger) {
        let statuses = self.read_sensors(now);
        self.publisher.publish(&self.vars);
        self.updates += 1;

        let summary: Vec<String> = statuses.iter().map(|s| s.to_string()).collect();
        tracing::debug!(trigger = %trigger, "OK? {}", summary.join(", "));
    }

    /// Apply a configuration form (`<channel>_<field>` → text).
    ///
    /// Either every entry is accepted and the new configuration is saved,
    /// or nothing changes. Returns the names of the channels that changed.
    pub fn submit_config(&mut self, form: &BTreeMap<String, String>) -> Result<Vec<String>> {
        for key in form.keys() {
            let known = self.channels.iter().any(|c| {
                c.mapper().is_some() && FIELDS.iter().any(|f| *key == format!("{}_{}", c.name(), f))
            });
            if !known {
                return Err(ConfigError::UnknownField(key.clone()).into());
            }
        }

        let mut group = self.config_group();
        let mut changed = Vec::new();
        for channel in &self.channels {
            let Some(mapper) = channel.mapper() else {
                continue;
            };
            let current = mapper.config();
            let updated = current.with_form_values(channel.name(), form)?;
            updated.validate(channel.name(), mapper.valid_range())?;
            if updated != current {
                group.insert(channel.name(), updated);
                changed.push(channel.name().to_string());
            }
        }

        if changed.is_empty() {
            return Ok(changed);
        }

        self.store.save(&self.options.config_group, &group)?;
        for channel in self.channels.iter_mut() {
            let name = channel.name().to_string();
            if let (Some(config), Some(mapper)) = (group.get(&name), channel.mapper_mut()) {
                mapper.set_config(*config)?;
            }
        }
        self.rebuild_config_vars();

        tracing::info!("Updated calibration for {}", changed.join(", "));
        Ok(changed)
    }
}
