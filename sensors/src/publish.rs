//! Publish and discovery collaborators
//!
//! The monitor hands every update to a [`Publisher`] and announces its
//! measurements once at startup through a [`Discovery`]. Both are
//! fire-and-forget: delivery failures are logged by the implementation and
//! never reach the monitor.

use crate::variables::{Variable, VariableSet};
use crate::SensorKind;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use std::sync::{Arc, Mutex};

/// Receives the live variable group after every update
pub trait Publisher: Send {
    fn publish(&mut self, vars: &VariableSet);
}

/// Announces a published measurement to a home-automation controller
pub trait Discovery: Send {
    fn register(&mut self, variable: &Variable, kind: SensorKind);
}

/// Identity of this node as shown to home-automation controllers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceInfo {
    pub name: String,
    pub manufacturer: String,
    pub model: String,
    pub software: String,
}

impl Default for DeviceInfo {
    fn default() -> Self {
        Self {
            name: "roomwatch".to_string(),
            manufacturer: "Roomwatch".to_string(),
            model: "Room133".to_string(),
            software: format!("roomwatch v{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl DeviceInfo {
    /// Topic the node publishes its live group on
    pub fn state_topic(&self, group: &str) -> String {
        format!("{}/{}", self.name, group)
    }

    /// Home Assistant discovery topic for one variable
    pub fn discovery_topic(&self, variable: &Variable, kind: SensorKind) -> String {
        let component = if kind.is_binary() { "binary_sensor" } else { "sensor" };
        format!("homeassistant/{}/{}/{}/config", component, self.name, variable.name)
    }

    /// Home Assistant discovery payload for one variable of `group`
    pub fn discovery_payload(&self, group: &str, variable: &Variable, kind: SensorKind) -> JsonValue {
        let mut payload = json!({
            "name": variable.name,
            "unique_id": format!("{}_{}", self.name, variable.name),
            "state_topic": self.state_topic(group),
            "value_template": format!("{{{{ value_json.{}.value }}}}", variable.name),
            "device": {
                "identifiers": [self.name],
                "name": self.name,
                "manufacturer": self.manufacturer,
                "model": self.model,
                "sw_version": self.software,
            },
        });

        if let Some(obj) = payload.as_object_mut() {
            if let Some(class) = kind.device_class() {
                obj.insert("device_class".to_string(), json!(class));
            }
            if kind.is_binary() {
                obj.insert("payload_on".to_string(), json!(true));
                obj.insert("payload_off".to_string(), json!(false));
            } else {
                obj.insert("state_class".to_string(), json!("measurement"));
                if !variable.units.is_empty() {
                    obj.insert("unit_of_measurement".to_string(), json!(variable.units));
                }
            }
        }
        payload
    }
}

/// Publisher that keeps every snapshot in memory; clones share the log
#[derive(Debug, Clone, Default)]
pub struct MemoryPublisher {
    published: Arc<Mutex<Vec<VariableSet>>>,
}

impl MemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    fn log(&self) -> std::sync::MutexGuard<'_, Vec<VariableSet>> {
        self.published.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn published(&self) -> Vec<VariableSet> {
        self.log().clone()
    }

    pub fn count(&self) -> usize {
        self.log().len()
    }

    pub fn last(&self) -> Option<VariableSet> {
        self.log().last().cloned()
    }
}

impl Publisher for MemoryPublisher {
    fn publish(&mut self, vars: &VariableSet) {
        self.log().push(vars.clone());
    }
}

/// Discovery that records registrations in memory; clones share the log
#[derive(Debug, Clone, Default)]
pub struct MemoryDiscovery {
    registered: Arc<Mutex<Vec<(String, SensorKind)>>>,
}

impl MemoryDiscovery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registered(&self) -> Vec<(String, SensorKind)> {
        self.registered.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
    }
}

impl Discovery for MemoryDiscovery {
    fn register(&mut self, variable: &Variable, kind: SensorKind) {
        self.registered
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((variable.name.clone(), kind));
    }
}
