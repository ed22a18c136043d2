//! JSON-lines publish sinks
//!
//! Each published snapshot becomes one line:
//!
//! ```text
//! {"timestamp":"2024-05-01T12:00:00Z","topic":"rooml33/room","values":{...}}
//! ```
//!
//! Discovery payloads use the same framing with `"payload"` in place of
//! `"values"`.

use crate::config::{PublishConfig, PublishSink};
use anyhow::{Context, Result};
use roomwatch_sensors::{DeviceInfo, Discovery, Publisher, SensorKind, Variable, VariableSet};
use serde_json::json;
use std::fs::OpenOptions;
use std::io::Write;

type Writer = Box<dyn Write + Send>;

/// Open the configured sink for appending
pub fn open_writer(config: &PublishConfig) -> Result<Writer> {
    match &config.sink {
        PublishSink::Stdout => Ok(Box::new(std::io::stdout())),
        PublishSink::File { path } => {
            if let Some(parent) = std::path::Path::new(path).parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open publish sink {}", path))?;
            Ok(Box::new(file))
        }
    }
}

fn write_line<W: Write + ?Sized>(writer: &mut W, line: &serde_json::Value) -> std::io::Result<()> {
    serde_json::to_writer(&mut *writer, line)?;
    writer.write_all(b"\n")?;
    writer.flush()
}

/// Writes every snapshot as one timestamped JSON line
pub struct JsonLinesPublisher<W: Write + Send> {
    writer: W,
    device: DeviceInfo,
}

impl<W: Write + Send> JsonLinesPublisher<W> {
    pub fn new(writer: W, device: DeviceInfo) -> Self {
        Self { writer, device }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> Publisher for JsonLinesPublisher<W> {
    fn publish(&mut self, vars: &VariableSet) {
        let line = json!({
            "timestamp": chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            "topic": self.device.state_topic(vars.name()),
            "values": vars.to_json(),
        });
        if let Err(e) = write_line(&mut self.writer, &line) {
            tracing::warn!("Failed to publish {}: {}", vars.name(), e);
        }
    }
}

/// Writes Home Assistant discovery payloads as JSON lines
pub struct JsonLinesDiscovery<W: Write + Send> {
    writer: W,
    device: DeviceInfo,
    group: String,
}

impl<W: Write + Send> JsonLinesDiscovery<W> {
    pub fn new(writer: W, device: DeviceInfo, group: &str) -> Self {
        Self {
            writer,
            device,
            group: group.to_string(),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> Discovery for JsonLinesDiscovery<W> {
    fn register(&mut self, variable: &Variable, kind: SensorKind) {
        let line = json!({
            "timestamp": chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            "topic": self.device.discovery_topic(variable, kind),
            "payload": self.device.discovery_payload(&self.group, variable, kind),
        });
        match write_line(&mut self.writer, &line) {
            Ok(()) => tracing::debug!("Registered {} for discovery", variable.name),
            Err(e) => tracing::warn!("Failed to register {}: {}", variable.name, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roomwatch_sensors::Value;

    fn device() -> DeviceInfo {
        DeviceInfo {
            name: "rooml33".to_string(),
            ..DeviceInfo::default()
        }
    }

    fn lines(buf: Vec<u8>) -> Vec<serde_json::Value> {
        String::from_utf8(buf)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn test_publish_writes_one_line_per_update() {
        let mut publisher = JsonLinesPublisher::new(Vec::new(), device());
        let mut vars = VariableSet::new("room");
        vars.upsert(Variable::float("temperature", Some(21.46), 1).with_units("°C"));
        vars.upsert(Variable::new("motion", Value::Bool(false)).with_ok(false));
        publisher.publish(&vars);
        publisher.publish(&vars);

        let out = lines(publisher.into_inner());
        assert_eq!(out.len(), 2);
        assert_eq!(out[0]["topic"], "rooml33/room");
        assert_eq!(out[0]["values"]["temperature"]["value"], 21.5);
        assert_eq!(out[0]["values"]["motion"]["ok"], false);
        assert!(chrono::DateTime::parse_from_rfc3339(out[0]["timestamp"].as_str().unwrap()).is_ok());
    }

    #[test]
    fn test_discovery_lines() {
        let mut discovery = JsonLinesDiscovery::new(Vec::new(), device(), "room");
        discovery.register(&Variable::float("leak", None, 0).with_units("%"), SensorKind::Moisture);

        let out = lines(discovery.into_inner());
        assert_eq!(out[0]["topic"], "homeassistant/sensor/rooml33/leak/config");
        assert_eq!(out[0]["payload"]["state_topic"], "rooml33/room");
    }

    #[test]
    fn test_file_sink_appends() {
        let path = std::env::temp_dir().join(format!("roomwatch-sink-{}/room.jsonl", std::process::id()));
        let config = PublishConfig {
            sink: PublishSink::File { path: path.to_string_lossy().into_owned() },
            discovery: false,
        };

        for _ in 0..2 {
            let mut publisher = JsonLinesPublisher::new(open_writer(&config).unwrap(), device());
            publisher.publish(&VariableSet::new("room"));
        }

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
        std::fs::remove_dir_all(path.parent().unwrap()).unwrap();
    }
}
