//! Edge-detected motion channels

use crate::variables::{Value, Variable, VariableSet};
use crate::{Channel, ChannelStatus, DiscoveryItem, SensorKind};
use roomwatch_hal::{DigitalInput, HalError};
use std::time::Duration;

/// Motion state of one PIR input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionState {
    Idle,
    Active,
}

/// Rising edge seen by a [`MotionChannel`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MotionEdge {
    pub channel: String,
    pub at: Duration,
}

type MotionHandler = Box<dyn FnMut(MotionEdge) + Send>;

/// Digital motion input with rising-edge notification.
///
/// The handler runs synchronously inside [`read`](MotionChannel::read),
/// once per `Idle -> Active` transition. The first successful read only
/// seeds the state, so motion already present at startup is not an edge.
pub struct MotionChannel {
    name: String,
    input: Box<dyn DigitalInput>,
    state: MotionState,
    last_transition: Option<Duration>,
    handler: Option<MotionHandler>,
    edges: u64,
    seeded: bool,
    ok: bool,
}

impl MotionChannel {
    pub fn new(name: &str, input: Box<dyn DigitalInput>) -> Self {
        Self {
            name: name.to_string(),
            input,
            state: MotionState::Idle,
            last_transition: None,
            handler: None,
            edges: 0,
            seeded: false,
            ok: true,
        }
    }

    /// Register the handler for rising edges, replacing any previous one
    pub fn on_motion<F>(&mut self, handler: F)
    where
        F: FnMut(MotionEdge) + Send + 'static,
    {
        self.handler = Some(Box::new(handler));
    }

    /// Poll the input and return whether motion is present.
    ///
    /// On a read error the previous state is kept.
    pub fn read(&mut self, now: Duration) -> Result<bool, HalError> {
        let level = match self.input.read_level() {
            Ok(level) => level,
            Err(e) => {
                self.ok = false;
                return Err(e);
            }
        };
        self.ok = true;

        let next = if level { MotionState::Active } else { MotionState::Idle };
        if !self.seeded {
            self.seeded = true;
            self.state = next;
            tracing::debug!("{}: initial state {:?}", self.name, next);
        } else if next != self.state {
            self.state = next;
            self.last_transition = Some(now);

            if next == MotionState::Active {
                self.edges += 1;
                tracing::info!("{}: motion detected ({} total)", self.name, self.edges);
                if let Some(handler) = self.handler.as_mut() {
                    handler(MotionEdge { channel: self.name.clone(), at: now });
                }
            }
        }

        Ok(self.motion())
    }

    pub fn motion(&self) -> bool {
        self.state == MotionState::Active
    }

    pub fn state(&self) -> MotionState {
        self.state
    }

    pub fn last_transition(&self) -> Option<Duration> {
        self.last_transition
    }

    /// Rising edges seen since startup
    pub fn edge_count(&self) -> u64 {
        self.edges
    }
}

impl Channel for MotionChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn poll(&mut self, now: Duration) {
        if let Err(e) = MotionChannel::read(self, now) {
            tracing::debug!("Failed to poll {}: {}", self.name, e);
        }
    }

    fn read(&mut self, now: Duration, vars: &mut VariableSet) -> ChannelStatus {
        if let Err(e) = MotionChannel::read(self, now) {
            tracing::warn!("Failed to read {}: {}", self.name, e);
        }

        vars.upsert(
            Variable::new(&self.name, Value::Bool(self.motion()))
                .with_description("motion detected")
                .with_ok(self.ok),
        );

        ChannelStatus {
            name: self.name.clone(),
            ok: self.ok,
            summary: format!("M:{}", if self.motion() { "T" } else { "F" }),
        }
    }

    fn discovery(&self) -> Vec<DiscoveryItem> {
        vec![DiscoveryItem { variable: self.name.clone(), kind: SensorKind::Motion }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roomwatch_hal::sim::SimDigital;
    use std::sync::{Arc, Mutex};

    fn channel_with_recorder() -> (MotionChannel, roomwatch_hal::sim::SimDigitalHandle, Arc<Mutex<Vec<Duration>>>) {
        let pir = SimDigital::new("pir", false);
        let handle = pir.handle();
        let mut channel = MotionChannel::new("motion", Box::new(pir));
        let fired = Arc::new(Mutex::new(Vec::new()));
        let sink = fired.clone();
        channel.on_motion(move |edge| sink.lock().unwrap().push(edge.at));
        (channel, handle, fired)
    }

    #[test]
    fn test_fires_once_per_rising_edge() {
        let (mut channel, handle, fired) = channel_with_recorder();

        let sequence = [false, false, true, true, false, true];
        for (i, level) in sequence.iter().enumerate() {
            handle.set(*level);
            channel.read(Duration::from_secs(i as u64)).unwrap();
        }

        assert_eq!(*fired.lock().unwrap(), vec![Duration::from_secs(2), Duration::from_secs(5)]);
        assert_eq!(channel.edge_count(), 2);
        assert_eq!(channel.state(), MotionState::Active);
    }

    #[test]
    fn test_falling_edge_records_transition_without_firing() {
        let (mut channel, handle, fired) = channel_with_recorder();
        channel.read(Duration::ZERO).unwrap();
        handle.set(true);
        channel.read(Duration::from_secs(1)).unwrap();
        handle.set(false);
        channel.read(Duration::from_secs(4)).unwrap();

        assert_eq!(fired.lock().unwrap().len(), 1);
        assert_eq!(channel.last_transition(), Some(Duration::from_secs(4)));
        assert!(!channel.motion());
    }

    #[test]
    fn test_read_error_keeps_state() {
        let (mut channel, handle, _) = channel_with_recorder();
        handle.set(true);
        channel.read(Duration::from_secs(1)).unwrap();
        handle.set_failing(true);

        let mut vars = VariableSet::new("room");
        let status = Channel::read(&mut channel, Duration::from_secs(2), &mut vars);
        assert!(!status.ok);
        let var = vars.get("motion").unwrap();
        assert_eq!(var.as_bool(), Some(true));
        assert!(!var.ok);
    }

    #[test]
    fn test_channel_read_reports_state() {
        let (mut channel, handle, fired) = channel_with_recorder();
        let mut vars = VariableSet::new("room");
        Channel::read(&mut channel, Duration::ZERO, &mut vars);
        handle.set(true);

        let status = Channel::read(&mut channel, Duration::from_secs(1), &mut vars);
        assert_eq!(status.summary, "M:T");
        assert_eq!(vars.get("motion").unwrap().as_bool(), Some(true));
        // A read through the channel interface also detects the edge.
        assert_eq!(fired.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_active_at_first_read_seeds_without_firing() {
        let (mut channel, handle, fired) = channel_with_recorder();
        handle.set(true);
        assert!(channel.read(Duration::from_secs(1)).unwrap());
        assert!(fired.lock().unwrap().is_empty());
        assert_eq!(channel.last_transition(), None);

        handle.set(false);
        channel.read(Duration::from_secs(2)).unwrap();
        handle.set(true);
        channel.read(Duration::from_secs(3)).unwrap();
        assert_eq!(*fired.lock().unwrap(), vec![Duration::from_secs(3)]);
    }

    #[test]
    fn test_failed_first_read_does_not_seed() {
        let (mut channel, handle, fired) = channel_with_recorder();
        handle.set_failing(true);
        assert!(channel.read(Duration::from_secs(1)).is_err());

        handle.set_failing(false);
        handle.set(true);
        channel.read(Duration::from_secs(2)).unwrap();
        assert!(fired.lock().unwrap().is_empty());
        assert!(channel.motion());
    }
}
