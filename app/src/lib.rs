//! Roomwatch node application
//!
//! Shared by the `roomwatch` daemon and `roomwatch-cli`: node
//! configuration, hardware construction, publish sinks and the control
//! loop.

pub mod config;
pub mod hardware;
pub mod node;
pub mod runner;
pub mod sink;

pub use config::NodeConfig;
pub use hardware::{Hardware, LinuxHardware, SimulatedHardware};
pub use node::build_monitor;
pub use runner::run;
