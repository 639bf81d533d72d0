//! Backhaul congestion monitor with QoS remediation
//!
//! Simulates progressively worse congestion on one interface, samples
//! latency after each step, and installs a traffic prioritization policy as
//! soon as latency crosses a threshold.
//!
//! The decision loop lives in [`CongestionController`]. It talks to the link
//! only through [`network_sim::LinkShaper`] and [`network_sim::LatencyProbe`],
//! so [`testing`] doubles can stand in for `tc` and `ping`.

pub mod config;
pub mod controller;
pub mod shutdown;
pub mod telemetry;
pub mod testing;

pub use config::{ConfigError, MonitorConfig};
pub use controller::{CongestionController, ControllerState, RunOutcome};
pub use shutdown::{spawn_signal_listener, ShutdownController, ShutdownReceiver};
pub use telemetry::{init_tracing, monitor_span, TelemetryConfig, TelemetryError, TelemetryGuard};

pub use network_sim::{LatencyProbe, LinkShaper, Measurement, PingProbe, QdiscManager, ShapingError};
pub use scenarios::{CongestionProfile, ImpairmentLevel, Presets, QosPolicy};
