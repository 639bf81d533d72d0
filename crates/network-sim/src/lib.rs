//! Link shaping and latency probing
//!
//! This library provides the two collaborators of the congestion monitor:
//! [`LinkShaper`], implemented by [`QdiscManager`] on top of Linux `tc`, and
//! [`LatencyProbe`], implemented by [`PingProbe`] on top of the system `ping`.

pub mod probe;
pub mod qdisc;
pub mod shaper;
pub mod types;

pub use probe::{parse_ping_summary, ping_args, LatencyProbe, Measurement, PingProbe};
pub use qdisc::{QdiscManager, QdiscParent};
pub use shaper::LinkShaper;
pub use types::ShapingError;
