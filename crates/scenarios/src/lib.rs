//! Congestion profiles for the backhaul QoS monitor
//!
//! This crate provides the data model shared by the link shaper and the
//! congestion controller: impairment levels, the QoS remediation policy, and
//! named profiles that bundle an ordered impairment table with a policy.

pub mod builder;
pub mod level;
pub mod policy;
pub mod presets;
pub mod profile;

pub use builder::ProfileBuilder;
pub use level::ImpairmentLevel;
pub use policy::{BandSpec, Classifier, QosPolicy, CONTROL_BAND, MAX_BANDS};
pub use presets::Presets;
pub use profile::CongestionProfile;

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScenarioError {
    #[error("Invalid impairment level: {0}")]
    InvalidLevel(String),

    #[error("Invalid QoS policy: {0}")]
    InvalidPolicy(String),

    #[error("Invalid profile: {0}")]
    InvalidProfile(String),

    #[error("Failed to read profile {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
