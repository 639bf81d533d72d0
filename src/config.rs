//! Monitor configuration
//!
//! [`MonitorConfig`] is everything one controller run needs: where to shape,
//! what to probe, when to remediate, and the impairment table and policy to
//! use. It is usually derived from a [`CongestionProfile`] and then adjusted
//! by command line overrides.

use scenarios::{CongestionProfile, ImpairmentLevel, QosPolicy, ScenarioError};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_INTERFACE: &str = "enp0s3";
pub const DEFAULT_TARGET: &str = "8.8.8.8";
pub const DEFAULT_THRESHOLD_MS: f64 = 150.0;
pub const DEFAULT_SETTLE_INTERVAL: Duration = Duration::from_secs(7);
pub const DEFAULT_PROBE_COUNT: u32 = 4;
pub const DEFAULT_POST_REMEDIATION_DELAY: Duration = Duration::from_secs(3);

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Latency threshold must be a positive number of milliseconds, got {0}")]
    InvalidThreshold(f64),

    #[error("Probe count must be at least 1")]
    InvalidProbeCount,

    #[error("Interface name must not be empty")]
    EmptyInterface,

    #[error("Probe target must not be empty")]
    EmptyTarget,

    #[error("Probe target must be a host name or address, got {0:?}")]
    InvalidTarget(String),

    #[error("Level {index}: {source}")]
    InvalidLevel {
        index: usize,
        #[source]
        source: ScenarioError,
    },

    #[error(transparent)]
    Policy(#[from] ScenarioError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonitorConfig {
    /// Interface whose egress queue is shaped
    pub interface: String,
    /// Host probed for round-trip latency
    pub target: String,
    /// Latency strictly above this value counts as congestion
    pub threshold_ms: f64,
    /// Wait between shaping a level and sampling it
    pub settle_interval: Duration,
    /// Echo requests per sample
    pub probe_count: u32,
    /// Wait before the follow-up sample after remediation, `None` to skip it
    pub post_remediation_delay: Option<Duration>,
    pub levels: Vec<ImpairmentLevel>,
    pub policy: QosPolicy,
}

impl MonitorConfig {
    pub fn from_profile(profile: &CongestionProfile) -> Self {
        Self {
            threshold_ms: profile.threshold_ms.unwrap_or(DEFAULT_THRESHOLD_MS),
            settle_interval: profile.settle_interval(),
            levels: profile.levels.clone(),
            policy: profile.policy.clone(),
            ..Self::default()
        }
    }

    pub fn with_interface(mut self, interface: impl Into<String>) -> Self {
        self.interface = interface.into();
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    pub fn with_threshold_ms(mut self, threshold_ms: f64) -> Self {
        self.threshold_ms = threshold_ms;
        self
    }

    pub fn with_settle_interval(mut self, interval: Duration) -> Self {
        self.settle_interval = interval;
        self
    }

    pub fn with_probe_count(mut self, probe_count: u32) -> Self {
        self.probe_count = probe_count;
        self
    }

    pub fn with_post_remediation_delay(mut self, delay: Option<Duration>) -> Self {
        self.post_remediation_delay = delay;
        self
    }

    pub fn with_levels(mut self, levels: Vec<ImpairmentLevel>) -> Self {
        self.levels = levels;
        self
    }

    pub fn with_policy(mut self, policy: QosPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interface.trim().is_empty() {
            return Err(ConfigError::EmptyInterface);
        }
        if self.target.trim().is_empty() {
            return Err(ConfigError::EmptyTarget);
        }
        if self.target.starts_with('-') || self.target.chars().any(char::is_whitespace) {
            return Err(ConfigError::InvalidTarget(self.target.clone()));
        }
        if !self.threshold_ms.is_finite() || self.threshold_ms <= 0.0 {
            return Err(ConfigError::InvalidThreshold(self.threshold_ms));
        }
        if self.probe_count == 0 {
            return Err(ConfigError::InvalidProbeCount);
        }
        for (index, level) in self.levels.iter().enumerate() {
            level
                .validate()
                .map_err(|source| ConfigError::InvalidLevel {
                    index: index + 1,
                    source,
                })?;
        }
        self.policy.validate()?;
        Ok(())
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interface: DEFAULT_INTERFACE.to_string(),
            target: DEFAULT_TARGET.to_string(),
            threshold_ms: DEFAULT_THRESHOLD_MS,
            settle_interval: DEFAULT_SETTLE_INTERVAL,
            probe_count: DEFAULT_PROBE_COUNT,
            post_remediation_delay: Some(DEFAULT_POST_REMEDIATION_DELAY),
            levels: Vec::new(),
            policy: QosPolicy::default(),
        }
    }
}
