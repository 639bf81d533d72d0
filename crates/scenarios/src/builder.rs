//! Builder pattern for creating custom congestion profiles
//!
//! This module provides ProfileBuilder for constructing CongestionProfile
//! instances with a fluent API.

use crate::level::ImpairmentLevel;
use crate::policy::QosPolicy;
use crate::profile::CongestionProfile;
use std::time::Duration;

/// Profile builder for creating custom profiles
pub struct ProfileBuilder {
    name: String,
    description: String,
    levels: Vec<ImpairmentLevel>,
    policy: QosPolicy,
    settle_interval: Duration,
    threshold_ms: Option<f64>,
}

impl ProfileBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            levels: Vec::new(),
            policy: QosPolicy::default(),
            settle_interval: Duration::from_secs(7),
            threshold_ms: None,
        }
    }

    pub fn description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }

    pub fn add_level(mut self, level: ImpairmentLevel) -> Self {
        self.levels.push(level);
        self
    }

    pub fn policy(mut self, policy: QosPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sub-second precision is dropped
    pub fn settle_interval(mut self, interval: Duration) -> Self {
        self.settle_interval = interval;
        self
    }

    pub fn threshold_ms(mut self, threshold_ms: f64) -> Self {
        self.threshold_ms = Some(threshold_ms);
        self
    }

    pub fn build(self) -> CongestionProfile {
        CongestionProfile {
            name: self.name,
            description: self.description,
            levels: self.levels,
            policy: self.policy,
            settle_interval_secs: self.settle_interval.as_secs(),
            threshold_ms: self.threshold_ms,
        }
    }
}
