//! Congestion profiles with preset implementations
//!
//! A [`CongestionProfile`] bundles an ordered impairment table with the
//! remediation policy and the timing the monitor should use. Profiles can be
//! built in code, taken from [`crate::Presets`], or loaded from JSON.

use crate::level::ImpairmentLevel;
use crate::policy::QosPolicy;
use crate::ScenarioError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Ordered impairment table plus remediation policy
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CongestionProfile {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Levels in the order they are applied, expected to worsen monotonically
    pub levels: Vec<ImpairmentLevel>,
    #[serde(default)]
    pub policy: QosPolicy,
    /// Wait between shaping a level and sampling latency
    #[serde(default = "default_settle_secs")]
    pub settle_interval_secs: u64,
    /// Overrides the monitor's default latency threshold
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold_ms: Option<f64>,
}

fn default_settle_secs() -> u64 {
    7
}

impl CongestionProfile {
    /// Four staged levels approximating 5G backhaul congestion
    pub fn backhaul_5g() -> Self {
        Self {
            name: "backhaul_5g".to_string(),
            description: "Light to severe 5G backhaul congestion with jitter and rate caps"
                .to_string(),
            levels: vec![
                ImpairmentLevel::new(10, 0.001)
                    .with_jitter(2)
                    .with_rate_kbps(45_000),
                ImpairmentLevel::new(50, 0.01)
                    .with_jitter(10)
                    .with_rate_kbps(30_000),
                ImpairmentLevel::new(100, 0.02)
                    .with_jitter(20)
                    .with_rate_kbps(20_000),
                ImpairmentLevel::new(200, 0.05)
                    .with_jitter(40)
                    .with_rate_kbps(10_000),
            ],
            policy: QosPolicy::graded_backhaul(),
            settle_interval_secs: 7,
            threshold_ms: None,
        }
    }

    /// Three delay/loss steps without jitter or rate caps
    pub fn progressive() -> Self {
        Self {
            name: "progressive".to_string(),
            description: "Simple worsening delay and loss steps".to_string(),
            levels: vec![
                ImpairmentLevel::new(20, 0.005),
                ImpairmentLevel::new(50, 0.01),
                ImpairmentLevel::new(100, 0.02),
            ],
            policy: QosPolicy::basic(),
            settle_interval_secs: 10,
            threshold_ms: None,
        }
    }

    /// Observe the unshaped link for a number of rounds
    ///
    /// Every level is passthrough, so remediation only triggers if the real
    /// link is already congested.
    pub fn steady_state(rounds: usize) -> Self {
        Self {
            name: "steady_state".to_string(),
            description: "Watch the unshaped link and remediate on real congestion".to_string(),
            levels: vec![ImpairmentLevel::passthrough(); rounds],
            policy: QosPolicy::basic(),
            settle_interval_secs: 10,
            threshold_ms: None,
        }
    }

    pub fn settle_interval(&self) -> Duration {
        Duration::from_secs(self.settle_interval_secs)
    }

    pub fn from_json_str(json: &str) -> Result<Self, ScenarioError> {
        let profile: Self = serde_json::from_str(json)?;
        profile.validate()?;
        Ok(profile)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ScenarioError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ScenarioError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    pub fn to_json_pretty(&self) -> Result<String, ScenarioError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ScenarioError> {
        if self.name.trim().is_empty() {
            return Err(ScenarioError::InvalidProfile(
                "name must not be empty".to_string(),
            ));
        }
        for (index, level) in self.levels.iter().enumerate() {
            level.validate().map_err(|e| {
                ScenarioError::InvalidProfile(format!("level {}: {}", index + 1, e))
            })?;
        }
        if let Some(threshold) = self.threshold_ms {
            if !threshold.is_finite() || threshold <= 0.0 {
                return Err(ScenarioError::InvalidProfile(format!(
                    "threshold_ms must be positive, got {}",
                    threshold
                )));
            }
        }
        self.policy.validate()
    }
}
