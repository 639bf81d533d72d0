//! Impairment levels
//!
//! An [`ImpairmentLevel`] is one step of a congestion simulation: the delay,
//! jitter, loss and rate cap that the link shaper installs on the interface
//! before latency is sampled.

use crate::ScenarioError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// One step of simulated link degradation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImpairmentLevel {
    /// Added one-way delay in milliseconds
    pub delay_ms: u32,
    /// Delay variation in milliseconds (normal distribution)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jitter_ms: Option<u32>,
    /// Random packet loss (0.0-1.0)
    #[serde(default)]
    pub loss_pct: f32,
    /// Bandwidth cap in kbit/s
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_kbps: Option<u32>,
}

impl ImpairmentLevel {
    pub fn new(delay_ms: u32, loss_pct: f32) -> Self {
        Self {
            delay_ms,
            jitter_ms: None,
            loss_pct,
            rate_kbps: None,
        }
    }

    /// A level that leaves the link unshaped
    pub fn passthrough() -> Self {
        Self::new(0, 0.0)
    }

    pub fn with_jitter(mut self, jitter_ms: u32) -> Self {
        self.jitter_ms = Some(jitter_ms);
        self
    }

    pub fn with_rate_kbps(mut self, rate_kbps: u32) -> Self {
        self.rate_kbps = Some(rate_kbps);
        self
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(u64::from(self.delay_ms))
    }

    pub fn jitter(&self) -> Option<Duration> {
        self.jitter_ms
            .filter(|j| *j > 0)
            .map(|j| Duration::from_millis(u64::from(j)))
    }

    /// Loss expressed as a percentage, the unit netem expects
    pub fn loss_percent(&self) -> f32 {
        self.loss_pct * 100.0
    }

    /// True when applying this level installs no netem qdisc at all
    pub fn is_passthrough(&self) -> bool {
        self.delay_ms == 0
            && self.jitter().is_none()
            && self.loss_pct <= 0.0
            && self.rate_kbps.is_none()
    }

    pub fn validate(&self) -> Result<(), ScenarioError> {
        if !self.loss_pct.is_finite() || !(0.0..=1.0).contains(&self.loss_pct) {
            return Err(ScenarioError::InvalidLevel(format!(
                "loss_pct must be within 0.0-1.0, got {}",
                self.loss_pct
            )));
        }
        if self.rate_kbps == Some(0) {
            return Err(ScenarioError::InvalidLevel(
                "rate_kbps must be positive when set".to_string(),
            ));
        }
        if let Some(jitter) = self.jitter_ms {
            // netem cannot jitter below zero delay
            if jitter > 0 && self.delay_ms == 0 {
                return Err(ScenarioError::InvalidLevel(
                    "jitter requires a non-zero delay".to_string(),
                ));
            }
        }
        Ok(())
    }
}

impl Default for ImpairmentLevel {
    fn default() -> Self {
        Self::passthrough()
    }
}

impl fmt::Display for ImpairmentLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_passthrough() {
            return write!(f, "passthrough");
        }
        write!(f, "delay={}ms", self.delay_ms)?;
        if let Some(jitter) = self.jitter_ms.filter(|j| *j > 0) {
            write!(f, " ±{}ms", jitter)?;
        }
        let loss = format!("{:.3}", self.loss_percent());
        write!(f, ", loss={}%", loss.trim_end_matches('0').trim_end_matches('.'))?;
        match self.rate_kbps {
            Some(rate) => write!(f, ", rate={}kbit", rate),
            None => write!(f, ", rate=unlimited"),
        }
    }
}
