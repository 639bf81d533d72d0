//! Latency probing
//!
//! [`LatencyProbe`] returns a single [`Measurement`] per call. Network failure
//! is a value ([`Measurement::Unmeasurable`]), never an error, so callers can
//! tell "no signal" apart from "congested".

use async_trait::async_trait;
use log::{debug, warn};
use std::fmt;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;

/// Result of one latency sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Measurement {
    /// Mean round-trip time in milliseconds
    Latency(f64),
    /// Probe failed or its output could not be parsed
    Unmeasurable,
}

impl Measurement {
    /// Accept only finite, non-negative values
    pub fn from_millis(ms: f64) -> Self {
        if ms.is_finite() && ms >= 0.0 {
            Measurement::Latency(ms)
        } else {
            Measurement::Unmeasurable
        }
    }

    pub fn latency_ms(&self) -> Option<f64> {
        match self {
            Measurement::Latency(ms) => Some(*ms),
            Measurement::Unmeasurable => None,
        }
    }

    pub fn is_unmeasurable(&self) -> bool {
        matches!(self, Measurement::Unmeasurable)
    }
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Measurement::Latency(ms) => write!(f, "{:.3}ms", ms),
            Measurement::Unmeasurable => write!(f, "unmeasurable"),
        }
    }
}

/// Fixed-count round trip probe against a target host
#[async_trait]
pub trait LatencyProbe: Send + Sync {
    async fn sample(&self, target: &str, probe_count: u32) -> Measurement;
}

#[async_trait]
impl<T: LatencyProbe + ?Sized> LatencyProbe for Arc<T> {
    async fn sample(&self, target: &str, probe_count: u32) -> Measurement {
        (**self).sample(target, probe_count).await
    }
}

/// Extract the average RTT from ping's summary line
///
/// Handles both `rtt min/avg/max/mdev = 9.1/10.2/11.3/0.4 ms` (iputils) and
/// `round-trip min/avg/max/stddev = ...` (BSD/busybox).
pub fn parse_ping_summary(output: &str) -> Option<f64> {
    let line = output
        .lines()
        .rev()
        .find(|line| line.contains("min/avg/max"))?;
    let (_, values) = line.split_once('=')?;
    let avg = values.trim().split('/').nth(1)?;
    match Measurement::from_millis(avg.trim().parse().ok()?) {
        Measurement::Latency(ms) => Some(ms),
        Measurement::Unmeasurable => None,
    }
}

/// Probe backed by the system `ping` binary
#[derive(Debug, Clone)]
pub struct PingProbe {
    program: String,
    per_probe_budget: Duration,
}

impl PingProbe {
    pub fn new() -> Self {
        Self {
            program: "ping".to_string(),
            per_probe_budget: Duration::from_secs(2),
        }
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Time allowed per echo request before the whole run is abandoned
    pub fn with_per_probe_budget(mut self, budget: Duration) -> Self {
        self.per_probe_budget = budget;
        self
    }

    fn deadline(&self, probe_count: u32) -> Duration {
        // ping spaces requests one second apart
        self.per_probe_budget * probe_count + Duration::from_secs(u64::from(probe_count))
    }
}

impl Default for PingProbe {
    fn default() -> Self {
        Self::new()
    }
}

/// Arguments for one quiet ping run; `--` keeps the target from being read as an option
pub fn ping_args(target: &str, probe_count: u32) -> Vec<String> {
    vec![
        "-c".to_string(),
        probe_count.to_string(),
        "-q".to_string(),
        "--".to_string(),
        target.to_string(),
    ]
}

#[async_trait]
impl LatencyProbe for PingProbe {
    async fn sample(&self, target: &str, probe_count: u32) -> Measurement {
        let probe_count = probe_count.max(1);
        let mut cmd = Command::new(&self.program);
        cmd.args(ping_args(target, probe_count))
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.deadline(probe_count), cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                warn!("Failed to run {}: {}", self.program, e);
                return Measurement::Unmeasurable;
            }
            Err(_) => {
                warn!("{} to {} timed out", self.program, target);
                return Measurement::Unmeasurable;
            }
        };

        // ping exits non-zero on partial loss, so the summary line decides
        let stdout = String::from_utf8_lossy(&output.stdout);
        match parse_ping_summary(&stdout) {
            Some(ms) => Measurement::Latency(ms),
            None => {
                debug!(
                    "Could not parse ping output (status {}): {}",
                    output.status,
                    stdout.trim()
                );
                Measurement::Unmeasurable
            }
        }
    }
}
