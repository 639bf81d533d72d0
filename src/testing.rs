//! Test doubles for the controller's collaborators
//!
//! [`RecordingShaper`] logs every shaping call and can be told to fail some
//! of them; [`ScriptedProbe`] replays a fixed list of probe results. Both are
//! used by the unit tests here and by the integration tests in `tests/`.

use crate::shutdown::ShutdownController;
use async_trait::async_trait;
use network_sim::{LatencyProbe, LinkShaper, Measurement, ShapingError};
use parking_lot::Mutex;
use scenarios::{ImpairmentLevel, QosPolicy};
use std::collections::{HashSet, VecDeque};

/// One call received by [`RecordingShaper`]
#[derive(Debug, Clone, PartialEq)]
pub enum ShaperCall {
    Clear(String),
    Impair(String, ImpairmentLevel),
    Policy(String, QosPolicy),
}

#[derive(Debug, Default)]
pub struct RecordingShaper {
    calls: Mutex<Vec<ShaperCall>>,
    impairments_seen: Mutex<usize>,
    failing_impairments: HashSet<usize>,
    fail_clear: bool,
    fail_policy: bool,
}

impl RecordingShaper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the nth `apply_impairment` call fail (0-based, counted per call)
    pub fn failing_impairments(mut self, calls: impl IntoIterator<Item = usize>) -> Self {
        self.failing_impairments.extend(calls);
        self
    }

    pub fn failing_clear(mut self) -> Self {
        self.fail_clear = true;
        self
    }

    pub fn failing_policy(mut self) -> Self {
        self.fail_policy = true;
        self
    }

    pub fn calls(&self) -> Vec<ShaperCall> {
        self.calls.lock().clone()
    }

    /// Levels passed to `apply_impairment`, including rejected ones
    pub fn impairments(&self) -> Vec<ImpairmentLevel> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                ShaperCall::Impair(_, level) => Some(level.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn clear_count(&self) -> usize {
        self.count(|call| matches!(call, ShaperCall::Clear(_)))
    }

    pub fn policy_count(&self) -> usize {
        self.count(|call| matches!(call, ShaperCall::Policy(..)))
    }

    fn count(&self, predicate: impl Fn(&ShaperCall) -> bool) -> usize {
        self.calls.lock().iter().filter(|call| predicate(call)).count()
    }

    fn rejected() -> ShapingError {
        ShapingError::PermissionDenied
    }
}

#[async_trait]
impl LinkShaper for RecordingShaper {
    async fn clear(&self, interface: &str) -> Result<(), ShapingError> {
        self.calls.lock().push(ShaperCall::Clear(interface.to_string()));
        if self.fail_clear {
            return Err(Self::rejected());
        }
        Ok(())
    }

    async fn apply_impairment(
        &self,
        interface: &str,
        level: &ImpairmentLevel,
    ) -> Result<(), ShapingError> {
        self.calls
            .lock()
            .push(ShaperCall::Impair(interface.to_string(), level.clone()));
        let nth = {
            let mut seen = self.impairments_seen.lock();
            let nth = *seen;
            *seen += 1;
            nth
        };
        if self.failing_impairments.contains(&nth) {
            return Err(Self::rejected());
        }
        Ok(())
    }

    async fn apply_policy(&self, interface: &str, policy: &QosPolicy) -> Result<(), ShapingError> {
        self.calls
            .lock()
            .push(ShaperCall::Policy(interface.to_string(), policy.clone()));
        if self.fail_policy {
            return Err(Self::rejected());
        }
        Ok(())
    }
}

/// One scripted probe response
#[derive(Debug, Clone)]
pub enum ProbeStep {
    Reply(Measurement),
    /// Request shutdown, then never answer
    InterruptAndHang(ShutdownController),
    /// Never answer
    Hang,
}

/// Replays [`ProbeStep`]s in order; returns `Unmeasurable` once the script runs out
#[derive(Debug, Default)]
pub struct ScriptedProbe {
    steps: Mutex<VecDeque<ProbeStep>>,
    requests: Mutex<Vec<(String, u32)>>,
}

impl ScriptedProbe {
    pub fn new(steps: impl IntoIterator<Item = ProbeStep>) -> Self {
        Self {
            steps: Mutex::new(steps.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// One successful reply per value, in milliseconds
    pub fn latencies(values: impl IntoIterator<Item = f64>) -> Self {
        Self::new(
            values
                .into_iter()
                .map(|ms| ProbeStep::Reply(Measurement::Latency(ms))),
        )
    }

    /// Number of `sample` calls, including ones that never answered
    pub fn sample_count(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn requests(&self) -> Vec<(String, u32)> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl LatencyProbe for ScriptedProbe {
    async fn sample(&self, target: &str, probe_count: u32) -> Measurement {
        self.requests.lock().push((target.to_string(), probe_count));
        let step = self.steps.lock().pop_front();
        match step {
            Some(ProbeStep::Reply(measurement)) => measurement,
            Some(ProbeStep::InterruptAndHang(controller)) => {
                controller.shutdown();
                std::future::pending().await
            }
            Some(ProbeStep::Hang) => std::future::pending().await,
            None => Measurement::Unmeasurable,
        }
    }
}
