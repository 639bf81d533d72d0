//! Congestion controller
//!
//! Steps through the configured impairment levels one at a time:
//! shape the link, let it settle, take one latency sample, decide. The first
//! sample above the threshold triggers the QoS policy and ends the run. A
//! failed probe is never taken as congestion, and a failed shaping call skips
//! its level instead of aborting the run.
//!
//! ```text
//! Idle -> Stepping(0) -> .. -> Stepping(n-1) -> Exhausted
//!              |                     |
//!              +---> Remediating ----+--> Remediated
//! any non-terminal state --shutdown--> Interrupted
//! ```

use crate::config::MonitorConfig;
use crate::shutdown::ShutdownReceiver;
use network_sim::{LatencyProbe, LinkShaper, Measurement, ShapingError};
use scenarios::ImpairmentLevel;
use serde::Serialize;
use std::time::Duration;
use crate::telemetry::monitor_span;
use tracing::{debug, error, info, warn, Instrument, Span};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ControllerState {
    Idle,
    /// Evaluating the level at this index
    Stepping(usize),
    Remediating,
    Remediated,
    Exhausted,
    Interrupted,
}

impl ControllerState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ControllerState::Remediated | ControllerState::Exhausted | ControllerState::Interrupted
        )
    }
}

/// How a run ended. Level indices are 0-based.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Congestion was detected and the QoS policy was installed
    Remediated {
        level: usize,
        latency_ms: f64,
        /// False when the shaper rejected the policy
        policy_applied: bool,
        post_remediation_ms: Option<f64>,
    },
    /// Every level was walked without crossing the threshold
    Exhausted { levels: usize },
    /// Shutdown was requested; one cleanup attempt was made
    Interrupted {
        level: Option<usize>,
        cleanup_ok: bool,
    },
}

impl RunOutcome {
    pub fn state(&self) -> ControllerState {
        match self {
            RunOutcome::Remediated { .. } => ControllerState::Remediated,
            RunOutcome::Exhausted { .. } => ControllerState::Exhausted,
            RunOutcome::Interrupted { .. } => ControllerState::Interrupted,
        }
    }

    /// Process exit code: 130 after an interruption, 0 otherwise
    pub fn exit_code(&self) -> i32 {
        match self {
            RunOutcome::Interrupted { .. } => 130,
            _ => 0,
        }
    }
}

pub struct CongestionController<S, P> {
    config: MonitorConfig,
    shaper: S,
    probe: P,
    state: ControllerState,
    span: Span,
}

impl<S: LinkShaper, P: LatencyProbe> CongestionController<S, P> {
    pub fn new(config: MonitorConfig, shaper: S, probe: P) -> Self {
        let span = monitor_span(&config);
        Self {
            config,
            shaper,
            probe,
            state: ControllerState::Idle,
            span,
        }
    }

    /// Record every controller event inside `span`
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    /// Run the simulation to a terminal state
    pub async fn run(mut self, shutdown: ShutdownReceiver) -> RunOutcome {
        let span = self.span.clone();
        self.drive(shutdown).instrument(span).await
    }

    async fn drive(&mut self, mut shutdown: ShutdownReceiver) -> RunOutcome {
        let total = self.config.levels.len();
        info!(
            threshold_ms = self.config.threshold_ms,
            settle_secs = self.config.settle_interval.as_secs_f64(),
            levels = total,
            "Starting congestion monitor"
        );

        if shutdown.is_shutdown() {
            return self.interrupt(None).await;
        }

        for index in 0..total {
            if shutdown.is_shutdown() {
                return self.interrupt(Some(index)).await;
            }
            self.transition(ControllerState::Stepping(index));

            let level = self.config.levels[index].clone();
            info!(
                level = index + 1,
                "Simulating congestion level {}/{}: {}",
                index + 1,
                total,
                level
            );

            if let Err(e) = self.shape(&level).await {
                warn!(level = index + 1, "Shaping failed, skipping level: {}", e);
                continue;
            }

            let settled = tokio::select! {
                biased;
                _ = shutdown.recv() => false,
                _ = tokio::time::sleep(self.config.settle_interval) => true,
            };
            if !settled {
                return self.interrupt(Some(index)).await;
            }

            let sampled = tokio::select! {
                biased;
                _ = shutdown.recv() => None,
                m = self.probe.sample(&self.config.target, self.config.probe_count) => Some(m),
            };
            let Some(measurement) = sampled else {
                return self.interrupt(Some(index)).await;
            };

            match measurement {
                Measurement::Unmeasurable => {
                    error!(
                        level = index + 1,
                        "Failed to measure latency. Check network connectivity."
                    );
                }
                Measurement::Latency(latency_ms) if latency_ms > self.config.threshold_ms => {
                    warn!(
                        level = index + 1,
                        latency_ms,
                        threshold_ms = self.config.threshold_ms,
                        "Congestion detected! Latency: {}ms > {}ms threshold",
                        latency_ms,
                        self.config.threshold_ms
                    );
                    return self.remediate(index, latency_ms, &mut shutdown).await;
                }
                Measurement::Latency(latency_ms) => {
                    info!(
                        level = index + 1,
                        latency_ms,
                        "Network condition level {}: {}ms latency (threshold: {}ms)",
                        index + 1,
                        latency_ms,
                        self.config.threshold_ms
                    );
                }
            }
        }

        self.transition(ControllerState::Exhausted);
        info!(
            levels = total,
            "All levels evaluated without crossing the threshold; no remediation applied"
        );
        RunOutcome::Exhausted { levels: total }
    }

    /// Clear, then install one level
    async fn shape(&self, level: &ImpairmentLevel) -> Result<(), ShapingError> {
        let interface = &self.config.interface;
        self.shaper.clear(interface).await?;
        self.shaper.apply_impairment(interface, level).await
    }

    async fn remediate(
        &mut self,
        level: usize,
        latency_ms: f64,
        shutdown: &mut ShutdownReceiver,
    ) -> RunOutcome {
        self.transition(ControllerState::Remediating);
        info!("Enabling QoS remediation: {}", self.config.policy);

        let interface = &self.config.interface;
        if let Err(e) = self.shaper.clear(interface).await {
            warn!("Failed to clear impairment before remediation: {}", e);
        }
        let policy_applied = match self.shaper.apply_policy(interface, &self.config.policy).await {
            Ok(()) => {
                info!(
                    "QoS rules applied. {} traffic is now prioritized.",
                    self.config.policy.classifier.protocol_name().to_uppercase()
                );
                true
            }
            Err(e) => {
                error!("Failed to apply QoS policy: {}", e);
                false
            }
        };
        self.transition(ControllerState::Remediated);

        let post_remediation_ms = match self.config.post_remediation_delay {
            Some(delay) => self.follow_up(delay, shutdown).await,
            None => None,
        };

        info!("Remediation complete. The link stays shaped until it is reset.");
        RunOutcome::Remediated {
            level,
            latency_ms,
            policy_applied,
            post_remediation_ms,
        }
    }

    /// Best-effort sample after remediation; never changes the outcome
    async fn follow_up(&self, delay: Duration, shutdown: &mut ShutdownReceiver) -> Option<f64> {
        let sampled = tokio::select! {
            biased;
            _ = shutdown.recv() => None,
            m = async {
                tokio::time::sleep(delay).await;
                self.probe.sample(&self.config.target, self.config.probe_count).await
            } => Some(m),
        };

        match sampled {
            Some(Measurement::Latency(ms)) => {
                info!(latency_ms = ms, "Post-remediation latency: {}ms", ms);
                Some(ms)
            }
            Some(Measurement::Unmeasurable) => {
                warn!("Post-remediation latency could not be measured");
                None
            }
            None => {
                info!("Shutdown requested; skipping post-remediation measurement");
                None
            }
        }
    }

    async fn interrupt(&mut self, level: Option<usize>) -> RunOutcome {
        self.transition(ControllerState::Interrupted);
        info!("Monitor stopped by user; restoring unshaped link");

        let cleanup_ok = match self.shaper.clear(&self.config.interface).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Cleanup failed, link may still be shaped: {}", e);
                false
            }
        };
        RunOutcome::Interrupted { level, cleanup_ok }
    }

    fn transition(&mut self, next: ControllerState) {
        debug!(from = ?self.state, to = ?next, "state transition");
        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingShaper, ScriptedProbe};
    use std::sync::Arc;

    fn config(latencies: usize) -> MonitorConfig {
        MonitorConfig::default()
            .with_settle_interval(Duration::from_millis(10))
            .with_post_remediation_delay(None)
            .with_levels(
                (0..latencies)
                    .map(|i| ImpairmentLevel::new(20 * (i as u32 + 1), 0.0))
                    .collect(),
            )
    }

    #[test]
    fn test_terminal_states() {
        assert!(!ControllerState::Idle.is_terminal());
        assert!(!ControllerState::Stepping(2).is_terminal());
        assert!(!ControllerState::Remediating.is_terminal());
        assert!(ControllerState::Remediated.is_terminal());
        assert!(ControllerState::Exhausted.is_terminal());
        assert!(ControllerState::Interrupted.is_terminal());
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(RunOutcome::Exhausted { levels: 2 }.exit_code(), 0);
        assert_eq!(
            RunOutcome::Remediated {
                level: 0,
                latency_ms: 200.0,
                policy_applied: true,
                post_remediation_ms: None
            }
            .exit_code(),
            0
        );
        assert_eq!(
            RunOutcome::Interrupted {
                level: None,
                cleanup_ok: true
            }
            .exit_code(),
            130
        );
    }

    #[test]
    fn test_new_controller_is_idle() {
        let controller = CongestionController::new(
            config(1),
            RecordingShaper::new(),
            ScriptedProbe::latencies([10.0]),
        );
        assert_eq!(controller.state(), ControllerState::Idle);
        assert_eq!(controller.config().levels.len(), 1);
    }

    #[test]
    fn test_default_span_carries_run_parameters() {
        let subscriber = tracing_subscriber::fmt()
            .with_writer(std::io::sink)
            .finish();
        tracing::subscriber::with_default(subscriber, || {
            let controller = CongestionController::new(
                config(1),
                RecordingShaper::new(),
                ScriptedProbe::default(),
            );
            let metadata = controller.span.metadata().expect("span enabled");
            assert_eq!(metadata.name(), "congestion_monitor");
            for field in ["interface", "target", "threshold_ms"] {
                assert!(metadata.fields().field(field).is_some(), "missing {field}");
            }
        });
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_inside_injected_span() {
        let controller = CongestionController::new(
            config(1),
            RecordingShaper::new(),
            ScriptedProbe::latencies([10.0]),
        )
        .with_span(Span::none());
        assert!(controller.span.is_none());
        let outcome = controller.run(ShutdownReceiver::never()).await;
        assert_eq!(outcome, RunOutcome::Exhausted { levels: 1 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_table_is_exhausted() {
        let shaper = Arc::new(RecordingShaper::new());
        let controller =
            CongestionController::new(config(0), shaper.clone(), ScriptedProbe::default());
        let outcome = controller.run(ShutdownReceiver::never()).await;
        assert_eq!(outcome, RunOutcome::Exhausted { levels: 0 });
        assert!(shaper.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_threshold_is_strict() {
        let shaper = Arc::new(RecordingShaper::new());
        let controller = CongestionController::new(
            config(1).with_threshold_ms(150.0),
            shaper.clone(),
            ScriptedProbe::latencies([150.0]),
        );
        let outcome = controller.run(ShutdownReceiver::never()).await;
        assert_eq!(outcome, RunOutcome::Exhausted { levels: 1 });
        assert_eq!(shaper.policy_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_congested_level_remediates() {
        let controller = CongestionController::new(
            config(1),
            RecordingShaper::new(),
            ScriptedProbe::latencies([400.0]),
        );
        let outcome = controller.run(ShutdownReceiver::never()).await;
        assert_eq!(outcome.state(), ControllerState::Remediated);
        assert!(matches!(
            outcome,
            RunOutcome::Remediated {
                level: 0,
                policy_applied: true,
                ..
            }
        ));
    }
}
