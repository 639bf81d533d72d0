//! Qdisc management for traffic control
//!
//! [`QdiscManager`] drives the `tc` binary: a root netem qdisc for impairment
//! levels, and a prio qdisc with a u32 classifier and per-band netem children
//! for the remediation policy. Argument lists are built by free functions so
//! they can be checked without touching an interface.

use crate::shaper::LinkShaper;
use crate::types::{is_missing_qdisc, ShapingError};
use async_trait::async_trait;
use log::{debug, info, warn};
use scenarios::{Classifier, ImpairmentLevel, QosPolicy, CONTROL_BAND};
use tokio::process::Command;

/// Handle of the root netem qdisc used for impairment levels
pub const NETEM_HANDLE: &str = "10:";
/// Handle of the root prio qdisc used for the remediation policy
pub const PRIO_HANDLE: &str = "1:";

/// Where a qdisc is attached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QdiscParent {
    Root,
    /// Child of the prio qdisc, 1-based band number
    Band(u8),
}

/// Handle for the netem child of a prio band (band 2 -> `30:`)
pub fn band_handle(band: u8) -> String {
    format!("{}:", (u32::from(band) + 1) * 10)
}

/// Percentages without float noise, `0.1` rather than `0.100000001`
fn format_percent(percent: f32) -> String {
    let s = format!("{:.4}", percent);
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}

pub fn clear_args(interface: &str) -> Vec<String> {
    ["qdisc", "del", "dev", interface, "root"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

pub fn show_args(interface: &str) -> Vec<String> {
    ["qdisc", "show", "dev", interface]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Build `tc qdisc add ... netem ...` for one impairment level
pub fn netem_args(interface: &str, parent: QdiscParent, level: &ImpairmentLevel) -> Vec<String> {
    let mut args: Vec<String> = vec!["qdisc".into(), "add".into(), "dev".into(), interface.into()];

    match parent {
        QdiscParent::Root => {
            args.extend(["root".to_string(), "handle".to_string(), NETEM_HANDLE.to_string()]);
        }
        QdiscParent::Band(band) => {
            args.extend([
                "parent".to_string(),
                format!("{}{}", PRIO_HANDLE, band),
                "handle".to_string(),
                band_handle(band),
            ]);
        }
    }

    args.push("netem".into());

    if level.delay_ms > 0 {
        args.push("delay".into());
        args.push(format!("{}ms", level.delay_ms));
        if let Some(jitter) = level.jitter_ms.filter(|j| *j > 0) {
            args.push(format!("{}ms", jitter));
            args.extend(["distribution".to_string(), "normal".to_string()]);
        }
    }

    if level.loss_pct > 0.0 {
        args.push("loss".into());
        args.push(format!("{}%", format_percent(level.loss_percent())));
    }

    if let Some(rate) = level.rate_kbps {
        args.push("rate".into());
        args.push(format!("{}kbit", rate));
    }

    args
}

/// Band that unclassified traffic falls into, the first after the control band
pub const DEFAULT_BAND: u8 = CONTROL_BAND + 1;

/// Entries in the prio qdisc's priority-to-band map
const PRIOMAP_LEN: usize = 16;

/// Build the root prio qdisc
///
/// The priomap sends every priority to [`DEFAULT_BAND`], so only the
/// classifier can place traffic in the control band.
pub fn prio_args(interface: &str, bands: u8) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "qdisc".into(),
        "add".into(),
        "dev".into(),
        interface.into(),
        "root".into(),
        "handle".into(),
        PRIO_HANDLE.into(),
        "prio".into(),
        "bands".into(),
        bands.to_string(),
        "priomap".into(),
    ];
    // priomap entries are 0-based band indices
    let index = (DEFAULT_BAND - 1).to_string();
    args.extend(std::iter::repeat(index).take(PRIOMAP_LEN));
    args
}

/// Steer the classified protocol into the control band
pub fn classifier_args(interface: &str, classifier: &Classifier) -> Vec<String> {
    vec![
        "filter".into(),
        "add".into(),
        "dev".into(),
        interface.into(),
        "protocol".into(),
        "ip".into(),
        "parent".into(),
        format!("{}0", PRIO_HANDLE),
        "prio".into(),
        "1".into(),
        "u32".into(),
        "match".into(),
        "ip".into(),
        "protocol".into(),
        classifier.ip_protocol.to_string(),
        "0xff".into(),
        "flowid".into(),
        format!("{}{}", PRIO_HANDLE, CONTROL_BAND),
    ]
}

/// Manager for qdisc traffic control
#[derive(Debug, Clone)]
pub struct QdiscManager {
    use_sudo: bool,
    tc_command: Vec<String>,
}

impl QdiscManager {
    pub fn new() -> Self {
        Self {
            use_sudo: false,
            tc_command: vec!["tc".to_string()],
        }
    }

    /// Prefix every tc invocation with `sudo -n`
    pub fn with_sudo(mut self, use_sudo: bool) -> Self {
        self.use_sudo = use_sudo;
        self
    }

    /// Replace the `tc` program, e.g. with `["sh", "fake-tc.sh"]`
    pub fn with_tc_command<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let command: Vec<String> = command.into_iter().map(Into::into).collect();
        if !command.is_empty() {
            self.tc_command = command;
        }
        self
    }

    pub fn uses_sudo(&self) -> bool {
        self.use_sudo
    }

    fn command(&self, args: &[String]) -> Command {
        let mut cmd = if self.use_sudo {
            let mut cmd = Command::new("sudo");
            cmd.arg("-n").args(&self.tc_command);
            cmd
        } else {
            let mut cmd = Command::new(&self.tc_command[0]);
            cmd.args(&self.tc_command[1..]);
            cmd
        };
        cmd.args(args);
        cmd
    }

    /// Run tc and return its stdout, mapping a non-zero exit to an error
    async fn exec(&self, interface: &str, args: &[String]) -> Result<String, ShapingError> {
        debug!("Running tc {}", args.join(" "));
        let output = self.command(args).output().await?;
        if output.status.success() {
            return Ok(String::from_utf8_lossy(&output.stdout).into_owned());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(ShapingError::from_tc_failure(interface, args, &stderr))
    }

    /// Whether tc calls are expected to be permitted
    pub async fn has_net_admin(&self) -> bool {
        if nix::unistd::geteuid().is_root() {
            return true;
        }
        if !self.use_sudo {
            return false;
        }
        matches!(
            Command::new("sudo").args(["-n", "true"]).status().await,
            Ok(status) if status.success()
        )
    }

    /// Remove any qdisc configuration from the interface (restore defaults)
    pub async fn clear_interface(&self, interface: &str) -> Result<(), ShapingError> {
        let args = clear_args(interface);
        let output = self.command(&args).output().await?;
        if output.status.success() {
            debug!("Deleted existing root qdisc on {}", interface);
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        if is_missing_qdisc(&stderr) {
            debug!("No qdisc to delete on {}", interface);
            return Ok(());
        }
        Err(ShapingError::from_tc_failure(interface, &args, &stderr))
    }

    /// Install one impairment level as the root qdisc
    pub async fn configure_impairment(
        &self,
        interface: &str,
        level: &ImpairmentLevel,
    ) -> Result<(), ShapingError> {
        level.validate()?;
        self.clear_interface(interface).await?;

        if level.is_passthrough() {
            info!("Interface {} left unshaped (passthrough level)", interface);
            return Ok(());
        }

        info!("Configuring interface {} with {}", interface, level);
        self.exec(interface, &netem_args(interface, QdiscParent::Root, level))
            .await?;
        Ok(())
    }

    /// Install the priority queueing layout and classifier
    pub async fn configure_policy(
        &self,
        interface: &str,
        policy: &QosPolicy,
    ) -> Result<(), ShapingError> {
        policy.validate()?;
        self.clear_interface(interface).await?;

        info!("Configuring interface {} with {}", interface, policy);
        self.exec(interface, &prio_args(interface, policy.band_count()))
            .await?;
        self.exec(interface, &classifier_args(interface, &policy.classifier))
            .await?;
        for (band, level) in policy.impaired_bands() {
            if let Err(e) = self
                .exec(interface, &netem_args(interface, QdiscParent::Band(band), level))
                .await
            {
                warn!("Failed to impair band {} on {}: {}", band, interface, e);
                return Err(e);
            }
        }
        Ok(())
    }

    /// Current qdisc layout as printed by `tc qdisc show`
    pub async fn describe_interface_qdisc(&self, interface: &str) -> Result<String, ShapingError> {
        self.exec(interface, &show_args(interface)).await
    }
}

impl Default for QdiscManager {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LinkShaper for QdiscManager {
    async fn clear(&self, interface: &str) -> Result<(), ShapingError> {
        self.clear_interface(interface).await
    }

    async fn apply_impairment(
        &self,
        interface: &str,
        level: &ImpairmentLevel,
    ) -> Result<(), ShapingError> {
        self.configure_impairment(interface, level).await
    }

    async fn apply_policy(&self, interface: &str, policy: &QosPolicy) -> Result<(), ShapingError> {
        self.configure_policy(interface, policy).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn joined(args: Vec<String>) -> String {
        args.join(" ")
    }

    #[test]
    fn test_netem_args_full_level() {
        let level = ImpairmentLevel::new(50, 0.01)
            .with_jitter(10)
            .with_rate_kbps(30_000);
        assert_eq!(
            joined(netem_args("enp0s3", QdiscParent::Root, &level)),
            "qdisc add dev enp0s3 root handle 10: netem delay 50ms 10ms distribution normal loss 1% rate 30000kbit"
        );
    }

    #[test]
    fn test_netem_args_delay_and_loss_only() {
        let level = ImpairmentLevel::new(20, 0.005);
        assert_eq!(
            joined(netem_args("eth0", QdiscParent::Root, &level)),
            "qdisc add dev eth0 root handle 10: netem delay 20ms loss 0.5%"
        );
    }

    #[test]
    fn test_netem_args_band_child() {
        let level = ImpairmentLevel::new(100, 0.02).with_rate_kbps(1_000);
        assert_eq!(
            joined(netem_args("eth0", QdiscParent::Band(2), &level)),
            "qdisc add dev eth0 parent 1:2 handle 30: netem delay 100ms loss 2% rate 1000kbit"
        );
        assert_eq!(band_handle(3), "40:");
    }

    #[test]
    fn test_policy_args() {
        assert_eq!(
            joined(prio_args("eth0", 3)),
            "qdisc add dev eth0 root handle 1: prio bands 3 priomap 1 1 1 1 1 1 1 1 1 1 1 1 1 1 1 1"
        );
        assert_eq!(
            joined(classifier_args("eth0", &Classifier::icmp())),
            "filter add dev eth0 protocol ip parent 1:0 prio 1 u32 match ip protocol 1 0xff flowid 1:1"
        );
    }

    #[test]
    fn test_priomap_never_targets_control_band() {
        for bands in [2u8, 3, 16] {
            let args = prio_args("eth0", bands);
            let at = args.iter().position(|a| a == "priomap").unwrap();
            let map = &args[at + 1..];
            assert_eq!(map.len(), 16);
            for entry in map {
                let index: u8 = entry.parse().unwrap();
                assert!(index < bands, "priomap entry {} with {} bands", index, bands);
                assert_ne!(index, CONTROL_BAND - 1);
            }
        }
        assert_eq!(
            joined(prio_args("eth0", 2)),
            "qdisc add dev eth0 root handle 1: prio bands 2 priomap 1 1 1 1 1 1 1 1 1 1 1 1 1 1 1 1"
        );
    }

    #[test]
    fn test_format_percent() {
        assert_eq!(format_percent(0.1), "0.1");
        assert_eq!(format_percent(2.0), "2");
        assert_eq!(format_percent(0.05), "0.05");
    }

    #[tokio::test]
    async fn test_missing_tc_binary_is_command_error() {
        let manager = QdiscManager::new().with_tc_command(["/nonexistent/tc-binary"]);
        let result = manager.clear_interface("eth0").await;
        assert!(matches!(result, Err(ShapingError::Command(_))));
    }

    #[tokio::test]
    async fn test_invalid_level_rejected_before_tc_runs() {
        let manager = QdiscManager::new().with_tc_command(["/nonexistent/tc-binary"]);
        let level = ImpairmentLevel::new(10, 4.0);
        let result = manager.configure_impairment("eth0", &level).await;
        assert!(matches!(result, Err(ShapingError::InvalidRequest(_))));
    }
}
