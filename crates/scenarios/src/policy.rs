//! QoS remediation policies
//!
//! A [`QosPolicy`] describes the priority queueing layout installed once
//! congestion is confirmed: a fixed number of bands, each either impaired or
//! passthrough, and a classifier that steers control traffic (ICMP probes by
//! default) into band 1, the highest priority band.
//!
//! Band 1 is reserved for the classified traffic and must stay unimpaired.

use crate::level::ImpairmentLevel;
use crate::ScenarioError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Band that receives classified control traffic
pub const CONTROL_BAND: u8 = 1;

/// Upper bound on bands accepted by the prio qdisc
pub const MAX_BANDS: u8 = 16;

/// IP protocol numbers commonly used for classification
pub mod protocol {
    pub const ICMP: u8 = 1;
    pub const TCP: u8 = 6;
    pub const UDP: u8 = 17;
}

/// Maps one IP protocol to the control band
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classifier {
    /// IP protocol number matched by the filter
    pub ip_protocol: u8,
}

impl Classifier {
    pub fn icmp() -> Self {
        Self {
            ip_protocol: protocol::ICMP,
        }
    }

    pub fn protocol_name(&self) -> &'static str {
        match self.ip_protocol {
            protocol::ICMP => "icmp",
            protocol::TCP => "tcp",
            protocol::UDP => "udp",
            _ => "ip",
        }
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::icmp()
    }
}

/// One priority band and what happens to traffic inside it
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BandSpec {
    /// 1-based band number, 1 being the highest priority
    pub band: u8,
    /// Impairment applied inside the band, `None` for passthrough
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub impairment: Option<ImpairmentLevel>,
}

impl BandSpec {
    pub fn passthrough(band: u8) -> Self {
        Self {
            band,
            impairment: None,
        }
    }

    pub fn impaired(band: u8, level: ImpairmentLevel) -> Self {
        Self {
            band,
            impairment: Some(level),
        }
    }

    pub fn is_passthrough(&self) -> bool {
        self.impairment
            .as_ref()
            .map(ImpairmentLevel::is_passthrough)
            .unwrap_or(true)
    }
}

/// Prioritization ruleset applied as the remediation step
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QosPolicy {
    pub bands: Vec<BandSpec>,
    #[serde(default)]
    pub classifier: Classifier,
}

impl QosPolicy {
    /// ICMP prioritized, remaining bands degraded in steps
    ///
    /// Mirrors a congested 5G backhaul where best-effort traffic keeps its
    /// impairment while probes bypass it.
    pub fn graded_backhaul() -> Self {
        Self {
            bands: vec![
                BandSpec::passthrough(1),
                BandSpec::impaired(
                    2,
                    ImpairmentLevel::new(100, 0.02)
                        .with_jitter(20)
                        .with_rate_kbps(10_000),
                ),
                BandSpec::impaired(
                    3,
                    ImpairmentLevel::new(150, 0.03)
                        .with_jitter(30)
                        .with_rate_kbps(5_000),
                ),
            ],
            classifier: Classifier::icmp(),
        }
    }

    /// ICMP prioritized, both lower bands share one heavy impairment
    pub fn basic() -> Self {
        let impairment = ImpairmentLevel::new(100, 0.02).with_rate_kbps(1_000);
        Self {
            bands: vec![
                BandSpec::passthrough(1),
                BandSpec::impaired(2, impairment.clone()),
                BandSpec::impaired(3, impairment),
            ],
            classifier: Classifier::icmp(),
        }
    }

    pub fn band_count(&self) -> u8 {
        self.bands.len() as u8
    }

    pub fn control_band(&self) -> Option<&BandSpec> {
        self.bands.iter().find(|b| b.band == CONTROL_BAND)
    }

    /// Bands that need a netem child qdisc, in band order
    pub fn impaired_bands(&self) -> impl Iterator<Item = (u8, &ImpairmentLevel)> {
        self.bands.iter().filter_map(|b| match &b.impairment {
            Some(level) if !level.is_passthrough() => Some((b.band, level)),
            _ => None,
        })
    }

    pub fn validate(&self) -> Result<(), ScenarioError> {
        let count = self.bands.len();
        if !(2..=MAX_BANDS as usize).contains(&count) {
            return Err(ScenarioError::InvalidPolicy(format!(
                "expected 2-{} bands, got {}",
                MAX_BANDS, count
            )));
        }

        let mut seen = [false; MAX_BANDS as usize];
        for spec in &self.bands {
            if spec.band == 0 || spec.band as usize > count {
                return Err(ScenarioError::InvalidPolicy(format!(
                    "band {} outside 1-{}",
                    spec.band, count
                )));
            }
            let slot = &mut seen[spec.band as usize - 1];
            if *slot {
                return Err(ScenarioError::InvalidPolicy(format!(
                    "band {} declared twice",
                    spec.band
                )));
            }
            *slot = true;
            if let Some(level) = &spec.impairment {
                level.validate()?;
            }
        }

        match self.control_band() {
            Some(control) if control.is_passthrough() => Ok(()),
            Some(_) => Err(ScenarioError::InvalidPolicy(format!(
                "control band {} must not be impaired",
                CONTROL_BAND
            ))),
            None => Err(ScenarioError::InvalidPolicy(format!(
                "control band {} missing",
                CONTROL_BAND
            ))),
        }
    }
}

impl Default for QosPolicy {
    fn default() -> Self {
        Self::basic()
    }
}

impl fmt::Display for QosPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "prio bands={} {}->band {}",
            self.bands.len(),
            self.classifier.protocol_name(),
            CONTROL_BAND
        )?;
        for (band, level) in self.impaired_bands() {
            write!(f, "; band {}: {}", band, level)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_are_valid() {
        assert!(QosPolicy::graded_backhaul().validate().is_ok());
        assert!(QosPolicy::basic().validate().is_ok());
    }

    #[test]
    fn test_control_band_must_be_passthrough() {
        let mut policy = QosPolicy::basic();
        policy.bands[0].impairment = Some(ImpairmentLevel::new(10, 0.0));
        assert!(matches!(
            policy.validate(),
            Err(ScenarioError::InvalidPolicy(_))
        ));

        // an explicit passthrough level still counts as unimpaired
        policy.bands[0].impairment = Some(ImpairmentLevel::passthrough());
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn test_band_numbering() {
        let mut policy = QosPolicy::basic();
        policy.bands[2].band = 2;
        assert!(policy.validate().is_err());

        policy.bands[2].band = 7;
        assert!(policy.validate().is_err());

        let single = QosPolicy {
            bands: vec![BandSpec::passthrough(1)],
            classifier: Classifier::icmp(),
        };
        assert!(single.validate().is_err());

        let missing_control = QosPolicy {
            bands: vec![BandSpec::passthrough(2), BandSpec::passthrough(3)],
            classifier: Classifier::icmp(),
        };
        assert!(missing_control.validate().is_err());
    }

    #[test]
    fn test_impaired_bands_skip_passthrough() {
        let bands: Vec<u8> = QosPolicy::graded_backhaul()
            .impaired_bands()
            .map(|(band, _)| band)
            .collect();
        assert_eq!(bands, vec![2, 3]);
    }

    #[test]
    fn test_classifier_defaults_to_icmp() {
        let policy: QosPolicy =
            serde_json::from_str(r#"{"bands":[{"band":1},{"band":2,"impairment":{"delay_ms":80}}]}"#)
                .unwrap();
        assert_eq!(policy.classifier, Classifier::icmp());
        assert_eq!(policy.band_count(), 2);
        assert!(policy.validate().is_ok());
        assert_eq!(policy.classifier.protocol_name(), "icmp");
    }
}
