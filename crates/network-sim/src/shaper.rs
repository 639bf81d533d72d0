//! Link shaping interface
//!
//! The congestion controller only talks to the link through [`LinkShaper`],
//! so the decision loop can run against a recording double in tests and
//! against [`crate::QdiscManager`] on a real host.

use crate::types::ShapingError;
use async_trait::async_trait;
use scenarios::{ImpairmentLevel, QosPolicy};
use std::sync::Arc;

/// Applies and clears impairment and prioritization on one interface
///
/// Implementations keep no state between calls. Every apply replaces the
/// interface's shaping wholesale.
#[async_trait]
pub trait LinkShaper: Send + Sync {
    /// Remove all shaping. Clearing an already unshaped interface is not an error.
    async fn clear(&self, interface: &str) -> Result<(), ShapingError>;

    /// Replace the current shaping with a single impairment level
    async fn apply_impairment(
        &self,
        interface: &str,
        level: &ImpairmentLevel,
    ) -> Result<(), ShapingError>;

    /// Replace the current shaping with the prioritization ruleset
    async fn apply_policy(&self, interface: &str, policy: &QosPolicy) -> Result<(), ShapingError>;
}

#[async_trait]
impl<T: LinkShaper + ?Sized> LinkShaper for Arc<T> {
    async fn clear(&self, interface: &str) -> Result<(), ShapingError> {
        (**self).clear(interface).await
    }

    async fn apply_impairment(
        &self,
        interface: &str,
        level: &ImpairmentLevel,
    ) -> Result<(), ShapingError> {
        (**self).apply_impairment(interface, level).await
    }

    async fn apply_policy(&self, interface: &str, policy: &QosPolicy) -> Result<(), ShapingError> {
        (**self).apply_policy(interface, policy).await
    }
}
