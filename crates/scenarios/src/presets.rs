//! Preset catalogue of congestion profiles
//!
//! This module exposes the built-in profiles by name so that the CLI can
//! list them and resolve `--profile` arguments.

use crate::profile::CongestionProfile;

/// Rounds used by the `steady_state` preset
pub const STEADY_STATE_ROUNDS: usize = 6;

/// Preset collections for common monitoring runs
pub struct Presets;

impl Presets {
    /// Profiles that stage impairment on the link
    pub fn staged_profiles() -> Vec<CongestionProfile> {
        vec![
            CongestionProfile::backhaul_5g(),
            CongestionProfile::progressive(),
        ]
    }

    /// Profiles that only observe the link
    pub fn static_profiles() -> Vec<CongestionProfile> {
        vec![CongestionProfile::steady_state(STEADY_STATE_ROUNDS)]
    }

    /// Get all available profiles
    pub fn all_profiles() -> Vec<CongestionProfile> {
        let mut profiles = Self::staged_profiles();
        profiles.extend(Self::static_profiles());
        profiles
    }

    pub fn names() -> Vec<String> {
        Self::all_profiles().into_iter().map(|p| p.name).collect()
    }

    /// Look a preset up by name, accepting `-` in place of `_`
    pub fn by_name(name: &str) -> Option<CongestionProfile> {
        let wanted = name.trim().replace('-', "_");
        Self::all_profiles().into_iter().find(|p| p.name == wanted)
    }
}
