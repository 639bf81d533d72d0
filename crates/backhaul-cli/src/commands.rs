//! CLI command implementations for the backhaul congestion monitor
//!
//! Each subcommand maps to one `cmd_*` function so they can be unit tested
//! without spawning the binary.

use anyhow::{Context, Result};
use backhaulqos::config::{
    DEFAULT_INTERFACE, DEFAULT_POST_REMEDIATION_DELAY, DEFAULT_PROBE_COUNT, DEFAULT_TARGET,
};
use backhaulqos::{
    spawn_signal_listener, CongestionController, MonitorConfig, RunOutcome,
    ShutdownController,
};
use clap::Args;
use network_sim::{PingProbe, QdiscManager};
use scenarios::{CongestionProfile, Presets};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, warn};

/// Arguments of the `run` command
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Built-in profile name (see `list`)
    #[arg(short, long, default_value = "backhaul_5g", conflicts_with = "profile_file")]
    pub profile: String,

    /// Load the profile from a JSON file instead
    #[arg(long)]
    pub profile_file: Option<PathBuf>,

    /// Interface whose egress queue is shaped
    #[arg(short, long, default_value = DEFAULT_INTERFACE)]
    pub interface: String,

    /// Host probed for latency
    #[arg(short, long, default_value = DEFAULT_TARGET)]
    pub target: String,

    /// Latency threshold in milliseconds (overrides the profile)
    #[arg(long)]
    pub threshold_ms: Option<f64>,

    /// Seconds to wait after shaping before sampling (overrides the profile)
    #[arg(long)]
    pub settle_secs: Option<u64>,

    /// Echo requests per sample
    #[arg(long, default_value_t = DEFAULT_PROBE_COUNT)]
    pub probe_count: u32,

    /// Seconds to wait before the post-remediation sample
    #[arg(long, default_value_t = DEFAULT_POST_REMEDIATION_DELAY.as_secs())]
    pub follow_up_secs: u64,

    /// Skip the post-remediation sample
    #[arg(long)]
    pub no_follow_up: bool,

    /// Run tc directly instead of through sudo
    #[arg(long)]
    pub no_sudo: bool,
}

/// Implementation of the 'run' command - returns the process exit code
pub async fn cmd_run(args: RunArgs) -> Result<u8> {
    let profile = resolve_profile(&args)?;
    let config = build_config(&profile, &args)?;

    info!(
        "Using profile '{}' ({} levels): {}",
        profile.name,
        config.levels.len(),
        profile.description
    );

    let shaper = QdiscManager::new().with_sudo(!args.no_sudo);
    if !shaper.has_net_admin().await {
        warn!("tc may be refused: not running as root and sudo is disabled");
    }

    let shutdown = ShutdownController::new();
    let listener = spawn_signal_listener(shutdown.clone());

    let interface = config.interface.clone();
    let outcome = CongestionController::new(config, shaper, PingProbe::new())
        .run(shutdown.subscribe())
        .await;
    listener.abort();

    report(&outcome, &interface)?;
    Ok(u8::try_from(outcome.exit_code()).unwrap_or(1))
}

/// Implementation of the 'reset' command - removes all shaping from an interface
pub async fn cmd_reset(interface: &str, no_sudo: bool) -> Result<()> {
    let shaper = QdiscManager::new().with_sudo(!no_sudo);
    shaper
        .clear_interface(interface)
        .await
        .with_context(|| format!("Failed to reset {}", interface))?;
    info!("Removed all shaping from {}", interface);
    Ok(())
}

/// Implementation of the 'list' command - shows the built-in profiles
pub fn cmd_list() -> Result<()> {
    println!("Available profiles:");
    println!("===================");

    println!("\nStaged profiles:");
    for profile in Presets::staged_profiles() {
        println!(
            "  {:<14} - {} ({} levels)",
            profile.name,
            profile.description,
            profile.levels.len()
        );
    }

    println!("\nObservation-only profiles:");
    for profile in Presets::static_profiles() {
        println!(
            "  {:<14} - {} ({} rounds)",
            profile.name,
            profile.description,
            profile.levels.len()
        );
    }

    Ok(())
}

/// Implementation of the 'show' command - prints one profile as JSON
pub fn cmd_show(name: &str) -> Result<()> {
    let profile = lookup_preset(name)?;
    println!("{}", profile.to_json_pretty()?);
    Ok(())
}

fn lookup_preset(name: &str) -> Result<CongestionProfile> {
    match Presets::by_name(name) {
        Some(profile) => Ok(profile),
        None => {
            error!("Unknown profile: {}", name);
            anyhow::bail!(
                "Unknown profile: {} (available: {})",
                name,
                Presets::names().join(", ")
            );
        }
    }
}

/// Helper function to resolve `--profile` / `--profile-file` to a profile
fn resolve_profile(args: &RunArgs) -> Result<CongestionProfile> {
    let profile = match &args.profile_file {
        Some(path) => CongestionProfile::from_json_file(path)?,
        None => lookup_preset(&args.profile)?,
    };
    profile
        .validate()
        .with_context(|| format!("Profile '{}' is invalid", profile.name))?;
    Ok(profile)
}

/// Helper function to apply command line overrides on top of a profile
fn build_config(profile: &CongestionProfile, args: &RunArgs) -> Result<MonitorConfig> {
    let mut config = MonitorConfig::from_profile(profile)
        .with_interface(args.interface.clone())
        .with_target(args.target.clone())
        .with_probe_count(args.probe_count)
        .with_post_remediation_delay(
            (!args.no_follow_up).then(|| Duration::from_secs(args.follow_up_secs)),
        );
    if let Some(threshold_ms) = args.threshold_ms {
        config = config.with_threshold_ms(threshold_ms);
    }
    if let Some(secs) = args.settle_secs {
        config = config.with_settle_interval(Duration::from_secs(secs));
    }
    config.validate().context("Invalid monitor configuration")?;
    Ok(config)
}

fn report(outcome: &RunOutcome, interface: &str) -> Result<()> {
    info!("Run summary: {}", serde_json::to_string(outcome)?);
    match outcome {
        RunOutcome::Remediated { .. } => info!(
            "QoS policy left in place. Restore the link with: backhaul-monitor reset --interface {}",
            interface
        ),
        RunOutcome::Interrupted {
            cleanup_ok: false, ..
        } => warn!(
            "Cleanup failed. Restore the link with: backhaul-monitor reset --interface {}",
            interface
        ),
        _ => {}
    }
    Ok(())
}
