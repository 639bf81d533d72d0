//! Backhaul congestion monitor CLI
//!
//! Simulates worsening congestion on an interface, watches latency, and
//! installs a QoS prioritization policy once latency crosses the threshold.

mod commands;

use backhaulqos::{init_tracing, TelemetryConfig};
use clap::{Parser, Subcommand};
use commands::{cmd_list, cmd_reset, cmd_run, cmd_show, RunArgs};
use std::process::ExitCode;
use tracing::error;

#[derive(Parser)]
#[command(name = "backhaul-monitor", author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log JSON lines instead of text
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Step through congestion levels and remediate when latency crosses the threshold
    Run(RunArgs),

    /// Remove all shaping from an interface
    Reset {
        /// Interface to restore
        #[arg(long, default_value = backhaulqos::config::DEFAULT_INTERFACE)]
        interface: String,

        /// Run tc directly instead of through sudo
        #[arg(long)]
        no_sudo: bool,
    },

    /// List built-in congestion profiles
    List,

    /// Print a built-in profile as JSON
    Show {
        /// Profile name (see `list`)
        profile: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Flushed when dropped at the end of main
    let _telemetry = match init_tracing(TelemetryConfig {
        verbose: cli.verbose,
        json: cli.json,
    }) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.command {
        Commands::Run(args) => cmd_run(args).await,
        Commands::Reset { interface, no_sudo } => cmd_reset(&interface, no_sudo).await.map(|()| 0),
        Commands::List => cmd_list().map(|()| 0),
        Commands::Show { profile } => cmd_show(&profile).map(|()| 0),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
