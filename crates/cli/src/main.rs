//! Companion POI CLI
//!
//! A command-line tool for inspecting sync payloads and running the
//! companion sync layer against a simulated phone.

mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{
    decode::{self, PayloadKind},
    simulate::{self, PeerStatus, SimulateOptions},
};
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;

/// Companion POI CLI
#[derive(Parser)]
#[command(name = "poi")]
#[command(author, version, about = "CLI for the Companion POI sync layer", long_about = None)]
pub struct Cli {
    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    /// Enable verbose output
    #[arg(long, short)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Decode a reply or push payload stored as JSON
    Decode {
        /// Path to the payload file
        file: PathBuf,

        /// How to interpret the payload
        #[arg(long, value_enum, default_value = "auto")]
        kind: PayloadKind,
    },

    /// Run a companion/phone exchange in-process and show the rendered rows
    Simulate {
        /// Search radius in kilometers
        #[arg(long, env = "COMPANION_MAX_RADIUS_KM", default_value_t = 10.0)]
        radius: f64,

        /// Maximum number of points of interest to request
        #[arg(long, env = "COMPANION_MAX_RESULTS", default_value_t = 10)]
        max_results: u32,

        /// JSON file with the phone's points of interest (built-in list if omitted)
        #[arg(long)]
        fixture: Option<PathBuf>,

        /// Status the simulated phone answers with
        #[arg(long, value_enum, default_value = "ok")]
        peer_status: PeerStatus,

        /// Start with the devices out of range
        #[arg(long)]
        disconnected: bool,

        /// Seconds to wait for the first update
        #[arg(long, default_value_t = 5)]
        timeout: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::WARN })
        .with_writer(std::io::stderr)
        .init();

    // Execute command
    let result = match cli.command {
        Commands::Decode { file, kind } => decode::decode_file(&file, kind, cli.format),
        Commands::Simulate {
            radius,
            max_results,
            fixture,
            peer_status,
            disconnected,
            timeout,
        } => {
            let options = SimulateOptions {
                max_radius_km: radius,
                max_results,
                fixture,
                peer_status,
                disconnected,
                timeout: Duration::from_secs(timeout),
            };
            simulate::simulate(options, cli.format).await
        }
    };

    if let Err(e) = result {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }

    Ok(())
}
