//! modlink: demo and inspection tool for the communication core.
//!
//! Usage:
//!   modlink --config modlink.toml check-config
//!   modlink --verbose demo

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use modlink_cli::run_demo;
use modlink_core::{CommunicationCore, CoreConfig};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "modlink")]
#[command(about = "Demo and inspection tool for the modlink communication core")]
struct Args {
    /// Path to the TOML config file
    #[arg(short, long, default_value = "modlink.toml")]
    config: PathBuf,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a scenario through every component and print statistics as JSON
    Demo,
    /// Load the config and print the effective values
    CheckConfig,
}

fn init_logging(verbose: bool) {
    // RUST_LOG wins over --verbose when set.
    if std::env::var_os("RUST_LOG").is_some() {
        FmtSubscriber::builder()
            .with_env_filter(EnvFilter::from_default_env())
            .with_target(false)
            .compact()
            .init();
    } else {
        let log_level = if verbose { Level::DEBUG } else { Level::INFO };
        FmtSubscriber::builder()
            .with_max_level(log_level)
            .with_target(false)
            .compact()
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let config = CoreConfig::load_from(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;

    match args.command {
        Command::CheckConfig => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Command::Demo => {
            info!("modlink demo starting...");
            let core = CommunicationCore::new(config)
                .await
                .context("building communication core")?;
            let report = run_demo(&core).await?;
            core.shutdown();
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(())
}
