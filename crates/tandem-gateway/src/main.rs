//! tandem-gateway — operator CLI for the bridge.
//!
//! `tandem-gateway check --config <path>` loads the configuration the same way
//! the bridge does (TOML file plus `TANDEM_*` overrides), validates it, and
//! prints the resolved channel map.

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{error, info};

use tandem_core::TandemConfig;
use tandem_relay::ChannelMap;

#[derive(Debug, Parser)]
#[command(name = "tandem-gateway", version, about = "Chat bridge with per-user shadow connections")]
struct Cli {
    /// Output machine-readable JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Load and validate a configuration file, then print the channel map
    Check {
        /// Path to tandem.toml (defaults to ~/.tandem/tandem.toml)
        #[arg(long, short = 'c')]
        config: Option<String>,
    },
}

#[derive(Debug, Serialize)]
struct CheckReport {
    server: String,
    port: u16,
    tls: bool,
    bot_nick: String,
    inactivity_timeout_secs: u64,
    command_prefixes: Vec<String>,
    channels: Vec<ChannelPair>,
}

#[derive(Debug, Serialize)]
struct ChannelPair {
    network_a: String,
    network_b: String,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tandem=info,tandem_gateway=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Check { config } => check(config.as_deref(), cli.json),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn check(path: Option<&str>, json: bool) -> Result<()> {
    let config = TandemConfig::load(path)
        .inspect_err(|e| error!(code = e.code(), "configuration rejected"))
        .context("invalid configuration")?;
    let map = ChannelMap::from_pairs(&config.channels).context("invalid channel map")?;
    info!(channels = map.len(), "configuration is valid");

    let report = CheckReport {
        server: config.network_b.server.clone(),
        port: config.network_b.port,
        tls: config.network_b.tls,
        bot_nick: config.network_b.bot_nick.clone(),
        inactivity_timeout_secs: config.network_a.inactivity_timeout_secs,
        command_prefixes: config.network_a.command_prefixes.clone(),
        channels: map
            .iter()
            .map(|(a, b)| ChannelPair {
                network_a: a.to_string(),
                network_b: b.to_string(),
            })
            .collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!(
        "network B: {}:{}{} as {}",
        report.server,
        report.port,
        if report.tls { " (tls)" } else { "" },
        report.bot_nick
    );
    println!(
        "inactivity timeout: {}s, command prefixes: {}",
        report.inactivity_timeout_secs,
        report.command_prefixes.join(" ")
    );
    println!("channels:");
    for pair in &report.channels {
        println!("  {} <-> {}", pair.network_a, pair.network_b);
    }
    Ok(())
}
