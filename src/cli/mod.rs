// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod commands;

use crate::config::SdkConfig;
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// FHEVM client SDK CLI
#[derive(Parser, Debug)]
#[command(name = "fhevm-cli")]
#[command(version)]
#[command(about = "Inspect FHEVM networks and validate values before encryption", long_about = None)]
pub struct Cli {
    /// TOML config file; FHEVM_* environment variables override it
    #[arg(long, global = true, env = "FHEVM_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Resolve the chain behind an RPC endpoint and report whether it is a mock chain
    Resolve(commands::ResolveArgs),

    /// Probe an RPC endpoint for an FHEVM Hardhat node
    Probe(commands::ProbeArgs),

    /// Check that a value can be encrypted as the given type
    Validate(commands::ValidateArgs),
}

async fn load_config(path: Option<&PathBuf>) -> Result<SdkConfig> {
    match path {
        Some(path) => SdkConfig::load(path).await,
        None => Ok(SdkConfig::from_env()),
    }
}

/// Execute CLI command
pub async fn execute(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_ref()).await?;
    match cli.command {
        Commands::Resolve(args) => commands::resolve(args, &config).await,
        Commands::Probe(args) => commands::probe(args, &config).await,
        Commands::Validate(args) => commands::validate(args),
    }
}
