// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use crate::chain::{ChainResolver, Endpoint};
use crate::config::SdkConfig;
use crate::operations::is_valid_encryption_value;
use anyhow::{anyhow, Result};
use clap::Args;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// Arguments for the resolve command
#[derive(Args, Debug)]
pub struct ResolveArgs {
    /// RPC endpoint (falls back to the config / FHEVM_RPC_URL)
    #[arg(long)]
    pub rpc_url: Option<String>,

    /// Extra mock chains as id=url, comma separated
    #[arg(long, value_delimiter = ',')]
    pub mock_chain: Vec<String>,

    /// Request timeout in seconds
    #[arg(long)]
    pub timeout_secs: Option<u64>,
}

/// Arguments for the probe command
#[derive(Args, Debug)]
pub struct ProbeArgs {
    /// RPC endpoint of the local node (falls back to the config / FHEVM_RPC_URL)
    #[arg(long)]
    pub rpc_url: Option<String>,

    /// Request timeout in seconds
    #[arg(long)]
    pub timeout_secs: Option<u64>,
}

/// Arguments for the validate command
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Encrypted type (ebool, euint8 .. euint256, eaddress)
    #[arg(long = "type", short = 't')]
    pub fhe_type: String,

    /// Value as JSON (`true`, `42`) or a bare string (`0x...`, `"340282366920938463463374607431768211455"`)
    pub value: String,
}

fn rpc_url(arg: Option<String>, config: &SdkConfig) -> Result<String> {
    arg.or_else(|| config.rpc_url.clone())
        .ok_or_else(|| anyhow!("RPC URL required. Use --rpc-url or set FHEVM_RPC_URL"))
}

fn resolver(timeout_secs: Option<u64>, config: &SdkConfig) -> ChainResolver {
    match timeout_secs {
        Some(secs) => config.resolver().with_timeout(Duration::from_secs(secs)),
        None => config.resolver(),
    }
}

/// Parse `id=url` pairs
pub fn parse_mock_chains(entries: &[String]) -> Result<HashMap<u64, String>> {
    entries
        .iter()
        .map(|entry| {
            let (id, url) = entry
                .split_once('=')
                .ok_or_else(|| anyhow!("Mock chain '{}' must look like <chain-id>=<rpc-url>", entry))?;
            let chain_id = id
                .trim()
                .parse::<u64>()
                .map_err(|_| anyhow!("Invalid chain id '{}'", id))?;
            Ok((chain_id, url.trim().to_string()))
        })
        .collect()
}

/// Interpret a command-line value: JSON when it parses, otherwise a plain string
pub fn parse_cli_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

pub async fn resolve(args: ResolveArgs, config: &SdkConfig) -> Result<()> {
    let rpc_url = rpc_url(args.rpc_url, config)?;
    let mut mock_chains = config.mock_chain_table()?;
    mock_chains.extend(parse_mock_chains(&args.mock_chain)?);

    debug!(rpc_url = %rpc_url, mock_chains = mock_chains.len(), "Resolving chain");
    let resolved = resolver(args.timeout_secs, config)
        .resolve(&Endpoint::from(rpc_url.as_str()), &mock_chains)
        .await?;

    println!("🔗 Chain resolved");
    println!("  Chain ID: {}", resolved.chain_id);
    println!("  Mock:     {}", if resolved.is_mock { "yes" } else { "no" });
    if let Some(url) = &resolved.rpc_url {
        println!("  RPC URL:  {}", url);
    }
    Ok(())
}

pub async fn probe(args: ProbeArgs, config: &SdkConfig) -> Result<()> {
    let rpc_url = rpc_url(args.rpc_url, config)?;
    match resolver(args.timeout_secs, config)
        .probe_local_node(&rpc_url)
        .await?
    {
        Some(metadata) => {
            println!("🔍 FHEVM Hardhat node detected at {}", rpc_url);
            println!("  ACL:              {:?}", metadata.acl_address);
            println!("  Input verifier:   {:?}", metadata.input_verifier_address);
            println!("  KMS verifier:     {:?}", metadata.kms_verifier_address);
        }
        None => {
            println!("⚠️  {} is reachable but is not an FHEVM Hardhat node", rpc_url);
        }
    }
    Ok(())
}

pub fn validate(args: ValidateArgs) -> Result<()> {
    let value = parse_cli_value(&args.value);
    if is_valid_encryption_value(&value, &args.fhe_type) {
        println!("✅ {} is a valid {}", value, args.fhe_type);
        Ok(())
    } else {
        Err(anyhow!("{} is not a valid {}", value, args.fhe_type))
    }
}
