// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Local development node detection
//!
//! A Hardhat node running the FHEVM plugin answers `fhevm_relayer_metadata`
//! with the ACL, input verifier and KMS verifier contract addresses. Only a
//! node identifying itself as Hardhat is asked for that metadata, and any
//! shortfall in the answer means "not detected" rather than an error.

use super::endpoint::Eip1193Provider;
use crate::errors::{FhevmError, FhevmResult};
use crate::utils::{is_hex_address, parse_address};
use ethers::types::Address;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info};

pub const CLIENT_VERSION_METHOD: &str = "web3_clientVersion";
pub const RELAYER_METADATA_METHOD: &str = "fhevm_relayer_metadata";

/// FHEVM contract addresses reported by a local development node
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayerMetadata {
    #[serde(rename = "ACLAddress")]
    pub acl_address: Address,
    #[serde(rename = "InputVerifierAddress")]
    pub input_verifier_address: Address,
    #[serde(rename = "KMSVerifierAddress")]
    pub kms_verifier_address: Address,
}

impl RelayerMetadata {
    /// Strict parse: all three fields must be `0x` + 40 hex char strings
    pub fn from_json(value: &Value) -> Option<Self> {
        let field = |name: &str| -> Option<Address> {
            let raw = value.get(name)?.as_str()?;
            if !is_hex_address(raw) {
                return None;
            }
            parse_address(raw).ok()
        };

        Some(RelayerMetadata {
            acl_address: field("ACLAddress")?,
            input_verifier_address: field("InputVerifierAddress")?,
            kms_verifier_address: field("KMSVerifierAddress")?,
        })
    }
}

/// `web3_clientVersion`; failure means the endpoint is unreachable or not Web3
pub async fn client_version(
    provider: &dyn Eip1193Provider,
    rpc_url: &str,
    request_timeout: Duration,
) -> FhevmResult<String> {
    let response = timeout(
        request_timeout,
        provider.request(CLIENT_VERSION_METHOD, json!([])),
    )
    .await
    .map_err(|_| FhevmError::network(rpc_url, "web3_clientVersion timed out"))?
    .map_err(|e| {
        FhevmError::network(
            rpc_url,
            format!("not a Web3 node or not reachable: {}", e),
        )
    })?;

    response
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| FhevmError::network(rpc_url, "web3_clientVersion returned a non-string"))
}

/// Detect a Hardhat FHEVM node and fetch its relayer metadata
pub async fn probe_local_node(
    provider: &dyn Eip1193Provider,
    rpc_url: &str,
    request_timeout: Duration,
) -> FhevmResult<Option<RelayerMetadata>> {
    let version = client_version(provider, rpc_url, request_timeout).await?;
    if !version.to_lowercase().contains("hardhat") {
        debug!(rpc_url, version = %version, "Not a Hardhat node, skipping relayer metadata");
        return Ok(None);
    }

    let response = match timeout(
        request_timeout,
        provider.request(RELAYER_METADATA_METHOD, json!([])),
    )
    .await
    {
        Ok(Ok(value)) => value,
        Ok(Err(e)) => {
            debug!(rpc_url, error = %e, "fhevm_relayer_metadata unavailable");
            return Ok(None);
        }
        Err(_) => {
            debug!(rpc_url, "fhevm_relayer_metadata timed out");
            return Ok(None);
        }
    };

    let metadata = RelayerMetadata::from_json(&response);
    match &metadata {
        Some(m) => info!(
            rpc_url,
            acl = ?m.acl_address,
            "🔍 Detected FHEVM Hardhat node"
        ),
        None => debug!(rpc_url, "Relayer metadata incomplete or malformed"),
    }
    Ok(metadata)
}
