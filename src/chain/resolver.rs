// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use super::endpoint::{Eip1193Provider, Endpoint, HttpConnector, RpcConnector};
use super::probe::{self, RelayerMetadata};
use crate::config::{LOCAL_DEV_CHAIN_ID, LOCAL_DEV_RPC_URL};
use crate::errors::{FhevmError, FhevmResult};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Outcome of resolving an endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedChain {
    pub is_mock: bool,
    pub chain_id: u64,
    pub rpc_url: Option<String>,
}

/// Built-in local dev chain overlaid with caller entries (caller wins)
pub fn merged_mock_chains(custom: &HashMap<u64, String>) -> HashMap<u64, String> {
    let mut chains = HashMap::new();
    chains.insert(LOCAL_DEV_CHAIN_ID, LOCAL_DEV_RPC_URL.to_string());
    chains.extend(custom.iter().map(|(id, url)| (*id, url.clone())));
    chains
}

fn parse_chain_id(value: &Value) -> Option<u64> {
    match value {
        Value::String(s) => match s.strip_prefix("0x") {
            Some(hex_part) => u64::from_str_radix(hex_part, 16).ok(),
            None => s.parse::<u64>().ok(),
        },
        Value::Number(n) => n.as_u64(),
        _ => None,
    }
}

#[derive(Clone)]
pub struct ChainResolver {
    connector: Arc<dyn RpcConnector>,
    request_timeout: Duration,
}

impl ChainResolver {
    pub fn new() -> Self {
        Self::with_connector(Arc::new(HttpConnector))
    }

    pub fn with_connector(connector: Arc<dyn RpcConnector>) -> Self {
        Self {
            connector,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Query the chain id behind an endpoint
    pub async fn chain_id(&self, endpoint: &Endpoint) -> FhevmResult<u64> {
        let label = endpoint.describe();
        let provider: Arc<dyn Eip1193Provider> = match endpoint {
            Endpoint::Url(url) => self.connector.connect(url)?,
            Endpoint::Provider(provider) => provider.clone(),
        };

        let response = timeout(
            self.request_timeout,
            provider.request("eth_chainId", json!([])),
        )
        .await
        .map_err(|_| FhevmError::network(&label, "eth_chainId timed out"))?
        .map_err(|e| FhevmError::network(&label, e))?;

        parse_chain_id(&response).ok_or_else(|| {
            FhevmError::network(&label, format!("unexpected eth_chainId response: {}", response))
        })
    }

    /// Resolve the chain id and decide whether it is a mock (local dev) chain
    pub async fn resolve(
        &self,
        endpoint: &Endpoint,
        mock_chains: &HashMap<u64, String>,
    ) -> FhevmResult<ResolvedChain> {
        let chain_id = self.chain_id(endpoint).await?;
        let mut rpc_url = endpoint.url().map(str::to_string);

        let chains = merged_mock_chains(mock_chains);
        let is_mock = match chains.get(&chain_id) {
            Some(mock_url) => {
                if rpc_url.is_none() {
                    rpc_url = Some(mock_url.clone());
                }
                true
            }
            None => false,
        };

        debug!(chain_id, is_mock, rpc_url = ?rpc_url, "Resolved chain");
        Ok(ResolvedChain {
            is_mock,
            chain_id,
            rpc_url,
        })
    }

    /// Probe `rpc_url` for an FHEVM Hardhat node
    pub async fn probe_local_node(&self, rpc_url: &str) -> FhevmResult<Option<RelayerMetadata>> {
        let provider = self.connector.connect(rpc_url)?;
        probe::probe_local_node(provider.as_ref(), rpc_url, self.request_timeout).await
    }
}

impl Default for ChainResolver {
    fn default() -> Self {
        Self::new()
    }
}
