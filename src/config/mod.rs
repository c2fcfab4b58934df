// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! SDK configuration
//!
//! [`SdkConfig`] can be built in code, parsed from TOML, or read from the
//! environment. Environment variables override values loaded from a file:
//!
//! - `FHEVM_RPC_URL`: RPC endpoint to connect to
//! - `FHEVM_MOCK_CHAINS`: extra mock chains, `id=url,id=url`
//! - `FHEVM_STORAGE_DIR`: directory for the durable signature store
//! - `FHEVM_SIGNATURE_DURATION_DAYS`: validity window of new decryption signatures
//! - `FHEVM_MAX_RETRIES`: enables instance-creation retries with this many attempts

pub mod networks;

pub use networks::{NetworkConfig, NetworkRegistry, LOCAL_DEV_CHAIN_ID, LOCAL_DEV_RPC_URL};

use crate::chain::ChainResolver;
use crate::instance::InstanceFactory;
use crate::lifecycle::manager::ManagerOptions;
use crate::lifecycle::retry::RetryConfig;
use crate::signature::SignatureManager;
use crate::storage::{FileStore, KeyValueStore, MemoryStore};
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

fn default_signature_duration_days() -> u64 {
    1
}

fn default_request_timeout_secs() -> u64 {
    5
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SdkConfig {
    #[serde(default)]
    pub rpc_url: Option<String>,
    /// Chain id (as a string key, TOML tables only have string keys) to RPC URL
    #[serde(default)]
    pub mock_chains: BTreeMap<String, String>,
    /// Used for every chain when set
    #[serde(default)]
    pub network: Option<NetworkConfig>,
    /// Extra networks, picked by the resolved chain id
    #[serde(default)]
    pub networks: Vec<NetworkConfig>,
    #[serde(default)]
    pub retry: Option<RetryConfig>,
    #[serde(default = "default_signature_duration_days")]
    pub signature_duration_days: u64,
    #[serde(default)]
    pub storage_dir: Option<PathBuf>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for SdkConfig {
    fn default() -> Self {
        Self {
            rpc_url: None,
            mock_chains: BTreeMap::new(),
            network: None,
            networks: Vec::new(),
            retry: None,
            signature_duration_days: default_signature_duration_days(),
            storage_dir: None,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl SdkConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: SdkConfig =
            toml::from_str(contents).map_err(|e| anyhow!("Invalid SDK config: {}", e))?;
        config.mock_chain_table()?;
        Ok(config)
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read SDK config {:?}", path))?;
        let mut config = Self::from_toml_str(&contents)?;
        config.apply_env();
        Ok(config)
    }

    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Override fields from `FHEVM_*` environment variables
    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("FHEVM_RPC_URL") {
            self.rpc_url = Some(url);
        }

        if let Ok(chains) = std::env::var("FHEVM_MOCK_CHAINS") {
            for entry in chains.split(',').map(str::trim).filter(|e| !e.is_empty()) {
                match entry.split_once('=') {
                    Some((id, url)) => {
                        self.mock_chains
                            .insert(id.trim().to_string(), url.trim().to_string());
                    }
                    None => warn!(entry, "Ignoring malformed FHEVM_MOCK_CHAINS entry"),
                }
            }
        }

        if let Ok(dir) = std::env::var("FHEVM_STORAGE_DIR") {
            self.storage_dir = Some(PathBuf::from(dir));
        }

        if let Some(days) = std::env::var("FHEVM_SIGNATURE_DURATION_DAYS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
        {
            self.signature_duration_days = days;
        }

        if let Some(max_retries) = std::env::var("FHEVM_MAX_RETRIES")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
        {
            let mut retry = self.retry.clone().unwrap_or_default();
            retry.max_retries = max_retries;
            self.retry = Some(retry);
        }
    }

    /// Mock chains keyed by numeric chain id
    pub fn mock_chain_table(&self) -> Result<HashMap<u64, String>> {
        self.mock_chains
            .iter()
            .map(|(id, url)| {
                let chain_id = id
                    .parse::<u64>()
                    .map_err(|_| anyhow!("Invalid mock chain id '{}'", id))?;
                Ok((chain_id, url.clone()))
            })
            .collect()
    }

    /// File store under `storage_dir`, in-memory otherwise
    pub fn store(&self) -> Arc<dyn KeyValueStore> {
        match &self.storage_dir {
            Some(dir) => Arc::new(FileStore::new(dir)),
            None => Arc::new(MemoryStore::new()),
        }
    }

    pub fn signature_manager(&self, store: Arc<dyn KeyValueStore>) -> SignatureManager {
        SignatureManager::new(store).with_duration_days(self.signature_duration_days)
    }

    pub fn resolver(&self) -> ChainResolver {
        ChainResolver::new().with_timeout(Duration::from_secs(self.request_timeout_secs))
    }

    /// Apply the request timeout and networks to `factory`
    pub fn configure_factory(&self, factory: InstanceFactory) -> InstanceFactory {
        let resolver = factory
            .resolver()
            .clone()
            .with_timeout(Duration::from_secs(self.request_timeout_secs));
        let factory = self
            .networks
            .iter()
            .fold(factory.with_resolver(resolver), |factory, network| {
                factory.register_network(network.clone())
            });
        match &self.network {
            Some(network) => factory.with_network(network.clone()),
            None => factory,
        }
    }

    /// Options for a manager on `rpc_url`, or `None` when no URL is configured
    pub fn manager_options(&self) -> Result<Option<ManagerOptions>> {
        let Some(rpc_url) = self.rpc_url.as_deref() else {
            return Ok(None);
        };
        let mut options =
            ManagerOptions::new(rpc_url).with_mock_chains(self.mock_chain_table()?);
        if let Some(retry) = &self.retry {
            options = options.with_retry(retry.clone());
        }
        Ok(Some(options))
    }
}
