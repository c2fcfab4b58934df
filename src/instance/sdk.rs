// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Relayer SDK capability and process-wide initialization

use super::FhevmInstance;
use crate::chain::Endpoint;
use crate::config::NetworkConfig;
use crate::errors::{FhevmError, FhevmResult};
use crate::storage::KeyMaterial;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Configuration handed to the relayer SDK's instance factory
#[derive(Debug, Clone)]
pub struct InstanceConfig {
    pub network: NetworkConfig,
    pub endpoint: Endpoint,
    pub public_key: Option<KeyMaterial>,
    pub public_params: Option<KeyMaterial>,
}

/// Remote encryption SDK
#[async_trait]
pub trait RelayerSdk: Send + Sync {
    /// Whether the SDK's code/runtime is already present
    fn is_loaded(&self) -> bool;

    async fn load(&self) -> Result<()>;

    /// One-time runtime initialization, called at most once per process
    async fn initialize(&self) -> Result<()>;

    fn default_network(&self) -> NetworkConfig;

    async fn create_instance(&self, config: InstanceConfig) -> Result<Arc<dyn FhevmInstance>>;
}

/// Where the SDK runs; only browser-like environments load the SDK lazily
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeEnvironment {
    Browser,
    Native,
}

impl RuntimeEnvironment {
    pub fn detect() -> Self {
        if cfg!(target_arch = "wasm32") {
            RuntimeEnvironment::Browser
        } else {
            RuntimeEnvironment::Native
        }
    }
}

/// Init-once guard for [`RelayerSdk::initialize`]
pub struct SdkInitializer {
    cell: OnceCell<()>,
}

impl SdkInitializer {
    pub const fn new() -> Self {
        Self {
            cell: OnceCell::const_new(),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.cell.initialized()
    }

    /// Initialize `sdk` unless already done; returns whether this call ran it.
    /// A failed initialization leaves the guard unset so a later call retries.
    pub async fn ensure_initialized(&self, sdk: &dyn RelayerSdk) -> FhevmResult<bool> {
        if self.is_initialized() {
            return Ok(false);
        }

        let mut ran = false;
        self.cell
            .get_or_try_init(|| {
                ran = true;
                sdk.initialize()
            })
            .await
            .map_err(|e| FhevmError::SdkLoadFailed(format!("initialization failed: {}", e)))?;
        Ok(ran)
    }
}

impl Default for SdkInitializer {
    fn default() -> Self {
        Self::new()
    }
}

static GLOBAL_SDK_INITIALIZER: SdkInitializer = SdkInitializer::new();

pub fn global_initializer() -> &'static SdkInitializer {
    &GLOBAL_SDK_INITIALIZER
}

/// Initialize `sdk` through the process-wide guard
pub async fn ensure_initialized(sdk: &dyn RelayerSdk) -> FhevmResult<bool> {
    GLOBAL_SDK_INITIALIZER.ensure_initialized(sdk).await
}
