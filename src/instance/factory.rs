// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Single instance-creation attempt
//!
//! ## Flow
//!
//! 1. Resolve the chain behind the endpoint
//! 2. Mock chain with a detected FHEVM Hardhat node: build a mock instance and stop
//! 3. Load the relayer SDK (browser only) and initialize it once per process
//! 4. Look up cached public key material for the network's ACL contract
//! 5. Create the instance, then write its public key material back to the cache
//!
//! Every suspension point races the cancellation token; once the token fires
//! the attempt returns [`FhevmError::Aborted`] and stops reporting progress.

use super::mock::{default_mock_backend, MockBackend};
use super::sdk::{global_initializer, InstanceConfig, RelayerSdk, RuntimeEnvironment, SdkInitializer};
use super::FhevmInstance;
use crate::chain::{ChainResolver, Endpoint, ResolvedChain};
use crate::config::{NetworkConfig, NetworkRegistry};
use crate::errors::{FhevmError, FhevmResult};
use crate::storage::{KeyValueStore, PublicKeyCache};
use crate::utils::{check_cancelled, run_cancellable};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Bit size of the public params fetched alongside the public key
pub const PUBLIC_PARAMS_BITS: u32 = 2048;

/// Progress of one creation attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CreateStatus {
    SdkLoading,
    SdkLoaded,
    SdkInitializing,
    SdkInitialized,
    Creating,
}

pub type CreateStatusCallback = Arc<dyn Fn(CreateStatus) + Send + Sync>;

#[derive(Clone)]
pub struct CreateParams {
    pub endpoint: Endpoint,
    pub mock_chains: HashMap<u64, String>,
    pub cancel: CancellationToken,
    pub on_status: Option<CreateStatusCallback>,
}

impl CreateParams {
    pub fn new(endpoint: impl Into<Endpoint>) -> Self {
        Self {
            endpoint: endpoint.into(),
            mock_chains: HashMap::new(),
            cancel: CancellationToken::new(),
            on_status: None,
        }
    }

    pub fn with_mock_chains(mut self, mock_chains: HashMap<u64, String>) -> Self {
        self.mock_chains = mock_chains;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_status_callback(mut self, on_status: CreateStatusCallback) -> Self {
        self.on_status = Some(on_status);
        self
    }
}

impl fmt::Debug for CreateParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreateParams")
            .field("endpoint", &self.endpoint)
            .field("mock_chains", &self.mock_chains)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

pub struct InstanceFactory {
    sdk: Arc<dyn RelayerSdk>,
    mock_backend: Option<Arc<dyn MockBackend>>,
    resolver: ChainResolver,
    public_keys: PublicKeyCache,
    environment: RuntimeEnvironment,
    initializer: &'static SdkInitializer,
    network: Option<NetworkConfig>,
    networks: NetworkRegistry,
}

impl InstanceFactory {
    pub fn new(sdk: Arc<dyn RelayerSdk>, store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            sdk,
            mock_backend: default_mock_backend(),
            resolver: ChainResolver::new(),
            public_keys: PublicKeyCache::new(store),
            environment: RuntimeEnvironment::detect(),
            initializer: global_initializer(),
            network: None,
            networks: NetworkRegistry::new(),
        }
    }

    pub fn with_mock_backend(mut self, backend: Option<Arc<dyn MockBackend>>) -> Self {
        self.mock_backend = backend;
        self
    }

    pub fn with_resolver(mut self, resolver: ChainResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_environment(mut self, environment: RuntimeEnvironment) -> Self {
        self.environment = environment;
        self
    }

    pub fn with_initializer(mut self, initializer: &'static SdkInitializer) -> Self {
        self.initializer = initializer;
        self
    }

    /// Use `network` for every chain, ignoring the registry
    pub fn with_network(mut self, network: NetworkConfig) -> Self {
        self.network = Some(network);
        self
    }

    pub fn register_network(mut self, network: NetworkConfig) -> Self {
        self.networks.register(network);
        self
    }

    /// Override, then the registry entry for `chain_id`, then the SDK default
    fn select_network(&self, chain_id: u64) -> NetworkConfig {
        if let Some(network) = &self.network {
            return network.clone();
        }
        match self.networks.get(chain_id) {
            Some(network) => network.clone(),
            None => {
                debug!(chain_id, "No registered network for chain, using SDK default");
                self.sdk.default_network()
            }
        }
    }

    pub fn resolver(&self) -> &ChainResolver {
        &self.resolver
    }

    pub fn environment(&self) -> RuntimeEnvironment {
        self.environment
    }

    /// Run one creation attempt
    pub async fn create(&self, params: CreateParams) -> FhevmResult<Arc<dyn FhevmInstance>> {
        let CreateParams {
            endpoint,
            mock_chains,
            cancel,
            on_status,
        } = params;

        let notify = |status: CreateStatus| {
            if cancel.is_cancelled() {
                return;
            }
            debug!(status = ?status, "Instance creation progress");
            if let Some(callback) = &on_status {
                callback(status);
            }
        };

        check_cancelled(&cancel)?;
        let resolved =
            run_cancellable(&cancel, self.resolver.resolve(&endpoint, &mock_chains)).await??;

        if resolved.is_mock {
            if let Some(instance) = self.try_create_mock(&resolved, &cancel, &notify).await? {
                return Ok(instance);
            }
        }

        check_cancelled(&cancel)?;

        if self.environment == RuntimeEnvironment::Browser && !self.sdk.is_loaded() {
            notify(CreateStatus::SdkLoading);
            run_cancellable(&cancel, self.sdk.load())
                .await?
                .map_err(|e| FhevmError::SdkLoadFailed(e.to_string()))?;
            notify(CreateStatus::SdkLoaded);
        }

        if !self.initializer.is_initialized() {
            notify(CreateStatus::SdkInitializing);
            run_cancellable(&cancel, self.initializer.ensure_initialized(self.sdk.as_ref()))
                .await??;
            notify(CreateStatus::SdkInitialized);
        }

        let network = self.select_network(resolved.chain_id);
        let acl_address = network.acl_address()?;

        let cached = run_cancellable(&cancel, self.public_keys.get(&acl_address)).await?;
        debug!(
            acl = ?acl_address,
            cached_key = cached.public_key.is_some(),
            cached_params = cached.public_params.is_some(),
            "Loaded cached public key material"
        );

        notify(CreateStatus::Creating);
        let relayer_url = network.relayer_url.clone();
        let config = InstanceConfig {
            network,
            endpoint,
            public_key: cached.public_key,
            public_params: cached.public_params,
        };
        let instance = run_cancellable(&cancel, self.sdk.create_instance(config))
            .await?
            .map_err(|e| FhevmError::network(relayer_url, e))?;

        // Cache write happens even if the token fired meanwhile
        if let Err(e) = self
            .public_keys
            .set(
                &acl_address,
                instance.public_key(),
                instance.public_params(PUBLIC_PARAMS_BITS),
            )
            .await
        {
            warn!(acl = ?acl_address, error = %e, "Failed to cache public key material");
        }

        check_cancelled(&cancel)?;
        info!(chain_id = resolved.chain_id, "✅ FHEVM instance created");
        Ok(instance)
    }

    async fn try_create_mock(
        &self,
        resolved: &ResolvedChain,
        cancel: &CancellationToken,
        notify: &(dyn Fn(CreateStatus) + Sync),
    ) -> FhevmResult<Option<Arc<dyn FhevmInstance>>> {
        let Some(backend) = &self.mock_backend else {
            debug!(chain_id = resolved.chain_id, "No mock backend installed, using relayer SDK");
            return Ok(None);
        };
        let Some(rpc_url) = resolved.rpc_url.as_deref() else {
            return Ok(None);
        };

        let metadata = run_cancellable(cancel, self.resolver.probe_local_node(rpc_url)).await??;
        let Some(metadata) = metadata else {
            debug!(rpc_url, "Mock chain without FHEVM Hardhat node, using relayer SDK");
            return Ok(None);
        };

        notify(CreateStatus::Creating);
        let instance = run_cancellable(
            cancel,
            backend.create_instance(rpc_url, resolved.chain_id, &metadata),
        )
        .await?
        .map_err(FhevmError::Other)?;

        info!(chain_id = resolved.chain_id, rpc_url, "🧪 Mock FHEVM instance created");
        Ok(Some(instance))
    }
}
