// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! FHEVM instances
//!
//! An instance is the handle through which values are encrypted and
//! ciphertext handles decrypted. Instances come from one of two backends:
//!
//! - **Relayer SDK** ([`RelayerSdk`]): the remote capability for real networks
//! - **Mock backend** ([`MockBackend`]): an in-process backend for local
//!   development chains, selected when the chain resolver reports a mock chain
//!
//! [`InstanceFactory`] runs one cancellable creation attempt;
//! [`crate::lifecycle::FhevmManager`] drives attempts over time.

pub mod eip712;
pub mod factory;
pub mod mock;
pub mod sdk;
pub mod types;

pub use eip712::{Eip712Domain, UserDecryptEip712, UserDecryptMessage};
pub use factory::{CreateParams, CreateStatus, CreateStatusCallback, InstanceFactory};
#[cfg(feature = "mock")]
pub use mock::{LocalMockBackend, MockFhevmInstance};
pub use mock::MockBackend;
pub use sdk::{
    ensure_initialized, global_initializer, InstanceConfig, RelayerSdk, RuntimeEnvironment,
    SdkInitializer,
};
pub use types::{DecryptedValue, EncryptedInput, FheType, HandleContractPair, Keypair};

use crate::errors::FhevmResult;
use crate::storage::KeyMaterial;
use anyhow::Result;
use async_trait::async_trait;
use ethers::types::{Address, U256};
use std::collections::HashMap;

/// Accumulates clear values for one encrypted input
#[async_trait]
pub trait EncryptedInputBuilder: Send {
    fn add_bool(&mut self, value: bool) -> Result<()>;
    fn add_8(&mut self, value: u8) -> Result<()>;
    fn add_16(&mut self, value: u16) -> Result<()>;
    fn add_32(&mut self, value: u32) -> Result<()>;
    fn add_64(&mut self, value: u64) -> Result<()>;
    fn add_128(&mut self, value: u128) -> Result<()>;
    fn add_256(&mut self, value: U256) -> Result<()>;
    fn add_address(&mut self, value: Address) -> Result<()>;

    /// Encrypt everything added so far into handles plus an input proof
    async fn encrypt(&mut self) -> Result<EncryptedInput>;
}

/// Handle to a network's public key material and relayer
#[async_trait]
pub trait FhevmInstance: Send + Sync {
    fn chain_id(&self) -> u64;

    fn public_key(&self) -> Option<KeyMaterial>;

    fn public_params(&self, bits: u32) -> Option<KeyMaterial>;

    fn create_encrypted_input(
        &self,
        contract_address: Address,
        user_address: Address,
    ) -> Result<Box<dyn EncryptedInputBuilder>>;

    fn generate_keypair(&self) -> Result<Keypair>;

    fn create_eip712(
        &self,
        public_key: &str,
        contract_addresses: &[Address],
        start_timestamp: u64,
        duration_days: u64,
    ) -> FhevmResult<UserDecryptEip712>;

    /// Decrypt `requests` on behalf of `user_address`, authorized by `signature`
    #[allow(clippy::too_many_arguments)]
    async fn user_decrypt(
        &self,
        requests: &[HandleContractPair],
        private_key: &str,
        public_key: &str,
        signature: &str,
        contract_addresses: &[Address],
        user_address: Address,
        start_timestamp: u64,
        duration_days: u64,
    ) -> Result<HashMap<String, DecryptedValue>>;
}

impl std::fmt::Debug for dyn FhevmInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FhevmInstance")
            .field("chain_id", &self.chain_id())
            .finish_non_exhaustive()
    }
}
