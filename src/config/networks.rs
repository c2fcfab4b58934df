// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use crate::errors::FhevmResult;
use crate::utils::parse_address;
use ethers::types::Address;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Chain id of the conventional local development network (Hardhat/Anvil)
pub const LOCAL_DEV_CHAIN_ID: u64 = 31337;
pub const LOCAL_DEV_RPC_URL: &str = "http://localhost:8545";

/// Contract addresses and relayer endpoint of one FHEVM-enabled network
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkConfig {
    pub chain_id: u64,
    pub gateway_chain_id: u64,
    pub acl_contract_address: String,
    pub kms_contract_address: String,
    pub input_verifier_contract_address: String,
    pub verifying_contract_address_decryption: String,
    pub verifying_contract_address_input_verification: String,
    pub relayer_url: String,
    pub network_url: String,
}

impl NetworkConfig {
    pub fn sepolia() -> Self {
        NetworkConfig {
            chain_id: 11155111,
            gateway_chain_id: 55815,
            acl_contract_address: "0x687820221192C5B662b25367F70076A37bc79b6c".to_string(),
            kms_contract_address: "0x1364cBBf2cDF5032C47d8226a6f6FBD2AFCDacAC".to_string(),
            input_verifier_contract_address: "0xbc91f3daD1A5F19F8390c400196e58073B6a0BC4"
                .to_string(),
            verifying_contract_address_decryption: "0xb6E160B1ff80D67Bfe90A85eE06Ce0A2613607D1"
                .to_string(),
            verifying_contract_address_input_verification:
                "0x7048C39f048125eDa9d678AEbaDfB22F7900a29F".to_string(),
            relayer_url: std::env::var("FHEVM_SEPOLIA_RELAYER_URL")
                .unwrap_or_else(|_| "https://relayer.testnet.zama.cloud".to_string()),
            network_url: std::env::var("FHEVM_SEPOLIA_RPC_URL")
                .unwrap_or_else(|_| "https://eth-sepolia.public.blastapi.io".to_string()),
        }
    }

    pub fn acl_address(&self) -> FhevmResult<Address> {
        parse_address(&self.acl_contract_address)
    }
}

/// Known networks keyed by chain id
#[derive(Clone, Debug)]
pub struct NetworkRegistry {
    networks: HashMap<u64, NetworkConfig>,
}

impl NetworkRegistry {
    /// Registry holding the Sepolia preset
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register(NetworkConfig::sepolia());
        registry
    }

    pub fn empty() -> Self {
        NetworkRegistry {
            networks: HashMap::new(),
        }
    }

    /// Add `config`, replacing any network with the same chain id
    pub fn register(&mut self, config: NetworkConfig) {
        self.networks.insert(config.chain_id, config);
    }

    pub fn get(&self, chain_id: u64) -> Option<&NetworkConfig> {
        self.networks.get(&chain_id)
    }

    pub fn is_supported(&self, chain_id: u64) -> bool {
        self.networks.contains_key(&chain_id)
    }
}

impl Default for NetworkRegistry {
    fn default() -> Self {
        Self::new()
    }
}
