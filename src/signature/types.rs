// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use crate::instance::UserDecryptEip712;
use crate::utils::{unix_now, SECONDS_PER_DAY};
use ethers::types::Address;
use ethers::utils::keccak256;
use serde::{Deserialize, Serialize};
use std::fmt;

const KEY_PREFIX: &str = "fhevm:decryption-signature";

/// Time-bounded EIP-712 authorization letting `user_address` decrypt
/// ciphertexts of `contract_addresses`, plus the ephemeral keypair the
/// relayer re-encrypts results for.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecryptionSignature {
    pub public_key: String,
    pub private_key: String,
    pub signature: String,
    /// Sorted, unique
    pub contract_addresses: Vec<Address>,
    pub user_address: Address,
    pub start_timestamp: u64,
    pub duration_days: u64,
    pub eip712: UserDecryptEip712,
}

impl DecryptionSignature {
    pub fn expires_at(&self) -> u64 {
        self.start_timestamp
            .saturating_add(self.duration_days.saturating_mul(SECONDS_PER_DAY))
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(unix_now())
    }

    pub fn is_valid_at(&self, now: u64) -> bool {
        now < self.expires_at()
    }

    /// Exact set equality with `contracts` (order and duplicates ignored)
    pub fn covers(&self, contracts: &[Address]) -> bool {
        normalize_contracts(&self.contract_addresses) == normalize_contracts(contracts)
    }
}

impl fmt::Debug for DecryptionSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecryptionSignature")
            .field("public_key", &self.public_key)
            .field("private_key", &"<redacted>")
            .field("signature", &self.signature)
            .field("contract_addresses", &self.contract_addresses)
            .field("user_address", &self.user_address)
            .field("start_timestamp", &self.start_timestamp)
            .field("duration_days", &self.duration_days)
            .finish()
    }
}

pub fn normalize_contracts(contracts: &[Address]) -> Vec<Address> {
    let mut sorted = contracts.to_vec();
    sorted.sort();
    sorted.dedup();
    sorted
}

/// Store key for a (chain, user, contract set) triple; independent of contract order
pub fn signature_cache_key(chain_id: u64, user_address: &Address, contracts: &[Address]) -> String {
    let joined = normalize_contracts(contracts)
        .iter()
        .map(|address| format!("{:?}", address))
        .collect::<Vec<_>>()
        .join(",");
    format!(
        "{}:{}:{:?}:{}",
        KEY_PREFIX,
        chain_id,
        user_address,
        hex::encode(keccak256(joined.as_bytes()))
    )
}
