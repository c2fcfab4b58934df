// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! EIP-712 user-decryption authorization
//!
//! The user signs a `UserDecryptRequestVerification` message binding the
//! ephemeral public key, the contracts whose ciphertexts may be decrypted and
//! the validity window. The structure serializes to the standard
//! `eth_signTypedData_v4` JSON shape, so it converts directly into an ethers
//! [`TypedData`] for hashing and signing.

use crate::errors::{FhevmError, FhevmResult};
use crate::utils::to_checksum_string;
use ethers::types::transaction::eip712::{Eip712, TypedData};
use ethers::types::{Address, Signature, H256};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

pub const USER_DECRYPT_PRIMARY_TYPE: &str = "UserDecryptRequestVerification";
const DOMAIN_NAME: &str = "Decryption";
const DOMAIN_VERSION: &str = "1";
const EMPTY_EXTRA_DATA: &str = "0x00";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Eip712Domain {
    pub name: String,
    pub version: String,
    pub chain_id: u64,
    pub verifying_contract: String,
}

impl Eip712Domain {
    /// Decryption domain, verified on the gateway chain
    pub fn decryption(gateway_chain_id: u64, verifying_contract: &Address) -> Self {
        Self {
            name: DOMAIN_NAME.to_string(),
            version: DOMAIN_VERSION.to_string(),
            chain_id: gateway_chain_id,
            verifying_contract: to_checksum_string(verifying_contract),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Eip712Field {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
}

impl Eip712Field {
    fn new(name: &str, field_type: &str) -> Self {
        Self {
            name: name.to_string(),
            field_type: field_type.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDecryptMessage {
    pub public_key: String,
    pub contract_addresses: Vec<String>,
    pub contracts_chain_id: u64,
    pub start_timestamp: u64,
    pub duration_days: u64,
    pub extra_data: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDecryptEip712 {
    pub domain: Eip712Domain,
    pub types: BTreeMap<String, Vec<Eip712Field>>,
    pub primary_type: String,
    pub message: UserDecryptMessage,
}

fn user_decrypt_types() -> BTreeMap<String, Vec<Eip712Field>> {
    let mut types = BTreeMap::new();
    types.insert(
        "EIP712Domain".to_string(),
        vec![
            Eip712Field::new("name", "string"),
            Eip712Field::new("version", "string"),
            Eip712Field::new("chainId", "uint256"),
            Eip712Field::new("verifyingContract", "address"),
        ],
    );
    types.insert(
        USER_DECRYPT_PRIMARY_TYPE.to_string(),
        vec![
            Eip712Field::new("publicKey", "bytes"),
            Eip712Field::new("contractAddresses", "address[]"),
            Eip712Field::new("contractsChainId", "uint256"),
            Eip712Field::new("startTimestamp", "uint256"),
            Eip712Field::new("durationDays", "uint256"),
            Eip712Field::new("extraData", "bytes"),
        ],
    );
    types
}

impl UserDecryptEip712 {
    pub fn new(
        domain: Eip712Domain,
        contracts_chain_id: u64,
        public_key: &str,
        contract_addresses: &[Address],
        start_timestamp: u64,
        duration_days: u64,
    ) -> Self {
        Self {
            domain,
            types: user_decrypt_types(),
            primary_type: USER_DECRYPT_PRIMARY_TYPE.to_string(),
            message: UserDecryptMessage {
                public_key: public_key.to_string(),
                contract_addresses: contract_addresses.iter().map(to_checksum_string).collect(),
                contracts_chain_id,
                start_timestamp,
                duration_days,
                extra_data: EMPTY_EXTRA_DATA.to_string(),
            },
        }
    }

    pub fn to_typed_data(&self) -> FhevmResult<TypedData> {
        let value = serde_json::to_value(self)
            .map_err(|e| FhevmError::SignatureFailed(format!("EIP-712 encoding: {}", e)))?;
        serde_json::from_value(value)
            .map_err(|e| FhevmError::SignatureFailed(format!("EIP-712 typed data: {}", e)))
    }

    /// EIP-712 digest that wallets sign
    pub fn digest(&self) -> FhevmResult<[u8; 32]> {
        self.to_typed_data()?
            .encode_eip712()
            .map_err(|e| FhevmError::SignatureFailed(format!("EIP-712 hashing: {}", e)))
    }

    /// Address that produced `signature` over this message
    pub fn recover_signer(&self, signature: &str) -> FhevmResult<Address> {
        let digest = self.digest()?;
        let signature = Signature::from_str(signature)
            .map_err(|e| FhevmError::SignatureFailed(format!("malformed signature: {}", e)))?;
        signature
            .recover(H256::from(digest))
            .map_err(|e| FhevmError::SignatureFailed(format!("signature recovery: {}", e)))
    }
}
