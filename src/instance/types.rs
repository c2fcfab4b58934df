// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use crate::errors::{FhevmError, FhevmResult};
use crate::utils::{is_hex_address, is_hex_handle};
use ethers::types::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Encrypted value types supported by encrypted inputs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FheType {
    Ebool,
    Euint8,
    Euint16,
    Euint32,
    Euint64,
    Euint128,
    Euint256,
    Eaddress,
}

impl FheType {
    pub const ALL: [FheType; 8] = [
        FheType::Ebool,
        FheType::Euint8,
        FheType::Euint16,
        FheType::Euint32,
        FheType::Euint64,
        FheType::Euint128,
        FheType::Euint256,
        FheType::Eaddress,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            FheType::Ebool => "ebool",
            FheType::Euint8 => "euint8",
            FheType::Euint16 => "euint16",
            FheType::Euint32 => "euint32",
            FheType::Euint64 => "euint64",
            FheType::Euint128 => "euint128",
            FheType::Euint256 => "euint256",
            FheType::Eaddress => "eaddress",
        }
    }

    /// Bits counted against the 2048-bit budget of one encrypted input
    pub fn packed_bits(&self) -> u32 {
        match self {
            FheType::Ebool => 2,
            FheType::Euint8 => 8,
            FheType::Euint16 => 16,
            FheType::Euint32 => 32,
            FheType::Euint64 => 64,
            FheType::Euint128 => 128,
            FheType::Euint256 => 256,
            FheType::Eaddress => 160,
        }
    }

    /// Width of the unsigned range, `None` for bool and address
    pub fn uint_bits(&self) -> Option<u32> {
        match self {
            FheType::Euint8 => Some(8),
            FheType::Euint16 => Some(16),
            FheType::Euint32 => Some(32),
            FheType::Euint64 => Some(64),
            FheType::Euint128 => Some(128),
            FheType::Euint256 => Some(256),
            FheType::Ebool | FheType::Eaddress => None,
        }
    }

    /// Type byte stored in ciphertext handles
    pub fn handle_type_id(&self) -> u8 {
        match self {
            FheType::Ebool => 0,
            FheType::Euint8 => 2,
            FheType::Euint16 => 3,
            FheType::Euint32 => 4,
            FheType::Euint64 => 5,
            FheType::Euint128 => 6,
            FheType::Eaddress => 7,
            FheType::Euint256 => 8,
        }
    }
}

impl fmt::Display for FheType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FheType {
    type Err = FhevmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FheType::ALL
            .iter()
            .copied()
            .find(|t| t.name() == s)
            .ok_or_else(|| FhevmError::Validation(format!("unsupported encrypted type '{}'", s)))
    }
}

/// A ciphertext handle and the contract that owns it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandleContractPair {
    pub handle: String,
    pub contract_address: String,
}

impl HandleContractPair {
    pub fn new(handle: impl Into<String>, contract_address: impl Into<String>) -> Self {
        Self {
            handle: handle.into(),
            contract_address: contract_address.into(),
        }
    }

    pub fn validate(&self) -> FhevmResult<()> {
        if !is_hex_handle(&self.handle) {
            return Err(FhevmError::Validation(format!(
                "invalid ciphertext handle '{}'",
                self.handle
            )));
        }
        if !is_hex_address(&self.contract_address) {
            return Err(FhevmError::InvalidAddress(self.contract_address.clone()));
        }
        Ok(())
    }
}

/// Clear value returned by a decryption
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum DecryptedValue {
    Bool(bool),
    Uint(U256),
    Address(Address),
}

/// Handles plus the zero-knowledge input proof for one encrypted input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedInput {
    pub handles: Vec<Bytes>,
    pub input_proof: Bytes,
}

/// Ephemeral keypair used to re-encrypt decryption results for one user
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Keypair {
    pub public_key: String,
    pub private_key: String,
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("public_key", &self.public_key)
            .field("private_key", &"<redacted>")
            .finish()
    }
}
