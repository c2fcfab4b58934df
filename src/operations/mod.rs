// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Encryption and decryption on top of a ready instance

pub mod decrypt;
pub mod decryptor;
pub mod encrypt;
pub mod validation;

pub use decrypt::{
    decrypt_batch, get_unique_contract_addresses, DecryptBatchParams, DecryptBatchResult,
    NO_REQUESTS_ERROR,
};
pub use decryptor::{DecryptContext, DecryptOutcome, Decryptor};
pub use encrypt::{encrypt_value, encrypt_values};
pub use validation::{is_valid_encryption_value, parse_clear_value, ClearValue};
