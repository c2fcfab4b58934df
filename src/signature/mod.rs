// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Decryption authorization signatures
//!
//! Every user decryption must be backed by an EIP-712 signature from the
//! user's wallet. [`SignatureManager`] caches these in a [`crate::storage::KeyValueStore`]
//! so the wallet is prompted at most once per validity window and contract set.

pub mod manager;
pub mod signer;
pub mod types;

pub use manager::{SignatureManager, DEFAULT_SIGNATURE_DURATION_DAYS};
pub use signer::{DecryptionSigner, WalletSigner};
pub use types::{normalize_contracts, signature_cache_key, DecryptionSignature};
