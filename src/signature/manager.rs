// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Load-or-sign flow for decryption signatures
//!
//! A cached signature is reused only while it is time-valid, was issued to
//! the same user, and authorizes exactly the requested contract set.
//! Everything else ends in a fresh keypair and one signing request.
//!
//! Flows for the same cache key are serialized by a keyed async lock: a
//! second caller waits for the first and then finds its cached result.

use super::signer::DecryptionSigner;
use super::types::{normalize_contracts, signature_cache_key, DecryptionSignature};
use crate::instance::FhevmInstance;
use crate::storage::KeyValueStore;
use crate::utils::unix_now;
use anyhow::Result;
use ethers::types::Address;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

pub const DEFAULT_SIGNATURE_DURATION_DAYS: u64 = 1;

pub struct SignatureManager {
    store: Arc<dyn KeyValueStore>,
    duration_days: u64,
    key_locks: KeyLocks,
}

impl SignatureManager {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            duration_days: DEFAULT_SIGNATURE_DURATION_DAYS,
            key_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Validity window for newly signed authorizations; 0 is treated as 1
    pub fn with_duration_days(mut self, days: u64) -> Self {
        self.duration_days = days.max(1);
        self
    }

    pub fn duration_days(&self) -> u64 {
        self.duration_days
    }

    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    /// Cached signature or a freshly signed one; `None` when none can be had
    pub async fn load_or_sign(
        &self,
        instance: &dyn FhevmInstance,
        contract_addresses: &[Address],
        signer: &dyn DecryptionSigner,
    ) -> Option<DecryptionSignature> {
        let user_address = match signer.address().await {
            Ok(address) => address,
            Err(e) => {
                warn!(error = %e, "Could not resolve signer address");
                return None;
            }
        };

        let contracts = normalize_contracts(contract_addresses);
        if contracts.is_empty() {
            warn!("No contract addresses to authorize");
            return None;
        }

        let key = signature_cache_key(instance.chain_id(), &user_address, &contracts);
        let lease = self.key_lock(&key);
        let _guard = lease.lock.lock().await;
        self.load_or_sign_locked(instance, &key, &contracts, user_address, signer)
            .await
    }

    async fn load_or_sign_locked(
        &self,
        instance: &dyn FhevmInstance,
        key: &str,
        contracts: &[Address],
        user_address: Address,
        signer: &dyn DecryptionSigner,
    ) -> Option<DecryptionSignature> {
        if let Some(cached) = self.lookup(key, contracts, user_address).await {
            debug!(key = %key, "Reusing cached decryption signature");
            return Some(cached);
        }

        let keypair = match instance.generate_keypair() {
            Ok(keypair) => keypair,
            Err(e) => {
                warn!(error = %e, "Keypair generation failed");
                return None;
            }
        };

        let start_timestamp = unix_now();
        let eip712 = match instance.create_eip712(
            &keypair.public_key,
            contracts,
            start_timestamp,
            self.duration_days,
        ) {
            Ok(eip712) => eip712,
            Err(e) => {
                warn!(error = %e, "Could not build decryption authorization");
                return None;
            }
        };

        let signature = match signer.sign_typed_data(&eip712).await {
            Ok(signature) => signature,
            Err(e) => {
                warn!(user = ?user_address, error = %e, "Decryption authorization not signed");
                return None;
            }
        };

        let signed = DecryptionSignature {
            public_key: keypair.public_key,
            private_key: keypair.private_key,
            signature,
            contract_addresses: contracts.to_vec(),
            user_address,
            start_timestamp,
            duration_days: self.duration_days,
            eip712,
        };

        match serde_json::to_string(&signed) {
            Ok(json) => {
                if let Err(e) = self.store.set_item(key, &json).await {
                    warn!(key = %key, error = %e, "Failed to persist decryption signature");
                }
            }
            Err(e) => warn!(error = %e, "Failed to serialize decryption signature"),
        }

        info!(
            user = ?user_address,
            contracts = contracts.len(),
            duration_days = self.duration_days,
            "🔏 New decryption signature"
        );
        Some(signed)
    }

    async fn lookup(
        &self,
        key: &str,
        contracts: &[Address],
        user_address: Address,
    ) -> Option<DecryptionSignature> {
        let raw = match self.store.get_item(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(key = %key, error = %e, "Signature store read failed");
                return None;
            }
        };

        let cached: DecryptionSignature = match serde_json::from_str(&raw) {
            Ok(cached) => cached,
            Err(e) => {
                warn!(key = %key, error = %e, "Removing unreadable cached signature");
                if let Err(e) = self.store.remove_item(key).await {
                    warn!(key = %key, error = %e, "Failed to remove cached signature");
                }
                return None;
            }
        };

        if !cached.is_valid() {
            debug!(key = %key, expired_at = cached.expires_at(), "Cached signature expired");
            return None;
        }
        if cached.user_address != user_address || !cached.covers(contracts) {
            debug!(key = %key, "Cached signature does not match request");
            return None;
        }
        Some(cached)
    }

    /// Drop the cached signature for this (chain, user, contract set)
    pub async fn evict(
        &self,
        chain_id: u64,
        user_address: &Address,
        contract_addresses: &[Address],
    ) -> Result<()> {
        let key = signature_cache_key(chain_id, user_address, contract_addresses);
        self.store.remove_item(&key).await
    }

    fn key_lock(&self, key: &str) -> KeyLockLease<'_> {
        let mut locks = self.key_locks.lock().unwrap_or_else(PoisonError::into_inner);
        let lock = locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();
        KeyLockLease {
            locks: &self.key_locks,
            key: key.to_string(),
            lock,
        }
    }

    #[cfg(all(test, feature = "mock"))]
    fn pending_locks(&self) -> usize {
        self.key_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

type KeyLocks = Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>;

/// Share of one key lock; the map entry goes away with the last lease,
/// including when the waiting future is dropped
struct KeyLockLease<'a> {
    locks: &'a KeyLocks,
    key: String,
    lock: Arc<tokio::sync::Mutex<()>>,
}

impl Drop for KeyLockLease<'_> {
    fn drop(&mut self) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // Map entry plus ours: nobody else is waiting
        if Arc::strong_count(&self.lock) <= 2 {
            locks.remove(&self.key);
        }
    }
}
