// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Public key / public params cache
//!
//! Downloading the network public key and CRS parameters is the slowest part
//! of instance creation. The material is cached per ACL contract address so
//! later instances for the same network start from the cached copy.

use super::KeyValueStore;
use crate::utils::to_checksum_string;
use anyhow::Result;
use ethers::types::Address;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

const KEY_PREFIX: &str = "fhevm:public-key";

/// Identified blob of key material
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyMaterial {
    pub id: String,
    #[serde(with = "hex::serde")]
    pub data: Vec<u8>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedPublicKey {
    pub public_key: Option<KeyMaterial>,
    pub public_params: Option<KeyMaterial>,
}

impl CachedPublicKey {
    pub fn is_empty(&self) -> bool {
        self.public_key.is_none() && self.public_params.is_none()
    }
}

#[derive(Clone)]
pub struct PublicKeyCache {
    store: Arc<dyn KeyValueStore>,
}

impl PublicKeyCache {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    fn key(acl_address: &Address) -> String {
        format!("{}:{}", KEY_PREFIX, to_checksum_string(acl_address))
    }

    /// Cached material for `acl_address`; a miss or unreadable entry yields empty values
    pub async fn get(&self, acl_address: &Address) -> CachedPublicKey {
        let key = Self::key(acl_address);
        match self.store.get_item(&key).await {
            Ok(Some(json)) => match serde_json::from_str::<CachedPublicKey>(&json) {
                Ok(cached) => {
                    debug!(key = %key, "Public key cache hit");
                    cached
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "Discarding unreadable public key cache entry");
                    CachedPublicKey::default()
                }
            },
            Ok(None) => CachedPublicKey::default(),
            Err(e) => {
                warn!(key = %key, error = %e, "Public key cache read failed");
                CachedPublicKey::default()
            }
        }
    }

    pub async fn set(
        &self,
        acl_address: &Address,
        public_key: Option<KeyMaterial>,
        public_params: Option<KeyMaterial>,
    ) -> Result<()> {
        let entry = CachedPublicKey {
            public_key,
            public_params,
        };
        if entry.is_empty() {
            return Ok(());
        }
        let json = serde_json::to_string(&entry)?;
        self.store.set_item(&Self::key(acl_address), &json).await
    }
}
