// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Pluggable key-value storage
//!
//! Decryption signatures and public key material are persisted through the
//! [`KeyValueStore`] capability. Backends are interchangeable:
//!
//! - [`MemoryStore`]: process-lifetime map, cleared on restart
//! - [`FileStore`]: durable, one JSON file per key under a base directory
//!
//! Writes are idempotent upserts; concurrent writers for one key are expected
//! to write equivalent data, so the last write wins.

pub mod file;
pub mod memory;
pub mod public_key_cache;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use public_key_cache::{CachedPublicKey, KeyMaterial, PublicKeyCache};

use anyhow::Result;
use async_trait::async_trait;

/// Async string key-value capability
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a value, `None` when the key is absent
    async fn get_item(&self, key: &str) -> Result<Option<String>>;

    /// Insert or replace a value
    async fn set_item(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a value; removing an absent key is not an error
    async fn remove_item(&self, key: &str) -> Result<()>;
}
