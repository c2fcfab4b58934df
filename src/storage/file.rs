// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use super::KeyValueStore;
use anyhow::Result;
use async_trait::async_trait;
use ethers::utils::keccak256;
use std::path::PathBuf;
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Durable key-value store backed by one file per key
///
/// File names are the keccak-256 of the key, so any key maps to a valid,
/// fixed-length path component.
pub struct FileStore {
    base_path: PathBuf,
}

impl FileStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    fn item_path(&self, key: &str) -> PathBuf {
        self.base_path.join(format!("{}.json", hex::encode(keccak256(key.as_bytes()))))
    }

    async fn ensure_dir(&self) -> Result<()> {
        if !self.base_path.exists() {
            fs::create_dir_all(&self.base_path).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get_item(&self, key: &str) -> Result<Option<String>> {
        let path = self.item_path(key);
        match fs::read_to_string(&path).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<()> {
        self.ensure_dir().await?;

        let path = self.item_path(key);

        // Write atomically using a temp file; the suffix keeps concurrent writers apart
        let temp_path = path.with_extension(format!("{:016x}.tmp", rand::random::<u64>()));
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(value.as_bytes()).await?;
        file.sync_all().await?;

        fs::rename(temp_path, path).await?;

        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<()> {
        let path = self.item_path(key);

        if path.exists() {
            fs::remove_file(&path).await?;
        }

        Ok(())
    }
}
