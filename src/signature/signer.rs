// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use crate::instance::UserDecryptEip712;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::Address;
use std::str::FromStr;

/// Wallet that authorizes decryptions
#[async_trait]
pub trait DecryptionSigner: Send + Sync {
    async fn address(&self) -> Result<Address>;

    /// `0x`-prefixed 65-byte signature over the EIP-712 digest
    async fn sign_typed_data(&self, eip712: &UserDecryptEip712) -> Result<String>;
}

/// [`DecryptionSigner`] backed by an in-process ethers wallet
#[derive(Clone)]
pub struct WalletSigner {
    wallet: LocalWallet,
}

impl WalletSigner {
    pub fn new(wallet: LocalWallet) -> Self {
        Self { wallet }
    }

    pub fn from_private_key(private_key: &str) -> Result<Self> {
        let wallet = LocalWallet::from_str(private_key.trim_start_matches("0x"))
            .map_err(|e| anyhow!("Invalid private key: {}", e))?;
        Ok(Self::new(wallet))
    }

    pub fn wallet(&self) -> &LocalWallet {
        &self.wallet
    }
}

#[async_trait]
impl DecryptionSigner for WalletSigner {
    async fn address(&self) -> Result<Address> {
        Ok(self.wallet.address())
    }

    async fn sign_typed_data(&self, eip712: &UserDecryptEip712) -> Result<String> {
        let typed = eip712.to_typed_data()?;
        let signature = self
            .wallet
            .sign_typed_data(&typed)
            .await
            .map_err(|e| anyhow!("Wallet refused to sign: {}", e))?;
        Ok(format!("0x{}", signature))
    }
}
