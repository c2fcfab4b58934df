// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! In-process backend for local development chains
//!
//! When the resolver reports a mock chain and the node answers the relayer
//! metadata probe, instances are built here instead of through the relayer
//! SDK. Cleartexts live in a [`MockLedger`] shared by every instance the
//! backend creates, so a handle produced by one instance decrypts through
//! another.
//!
//! Handle layout (32 bytes):
//!
//! | bytes  | content                        |
//! |--------|--------------------------------|
//! | 0..21  | keccak256 prefix of the input  |
//! | 21     | index of the value in its input|
//! | 22..30 | chain id, big endian           |
//! | 30     | encrypted type id              |
//! | 31     | handle version                 |

use super::FhevmInstance;
use crate::chain::RelayerMetadata;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Builds instances for chains detected as FHEVM Hardhat nodes
#[async_trait]
pub trait MockBackend: Send + Sync {
    async fn create_instance(
        &self,
        rpc_url: &str,
        chain_id: u64,
        metadata: &RelayerMetadata,
    ) -> Result<Arc<dyn FhevmInstance>>;
}

/// Backend installed by default when the `mock` feature is enabled
pub fn default_mock_backend() -> Option<Arc<dyn MockBackend>> {
    #[cfg(feature = "mock")]
    {
        Some(Arc::new(LocalMockBackend::new()))
    }
    #[cfg(not(feature = "mock"))]
    {
        None
    }
}

#[cfg(feature = "mock")]
pub use local::{LocalMockBackend, MockFhevmInstance, MockLedger};

#[cfg(feature = "mock")]
mod local {
    use super::MockBackend;
    use crate::chain::RelayerMetadata;
    use crate::errors::FhevmResult;
    use crate::instance::eip712::{Eip712Domain, UserDecryptEip712};
    use crate::instance::types::{DecryptedValue, EncryptedInput, FheType, HandleContractPair, Keypair};
    use crate::instance::{EncryptedInputBuilder, FhevmInstance};
    use crate::storage::KeyMaterial;
    use crate::utils::{parse_address, unix_now, SECONDS_PER_DAY};
    use anyhow::{anyhow, bail, Result};
    use async_trait::async_trait;
    use ethers::types::{Address, Bytes, U256};
    use ethers::utils::keccak256;
    use k256::elliptic_curve::sec1::ToEncodedPoint;
    use k256::SecretKey;
    use rand::rngs::OsRng;
    use rand::RngCore;
    use std::collections::{HashMap, HashSet};
    use std::sync::Arc;
    use tokio::sync::RwLock;
    use tracing::{debug, info};

    /// Gateway chain the decryption domain is verified on
    pub const MOCK_GATEWAY_CHAIN_ID: u64 = 55815;
    pub const MOCK_DECRYPTION_VERIFIER: &str = "0x5ffdaAB0373E62E2ea2944776209aEf29E631A64";
    pub const MAX_INPUT_BITS: u32 = 2048;
    const HANDLE_VERSION: u8 = 0;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct StoredCleartext {
        fhe_type: FheType,
        value: U256,
        contract: Address,
    }

    /// Cleartexts behind every handle the mock backend knows about
    #[derive(Clone, Default)]
    pub struct MockLedger {
        entries: Arc<RwLock<HashMap<String, StoredCleartext>>>,
    }

    fn handle_key(handle: &[u8]) -> String {
        format!("0x{}", hex::encode(handle))
    }

    impl MockLedger {
        pub fn new() -> Self {
            Self::default()
        }

        /// Register a cleartext for `handle`, as if `contract` computed it on chain
        pub async fn insert(&self, handle: &[u8], fhe_type: FheType, value: U256, contract: Address) {
            self.entries.write().await.insert(
                handle_key(handle),
                StoredCleartext {
                    fhe_type,
                    value,
                    contract,
                },
            );
        }

        pub async fn len(&self) -> usize {
            self.entries.read().await.len()
        }

        pub async fn is_empty(&self) -> bool {
            self.entries.read().await.is_empty()
        }

        async fn lookup(&self, handle: &str) -> Option<StoredCleartext> {
            self.entries
                .read()
                .await
                .get(&handle.to_lowercase())
                .cloned()
        }
    }

    pub struct LocalMockBackend {
        ledger: MockLedger,
    }

    impl LocalMockBackend {
        pub fn new() -> Self {
            Self::with_ledger(MockLedger::new())
        }

        pub fn with_ledger(ledger: MockLedger) -> Self {
            Self { ledger }
        }

        pub fn ledger(&self) -> &MockLedger {
            &self.ledger
        }
    }

    impl Default for LocalMockBackend {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl MockBackend for LocalMockBackend {
        async fn create_instance(
            &self,
            rpc_url: &str,
            chain_id: u64,
            metadata: &RelayerMetadata,
        ) -> Result<Arc<dyn FhevmInstance>> {
            info!(rpc_url, chain_id, acl = ?metadata.acl_address, "Creating mock FHEVM instance");
            Ok(Arc::new(MockFhevmInstance::new(
                chain_id,
                metadata.clone(),
                self.ledger.clone(),
            )))
        }
    }

    pub struct MockFhevmInstance {
        chain_id: u64,
        metadata: RelayerMetadata,
        ledger: MockLedger,
    }

    impl MockFhevmInstance {
        pub fn new(chain_id: u64, metadata: RelayerMetadata, ledger: MockLedger) -> Self {
            Self {
                chain_id,
                metadata,
                ledger,
            }
        }

        pub fn metadata(&self) -> &RelayerMetadata {
            &self.metadata
        }

        pub fn ledger(&self) -> &MockLedger {
            &self.ledger
        }
    }

    fn decode_hex(value: &str) -> Result<Vec<u8>> {
        let stripped = value.strip_prefix("0x").unwrap_or(value);
        hex::decode(stripped).map_err(|e| anyhow!("invalid hex '{}': {}", value, e))
    }

    fn compressed_public_key(secret: &SecretKey) -> String {
        let point = secret.public_key().to_encoded_point(true);
        format!("0x{}", hex::encode(point.as_bytes()))
    }

    fn to_decrypted(fhe_type: FheType, value: U256) -> DecryptedValue {
        match fhe_type {
            FheType::Ebool => DecryptedValue::Bool(!value.is_zero()),
            FheType::Eaddress => {
                let mut buf = [0u8; 32];
                value.to_big_endian(&mut buf);
                DecryptedValue::Address(Address::from_slice(&buf[12..]))
            }
            _ => DecryptedValue::Uint(value),
        }
    }

    #[async_trait]
    impl FhevmInstance for MockFhevmInstance {
        fn chain_id(&self) -> u64 {
            self.chain_id
        }

        fn public_key(&self) -> Option<KeyMaterial> {
            Some(KeyMaterial {
                id: "mock-public-key".to_string(),
                data: keccak256(self.metadata.acl_address.as_bytes()).to_vec(),
            })
        }

        fn public_params(&self, bits: u32) -> Option<KeyMaterial> {
            Some(KeyMaterial {
                id: format!("mock-public-params-{}", bits),
                data: bits.to_be_bytes().to_vec(),
            })
        }

        fn create_encrypted_input(
            &self,
            contract_address: Address,
            user_address: Address,
        ) -> Result<Box<dyn EncryptedInputBuilder>> {
            Ok(Box::new(MockInputBuilder {
                ledger: self.ledger.clone(),
                chain_id: self.chain_id,
                contract: contract_address,
                user: user_address,
                values: Vec::new(),
                bits: 0,
            }))
        }

        fn generate_keypair(&self) -> Result<Keypair> {
            let secret = SecretKey::random(&mut OsRng);
            Ok(Keypair {
                public_key: compressed_public_key(&secret),
                private_key: format!("0x{}", hex::encode(secret.to_bytes())),
            })
        }

        fn create_eip712(
            &self,
            public_key: &str,
            contract_addresses: &[Address],
            start_timestamp: u64,
            duration_days: u64,
        ) -> FhevmResult<UserDecryptEip712> {
            let verifier = parse_address(MOCK_DECRYPTION_VERIFIER)?;
            Ok(UserDecryptEip712::new(
                Eip712Domain::decryption(MOCK_GATEWAY_CHAIN_ID, &verifier),
                self.chain_id,
                public_key,
                contract_addresses,
                start_timestamp,
                duration_days,
            ))
        }

        async fn user_decrypt(
            &self,
            requests: &[HandleContractPair],
            private_key: &str,
            public_key: &str,
            signature: &str,
            contract_addresses: &[Address],
            user_address: Address,
            start_timestamp: u64,
            duration_days: u64,
        ) -> Result<HashMap<String, DecryptedValue>> {
            if duration_days == 0 {
                bail!("decryption authorization has a zero duration");
            }
            let expires_at = start_timestamp.saturating_add(duration_days * SECONDS_PER_DAY);
            if unix_now() >= expires_at {
                bail!("decryption authorization expired at {}", expires_at);
            }

            let eip712 = self.create_eip712(
                public_key,
                contract_addresses,
                start_timestamp,
                duration_days,
            )?;
            let signer = eip712.recover_signer(signature)?;
            if signer != user_address {
                bail!("signature was produced by {:?}, not {:?}", signer, user_address);
            }

            let secret = SecretKey::from_slice(&decode_hex(private_key)?)
                .map_err(|e| anyhow!("invalid private key: {}", e))?;
            if !compressed_public_key(&secret).eq_ignore_ascii_case(public_key) {
                bail!("private key does not match the signed public key");
            }

            let authorized: HashSet<Address> = contract_addresses.iter().copied().collect();
            let mut results = HashMap::with_capacity(requests.len());
            for request in requests {
                let contract = parse_address(&request.contract_address)?;
                if !authorized.contains(&contract) {
                    bail!("contract {} is not covered by the signature", request.contract_address);
                }
                let stored = self
                    .ledger
                    .lookup(&request.handle)
                    .await
                    .ok_or_else(|| anyhow!("unknown ciphertext handle {}", request.handle))?;
                if stored.contract != contract {
                    bail!(
                        "handle {} does not belong to contract {}",
                        request.handle,
                        request.contract_address
                    );
                }
                results.insert(request.handle.clone(), to_decrypted(stored.fhe_type, stored.value));
            }

            debug!(count = results.len(), user = ?user_address, "Mock user decryption complete");
            Ok(results)
        }
    }

    struct MockInputBuilder {
        ledger: MockLedger,
        chain_id: u64,
        contract: Address,
        user: Address,
        values: Vec<(FheType, U256)>,
        bits: u32,
    }

    impl MockInputBuilder {
        fn push(&mut self, fhe_type: FheType, value: U256) -> Result<()> {
            let bits = self.bits + fhe_type.packed_bits();
            if bits > MAX_INPUT_BITS {
                bail!(
                    "packing more than {} bits in a single encrypted input is unsupported",
                    MAX_INPUT_BITS
                );
            }
            self.bits = bits;
            self.values.push((fhe_type, value));
            Ok(())
        }

        fn input_digest(&self, nonce: &[u8; 32]) -> [u8; 32] {
            let mut preimage = Vec::with_capacity(80 + self.values.len() * 33);
            preimage.extend_from_slice(self.contract.as_bytes());
            preimage.extend_from_slice(self.user.as_bytes());
            preimage.extend_from_slice(&self.chain_id.to_be_bytes());
            preimage.extend_from_slice(nonce);
            for (fhe_type, value) in &self.values {
                let mut buf = [0u8; 32];
                value.to_big_endian(&mut buf);
                preimage.push(fhe_type.handle_type_id());
                preimage.extend_from_slice(&buf);
            }
            keccak256(preimage)
        }

        fn handle(&self, digest: &[u8; 32], index: u8, fhe_type: FheType) -> [u8; 32] {
            let mut handle = [0u8; 32];
            handle[..21].copy_from_slice(&digest[..21]);
            handle[21] = index;
            handle[22..30].copy_from_slice(&self.chain_id.to_be_bytes());
            handle[30] = fhe_type.handle_type_id();
            handle[31] = HANDLE_VERSION;
            handle
        }
    }

    #[async_trait]
    impl EncryptedInputBuilder for MockInputBuilder {
        fn add_bool(&mut self, value: bool) -> Result<()> {
            self.push(FheType::Ebool, U256::from(value as u8))
        }

        fn add_8(&mut self, value: u8) -> Result<()> {
            self.push(FheType::Euint8, U256::from(value))
        }

        fn add_16(&mut self, value: u16) -> Result<()> {
            self.push(FheType::Euint16, U256::from(value))
        }

        fn add_32(&mut self, value: u32) -> Result<()> {
            self.push(FheType::Euint32, U256::from(value))
        }

        fn add_64(&mut self, value: u64) -> Result<()> {
            self.push(FheType::Euint64, U256::from(value))
        }

        fn add_128(&mut self, value: u128) -> Result<()> {
            self.push(FheType::Euint128, U256::from(value))
        }

        fn add_256(&mut self, value: U256) -> Result<()> {
            self.push(FheType::Euint256, value)
        }

        fn add_address(&mut self, value: Address) -> Result<()> {
            self.push(FheType::Eaddress, U256::from_big_endian(value.as_bytes()))
        }

        async fn encrypt(&mut self) -> Result<EncryptedInput> {
            if self.values.is_empty() {
                bail!("encrypted input contains no values");
            }

            let mut nonce = [0u8; 32];
            OsRng.fill_bytes(&mut nonce);
            let digest = self.input_digest(&nonce);

            let mut handles = Vec::with_capacity(self.values.len());
            let mut proof = vec![self.values.len() as u8, 0u8];
            for (index, (fhe_type, value)) in self.values.iter().enumerate() {
                let handle = self.handle(&digest, index as u8, *fhe_type);
                self.ledger
                    .insert(&handle, *fhe_type, *value, self.contract)
                    .await;
                proof.extend_from_slice(&handle);
                handles.push(Bytes::from(handle.to_vec()));
            }

            debug!(
                count = handles.len(),
                bits = self.bits,
                contract = ?self.contract,
                "Mock encrypted input created"
            );
            Ok(EncryptedInput {
                handles,
                input_proof: Bytes::from(proof),
            })
        }
    }

}
