// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod chain;
pub mod cli;
pub mod config;
pub mod errors;
pub mod instance;
pub mod lifecycle;
pub mod operations;
pub mod signature;
pub mod storage;
pub mod utils;

// Re-export main types
pub use chain::{ChainResolver, Eip1193Provider, Endpoint, RelayerMetadata, ResolvedChain};
pub use config::{NetworkConfig, SdkConfig};
pub use errors::{ErrorKind, FhevmError, FhevmResult};
pub use instance::{
    CreateParams, CreateStatus, DecryptedValue, EncryptedInput, FheType, FhevmInstance,
    HandleContractPair, InstanceFactory, RelayerSdk, RuntimeEnvironment,
};
pub use lifecycle::{
    ClientStatus, FhevmClient, FhevmManager, LifecycleStatus, ManagerOptions, RetryConfig,
};
pub use operations::{
    decrypt_batch, encrypt_value, get_unique_contract_addresses, is_valid_encryption_value,
    DecryptBatchParams, DecryptBatchResult, Decryptor,
};
pub use signature::{DecryptionSignature, DecryptionSigner, SignatureManager, WalletSigner};
pub use storage::{FileStore, KeyValueStore, MemoryStore};
