//! Durable storage tests
//!
//! Public key material and decryption signatures written through a
//! FileStore must be readable by a fresh store over the same directory.

use crate::common::{contract, relayer_metadata, CountingSigner};
use fhevm_sdk::instance::mock::MockLedger;
use fhevm_sdk::instance::{FhevmInstance, MockFhevmInstance};
use fhevm_sdk::signature::SignatureManager;
use fhevm_sdk::storage::{FileStore, KeyMaterial, KeyValueStore, PublicKeyCache};
use std::sync::Arc;
use tempfile::TempDir;

fn instance() -> MockFhevmInstance {
    MockFhevmInstance::new(31337, relayer_metadata(), MockLedger::new())
}

#[tokio::test]
async fn test_public_key_survives_restart() {
    let dir = TempDir::new().unwrap();
    let acl = relayer_metadata().acl_address;
    let key = KeyMaterial {
        id: "pk-1".to_string(),
        data: vec![1, 2, 3, 4],
    };

    {
        let cache = PublicKeyCache::new(Arc::new(FileStore::new(dir.path())));
        cache.set(&acl, Some(key.clone()), None).await.unwrap();
    }

    // New store over the same directory
    let cache = PublicKeyCache::new(Arc::new(FileStore::new(dir.path())));
    let cached = cache.get(&acl).await;
    assert_eq!(cached.public_key, Some(key));
    assert_eq!(cached.public_params, None);
}

#[tokio::test]
async fn test_signature_survives_restart() {
    let dir = TempDir::new().unwrap();
    let instance = instance();
    let signer = CountingSigner::new();
    let contracts = vec![contract(0xc1), contract(0xc2)];

    let first = {
        let manager = SignatureManager::new(Arc::new(FileStore::new(dir.path())));
        manager
            .load_or_sign(&instance, &contracts, &signer)
            .await
            .expect("signature")
    };

    let manager = SignatureManager::new(Arc::new(FileStore::new(dir.path())));
    let second = manager
        .load_or_sign(&instance, &contracts, &signer)
        .await
        .expect("signature");

    assert_eq!(signer.sign_calls(), 1, "Reloaded signature should not prompt again");
    assert_eq!(first.signature, second.signature);
    assert_eq!(first.public_key, second.public_key);
    assert_eq!(instance.chain_id(), 31337);
}

#[tokio::test]
async fn test_unreadable_entry_is_resigned_and_replaced() {
    let dir = TempDir::new().unwrap();
    let store: Arc<dyn KeyValueStore> = Arc::new(FileStore::new(dir.path()));
    let instance = instance();
    let signer = CountingSigner::new();
    let contracts = vec![contract(0xc1)];
    let key = fhevm_sdk::signature::signature_cache_key(
        instance.chain_id(),
        &signer.user().await,
        &contracts,
    );

    store.set_item(&key, "{ not json").await.unwrap();

    let manager = SignatureManager::new(store.clone());
    let signed = manager.load_or_sign(&instance, &contracts, &signer).await;
    assert!(signed.is_some());
    assert_eq!(signer.sign_calls(), 1);

    let stored = store.get_item(&key).await.unwrap().expect("entry rewritten");
    assert!(stored.contains("\"userAddress\""));
}
