//! Batch decryption tests

use crate::common::{contract, relayer_metadata, CountingSigner};
use ethers::types::{Address, U256};
use fhevm_sdk::instance::mock::MockLedger;
use fhevm_sdk::instance::{DecryptedValue, FheType, HandleContractPair, MockFhevmInstance};
use fhevm_sdk::operations::{
    decrypt_batch, get_unique_contract_addresses, DecryptBatchParams, NO_REQUESTS_ERROR,
};
use fhevm_sdk::signature::{DecryptionSignature, SignatureManager};
use fhevm_sdk::storage::MemoryStore;
use std::sync::{Arc, Mutex};

fn handle(byte: u8) -> [u8; 32] {
    [byte; 32]
}

fn pair(byte: u8, owner: Address) -> HandleContractPair {
    HandleContractPair::new(format!("0x{}", hex::encode(handle(byte))), format!("{:?}", owner))
}

async fn signed(instance: &MockFhevmInstance, contracts: &[Address]) -> DecryptionSignature {
    SignatureManager::new(Arc::new(MemoryStore::new()))
        .load_or_sign(instance, contracts, &CountingSigner::new())
        .await
        .expect("signature")
}

#[tokio::test]
async fn test_empty_batch_fails_without_relayer_call() {
    let instance = MockFhevmInstance::new(31337, relayer_metadata(), MockLedger::new());
    let signature = signed(&instance, &[contract(0xc0)]).await;

    let result = decrypt_batch(DecryptBatchParams::new(&instance, &[], &signature)).await;

    assert!(!result.success);
    assert!(result.results.is_empty());
    assert_eq!(result.error.as_deref(), Some(NO_REQUESTS_ERROR));
}

#[tokio::test]
async fn test_batch_decrypts_every_type() {
    let ledger = MockLedger::new();
    let owner = contract(0xc0);
    ledger.insert(&handle(1), FheType::Ebool, U256::one(), owner).await;
    ledger.insert(&handle(2), FheType::Euint64, U256::from(99u64), owner).await;
    ledger
        .insert(&handle(3), FheType::Eaddress, U256::from_big_endian(contract(0xee).as_bytes()), owner)
        .await;
    let instance = MockFhevmInstance::new(31337, relayer_metadata(), ledger);
    let signature = signed(&instance, &[owner]).await;

    let requests = vec![pair(1, owner), pair(2, owner), pair(3, owner)];
    let messages = Mutex::new(Vec::new());
    let on_progress = |message: &str| messages.lock().unwrap().push(message.to_string());

    let result = decrypt_batch(
        DecryptBatchParams::new(&instance, &requests, &signature).with_progress(&on_progress),
    )
    .await;

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.results[&requests[0].handle], DecryptedValue::Bool(true));
    assert_eq!(result.results[&requests[1].handle], DecryptedValue::Uint(U256::from(99u64)));
    assert_eq!(result.results[&requests[2].handle], DecryptedValue::Address(contract(0xee)));
    assert_eq!(
        *messages.lock().unwrap(),
        vec!["Decrypting 3 handle(s)".to_string(), "Decryption completed".to_string()]
    );
}

#[tokio::test]
async fn test_contract_outside_signature_fails_batch() {
    let ledger = MockLedger::new();
    ledger.insert(&handle(1), FheType::Euint8, U256::from(5u8), contract(0xc1)).await;
    let instance = MockFhevmInstance::new(31337, relayer_metadata(), ledger);
    let signature = signed(&instance, &[contract(0xc0)]).await;

    let requests = vec![pair(1, contract(0xc1))];
    let result = decrypt_batch(DecryptBatchParams::new(&instance, &requests, &signature)).await;

    assert!(!result.success);
    assert!(result.results.is_empty());
    assert!(result.error.unwrap().contains("not covered"));
}

#[test]
fn test_unique_contract_addresses_sorted() {
    let a = format!("{:?}", contract(0xaa));
    let b = format!("{:?}", contract(0xbb));
    let requests = vec![
        HandleContractPair::new("0x01", b.clone()),
        HandleContractPair::new("0x02", a.clone()),
        HandleContractPair::new("0x03", b.clone()),
    ];

    assert_eq!(get_unique_contract_addresses(&requests), vec![a, b]);
    assert!(get_unique_contract_addresses(&[]).is_empty());
}
