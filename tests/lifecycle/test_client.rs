//! FHEVM client tests
//!
//! Idempotent init, destroy semantics, events and the encrypt/decrypt
//! round trip against a local FHEVM node.

use crate::common::{
    contract, factory, CountingSigner, FakeConnector, FakeSdk, ScriptedProvider, HARDHAT_URL,
    SEPOLIA_URL,
};
use ethers::types::U256;
use fhevm_sdk::errors::ErrorKind;
use fhevm_sdk::instance::{DecryptedValue, HandleContractPair};
use fhevm_sdk::lifecycle::{ClientEvent, ClientEventKind, ClientStatus, FhevmClient};
use fhevm_sdk::signature::SignatureManager;
use fhevm_sdk::storage::MemoryStore;
use serde_json::json;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

struct Fixture {
    client: FhevmClient,
    sdk: Arc<FakeSdk>,
    hardhat: Arc<ScriptedProvider>,
}

fn fixture_with(sdk: FakeSdk, endpoint: &str) -> Fixture {
    let sdk = Arc::new(sdk);
    let hardhat = Arc::new(ScriptedProvider::hardhat(31337));
    let connector = FakeConnector::new()
        .with(HARDHAT_URL, hardhat.clone())
        .with(SEPOLIA_URL, Arc::new(ScriptedProvider::plain(11155111)));
    let store = Arc::new(MemoryStore::new());
    let client = FhevmClient::new(
        factory(sdk.clone(), connector, store.clone()),
        SignatureManager::new(store),
        endpoint,
    );
    Fixture {
        client,
        sdk,
        hardhat,
    }
}

fn fixture() -> Fixture {
    fixture_with(FakeSdk::new(), HARDHAT_URL)
}

fn count_events(client: &FhevmClient, kind: ClientEventKind) -> Arc<AtomicU32> {
    let count = Arc::new(AtomicU32::new(0));
    let counter = count.clone();
    client.on(kind, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    count
}

#[tokio::test]
async fn test_init_is_idempotent() {
    let f = fixture();
    let ready = count_events(&f.client, ClientEventKind::Ready);

    let first = f.client.init().await.unwrap().expect("instance");
    let second = f.client.init().await.unwrap().expect("instance");

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(f.client.status(), ClientStatus::Ready);
    assert_eq!(ready.load(Ordering::SeqCst), 1);
    assert_eq!(f.hardhat.call_count("web3_clientVersion"), 1);
}

#[tokio::test]
async fn test_status_events_in_order() {
    let f = fixture();
    let statuses = Arc::new(Mutex::new(Vec::new()));
    let sink = statuses.clone();
    f.client.on(ClientEventKind::StatusChanged, move |event| {
        if let ClientEvent::StatusChanged(status) = event {
            sink.lock().unwrap().push(*status);
        }
    });

    f.client.init().await.unwrap();
    f.client.destroy();

    assert_eq!(
        *statuses.lock().unwrap(),
        vec![
            ClientStatus::Initializing,
            ClientStatus::Ready,
            ClientStatus::Destroyed,
        ]
    );
}

#[tokio::test]
async fn test_init_after_destroy_is_noop() {
    let f = fixture();
    let destroyed = count_events(&f.client, ClientEventKind::Destroyed);

    f.client.init().await.unwrap();
    f.client.destroy();
    f.client.destroy();

    assert_eq!(f.client.init().await.unwrap().map(|_| ()), None);
    assert_eq!(f.client.status(), ClientStatus::Destroyed);
    assert!(f.client.instance().is_none());
    assert_eq!(destroyed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_destroy_during_init_drops_result() {
    let f = fixture_with(
        FakeSdk::new().with_create_delay(Duration::from_millis(200)),
        SEPOLIA_URL,
    );
    let ready = count_events(&f.client, ClientEventKind::Ready);

    let (result, _) = tokio::join!(f.client.init(), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        f.client.destroy();
    });

    assert!(result.unwrap().is_none());
    assert_eq!(f.client.status(), ClientStatus::Destroyed);
    assert_eq!(ready.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_endpoint_change_recreates_instance() {
    let f = fixture();
    let local = f.client.init().await.unwrap().unwrap();
    assert_eq!(local.chain_id(), 31337);

    f.client.set_endpoint(SEPOLIA_URL);
    let remote = f.client.init().await.unwrap().unwrap();
    assert_eq!(remote.chain_id(), 11155111);
    assert_eq!(f.sdk.creates(), 1);
}

#[tokio::test]
async fn test_failed_init_reports_error() {
    let f = fixture_with(FakeSdk::new(), "http://unreachable:8545");
    let errors = Arc::new(Mutex::new(Vec::new()));
    let sink = errors.clone();
    f.client.on(ClientEventKind::Error, move |event| {
        if let ClientEvent::Error { kind, .. } = event {
            sink.lock().unwrap().push(*kind);
        }
    });

    let err = f.client.init().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Network);
    assert_eq!(f.client.status(), ClientStatus::Error);
    assert!(f.client.error_message().is_some());
    assert_eq!(*errors.lock().unwrap(), vec![ErrorKind::Network]);
}

#[tokio::test]
async fn test_operations_require_ready_instance() {
    let f = fixture();
    let signer = CountingSigner::new();

    let err = f
        .client
        .encrypt(contract(0xc0), signer.user().await, &json!(7), "euint8")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InstanceNotReady);

    let err = f.client.decrypt(&[], &signer).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InstanceNotReady);
}

#[tokio::test]
async fn test_encrypt_then_decrypt_on_local_node() {
    let f = fixture();
    f.client.init().await.unwrap();

    let signer = CountingSigner::new();
    let user = signer.user().await;
    let token = contract(0xc0);

    let encrypted = f
        .client
        .encrypt(token, user, &json!(1234), "euint32")
        .await
        .unwrap();
    assert_eq!(encrypted.handles.len(), 1);

    let handle = format!("0x{}", hex::encode(&encrypted.handles[0]));
    let requests = vec![HandleContractPair::new(handle.clone(), format!("{:?}", token))];

    let values = f.client.decrypt(&requests, &signer).await.unwrap();
    assert_eq!(values.get(&handle), Some(&DecryptedValue::Uint(U256::from(1234u32))));

    // Cached signature is reused for the same contract set
    f.client.decrypt(&requests, &signer).await.unwrap();
    assert_eq!(signer.sign_calls(), 1);
}

#[tokio::test]
async fn test_rejected_signature_fails_decrypt() {
    let f = fixture();
    f.client.init().await.unwrap();

    let signer = CountingSigner::new().failing();
    let user = signer.user().await;
    let encrypted = f
        .client
        .encrypt(contract(0xc0), user, &json!(true), "ebool")
        .await
        .unwrap();
    let requests = vec![HandleContractPair::new(
        format!("0x{}", hex::encode(&encrypted.handles[0])),
        format!("{:?}", contract(0xc0)),
    )];

    let err = f.client.decrypt(&requests, &signer).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SignatureFailed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_destroy_while_init_events_pending() {
    let client = Arc::new(fixture().client);

    // Slow handler holds up delivery of the init result
    client.on(ClientEventKind::StatusChanged, |event| {
        if matches!(event, ClientEvent::StatusChanged(ClientStatus::Ready)) {
            std::thread::sleep(Duration::from_millis(300));
        }
    });
    let statuses = Arc::new(Mutex::new(Vec::new()));
    let sink = statuses.clone();
    client.on(ClientEventKind::StatusChanged, move |event| {
        if let ClientEvent::StatusChanged(status) = event {
            sink.lock().unwrap().push(*status);
        }
    });
    let ready = count_events(&client, ClientEventKind::Ready);
    let destroyed = count_events(&client, ClientEventKind::Destroyed);

    let init = tokio::spawn({
        let client = client.clone();
        async move { client.init().await }
    });
    for _ in 0..400 {
        if client.status() == ClientStatus::Ready {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    client.destroy();
    init.await.unwrap().unwrap();

    assert_eq!(ready.load(Ordering::SeqCst), 0);
    assert_eq!(destroyed.load(Ordering::SeqCst), 1);
    assert_eq!(
        statuses.lock().unwrap().last().copied(),
        Some(ClientStatus::Destroyed)
    );
}
