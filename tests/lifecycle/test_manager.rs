//! FHEVM manager tests
//!
//! State machine transitions, retry bookkeeping, staleness when the
//! endpoint changes mid-flight and subscriber isolation.

use crate::common::{
    factory, FakeConnector, FakeSdk, ScriptedProvider, HARDHAT_URL, SEPOLIA_URL,
};
use anyhow::Result;
use async_trait::async_trait;
use fhevm_sdk::chain::Endpoint;
use fhevm_sdk::errors::ErrorKind;
use fhevm_sdk::instance::CreateStatus;
use fhevm_sdk::lifecycle::{FhevmManager, LifecycleStatus, ManagerOptions, RetryConfig};
use fhevm_sdk::storage::{KeyValueStore, MemoryStore};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn connector() -> FakeConnector {
    FakeConnector::new()
        .with(HARDHAT_URL, Arc::new(ScriptedProvider::hardhat(31337)))
        .with(SEPOLIA_URL, Arc::new(ScriptedProvider::plain(11155111)))
}

fn manager(sdk: Arc<FakeSdk>, options: ManagerOptions) -> FhevmManager {
    FhevmManager::new(
        factory(sdk, connector(), Arc::new(MemoryStore::new())),
        options,
    )
}

fn fast_retry(max_retries: u32) -> RetryConfig {
    RetryConfig::new(max_retries, Duration::from_millis(10))
}

/// Memory store whose writes take a while to land
struct SlowStore {
    inner: MemoryStore,
    write_started: AtomicBool,
}

#[async_trait]
impl KeyValueStore for SlowStore {
    async fn get_item(&self, key: &str) -> Result<Option<String>> {
        self.inner.get_item(key).await
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<()> {
        self.write_started.store(true, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(200)).await;
        self.inner.set_item(key, value).await
    }

    async fn remove_item(&self, key: &str) -> Result<()> {
        self.inner.remove_item(key).await
    }
}

#[tokio::test]
async fn test_becomes_ready_on_local_chain() {
    let successes = Arc::new(AtomicU32::new(0));
    let counter = successes.clone();
    let options = ManagerOptions::new(HARDHAT_URL).on_success(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let manager = manager(Arc::new(FakeSdk::new()), options);
    assert_eq!(manager.status(), LifecycleStatus::Loading);

    assert_eq!(manager.wait_until_settled().await, LifecycleStatus::Ready);
    assert_eq!(manager.instance().unwrap().chain_id(), 31337);
    assert_eq!(manager.last_attempts(), 1);
    assert_eq!(manager.retry_count(), 0);
    assert!(manager.error().is_none());
    assert_eq!(successes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_disabled_manager_stays_idle() {
    let sdk = Arc::new(FakeSdk::new());
    let manager = manager(
        sdk.clone(),
        ManagerOptions::new(SEPOLIA_URL).with_enabled(false),
    );

    assert_eq!(manager.wait_until_settled().await, LifecycleStatus::Idle);
    assert!(manager.instance().is_none());
    assert_eq!(sdk.creates(), 0);

    manager.set_enabled(true);
    assert_eq!(manager.wait_until_settled().await, LifecycleStatus::Ready);
    assert_eq!(sdk.creates(), 1);
}

#[tokio::test]
async fn test_no_endpoint_stays_idle() {
    let manager = manager(Arc::new(FakeSdk::new()), ManagerOptions::default());
    assert_eq!(manager.status(), LifecycleStatus::Idle);

    manager.set_endpoint(Some(Endpoint::from(HARDHAT_URL)), Some(31337));
    assert_eq!(manager.wait_until_settled().await, LifecycleStatus::Ready);
    assert_eq!(manager.chain_id(), Some(31337));
}

#[tokio::test]
async fn test_retries_until_success() {
    let sdk = Arc::new(FakeSdk::new().failing_first(2));
    let manager = manager(
        sdk.clone(),
        ManagerOptions::new(SEPOLIA_URL).with_retry(fast_retry(3)),
    );

    assert_eq!(manager.wait_until_settled().await, LifecycleStatus::Ready);
    assert_eq!(sdk.creates(), 3);
    assert_eq!(manager.last_attempts(), 3);
    assert_eq!(manager.retry_count(), 0, "Retry count resets once settled");
}

#[tokio::test]
async fn test_gives_up_after_max_retries() {
    let failures = Arc::new(AtomicU32::new(0));
    let counter = failures.clone();
    let sdk = Arc::new(FakeSdk::new().failing_first(10));
    let options = ManagerOptions::new(SEPOLIA_URL)
        .with_retry(fast_retry(2))
        .on_error(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
    let manager = manager(sdk.clone(), options);

    assert_eq!(manager.wait_until_settled().await, LifecycleStatus::Error);
    assert_eq!(sdk.creates(), 3);
    assert_eq!(manager.last_attempts(), 3);
    assert_eq!(manager.error().unwrap().kind(), ErrorKind::Network);
    assert!(manager.error_message().unwrap().contains("Could not reach"));
    assert!(manager.instance().is_none());
    assert_eq!(failures.load(Ordering::SeqCst), 1, "on_error fires once per run");
}

#[tokio::test]
async fn test_no_retry_config_fails_immediately() {
    let sdk = Arc::new(FakeSdk::new().failing_first(1));
    let manager = manager(sdk.clone(), ManagerOptions::new(SEPOLIA_URL));

    assert_eq!(manager.wait_until_settled().await, LifecycleStatus::Error);
    assert_eq!(sdk.creates(), 1);
    assert_eq!(manager.last_attempts(), 1);
}

#[tokio::test]
async fn test_kind_outside_allow_list_is_not_retried() {
    let sdk = Arc::new(FakeSdk::new().failing_first(1));
    let retry = fast_retry(3).with_retryable(vec![ErrorKind::SdkLoadFailed]);
    let manager = manager(sdk.clone(), ManagerOptions::new(SEPOLIA_URL).with_retry(retry));

    assert_eq!(manager.wait_until_settled().await, LifecycleStatus::Error);
    assert_eq!(sdk.creates(), 1);
}

#[tokio::test]
async fn test_endpoint_change_discards_superseded_attempt() {
    let sdk = Arc::new(FakeSdk::new().with_create_delay(Duration::from_millis(200)));
    let manager = manager(sdk.clone(), ManagerOptions::new(SEPOLIA_URL));

    let history = Arc::new(Mutex::new(Vec::new()));
    let sink = history.clone();
    manager.subscribe_status(move |status| sink.lock().unwrap().push(*status));

    // Let the Sepolia attempt reach the slow relayer call
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(sdk.creates(), 1);

    manager.set_endpoint(Some(Endpoint::from(HARDHAT_URL)), None);
    assert_eq!(manager.wait_until_settled().await, LifecycleStatus::Ready);

    // Give the superseded attempt time to finish had it not been cancelled
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(manager.status(), LifecycleStatus::Ready);
    assert_eq!(manager.instance().unwrap().chain_id(), 31337);
    let history = history.lock().unwrap().clone();
    assert_eq!(
        history,
        vec![LifecycleStatus::Idle, LifecycleStatus::Loading, LifecycleStatus::Ready]
    );
}

#[tokio::test]
async fn test_same_endpoint_does_not_restart() {
    let sdk = Arc::new(FakeSdk::new());
    let manager = manager(sdk.clone(), ManagerOptions::new(SEPOLIA_URL).with_chain_id(11155111));
    manager.wait_until_settled().await;

    manager.set_endpoint(Some(Endpoint::from(SEPOLIA_URL)), Some(11155111));
    assert_eq!(manager.status(), LifecycleStatus::Ready);
    assert_eq!(sdk.creates(), 1);
}

#[tokio::test]
async fn test_refresh_replaces_instance() {
    let manager = manager(Arc::new(FakeSdk::new()), ManagerOptions::new(HARDHAT_URL));
    manager.wait_until_settled().await;
    let first = manager.instance().unwrap();

    manager.refresh();
    assert_eq!(manager.status(), LifecycleStatus::Loading);
    assert!(manager.instance().is_none());

    assert_eq!(manager.wait_until_settled().await, LifecycleStatus::Ready);
    let second = manager.instance().unwrap();
    assert!(!Arc::ptr_eq(&first, &second));
}

#[tokio::test]
async fn test_shutdown_returns_to_idle() {
    let manager = manager(Arc::new(FakeSdk::new()), ManagerOptions::new(HARDHAT_URL));
    manager.wait_until_settled().await;

    let cleared = Arc::new(AtomicU32::new(0));
    let counter = cleared.clone();
    manager.subscribe_instance(move |instance| {
        if instance.is_none() {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    });

    manager.shutdown();
    assert_eq!(manager.status(), LifecycleStatus::Idle);
    assert!(manager.instance().is_none());
    assert_eq!(cleared.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_progress_reports_sdk_stages() {
    let manager = manager(Arc::new(FakeSdk::new()), ManagerOptions::new(SEPOLIA_URL));

    let stages = Arc::new(Mutex::new(Vec::new()));
    let sink = stages.clone();
    manager.subscribe_progress(move |status| sink.lock().unwrap().push(*status));

    manager.wait_until_settled().await;
    assert_eq!(
        *stages.lock().unwrap(),
        vec![
            CreateStatus::SdkInitializing,
            CreateStatus::SdkInitialized,
            CreateStatus::Creating,
        ]
    );
}

#[tokio::test]
async fn test_panicking_subscriber_is_isolated() {
    let manager = manager(Arc::new(FakeSdk::new()), ManagerOptions::new(HARDHAT_URL));

    let delivered = Arc::new(AtomicU32::new(0));
    let counter = delivered.clone();
    manager.subscribe_status(|_| panic!("subscriber bug"));
    let id = manager.subscribe_status(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    assert_eq!(manager.wait_until_settled().await, LifecycleStatus::Ready);
    assert_eq!(delivered.load(Ordering::SeqCst), 1);

    assert!(manager.unsubscribe(id));
    assert!(!manager.unsubscribe(id));
}

#[tokio::test]
async fn test_disable_during_retry_backoff_cancels_retry() {
    let sdk = Arc::new(FakeSdk::new().failing_first(100));
    let retry = RetryConfig::new(5, Duration::from_millis(200));
    let manager = manager(sdk.clone(), ManagerOptions::new(SEPOLIA_URL).with_retry(retry));

    // First attempt fails at once, then the retry sleeps
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(sdk.creates(), 1);
    assert_eq!(manager.retry_count(), 1);

    manager.set_enabled(false);
    tokio::time::sleep(Duration::from_millis(400)).await;

    assert_eq!(sdk.creates(), 1, "Cancelled retry must not create again");
    assert_eq!(manager.status(), LifecycleStatus::Idle);
    assert_eq!(manager.retry_count(), 0);
    assert!(manager.error().is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_no_stale_notifications_after_disable() {
    let successes = Arc::new(AtomicU32::new(0));
    let counter = successes.clone();
    let options = ManagerOptions::new(HARDHAT_URL)
        .with_enabled(false)
        .on_success(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
    let manager = manager(Arc::new(FakeSdk::new()), options);

    // Slow status subscriber keeps the attempt's delivery busy on Ready
    manager.subscribe_status(|status| {
        if *status == LifecycleStatus::Ready {
            std::thread::sleep(Duration::from_millis(300));
        }
    });
    let instances = Arc::new(Mutex::new(Vec::new()));
    let sink = instances.clone();
    manager.subscribe_instance(move |instance| sink.lock().unwrap().push(instance.is_some()));

    let mut rx = manager.status_receiver();
    manager.set_enabled(true);
    rx.wait_for(|status| *status == LifecycleStatus::Ready)
        .await
        .unwrap();
    manager.set_enabled(false);
    tokio::time::sleep(Duration::from_millis(600)).await;

    assert_eq!(manager.status(), LifecycleStatus::Idle);
    assert!(manager.instance().is_none());
    assert_eq!(instances.lock().unwrap().last().copied(), Some(false));
    assert_eq!(successes.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_public_key_write_survives_cancellation() {
    let store = Arc::new(SlowStore {
        inner: MemoryStore::new(),
        write_started: AtomicBool::new(false),
    });
    let manager = FhevmManager::new(
        factory(Arc::new(FakeSdk::new()), connector(), store.clone()),
        ManagerOptions::new(SEPOLIA_URL),
    );

    for _ in 0..200 {
        if store.write_started.load(Ordering::SeqCst) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(store.write_started.load(Ordering::SeqCst));

    manager.set_enabled(false);
    tokio::time::sleep(Duration::from_millis(400)).await;

    assert!(!store.inner.is_empty().await, "Public key material was cached");
    assert_eq!(manager.status(), LifecycleStatus::Idle);
    assert!(manager.instance().is_none());
}
