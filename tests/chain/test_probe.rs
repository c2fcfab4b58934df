//! Local FHEVM Hardhat node detection tests

use crate::common::{
    relayer_metadata, resolver, FakeConnector, ScriptedProvider, HARDHAT_URL,
};
use fhevm_sdk::errors::ErrorKind;
use serde_json::json;
use std::sync::Arc;

#[tokio::test]
async fn test_detects_hardhat_node() {
    let provider = Arc::new(ScriptedProvider::hardhat(31337));
    let resolver = resolver(FakeConnector::new().with(HARDHAT_URL, provider.clone()));

    let metadata = resolver.probe_local_node(HARDHAT_URL).await.unwrap();

    assert_eq!(metadata, Some(relayer_metadata()));
    assert_eq!(
        provider.calls(),
        vec!["web3_clientVersion".to_string(), "fhevm_relayer_metadata".to_string()]
    );
}

#[tokio::test]
async fn test_other_node_is_not_asked_for_metadata() {
    // Metadata is only requested from nodes identifying as Hardhat
    let provider = Arc::new(
        ScriptedProvider::plain(31337)
            .respond("fhevm_relayer_metadata", crate::common::relayer_metadata_json()),
    );
    let resolver = resolver(FakeConnector::new().with(HARDHAT_URL, provider.clone()));

    let metadata = resolver.probe_local_node(HARDHAT_URL).await.unwrap();

    assert_eq!(metadata, None);
    assert_eq!(provider.call_count("fhevm_relayer_metadata"), 0);
}

#[tokio::test]
async fn test_hardhat_without_fhevm_plugin() {
    let provider = Arc::new(
        ScriptedProvider::new().respond("web3_clientVersion", json!("HardhatNetwork/2.22.8")),
    );
    let resolver = resolver(FakeConnector::new().with(HARDHAT_URL, provider));

    assert_eq!(resolver.probe_local_node(HARDHAT_URL).await.unwrap(), None);
}

#[tokio::test]
async fn test_incomplete_metadata_is_not_detected() {
    let provider = Arc::new(
        ScriptedProvider::hardhat(31337).respond(
            "fhevm_relayer_metadata",
            json!({
                "ACLAddress": "0x50157CFfD6bBFA2DECe204a89ec419c23ef5755D",
                "InputVerifierAddress": "0x901F8942346f7AB3a01F6D7613119Bca447Bb030",
                "KMSVerifierAddress": "not-an-address",
            }),
        ),
    );
    let resolver = resolver(FakeConnector::new().with(HARDHAT_URL, provider));

    assert_eq!(resolver.probe_local_node(HARDHAT_URL).await.unwrap(), None);
}

#[tokio::test]
async fn test_non_web3_endpoint_is_network_error() {
    // No web3_clientVersion at all
    let provider = Arc::new(ScriptedProvider::new());
    let resolver = resolver(FakeConnector::new().with(HARDHAT_URL, provider));

    let err = resolver.probe_local_node(HARDHAT_URL).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Network);
}

#[tokio::test]
async fn test_unreachable_endpoint_is_network_error() {
    let resolver = resolver(FakeConnector::new());
    let err = resolver.probe_local_node(HARDHAT_URL).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Network);
}
