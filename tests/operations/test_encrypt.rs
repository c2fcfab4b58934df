//! Encryption tests
//!
//! Value validation at type boundaries and packing several values into one
//! encrypted input.

use crate::common::{contract, relayer_metadata};
use fhevm_sdk::errors::ErrorKind;
use fhevm_sdk::instance::mock::MockLedger;
use fhevm_sdk::instance::{FheType, MockFhevmInstance};
use fhevm_sdk::operations::{encrypt_value, encrypt_values, is_valid_encryption_value};
use serde_json::{json, Value};

fn instance() -> MockFhevmInstance {
    MockFhevmInstance::new(31337, relayer_metadata(), MockLedger::new())
}

#[test]
fn test_type_boundaries() {
    // (value, type, expected)
    let cases: Vec<(Value, &str, bool)> = vec![
        (json!(true), "ebool", true),
        (json!(1), "ebool", true),
        (json!(2), "ebool", false),
        (json!("true"), "ebool", false),
        (json!(255), "euint8", true),
        (json!(256), "euint8", false),
        (json!(-1), "euint8", false),
        (json!(65535), "euint16", true),
        (json!(65536), "euint16", false),
        (json!(u64::MAX), "euint64", true),
        (json!("18446744073709551616"), "euint64", false),
        (json!("340282366920938463463374607431768211455"), "euint128", true),
        (json!("340282366920938463463374607431768211456"), "euint128", false),
        (json!(format!("0x{}", "f".repeat(64))), "euint256", true),
        (json!("0x8ba1f109551bD432803012645Ac136ddd64DBA72"), "eaddress", true),
        (json!("0x8ba1f109551bD432803012645Ac136ddd64DBA7"), "eaddress", false),
        (json!(42), "euint512", false),
    ];

    for (value, fhe_type, expected) in cases {
        assert_eq!(
            is_valid_encryption_value(&value, fhe_type),
            expected,
            "{} as {}",
            value,
            fhe_type
        );
    }
}

#[tokio::test]
async fn test_mixed_values_share_one_proof() {
    let instance = instance();
    let values = vec![
        (json!(true), "ebool"),
        (json!(42), "euint8"),
        (json!("0x8ba1f109551bD432803012645Ac136ddd64DBA72"), "eaddress"),
    ];

    let encrypted = encrypt_values(&instance, contract(0xc0), contract(0x0a), &values)
        .await
        .unwrap();

    assert_eq!(encrypted.handles.len(), 3);
    assert_eq!(encrypted.input_proof.len(), 2 + 3 * 32);
    assert_eq!(encrypted.input_proof[0], 3);
    let type_ids: Vec<u8> = encrypted.handles.iter().map(|h| h[30]).collect();
    assert_eq!(
        type_ids,
        vec![
            FheType::Ebool.handle_type_id(),
            FheType::Euint8.handle_type_id(),
            FheType::Eaddress.handle_type_id(),
        ]
    );
    assert_eq!(instance.ledger().len().await, 3);
}

#[tokio::test]
async fn test_out_of_range_value_is_rejected_before_encryption() {
    let instance = instance();
    let err = encrypt_value(&instance, contract(0xc0), contract(0x0a), &json!(300), "euint8")
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(instance.ledger().is_empty().await);
}

#[tokio::test]
async fn test_unknown_type_is_validation_error() {
    let err = encrypt_value(&instance(), contract(0xc0), contract(0x0a), &json!(1), "euint4")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn test_empty_value_list() {
    let err = encrypt_values(&instance(), contract(0xc0), contract(0x0a), &[])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MissingParameter);
}

#[tokio::test]
async fn test_bit_budget_exceeded() {
    let max = format!("0x{}", "f".repeat(64));
    let values: Vec<(Value, &str)> = (0..9).map(|_| (json!(max), "euint256")).collect();

    let err = encrypt_values(&instance(), contract(0xc0), contract(0x0a), &values)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::EncryptionFailed);
}
