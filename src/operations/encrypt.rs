// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use super::validation::{parse_clear_value, ClearValue};
use crate::errors::{FhevmError, FhevmResult};
use crate::instance::{EncryptedInput, EncryptedInputBuilder, FheType, FhevmInstance};
use ethers::types::{Address, U256};
use serde_json::Value;
use tracing::debug;

fn low_u128(value: U256) -> u128 {
    ((value.0[1] as u128) << 64) | value.0[0] as u128
}

fn add_value(
    builder: &mut dyn EncryptedInputBuilder,
    fhe_type: FheType,
    value: ClearValue,
) -> anyhow::Result<()> {
    match (fhe_type, value) {
        (FheType::Ebool, ClearValue::Bool(b)) => builder.add_bool(b),
        (FheType::Euint8, ClearValue::Uint(v)) => builder.add_8(v.low_u32() as u8),
        (FheType::Euint16, ClearValue::Uint(v)) => builder.add_16(v.low_u32() as u16),
        (FheType::Euint32, ClearValue::Uint(v)) => builder.add_32(v.low_u32()),
        (FheType::Euint64, ClearValue::Uint(v)) => builder.add_64(v.low_u64()),
        (FheType::Euint128, ClearValue::Uint(v)) => builder.add_128(low_u128(v)),
        (FheType::Euint256, ClearValue::Uint(v)) => builder.add_256(v),
        (FheType::Eaddress, ClearValue::Address(a)) => builder.add_address(a),
        (t, v) => Err(anyhow::anyhow!("{:?} cannot be encrypted as {}", v, t)),
    }
}

fn checked_value(value: &Value, fhe_type: &str) -> FhevmResult<(FheType, ClearValue)> {
    let fhe_type: FheType = fhe_type.parse()?;
    let clear = parse_clear_value(value, fhe_type).ok_or_else(|| {
        FhevmError::Validation(format!("value {} is not a valid {}", value, fhe_type))
    })?;
    Ok((fhe_type, clear))
}

/// Encrypt one value for `contract_address`, to be submitted by `user_address`
pub async fn encrypt_value(
    instance: &dyn FhevmInstance,
    contract_address: Address,
    user_address: Address,
    value: &Value,
    fhe_type: &str,
) -> FhevmResult<EncryptedInput> {
    encrypt_values(instance, contract_address, user_address, &[(value.clone(), fhe_type)]).await
}

/// Encrypt several values into a single input sharing one proof
pub async fn encrypt_values(
    instance: &dyn FhevmInstance,
    contract_address: Address,
    user_address: Address,
    values: &[(Value, &str)],
) -> FhevmResult<EncryptedInput> {
    if values.is_empty() {
        return Err(FhevmError::MissingParameter("values".to_string()));
    }

    let checked = values
        .iter()
        .map(|(value, fhe_type)| checked_value(value, fhe_type))
        .collect::<FhevmResult<Vec<_>>>()?;

    let mut builder = instance
        .create_encrypted_input(contract_address, user_address)
        .map_err(|e| FhevmError::EncryptionFailed(e.to_string()))?;

    for (fhe_type, clear) in checked {
        add_value(builder.as_mut(), fhe_type, clear)
            .map_err(|e| FhevmError::EncryptionFailed(e.to_string()))?;
    }

    let encrypted = builder
        .encrypt()
        .await
        .map_err(|e| FhevmError::EncryptionFailed(e.to_string()))?;

    debug!(
        contract = ?contract_address,
        handles = encrypted.handles.len(),
        "Encrypted input ready"
    );
    Ok(encrypted)
}
