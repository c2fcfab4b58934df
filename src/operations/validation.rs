// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Pre-flight checks for values about to be encrypted
//!
//! | type                      | accepted                                             |
//! |---------------------------|------------------------------------------------------|
//! | `ebool`                   | `true`, `false`, `0`, `1`                            |
//! | `euint8` .. `euint256`    | non-negative integer (number, decimal or `0x` string) within `0..=2^n-1` |
//! | `eaddress`                | `0x` followed by exactly 40 hex characters           |

use crate::instance::FheType;
use crate::utils::{is_hex_address, parse_address};
use ethers::types::{Address, U256};
use serde_json::Value;

/// A value that passed validation for its encrypted type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearValue {
    Bool(bool),
    Uint(U256),
    Address(Address),
}

fn parse_uint(value: &Value) -> Option<U256> {
    match value {
        Value::Number(n) => n.as_u64().map(U256::from),
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                return None;
            }
            match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
                Some(hex_digits) if !hex_digits.is_empty() => {
                    U256::from_str_radix(hex_digits, 16).ok()
                }
                Some(_) => None,
                None if s.bytes().all(|b| b.is_ascii_digit()) => U256::from_dec_str(s).ok(),
                None => None,
            }
        }
        _ => None,
    }
}

fn fits_in_bits(value: U256, bits: u32) -> bool {
    bits >= 256 || value < (U256::one() << bits as usize)
}

/// Parse `value` as a clear value of `fhe_type`, `None` when out of shape or range
pub fn parse_clear_value(value: &Value, fhe_type: FheType) -> Option<ClearValue> {
    match fhe_type {
        FheType::Ebool => match value {
            Value::Bool(b) => Some(ClearValue::Bool(*b)),
            Value::Number(n) => match n.as_u64() {
                Some(0) => Some(ClearValue::Bool(false)),
                Some(1) => Some(ClearValue::Bool(true)),
                _ => None,
            },
            _ => None,
        },
        FheType::Eaddress => {
            let raw = value.as_str()?;
            if !is_hex_address(raw) {
                return None;
            }
            parse_address(raw).ok().map(ClearValue::Address)
        }
        _ => {
            let bits = fhe_type.uint_bits()?;
            let parsed = parse_uint(value)?;
            fits_in_bits(parsed, bits).then_some(ClearValue::Uint(parsed))
        }
    }
}

/// Whether `value` can be encrypted as `fhe_type`; unknown types are never valid
pub fn is_valid_encryption_value(value: &Value, fhe_type: &str) -> bool {
    match fhe_type.parse::<FheType>() {
        Ok(t) => parse_clear_value(value, t).is_some(),
        Err(_) => false,
    }
}
