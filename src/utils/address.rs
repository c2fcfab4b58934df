// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Hex address and handle helpers
//!
//! `Address::from_str` accepts inputs without a `0x` prefix, so strict format
//! checks happen here before parsing.

use crate::errors::{FhevmError, FhevmResult};
use ethers::types::Address;
use ethers::utils::to_checksum;
use std::str::FromStr;

/// `0x` followed by exactly 40 hex characters
pub fn is_hex_address(value: &str) -> bool {
    match value.strip_prefix("0x") {
        Some(hex_part) => hex_part.len() == 40 && hex_part.chars().all(|c| c.is_ascii_hexdigit()),
        None => false,
    }
}

/// Non-empty `0x`-prefixed hex string
pub fn is_hex_handle(value: &str) -> bool {
    match value.strip_prefix("0x") {
        Some(hex_part) => !hex_part.is_empty() && hex_part.chars().all(|c| c.is_ascii_hexdigit()),
        None => false,
    }
}

pub fn parse_address(value: &str) -> FhevmResult<Address> {
    if !is_hex_address(value) {
        return Err(FhevmError::InvalidAddress(value.to_string()));
    }
    Address::from_str(value).map_err(|_| FhevmError::InvalidAddress(value.to_string()))
}

/// EIP-55 checksummed form, used wherever addresses are persisted or signed
pub fn to_checksum_string(address: &Address) -> String {
    to_checksum(address, None)
}
