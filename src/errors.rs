// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Error types for FHEVM client operations
//!
//! Every public operation of the SDK reports failures through [`FhevmError`].
//! Collaborator traits (stores, relayer SDK, signers) return `anyhow::Result`
//! and are mapped into a variant at the boundary where the failure is
//! classified.
//!
//! ## Retry classification
//!
//! [`ErrorKind`] is the `Copy` discriminant used by retry allow-lists:
//! - **Retryable by default**: `Network`, `SdkLoadFailed`
//! - **Never retried**: `Aborted`, `Validation`, `InvalidAddress`, `MissingParameter`

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Logical error kinds, independent of the payload carried by [`FhevmError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Network,
    Aborted,
    SdkLoadFailed,
    InstanceNotReady,
    MissingParameter,
    InvalidAddress,
    EncryptionFailed,
    DecryptionFailed,
    SignatureFailed,
    Validation,
    Storage,
    Other,
}

impl ErrorKind {
    /// Kinds retried when a retry configuration does not name its own allow-list
    pub const DEFAULT_RETRYABLE: [ErrorKind; 2] = [ErrorKind::Network, ErrorKind::SdkLoadFailed];

    /// Kinds that must never be retried regardless of configuration
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ErrorKind::Aborted
                | ErrorKind::Validation
                | ErrorKind::InvalidAddress
                | ErrorKind::MissingParameter
        )
    }
}

/// Errors that can occur while creating instances, signing or running FHE operations
#[derive(Error, Debug)]
pub enum FhevmError {
    /// Endpoint unreachable, or not a Web3 node
    #[error("Network error ({endpoint}): {reason}")]
    Network { endpoint: String, reason: String },

    /// The operation's cancellation token fired
    #[error("Operation aborted")]
    Aborted,

    /// Loading or initializing the relayer SDK failed
    #[error("Relayer SDK failed to load: {0}")]
    SdkLoadFailed(String),

    /// An operation needed an instance but none is ready
    #[error("FHEVM instance is not ready")]
    InstanceNotReady,

    /// A required parameter was not supplied
    #[error("Missing parameter: {0}")]
    MissingParameter(String),

    /// A value that must be a 20-byte hex address is not one
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("Signature failed: {0}")]
    SignatureFailed(String),

    /// Unknown encrypted type or out-of-range value
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl FhevmError {
    pub fn network(endpoint: impl Into<String>, reason: impl ToString) -> Self {
        FhevmError::Network {
            endpoint: endpoint.into(),
            reason: reason.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            FhevmError::Network { .. } => ErrorKind::Network,
            FhevmError::Aborted => ErrorKind::Aborted,
            FhevmError::SdkLoadFailed(_) => ErrorKind::SdkLoadFailed,
            FhevmError::InstanceNotReady => ErrorKind::InstanceNotReady,
            FhevmError::MissingParameter(_) => ErrorKind::MissingParameter,
            FhevmError::InvalidAddress(_) => ErrorKind::InvalidAddress,
            FhevmError::EncryptionFailed(_) => ErrorKind::EncryptionFailed,
            FhevmError::DecryptionFailed(_) => ErrorKind::DecryptionFailed,
            FhevmError::SignatureFailed(_) => ErrorKind::SignatureFailed,
            FhevmError::Validation(_) => ErrorKind::Validation,
            FhevmError::Storage(_) => ErrorKind::Storage,
            FhevmError::Other(_) => ErrorKind::Other,
        }
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, FhevmError::Aborted)
    }

    /// Short, human-readable description plus a recovery suggestion
    pub fn user_message(&self) -> String {
        match self {
            FhevmError::Network { endpoint, .. } => format!(
                "Could not reach the network at {}. Check that the RPC endpoint is running and reachable, then retry.",
                endpoint
            ),
            FhevmError::Aborted => {
                "The operation was cancelled. Reconnect to start it again.".to_string()
            }
            FhevmError::SdkLoadFailed(_) => {
                "The encryption SDK could not be loaded. Check your connection and refresh."
                    .to_string()
            }
            FhevmError::InstanceNotReady => {
                "Encryption is not ready yet. Wait for initialization to finish and try again."
                    .to_string()
            }
            FhevmError::MissingParameter(name) => {
                format!("A required value is missing ({}). Provide it and retry.", name)
            }
            FhevmError::InvalidAddress(address) => format!(
                "'{}' is not a valid address. Use a 0x-prefixed, 40 hex character address.",
                address
            ),
            FhevmError::EncryptionFailed(_) => {
                "The value could not be encrypted. Check the value and contract, then retry."
                    .to_string()
            }
            FhevmError::DecryptionFailed(_) => {
                "The relayer could not decrypt the requested values. Check that you have access and retry."
                    .to_string()
            }
            FhevmError::SignatureFailed(_) => {
                "The decryption authorization was not signed. Approve the signature request in your wallet to continue."
                    .to_string()
            }
            FhevmError::Validation(reason) => {
                format!("Invalid input: {}. Correct the value and retry.", reason)
            }
            FhevmError::Storage(_) => {
                "Local storage is unavailable. Check storage permissions and retry.".to_string()
            }
            FhevmError::Other(_) => {
                "An unexpected error occurred. Refresh and try again.".to_string()
            }
        }
    }
}

pub type FhevmResult<T> = std::result::Result<T, FhevmError>;
