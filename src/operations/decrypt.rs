// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use crate::instance::{DecryptedValue, FhevmInstance, HandleContractPair};
use crate::signature::DecryptionSignature;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, warn};

pub const NO_REQUESTS_ERROR: &str = "No requests to decrypt";

pub struct DecryptBatchParams<'a> {
    pub instance: &'a dyn FhevmInstance,
    pub requests: &'a [HandleContractPair],
    pub signature: &'a DecryptionSignature,
    pub on_progress: Option<&'a (dyn Fn(&str) + Sync)>,
}

impl<'a> DecryptBatchParams<'a> {
    pub fn new(
        instance: &'a dyn FhevmInstance,
        requests: &'a [HandleContractPair],
        signature: &'a DecryptionSignature,
    ) -> Self {
        Self {
            instance,
            requests,
            signature,
            on_progress: None,
        }
    }

    pub fn with_progress(mut self, on_progress: &'a (dyn Fn(&str) + Sync)) -> Self {
        self.on_progress = Some(on_progress);
        self
    }

    fn progress(&self, message: &str) {
        if let Some(on_progress) = self.on_progress {
            on_progress(message);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecryptBatchResult {
    pub results: HashMap<String, DecryptedValue>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DecryptBatchResult {
    fn failed(error: impl Into<String>) -> Self {
        Self {
            results: HashMap::new(),
            success: false,
            error: Some(error.into()),
        }
    }
}

/// Decrypt every handle in one relayer call; failures come back in the result
pub async fn decrypt_batch(params: DecryptBatchParams<'_>) -> DecryptBatchResult {
    if params.requests.is_empty() {
        return DecryptBatchResult::failed(NO_REQUESTS_ERROR);
    }

    let signature = params.signature;
    params.progress(&format!("Decrypting {} handle(s)", params.requests.len()));
    debug!(
        count = params.requests.len(),
        user = ?signature.user_address,
        "Submitting user decryption"
    );

    match params
        .instance
        .user_decrypt(
            params.requests,
            &signature.private_key,
            &signature.public_key,
            &signature.signature,
            &signature.contract_addresses,
            signature.user_address,
            signature.start_timestamp,
            signature.duration_days,
        )
        .await
    {
        Ok(results) => {
            params.progress("Decryption completed");
            DecryptBatchResult {
                results,
                success: true,
                error: None,
            }
        }
        Err(e) => {
            warn!(error = %e, "User decryption failed");
            params.progress("Decryption failed");
            DecryptBatchResult::failed(e.to_string())
        }
    }
}

/// Contract addresses referenced by `requests`, deduplicated and ascending
pub fn get_unique_contract_addresses(requests: &[HandleContractPair]) -> Vec<String> {
    requests
        .iter()
        .map(|request| request.contract_address.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
