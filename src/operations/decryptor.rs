// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Signature + decryption orchestration for one consumer
//!
//! Only one decryption runs at a time per [`Decryptor`]; a trigger while one
//! is in flight returns [`DecryptOutcome::Busy`] without prompting the
//! wallet. The caller's context (chain id and user) is captured when the run
//! starts and re-read after every suspension point; if it moved on, the
//! run ends as [`DecryptOutcome::Stale`] and its results are dropped.

use super::decrypt::{decrypt_batch, get_unique_contract_addresses, DecryptBatchParams, NO_REQUESTS_ERROR};
use crate::errors::FhevmError;
use crate::instance::{DecryptedValue, FhevmInstance, HandleContractPair};
use crate::signature::{DecryptionSigner, SignatureManager};
use crate::utils::parse_address;
use ethers::types::Address;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What a decryption run must still match when it finishes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecryptContext {
    pub chain_id: u64,
    pub user_address: Address,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DecryptOutcome {
    Completed(HashMap<String, DecryptedValue>),
    /// Another run was already in flight
    Busy,
    /// The context changed while this run was suspended
    Stale,
    Failed(String),
}

impl DecryptOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, DecryptOutcome::Completed(_))
    }
}

struct InProgress<'a>(&'a AtomicBool);

impl Drop for InProgress<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct Decryptor {
    signatures: Arc<SignatureManager>,
    in_progress: AtomicBool,
}

impl Decryptor {
    pub fn new(signatures: Arc<SignatureManager>) -> Self {
        Self {
            signatures,
            in_progress: AtomicBool::new(false),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }

    pub async fn decrypt<F>(
        &self,
        instance: &dyn FhevmInstance,
        requests: &[HandleContractPair],
        signer: &dyn DecryptionSigner,
        current_context: F,
    ) -> DecryptOutcome
    where
        F: Fn() -> DecryptContext + Sync,
    {
        if self
            .in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Decryption already in progress");
            return DecryptOutcome::Busy;
        }
        let _in_progress = InProgress(&self.in_progress);

        if requests.is_empty() {
            return DecryptOutcome::Failed(NO_REQUESTS_ERROR.to_string());
        }
        if let Some(err) = requests.iter().find_map(|r| r.validate().err()) {
            return DecryptOutcome::Failed(err.to_string());
        }

        let started = current_context();
        let contracts = match get_unique_contract_addresses(requests)
            .iter()
            .map(|address| parse_address(address))
            .collect::<Result<Vec<_>, _>>()
        {
            Ok(contracts) => contracts,
            Err(e) => return DecryptOutcome::Failed(e.to_string()),
        };

        let signature = match self.signatures.load_or_sign(instance, &contracts, signer).await {
            Some(signature) => signature,
            None => {
                let err = FhevmError::SignatureFailed(
                    "no decryption signature could be obtained".to_string(),
                );
                return DecryptOutcome::Failed(err.to_string());
            }
        };
        if current_context() != started {
            info!(chain_id = started.chain_id, "Context changed while signing, dropping decryption");
            return DecryptOutcome::Stale;
        }

        let result = decrypt_batch(DecryptBatchParams::new(instance, requests, &signature)).await;
        if current_context() != started {
            info!(chain_id = started.chain_id, "Context changed while decrypting, dropping results");
            return DecryptOutcome::Stale;
        }

        if result.success {
            DecryptOutcome::Completed(result.results)
        } else {
            let reason = result.error.unwrap_or_else(|| "unknown error".to_string());
            warn!(reason = %reason, "Decryption failed");
            DecryptOutcome::Failed(reason)
        }
    }
}
