// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Cancellation helpers for suspension points

use crate::errors::{FhevmError, FhevmResult};
use std::future::Future;
use tokio_util::sync::CancellationToken;

pub fn check_cancelled(token: &CancellationToken) -> FhevmResult<()> {
    if token.is_cancelled() {
        return Err(FhevmError::Aborted);
    }
    Ok(())
}

/// Race `fut` against the token, then re-check the token after resuming
pub async fn run_cancellable<F>(token: &CancellationToken, fut: F) -> FhevmResult<F::Output>
where
    F: Future,
{
    check_cancelled(token)?;
    let output = tokio::select! {
        biased;
        _ = token.cancelled() => return Err(FhevmError::Aborted),
        output = fut => output,
    };
    check_cancelled(token)?;
    Ok(output)
}
