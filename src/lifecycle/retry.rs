// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use crate::errors::{ErrorKind, FhevmError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

fn default_max_retries() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

/// Retry policy for instance creation. Delays grow as
/// `initial_delay * backoff_multiplier^attempt` (1s, 2s, 4s by default).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    /// Kinds worth retrying; `None` means [`ErrorKind::DEFAULT_RETRYABLE`]
    #[serde(default)]
    pub retryable: Option<Vec<ErrorKind>>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            retryable: None,
        }
    }
}

impl RetryConfig {
    pub fn new(max_retries: u32, initial_delay: Duration) -> Self {
        Self {
            max_retries,
            initial_delay_ms: initial_delay.as_millis() as u64,
            ..Self::default()
        }
    }

    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    pub fn with_retryable(mut self, kinds: Vec<ErrorKind>) -> Self {
        self.retryable = Some(kinds);
        self
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    /// Delay before retry number `attempt` (0-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.backoff_multiplier.max(0.0).powi(attempt as i32);
        let millis = (self.initial_delay_ms as f64 * factor).min(u64::MAX as f64);
        Duration::from_millis(millis as u64)
    }

    pub fn is_retryable(&self, kind: ErrorKind) -> bool {
        if kind.is_terminal() {
            return false;
        }
        match &self.retryable {
            Some(kinds) => kinds.contains(&kind),
            None => ErrorKind::DEFAULT_RETRYABLE.contains(&kind),
        }
    }

    /// Whether a failure after `retries_so_far` retries warrants another one
    pub fn should_retry(&self, error: &FhevmError, retries_so_far: u32) -> bool {
        retries_so_far < self.max_retries && self.is_retryable(error.kind())
    }
}
