// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Instance lifecycle management
//!
//! - [`FhevmManager`]: long-lived state machine that (re)creates the instance
//!   whenever its connection parameters change, with optional retries
//! - [`FhevmClient`]: standalone client with explicit `init`/`destroy`
//! - [`events`]: subscription registries used by both

pub mod client;
pub mod events;
pub mod manager;
pub mod retry;

pub use client::{ClientEvent, ClientEventKind, ClientStatus, FhevmClient};
pub use events::{EventRegistry, Subscribers, SubscriptionId};
pub use manager::{FhevmManager, ManagerOptions};
pub use retry::RetryConfig;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of the manager's current instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleStatus {
    Idle,
    Loading,
    Ready,
    Error,
}

impl LifecycleStatus {
    /// Ready or Error: no attempt is running
    pub fn is_settled(&self) -> bool {
        matches!(self, LifecycleStatus::Ready | LifecycleStatus::Error)
    }
}

impl fmt::Display for LifecycleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LifecycleStatus::Idle => "idle",
            LifecycleStatus::Loading => "loading",
            LifecycleStatus::Ready => "ready",
            LifecycleStatus::Error => "error",
        };
        f.write_str(s)
    }
}
