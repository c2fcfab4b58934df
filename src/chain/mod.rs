// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Chain resolution
//!
//! Determines which chain an endpoint points at and whether it is a local
//! development chain that should be served by the mock backend instead of the
//! relayer.

pub mod endpoint;
pub mod probe;
pub mod resolver;

pub use endpoint::{Eip1193Provider, Endpoint, HttpConnector, HttpRpc, RpcConnector};
pub use probe::RelayerMetadata;
pub use resolver::{merged_mock_chains, ChainResolver, ResolvedChain};
