// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use crate::errors::{FhevmError, FhevmResult};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use ethers::providers::{Http, Provider};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Wallet-style JSON-RPC request capability (`request({method, params})`)
#[async_trait]
pub trait Eip1193Provider: Send + Sync {
    async fn request(&self, method: &str, params: Value) -> Result<Value>;
}

/// Where to reach a chain: a raw RPC URL or a connected wallet provider
#[derive(Clone)]
pub enum Endpoint {
    Url(String),
    Provider(Arc<dyn Eip1193Provider>),
}

impl Endpoint {
    pub fn url(&self) -> Option<&str> {
        match self {
            Endpoint::Url(url) => Some(url),
            Endpoint::Provider(_) => None,
        }
    }

    /// Identity comparison: equal URLs, or the very same provider object
    pub fn same_as(&self, other: &Endpoint) -> bool {
        match (self, other) {
            (Endpoint::Url(a), Endpoint::Url(b)) => a == b,
            (Endpoint::Provider(a), Endpoint::Provider(b)) => {
                Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
            }
            _ => false,
        }
    }

    /// Short label for logs and error messages
    pub fn describe(&self) -> String {
        match self {
            Endpoint::Url(url) => url.clone(),
            Endpoint::Provider(_) => "wallet provider".to_string(),
        }
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Url(url) => f.debug_tuple("Url").field(url).finish(),
            Endpoint::Provider(_) => f.write_str("Provider(..)"),
        }
    }
}

impl From<&str> for Endpoint {
    fn from(url: &str) -> Self {
        Endpoint::Url(url.to_string())
    }
}

impl From<String> for Endpoint {
    fn from(url: String) -> Self {
        Endpoint::Url(url)
    }
}

impl From<Arc<dyn Eip1193Provider>> for Endpoint {
    fn from(provider: Arc<dyn Eip1193Provider>) -> Self {
        Endpoint::Provider(provider)
    }
}

/// JSON-RPC over HTTP, backed by an ethers provider
pub struct HttpRpc {
    provider: Provider<Http>,
}

impl HttpRpc {
    pub fn new(rpc_url: &str) -> Result<Self> {
        let provider = Provider::<Http>::try_from(rpc_url)
            .map_err(|e| anyhow!("Failed to create provider: {}", e))?;
        Ok(Self { provider })
    }
}

#[async_trait]
impl Eip1193Provider for HttpRpc {
    async fn request(&self, method: &str, params: Value) -> Result<Value> {
        let result: Value = self.provider.request(method, params).await?;
        Ok(result)
    }
}

/// Opens throwaway RPC connections for URL endpoints
pub trait RpcConnector: Send + Sync {
    fn connect(&self, rpc_url: &str) -> FhevmResult<Arc<dyn Eip1193Provider>>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct HttpConnector;

impl RpcConnector for HttpConnector {
    fn connect(&self, rpc_url: &str) -> FhevmResult<Arc<dyn Eip1193Provider>> {
        url::Url::parse(rpc_url).map_err(|e| FhevmError::network(rpc_url, e))?;
        let rpc = HttpRpc::new(rpc_url).map_err(|e| FhevmError::network(rpc_url, e))?;
        Ok(Arc::new(rpc))
    }
}
