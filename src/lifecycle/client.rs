// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Standalone client with explicit `init` / `destroy`
//!
//! Unlike [`super::FhevmManager`], nothing happens until `init()` is called.
//! A ready client hands back its instance without another round-trip as
//! long as the endpoint has not changed, and `destroy()` is terminal.

use super::events::{Event, EventRegistry, Outbox, SubscriptionId};
use crate::chain::Endpoint;
use crate::errors::{ErrorKind, FhevmError, FhevmResult};
use crate::instance::{
    CreateParams, DecryptedValue, EncryptedInput, FhevmInstance, HandleContractPair,
    InstanceFactory,
};
use crate::operations::{decrypt_batch, encrypt_value, get_unique_contract_addresses, DecryptBatchParams};
use crate::signature::{DecryptionSigner, SignatureManager};
use crate::utils::parse_address;
use ethers::types::Address;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientStatus {
    Idle,
    Initializing,
    Ready,
    Error,
    Destroyed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientEventKind {
    StatusChanged,
    Ready,
    Error,
    Destroyed,
}

#[derive(Clone)]
pub enum ClientEvent {
    StatusChanged(ClientStatus),
    Ready(Arc<dyn FhevmInstance>),
    Error { kind: ErrorKind, message: String },
    Destroyed,
}

impl Event for ClientEvent {
    type Kind = ClientEventKind;

    fn kind(&self) -> ClientEventKind {
        match self {
            ClientEvent::StatusChanged(_) => ClientEventKind::StatusChanged,
            ClientEvent::Ready(_) => ClientEventKind::Ready,
            ClientEvent::Error { .. } => ClientEventKind::Error,
            ClientEvent::Destroyed => ClientEventKind::Destroyed,
        }
    }
}

impl fmt::Debug for ClientEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientEvent::StatusChanged(status) => f.debug_tuple("StatusChanged").field(status).finish(),
            ClientEvent::Ready(instance) => f
                .debug_struct("Ready")
                .field("chain_id", &instance.chain_id())
                .finish(),
            ClientEvent::Error { kind, message } => f
                .debug_struct("Error")
                .field("kind", kind)
                .field("message", message)
                .finish(),
            ClientEvent::Destroyed => f.write_str("Destroyed"),
        }
    }
}

struct ClientState {
    status: ClientStatus,
    endpoint: Endpoint,
    instance: Option<Arc<dyn FhevmInstance>>,
    /// Endpoint the current instance was created for
    ready_endpoint: Option<Endpoint>,
    error_message: Option<String>,
    cancel: Option<CancellationToken>,
    destroyed: bool,
    /// Bumped by `destroy()`; init events from an older generation are dropped
    generation: u64,
}

pub struct FhevmClient {
    factory: InstanceFactory,
    signatures: SignatureManager,
    mock_chains: HashMap<u64, String>,
    state: Mutex<ClientState>,
    init_lock: tokio::sync::Mutex<()>,
    events: EventRegistry<ClientEvent>,
    outbox: Outbox<ClientEvent>,
}

impl FhevmClient {
    pub fn new(
        factory: InstanceFactory,
        signatures: SignatureManager,
        endpoint: impl Into<Endpoint>,
    ) -> Self {
        Self {
            factory,
            signatures,
            mock_chains: HashMap::new(),
            state: Mutex::new(ClientState {
                status: ClientStatus::Idle,
                endpoint: endpoint.into(),
                instance: None,
                ready_endpoint: None,
                error_message: None,
                cancel: None,
                destroyed: false,
                generation: 0,
            }),
            init_lock: tokio::sync::Mutex::new(()),
            events: EventRegistry::new("client"),
            outbox: Outbox::new(),
        }
    }

    pub fn with_mock_chains(mut self, mock_chains: HashMap<u64, String>) -> Self {
        self.mock_chains = mock_chains;
        self
    }

    fn lock(&self) -> MutexGuard<'_, ClientState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn status(&self) -> ClientStatus {
        self.lock().status
    }

    pub fn instance(&self) -> Option<Arc<dyn FhevmInstance>> {
        self.lock().instance.clone()
    }

    pub fn endpoint(&self) -> Endpoint {
        self.lock().endpoint.clone()
    }

    pub fn error_message(&self) -> Option<String> {
        self.lock().error_message.clone()
    }

    pub fn signatures(&self) -> &SignatureManager {
        &self.signatures
    }

    /// Takes effect on the next `init()`
    pub fn set_endpoint(&self, endpoint: impl Into<Endpoint>) {
        let mut st = self.lock();
        if st.destroyed {
            return;
        }
        st.endpoint = endpoint.into();
    }

    pub fn on<F>(&self, kind: ClientEventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&ClientEvent) + Send + Sync + 'static,
    {
        self.events.on(kind, handler)
    }

    pub fn off(&self, id: SubscriptionId) -> bool {
        self.events.off(id)
    }

    /// Deliver queued events; never call with the state lock held
    fn dispatch(&self) {
        self.outbox.drain(
            || self.lock().generation,
            |event| {
                self.events.emit(&event);
            },
        );
    }

    /// Create the instance, or return the existing one when nothing changed.
    /// Returns `Ok(None)` once the client has been destroyed.
    pub async fn init(&self) -> FhevmResult<Option<Arc<dyn FhevmInstance>>> {
        let _serial = self.init_lock.lock().await;

        let (endpoint, token) = {
            let mut st = self.lock();
            if st.destroyed {
                debug!("init() on destroyed client ignored");
                return Ok(None);
            }
            if st.status == ClientStatus::Ready {
                if let (Some(instance), Some(ready)) = (&st.instance, &st.ready_endpoint) {
                    if ready.same_as(&st.endpoint) {
                        return Ok(Some(instance.clone()));
                    }
                }
            }
            let token = CancellationToken::new();
            st.cancel = Some(token.clone());
            st.instance = None;
            st.ready_endpoint = None;
            st.error_message = None;
            st.status = ClientStatus::Initializing;
            self.outbox.push(
                Some(st.generation),
                [ClientEvent::StatusChanged(ClientStatus::Initializing)],
            );
            (st.endpoint.clone(), token)
        };
        self.dispatch();

        let params = CreateParams::new(endpoint.clone())
            .with_mock_chains(self.mock_chains.clone())
            .with_cancel(token.clone());
        let result = self.factory.create(params).await;

        let outcome = {
            let mut st = self.lock();
            let mut events = Vec::new();
            st.cancel = None;
            if st.destroyed || token.is_cancelled() {
                debug!("Client destroyed during init, dropping result");
                return Ok(None);
            }
            let outcome = match result {
                Ok(instance) => {
                    st.instance = Some(instance.clone());
                    st.ready_endpoint = Some(endpoint);
                    st.status = ClientStatus::Ready;
                    events.push(ClientEvent::StatusChanged(ClientStatus::Ready));
                    events.push(ClientEvent::Ready(instance.clone()));
                    info!(chain_id = instance.chain_id(), "FHEVM client ready");
                    Ok(Some(instance))
                }
                Err(err) => {
                    st.status = ClientStatus::Error;
                    st.error_message = Some(err.user_message());
                    events.push(ClientEvent::StatusChanged(ClientStatus::Error));
                    events.push(ClientEvent::Error {
                        kind: err.kind(),
                        message: err.to_string(),
                    });
                    warn!(error = %err, "FHEVM client init failed");
                    Err(err)
                }
            };
            self.outbox.push(Some(st.generation), events);
            outcome
        };
        self.dispatch();
        outcome
    }

    /// Cancel any running init and release the instance; terminal
    pub fn destroy(&self) {
        {
            let mut st = self.lock();
            if st.destroyed {
                return;
            }
            st.destroyed = true;
            st.generation += 1;
            if let Some(token) = st.cancel.take() {
                token.cancel();
            }
            st.instance = None;
            st.ready_endpoint = None;
            st.status = ClientStatus::Destroyed;
            self.outbox.push(
                None,
                [
                    ClientEvent::StatusChanged(ClientStatus::Destroyed),
                    ClientEvent::Destroyed,
                ],
            );
        }
        info!("FHEVM client destroyed");
        self.dispatch();
    }

    fn require_ready(&self) -> FhevmResult<Arc<dyn FhevmInstance>> {
        let st = self.lock();
        match (&st.status, &st.instance) {
            (ClientStatus::Ready, Some(instance)) => Ok(instance.clone()),
            _ => Err(FhevmError::InstanceNotReady),
        }
    }

    pub async fn encrypt(
        &self,
        contract_address: Address,
        user_address: Address,
        value: &Value,
        fhe_type: &str,
    ) -> FhevmResult<EncryptedInput> {
        let instance = self.require_ready()?;
        encrypt_value(instance.as_ref(), contract_address, user_address, value, fhe_type).await
    }

    /// Sign (or reuse a cached signature) and decrypt `requests`
    pub async fn decrypt(
        &self,
        requests: &[HandleContractPair],
        signer: &dyn DecryptionSigner,
    ) -> FhevmResult<HashMap<String, DecryptedValue>> {
        let instance = self.require_ready()?;
        for request in requests {
            request.validate()?;
        }

        let contracts = get_unique_contract_addresses(requests)
            .iter()
            .map(|address| parse_address(address))
            .collect::<FhevmResult<Vec<Address>>>()?;

        let signature = self
            .signatures
            .load_or_sign(instance.as_ref(), &contracts, signer)
            .await
            .ok_or_else(|| {
                FhevmError::SignatureFailed("no decryption signature could be obtained".to_string())
            })?;

        let result = decrypt_batch(DecryptBatchParams::new(instance.as_ref(), requests, &signature)).await;
        if result.success {
            Ok(result.results)
        } else {
            Err(FhevmError::DecryptionFailed(
                result.error.unwrap_or_else(|| "unknown error".to_string()),
            ))
        }
    }
}

impl Drop for FhevmClient {
    fn drop(&mut self) {
        if let Some(token) = self.lock().cancel.take() {
            token.cancel();
        }
    }
}
