// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Instance lifecycle state machine
//!
//! ```text
//! Idle --(enabled, endpoint set)--> Loading --(ok)--> Ready
//!                                      |
//!                                      +--(failed, no retry left)--> Error
//! any --(endpoint / chain id / enabled change, refresh)--> Idle
//! ```
//!
//! Each attempt runs in its own task and captures a generation number plus
//! the endpoint it was started for. Commits check both against the current
//! state and check the attempt's cancellation token, so a superseded attempt
//! can never overwrite what a newer one produced. Notifications produced by
//! a commit carry its generation and are dropped if a reset lands before
//! they are delivered.
//!
//! Cancelling an attempt only fires its token; the task notices at its next
//! suspension point and exits on its own.

use super::events::{call_isolated, Outbox, Subscribers, SubscriptionId};
use super::retry::RetryConfig;
use super::LifecycleStatus;
use crate::chain::Endpoint;
use crate::errors::FhevmError;
use crate::instance::{CreateParams, CreateStatus, CreateStatusCallback, FhevmInstance, InstanceFactory};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub type SuccessCallback = Arc<dyn Fn(&Arc<dyn FhevmInstance>) + Send + Sync>;
pub type ErrorCallback = Arc<dyn Fn(&FhevmError) + Send + Sync>;

#[derive(Clone)]
pub struct ManagerOptions {
    pub endpoint: Option<Endpoint>,
    pub chain_id: Option<u64>,
    pub enabled: bool,
    pub mock_chains: HashMap<u64, String>,
    /// `None` disables retries
    pub retry: Option<RetryConfig>,
    pub on_success: Option<SuccessCallback>,
    pub on_error: Option<ErrorCallback>,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            endpoint: None,
            chain_id: None,
            enabled: true,
            mock_chains: HashMap::new(),
            retry: None,
            on_success: None,
            on_error: None,
        }
    }
}

impl ManagerOptions {
    pub fn new(endpoint: impl Into<Endpoint>) -> Self {
        Self {
            endpoint: Some(endpoint.into()),
            ..Self::default()
        }
    }

    pub fn with_chain_id(mut self, chain_id: u64) -> Self {
        self.chain_id = Some(chain_id);
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_mock_chains(mut self, mock_chains: HashMap<u64, String>) -> Self {
        self.mock_chains = mock_chains;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn on_success<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Arc<dyn FhevmInstance>) + Send + Sync + 'static,
    {
        self.on_success = Some(Arc::new(callback));
        self
    }

    pub fn on_error<F>(mut self, callback: F) -> Self
    where
        F: Fn(&FhevmError) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(callback));
        self
    }
}

struct ManagerState {
    status: LifecycleStatus,
    instance: Option<Arc<dyn FhevmInstance>>,
    error: Option<Arc<FhevmError>>,
    endpoint: Option<Endpoint>,
    chain_id: Option<u64>,
    enabled: bool,
    generation: u64,
    retry_count: u32,
    last_attempts: u32,
    cancel: Option<CancellationToken>,
}

impl ManagerState {
    fn can_start(&self) -> bool {
        self.enabled && self.endpoint.is_some()
    }

    fn is_current(&self, generation: u64, endpoint: &Endpoint) -> bool {
        self.generation == generation
            && self
                .endpoint
                .as_ref()
                .map_or(false, |current| current.same_as(endpoint))
    }

    fn cancel_inflight(&mut self) {
        if let Some(token) = self.cancel.take() {
            token.cancel();
        }
    }
}

enum Notification {
    Status(LifecycleStatus),
    Instance(Option<Arc<dyn FhevmInstance>>),
    Progress(CreateStatus),
    Success(Arc<dyn FhevmInstance>),
    Failure(Arc<FhevmError>),
}

struct Shared {
    factory: InstanceFactory,
    mock_chains: HashMap<u64, String>,
    retry: Option<RetryConfig>,
    on_success: Option<SuccessCallback>,
    on_error: Option<ErrorCallback>,
    state: Mutex<ManagerState>,
    status_tx: watch::Sender<LifecycleStatus>,
    status_subs: Subscribers<LifecycleStatus>,
    instance_subs: Subscribers<Option<Arc<dyn FhevmInstance>>>,
    progress_subs: Subscribers<CreateStatus>,
    outbox: Outbox<Notification>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, ManagerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_status(
        &self,
        st: &mut ManagerState,
        status: LifecycleStatus,
        notes: &mut Vec<Notification>,
    ) {
        if st.status != status {
            st.status = status;
            self.status_tx.send_replace(status);
            notes.push(Notification::Status(status));
        }
    }

    /// Deliver queued notifications; never call with the state lock held
    fn dispatch(&self) {
        self.outbox
            .drain(|| self.lock().generation, |note| self.deliver(note));
    }

    fn deliver(&self, note: Notification) {
        match note {
            Notification::Status(status) => {
                self.status_subs.emit(&status);
            }
            Notification::Instance(instance) => {
                self.instance_subs.emit(&instance);
            }
            Notification::Progress(status) => {
                self.progress_subs.emit(&status);
            }
            Notification::Success(instance) => {
                if let Some(callback) = &self.on_success {
                    call_isolated("on_success", || callback(&instance));
                }
            }
            Notification::Failure(err) => {
                if let Some(callback) = &self.on_error {
                    call_isolated("on_error", || callback(&err));
                }
            }
        }
    }

    /// Cancel whatever is running and go back to Idle
    fn reset_locked(&self, st: &mut ManagerState, notes: &mut Vec<Notification>) {
        st.cancel_inflight();
        st.generation += 1;
        st.retry_count = 0;
        st.error = None;
        if st.instance.take().is_some() {
            notes.push(Notification::Instance(None));
        }
        self.set_status(st, LifecycleStatus::Idle, notes);
    }

    fn restart(self: &Arc<Self>) {
        {
            let mut st = self.lock();
            let mut notes = Vec::new();
            self.reset_locked(&mut st, &mut notes);
            if st.can_start() {
                self.start_attempt(&mut st, &mut notes);
            }
            self.outbox.push(None, notes);
        }
        self.dispatch();
    }

    fn start_attempt(self: &Arc<Self>, st: &mut ManagerState, notes: &mut Vec<Notification>) {
        let Some(endpoint) = st.endpoint.clone() else {
            return;
        };
        let handle = match Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!("No Tokio runtime available, instance creation not started");
                return;
            }
        };

        let generation = st.generation;
        let token = CancellationToken::new();
        self.set_status(st, LifecycleStatus::Loading, notes);
        st.cancel = Some(token.clone());

        debug!(generation, endpoint = %endpoint.describe(), "Starting instance creation");
        let shared = Arc::clone(self);
        handle.spawn(async move {
            shared.run_attempts(generation, endpoint, token).await;
        });
    }

    async fn run_attempts(
        self: Arc<Self>,
        generation: u64,
        endpoint: Endpoint,
        token: CancellationToken,
    ) {
        let mut retries: u32 = 0;
        loop {
            let params = CreateParams::new(endpoint.clone())
                .with_mock_chains(self.mock_chains.clone())
                .with_cancel(token.clone())
                .with_status_callback(self.progress_callback(generation, &endpoint));

            let result = self.factory.create(params).await;
            let err = match result {
                Ok(instance) => {
                    self.commit_success(generation, &endpoint, &token, instance, retries + 1);
                    return;
                }
                Err(err) => err,
            };

            if token.is_cancelled() || err.is_aborted() {
                debug!(generation, "Instance creation aborted");
                return;
            }

            if let Some(retry) = &self.retry {
                if retry.should_retry(&err, retries)
                    && self.begin_retry(generation, &endpoint, retries + 1)
                {
                    let delay = retry.delay_for(retries);
                    retries += 1;
                    warn!(
                        generation,
                        attempt = retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "🔄 Instance creation failed, retrying"
                    );
                    tokio::select! {
                        _ = token.cancelled() => {
                            debug!(generation, "Retry cancelled");
                            return;
                        }
                        _ = tokio::time::sleep(delay) => continue,
                    }
                }
            }

            self.commit_failure(generation, &endpoint, &token, err, retries + 1);
            return;
        }
    }

    fn progress_callback(self: &Arc<Self>, generation: u64, endpoint: &Endpoint) -> CreateStatusCallback {
        let shared = Arc::clone(self);
        let endpoint = endpoint.clone();
        Arc::new(move |status: CreateStatus| {
            {
                let st = shared.lock();
                if !st.is_current(generation, &endpoint) {
                    return;
                }
                shared
                    .outbox
                    .push(Some(generation), [Notification::Progress(status)]);
            }
            shared.dispatch();
        })
    }

    fn begin_retry(&self, generation: u64, endpoint: &Endpoint, retry_number: u32) -> bool {
        let mut st = self.lock();
        if !st.is_current(generation, endpoint) {
            return false;
        }
        st.retry_count = retry_number;
        true
    }

    fn commit_success(
        &self,
        generation: u64,
        endpoint: &Endpoint,
        token: &CancellationToken,
        instance: Arc<dyn FhevmInstance>,
        attempts: u32,
    ) {
        {
            let mut st = self.lock();
            if token.is_cancelled() || !st.is_current(generation, endpoint) {
                debug!(generation, "Discarding instance from superseded attempt");
                return;
            }
            let mut notes = Vec::new();
            st.instance = Some(instance.clone());
            st.error = None;
            st.retry_count = 0;
            st.last_attempts = attempts;
            st.cancel = None;
            self.set_status(&mut st, LifecycleStatus::Ready, &mut notes);
            notes.push(Notification::Instance(Some(instance.clone())));
            notes.push(Notification::Success(instance.clone()));
            self.outbox.push(Some(generation), notes);
        }
        info!(chain_id = instance.chain_id(), attempts, "✅ FHEVM instance ready");
        self.dispatch();
    }

    fn commit_failure(
        &self,
        generation: u64,
        endpoint: &Endpoint,
        token: &CancellationToken,
        err: FhevmError,
        attempts: u32,
    ) {
        let err = Arc::new(err);
        {
            let mut st = self.lock();
            if token.is_cancelled() || !st.is_current(generation, endpoint) {
                debug!(generation, error = %err, "Discarding failure from superseded attempt");
                return;
            }
            let mut notes = Vec::new();
            st.error = Some(err.clone());
            st.instance = None;
            st.retry_count = 0;
            st.last_attempts = attempts;
            st.cancel = None;
            self.set_status(&mut st, LifecycleStatus::Error, &mut notes);
            notes.push(Notification::Failure(err.clone()));
            self.outbox.push(Some(generation), notes);
        }
        error!(
            kind = ?err.kind(),
            attempts,
            error = %err,
            "❌ FHEVM instance creation failed"
        );
        self.dispatch();
    }
}

/// Keeps one FHEVM instance in sync with its connection parameters
pub struct FhevmManager {
    shared: Arc<Shared>,
}

impl FhevmManager {
    /// Starts creating the instance right away when enabled with an endpoint;
    /// that requires a Tokio runtime on the calling thread.
    pub fn new(factory: InstanceFactory, options: ManagerOptions) -> Self {
        let (status_tx, _) = watch::channel(LifecycleStatus::Idle);
        let state = ManagerState {
            status: LifecycleStatus::Idle,
            instance: None,
            error: None,
            endpoint: options.endpoint,
            chain_id: options.chain_id,
            enabled: options.enabled,
            generation: 0,
            retry_count: 0,
            last_attempts: 0,
            cancel: None,
        };
        let can_start = state.can_start();

        let shared = Arc::new(Shared {
            factory,
            mock_chains: options.mock_chains,
            retry: options.retry,
            on_success: options.on_success,
            on_error: options.on_error,
            state: Mutex::new(state),
            status_tx,
            status_subs: Subscribers::new("status"),
            instance_subs: Subscribers::new("instance"),
            progress_subs: Subscribers::new("progress"),
            outbox: Outbox::new(),
        });

        if can_start {
            shared.restart();
        }
        Self { shared }
    }

    pub fn status(&self) -> LifecycleStatus {
        self.shared.lock().status
    }

    pub fn instance(&self) -> Option<Arc<dyn FhevmInstance>> {
        self.shared.lock().instance.clone()
    }

    pub fn error(&self) -> Option<Arc<FhevmError>> {
        self.shared.lock().error.clone()
    }

    /// Recovery suggestion for the captured error
    pub fn error_message(&self) -> Option<String> {
        self.shared
            .lock()
            .error
            .as_ref()
            .map(|err| err.user_message())
    }

    /// Retries scheduled by the running attempt; 0 once it settles
    pub fn retry_count(&self) -> u32 {
        self.shared.lock().retry_count
    }

    /// Attempts made by the last settled run (1 means no retry happened)
    pub fn last_attempts(&self) -> u32 {
        self.shared.lock().last_attempts
    }

    pub fn endpoint(&self) -> Option<Endpoint> {
        self.shared.lock().endpoint.clone()
    }

    pub fn chain_id(&self) -> Option<u64> {
        self.shared.lock().chain_id
    }

    pub fn is_enabled(&self) -> bool {
        self.shared.lock().enabled
    }

    /// Change the connection parameters; a change restarts creation
    pub fn set_endpoint(&self, endpoint: Option<Endpoint>, chain_id: Option<u64>) {
        {
            let mut st = self.shared.lock();
            let same_endpoint = match (&st.endpoint, &endpoint) {
                (Some(a), Some(b)) => a.same_as(b),
                (None, None) => true,
                _ => false,
            };
            if same_endpoint && st.chain_id == chain_id {
                return;
            }
            st.endpoint = endpoint;
            st.chain_id = chain_id;
        }
        self.shared.restart();
    }

    pub fn set_enabled(&self, enabled: bool) {
        {
            let mut st = self.shared.lock();
            if st.enabled == enabled {
                return;
            }
            st.enabled = enabled;
            if !enabled {
                let mut notes = Vec::new();
                self.shared.reset_locked(&mut st, &mut notes);
                self.shared.outbox.push(None, notes);
            }
        }
        if enabled {
            self.shared.restart();
        } else {
            self.shared.dispatch();
        }
    }

    /// Cancel the running attempt (and any pending retry), clear state and start over
    pub fn refresh(&self) {
        self.shared.restart();
    }

    /// Cancel everything and return to Idle; a later `refresh` starts again
    pub fn shutdown(&self) {
        {
            let mut st = self.shared.lock();
            let mut notes = Vec::new();
            self.shared.reset_locked(&mut st, &mut notes);
            self.shared.outbox.push(None, notes);
        }
        info!("FHEVM manager shut down");
        self.shared.dispatch();
    }

    pub fn subscribe_status<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&LifecycleStatus) + Send + Sync + 'static,
    {
        self.shared.status_subs.subscribe(handler)
    }

    pub fn subscribe_instance<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&Option<Arc<dyn FhevmInstance>>) + Send + Sync + 'static,
    {
        self.shared.instance_subs.subscribe(handler)
    }

    pub fn subscribe_progress<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&CreateStatus) + Send + Sync + 'static,
    {
        self.shared.progress_subs.subscribe(handler)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.shared.status_subs.unsubscribe(id)
            || self.shared.instance_subs.unsubscribe(id)
            || self.shared.progress_subs.unsubscribe(id)
    }

    pub fn status_receiver(&self) -> watch::Receiver<LifecycleStatus> {
        self.shared.status_tx.subscribe()
    }

    /// Wait until no attempt is running; returns the status at that point
    pub async fn wait_until_settled(&self) -> LifecycleStatus {
        let mut rx = self.status_receiver();
        loop {
            let status = *rx.borrow_and_update();
            if status != LifecycleStatus::Loading {
                return status;
            }
            if rx.changed().await.is_err() {
                return self.status();
            }
        }
    }
}

impl Drop for FhevmManager {
    fn drop(&mut self) {
        self.shared.lock().cancel_inflight();
    }
}
