//! Per-Tenant API Executor
//!
//! Serializes every key/value request of one tenant storage path through a single worker.
//!
//! ## Responsibilities
//! - **Queueing**: `submit` pushes the request onto an unbounded FIFO and waits on a
//!   one-shot reply for that request alone.
//! - **Draining**: The worker wakes when the queue becomes non-empty and then drains it to
//!   empty, including requests that arrive mid-drain, before it waits again. Arrivals during
//!   a drain never trigger a separate pass: they are picked up by the running one.
//! - **Termination**: `terminate` is one-way. Requests still queued resolve as
//!   [`ApiError::Canceled`]; a request that already started always runs to completion.
//! - **Events**: Every request emits `start`, then its result or error, strictly before its
//!   reply is posted.

use super::error::ApiError;
use super::events::{EventHub, EventSubscription, ExecutorEvent};
use super::protocol;
use super::types::*;
use crate::storage::KeyValueStore;

use serde_json::{Map, Value, json};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};

/// A queued request and the channel its outcome is posted to.
struct Pending {
    request: ApiRequest,
    reply: oneshot::Sender<Result<Value, ApiError>>,
}

pub struct ApiExecutor {
    tenant: String,
    storage_path: PathBuf,
    queue: mpsc::UnboundedSender<Pending>,
    state: watch::Sender<ExecutorState>,
    events: EventHub,
}

impl ApiExecutor {
    /// Creates the executor and spawns its worker on the current Tokio runtime.
    pub fn spawn(tenant: &str, storage_path: &Path, config: &ExecutorConfig) -> Arc<Self> {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ExecutorState::Running);
        let events = EventHub::new(config.event_capacity);

        let worker = Worker {
            tenant: tenant.to_string(),
            store: KeyValueStore::new(storage_path),
            queue: queue_rx,
            state: state_rx,
            events: events.clone(),
        };
        tokio::spawn(worker.run());

        tracing::info!("[{}] API executor started for {:?}", tenant, storage_path);

        Arc::new(Self {
            tenant: tenant.to_string(),
            storage_path: storage_path.to_path_buf(),
            queue: queue_tx,
            state: state_tx,
            events,
        })
    }

    pub fn tenant(&self) -> &str {
        &self.tenant
    }

    pub fn storage_path(&self) -> &Path {
        &self.storage_path
    }

    pub fn state(&self) -> ExecutorState {
        *self.state.borrow()
    }

    pub fn is_terminated(&self) -> bool {
        self.state() == ExecutorState::Terminated
    }

    /// Parses an envelope and submits it.
    ///
    /// Malformed envelopes are reported as events and rejected without entering the queue.
    pub async fn execute(&self, envelope: &str) -> Result<Value, ApiError> {
        tracing::info!("[{}] json:{}", self.tenant, envelope);
        match protocol::parse_request(envelope) {
            Ok(request) => self.submit(request).await,
            Err(err) => {
                let param = serde_json::from_str(envelope)
                    .unwrap_or_else(|_| Value::String(envelope.to_string()));
                tracing::warn!("[{}] rejected request: {}", self.tenant, err);
                self.events
                    .emit(ExecutorEvent::failed(RequestId::new(), param, &err));
                Err(err)
            }
        }
    }

    /// Enqueues `request` and waits for its outcome.
    pub async fn submit(&self, request: ApiRequest) -> Result<Value, ApiError> {
        if self.is_terminated() {
            return Err(self.reject(&request));
        }

        let (reply, outcome) = oneshot::channel();
        if let Err(mpsc::error::SendError(pending)) = self.queue.send(Pending { request, reply }) {
            // The worker already closed the queue on its way out.
            return Err(self.reject(&pending.request));
        }

        outcome.await.unwrap_or(Err(ApiError::Canceled))
    }

    /// Subscribes to every event emitted from now on.
    pub fn attach(&self) -> EventSubscription {
        self.events.subscribe()
    }

    /// Stops the worker. Idempotent.
    pub fn terminate(&self) {
        let changed = self.state.send_if_modified(|state| {
            if *state == ExecutorState::Running {
                *state = ExecutorState::Terminated;
                true
            } else {
                false
            }
        });
        if changed {
            tracing::info!("[{}] API executor terminated", self.tenant);
        }
    }

    fn reject(&self, request: &ApiRequest) -> ApiError {
        let err = ApiError::Canceled;
        self.events.emit(ExecutorEvent::failed(
            request.id.clone(),
            request.envelope.clone(),
            &err,
        ));
        err
    }
}

/// The single consumer of an executor's queue.
struct Worker {
    tenant: String,
    store: KeyValueStore,
    queue: mpsc::UnboundedReceiver<Pending>,
    state: watch::Receiver<ExecutorState>,
    events: EventHub,
}

impl Worker {
    async fn run(mut self) {
        loop {
            tokio::select! {
                biased;

                _ = terminated(&mut self.state) => break,

                next = self.queue.recv() => match next {
                    Some(first) => self.drain(first).await,
                    // Every sender is gone: the executor itself was dropped.
                    None => break,
                },
            }
        }

        self.cancel_remaining();
        tracing::debug!("[{}] API worker stopped", self.tenant);
    }

    /// Runs `first` and everything queued behind it, one at a time, until the queue is empty.
    async fn drain(&mut self, first: Pending) {
        let mut next = Some(first);
        while let Some(pending) = next {
            if self.is_terminated() {
                self.cancel(pending);
                return;
            }
            self.execute(pending).await;
            next = self.queue.try_recv().ok();
        }
    }

    async fn execute(&self, pending: Pending) {
        let Pending { request, reply } = pending;
        let id = request.id.clone();
        let param = request.envelope.clone();
        let tenant = self.tenant.clone();
        let store = self.store.clone();
        let events = self.events.clone();

        // Storage is blocking file I/O; keep it off the async workers. The join below is
        // what keeps requests strictly sequential.
        let outcome = tokio::task::spawn_blocking(move || dispatch(&tenant, &store, &events, &request))
            .await
            .unwrap_or_else(|e| Err(panicked(&self.tenant, &self.events, id, param, e)));

        // The caller may have gone away; the request still ran.
        let _ = reply.send(outcome);
    }

    fn cancel(&self, pending: Pending) {
        let err = ApiError::Canceled;
        self.events.emit(ExecutorEvent::failed(
            pending.request.id.clone(),
            pending.request.envelope.clone(),
            &err,
        ));
        let _ = pending.reply.send(Err(err));
    }

    fn cancel_remaining(&mut self) {
        self.queue.close();
        let mut canceled = 0;
        while let Ok(pending) = self.queue.try_recv() {
            self.cancel(pending);
            canceled += 1;
        }
        if canceled > 0 {
            tracing::info!("[{}] canceled {} queued requests", self.tenant, canceled);
        }
    }

    fn is_terminated(&self) -> bool {
        *self.state.borrow() == ExecutorState::Terminated
    }
}

/// Resolves once the executor is terminated or dropped.
async fn terminated(state: &mut watch::Receiver<ExecutorState>) {
    let _ = state
        .wait_for(|state| *state == ExecutorState::Terminated)
        .await;
}

/// Reports a request whose blocking task panicked as an internal error.
pub(crate) fn panicked(
    tenant: &str,
    events: &EventHub,
    id: RequestId,
    param: Value,
    err: tokio::task::JoinError,
) -> ApiError {
    tracing::error!("[{}] request panicked: {}", tenant, err);
    let err = ApiError::Internal(err.to_string());
    events.emit(ExecutorEvent::failed(id, param, &err));
    err
}

/// Executes one request against storage and emits its events.
fn dispatch(
    tenant: &str,
    root: &KeyValueStore,
    events: &EventHub,
    request: &ApiRequest,
) -> Result<Value, ApiError> {
    let store = match &request.namespace {
        Some(name) => root.namespace(name),
        None => root.clone(),
    };
    let op = request.operation.name();

    events.emit(ExecutorEvent::start(request));

    match run_operation(&store, &request.operation) {
        Ok((data, result)) => {
            tracing::info!("[{}] {}: done {}", tenant, op, data);
            events.emit(ExecutorEvent::completed(request, data));
            Ok(result)
        }
        Err(err) => {
            tracing::error!("[{}] {}: {}", tenant, op, err);
            events.emit(ExecutorEvent::failed(
                request.id.clone(),
                request.envelope.clone(),
                &err,
            ));
            Err(err)
        }
    }
}

/// Returns `(event data, result)` for a successful operation.
fn run_operation(store: &KeyValueStore, operation: &Operation) -> Result<(Value, Value), ApiError> {
    match operation {
        Operation::Noop => Ok((Value::Null, Value::Null)),

        Operation::List => {
            let keys = store.list()?;
            Ok((json!(keys), json!(keys)))
        }

        Operation::Write(items) => {
            let keys = store.write(items)?;
            Ok((json!(keys), json!(keys)))
        }

        Operation::Read(keys) => {
            let mut values = Map::new();
            for key in keys {
                values.insert(key.clone(), Value::String(store.read(key)?));
            }
            Ok((json!(keys), Value::Object(values)))
        }

        Operation::Delete(keys) => {
            let mut removed = Vec::new();
            for key in keys {
                if store.delete(key)? {
                    removed.push(key.clone());
                }
            }
            Ok((json!(removed), json!(removed)))
        }
    }
}
