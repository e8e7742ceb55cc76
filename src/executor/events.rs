//! Execution events and their fan-out to subscribers.
//!
//! Every subscriber gets its own bounded buffer (a `tokio::sync::broadcast` channel).
//! A subscriber that falls more than `capacity` events behind loses the oldest ones and
//! is told how many it missed; the worker never waits on a subscriber.

use super::error::ApiError;
use super::types::{ApiRequest, Operation, RequestId};

use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// A request was dequeued and is about to run.
    Start,
    Noop,
    List,
    Write,
    Read,
    Delete,
    /// The request failed; `data` carries the message.
    Error,
    /// The request was still queued when the executor terminated.
    Canceled,
}

impl EventKind {
    fn completed(operation: &Operation) -> Self {
        match operation {
            Operation::Noop => EventKind::Noop,
            Operation::List => EventKind::List,
            Operation::Write(_) => EventKind::Write,
            Operation::Read(_) => EventKind::Read,
            Operation::Delete(_) => EventKind::Delete,
        }
    }
}

/// One record of a request's lifecycle.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutorEvent {
    pub kind: EventKind,
    pub request_id: RequestId,
    /// The request envelope as submitted.
    pub param: Value,
    pub data: Value,
}

impl ExecutorEvent {
    pub fn start(request: &ApiRequest) -> Self {
        Self {
            kind: EventKind::Start,
            request_id: request.id.clone(),
            param: request.envelope.clone(),
            data: Value::String(request.operation.name().to_string()),
        }
    }

    pub fn completed(request: &ApiRequest, data: Value) -> Self {
        Self {
            kind: EventKind::completed(&request.operation),
            request_id: request.id.clone(),
            param: request.envelope.clone(),
            data,
        }
    }

    pub fn failed(request_id: RequestId, param: Value, err: &ApiError) -> Self {
        let kind = match err {
            ApiError::Canceled => EventKind::Canceled,
            _ => EventKind::Error,
        };
        Self {
            kind,
            request_id,
            param,
            data: Value::String(err.to_string()),
        }
    }
}

/// Sending side shared by the executor and its worker.
#[derive(Debug, Clone)]
pub struct EventHub {
    sender: broadcast::Sender<ExecutorEvent>,
}

impl EventHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Delivers `event` to every current subscriber. Never blocks.
    pub fn emit(&self, event: ExecutorEvent) {
        // An error only means nobody is attached.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> EventSubscription {
        EventSubscription {
            receiver: self.sender.subscribe(),
            missed: 0,
        }
    }
}

/// A forward-only view of the events emitted after `attach`.
pub struct EventSubscription {
    receiver: broadcast::Receiver<ExecutorEvent>,
    missed: u64,
}

impl EventSubscription {
    /// Waits for the next event. Returns `None` once the executor is gone.
    pub async fn next(&mut self) -> Option<ExecutorEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(skipped)) => self.lagged(skipped),
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Next buffered event, without waiting.
    pub fn try_next(&mut self) -> Option<ExecutorEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(TryRecvError::Lagged(skipped)) => self.lagged(skipped),
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }

    /// How many events were dropped because this subscriber fell behind.
    pub fn missed(&self) -> u64 {
        self.missed
    }

    fn lagged(&mut self, skipped: u64) {
        tracing::warn!("Event subscriber fell behind, dropped {} oldest events", skipped);
        self.missed += skipped;
    }
}
