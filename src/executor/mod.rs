//! Tenant API Executor Module
//!
//! Runs each tenant's key/value API requests one at a time against its storage directory.
//!
//! ## Architecture Overview
//! 1. **Parsing**: The raw JSON envelope is validated and turned into a typed `ApiRequest`.
//!    Malformed envelopes and payloads are rejected here, before anything is queued.
//! 2. **Queueing**: The request is pushed onto its executor's FIFO queue and the caller waits
//!    for that request's outcome.
//! 3. **Execution**: A single worker per executor drains the queue in submission order and
//!    applies each request to the tenant's `KeyValueStore`.
//! 4. **Events**: Every step is broadcast to attached subscribers.
//!
//! ## Submodules
//! - **`types`**: Request, operation and state types.
//! - **`protocol`**: Envelope parsing and HTTP DTOs.
//! - **`error`**: The `ApiError` taxonomy.
//! - **`events`**: Event records and the bounded fan-out to subscribers.
//! - **`executor`**: `ApiExecutor` and its worker loop.
//! - **`registry`**: One executor per storage path for the process lifetime.
//! - **`handlers`**: axum handlers exposing the API over HTTP.

pub mod types;
pub mod protocol;
pub mod error;
pub mod events;
pub mod executor;
pub mod registry;
pub mod handlers;

#[cfg(test)]
mod tests;
