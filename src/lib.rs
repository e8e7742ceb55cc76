//! Multi-Tenant Document Archive Host Library
//!
//! This library crate defines the core modules of the archive host. It serves as the
//! foundation for the binary executable (`main.rs`).
//!
//! ## Architecture Modules
//! Each tenant gets its own TCP port, its own storage directory and its own serialized
//! request executor:
//!
//! - **`storage`**: The on-disk key/value layer. Keys are hex encoded into file names and
//!   every write is staged and then committed by rename.
//! - **`ports`**: Tenant to port allocation. Owns the listener sockets and remembers each
//!   tenant's port between runs in a lock-in file.
//! - **`executor`**: The per-tenant API engine. Parses request envelopes, runs them one at
//!   a time in submission order and broadcasts lifecycle events to subscribers.
//! - **`tenant`**: Per-tenant session tokens and the bundle a listener serves from.
//! - **`server`**: axum routers and the serving loop for each tenant port.
//! - **`config`**: The process configuration file.

pub mod config;
pub mod executor;
pub mod ports;
pub mod server;
pub mod storage;
pub mod tenant;
