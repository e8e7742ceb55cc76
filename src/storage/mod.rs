//! Tenant Storage Module
//!
//! Persists a tenant's key/value data on local disk.
//!
//! ## Core Concepts
//! - **Codec**: Keys are mapped to filenames with a lossless hex encoding, so arbitrary
//!   client strings can never address files outside the tenant's directory.
//! - **Stage/Commit**: Batch writes are staged to temporary files and renamed into place
//!   only after every value was written, so `list` and `read` never observe half-written data.
//! - **Namespaces**: A request may select a private sub-directory under the tenant root.
//!
//! The store performs no locking of its own. Every tenant directory is mutated by exactly
//! one executor worker (see [`crate::executor`]).

pub mod codec;
pub mod store;

pub use store::{KeyValueStore, StorageError};
