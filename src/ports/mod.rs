//! Tenant Port Module
//!
//! Every tenant is served on its own TCP port. This module owns the listener sockets and the
//! tenant <-> port bookkeeping.
//!
//! ## Submodules
//! - **`allocator`**: `PortAllocator`, binding tenants to ports and owning the listeners.
//! - **`lockin`**: The JSON file remembering each tenant's last port between runs.

pub mod allocator;
pub mod lockin;

pub use allocator::{PortAllocator, PortError};

use parking_lot::RwLock;
use std::sync::Arc;

/// The allocator as shared between startup, shutdown and the system tenant's endpoints.
pub type SharedPorts = Arc<RwLock<PortAllocator>>;

/// Name of the tenant serving the process-level endpoints.
///
/// Its port comes from configuration and is never written to the lock-in file.
pub const SYSTEM_TENANT: &str = "system";
