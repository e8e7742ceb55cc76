//! Tenant Module
//!
//! A tenant is an independently hosted document set with its own port, its own storage
//! directory and its own API executor.
//!
//! ## Submodules
//! - **`host`**: `TenantHost`, the bundle a tenant's listener serves from.
//! - **`security`**: `TokenIssuer`, the per-tenant tokens guarding the API.

pub mod host;
pub mod security;

pub use host::TenantHost;
pub use security::TokenIssuer;

#[cfg(test)]
mod tests;
