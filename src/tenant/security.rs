//! Per-tenant API tokens.
//!
//! A tenant's pages must echo its token in the `X-Requested-With` header of every API call.
//! Tokens are 256 random bits, issued lazily and kept for the life of the process.

use dashmap::DashMap;
use rand::RngCore;
use std::sync::Arc;
use subtle::ConstantTimeEq;

pub struct TokenIssuer {
    tokens: DashMap<String, String>,
}

impl TokenIssuer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Returns the tenant's token, issuing one on first request.
    pub fn token(&self, tenant: &str) -> String {
        self.tokens
            .entry(tenant.to_string())
            .or_insert_with(|| {
                let mut bytes = [0u8; 32];
                rand::rngs::OsRng.fill_bytes(&mut bytes);
                tracing::debug!("Issued API token for tenant {}", tenant);
                hex::encode(bytes)
            })
            .value()
            .clone()
    }

    /// Checks `candidate` against the tenant's issued token.
    ///
    /// A tenant without an issued token accepts nothing.
    pub fn verify(&self, tenant: &str, candidate: &str) -> bool {
        match self.tokens.get(tenant) {
            Some(token) => bool::from(token.value().as_bytes().ct_eq(candidate.as_bytes())),
            None => false,
        }
    }
}

impl Default for TokenIssuer {
    fn default() -> Self {
        Self {
            tokens: DashMap::new(),
        }
    }
}
