use super::security::TokenIssuer;
use crate::executor::executor::ApiExecutor;

use std::path::Path;
use std::sync::Arc;

/// Everything one tenant's listener needs to serve requests.
pub struct TenantHost {
    name: String,
    port: u16,
    executor: Arc<ApiExecutor>,
    tokens: Arc<TokenIssuer>,
}

impl TenantHost {
    pub fn new(
        name: &str,
        port: u16,
        executor: Arc<ApiExecutor>,
        tokens: Arc<TokenIssuer>,
    ) -> Arc<Self> {
        // Issue eagerly so the token exists before the first page is served.
        tokens.token(name);
        Arc::new(Self {
            name: name.to_string(),
            port,
            executor,
            tokens,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn storage_path(&self) -> &Path {
        self.executor.storage_path()
    }

    pub fn executor(&self) -> &Arc<ApiExecutor> {
        &self.executor
    }

    pub fn token(&self) -> String {
        self.tokens.token(&self.name)
    }

    pub fn verify_token(&self, candidate: &str) -> bool {
        self.tokens.verify(&self.name, candidate)
    }
}
