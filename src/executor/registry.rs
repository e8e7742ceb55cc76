//! Executor Registry
//!
//! Maps a storage path to the one `ApiExecutor` allowed to mutate it. The registry is
//! created once at process start and handed to every component that needs an executor;
//! repeated lookups for the same path return the same instance for the life of the process.

use super::executor::ApiExecutor;
use super::types::ExecutorConfig;

use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub struct ExecutorRegistry {
    executors: DashMap<PathBuf, Arc<ApiExecutor>>,
    config: ExecutorConfig,
}

impl ExecutorRegistry {
    /// Creates a new, empty registry.
    pub fn new(config: ExecutorConfig) -> Arc<Self> {
        Arc::new(Self {
            executors: DashMap::new(),
            config,
        })
    }

    /// Returns the executor for `storage_path`, spawning it on first use.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn get_or_create(&self, tenant: &str, storage_path: &Path) -> Arc<ApiExecutor> {
        let key = registry_key(storage_path);
        self.executors
            .entry(key.clone())
            .or_insert_with(|| ApiExecutor::spawn(tenant, &key, &self.config))
            .value()
            .clone()
    }

    pub fn get(&self, storage_path: &Path) -> Option<Arc<ApiExecutor>> {
        self.executors
            .get(&registry_key(storage_path))
            .map(|entry| entry.value().clone())
    }

    /// Terminates every executor. Used at shutdown; the instances stay registered.
    pub fn terminate_all(&self) {
        for entry in self.executors.iter() {
            entry.value().terminate();
        }
        tracing::info!("Terminated {} API executors", self.executors.len());
    }

    /// Returns the number of registered executors.
    pub fn len(&self) -> usize {
        self.executors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }
}

/// Absolute, `.`-free form of `path`, so every spelling of a directory maps to one executor.
fn registry_key(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

impl Default for ExecutorRegistry {
    fn default() -> Self {
        Self {
            executors: DashMap::new(),
            config: ExecutorConfig::default(),
        }
    }
}
