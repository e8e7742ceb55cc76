//! Process configuration.
//!
//! Loaded from `archive-host.json` in the config directory. A default file is written on
//! first start so operators have something to edit.

use crate::ports::SYSTEM_TENANT;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "archive-host.json";
pub const LOCKIN_FILE: &str = "portlockins.json";

pub const DEFAULT_LISTEN_PORT: u16 = 8823;
pub const DEFAULT_FIRST_DOC_PORT: u16 = 58823;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address every tenant listener binds on.
    #[serde(default = "default_bind_host")]
    pub bind_host: IpAddr,

    /// Parent directory of tenant storage, relative to the config directory.
    #[serde(default = "default_api_root")]
    pub api_root: String,

    #[serde(default)]
    pub tenants: Vec<TenantConfig>,

    /// Ports tried per tenant before binding gives up.
    #[serde(default = "default_max_port_probes")]
    pub max_port_probes: u32,

    /// Events buffered per subscriber before the oldest are dropped.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

/// A document tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantConfig {
    pub name: String,

    /// Storage directory; relative paths resolve against the config directory.
    /// Defaults to `<api_root>/<name>`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_host: default_bind_host(),
            api_root: default_api_root(),
            tenants: Vec::new(),
            max_port_probes: default_max_port_probes(),
            event_buffer: default_event_buffer(),
        }
    }
}

fn default_bind_host() -> IpAddr {
    IpAddr::from([127, 0, 0, 1])
}

fn default_api_root() -> String {
    "api".to_string()
}

fn default_max_port_probes() -> u32 {
    1024
}

fn default_event_buffer() -> usize {
    256
}

impl ServerConfig {
    /// Loads `archive-host.json` from `dir`, writing the defaults first if it does not exist.
    pub fn load_or_init(dir: &Path) -> Result<Self> {
        let path = dir.join(CONFIG_FILE);
        if !path.exists() {
            let config = Self::default();
            config.save(&path)?;
            tracing::info!("Wrote default configuration to {:?}", path);
            return Ok(config);
        }
        Self::from_file(&path)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let config: ServerConfig =
            serde_json::from_str(content).with_context(|| "failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("failed to write config file: {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.api_root.is_empty() {
            anyhow::bail!("api_root must not be empty");
        }
        if self.max_port_probes == 0 {
            anyhow::bail!("max_port_probes must be at least 1");
        }
        if self.event_buffer == 0 {
            anyhow::bail!("event_buffer must be at least 1");
        }

        let mut seen = HashSet::new();
        for tenant in &self.tenants {
            if tenant.name.is_empty() {
                anyhow::bail!("tenant name must not be empty");
            }
            if tenant.name == SYSTEM_TENANT {
                anyhow::bail!("tenant name '{}' is reserved", SYSTEM_TENANT);
            }
            if !seen.insert(tenant.name.as_str()) {
                anyhow::bail!("tenant '{}' is configured twice", tenant.name);
            }
        }
        Ok(())
    }

    /// Storage directory of `tenant`, resolved against the config directory.
    pub fn storage_path(&self, config_dir: &Path, tenant: &str) -> PathBuf {
        let configured = self
            .tenants
            .iter()
            .find(|t| t.name == tenant)
            .and_then(|t| t.storage.as_deref());

        match configured {
            Some(storage) => config_dir.join(storage),
            None => config_dir.join(&self.api_root).join(tenant),
        }
    }
}

#[cfg(test)]
mod tests;
