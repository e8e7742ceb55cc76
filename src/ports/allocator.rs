//! Port Allocator
//!
//! Gives every tenant its own TCP port and keeps that port stable across restarts.
//!
//! ## Responsibilities
//! - **Ownership**: Every binding is backed by a listener socket owned by the allocator.
//!   A port is never handed to a second tenant while its listener is open.
//! - **Lock-in**: The last port of every tenant is remembered (and persisted). On the next
//!   run a tenant first tries its previous port; ports remembered for other tenants are
//!   skipped while scanning so earlier assignments get first refusal.
//! - **Probing**: New tenants scan forward from a configured start port. The scan is bounded
//!   by `max_probes` bind attempts and ends in [`PortError::Exhausted`].

use super::lockin;

use std::collections::{BTreeMap, HashMap};
use std::io;
use std::net::{IpAddr, TcpListener};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PortError {
    #[error("cannot listen on port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("port {port} is already bound to tenant {owner}")]
    PortInUse { port: u16, owner: String },

    #[error("tenant {tenant} is already bound to port {port}")]
    TenantConflict { tenant: String, port: u16 },

    #[error("tenant {0} has no bound port")]
    NotBound(String),

    #[error("no free port for tenant {tenant} after {probes} attempts starting at {start}")]
    Exhausted {
        tenant: String,
        start: u16,
        probes: u32,
    },
}

pub struct PortAllocator {
    host: IpAddr,
    /// Next candidate of the forward scan. Kept wider than `u16` so the scan can run off the end.
    next_port: u32,
    max_probes: u32,
    /// Tenant whose port comes from process configuration and is never persisted.
    reserved_tenant: String,
    listeners: HashMap<u16, TcpListener>,
    bound: BTreeMap<String, u16>,
    lockin_ports: BTreeMap<String, u16>,
    lockin_tenants: HashMap<u16, String>,
}

impl PortAllocator {
    pub fn new(host: IpAddr, start_port: u16, max_probes: u32, reserved_tenant: &str) -> Self {
        Self {
            host,
            next_port: start_port as u32,
            max_probes,
            reserved_tenant: reserved_tenant.to_string(),
            listeners: HashMap::new(),
            bound: BTreeMap::new(),
            lockin_ports: BTreeMap::new(),
            lockin_tenants: HashMap::new(),
        }
    }

    /// Returns the tenant's port, binding one first if the tenant has none yet.
    ///
    /// Order of preference:
    /// 1. The current binding.
    /// 2. The tenant's lock-in port.
    /// 3. The first bindable port of the forward scan that is not locked in by another tenant.
    pub fn bind(&mut self, tenant: &str) -> Result<u16, PortError> {
        if let Some(&port) = self.bound.get(tenant) {
            return Ok(port);
        }

        if let Some(&port) = self.lockin_ports.get(tenant) {
            match self.open(tenant, port) {
                Ok(()) => {
                    tracing::info!("Tenant {} reclaimed locked-in port {}", tenant, port);
                    return Ok(port);
                }
                Err(e) => {
                    tracing::warn!("Tenant {} lost locked-in port {}: {}", tenant, port, e);
                }
            }
        }

        let start = self.next_port.min(u16::MAX as u32) as u16;
        let mut probes = 0;
        while probes < self.max_probes && self.next_port <= u16::MAX as u32 {
            let port = self.next_port as u16;
            self.next_port += 1;

            if self.listeners.contains_key(&port) {
                continue;
            }
            if let Some(owner) = self.lockin_tenants.get(&port) {
                if owner != tenant {
                    tracing::trace!("Skipping port {} locked in by {}", port, owner);
                    continue;
                }
            }

            probes += 1;
            match self.open(tenant, port) {
                Ok(()) => {
                    tracing::info!("Tenant {} bound to port {}", tenant, port);
                    return Ok(port);
                }
                Err(e) => tracing::debug!("Port {} unavailable: {}", port, e),
            }
        }

        Err(PortError::Exhausted {
            tenant: tenant.to_string(),
            start,
            probes,
        })
    }

    /// Binds a well-known tenant to an explicit port.
    ///
    /// Fails without side effects if the port is already bound or the tenant already has
    /// a different port.
    pub fn register_fixed(&mut self, tenant: &str, port: u16) -> Result<(), PortError> {
        if let Some(&current) = self.bound.get(tenant) {
            if current != port {
                return Err(PortError::TenantConflict {
                    tenant: tenant.to_string(),
                    port: current,
                });
            }
        }
        self.open(tenant, port)?;
        tracing::info!("Tenant {} registered on fixed port {}", tenant, port);
        Ok(())
    }

    /// Tenant recorded for `port` in the lock-in registry.
    ///
    /// Covers restored history as well as live bindings, so a port can be resolved
    /// before its tenant is listening.
    pub fn resolve_tenant(&self, port: u16) -> Option<&str> {
        self.lockin_tenants.get(&port).map(String::as_str)
    }

    pub fn port_of(&self, tenant: &str) -> Option<u16> {
        self.bound.get(tenant).copied()
    }

    /// Currently bound tenants, sorted by name.
    pub fn tenants(&self) -> Vec<String> {
        self.bound.keys().cloned().collect()
    }

    /// The full lock-in registry (tenant -> last known port).
    pub fn lockins(&self) -> &BTreeMap<String, u16> {
        &self.lockin_ports
    }

    /// A handle to the tenant's listener for serving.
    ///
    /// The allocator keeps the original socket; `close_all` releases it.
    pub fn listener(&self, tenant: &str) -> Result<TcpListener, PortError> {
        let port = self
            .port_of(tenant)
            .ok_or_else(|| PortError::NotBound(tenant.to_string()))?;
        let listener = self
            .listeners
            .get(&port)
            .ok_or_else(|| PortError::NotBound(tenant.to_string()))?;
        listener
            .try_clone()
            .map_err(|source| PortError::Bind { port, source })
    }

    /// Writes the live tenant -> port bindings, minus the reserved tenant, to `path`.
    pub fn persist(&self, path: &Path) -> anyhow::Result<()> {
        let ports: BTreeMap<String, u16> = self
            .bound
            .iter()
            .filter(|(tenant, _)| **tenant != self.reserved_tenant)
            .map(|(tenant, port)| (tenant.clone(), *port))
            .collect();

        lockin::save(path, &ports)?;
        tracing::info!("Persisted {} port lock-ins to {:?}", ports.len(), path);
        Ok(())
    }

    /// Loads lock-in history from `path` and returns how many entries were accepted.
    ///
    /// Must run before tenants are bound so that previous assignments get first refusal.
    /// Entries pointing at a port that is already live for a different tenant are dropped.
    pub fn restore(&mut self, path: &Path) -> usize {
        let mut restored = 0;
        for (tenant, port) in lockin::load(path, &self.reserved_tenant) {
            if let Some(owner) = self.owner_of(port) {
                if owner != tenant {
                    tracing::warn!(
                        "Dropping lock-in {}={}: port is live for {}",
                        tenant,
                        port,
                        owner
                    );
                    continue;
                }
            }
            self.record_lockin(&tenant, port);
            restored += 1;
        }
        tracing::info!("Restored {} port lock-ins from {:?}", restored, path);
        restored
    }

    /// Releases every listener. Safe to call more than once.
    pub fn close_all(&mut self) {
        if self.listeners.is_empty() {
            return;
        }
        tracing::info!("Closing {} listeners", self.listeners.len());
        self.listeners.clear();
        self.bound.clear();
    }

    fn owner_of(&self, port: u16) -> Option<&str> {
        if !self.listeners.contains_key(&port) {
            return None;
        }
        self.bound
            .iter()
            .find(|(_, p)| **p == port)
            .map(|(tenant, _)| tenant.as_str())
    }

    fn open(&mut self, tenant: &str, port: u16) -> Result<(), PortError> {
        if let Some(owner) = self.owner_of(port) {
            return Err(PortError::PortInUse {
                port,
                owner: owner.to_string(),
            });
        }

        let listener =
            TcpListener::bind((self.host, port)).map_err(|source| PortError::Bind { port, source })?;
        listener
            .set_nonblocking(true)
            .map_err(|source| PortError::Bind { port, source })?;

        self.listeners.insert(port, listener);
        self.bound.insert(tenant.to_string(), port);
        self.record_lockin(tenant, port);
        Ok(())
    }

    fn record_lockin(&mut self, tenant: &str, port: u16) {
        if let Some(old) = self.lockin_ports.insert(tenant.to_string(), port) {
            if old != port && self.lockin_tenants.get(&old).map(String::as_str) == Some(tenant) {
                self.lockin_tenants.remove(&old);
            }
        }
        if let Some(previous) = self.lockin_tenants.insert(port, tenant.to_string()) {
            if previous != tenant && self.lockin_ports.get(&previous) == Some(&port) {
                self.lockin_ports.remove(&previous);
            }
        }
    }
}
