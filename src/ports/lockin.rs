//! Lock-in file: the tenant -> port history kept between runs.
//!
//! The file is a flat JSON object, e.g. `{"manuals": 58823, "specs": 58824}`.
//! Reading is best-effort: a missing or unreadable file means "no history".

use anyhow::{Context, Result};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Reads the lock-in map from `path`, skipping `reserved` and malformed entries.
pub fn load(path: &Path, reserved: &str) -> BTreeMap<String, u16> {
    let mut ports = BTreeMap::new();

    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => {
            tracing::info!("No port lock-in history at {:?} ({})", path, e);
            return ports;
        }
    };

    let object: Map<String, Value> = match serde_json::from_str(&text) {
        Ok(object) => object,
        Err(e) => {
            tracing::warn!("Ignoring unreadable lock-in file {:?}: {}", path, e);
            return ports;
        }
    };

    for (tenant, value) in object {
        if tenant == reserved {
            continue;
        }
        match value.as_f64().and_then(port_from_number) {
            Some(port) => {
                ports.insert(tenant, port);
            }
            None => tracing::warn!("Ignoring lock-in entry {}={}", tenant, value),
        }
    }

    ports
}

/// Writes `ports` to `path` through a temporary sibling and a rename.
pub fn save(path: &Path, ports: &BTreeMap<String, u16>) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {:?}", parent))?;
        }
    }

    let text = serde_json::to_string_pretty(ports)?;
    let staged = path.with_extension("json.tmp");
    fs::write(&staged, text).with_context(|| format!("Failed to write {:?}", staged))?;
    fs::rename(&staged, path).with_context(|| format!("Failed to replace {:?}", path))?;

    Ok(())
}

fn port_from_number(n: f64) -> Option<u16> {
    if n.fract() == 0.0 && n >= 1.0 && n <= u16::MAX as f64 {
        Some(n as u16)
    } else {
        None
    }
}
