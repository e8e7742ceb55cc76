//! API Envelope Protocol
//!
//! Parses the JSON envelope clients send and defines the HTTP DTOs of the tenant API.
//!
//! An envelope looks like:
//!
//! ```json
//! { "version": "1", "api": "write", "name": "notes", "items": { "a": "1" } }
//! ```
//!
//! - `version` must be the string `"1"`.
//! - `api` names the operation, case-insensitive.
//! - `name` optionally selects a private namespace.
//! - `items` is a key -> string object for `write`, and an array of keys for `read`/`delete`.

use super::error::ApiError;
use super::types::*;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

pub const ENDPOINT_API: &str = "/api";
pub const ENDPOINT_SESSION: &str = "/api/session";
pub const ENDPOINT_TENANTS: &str = "/tenants";
pub const ENDPOINT_TENANT_BY_PORT: &str = "/tenants/:port";

/// Header that must carry the tenant's token on every API call.
pub const TOKEN_HEADER: &str = "X-Requested-With";

pub const API_VERSION: &str = "1";

/// Parses raw envelope text into a request.
pub fn parse_request(text: &str) -> Result<ApiRequest, ApiError> {
    let envelope: Value = serde_json::from_str(text)
        .map_err(|e| ApiError::Protocol(format!("malformed json: {}", e)))?;
    parse_envelope(envelope)
}

/// Validates an envelope and builds the typed request.
///
/// Nothing is touched on disk here, so every rejection is free of side effects.
pub fn parse_envelope(envelope: Value) -> Result<ApiRequest, ApiError> {
    let object = envelope
        .as_object()
        .ok_or_else(|| ApiError::Protocol("not object".to_string()))?;

    let version = object
        .get("version")
        .and_then(Value::as_str)
        .ok_or_else(|| ApiError::Protocol("invalid version".to_string()))?;
    if version != API_VERSION {
        return Err(ApiError::Protocol(format!("unknown version {}", version)));
    }

    let api = object
        .get("api")
        .and_then(Value::as_str)
        .ok_or_else(|| ApiError::Protocol("no api".to_string()))?
        .to_lowercase();

    let namespace = match object.get("name") {
        None | Some(Value::Null) => None,
        Some(Value::String(name)) => Some(name.clone()),
        Some(_) => return Err(ApiError::Protocol("name must be a string".to_string())),
    };

    let items = object.get("items");
    let operation = match api.as_str() {
        "noop" => Operation::Noop,
        "list" => Operation::List,
        "write" => Operation::Write(write_items(items)?),
        "read" => Operation::Read(key_items(&api, items)?),
        "delete" => Operation::Delete(key_items(&api, items)?),
        _ => return Err(ApiError::UnknownOperation(api)),
    };

    Ok(ApiRequest {
        id: RequestId::new(),
        operation,
        namespace,
        envelope,
    })
}

fn write_items(items: Option<&Value>) -> Result<BTreeMap<String, String>, ApiError> {
    let object = items
        .and_then(Value::as_object)
        .ok_or_else(|| ApiError::Validation("write items must be an object".to_string()))?;

    object
        .iter()
        .map(|(key, value)| match value {
            Value::String(text) => Ok((key.clone(), text.clone())),
            _ => Err(ApiError::Validation(format!("key={} is not string", key))),
        })
        .collect()
}

fn key_items(api: &str, items: Option<&Value>) -> Result<Vec<String>, ApiError> {
    let array = items
        .and_then(Value::as_array)
        .ok_or_else(|| ApiError::Validation(format!("{} items must be an array", api)))?;

    array
        .iter()
        .map(|item| {
            item.as_str()
                .map(str::to_string)
                .ok_or_else(|| ApiError::Validation(format!("{} key {} is not string", api, item)))
        })
        .collect()
}

// --- HTTP Data Transfer Objects ---

/// Form body of `POST /api`. `data` holds the envelope text.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ApiForm {
    #[serde(default)]
    pub data: String,
}

/// Body returned when a request fails.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

impl From<&ApiError> for ErrorBody {
    fn from(err: &ApiError) -> Self {
        Self {
            error: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionResponse {
    pub tenant: String,
    pub token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ResolveTenantResponse {
    pub port: u16,
    pub tenant: Option<String>,
}
