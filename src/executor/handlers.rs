use super::error::ApiError;
use super::protocol::*;
use crate::ports::SharedPorts;
use crate::tenant::TenantHost;

use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Form, Json, extract::Path};
use std::collections::BTreeMap;
use std::sync::Arc;

fn status_for(err: &ApiError) -> StatusCode {
    match err {
        ApiError::Protocol(_) | ApiError::Validation(_) | ApiError::UnknownOperation(_) => {
            StatusCode::BAD_REQUEST
        }
        ApiError::Storage(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        ApiError::Canceled => StatusCode::SERVICE_UNAVAILABLE,
    }
}

pub async fn handle_api(
    Extension(host): Extension<Arc<TenantHost>>,
    headers: HeaderMap,
    Form(form): Form<ApiForm>,
) -> Response {
    let token = headers
        .get(TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    if !host.verify_token(token) {
        tracing::warn!("[{}] API call with invalid token", host.name());
        return StatusCode::UNAUTHORIZED.into_response();
    }

    // Pages send an empty request to check that their session is still valid.
    if form.data.is_empty() {
        return StatusCode::OK.into_response();
    }

    match host.executor().execute(&form.data).await {
        Ok(result) => (StatusCode::OK, Json(result)).into_response(),
        Err(e) => {
            tracing::debug!("[{}] API call failed: {}", host.name(), e);
            (status_for(&e), Json(ErrorBody::from(&e))).into_response()
        }
    }
}

pub async fn handle_session(
    Extension(host): Extension<Arc<TenantHost>>,
) -> (StatusCode, Json<SessionResponse>) {
    (
        StatusCode::OK,
        Json(SessionResponse {
            tenant: host.name().to_string(),
            token: host.token(),
        }),
    )
}

pub async fn handle_list_tenants(
    Extension(ports): Extension<SharedPorts>,
) -> (StatusCode, Json<BTreeMap<String, u16>>) {
    let lockins = ports.read().lockins().clone();
    (StatusCode::OK, Json(lockins))
}

pub async fn handle_resolve_tenant(
    Extension(ports): Extension<SharedPorts>,
    Path(port): Path<u16>,
) -> (StatusCode, Json<ResolveTenantResponse>) {
    let tenant = ports.read().resolve_tenant(port).map(str::to_string);
    let status = if tenant.is_some() {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    };
    (status, Json(ResolveTenantResponse { port, tenant }))
}
