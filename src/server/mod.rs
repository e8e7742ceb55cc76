//! HTTP Server Module
//!
//! Builds the axum routers served on each tenant's port and runs them on the listeners
//! owned by the `PortAllocator`.
//!
//! ## Routes
//! - Every tenant: `POST /api`, `GET /api/session`.
//! - The system tenant additionally exposes `GET /tenants` and `GET /tenants/:port`.

use crate::executor::handlers::{
    handle_api, handle_list_tenants, handle_resolve_tenant, handle_session,
};
use crate::executor::protocol::{
    ENDPOINT_API, ENDPOINT_SESSION, ENDPOINT_TENANTS, ENDPOINT_TENANT_BY_PORT,
};
use crate::ports::SharedPorts;
use crate::tenant::TenantHost;

use axum::{
    Router,
    extract::Extension,
    routing::{get, post},
};
use std::sync::Arc;

/// Routes served on a regular tenant's port.
pub fn tenant_router(host: Arc<TenantHost>) -> Router {
    Router::new()
        .route(ENDPOINT_API, post(handle_api))
        .route(ENDPOINT_SESSION, get(handle_session))
        .layer(Extension(host))
}

/// Routes served on the system tenant's port.
pub fn system_router(host: Arc<TenantHost>, ports: SharedPorts) -> Router {
    Router::new()
        .route(ENDPOINT_API, post(handle_api))
        .route(ENDPOINT_SESSION, get(handle_session))
        .route(ENDPOINT_TENANTS, get(handle_list_tenants))
        .route(ENDPOINT_TENANT_BY_PORT, get(handle_resolve_tenant))
        .layer(Extension(host))
        .layer(Extension(ports))
}

/// Serves `app` on an already bound listener until the task is dropped or the server fails.
pub async fn serve(listener: std::net::TcpListener, app: Router) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::from_std(listener)?;
    if let Ok(addr) = listener.local_addr() {
        tracing::info!("HTTP server listening on {}", addr);
    }
    axum::serve(listener, app).await
}
