//! # API Handlers
//!
//! HTTP endpoint handlers for the bridge. Webhook routes exist in two forms:
//! tenant-scoped (`/api/{client_id}/...`) and legacy un-prefixed routes that
//! serve the configured default tenant.

use crate::error::BridgeError;
use crate::models::ServiceInfo;
use crate::server::AppState;
use axum::response::Json;

pub mod create_player;
pub mod message_received;

/// Root handler that returns basic service information
#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Service information", body = ServiceInfo)
    ),
    tag = "root"
)]
pub async fn root() -> Json<ServiceInfo> {
    Json(ServiceInfo::default())
}

/// Tenant id served by the legacy routes.
fn default_tenant(state: &AppState) -> Result<String, BridgeError> {
    state
        .config
        .default_tenant
        .clone()
        .ok_or_else(|| BridgeError::TenantNotFound {
            tenant: "default".to_string(),
        })
}
