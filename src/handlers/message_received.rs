//! # Message-Received Webhook
//!
//! Fired by the CRM for every chat message on a lead. Incoming image or file
//! attachments are treated as payment receipts.

use axum::{
    extract::{Path, State},
    response::Json,
};
use serde_json::Value;
use tracing::{Instrument, debug, info_span};

use super::default_tenant;
use crate::crm::CrmClient;
use crate::error::{ApiError, BridgeError};
use crate::models::{HealthResponse, MessageReceivedResponse};
use crate::proof::{self, MessageEvent};
use crate::server::AppState;

const READY_MESSAGE: &str = "Message webhook endpoint ready";

/// Process a chat message event for the given tenant
#[utoipa::path(
    post,
    path = "/api/{client_id}/kommo-message-received",
    params(("client_id" = String, Path, description = "Tenant identifier")),
    request_body(
        content = String,
        description = "Message event JSON, optionally wrapped in `message`",
        content_type = "application/json"
    ),
    responses(
        (status = 200, description = "Event processed or ignored", body = MessageReceivedResponse),
        (status = 400, description = "Body is not a JSON message event", body = ApiError),
        (status = 404, description = "Unknown tenant", body = ApiError)
    ),
    tag = "webhooks"
)]
pub async fn message_received(
    State(state): State<AppState>,
    Path(client_id): Path<String>,
    body: String,
) -> Result<Json<MessageReceivedResponse>, BridgeError> {
    run(&state, &client_id, &body).await.map(Json)
}

/// Process a chat message event for the default tenant
#[utoipa::path(
    post,
    path = "/api/kommo-message-received",
    request_body(content = String, content_type = "application/json"),
    responses(
        (status = 200, description = "Event processed or ignored", body = MessageReceivedResponse),
        (status = 400, description = "Body is not a JSON message event", body = ApiError),
        (status = 404, description = "No default tenant configured", body = ApiError)
    ),
    tag = "webhooks"
)]
pub async fn message_received_default(
    State(state): State<AppState>,
    body: String,
) -> Result<Json<MessageReceivedResponse>, BridgeError> {
    let client_id = default_tenant(&state)?;
    run(&state, &client_id, &body).await.map(Json)
}

/// Health check for the message webhook
#[utoipa::path(
    get,
    path = "/api/{client_id}/kommo-message-received",
    params(("client_id" = String, Path, description = "Tenant identifier")),
    responses((status = 200, description = "Tenant resolution status", body = HealthResponse)),
    tag = "health"
)]
pub async fn message_received_health(
    State(state): State<AppState>,
    Path(client_id): Path<String>,
) -> Json<HealthResponse> {
    Json(HealthResponse::new(
        &client_id,
        state.tenants.contains(&client_id),
        READY_MESSAGE,
    ))
}

/// Health check for the default-tenant message webhook
#[utoipa::path(
    get,
    path = "/api/kommo-message-received",
    responses((status = 200, description = "Tenant resolution status", body = HealthResponse)),
    tag = "health"
)]
pub async fn message_received_default_health(
    State(state): State<AppState>,
) -> Json<HealthResponse> {
    let client_id = state.config.default_tenant.clone().unwrap_or_default();
    Json(HealthResponse::new(
        &client_id,
        state.tenants.contains(&client_id),
        READY_MESSAGE,
    ))
}

async fn run(
    state: &AppState,
    client_id: &str,
    body: &str,
) -> Result<MessageReceivedResponse, BridgeError> {
    process_message_for_tenant(state, client_id, body)
        .instrument(info_span!("message_received", tenant = %client_id))
        .await
}

/// Classifies one message event and records proof of payment when found.
pub async fn process_message_for_tenant(
    state: &AppState,
    client_id: &str,
    body: &str,
) -> Result<MessageReceivedResponse, BridgeError> {
    let tenant = state.resolve_tenant(client_id)?;

    let payload: Value =
        serde_json::from_str(body).map_err(|e| BridgeError::InvalidPayload(e.to_string()))?;
    let event =
        MessageEvent::from_json(&payload).map_err(|e| BridgeError::InvalidPayload(e.to_string()))?;
    debug!(
        lead_id = ?event.lead_id(),
        message_type = ?event.message_type,
        attachments = event.attachments.len(),
        "message event received"
    );

    // Ignored events never need a client; a missing one only matters for proofs.
    let crm = CrmClient::new(&state.config, &tenant.crm).ok();
    let outcome = proof::process(crm.as_ref(), tenant.crm.proof_status_id, &event).await;

    Ok(MessageReceivedResponse::from_outcome(&tenant.id, &outcome))
}
