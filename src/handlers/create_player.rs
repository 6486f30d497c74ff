//! # Create-Player Webhook
//!
//! Fired by the CRM when a lead reaches the "create account" stage. Creates a
//! player on the tenant's betting backend and delivers the credentials.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, header},
    response::Json,
};
use tracing::{Instrument, info, info_span, warn};

use super::default_tenant;
use crate::backend::PlayerProvisioner;
use crate::contacts::ContactsClient;
use crate::credentials::CredentialGenerator;
use crate::crm::CrmClient;
use crate::dispatch::NotificationDispatcher;
use crate::error::{ApiError, BridgeError};
use crate::lookup;
use crate::models::{CreatePlayerResponse, HealthResponse};
use crate::payload::PayloadExtractor;
use crate::server::AppState;
use crate::tenants::validate_tenant;

const READY_MESSAGE: &str = "Ready to receive webhooks";

/// Create a player for a lead of the given tenant
#[utoipa::path(
    post,
    path = "/api/{client_id}/create-player-from-kommo",
    params(("client_id" = String, Path, description = "Tenant identifier")),
    request_body(
        content = String,
        description = "CRM webhook body, form-encoded or JSON",
        content_type = "application/x-www-form-urlencoded"
    ),
    responses(
        (status = 200, description = "Player created", body = CreatePlayerResponse),
        (status = 400, description = "Lead id missing or unreadable body", body = ApiError),
        (status = 404, description = "Unknown tenant", body = ApiError),
        (status = 500, description = "Invalid tenant configuration or backend failure", body = ApiError)
    ),
    tag = "webhooks"
)]
pub async fn create_player(
    State(state): State<AppState>,
    Path(client_id): Path<String>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<CreatePlayerResponse>, BridgeError> {
    run(&state, &client_id, &headers, &body).await.map(Json)
}

/// Create a player for a lead of the default tenant
#[utoipa::path(
    post,
    path = "/api/create-player-from-kommo",
    request_body(content = String, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Player created", body = CreatePlayerResponse),
        (status = 400, description = "Lead id missing or unreadable body", body = ApiError),
        (status = 404, description = "No default tenant configured", body = ApiError),
        (status = 500, description = "Invalid tenant configuration or backend failure", body = ApiError)
    ),
    tag = "webhooks"
)]
pub async fn create_player_default(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<CreatePlayerResponse>, BridgeError> {
    let client_id = default_tenant(&state)?;
    run(&state, &client_id, &headers, &body).await.map(Json)
}

/// Health check for the create-player webhook
#[utoipa::path(
    get,
    path = "/api/{client_id}/create-player-from-kommo",
    params(("client_id" = String, Path, description = "Tenant identifier")),
    responses((status = 200, description = "Tenant resolution status", body = HealthResponse)),
    tag = "health"
)]
pub async fn create_player_health(
    State(state): State<AppState>,
    Path(client_id): Path<String>,
) -> Json<HealthResponse> {
    Json(HealthResponse::new(
        &client_id,
        state.tenants.contains(&client_id),
        READY_MESSAGE,
    ))
}

/// Health check for the default-tenant create-player webhook
#[utoipa::path(
    get,
    path = "/api/create-player-from-kommo",
    responses((status = 200, description = "Tenant resolution status", body = HealthResponse)),
    tag = "health"
)]
pub async fn create_player_default_health(State(state): State<AppState>) -> Json<HealthResponse> {
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
    headers: &HeaderMap,
    body: &str,
) -> Result<CreatePlayerResponse, BridgeError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());

    create_player_for_tenant(state, client_id, content_type, body)
        .instrument(info_span!("create_player", tenant = %client_id))
        .await
}

/// Full create-player flow for one webhook delivery.
pub async fn create_player_for_tenant(
    state: &AppState,
    client_id: &str,
    content_type: Option<&str>,
    body: &str,
) -> Result<CreatePlayerResponse, BridgeError> {
    let config = &state.config;
    let tenant = state.resolve_tenant(client_id)?;

    let report = validate_tenant(&tenant);
    if !report.valid {
        warn!(errors = ?report.errors, "tenant configuration incomplete");
        return Err(BridgeError::InvalidTenantConfig {
            tenant: tenant.id,
            errors: report.errors,
        });
    }

    let fields = PayloadExtractor::default().extract(body, content_type)?;
    let lead_id = fields.lead_id.ok_or(BridgeError::LeadIdMissing)?;
    info!(lead_id, "create-player webhook received");

    let crm = CrmClient::new(config, &tenant.crm)
        .map_err(|e| BridgeError::Unexpected(e.to_string()))?;
    let fields = lookup::fill_missing(Some(&crm), lead_id, fields).await;

    let credentials = CredentialGenerator::new(config.username_prefix.as_str()).generate();
    info!(lead_id, username = %credentials.username, "creating player");

    let provisioner =
        PlayerProvisioner::new(config, &tenant.backend, tenant.forward_proxy.as_ref())?;
    let player_data = provisioner.create_player(&credentials).await?;

    let mut dispatcher = NotificationDispatcher::new(
        Some(crm),
        tenant.crm.clone(),
        tenant.backend.login_url.clone(),
    );
    if let Some(contacts) = tenant.contacts.clone() {
        match ContactsClient::new(config) {
            Ok(client) => dispatcher = dispatcher.with_contacts(client, contacts),
            Err(err) => warn!(lead_id, step = "contact", error = %err, "contacts client unavailable"),
        }
    }
    let notifications = dispatcher.dispatch(lead_id, &fields, &credentials).await.result();

    Ok(CreatePlayerResponse {
        success: true,
        message: "Player created successfully".to_string(),
        client: tenant.id,
        username: credentials.username,
        password: credentials.password,
        player_data,
        notifications,
    })
}
