//! # Data Models
//!
//! Response bodies served by the bridge. Nothing here is persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use crate::dispatch::DispatchResult;
use crate::proof::{ProofDetails, ProofOutcome};

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "kommo-bridge".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Successful create-player response
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CreatePlayerResponse {
    pub success: bool,
    pub message: String,
    /// Tenant that handled the webhook
    pub client: String,
    pub username: String,
    pub password: String,
    /// Raw payload returned by the betting backend
    #[schema(value_type = Object)]
    pub player_data: Value,
    #[serde(flatten)]
    pub notifications: DispatchResult,
}

/// Attachment data reported when a message carried proof of payment
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProofData {
    pub lead_id: Option<u64>,
    pub attachment_type: String,
    pub file_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_url: Option<String>,
    pub status_changed: bool,
}

impl ProofData {
    fn new(details: &ProofDetails, status_changed: bool) -> Self {
        Self {
            lead_id: details.lead_id,
            attachment_type: details.attachment_type.clone(),
            file_name: details.file_name.clone(),
            file_url: details.file_url.clone(),
            status_changed,
        }
    }
}

/// Message-received webhook response
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MessageReceivedResponse {
    pub success: bool,
    pub message: String,
    /// Terminal state, e.g. `ignored-outgoing` or `proof-recorded`
    pub outcome: String,
    pub client: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<ProofData>,
}

impl MessageReceivedResponse {
    pub fn from_outcome(client: &str, outcome: &ProofOutcome) -> Self {
        Self {
            success: true,
            message: outcome.message().to_string(),
            outcome: outcome.label().to_string(),
            client: client.to_string(),
            data: outcome
                .details()
                .map(|details| ProofData::new(details, outcome.status_changed())),
        }
    }
}

/// Health-check response for webhook endpoints
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct HealthResponse {
    /// `ok` when the tenant resolves, `error` otherwise
    pub status: String,
    pub client: String,
    pub configured: bool,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl HealthResponse {
    pub fn new(client: &str, configured: bool, ready_message: &str) -> Self {
        Self {
            status: if configured { "ok" } else { "error" }.to_string(),
            client: client.to_string(),
            configured,
            message: if configured {
                ready_message.to_string()
            } else {
                format!("Client '{client}' not found")
            },
            timestamp: Utc::now(),
        }
    }
}
