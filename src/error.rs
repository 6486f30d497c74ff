//! # Error Handling
//!
//! Unified error responses for the bridge. Every failure leaves the service
//! as `{"success": false, "error": ..., "code": ...}` with the request's
//! trace id attached, so webhook senders and operators see the same shape.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use utoipa::ToSchema;

use crate::backend::BackendError;
use crate::payload::PayloadError;
use crate::telemetry;

/// Longest upstream body fragment carried in errors and logs.
pub const SNIPPET_LIMIT: usize = 200;

/// Truncates an upstream response body for inclusion in errors.
pub fn body_snippet(body: &str) -> String {
    if body.chars().count() > SNIPPET_LIMIT {
        let truncated: String = body.chars().take(SNIPPET_LIMIT).collect();
        format!("{truncated}...")
    } else {
        body.to_string()
    }
}

/// Error body returned by every endpoint
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ApiError {
    /// HTTP status code for the response
    #[serde(skip)]
    pub status: StatusCode,
    /// Always `false`
    pub success: bool,
    /// Human-readable error message
    #[serde(rename = "error")]
    pub message: Box<str>,
    /// Error code for programmatic handling
    pub code: Box<str>,
    /// Additional error details (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub details: Option<Box<serde_json::Value>>,
    /// Correlation trace ID for debugging (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<Box<str>>,
}

impl ApiError {
    /// Create a new API error with the given status code and message
    pub fn new(status: StatusCode, code: &str, message: &str) -> Self {
        Self {
            status,
            success: false,
            message: message.into(),
            code: code.into(),
            details: None,
            trace_id: telemetry::current_trace_id().map(String::into_boxed_str),
        }
    }

    /// Add details to the error
    pub fn with_details<V: Into<serde_json::Value>>(mut self, details: V) -> Self {
        self.details = Some(Box::new(details.into()));
        self
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response = (self.status, Json(&self)).into_response();
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        response
    }
}

/// Request-level failures of the webhook flows.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Client '{tenant}' not found")]
    TenantNotFound { tenant: String },

    #[error("Invalid configuration")]
    InvalidTenantConfig { tenant: String, errors: Vec<String> },

    #[error("Lead ID not found in payload")]
    LeadIdMissing,

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Backend returned HTML - IP might be blocked")]
    BackendBlocked { status: u16, body: String },

    #[error("Backend error: {status}")]
    BackendRejected { status: u16, body: String },

    #[error("Backend returned malformed JSON: {message}")]
    BackendMalformedResponse { message: String, body: String },

    #[error("{0}")]
    Unexpected(String),
}

impl BridgeError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            BridgeError::TenantNotFound { .. } => StatusCode::NOT_FOUND,
            BridgeError::LeadIdMissing | BridgeError::InvalidPayload(_) => StatusCode::BAD_REQUEST,
            BridgeError::InvalidTenantConfig { .. }
            | BridgeError::BackendBlocked { .. }
            | BridgeError::BackendRejected { .. }
            | BridgeError::BackendMalformedResponse { .. }
            | BridgeError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            BridgeError::TenantNotFound { .. } => "TENANT_NOT_FOUND",
            BridgeError::InvalidTenantConfig { .. } => "INVALID_TENANT_CONFIG",
            BridgeError::LeadIdMissing => "LEAD_ID_MISSING",
            BridgeError::InvalidPayload(_) => "INVALID_PAYLOAD",
            BridgeError::BackendBlocked { .. } => "BACKEND_BLOCKED",
            BridgeError::BackendRejected { .. } => "BACKEND_REJECTED",
            BridgeError::BackendMalformedResponse { .. } => "BACKEND_MALFORMED_RESPONSE",
            BridgeError::Unexpected(_) => "INTERNAL_SERVER_ERROR",
        }
    }
}

impl From<PayloadError> for BridgeError {
    fn from(error: PayloadError) -> Self {
        BridgeError::InvalidPayload(error.to_string())
    }
}

impl From<BackendError> for BridgeError {
    fn from(error: BackendError) -> Self {
        match error {
            BackendError::Blocked { status, body } => BridgeError::BackendBlocked { status, body },
            BackendError::Rejected { status, body } => {
                BridgeError::BackendRejected { status, body }
            }
            BackendError::MalformedResponse { message, body } => {
                BridgeError::BackendMalformedResponse { message, body }
            }
            other => BridgeError::Unexpected(other.to_string()),
        }
    }
}

impl From<BridgeError> for ApiError {
    fn from(error: BridgeError) -> Self {
        let api_error = ApiError::new(error.status_code(), error.error_code(), &error.to_string());

        match error {
            BridgeError::InvalidTenantConfig { errors, .. } => api_error.with_details(json!(errors)),
            BridgeError::BackendBlocked { status, body }
            | BridgeError::BackendRejected { status, body } => {
                api_error.with_details(json!({ "status": status, "body_snippet": body }))
            }
            BridgeError::BackendMalformedResponse { body, .. } => {
                api_error.with_details(json!({ "status": 200, "body_snippet": body }))
            }
            BridgeError::Unexpected(ref message) => {
                tracing::error!(error = %message, "unexpected failure");
                api_error
            }
            _ => api_error,
        }
    }
}

impl IntoResponse for BridgeError {
    fn into_response(self) -> Response {
        ApiError::from(self).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_serializes_bridge_shape() {
        let error = ApiError::new(StatusCode::BAD_REQUEST, "LEAD_ID_MISSING", "missing");
        let body = serde_json::to_value(&error).unwrap();

        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "missing");
        assert_eq!(body["code"], "LEAD_ID_MISSING");
        assert!(body.get("details").is_none());
        assert!(body.get("status").is_none());
    }

    #[test]
    fn test_status_mapping() {
        let cases = [
            (
                BridgeError::TenantNotFound {
                    tenant: "x".to_string(),
                },
                StatusCode::NOT_FOUND,
            ),
            (BridgeError::LeadIdMissing, StatusCode::BAD_REQUEST),
            (
                BridgeError::InvalidPayload("bad".to_string()),
                StatusCode::BAD_REQUEST,
            ),
            (
                BridgeError::InvalidTenantConfig {
                    tenant: "x".to_string(),
                    errors: vec![],
                },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                BridgeError::BackendBlocked {
                    status: 200,
                    body: String::new(),
                },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                BridgeError::Unexpected("boom".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.status_code(), expected, "{error:?}");
        }
    }

    #[test]
    fn test_tenant_not_found_message_names_tenant() {
        let api: ApiError = BridgeError::TenantNotFound {
            tenant: "ghost".to_string(),
        }
        .into();
        assert_eq!(api.code, Box::from("TENANT_NOT_FOUND"));
        assert_eq!(api.message, Box::from("Client 'ghost' not found"));
    }

    #[test]
    fn test_invalid_config_lists_errors_in_details() {
        let api: ApiError = BridgeError::InvalidTenantConfig {
            tenant: "acme".to_string(),
            errors: vec!["Backend API token is missing".to_string()],
        }
        .into();
        assert_eq!(
            api.details,
            Some(Box::new(json!(["Backend API token is missing"])))
        );
    }

    #[test]
    fn test_backend_rejection_embeds_upstream_status() {
        let api: ApiError = BridgeError::from(BackendError::Rejected {
            status: 503,
            body: "down".to_string(),
        })
        .into();
        assert_eq!(api.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(api.code, Box::from("BACKEND_REJECTED"));
        let details = api.details.unwrap();
        assert_eq!(details["status"], 503);
        assert_eq!(details["body_snippet"], "down");
    }

    #[test]
    fn test_body_snippet_truncates() {
        let long = "é".repeat(300);
        let snippet = body_snippet(&long);
        assert_eq!(snippet.chars().count(), SNIPPET_LIMIT + 3);
        assert!(snippet.ends_with("..."));
        assert_eq!(body_snippet("short"), "short");
    }

    #[test]
    fn test_content_type_header() {
        let response = ApiError::new(StatusCode::NOT_FOUND, "TENANT_NOT_FOUND", "x").into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "application/json"
        );
    }
}
