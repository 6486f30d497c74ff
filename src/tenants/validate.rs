//! Minimum-field check for a resolved tenant.

use serde::Serialize;
use utoipa::ToSchema;

use super::TenantConfig;

pub const MISSING_CRM_TOKEN: &str = "KOMMO access_token is missing";
pub const MISSING_CRM_SUBDOMAIN: &str = "KOMMO subdomain is missing";
pub const MISSING_BACKEND_TOKEN: &str = "Backend API token is missing";
pub const MISSING_BACKEND_URL: &str = "Backend API URL is missing";

/// Outcome of [`validate_tenant`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
}

/// Checks the four fields every create-player request needs.
pub fn validate_tenant(config: &TenantConfig) -> ValidationReport {
    let checks = [
        (config.crm.access_token.is_empty(), MISSING_CRM_TOKEN),
        (config.crm.subdomain.is_empty(), MISSING_CRM_SUBDOMAIN),
        (config.backend.api_token.is_empty(), MISSING_BACKEND_TOKEN),
        (config.backend.api_url.is_empty(), MISSING_BACKEND_URL),
    ];

    let errors: Vec<String> = checks
        .into_iter()
        .filter(|(missing, _)| *missing)
        .map(|(_, message)| message.to_string())
        .collect();

    ValidationReport {
        valid: errors.is_empty(),
        errors,
    }
}
