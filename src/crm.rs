//! Kommo CRM REST client
//!
//! Thin wrapper over the `api/v4` endpoints the bridge touches: lead and
//! contact reads, custom-field and status updates, notes, talk messages and
//! tasks. Every call is bearer-authenticated with the tenant's long-lived
//! access token.

use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::debug;

use crate::config::AppConfig;
use crate::error::body_snippet;
use crate::tenants::CrmSettings;

/// Task type "follow-up" in a stock Kommo account.
pub const FOLLOW_UP_TASK_TYPE: u64 = 1;

/// CRM client errors
#[derive(Debug, Error)]
pub enum CrmError {
    #[error("CRM credentials are not configured")]
    MissingCredentials,

    #[error("failed to build CRM HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("CRM request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("CRM returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid CRM response: {0}")]
    InvalidResponse(String),
}

/// Lead resource, only the parts the bridge reads.
#[derive(Debug, Clone, Deserialize)]
pub struct Lead {
    pub id: u64,
    #[serde(default)]
    pub status_id: Option<u64>,
    #[serde(default, rename = "_embedded")]
    pub embedded: Option<LeadEmbedded>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LeadEmbedded {
    #[serde(default)]
    pub contacts: Vec<EntityRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EntityRef {
    pub id: u64,
}

impl Lead {
    /// First linked contact, which Kommo treats as the main one.
    pub fn primary_contact_id(&self) -> Option<u64> {
        self.embedded
            .as_ref()
            .and_then(|e| e.contacts.first())
            .map(|c| c.id)
    }
}

/// Contact resource with its custom fields.
#[derive(Debug, Clone, Deserialize)]
pub struct Contact {
    pub id: u64,
    #[serde(default)]
    pub name: Option<String>,
    // Kommo sends `null` rather than an empty list.
    #[serde(default)]
    pub custom_fields_values: Option<Vec<CustomFieldValue>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CustomFieldValue {
    #[serde(default)]
    pub field_id: Option<u64>,
    #[serde(default)]
    pub field_name: Option<String>,
    #[serde(default)]
    pub field_code: Option<String>,
    #[serde(default)]
    pub values: Vec<FieldValue>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FieldValue {
    #[serde(default)]
    pub value: Value,
}

impl Contact {
    pub fn email(&self) -> Option<String> {
        self.field_by_code_or_name("EMAIL", "Email")
    }

    pub fn phone(&self) -> Option<String> {
        self.field_by_code_or_name("PHONE", "Phone")
    }

    /// First value of the first custom field whose code or display name matches.
    fn field_by_code_or_name(&self, code: &str, name: &str) -> Option<String> {
        let field = self.custom_fields_values.as_deref()?.iter().find(|f| {
            f.field_code
                .as_deref()
                .is_some_and(|c| c.eq_ignore_ascii_case(code))
                || f.field_name
                    .as_deref()
                    .is_some_and(|n| n.eq_ignore_ascii_case(name))
        })?;

        match &field.values.first()?.value {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// Client bound to one tenant's CRM account.
#[derive(Debug, Clone)]
pub struct CrmClient {
    http: Client,
    api_base: String,
    access_token: String,
}

impl CrmClient {
    /// Builds a client for `settings`, failing when credentials are absent.
    pub fn new(config: &AppConfig, settings: &CrmSettings) -> Result<Self, CrmError> {
        if !settings.has_credentials() {
            return Err(CrmError::MissingCredentials);
        }

        let http = Client::builder()
            .timeout(config.crm_timeout())
            .build()
            .map_err(CrmError::Client)?;

        Ok(Self::with_http_client(
            http,
            &config.crm_origin(&settings.subdomain),
            &settings.access_token,
        ))
    }

    /// Uses an existing HTTP client against `origin` (e.g. `https://acme.kommo.com`).
    pub fn with_http_client(http: Client, origin: &str, access_token: &str) -> Self {
        Self {
            http,
            api_base: format!("{}/api/v4", origin.trim_end_matches('/')),
            access_token: access_token.to_string(),
        }
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, CrmError> {
        let response = request.bearer_auth(&self.access_token).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CrmError::Status {
                status: status.as_u16(),
                body: body_snippet(&body),
            });
        }
        Ok(response)
    }

    /// `GET /leads/{id}?with=contacts`
    pub async fn get_lead_with_contacts(&self, lead_id: u64) -> Result<Lead, CrmError> {
        let request = self
            .http
            .get(self.url(&format!("/leads/{lead_id}")))
            .query(&[("with", "contacts")]);
        let response = self.send(request).await?;
        response
            .json::<Lead>()
            .await
            .map_err(|e| CrmError::InvalidResponse(format!("lead {lead_id}: {e}")))
    }

    /// `GET /contacts/{id}`
    pub async fn get_contact(&self, contact_id: u64) -> Result<Contact, CrmError> {
        let request = self.http.get(self.url(&format!("/contacts/{contact_id}")));
        let response = self.send(request).await?;
        response
            .json::<Contact>()
            .await
            .map_err(|e| CrmError::InvalidResponse(format!("contact {contact_id}: {e}")))
    }

    /// Sets text custom fields on a lead in one `PATCH /leads/{id}`.
    pub async fn update_lead_custom_fields(
        &self,
        lead_id: u64,
        fields: &[(u64, &str)],
    ) -> Result<(), CrmError> {
        let values: Vec<Value> = fields
            .iter()
            .map(|(field_id, value)| {
                json!({
                    "field_id": field_id,
                    "values": [{ "value": value }],
                })
            })
            .collect();

        let request = self
            .http
            .patch(self.url(&format!("/leads/{lead_id}")))
            .json(&json!({ "custom_fields_values": values }));
        self.send(request).await?;
        debug!(lead_id, fields = fields.len(), "lead custom fields updated");
        Ok(())
    }

    /// Moves a lead to another pipeline status.
    pub async fn update_lead_status(&self, lead_id: u64, status_id: u64) -> Result<(), CrmError> {
        let request = self
            .http
            .patch(self.url(&format!("/leads/{lead_id}")))
            .json(&json!({ "status_id": status_id }));
        self.send(request).await?;
        debug!(lead_id, status_id, "lead status updated");
        Ok(())
    }

    /// Adds a plain internal note to a lead.
    pub async fn add_lead_note(&self, lead_id: u64, text: &str) -> Result<(), CrmError> {
        let request = self.http.post(self.url("/leads/notes")).json(&json!([{
            "entity_id": lead_id,
            "note_type": "common",
            "params": { "text": text },
        }]));
        self.send(request).await?;
        debug!(lead_id, "lead note added");
        Ok(())
    }

    /// Sends a chat message into the conversation attached to a lead.
    ///
    /// Conversations are addressed by lead id. `scope_id` selects the channel
    /// (e.g. WhatsApp) and is omitted when not configured.
    pub async fn send_talk_message(
        &self,
        lead_id: u64,
        scope_id: Option<&str>,
        text: &str,
    ) -> Result<(), CrmError> {
        let mut body = json!({
            "conversation_id": lead_id,
            "message": { "text": text },
        });
        if let Some(scope_id) = scope_id {
            body["scope_id"] = Value::String(scope_id.to_string());
        }

        let request = self.http.post(self.url("/talks/messages")).json(&body);
        self.send(request).await?;
        debug!(lead_id, "talk message sent");
        Ok(())
    }

    /// Creates a follow-up task on a lead, due at `due`.
    pub async fn create_follow_up_task(
        &self,
        lead_id: u64,
        text: &str,
        due: DateTime<Utc>,
    ) -> Result<(), CrmError> {
        let request = self.http.post(self.url("/tasks")).json(&json!([{
            "entity_id": lead_id,
            "entity_type": "leads",
            "text": text,
            "complete_till": due.timestamp(),
            "task_type_id": FOLLOW_UP_TASK_TYPE,
        }]));
        self.send(request).await?;
        debug!(lead_id, "follow-up task created");
        Ok(())
    }
}
