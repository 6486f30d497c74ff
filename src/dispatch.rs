//! Notification fan-out after a player is created.
//!
//! Steps run sequentially and never fail the request:
//!
//! 1. write the credentials into the lead's custom fields
//! 2. create an external contact when name and phone are known
//! 3. send the credentials over the lead's chat channel
//! 4. post them as an internal note, only if step 3 did not succeed

use serde::Serialize;
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::contacts::{ContactsClient, NewContact};
use crate::credentials::Credentials;
use crate::crm::CrmClient;
use crate::payload::ExtractedFields;
use crate::tenants::{ContactsSettings, CrmSettings};

/// Result of one best-effort step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Done,
    Skipped(String),
    Failed(String),
}

impl StepOutcome {
    pub fn is_done(&self) -> bool {
        matches!(self, StepOutcome::Done)
    }

    fn skipped(reason: &str) -> Self {
        StepOutcome::Skipped(reason.to_string())
    }

    fn failed(reason: impl ToString) -> Self {
        StepOutcome::Failed(reason.to_string())
    }
}

/// Flags reported to the webhook caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct DispatchResult {
    pub custom_fields_updated: bool,
    pub contact_created: bool,
    pub message_sent: bool,
    pub note_sent: bool,
}

/// Per-step outcomes of one dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    pub custom_fields: StepOutcome,
    pub contact: StepOutcome,
    pub message: StepOutcome,
    pub note: StepOutcome,
}

impl DispatchReport {
    pub fn result(&self) -> DispatchResult {
        DispatchResult {
            custom_fields_updated: self.custom_fields.is_done(),
            contact_created: self.contact.is_done(),
            message_sent: self.message.is_done(),
            note_sent: self.note.is_done(),
        }
    }
}

/// Chat message carrying new credentials to the player.
pub fn credentials_message(credentials: &Credentials, login_url: Option<&str>) -> String {
    format!(
        "🎰 ¡Cuenta creada exitosamente!\n\nUsuario: {}\nContraseña: {}{}",
        credentials.username,
        credentials.password,
        login_line(login_url)
    )
}

/// Internal note used when the chat message could not be delivered.
pub fn credentials_note(credentials: &Credentials, login_url: Option<&str>) -> String {
    format!(
        "🎰 Cuenta creada exitosamente\n\nUsuario: {}\nContraseña: {}{}",
        credentials.username,
        credentials.password,
        login_line(login_url)
    )
}

fn login_line(login_url: Option<&str>) -> String {
    login_url
        .map(|url| format!("\n\nPodés iniciar sesión en: {url}"))
        .unwrap_or_default()
}

/// Delivers credentials for one tenant.
#[derive(Debug, Clone)]
pub struct NotificationDispatcher {
    crm: Option<CrmClient>,
    crm_settings: CrmSettings,
    contacts: Option<(ContactsClient, ContactsSettings)>,
    login_url: Option<String>,
}

impl NotificationDispatcher {
    /// `crm` is `None` when the tenant lacks CRM credentials; CRM steps then fail.
    pub fn new(crm: Option<CrmClient>, crm_settings: CrmSettings, login_url: Option<String>) -> Self {
        Self {
            crm,
            crm_settings,
            contacts: None,
            login_url,
        }
    }

    pub fn with_contacts(mut self, client: ContactsClient, settings: ContactsSettings) -> Self {
        self.contacts = Some((client, settings));
        self
    }

    pub async fn dispatch(
        &self,
        lead_id: u64,
        fields: &ExtractedFields,
        credentials: &Credentials,
    ) -> DispatchReport {
        let custom_fields = self.update_custom_fields(lead_id, credentials).await;
        let contact = self.create_contact(lead_id, fields).await;
        let message = self.send_message(lead_id, credentials).await;

        let note = if message.is_done() {
            StepOutcome::skipped("credentials delivered by message")
        } else {
            self.send_note(lead_id, credentials).await
        };

        let report = DispatchReport {
            custom_fields,
            contact,
            message,
            note,
        };
        info!(lead_id, result = ?report.result(), "notifications dispatched");
        report
    }

    async fn update_custom_fields(&self, lead_id: u64, credentials: &Credentials) -> StepOutcome {
        let Some(crm) = &self.crm else {
            warn!(lead_id, step = "custom_fields", "CRM credentials not configured");
            return StepOutcome::skipped("CRM credentials not configured");
        };

        let fields: Vec<(u64, &str)> = [
            (self.crm_settings.username_field_id, credentials.username.as_str()),
            (self.crm_settings.password_field_id, credentials.password.as_str()),
        ]
        .into_iter()
        .filter_map(|(id, value)| id.map(|id| (id, value)))
        .collect();

        if fields.is_empty() {
            warn!(lead_id, step = "custom_fields", "no credential custom fields configured");
            return StepOutcome::skipped("custom field ids not configured");
        }

        match crm.update_lead_custom_fields(lead_id, &fields).await {
            Ok(()) => StepOutcome::Done,
            Err(err) => {
                warn!(lead_id, step = "custom_fields", error = %err, "custom field update failed");
                StepOutcome::failed(err)
            }
        }
    }

    async fn create_contact(&self, lead_id: u64, fields: &ExtractedFields) -> StepOutcome {
        let Some((client, settings)) = &self.contacts else {
            return StepOutcome::skipped("contacts service not configured");
        };
        let (Some(name), Some(phone)) = (fields.name.as_deref(), fields.phone.as_deref()) else {
            info!(lead_id, step = "contact", "name or phone unknown; contact not created");
            return StepOutcome::skipped("name or phone unknown");
        };

        let contact = NewContact {
            name,
            phone,
            email: fields.email.as_deref(),
        };
        match client.create_contact(settings, &contact).await {
            Ok(_) => StepOutcome::Done,
            Err(err) => {
                warn!(lead_id, step = "contact", error = %err, "contact creation failed");
                StepOutcome::failed(err)
            }
        }
    }

    async fn send_message(&self, lead_id: u64, credentials: &Credentials) -> StepOutcome {
        let Some(crm) = &self.crm else {
            warn!(lead_id, step = "message", "CRM credentials not configured");
            return StepOutcome::failed("CRM credentials not configured");
        };

        let scope_id = self.crm_settings.message_scope_id.as_deref();
        if scope_id.is_none() {
            warn!(lead_id, step = "message", "message scope id not configured; sending without it");
        }

        let text = credentials_message(credentials, self.login_url.as_deref());
        match crm.send_talk_message(lead_id, scope_id, &text).await {
            Ok(()) => StepOutcome::Done,
            Err(err) => {
                warn!(lead_id, step = "message", error = %err, "credentials message failed");
                StepOutcome::failed(err)
            }
        }
    }

    async fn send_note(&self, lead_id: u64, credentials: &Credentials) -> StepOutcome {
        let Some(crm) = &self.crm else {
            warn!(lead_id, step = "note", "CRM credentials not configured");
            return StepOutcome::failed("CRM credentials not configured");
        };

        let text = credentials_note(credentials, self.login_url.as_deref());
        match crm.add_lead_note(lead_id, &text).await {
            Ok(()) => StepOutcome::Done,
            Err(err) => {
                warn!(lead_id, step = "note", error = %err, "fallback note failed");
                StepOutcome::failed(err)
            }
        }
    }
}
