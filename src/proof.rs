//! Proof-of-payment detection for incoming chat messages.
//!
//! An inbound message whose first attachment is an image or file counts as
//! a payment receipt: the lead moves to the tenant's "proof received" status
//! and gets a note naming the file. Anything else is ignored without
//! touching the CRM.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::crm::CrmClient;

/// Attachment types accepted as proof.
pub const ACCEPTED_ATTACHMENT_TYPES: &[&str] = &["image", "file"];

const UNKNOWN_FILE_NAME: &str = "unknown";

/// Message event as sent by the CRM, at top level or under `message`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessageEvent {
    #[serde(default)]
    pub entity_id: Value,
    #[serde(default)]
    pub message_type: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub attachments: Vec<Attachment>,
}

/// The CRM sends `"attachments": null` on plain text messages.
fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<Attachment>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<Attachment>>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Attachment {
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

impl Attachment {
    pub fn display_name(&self) -> &str {
        self.file_name
            .as_deref()
            .filter(|n| !n.is_empty())
            .or(self.name.as_deref().filter(|n| !n.is_empty()))
            .unwrap_or(UNKNOWN_FILE_NAME)
    }

    pub fn file_url(&self) -> Option<&str> {
        self.link
            .as_deref()
            .filter(|l| !l.is_empty())
            .or(self.url.as_deref().filter(|u| !u.is_empty()))
    }
}

impl MessageEvent {
    /// Unwraps `{"message": {...}}` when present, else reads the top level.
    pub fn from_json(body: &Value) -> Result<Self, serde_json::Error> {
        let event = body
            .get("message")
            .filter(|m| m.is_object())
            .unwrap_or(body);
        MessageEvent::deserialize(event)
    }

    /// Lead id from `entity_id`, which arrives as a number or a string.
    pub fn lead_id(&self) -> Option<u64> {
        match &self.entity_id {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
        .filter(|id| *id > 0)
    }
}

/// Attachment accepted as proof.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ProofDetails {
    pub lead_id: Option<u64>,
    pub attachment_type: String,
    pub file_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_url: Option<String>,
}

/// Terminal state for one message event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProofOutcome {
    IgnoredOutgoing,
    IgnoredNoAttachment,
    IgnoredInvalidType { attachment_type: Option<String> },
    ProofRecorded { details: ProofDetails, note_added: bool },
    StatusUpdateFailed { details: ProofDetails, reason: String },
}

impl ProofOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            ProofOutcome::IgnoredOutgoing => "ignored-outgoing",
            ProofOutcome::IgnoredNoAttachment => "ignored-no-attachment",
            ProofOutcome::IgnoredInvalidType { .. } => "ignored-invalid-type",
            ProofOutcome::ProofRecorded { .. } => "proof-recorded",
            ProofOutcome::StatusUpdateFailed { .. } => "status-update-failed",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            ProofOutcome::IgnoredOutgoing => "Outgoing message ignored",
            ProofOutcome::IgnoredNoAttachment => "No attachment found",
            ProofOutcome::IgnoredInvalidType { .. } => "Attachment type not valid for proof",
            ProofOutcome::ProofRecorded { .. } => "Proof received and lead status updated",
            ProofOutcome::StatusUpdateFailed { .. } => {
                "Proof received but lead status could not be updated"
            }
        }
    }

    pub fn details(&self) -> Option<&ProofDetails> {
        match self {
            ProofOutcome::ProofRecorded { details, .. }
            | ProofOutcome::StatusUpdateFailed { details, .. } => Some(details),
            _ => None,
        }
    }

    pub fn status_changed(&self) -> bool {
        matches!(self, ProofOutcome::ProofRecorded { .. })
    }
}

/// Either a terminal ignore or an attachment that needs recording.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Ignored(ProofOutcome),
    Detected(ProofDetails),
}

/// Decides what to do with `event` without any I/O.
pub fn classify(event: &MessageEvent) -> Classification {
    if event.message_type.as_deref() != Some("in") {
        return Classification::Ignored(ProofOutcome::IgnoredOutgoing);
    }

    let Some(attachment) = event.attachments.first() else {
        return Classification::Ignored(ProofOutcome::IgnoredNoAttachment);
    };

    let accepted = attachment
        .kind
        .as_deref()
        .is_some_and(|kind| ACCEPTED_ATTACHMENT_TYPES.contains(&kind));
    if !accepted {
        return Classification::Ignored(ProofOutcome::IgnoredInvalidType {
            attachment_type: attachment.kind.clone(),
        });
    }

    Classification::Detected(ProofDetails {
        lead_id: event.lead_id(),
        attachment_type: attachment.kind.clone().unwrap_or_default(),
        file_name: attachment.display_name().to_string(),
        file_url: attachment.file_url().map(str::to_string),
    })
}

/// Note text recorded on the lead once its status changed.
pub fn proof_note(details: &ProofDetails) -> String {
    match &details.file_url {
        Some(url) => format!("📎 Comprobante recibido: {}\nURL: {}", details.file_name, url),
        None => format!("📎 Comprobante recibido: {}", details.file_name),
    }
}

/// Moves the lead to `proof_status_id` and, on success, adds the proof note.
///
/// No CRM call is made when credentials, the status id or the lead id are
/// missing.
pub async fn record(
    crm: Option<&CrmClient>,
    proof_status_id: Option<u64>,
    details: ProofDetails,
) -> ProofOutcome {
    let failed = |details: ProofDetails, reason: &str| {
        warn!(lead_id = ?details.lead_id, step = "proof_status", reason, "lead status not updated");
        ProofOutcome::StatusUpdateFailed {
            details,
            reason: reason.to_string(),
        }
    };

    let Some(crm) = crm else {
        return failed(details, "CRM credentials not configured");
    };
    let Some(status_id) = proof_status_id else {
        return failed(details, "proof status id not configured");
    };
    let Some(lead_id) = details.lead_id else {
        return failed(details, "message event has no lead id");
    };

    if let Err(err) = crm.update_lead_status(lead_id, status_id).await {
        return failed(details, &err.to_string());
    }

    let note_added = match crm.add_lead_note(lead_id, &proof_note(&details)).await {
        Ok(()) => true,
        Err(err) => {
            warn!(lead_id, step = "proof_note", error = %err, "proof note failed");
            false
        }
    };

    info!(lead_id, status_id, note_added, "payment proof recorded");
    ProofOutcome::ProofRecorded {
        details,
        note_added,
    }
}

/// Classifies `event` and records it when it is a proof.
pub async fn process(
    crm: Option<&CrmClient>,
    proof_status_id: Option<u64>,
    event: &MessageEvent,
) -> ProofOutcome {
    match classify(event) {
        Classification::Ignored(outcome) => {
            info!(lead_id = ?event.lead_id(), outcome = outcome.label(), "message ignored");
            outcome
        }
        Classification::Detected(details) => record(crm, proof_status_id, details).await,
    }
}
