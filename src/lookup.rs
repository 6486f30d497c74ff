//! Backfills contact fields missing from a webhook by reading the lead's
//! primary contact from the CRM. Failures are logged and swallowed.

use tracing::{debug, warn};

use crate::crm::CrmClient;
use crate::payload::ExtractedFields;

/// Fills whichever of email, name and phone are still `None`.
///
/// Fields already present in the payload are never overwritten.
pub async fn fill_missing(
    crm: Option<&CrmClient>,
    lead_id: u64,
    mut fields: ExtractedFields,
) -> ExtractedFields {
    if !fields.needs_lookup() {
        return fields;
    }

    let Some(crm) = crm else {
        warn!(lead_id, step = "lookup", "CRM not configured; skipping contact lookup");
        return fields;
    };

    let lead = match crm.get_lead_with_contacts(lead_id).await {
        Ok(lead) => lead,
        Err(err) => {
            warn!(lead_id, step = "lookup", error = %err, "failed to fetch lead");
            return fields;
        }
    };

    let Some(contact_id) = lead.primary_contact_id() else {
        debug!(lead_id, step = "lookup", "lead has no linked contact");
        return fields;
    };

    let contact = match crm.get_contact(contact_id).await {
        Ok(contact) => contact,
        Err(err) => {
            warn!(lead_id, contact_id, step = "lookup", error = %err, "failed to fetch contact");
            return fields;
        }
    };

    if fields.email.is_none() {
        fields.email = contact.email();
    }
    if fields.phone.is_none() {
        fields.phone = contact.phone();
    }
    if fields.name.is_none() {
        fields.name = contact
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string);
    }

    debug!(
        lead_id,
        contact_id,
        step = "lookup",
        has_email = fields.email.is_some(),
        has_name = fields.name.is_some(),
        has_phone = fields.phone.is_some(),
        "contact lookup finished"
    );
    fields
}
