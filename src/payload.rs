//! Webhook payload field extraction.
//!
//! CRM webhooks arrive either form-encoded (`leads[add][0][id]=42`) or as
//! JSON. Both are flattened into an ordered list of `(key, value)` pairs with
//! bracketed keys, then scanned with case-insensitive substring rules.

use serde_json::Value;
use thiserror::Error;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("request body is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

/// Fields found in one webhook body. Every field is independently optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedFields {
    pub lead_id: Option<u64>,
    pub email: Option<String>,
    pub name: Option<String>,
    pub phone: Option<String>,
}

impl ExtractedFields {
    /// True when any contact field still needs a remote lookup.
    pub fn needs_lookup(&self) -> bool {
        self.email.is_none() || self.name.is_none() || self.phone.is_none()
    }
}

/// Heuristic extractor over flattened webhook bodies.
#[derive(Debug, Clone)]
pub struct PayloadExtractor {
    phone_keys: Vec<String>,
}

impl Default for PayloadExtractor {
    fn default() -> Self {
        Self::new(["phone", "telefono"])
    }
}

impl PayloadExtractor {
    /// Creates an extractor matching phone numbers by any of `phone_keys`.
    pub fn new<I, S>(phone_keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            phone_keys: phone_keys
                .into_iter()
                .map(|k| k.as_ref().to_lowercase())
                .collect(),
        }
    }

    /// Parses `body` according to `content_type` and extracts the fields.
    pub fn extract(
        &self,
        body: &str,
        content_type: Option<&str>,
    ) -> Result<ExtractedFields, PayloadError> {
        let pairs = parse_pairs(body, content_type)?;
        Ok(self.extract_from_pairs(&pairs))
    }

    /// Applies the field rules to pairs in order.
    ///
    /// A key containing `leads[` and `[id]` sets the lead id, last match wins.
    /// `email` and the phone keys set their field on every match. A key
    /// containing `name` sets the name only while no email has been seen.
    pub fn extract_from_pairs(&self, pairs: &[(String, String)]) -> ExtractedFields {
        let mut fields = ExtractedFields::default();

        for (key, value) in pairs {
            let key = key.to_lowercase();
            let value = value.trim();

            if key.contains("leads[") && key.contains("[id]") {
                fields.lead_id = value.parse::<u64>().ok().filter(|id| *id > 0);
            }
            if key.contains("email") {
                fields.email = non_empty(value);
            }
            if self.phone_keys.iter().any(|k| key.contains(k.as_str())) {
                fields.phone = non_empty(value);
            }
            // Name is skipped once an email was seen, even when the name key
            // comes from a different entity.
            if key.contains("name") && fields.email.is_none() {
                fields.name = non_empty(value);
            }
        }

        fields
    }
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Flattens a webhook body into ordered key/value pairs.
///
/// Form bodies keep their pair order, so duplicate keys resolve to the later
/// value when the rules run. JSON objects are flattened depth-first using
/// bracket notation (`{"leads":{"add":[{"id":1}]}}` becomes
/// `leads[add][0][id]`). Bodies that are not a JSON object yield no pairs.
pub fn parse_pairs(
    body: &str,
    content_type: Option<&str>,
) -> Result<Vec<(String, String)>, PayloadError> {
    let is_form = content_type
        .map(|ct| ct.to_ascii_lowercase().contains(FORM_CONTENT_TYPE))
        .unwrap_or(false);

    if is_form {
        return Ok(url::form_urlencoded::parse(body.as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect());
    }

    let value: Value = serde_json::from_str(body)?;
    let mut pairs = Vec::new();
    if let Value::Object(map) = &value {
        for (key, child) in map {
            flatten_into(key.clone(), child, &mut pairs);
        }
    }
    Ok(pairs)
}

fn flatten_into(prefix: String, value: &Value, out: &mut Vec<(String, String)>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                flatten_into(format!("{prefix}[{key}]"), child, out);
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                flatten_into(format!("{prefix}[{index}]"), child, out);
            }
        }
        Value::String(s) => out.push((prefix, s.clone())),
        Value::Number(n) => out.push((prefix, n.to_string())),
        Value::Bool(b) => out.push((prefix, b.to_string())),
        Value::Null => out.push((prefix, String::new())),
    }
}
