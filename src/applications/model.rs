//! Preapproval application records
//!
//! A record keeps the submitted form fields verbatim; the few fields the
//! relay needs (business name, contact details) are read out on demand.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::webhooks::{Payload, APPLICATION_SUBMITTED_EVENT};

/// Persisted preapproval application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    /// Application ID returned to the applicant
    pub id: String,

    /// Raw form fields as submitted
    pub fields: Map<String, Value>,

    /// Whether the completion webhook was delivered
    pub webhook_sent: bool,

    pub submitted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Application {
    /// Create a new record from validated form fields
    pub fn new(fields: Map<String, Value>) -> Self {
        let now = Utc::now();
        Self {
            id: format!("APP-{}", Uuid::new_v4().simple()).to_uppercase(),
            fields,
            webhook_sent: false,
            submitted_at: now,
            updated_at: now,
        }
    }

    fn text(&self, key: &str) -> Option<&str> {
        text_field(&self.fields, key)
    }

    /// DBA name, falling back to the legal name
    pub fn business_name(&self) -> Option<&str> {
        self.text("dbaName").or_else(|| self.text("legalName"))
    }

    /// "First Last" of the primary contact
    pub fn contact_name(&self) -> Option<String> {
        let parts: Vec<&str> = ["contactFirstName", "contactLastName"]
            .iter()
            .filter_map(|key| self.text(key))
            .collect();
        (!parts.is_empty()).then(|| parts.join(" "))
    }

    pub fn contact_email(&self) -> Option<&str> {
        self.text("businessEmail")
    }

    pub fn contact_phone(&self) -> Option<&str> {
        self.text("contactPhone")
    }

    /// Minimal contact payload forwarded to the completion webhook
    pub fn completion_payload(&self) -> Payload {
        let payload = json!({
            "event": APPLICATION_SUBMITTED_EVENT,
            "applicationId": self.id,
            "businessName": self.business_name(),
            "contactName": self.contact_name(),
            "contactEmail": self.contact_email(),
            "contactPhone": self.contact_phone(),
            "submittedAt": self.submitted_at.to_rfc3339(),
        });

        match payload {
            Value::Object(map) => map,
            _ => Payload::new(),
        }
    }
}

/// Trimmed, non-empty string value of a form field
pub fn text_field<'a>(fields: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    fields
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Check the fields required to accept a submission
///
/// # Errors
///
/// Returns a map of field name to message for every problem found.
pub fn validate_submission(fields: &Map<String, Value>) -> Result<(), BTreeMap<String, String>> {
    let mut errors = BTreeMap::new();

    if text_field(fields, "legalName").is_none() && text_field(fields, "dbaName").is_none() {
        errors.insert(
            "legalName".to_string(),
            "Legal name or DBA name is required".to_string(),
        );
    }

    match text_field(fields, "businessEmail") {
        None => {
            errors.insert("businessEmail".to_string(), "Business email is required".to_string());
        }
        Some(email) if !looks_like_email(email) => {
            errors.insert(
                "businessEmail".to_string(),
                "Business email is not a valid address".to_string(),
            );
        }
        Some(_) => {}
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn looks_like_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.contains(char::is_whitespace)
        }
        None => false,
    }
}
