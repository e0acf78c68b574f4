// Versioned webhook envelope
//
// Wraps a caller payload with the fixed `webhookVersion` and `source` fields.
// The body is serialized once; every retry resends the same bytes.

use crate::webhooks::error::DeliveryError;
use bytes::Bytes;
use serde::Serialize;
use serde_json::{Map, Value};

/// Envelope schema version sent with every event
pub const WEBHOOK_VERSION: &str = "1.0";

/// Identifier of the sending system
pub const SOURCE: &str = "merchant-preapproval-relay";

/// Flat JSON object handed to the delivery service by callers
pub type Payload = Map<String, Value>;

/// Serialized outbound webhook body
#[derive(Debug, Clone)]
pub struct Envelope {
    fields: Payload,
    body: Bytes,
}

impl Envelope {
    /// Build an envelope from any serializable payload
    ///
    /// The payload must serialize to a JSON object. Envelope fields overwrite
    /// payload keys of the same name.
    pub fn build<P: Serialize + ?Sized>(payload: &P) -> Result<Self, DeliveryError> {
        let mut fields = match serde_json::to_value(payload)? {
            Value::Object(map) => map,
            other => return Err(DeliveryError::InvalidPayload(json_kind(&other))),
        };

        fields.insert("webhookVersion".to_string(), Value::from(WEBHOOK_VERSION));
        fields.insert("source".to_string(), Value::from(SOURCE));

        let body = Bytes::from(serde_json::to_vec(&fields)?);
        Ok(Self { fields, body })
    }

    /// Envelope fields, including the two fixed ones
    pub fn fields(&self) -> &Payload {
        &self.fields
    }

    /// Serialized body; cloning is a reference-count bump
    pub fn body(&self) -> Bytes {
        self.body.clone()
    }

    /// Serialized size in bytes
    pub fn len(&self) -> usize {
        self.body.len()
    }

    /// Pretty-printed body for dry-run previews
    pub fn preview(&self) -> String {
        serde_json::to_string_pretty(&self.fields)
            .unwrap_or_else(|_| String::from_utf8_lossy(&self.body).into_owned())
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
