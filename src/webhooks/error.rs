//! Webhook Delivery Error Types
//!
//! Errors never escape `DeliveryService::deliver`; they are rendered into the
//! `last_error` field of a `DeliveryOutcome`.

/// Error types for webhook delivery
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// No destination URL configured for this event
    #[error("No destination URL configured")]
    MissingDestination,

    /// Payload could not be serialized to JSON
    #[error("Payload serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Payload serialized to something other than a JSON object
    #[error("Payload must be a JSON object, got {0}")]
    InvalidPayload(&'static str),

    /// Attempt exceeded its request timeout
    #[error("Request timed out after {0}ms")]
    Timeout(u64),

    /// Connection-level failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Destination answered with a non-2xx status
    #[error("Destination responded with HTTP {0}")]
    Status(u16),

    /// HTTP client could not be constructed
    #[error("HTTP client setup failed: {0}")]
    Client(String),
}

impl DeliveryError {
    /// Whether another attempt may succeed where this one failed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DeliveryError::Timeout(_) | DeliveryError::Transport(_) | DeliveryError::Status(_)
        )
    }
}
