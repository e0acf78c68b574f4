// Webhook delivery module with retry logic
//
// Handles:
// - Versioned envelope construction around caller payloads
// - Retry logic with exponential backoff
// - Awaited and detached (fire-and-forget) delivery modes
// - Dry-run delivery for operational verification

pub mod delivery;
pub mod envelope;
pub mod error;
pub mod retry;
pub mod transport;

pub use delivery::{DeliveryOptions, DeliveryOutcome, DeliveryService};
pub use envelope::{Envelope, Payload, SOURCE, WEBHOOK_VERSION};
pub use error::DeliveryError;
pub use retry::RetryConfig;
pub use transport::{HttpTransport, WebhookTransport, USER_AGENT};

/// Event fired on the first meaningful interaction with the intake form
pub const LEAD_ENGAGEMENT_EVENT: &str = "lead_engagement_started";

/// Event fired after a preapproval application has been persisted
pub const APPLICATION_SUBMITTED_EVENT: &str = "application_submitted";
