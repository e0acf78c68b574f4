// Webhook delivery executor with retry logic
//
// Delivers one envelope to one destination with bounded retries. Failures
// are reported through `DeliveryOutcome`, never returned as errors.

use crate::metrics;
use crate::webhooks::envelope::Envelope;
use crate::webhooks::error::DeliveryError;
use crate::webhooks::retry::{next_retry, RetryConfig, RetryDecision};
use crate::webhooks::transport::{HttpTransport, WebhookTransport};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Per-call delivery options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryOptions {
    /// Log the envelope instead of sending it
    pub dry_run: bool,
}

impl DeliveryOptions {
    pub fn live() -> Self {
        Self { dry_run: false }
    }

    pub fn dry_run() -> Self {
        Self { dry_run: true }
    }
}

/// Result of a `deliver()` call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryOutcome {
    pub succeeded: bool,
    /// Network attempts performed (0 when skipped or dry-run)
    pub attempts: u32,
    pub last_status: Option<u16>,
    pub last_error: Option<String>,
}

impl DeliveryOutcome {
    fn delivered(attempts: u32, status: u16) -> Self {
        Self {
            succeeded: true,
            attempts,
            last_status: Some(status),
            last_error: None,
        }
    }

    fn simulated() -> Self {
        Self {
            succeeded: true,
            attempts: 0,
            last_status: None,
            last_error: None,
        }
    }

    fn failed(attempts: u32, last_status: Option<u16>, error: &DeliveryError) -> Self {
        Self {
            succeeded: false,
            attempts,
            last_status,
            last_error: Some(error.to_string()),
        }
    }
}

/// Webhook delivery service
///
/// Cheap to clone; clones share the underlying transport.
#[derive(Clone)]
pub struct DeliveryService {
    transport: Arc<dyn WebhookTransport>,
    retry: RetryConfig,
}

impl DeliveryService {
    /// Create a service that delivers over HTTP
    pub fn new(retry: RetryConfig) -> Result<Self, DeliveryError> {
        Ok(Self::with_transport(Arc::new(HttpTransport::new()?), retry))
    }

    /// Create a service on top of a custom transport
    pub fn with_transport(transport: Arc<dyn WebhookTransport>, retry: RetryConfig) -> Self {
        Self { transport, retry }
    }

    /// Deliver `payload` to `destination` and wait for the final outcome
    ///
    /// # Arguments
    /// * `event` - Event name, used for logs and metrics only
    /// * `destination` - Target URL; `None` or empty skips delivery
    /// * `payload` - JSON object to wrap in the envelope
    /// * `options` - Dry-run switch
    pub async fn deliver<P: Serialize + ?Sized>(
        &self,
        event: &str,
        destination: Option<&str>,
        payload: &P,
        options: DeliveryOptions,
    ) -> DeliveryOutcome {
        let destination = destination.map(str::trim).filter(|url| !url.is_empty());

        let envelope = match Envelope::build(payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                error!(event, error = %e, "Webhook payload rejected");
                metrics::record_delivery(event, "invalid_payload");
                return DeliveryOutcome::failed(0, None, &e);
            }
        };

        if options.dry_run {
            info!(
                event,
                destination = destination.unwrap_or("<unset>"),
                bytes = envelope.len(),
                "Dry run - webhook not sent:\n{}",
                envelope.preview()
            );
            metrics::record_delivery(event, "dry_run");
            return DeliveryOutcome::simulated();
        }

        let Some(url) = destination else {
            warn!(event, "No webhook destination configured, skipping delivery");
            metrics::record_delivery(event, "skipped");
            return DeliveryOutcome::failed(0, None, &DeliveryError::MissingDestination);
        };

        self.deliver_with_retries(event, url, &envelope).await
    }

    async fn deliver_with_retries(&self, event: &str, url: &str, envelope: &Envelope) -> DeliveryOutcome {
        let timeout = self.retry.attempt_timeout();
        let started = Instant::now();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let attempt_start = Instant::now();
            let result = self.transport.post(url, envelope.body(), timeout).await;
            let elapsed_ms = attempt_start.elapsed().as_millis() as u64;

            let (last_status, failure) = match result {
                Ok(status) if (200..300).contains(&status) => {
                    info!(event, destination = url, attempt, status, elapsed_ms, "Webhook delivered");
                    metrics::record_attempt(event, "success");
                    metrics::record_delivery(event, "delivered");
                    metrics::observe_duration(event, started.elapsed());
                    return DeliveryOutcome::delivered(attempt, status);
                }
                Ok(status) => {
                    warn!(event, destination = url, attempt, status, elapsed_ms, "Webhook rejected");
                    (Some(status), DeliveryError::Status(status))
                }
                Err(e) => {
                    warn!(event, destination = url, attempt, error = %e, elapsed_ms, "Webhook attempt failed");
                    (None, e)
                }
            };
            metrics::record_attempt(event, "failure");

            match next_retry(attempt, &self.retry) {
                RetryDecision::Retry(delay) if failure.is_retryable() => {
                    debug!(event, destination = url, "Retrying in {} ms", delay.as_millis());
                    tokio::time::sleep(delay).await;
                }
                _ => {
                    error!(
                        event,
                        destination = url,
                        attempts = attempt,
                        error = %failure,
                        "Webhook delivery failed"
                    );
                    metrics::record_delivery(event, "failed");
                    metrics::observe_duration(event, started.elapsed());
                    return DeliveryOutcome::failed(attempt, last_status, &failure);
                }
            }
        }
    }

    /// Deliver on a background task and log the outcome
    ///
    /// The returned handle may be dropped; the delivery still runs to
    /// completion on the runtime.
    pub fn spawn_delivery(
        &self,
        event: &'static str,
        destination: Option<String>,
        payload: serde_json::Value,
        options: DeliveryOptions,
    ) -> JoinHandle<DeliveryOutcome> {
        let service = self.clone();
        tokio::spawn(async move {
            let outcome = service
                .deliver(event, destination.as_deref(), &payload, options)
                .await;
            if outcome.succeeded {
                debug!(event, attempts = outcome.attempts, "Background webhook delivery finished");
            } else {
                warn!(
                    event,
                    attempts = outcome.attempts,
                    error = outcome.last_error.as_deref().unwrap_or("unknown"),
                    "Background webhook delivery failed"
                );
            }
            outcome
        })
    }
}

impl std::fmt::Debug for DeliveryService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryService")
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}
