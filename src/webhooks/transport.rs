//! Webhook Transport Layer
//!
//! The transport is responsible only for putting envelope bytes on the wire
//! and reporting the HTTP status. Retry policy and success classification
//! live in the delivery service.

use crate::webhooks::error::DeliveryError;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use std::time::Duration;

/// Client identifier sent with every delivery
pub const USER_AGENT: &str = concat!("Preapproval-Relay/", env!("CARGO_PKG_VERSION"));

/// Transport trait for webhook delivery
///
/// Implemented by `HttpTransport` in production and by scripted mocks in
/// tests.
#[async_trait]
pub trait WebhookTransport: Send + Sync {
    /// POST a JSON body to `url`
    ///
    /// # Returns
    ///
    /// The HTTP status code of the response, or an error if no response was
    /// received within `timeout`
    async fn post(&self, url: &str, body: Bytes, timeout: Duration) -> Result<u16, DeliveryError>;
}

/// reqwest-backed HTTP transport
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport with the relay's user agent
    pub fn new() -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| DeliveryError::Client(e.to_string()))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl WebhookTransport for HttpTransport {
    async fn post(&self, url: &str, body: Bytes, timeout: Duration) -> Result<u16, DeliveryError> {
        let response = self
            .client
            .post(url)
            .timeout(timeout)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DeliveryError::Timeout(timeout.as_millis() as u64)
                } else {
                    DeliveryError::Transport(e.to_string())
                }
            })?;

        Ok(response.status().as_u16())
    }
}
