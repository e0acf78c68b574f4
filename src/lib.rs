//! Preapproval Relay Library
//!
//! Intake service for merchant preapproval applications. Submissions and
//! lead engagement beacons are relayed to CRM webhooks with retry and
//! backoff, and lead beacons are rate limited per client.

pub mod api;
pub mod applications;
pub mod config;
pub mod metrics;
pub mod rate_limit;
pub mod telemetry;
pub mod webhooks;
