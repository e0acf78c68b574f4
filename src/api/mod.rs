//! HTTP intake API
//!
//! Routes:
//!
//! ```text
//! POST /api/lead-in             lead engagement beacon (rate limited, detached webhook)
//! POST /api/preapproval         application submission (awaited webhook)
//! GET  /api/applications        list stored applications
//! GET  /api/applications/{id}   fetch one application
//! GET  /health                  liveness
//! GET  /metrics                 Prometheus text format (when enabled)
//! ```

pub mod client;
pub mod error;
pub mod form;
pub mod handlers;

use anyhow::{Context, Result};
use axum::{
    routing::{get, post},
    Router,
};
use chrono::Utc;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::applications::{ApplicationStore, MemoryApplicationStore};
use crate::config::{Config, WebhooksConfig};
use crate::metrics;
use crate::rate_limit::LeadTriggerLimiter;
use crate::webhooks::{DeliveryOptions, DeliveryService};

pub use client::ClientId;
pub use error::ApiError;
pub use form::SubmissionForm;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub delivery: DeliveryService,
    pub limiter: Arc<LeadTriggerLimiter>,
    pub applications: Arc<dyn ApplicationStore>,
    pub webhooks: WebhooksConfig,
    pub lead_tracking_enabled: bool,
}

impl AppState {
    /// Build state from configuration with in-memory stores
    ///
    /// # Errors
    ///
    /// Fails if the HTTP client cannot be constructed.
    pub fn from_config(config: &Config) -> Result<Self> {
        let delivery = DeliveryService::new(config.webhooks.retry_config())
            .context("Failed to create webhook delivery service")?;

        Ok(Self {
            delivery,
            limiter: Arc::new(LeadTriggerLimiter::in_memory(config.lead_tracking.cooldown())),
            applications: Arc::new(MemoryApplicationStore::new()),
            webhooks: config.webhooks.clone(),
            lead_tracking_enabled: config.lead_tracking.enabled,
        })
    }

    pub(crate) fn delivery_options(&self) -> DeliveryOptions {
        DeliveryOptions {
            dry_run: self.webhooks.dry_run,
        }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("delivery", &self.delivery)
            .field("limiter", &self.limiter)
            .field("lead_tracking_enabled", &self.lead_tracking_enabled)
            .finish_non_exhaustive()
    }
}

/// Build the API router
pub fn router(state: AppState, metrics_enabled: bool) -> Router {
    let mut app = Router::new()
        .route("/api/lead-in", post(handlers::lead_in))
        .route("/api/preapproval", post(handlers::submit_application))
        .route("/api/applications", get(handlers::list_applications))
        .route("/api/applications/{id}", get(handlers::get_application))
        .route("/health", get(handlers::health));

    if metrics_enabled {
        app = app.route("/metrics", get(handlers::metrics_handler));
    }

    app.layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

/// Periodically drop lead triggers older than the cooldown
pub fn spawn_trigger_sweeper(limiter: Arc<LeadTriggerLimiter>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // First tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let purged = limiter.purge_expired(Utc::now());
            if purged > 0 {
                debug!(purged, remaining = limiter.tracked_clients(), "Swept expired lead triggers");
            }
        }
    })
}

/// Run the intake API until ctrl-c
///
/// # Errors
///
/// Fails if metrics cannot be registered or the listener cannot bind.
pub async fn serve(config: &Config) -> Result<()> {
    if config.metrics.enabled {
        metrics::init().context("Failed to initialize metrics")?;
    }

    let state = AppState::from_config(config)?;

    if config.webhooks.dry_run {
        warn!("Dry-run mode enabled, webhooks will be logged but not sent");
    }
    if config.webhooks.lead_in_url().is_none() {
        warn!("No lead-in webhook URL configured");
    }
    if config.webhooks.completion_url().is_none() {
        warn!("No completion webhook URL configured");
    }

    let sweeper = match config.lead_tracking.sweep_interval() {
        Some(every) if config.lead_tracking.enabled => {
            Some(spawn_trigger_sweeper(state.limiter.clone(), every))
        }
        _ => None,
    };

    let app = router(state, config.metrics.enabled);
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind intake API on {}", addr))?;

    info!("Intake API listening on {}", listener.local_addr()?);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Intake API server error")?;

    if let Some(handle) = sweeper {
        handle.abort();
    }
    info!("Intake API stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
