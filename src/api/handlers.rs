// Intake API handlers

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{debug, error, info, warn};

use super::client::ClientId;
use super::error::ApiError;
use super::form::SubmissionForm;
use super::AppState;
use crate::applications::{validate_submission, Application, ApplicationFilter};
use crate::metrics;
use crate::webhooks::{APPLICATION_SUBMITTED_EVENT, LEAD_ENGAGEMENT_EVENT};

/// Tracking fields copied from the lead-in request body
const LEAD_FIELDS: [&str; 3] = ["page", "referrer", "action"];

/// Shown to the applicant once the record is stored, whatever the webhook outcome
pub const SUBMITTED_MESSAGE: &str = "Application submitted successfully";

#[derive(Debug, Serialize)]
pub struct LeadInResponse {
    pub success: bool,
    pub forwarded: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionResponse {
    pub success: bool,
    pub application_id: String,
    pub webhook_sent: bool,
    pub message: String,
}

/// Build the lead engagement payload from the tracking body
pub fn lead_payload(client: &ClientId, tracking: &Map<String, Value>, user_agent: Option<&str>) -> Value {
    let mut payload = Map::new();
    payload.insert("event".into(), json!(LEAD_ENGAGEMENT_EVENT));
    payload.insert("clientId".into(), json!(client.as_str()));
    payload.insert("timestamp".into(), json!(Utc::now().to_rfc3339()));

    for key in LEAD_FIELDS {
        payload.insert(key.into(), tracking.get(key).cloned().unwrap_or(Value::Null));
    }

    let agent = tracking
        .get("userAgent")
        .and_then(Value::as_str)
        .or(user_agent);
    payload.insert("userAgent".into(), json!(agent));

    Value::Object(payload)
}

/// `POST /api/lead-in`
///
/// Always answers 200; forwarding happens in the background.
pub async fn lead_in(
    State(state): State<AppState>,
    client: ClientId,
    headers: HeaderMap,
    body: Bytes,
) -> Json<LeadInResponse> {
    // Tracking beacons are best effort, so a malformed body is treated as empty
    let tracking: Map<String, Value> = serde_json::from_slice(&body).unwrap_or_default();

    let forwarded = state.lead_tracking_enabled
        && state.limiter.should_trigger(client.as_str(), Utc::now());
    metrics::record_lead_trigger(forwarded);

    if forwarded {
        let user_agent = headers.get(header::USER_AGENT).and_then(|v| v.to_str().ok());
        let payload = lead_payload(&client, &tracking, user_agent);
        info!(client = client.as_str(), "Forwarding lead engagement");
        state.delivery.spawn_delivery(
            LEAD_ENGAGEMENT_EVENT,
            state.webhooks.lead_in_url().map(str::to_string),
            payload,
            state.delivery_options(),
        );
    } else {
        debug!(client = client.as_str(), "Lead trigger suppressed");
    }

    Json(LeadInResponse {
        success: true,
        forwarded,
    })
}

/// `POST /api/preapproval`
///
/// Persists the application, then waits for the completion webhook so the
/// response can report whether it went out.
pub async fn submit_application(
    State(state): State<AppState>,
    SubmissionForm(fields): SubmissionForm,
) -> Result<(StatusCode, Json<SubmissionResponse>), ApiError> {
    validate_submission(&fields).map_err(ApiError::Validation)?;

    let application = Application::new(fields);
    let application_id = application.id.clone();
    let payload = application.completion_payload();

    state.applications.insert(application).await?;
    metrics::APPLICATIONS_SUBMITTED_TOTAL.inc();
    info!(application_id = %application_id, "Application stored");

    let outcome = state
        .delivery
        .deliver(
            APPLICATION_SUBMITTED_EVENT,
            state.webhooks.completion_url(),
            &payload,
            state.delivery_options(),
        )
        .await;

    if let Err(e) = state
        .applications
        .mark_webhook_sent(&application_id, outcome.succeeded)
        .await
    {
        warn!(application_id = %application_id, error = %e, "Failed to record webhook result");
    }

    Ok((
        StatusCode::CREATED,
        Json(SubmissionResponse {
            success: true,
            application_id,
            webhook_sent: outcome.succeeded,
            message: SUBMITTED_MESSAGE.to_string(),
        }),
    ))
}

/// `GET /api/applications`
pub async fn list_applications(
    State(state): State<AppState>,
    Query(filter): Query<ApplicationFilter>,
) -> Result<Json<Vec<Application>>, ApiError> {
    let applications = state.applications.list(&filter).await?;
    Ok(Json(applications))
}

/// `GET /api/applications/{id}`
pub async fn get_application(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Application>, ApiError> {
    state
        .applications
        .get(&id)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound(id))
}

/// `GET /health`
pub async fn health() -> impl IntoResponse {
    StatusCode::OK
}

/// `GET /metrics`
pub async fn metrics_handler() -> Response {
    match metrics::gather_metrics() {
        Ok(metrics_text) => (StatusCode::OK, metrics_text).into_response(),
        Err(e) => {
            error!("Failed to gather metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Error gathering metrics: {}", e),
            )
                .into_response()
        }
    }
}
