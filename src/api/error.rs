use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        rejection::{FormRejection, JsonRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::error;

use crate::applications::StoreError;

/// Errors returned by intake API handlers
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Submitted fields failed validation
    #[error("Submission failed validation")]
    Validation(BTreeMap<String, String>),

    /// Request body could not be read in any accepted format
    #[error("Unreadable request body: {message}")]
    Rejected { status: StatusCode, message: String },

    #[error("Application not found: {0}")]
    NotFound(String),

    /// Persistence or other server-side failure
    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    errors: Option<BTreeMap<String, String>>,
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => ApiError::NotFound(id),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

macro_rules! impl_from_rejection {
    ($($rejection:ty),+) => {
        $(
            impl From<$rejection> for ApiError {
                fn from(rejection: $rejection) -> Self {
                    ApiError::Rejected {
                        status: rejection.status(),
                        message: rejection.body_text(),
                    }
                }
            }
        )+
    };
}

impl_from_rejection!(JsonRejection, FormRejection, MultipartRejection, MultipartError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Validation(errors) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorBody {
                    success: false,
                    message: "Please correct the highlighted fields".to_string(),
                    errors: Some(errors),
                },
            ),
            ApiError::Rejected { status, message } => (
                status,
                ErrorBody {
                    success: false,
                    message,
                    errors: None,
                },
            ),
            ApiError::NotFound(id) => (
                StatusCode::NOT_FOUND,
                ErrorBody {
                    success: false,
                    message: format!("Application {} not found", id),
                    errors: None,
                },
            ),
            ApiError::Internal(detail) => {
                error!("Request failed: {}", detail);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody {
                        success: false,
                        message: "Submission could not be saved. Please try again.".to_string(),
                        errors: None,
                    },
                )
            }
        };

        (status, Json(body)).into_response()
    }
}
