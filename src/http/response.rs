//! Error responses.
//!
//! # Status Mapping
//! - Validation → 400, not found → 404, wrong content type → 415
//! - Admission → 503 with a retry-later message
//! - Execution failure or expiry on the ledger → 422
//! - Node unreachable or timed out → 502
//! - Anything else → 500 without internal detail

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::chain::types::ChainError;
use crate::services::ServiceError;
use crate::workflow::WorkflowError;

/// Error returned by handlers, rendered as a plain-text body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unsupported_media_type() -> Self {
        Self::new(
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "content-type must be application/json",
        )
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<ServiceError> for ApiError {
    fn from(e: ServiceError) -> Self {
        match &e {
            ServiceError::Validation(message) => Self::bad_request(message.clone()),
            ServiceError::NotFound(message) => Self::new(StatusCode::NOT_FOUND, *message),
            ServiceError::Admission(admission) => {
                Self::new(StatusCode::SERVICE_UNAVAILABLE, admission.to_string())
            }
            ServiceError::Workflow(WorkflowError::Chain(chain)) => match chain {
                ChainError::Execution(_) | ChainError::Expired(_) => {
                    Self::new(StatusCode::UNPROCESSABLE_ENTITY, e.to_string())
                }
                ChainError::Rpc(_) | ChainError::Timeout(_) => {
                    tracing::warn!(error = %e, "Ledger unavailable");
                    Self::new(StatusCode::BAD_GATEWAY, "ledger unavailable")
                }
                _ => internal(&e),
            },
            _ => internal(&e),
        }
    }
}

fn internal(e: &ServiceError) -> ApiError {
    tracing::error!(error = %e, "Request failed");
    ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, self.message).into_response()
    }
}
