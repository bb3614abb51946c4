use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::collections::BTreeMap;

use dhraviq_core::ids::CorrelationId;
use dhraviq_core::ResponseStatus;
use dhraviq_engine::OrchestratorError;

const INTERNAL_MESSAGE: &str = "Internal server error";
const TIMEOUT_MESSAGE: &str = "Request timed out";

/// Request failure as seen by HTTP callers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unavailable(String),

    #[error("{0}")]
    Internal(String),

    #[error("request timed out")]
    Timeout,
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Timeout => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    /// Message safe to show the caller. Internal details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            Self::BadRequest(m) => m.clone(),
            Self::Unavailable(m) => format!("Service temporarily unavailable: {m}"),
            Self::Internal(_) => INTERNAL_MESSAGE.to_string(),
            Self::Timeout => TIMEOUT_MESSAGE.to_string(),
        }
    }

    pub fn with_correlation(self, correlation_id: CorrelationId) -> ApiFailure {
        ApiFailure {
            error: self,
            correlation_id,
        }
    }
}

impl From<OrchestratorError> for ApiError {
    fn from(e: OrchestratorError) -> Self {
        match e {
            OrchestratorError::Validation(v) => Self::BadRequest(v.to_string()),
            OrchestratorError::DependencyUnavailable { dependency, .. } => {
                Self::Unavailable(dependency.to_string())
            }
        }
    }
}

/// An `ApiError` bound to the request it happened in.
#[derive(Debug)]
pub struct ApiFailure {
    pub error: ApiError,
    pub correlation_id: CorrelationId,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    status: ResponseStatus,
    session_id: Option<String>,
    responses: BTreeMap<String, String>,
    message: String,
    correlation_id: CorrelationId,
}

impl IntoResponse for ApiFailure {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            status: ResponseStatus::Error,
            session_id: None,
            responses: BTreeMap::new(),
            message: self.error.public_message(),
            correlation_id: self.correlation_id,
        };
        (self.error.status_code(), Json(body)).into_response()
    }
}
