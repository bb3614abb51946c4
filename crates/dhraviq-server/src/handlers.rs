use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{HeaderName, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::{error, info_span, warn, Instrument};

use dhraviq_core::ids::CorrelationId;
use dhraviq_core::{AgentRequest, HealthReport};

use crate::error::{ApiError, ApiFailure};
use crate::server::AppState;

pub const CORRELATION_HEADER: HeaderName = HeaderName::from_static("x-correlation-id");

/// `POST /run_agents`
pub async fn run_agents(
    State(state): State<AppState>,
    body: Result<Json<AgentRequest>, JsonRejection>,
) -> Result<Response, ApiFailure> {
    let correlation_id = CorrelationId::new();
    let span = info_span!("run_agents", correlation_id = %correlation_id);

    let Json(request) = body.map_err(|rejection| {
        let _guard = span.enter();
        warn!(error = %rejection, "rejected request body");
        ApiError::BadRequest(rejection.body_text()).with_correlation(correlation_id.clone())
    })?;

    // Separate task so a panic inside the fan-out becomes a 500, not a
    // dropped connection.
    let orchestrator = state.orchestrator.clone();
    let mut task = tokio::spawn(
        async move { orchestrator.run(&request).await }.instrument(span.clone()),
    );
    let outcome = tokio::time::timeout(state.request_timeout, &mut task).await;

    let _guard = span.enter();
    let response = match outcome {
        Ok(Ok(Ok(response))) => response,
        Ok(Ok(Err(e))) => {
            warn!(error = %e, "request rejected");
            return Err(ApiError::from(e).with_correlation(correlation_id));
        }
        Ok(Err(join_error)) => {
            error!(error = %join_error, "fan-out task failed");
            return Err(ApiError::Internal(join_error.to_string()).with_correlation(correlation_id));
        }
        Err(_) => {
            task.abort();
            warn!(timeout = ?state.request_timeout, "fan-out exceeded the request deadline");
            return Err(ApiError::Timeout.with_correlation(correlation_id));
        }
    };

    let mut http = Json(response).into_response();
    if let Ok(value) = HeaderValue::from_str(correlation_id.as_str()) {
        http.headers_mut().insert(CORRELATION_HEADER, value);
    }
    Ok(http)
}

/// `GET /health` (and `HEAD`). Always 200; the body carries the verdict.
pub async fn health(State(state): State<AppState>) -> Json<HealthReport> {
    Json(state.health.check().await)
}
