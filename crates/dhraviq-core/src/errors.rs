use std::time::Duration;

/// Whether a failed generation call is worth repeating.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureClass {
    /// Same request will fail again (bad key, bad payload, unknown model).
    Fatal,
    Transient,
}

/// Failure of a single call to the generation backend.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("rate limited")]
    RateLimited { retry_after: Option<Duration> },
    #[error("backend returned {status}: {body}")]
    ServerError { status: u16, body: String },
    #[error("backend overloaded")]
    ProviderOverloaded,
    #[error("network error: {0}")]
    NetworkError(String),
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

impl GatewayError {
    pub fn class(&self) -> FailureClass {
        match self {
            Self::AuthenticationFailed(_) | Self::InvalidRequest(_) => FailureClass::Fatal,
            _ => FailureClass::Transient,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.class() == FailureClass::Fatal
    }

    pub fn is_retryable(&self) -> bool {
        self.class() == FailureClass::Transient
    }

    /// Backend-requested wait before the next attempt, if it sent one.
    pub fn suggested_delay(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// Stable label for the `error_kind` log field.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::AuthenticationFailed(_) => "authentication_failed",
            Self::InvalidRequest(_) => "invalid_request",
            Self::RateLimited { .. } => "rate_limited",
            Self::ServerError { .. } => "server_error",
            Self::ProviderOverloaded => "overloaded",
            Self::NetworkError(_) => "network_error",
            Self::MalformedResponse(_) => "malformed_response",
            Self::Timeout(_) => "timeout",
        }
    }

    /// Map a non-success HTTP status from the backend.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            401 | 403 => Self::AuthenticationFailed(body),
            400 | 404 | 413 => Self::InvalidRequest(body),
            429 => Self::RateLimited { retry_after: None },
            503 => Self::ProviderOverloaded,
            500..=599 => Self::ServerError { status, body },
            other => Self::InvalidRequest(format!("unexpected status {other}: {body}")),
        }
    }
}
