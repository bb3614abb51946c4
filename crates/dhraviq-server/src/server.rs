use std::sync::Arc;
use std::time::Duration;

use axum::http::{header, HeaderValue, Method, Request};
use axum::routing::{get, post};
use axum::Router;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

use dhraviq_engine::{FanOutOrchestrator, HealthAggregator};

use crate::handlers;

pub const DEFAULT_ORIGINS: &[&str] = &[
    "https://dhraviq.com",
    "https://www.dhraviq.com",
    "http://localhost:5173",
];

/// Server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub allowed_origins: Vec<String>,
    /// Deadline for one `/run_agents` call, answered with a 504 envelope.
    pub request_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8000,
            allowed_origins: DEFAULT_ORIGINS.iter().map(|o| o.to_string()).collect(),
            request_timeout: Duration::from_secs(120),
        }
    }
}

/// Extra time the router-wide timeout allows beyond the handler deadline.
const TIMEOUT_GRACE: Duration = Duration::from_secs(5);

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<FanOutOrchestrator>,
    pub health: Arc<HealthAggregator>,
    pub(crate) request_timeout: Duration,
}

impl AppState {
    pub fn new(orchestrator: Arc<FanOutOrchestrator>, health: Arc<HealthAggregator>) -> Self {
        Self {
            orchestrator,
            health,
            request_timeout: ServerConfig::default().request_timeout,
        }
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(allowed)
        .allow_methods([Method::GET, Method::HEAD, Method::POST, Method::OPTIONS])
        .allow_headers([header::ACCEPT, header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true)
        .max_age(Duration::from_secs(3600))
}

/// Build the Axum router with all routes.
pub fn build_router(config: &ServerConfig, mut state: AppState) -> Router {
    state.request_timeout = config.request_timeout;
    Router::new()
        .route("/run_agents", post(handlers::run_agents))
        .route("/health", get(handlers::health))
        .with_state(state)
        // Backstop only: /run_agents answers its own deadline first
        .layer(TimeoutLayer::new(config.request_timeout + TIMEOUT_GRACE))
        .layer(cors_layer(&config.allowed_origins))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                )
            }),
        )
}

/// Bind and start serving. Returns a handle to shut it down.
pub async fn start(config: ServerConfig, state: AppState) -> Result<ServerHandle, std::io::Error> {
    let router = build_router(&config, state);
    let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port)).await?;
    let local_addr = listener.local_addr()?;

    tracing::info!(addr = %local_addr, "Dhraviq server started");

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router)
            .with_graceful_shutdown(async move { signal.cancelled().await })
            .await
        {
            tracing::error!(error = %e, "server error");
        }
    });

    Ok(ServerHandle {
        port: local_addr.port(),
        shutdown,
        server,
    })
}

/// Handle returned by `start()`.
pub struct ServerHandle {
    pub port: u16,
    shutdown: CancellationToken,
    server: tokio::task::JoinHandle<()>,
}

impl ServerHandle {
    /// Stop accepting connections and wait for in-flight requests.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        let _ = self.server.await;
    }
}
