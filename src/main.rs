use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use secrecy::SecretString;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};

use dhraviq_core::provider::LlmProvider;
use dhraviq_core::Dependency;
use dhraviq_engine::notify::DEFAULT_QUEUE_CAPACITY;
use dhraviq_engine::{
    ChannelNotificationQueue, DisabledSink, FanOutOrchestrator, HealthAggregator,
    NotificationSink, NotificationWorker, PushoverSink,
};
use dhraviq_llm::gemini::DEFAULT_MODEL;
use dhraviq_llm::{GeminiProvider, ReliableConfig, ReliableProvider, RetryPolicy};
use dhraviq_store::{Database, DocumentStore, SqliteDocumentStore};
use dhraviq_telemetry::{IncidentQuery, IncidentSink, TelemetryConfig};

/// Longer than the dispatch delay plus one Pushover request timeout.
const NOTIFICATION_FLUSH_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Parser)]
#[command(name = "dhraviq")]
#[command(version, about = "Ask several specialised agents one question", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP service
    Serve(ServeArgs),
    /// Look up persisted warnings and errors
    Incidents(IncidentArgs),
}

#[derive(Args)]
struct ServeArgs {
    #[arg(long, env = "DHRAVIQ_HOST", default_value = "0.0.0.0")]
    host: String,

    #[arg(long, env = "PORT", default_value_t = 8000)]
    port: u16,

    /// Document database file (default: ~/.dhraviq/documents.db)
    #[arg(long, env = "DHRAVIQ_DB_PATH")]
    db_path: Option<PathBuf>,

    /// Incident log file (default: ~/.dhraviq/incidents.db)
    #[arg(long, env = "DHRAVIQ_INCIDENT_DB")]
    incident_db: Option<PathBuf>,

    #[arg(long, env = "DHRAVIQ_LOG_LEVEL", default_value = "info")]
    log_level: Level,

    /// Allowed CORS origins, comma separated
    #[arg(long, env = "DHRAVIQ_ALLOWED_ORIGINS", value_delimiter = ',')]
    allowed_origins: Vec<String>,

    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    gemini_api_key: Option<String>,

    #[arg(long, env = "GEMINI_MODEL", default_value = DEFAULT_MODEL)]
    gemini_model: String,

    #[arg(long, env = "PUSHOVER_TOKEN", hide_env_values = true)]
    pushover_token: Option<String>,

    #[arg(long, env = "PUSHOVER_USER", hide_env_values = true)]
    pushover_user: Option<String>,

    /// Deadline for a single generation attempt
    #[arg(long, env = "DHRAVIQ_AGENT_TIMEOUT_SECS", default_value_t = 15)]
    agent_timeout_secs: u64,

    /// Wait before a queued notification is sent
    #[arg(long, env = "DHRAVIQ_NOTIFICATION_DELAY_MS", default_value_t = 1000)]
    notification_delay_ms: u64,

    #[arg(long, env = "DHRAVIQ_REQUEST_TIMEOUT_SECS", default_value_t = 120)]
    request_timeout_secs: u64,
}

#[derive(Args)]
struct IncidentArgs {
    #[arg(long, env = "DHRAVIQ_INCIDENT_DB")]
    incident_db: Option<PathBuf>,

    /// Correlation id returned to the caller (req_...)
    #[arg(long)]
    correlation_id: Option<String>,

    #[arg(long)]
    agent: Option<String>,

    /// WARN or ERROR
    #[arg(long)]
    level: Option<String>,

    /// RFC 3339 lower bound
    #[arg(long)]
    since: Option<String>,

    #[arg(long, default_value_t = 50)]
    limit: u32,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    match Cli::parse().command {
        Command::Serve(args) => serve(args).await,
        Command::Incidents(args) => incidents(args),
    }
}

fn incident_db_path(path: Option<PathBuf>) -> PathBuf {
    path.unwrap_or_else(|| dhraviq_telemetry::default_data_dir().join("incidents.db"))
}

fn open_store(path: &std::path::Path) -> Dependency<dyn DocumentStore> {
    match Database::open(path) {
        Ok(db) => {
            let store: Arc<dyn DocumentStore> = Arc::new(SqliteDocumentStore::new(db));
            Dependency::available(store)
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "document store unavailable");
            Dependency::unavailable(e.to_string())
        }
    }
}

/// Returns the raw provider (for health probes) and the reliable wrapper
/// used by agent invocations.
fn build_generation(
    args: &ServeArgs,
) -> (Dependency<dyn LlmProvider>, Dependency<dyn LlmProvider>) {
    let Some(key) = args.gemini_api_key.clone().filter(|k| !k.is_empty()) else {
        warn!("GEMINI_API_KEY not set; generation backend unavailable");
        let missing = Dependency::unavailable("GEMINI_API_KEY not set");
        return (missing.clone(), missing);
    };

    match GeminiProvider::new(SecretString::from(key), Some(&args.gemini_model)) {
        Ok(gemini) => {
            let gemini = Arc::new(gemini);
            let reliable = ReliableProvider::new(
                Arc::clone(&gemini),
                ReliableConfig {
                    attempt_timeout: Duration::from_secs(args.agent_timeout_secs),
                    retry: RetryPolicy::default(),
                },
            );
            let raw: Arc<dyn LlmProvider> = gemini;
            let reliable: Arc<dyn LlmProvider> = Arc::new(reliable);
            (Dependency::available(raw), Dependency::available(reliable))
        }
        Err(e) => {
            warn!(error = %e, "generation backend unavailable");
            let failed = Dependency::unavailable(e.to_string());
            (failed.clone(), failed)
        }
    }
}

fn build_sink(args: &ServeArgs) -> Arc<dyn NotificationSink> {
    let credentials = args
        .pushover_token
        .clone()
        .zip(args.pushover_user.clone())
        .filter(|(token, user)| !token.is_empty() && !user.is_empty());

    let Some((token, user)) = credentials else {
        warn!("Pushover credentials not set; notifications disabled");
        return Arc::new(DisabledSink);
    };

    match PushoverSink::new(SecretString::from(token), SecretString::from(user)) {
        Ok(sink) => Arc::new(sink),
        Err(e) => {
            warn!(error = %e, "notifications disabled");
            Arc::new(DisabledSink)
        }
    }
}

async fn serve(args: ServeArgs) -> anyhow::Result<()> {
    let _telemetry = dhraviq_telemetry::init_telemetry(TelemetryConfig {
        log_level: args.log_level,
        incident_db_path: incident_db_path(args.incident_db.clone()),
        ..TelemetryConfig::default()
    });

    info!("Starting Dhraviq server");

    let db_path = args
        .db_path
        .clone()
        .unwrap_or_else(|| dhraviq_telemetry::default_data_dir().join("documents.db"));
    let store = open_store(&db_path);
    let (probe_provider, agent_provider) = build_generation(&args);
    let sink = build_sink(&args);

    let shutdown = CancellationToken::new();
    let (queue, rx) = ChannelNotificationQueue::channel(DEFAULT_QUEUE_CAPACITY);
    let worker = NotificationWorker::new(
        rx,
        Arc::clone(&sink),
        Duration::from_millis(args.notification_delay_ms),
        shutdown.clone(),
    )
    .spawn();

    let state = dhraviq_server::AppState::new(
        Arc::new(FanOutOrchestrator::new(
            agent_provider,
            store.clone(),
            Arc::new(queue),
        )),
        Arc::new(HealthAggregator::new(store, probe_provider, sink)),
    );

    let mut config = dhraviq_server::ServerConfig {
        host: args.host.clone(),
        port: args.port,
        request_timeout: Duration::from_secs(args.request_timeout_secs),
        ..Default::default()
    };
    if !args.allowed_origins.is_empty() {
        config.allowed_origins = args.allowed_origins.clone();
    }

    let handle = dhraviq_server::start(config, state)
        .await
        .context("failed to start server")?;

    info!(port = handle.port, "Dhraviq server ready");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl+c")?;

    info!("Shutting down");
    // Stop taking requests first so no reminder is queued after the flush
    handle.shutdown().await;
    shutdown.cancel();
    match tokio::time::timeout(NOTIFICATION_FLUSH_TIMEOUT, worker).await {
        Ok(_) => info!("notification queue flushed"),
        Err(_) => warn!("notification flush timed out; remaining sends dropped"),
    }
    Ok(())
}

fn incidents(args: IncidentArgs) -> anyhow::Result<()> {
    let path = incident_db_path(args.incident_db);
    let sink = IncidentSink::open(&path)
        .with_context(|| format!("failed to open incident log at {}", path.display()))?;

    let records = sink
        .query(&IncidentQuery {
            correlation_id: args.correlation_id,
            agent: args.agent,
            level: args.level.map(|l| l.to_uppercase()),
            since: args.since,
            limit: Some(args.limit),
        })
        .context("incident query failed")?;

    for record in records {
        println!("{}", serde_json::to_string(&record)?);
    }
    Ok(())
}
