mod incidents;

pub use incidents::{IncidentLayer, IncidentQuery, IncidentRecord, IncidentSink};

use std::path::PathBuf;
use std::sync::Arc;

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Configuration for the telemetry subsystem.
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    /// Default log level. Overridden by RUST_LOG env var.
    pub log_level: Level,
    /// Per-module level overrides (e.g. "dhraviq_llm" => DEBUG).
    pub module_levels: Vec<(String, Level)>,
    /// Whether to persist warn+ events to the incident log.
    pub incident_log: bool,
    /// Path to the incident log database.
    pub incident_db_path: PathBuf,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Level::INFO,
            module_levels: Vec::new(),
            incident_log: true,
            incident_db_path: default_data_dir().join("incidents.db"),
        }
    }
}

impl TelemetryConfig {
    fn filter_directives(&self) -> String {
        let mut filter = self.log_level.to_string().to_lowercase();
        for (module, level) in &self.module_levels {
            filter.push_str(&format!(",{}={}", module, level.to_string().to_lowercase()));
        }
        filter
    }
}

/// Keeps the incident sink alive for the lifetime of the process.
pub struct TelemetryGuard {
    incidents: Option<Arc<IncidentSink>>,
}

impl TelemetryGuard {
    /// Access the incident log for operator lookups.
    pub fn incidents(&self) -> Option<&IncidentSink> {
        self.incidents.as_deref()
    }
}

/// Initialize the telemetry subsystem. Call once at startup.
pub fn init_telemetry(config: TelemetryConfig) -> TelemetryGuard {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.filter_directives()));

    // JSON formatting layer for stdout
    let fmt_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_target(true)
        .with_span_list(true)
        .with_filter(env_filter);

    let (incident_layer, incident_sink) = if config.incident_log {
        match IncidentSink::open(&config.incident_db_path) {
            Ok(sink) => {
                let sink = Arc::new(sink);
                (Some(IncidentLayer::new(sink.clone())), Some(sink))
            }
            Err(e) => {
                eprintln!("dhraviq-telemetry: failed to open incident log: {e}");
                (None, None)
            }
        }
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(incident_layer)
        .init();

    TelemetryGuard {
        incidents: incident_sink,
    }
}

/// Default directory for local state (`~/.dhraviq`).
pub fn default_data_dir() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
        .join(".dhraviq")
}
