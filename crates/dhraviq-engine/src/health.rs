use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{instrument, warn};

use dhraviq_core::provider::{GenerationOptions, LlmProvider};
use dhraviq_core::{Dependency, HealthReport, HealthStatus};
use dhraviq_store::{DocumentStore, HealthCheckRepo};

use crate::notify::{NotificationJob, NotificationSink};

pub const STORAGE_SERVICE: &str = "document_store";
pub const GENERATION_SERVICE: &str = "generation";
pub const NOTIFICATION_SERVICE: &str = "notifications";

const PROBE_TIMEOUT: Duration = Duration::from_secs(15);
const PROBE_PROMPT: &str = "Reply with the single word OK.";

/// Result of one dependency probe.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProbeResult {
    pub ok: bool,
    pub status: String,
}

impl ProbeResult {
    fn ok(status: &str) -> Self {
        Self {
            ok: true,
            status: status.to_string(),
        }
    }

    fn failed(status: impl Into<String>) -> Self {
        Self {
            ok: false,
            status: status.into(),
        }
    }
}

/// Storage and generation are required; notifications are advisory.
pub fn fold(storage_ok: bool, generation_ok: bool, notifications_ok: bool) -> HealthStatus {
    match (storage_ok && generation_ok, notifications_ok) {
        (true, true) => HealthStatus::Healthy,
        (true, false) => HealthStatus::Degraded,
        (false, _) => HealthStatus::Unhealthy,
    }
}

/// Probes every collaborator concurrently. One failing probe never prevents
/// the others from reporting.
pub struct HealthAggregator {
    store: Dependency<dyn DocumentStore>,
    generation: Dependency<dyn LlmProvider>,
    sink: Arc<dyn NotificationSink>,
}

impl HealthAggregator {
    pub fn new(
        store: Dependency<dyn DocumentStore>,
        generation: Dependency<dyn LlmProvider>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            store,
            generation,
            sink,
        }
    }

    #[instrument(skip(self))]
    pub async fn check(&self) -> HealthReport {
        let (storage, generation, notifications) = tokio::join!(
            self.probe_storage(),
            self.probe_generation(),
            self.probe_notifications(),
        );

        let status = fold(storage.ok, generation.ok, notifications.ok);
        if status != HealthStatus::Healthy {
            warn!(
                ?status,
                storage = %storage.status,
                generation = %generation.status,
                notifications = %notifications.status,
                "health check not healthy"
            );
        }

        HealthReport {
            status,
            services: BTreeMap::from([
                (STORAGE_SERVICE.to_string(), storage.status),
                (GENERATION_SERVICE.to_string(), generation.status),
                (NOTIFICATION_SERVICE.to_string(), notifications.status),
            ]),
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    async fn probe_storage(&self) -> ProbeResult {
        let store = match self.store.get() {
            Ok(store) => store,
            Err(_) => return ProbeResult::failed("initialization_failed"),
        };
        match HealthCheckRepo::new(Arc::clone(store)).round_trip().await {
            Ok(()) => ProbeResult::ok("connected"),
            Err(e) => ProbeResult::failed(format!("error: {e}")),
        }
    }

    async fn probe_generation(&self) -> ProbeResult {
        let provider = match self.generation.get() {
            Ok(provider) => provider,
            Err(_) => return ProbeResult::failed("initialization_failed"),
        };
        let options = GenerationOptions::probe();
        let call = provider.generate(PROBE_PROMPT, &options);
        match tokio::time::timeout(PROBE_TIMEOUT, call).await {
            Ok(Ok(completion)) if completion.text.is_some() => ProbeResult::ok("available"),
            Ok(Ok(_)) => ProbeResult::failed("no_response"),
            Ok(Err(e)) => ProbeResult::failed(format!("error: {e}")),
            Err(_) => ProbeResult::failed(format!("error: timed out after {PROBE_TIMEOUT:?}")),
        }
    }

    async fn probe_notifications(&self) -> ProbeResult {
        let job = NotificationJob {
            user_id: "health-check".into(),
            question: "This is a test notification from the health check endpoint".into(),
            email: Some("health@example.com".into()),
        };
        match self.sink.send(&job).await {
            Ok(()) => ProbeResult::ok("connected"),
            Err(_) => ProbeResult::failed("unavailable"),
        }
    }
}
