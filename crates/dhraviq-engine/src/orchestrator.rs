//! Fan-out of one question to several agents, then aggregation.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::join_all;
use tracing::{info, instrument, warn};

use dhraviq_core::provider::LlmProvider;
use dhraviq_core::{
    AgentOutcome, AgentRequest, AggregatedResponse, Dependency, ResponseStatus,
};
use dhraviq_store::DocumentStore;

use crate::error::OrchestratorError;
use crate::invoker::AgentInvoker;
use crate::notify::{NotificationJob, NotificationQueue};
use crate::recorder::SessionRecorder;

const SESSION_NOT_SAVED: &str = "Responses were generated but the session could not be saved.";
const REMINDER_NOT_SAVED: &str = "The reminder could not be saved; no notification was sent.";

/// Fold outcomes in request order. A repeated agent id keeps the last
/// outcome; the flag is the OR over every outcome.
pub fn aggregate(outcomes: Vec<AgentOutcome>) -> (BTreeMap<String, String>, bool) {
    let is_technical = outcomes.iter().any(|o| o.is_technical);
    let responses = outcomes
        .into_iter()
        .map(|o| (o.agent_id, o.response_text))
        .collect();
    (responses, is_technical)
}

pub struct FanOutOrchestrator {
    generation: Dependency<dyn LlmProvider>,
    store: Dependency<dyn DocumentStore>,
    notifications: Arc<dyn NotificationQueue>,
}

impl FanOutOrchestrator {
    pub fn new(
        generation: Dependency<dyn LlmProvider>,
        store: Dependency<dyn DocumentStore>,
        notifications: Arc<dyn NotificationQueue>,
    ) -> Self {
        Self {
            generation,
            store,
            notifications,
        }
    }

    /// Run every requested agent concurrently and aggregate the answers.
    ///
    /// Only validation and missing dependencies are errors. A failing agent
    /// degrades to fallback text; a failing write degrades the status to
    /// `partial_success`.
    #[instrument(skip_all, fields(user_id = %request.user_id, agents = request.agents.len()))]
    pub async fn run(&self, request: &AgentRequest) -> Result<AggregatedResponse, OrchestratorError> {
        request.validate()?;

        let provider = self
            .generation
            .get()
            .map_err(|reason| OrchestratorError::DependencyUnavailable {
                dependency: "generation",
                reason: reason.to_string(),
            })?;
        let store = self
            .store
            .get()
            .map_err(|reason| OrchestratorError::DependencyUnavailable {
                dependency: "document_store",
                reason: reason.to_string(),
            })?;

        if request.has_duplicate_agents() {
            warn!(agents = ?request.agents, "duplicate agent ids; last answer wins");
        }

        let invoker = AgentInvoker::new(Arc::clone(provider));
        let outcomes = join_all(
            request
                .agents
                .iter()
                .map(|agent| invoker.invoke(agent, &request.question)),
        )
        .await;

        let failed = outcomes.iter().filter(|o| !o.is_technical).count();
        let (responses, is_technical) = aggregate(outcomes);
        info!(
            answered = request.agents.len() - failed,
            failed, "fan-out complete"
        );

        let recorder = SessionRecorder::new(Arc::clone(store));
        let mut problems = Vec::new();

        let session_id = match recorder.record(request, &responses, is_technical).await {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(error = %e, "failed to record session");
                problems.push(SESSION_NOT_SAVED);
                None
            }
        };

        if request.send_reminder {
            match recorder.remember(request).await {
                Ok(()) => self.notify(request),
                Err(e) => {
                    warn!(error = %e, "failed to save reminder");
                    problems.push(REMINDER_NOT_SAVED);
                }
            }
        }

        let (status, message) = if problems.is_empty() {
            (ResponseStatus::Success, None)
        } else {
            (ResponseStatus::PartialSuccess, Some(problems.join(" ")))
        };

        Ok(AggregatedResponse {
            status,
            session_id,
            responses,
            message,
        })
    }

    fn notify(&self, request: &AgentRequest) {
        let job = NotificationJob {
            user_id: request.user_id.clone(),
            question: request.question.clone(),
            email: request.email.clone(),
        };
        if let Err(e) = self.notifications.enqueue(job) {
            warn!(error = %e, "notification not queued");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoker::unavailable_text;
    use crate::notify::NotifyError;
    use async_trait::async_trait;
    use dhraviq_core::{GatewayError, ValidationError};
    use dhraviq_llm::mock::{MockProvider, MockResponse};
    use dhraviq_store::{Database, SessionRepo, SqliteDocumentStore, StoreError, UserRepo};
    use parking_lot::Mutex;
    use serde_json::Value;

    #[derive(Default)]
    struct FakeQueue {
        jobs: Mutex<Vec<NotificationJob>>,
    }

    impl NotificationQueue for FakeQueue {
        fn enqueue(&self, job: NotificationJob) -> Result<(), NotifyError> {
            self.jobs.lock().push(job);
            Ok(())
        }
    }

    struct FullQueue;

    impl NotificationQueue for FullQueue {
        fn enqueue(&self, _job: NotificationJob) -> Result<(), NotifyError> {
            Err(NotifyError::QueueFull)
        }
    }

    /// Fails writes to the listed collections, delegates everything else.
    struct FailingCollections {
        inner: SqliteDocumentStore,
        failing: &'static [&'static str],
    }

    impl FailingCollections {
        fn check(&self, collection: &str) -> Result<(), StoreError> {
            if self.failing.contains(&collection) {
                Err(StoreError::Database("write rejected".into()))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl DocumentStore for FailingCollections {
        async fn create(&self, collection: &str, id: &str, doc: Value) -> Result<(), StoreError> {
            self.check(collection)?;
            self.inner.create(collection, id, doc).await
        }
        async fn set(
            &self,
            collection: &str,
            id: &str,
            doc: Value,
            merge: bool,
        ) -> Result<(), StoreError> {
            self.check(collection)?;
            self.inner.set(collection, id, doc, merge).await
        }
        async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, StoreError> {
            self.inner.get(collection, id).await
        }
    }

    struct Harness {
        mock: Arc<MockProvider>,
        sqlite: Arc<SqliteDocumentStore>,
        queue: Arc<FakeQueue>,
        orchestrator: FanOutOrchestrator,
    }

    fn harness(mock: MockProvider) -> Harness {
        let sqlite = Arc::new(SqliteDocumentStore::new(Database::in_memory().unwrap()));
        harness_with_store(mock, sqlite.clone(), sqlite)
    }

    fn harness_with_store(
        mock: MockProvider,
        sqlite: Arc<SqliteDocumentStore>,
        store: Arc<dyn DocumentStore>,
    ) -> Harness {
        let mock = Arc::new(mock);
        let queue = Arc::new(FakeQueue::default());
        let provider: Arc<dyn LlmProvider> = mock.clone();
        let orchestrator = FanOutOrchestrator::new(
            Dependency::available(provider),
            Dependency::available(store),
            queue.clone(),
        );
        Harness {
            mock,
            sqlite,
            queue,
            orchestrator,
        }
    }

    fn failing_store(failing: &'static [&'static str]) -> (Arc<SqliteDocumentStore>, Arc<dyn DocumentStore>) {
        let db = Database::in_memory().unwrap();
        let sqlite = Arc::new(SqliteDocumentStore::new(db.clone()));
        let store: Arc<dyn DocumentStore> = Arc::new(FailingCollections {
            inner: SqliteDocumentStore::new(db),
            failing,
        });
        (sqlite, store)
    }

    fn request(agents: &[&str], question: &str) -> AgentRequest {
        AgentRequest {
            user_id: "u1".into(),
            question: question.into(),
            agents: agents.iter().map(|a| a.to_string()).collect(),
            email: None,
            send_reminder: false,
        }
    }

    #[tokio::test]
    async fn keys_equal_requested_agents() {
        let h = harness(MockProvider::always(MockResponse::text("advice")));
        let agents = ["GoalClarifier", "SkillMap", "TimelineWizard", "ProgressCoach", "MindsetMentor"];

        let resp = h.orchestrator.run(&request(&agents, "Plan my year")).await.unwrap();

        assert_eq!(resp.status, ResponseStatus::Success);
        assert!(resp.session_id.is_some());
        let keys: Vec<&str> = resp.responses.keys().map(String::as_str).collect();
        let mut expected = agents.to_vec();
        expected.sort();
        assert_eq!(keys, expected);
        assert_eq!(h.mock.call_count(), 5);
    }

    #[tokio::test]
    async fn six_agents_rejected_before_any_work() {
        let h = harness(MockProvider::always(MockResponse::text("advice")));
        let agents = ["A", "B", "C", "D", "E", "F"];

        let err = h.orchestrator.run(&request(&agents, "q")).await.unwrap_err();

        assert!(matches!(
            err,
            OrchestratorError::Validation(ValidationError::TooManyAgents { requested: 6 })
        ));
        assert_eq!(err.to_string(), "Maximum 5 agents allowed");
        assert_eq!(h.mock.call_count(), 0);
        assert_eq!(h.sqlite.count("sessions").unwrap(), 0);
    }

    #[tokio::test]
    async fn empty_agents_and_blank_question_rejected() {
        let h = harness(MockProvider::always(MockResponse::text("advice")));

        assert!(matches!(
            h.orchestrator.run(&request(&[], "q")).await,
            Err(OrchestratorError::Validation(ValidationError::NoAgents))
        ));
        assert!(matches!(
            h.orchestrator.run(&request(&["SkillMap"], "   ")).await,
            Err(OrchestratorError::Validation(ValidationError::EmptyQuestion))
        ));
        assert_eq!(h.mock.call_count(), 0);
    }

    #[tokio::test]
    async fn one_failing_agent_is_isolated() {
        let h = harness(MockProvider::routed(
            vec![(
                "Skill Map",
                MockResponse::Error(GatewayError::AuthenticationFailed("revoked".into())),
            )],
            MockResponse::text("solid advice"),
        ));

        let resp = h
            .orchestrator
            .run(&request(&["GoalClarifier", "SkillMap", "MindsetMentor"], "Learn Rust"))
            .await
            .unwrap();

        assert_eq!(resp.status, ResponseStatus::Success);
        assert_eq!(resp.responses["SkillMap"], unavailable_text("SkillMap"));
        assert_eq!(resp.responses["GoalClarifier"], "solid advice");
        assert_eq!(resp.responses["MindsetMentor"], "solid advice");

        let id = resp.session_id.unwrap();
        let record = SessionRepo::new(h.sqlite.clone()).get(&id).await.unwrap();
        assert_eq!(record.responses, resp.responses);
        assert!(record.is_technical);
    }

    #[tokio::test]
    async fn every_agent_failing_still_records_non_technical_session() {
        let h = harness(MockProvider::always(MockResponse::Error(
            GatewayError::InvalidRequest("bad".into()),
        )));

        let resp = h.orchestrator.run(&request(&["SkillMap"], "q")).await.unwrap();

        assert_eq!(resp.status, ResponseStatus::Success);
        let record = SessionRepo::new(h.sqlite.clone())
            .get(resp.session_id.as_ref().unwrap())
            .await
            .unwrap();
        assert!(!record.is_technical);
    }

    #[tokio::test]
    async fn storage_failure_is_partial_success_with_same_responses() {
        let (sqlite, store) = failing_store(&["sessions"]);
        let h = harness_with_store(
            MockProvider::always(MockResponse::text("advice")),
            sqlite,
            store,
        );

        let resp = h
            .orchestrator
            .run(&request(&["GoalClarifier", "SkillMap"], "q"))
            .await
            .unwrap();

        assert_eq!(resp.status, ResponseStatus::PartialSuccess);
        assert_eq!(resp.session_id, None);
        assert_eq!(resp.responses.len(), 2);
        assert!(resp.responses.values().all(|t| t == "advice"));
        assert_eq!(resp.message.as_deref(), Some(SESSION_NOT_SAVED));

        let json = serde_json::to_value(&resp).unwrap();
        assert!(json["sessionId"].is_null());
        assert_eq!(json["status"], "partial_success");
    }

    #[tokio::test]
    async fn greeting_scenario() {
        let h = harness(MockProvider::routed(
            vec![
                ("Goal Clarifier", MockResponse::text("Hi, I clarify goals.")),
                ("Mindset Mentor", MockResponse::text("Hi, I build mindset.")),
            ],
            MockResponse::text("unexpected"),
        ));

        let resp = h
            .orchestrator
            .run(&request(&["GoalClarifier", "MindsetMentor"], "hi"))
            .await
            .unwrap();

        assert_eq!(resp.status, ResponseStatus::Success);
        assert_eq!(
            resp.responses,
            BTreeMap::from([
                ("GoalClarifier".to_string(), "Hi, I clarify goals.".to_string()),
                ("MindsetMentor".to_string(), "Hi, I build mindset.".to_string()),
            ])
        );
        let record = SessionRepo::new(h.sqlite.clone())
            .get(resp.session_id.as_ref().unwrap())
            .await
            .unwrap();
        assert!(record.is_technical);
        assert!(record.technical_keywords.is_empty());
    }

    #[tokio::test]
    async fn duplicate_agents_last_write_wins() {
        let h = harness(MockProvider::always(MockResponse::text("advice")));

        let resp = h
            .orchestrator
            .run(&request(&["SkillMap", "SkillMap"], "q"))
            .await
            .unwrap();

        assert_eq!(resp.responses.len(), 1);
        assert_eq!(h.mock.call_count(), 2);
    }

    #[test]
    fn aggregate_keeps_last_duplicate() {
        let outcome = |id: &str, text: &str, ok: bool| AgentOutcome {
            agent_id: id.into(),
            response_text: text.into(),
            is_technical: ok,
        };
        let (responses, is_technical) = aggregate(vec![
            outcome("SkillMap", "first", true),
            outcome("GoalClarifier", "g", false),
            outcome("SkillMap", "second", false),
        ]);

        assert_eq!(responses["SkillMap"], "second");
        assert!(is_technical);
    }

    #[tokio::test]
    async fn reminder_enqueues_exactly_one_notification() {
        let h = harness(MockProvider::always(MockResponse::text("advice")));
        let mut req = request(&["ProgressCoach"], "Keep me on track");
        req.send_reminder = true;
        req.email = Some("u1@example.com".into());

        let resp = h.orchestrator.run(&req).await.unwrap();

        assert_eq!(resp.status, ResponseStatus::Success);
        let jobs = h.queue.jobs.lock().clone();
        assert_eq!(
            jobs,
            [NotificationJob {
                user_id: "u1".into(),
                question: "Keep me on track".into(),
                email: Some("u1@example.com".into()),
            }]
        );
        let state = UserRepo::new(h.sqlite.clone()).reminder("u1").await.unwrap().unwrap();
        assert!(state.reminder_enabled);
    }

    #[tokio::test]
    async fn no_reminder_no_notification() {
        let h = harness(MockProvider::always(MockResponse::text("advice")));

        h.orchestrator.run(&request(&["ProgressCoach"], "q")).await.unwrap();

        assert!(h.queue.jobs.lock().is_empty());
        assert!(UserRepo::new(h.sqlite.clone()).reminder("u1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn reminder_failure_skips_notification_and_keeps_session() {
        let (sqlite, store) = failing_store(&["users"]);
        let h = harness_with_store(
            MockProvider::always(MockResponse::text("advice")),
            sqlite,
            store,
        );
        let mut req = request(&["ProgressCoach"], "q");
        req.send_reminder = true;

        let resp = h.orchestrator.run(&req).await.unwrap();

        assert_eq!(resp.status, ResponseStatus::PartialSuccess);
        assert!(resp.session_id.is_some());
        assert_eq!(resp.message.as_deref(), Some(REMINDER_NOT_SAVED));
        assert!(h.queue.jobs.lock().is_empty());
    }

    #[tokio::test]
    async fn full_queue_does_not_affect_response() {
        let sqlite = Arc::new(SqliteDocumentStore::new(Database::in_memory().unwrap()));
        let provider: Arc<dyn LlmProvider> =
            Arc::new(MockProvider::always(MockResponse::text("advice")));
        let store: Arc<dyn DocumentStore> = sqlite;
        let orchestrator = FanOutOrchestrator::new(
            Dependency::available(provider),
            Dependency::available(store),
            Arc::new(FullQueue),
        );
        let mut req = request(&["ProgressCoach"], "q");
        req.send_reminder = true;

        let resp = orchestrator.run(&req).await.unwrap();
        assert_eq!(resp.status, ResponseStatus::Success);
    }

    #[tokio::test]
    async fn unavailable_dependencies_rejected_before_work() {
        let mock = Arc::new(MockProvider::always(MockResponse::text("advice")));
        let provider: Arc<dyn LlmProvider> = mock.clone();
        let orchestrator = FanOutOrchestrator::new(
            Dependency::available(provider),
            Dependency::unavailable("database open failed"),
            Arc::new(FakeQueue::default()),
        );

        let err = orchestrator.run(&request(&["SkillMap"], "q")).await.unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::DependencyUnavailable { dependency: "document_store", .. }
        ));
        assert_eq!(mock.call_count(), 0);

        let store: Arc<dyn DocumentStore> =
            Arc::new(SqliteDocumentStore::new(Database::in_memory().unwrap()));
        let orchestrator = FanOutOrchestrator::new(
            Dependency::unavailable("missing api key"),
            Dependency::available(store),
            Arc::new(FakeQueue::default()),
        );
        let err = orchestrator.run(&request(&["SkillMap"], "q")).await.unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::DependencyUnavailable { dependency: "generation", .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn invocations_run_concurrently() {
        let h = harness(MockProvider::always(MockResponse::delayed(
            std::time::Duration::from_secs(5),
            MockResponse::text("slow"),
        )));
        let start = tokio::time::Instant::now();

        h.orchestrator
            .run(&request(&["GoalClarifier", "SkillMap", "TimelineWizard"], "q"))
            .await
            .unwrap();

        // Three 5s calls joined together, not back to back
        assert!(start.elapsed() < std::time::Duration::from_secs(6));
        let times = h.mock.call_times();
        assert!(times.iter().all(|t| *t == times[0]));
    }
}
