use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{info, instrument};

use dhraviq_core::ids::SessionId;
use dhraviq_core::{keywords, AgentRequest};
use dhraviq_store::sessions::NewSession;
use dhraviq_store::{DocumentStore, SessionRepo, StoreError, UserRepo};

/// Persists fan-out results and reminder preferences.
#[derive(Clone)]
pub struct SessionRecorder {
    sessions: SessionRepo,
    users: UserRepo,
}

impl SessionRecorder {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            sessions: SessionRepo::new(store.clone()),
            users: UserRepo::new(store),
        }
    }

    /// Append one session document. Called at most once per fan-out.
    #[instrument(skip_all, fields(user_id = %request.user_id))]
    pub async fn record(
        &self,
        request: &AgentRequest,
        responses: &BTreeMap<String, String>,
        is_technical: bool,
    ) -> Result<SessionId, StoreError> {
        let (session_id, _) = self
            .sessions
            .create(NewSession {
                user_id: request.user_id.clone(),
                question: request.question.clone(),
                agents: request.agents.clone(),
                responses: responses.clone(),
                is_technical,
                technical_keywords: keywords::extract(&request.question),
            })
            .await?;

        info!(session_id = %session_id, "session recorded");
        Ok(session_id)
    }

    /// Merge-upsert the reminder fields on the user document.
    #[instrument(skip_all, fields(user_id = %request.user_id))]
    pub async fn remember(&self, request: &AgentRequest) -> Result<(), StoreError> {
        self.users
            .enable_reminder(&request.user_id, &request.question, request.email.as_deref())
            .await?;
        info!("reminder question saved");
        Ok(())
    }
}
