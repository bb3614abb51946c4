use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::instrument;

use dhraviq_core::ids::SessionId;
use dhraviq_core::SessionRecord;

use crate::documents::DocumentStore;
use crate::error::StoreError;

pub const COLLECTION: &str = "sessions";

/// Everything a session document holds except the store-assigned fields.
#[derive(Clone, Debug)]
pub struct NewSession {
    pub user_id: String,
    pub question: String,
    pub agents: Vec<String>,
    pub responses: BTreeMap<String, String>,
    pub is_technical: bool,
    pub technical_keywords: Vec<String>,
}

/// Append-only access to the `sessions` collection.
#[derive(Clone)]
pub struct SessionRepo {
    store: Arc<dyn DocumentStore>,
}

impl SessionRepo {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Write a new session document under a fresh id.
    #[instrument(skip(self, session), fields(user_id = %session.user_id))]
    pub async fn create(&self, session: NewSession) -> Result<(SessionId, SessionRecord), StoreError> {
        let id = SessionId::new();
        let record = SessionRecord {
            user_id: session.user_id,
            question: session.question,
            agents: session.agents,
            responses: session.responses,
            created_at: Utc::now().to_rfc3339(),
            is_technical: session.is_technical,
            technical_keywords: session.technical_keywords,
        };

        let doc = serde_json::to_value(&record)?;
        self.store.create(COLLECTION, id.as_str(), doc).await?;
        Ok((id, record))
    }

    #[instrument(skip(self), fields(session_id = %id))]
    pub async fn get(&self, id: &SessionId) -> Result<SessionRecord, StoreError> {
        match self.store.get(COLLECTION, id.as_str()).await? {
            Some(doc) => Ok(serde_json::from_value(doc)?),
            None => Err(StoreError::NotFound(format!("session {id}"))),
        }
    }
}
