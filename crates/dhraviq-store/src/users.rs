use std::sync::Arc;

use chrono::Utc;
use tracing::instrument;

use dhraviq_core::ReminderState;

use crate::documents::DocumentStore;
use crate::error::StoreError;

pub const COLLECTION: &str = "users";

/// Reminder preferences on user documents. Other user fields are never
/// touched.
#[derive(Clone)]
pub struct UserRepo {
    store: Arc<dyn DocumentStore>,
}

impl UserRepo {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Enable reminders for `user_id` with `question` as the reminder text.
    #[instrument(skip(self, question, email))]
    pub async fn enable_reminder(
        &self,
        user_id: &str,
        question: &str,
        email: Option<&str>,
    ) -> Result<ReminderState, StoreError> {
        let state = ReminderState {
            reminder_enabled: true,
            reminder_question: question.trim().to_string(),
            last_updated: Utc::now().to_rfc3339(),
            email: email.filter(|e| !e.is_empty()).map(str::to_string),
        };

        let doc = serde_json::to_value(&state)?;
        self.store.set(COLLECTION, user_id, doc, true).await?;
        Ok(state)
    }

    #[instrument(skip(self))]
    pub async fn reminder(&self, user_id: &str) -> Result<Option<ReminderState>, StoreError> {
        match self.store.get(COLLECTION, user_id).await? {
            Some(doc) => Ok(Some(serde_json::from_value(doc)?)),
            None => Ok(None),
        }
    }
}
