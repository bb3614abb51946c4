use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ids::SessionId;

/// Upper bound on agents consulted by a single request.
pub const MAX_AGENTS: usize = 5;

/// Inbound question fanned out to one or more agents.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRequest {
    pub user_id: String,
    pub question: String,
    pub agents: Vec<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, alias = "send_email")]
    pub send_reminder: bool,
}

/// Request rejected before any work started.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Maximum 5 agents allowed")]
    TooManyAgents { requested: usize },
    #[error("At least one agent is required")]
    NoAgents,
    #[error("Question must not be empty")]
    EmptyQuestion,
}

impl AgentRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.agents.len() > MAX_AGENTS {
            return Err(ValidationError::TooManyAgents {
                requested: self.agents.len(),
            });
        }
        if self.agents.is_empty() {
            return Err(ValidationError::NoAgents);
        }
        if self.question.trim().is_empty() {
            return Err(ValidationError::EmptyQuestion);
        }
        Ok(())
    }

    /// True when the same agent id is listed more than once.
    pub fn has_duplicate_agents(&self) -> bool {
        let mut seen = std::collections::HashSet::new();
        !self.agents.iter().all(|a| seen.insert(a.as_str()))
    }
}

/// Result of one agent invocation. `is_technical` is true only when the text
/// came from a successful generation call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AgentOutcome {
    pub agent_id: String,
    pub response_text: String,
    pub is_technical: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Success,
    PartialSuccess,
    Error,
}

/// Response returned to the caller of the fan-out.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedResponse {
    pub status: ResponseStatus,
    pub session_id: Option<SessionId>,
    pub responses: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Persisted record of one fan-out. Written once.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub user_id: String,
    pub question: String,
    pub agents: Vec<String>,
    pub responses: BTreeMap<String, String>,
    pub created_at: String,
    pub is_technical: bool,
    pub technical_keywords: Vec<String>,
}

/// Reminder preferences stored on the user document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderState {
    pub reminder_enabled: bool,
    pub reminder_question: String,
    pub last_updated: String,
    pub email: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub services: BTreeMap<String, String>,
    pub timestamp: String,
}
