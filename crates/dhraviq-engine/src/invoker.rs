use std::sync::Arc;

use tracing::{debug, instrument, warn};

use dhraviq_core::provider::{GenerationOptions, LlmProvider};
use dhraviq_core::{agents, prompt, AgentOutcome};

/// Text returned when the backend answered but produced nothing.
pub const NO_RESPONSE_TEXT: &str = "No response was generated.";

/// Text returned in place of an answer when every attempt failed.
pub fn unavailable_text(agent_id: &str) -> String {
    format!("⚠️ {agent_id} is currently unavailable. Please try again later.")
}

/// Runs one agent against the generation backend.
///
/// The provider is expected to carry its own timeout and retry behaviour
/// (`ReliableProvider` in production); whatever error survives that is turned
/// into fallback text here.
#[derive(Clone)]
pub struct AgentInvoker {
    provider: Arc<dyn LlmProvider>,
    options: GenerationOptions,
}

impl AgentInvoker {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            provider,
            options: GenerationOptions::default(),
        }
    }

    /// Never fails: backend errors become an outcome with fallback text and
    /// `is_technical = false`.
    #[instrument(skip(self, question), fields(agent = %agent_id))]
    pub async fn invoke(&self, agent_id: &str, question: &str) -> AgentOutcome {
        if !agents::is_known(agent_id) {
            debug!("unknown agent id, using the generic specialization");
        }
        let specialization = agents::lookup(agent_id);
        let prompt = prompt::build(&specialization, question);

        match self.provider.generate(&prompt, &self.options).await {
            Ok(completion) => {
                let text = completion
                    .text
                    .filter(|t| !t.trim().is_empty())
                    .unwrap_or_else(|| NO_RESPONSE_TEXT.to_string());
                debug!(chars = text.len(), "agent answered");
                AgentOutcome {
                    agent_id: agent_id.to_string(),
                    response_text: text,
                    is_technical: true,
                }
            }
            Err(error) => {
                warn!(
                    error_kind = error.error_kind(),
                    error = %error,
                    "agent invocation failed, using fallback text"
                );
                AgentOutcome {
                    agent_id: agent_id.to_string(),
                    response_text: unavailable_text(agent_id),
                    is_technical: false,
                }
            }
        }
    }
}
