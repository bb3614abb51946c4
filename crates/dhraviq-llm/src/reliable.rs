use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use dhraviq_core::errors::GatewayError;
use dhraviq_core::provider::{Completion, GenerationOptions, LlmProvider};

use crate::retry::{RetryDecision, RetryPolicy, RetryState};

/// Configuration for the ReliableProvider timeout and retry behavior.
#[derive(Clone, Debug)]
pub struct ReliableConfig {
    /// Deadline for a single backend call. Expiry cancels that call only.
    pub attempt_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for ReliableConfig {
    fn default() -> Self {
        Self {
            attempt_timeout: Duration::from_secs(15),
            retry: RetryPolicy::default(),
        }
    }
}

/// Wraps an LlmProvider with a per-attempt timeout and bounded retries.
///
/// - Each attempt races the inner call against `attempt_timeout`
/// - Transient errors and timeouts are retried with exponential backoff
/// - Fatal errors (authentication, invalid request) fail immediately
/// - Holds no state shared between calls
pub struct ReliableProvider<P: LlmProvider> {
    inner: P,
    config: ReliableConfig,
}

impl<P: LlmProvider> ReliableProvider<P> {
    pub fn new(inner: P, config: ReliableConfig) -> Self {
        Self { inner, config }
    }

    pub fn with_defaults(inner: P) -> Self {
        Self::new(inner, ReliableConfig::default())
    }

    async fn attempt(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<Completion, GatewayError> {
        match tokio::time::timeout(
            self.config.attempt_timeout,
            self.inner.generate(prompt, options),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(GatewayError::Timeout(self.config.attempt_timeout)),
        }
    }
}

#[async_trait]
impl<P: LlmProvider> LlmProvider for ReliableProvider<P> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn model(&self) -> &str {
        self.inner.model()
    }

    async fn generate(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<Completion, GatewayError> {
        let mut state = RetryState::new(self.config.retry.clone());

        loop {
            let attempt = state.begin_attempt();
            let error = match self.attempt(prompt, options).await {
                Ok(completion) => return Ok(completion),
                Err(e) => e,
            };

            match state.on_failure(&error) {
                RetryDecision::Retry(delay) => {
                    warn!(
                        attempt,
                        max_attempts = self.config.retry.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error_kind = error.error_kind(),
                        error = %error,
                        "retrying after error"
                    );
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::GiveUp => return Err(error),
            }
        }
    }
}
