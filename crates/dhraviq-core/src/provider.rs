use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::GatewayError;

/// Sampling parameters sent with every completion request.
#[derive(Clone, Debug, PartialEq)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub top_p: f32,
    pub max_output_tokens: u32,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: 0.3,
            top_p: 0.95,
            max_output_tokens: 2048,
        }
    }
}

impl GenerationOptions {
    /// Smallest useful request, used by liveness probes.
    pub fn probe() -> Self {
        Self {
            max_output_tokens: 8,
            ..Self::default()
        }
    }
}

/// Result of a single completion call. `text` is `None` when the backend
/// answered successfully but produced no text (e.g. every candidate was
/// filtered).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Completion {
    pub text: Option<String>,
}

impl Completion {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
        }
    }

    pub fn empty() -> Self {
        Self { text: None }
    }
}

/// Trait implemented by each text-completion backend.
///
/// Implementations must be safe to call concurrently: one handle is shared by
/// every agent invocation in the process.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &str;
    fn model(&self) -> &str;

    async fn generate(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<Completion, GatewayError>;
}

#[async_trait]
impl<P: LlmProvider + ?Sized> LlmProvider for Arc<P> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn model(&self) -> &str {
        (**self).model()
    }

    async fn generate(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<Completion, GatewayError> {
        (**self).generate(prompt, options).await
    }
}
