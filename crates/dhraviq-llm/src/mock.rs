use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use dhraviq_core::errors::GatewayError;
use dhraviq_core::provider::{Completion, GenerationOptions, LlmProvider};

/// Pre-programmed responses for deterministic testing without API calls.
#[derive(Clone, Debug)]
pub enum MockResponse {
    /// Successful completion with text.
    Text(String),
    /// Successful completion without any text.
    Empty,
    /// Return an error from the generate() call itself.
    Error(GatewayError),
    /// Wait a duration, then yield the inner response.
    Delay(Duration, Box<MockResponse>),
}

impl MockResponse {
    pub fn text(text: &str) -> Self {
        Self::Text(text.to_string())
    }

    pub fn server_error() -> Self {
        Self::Error(GatewayError::ServerError {
            status: 500,
            body: "internal".into(),
        })
    }

    /// Convenience: wrap any response with a delay.
    pub fn delayed(delay: Duration, inner: MockResponse) -> Self {
        Self::Delay(delay, Box::new(inner))
    }
}

enum Script {
    /// Responses handed out in call order.
    Sequence(Vec<MockResponse>),
    /// First route whose needle appears in the prompt wins; concurrent callers
    /// get deterministic answers regardless of scheduling order.
    Routes {
        routes: Vec<(String, MockResponse)>,
        fallback: MockResponse,
    },
}

/// Mock provider with call recording.
pub struct MockProvider {
    script: Script,
    call_count: AtomicUsize,
    calls: Mutex<Vec<(Instant, String)>>,
}

impl MockProvider {
    pub fn new(responses: Vec<MockResponse>) -> Self {
        Self::with_script(Script::Sequence(responses))
    }

    /// Answer every call with the same response.
    pub fn always(response: MockResponse) -> Self {
        Self::routed(Vec::new(), response)
    }

    /// Pick the response by matching a substring of the prompt, e.g. the
    /// persona name of the agent being invoked.
    pub fn routed(routes: Vec<(&str, MockResponse)>, fallback: MockResponse) -> Self {
        Self::with_script(Script::Routes {
            routes: routes
                .into_iter()
                .map(|(needle, response)| (needle.to_string(), response))
                .collect(),
            fallback,
        })
    }

    fn with_script(script: Script) -> Self {
        Self {
            script,
            call_count: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::Relaxed)
    }

    /// When each call started, in call order.
    pub fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().iter().map(|(at, _)| *at).collect()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.calls.lock().iter().map(|(_, p)| p.clone()).collect()
    }

    fn pick(&self, idx: usize, prompt: &str) -> Result<MockResponse, GatewayError> {
        match &self.script {
            Script::Sequence(responses) => responses.get(idx).cloned().ok_or_else(|| {
                GatewayError::InvalidRequest(format!(
                    "MockProvider: no response configured for call {idx}"
                ))
            }),
            Script::Routes { routes, fallback } => Ok(routes
                .iter()
                .find(|(needle, _)| prompt.contains(needle.as_str()))
                .map(|(_, response)| response.clone())
                .unwrap_or_else(|| fallback.clone())),
        }
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn model(&self) -> &str {
        "mock-model"
    }

    async fn generate(
        &self,
        prompt: &str,
        _options: &GenerationOptions,
    ) -> Result<Completion, GatewayError> {
        let idx = self.call_count.fetch_add(1, Ordering::Relaxed);
        self.calls.lock().push((Instant::now(), prompt.to_string()));

        let mut current = self.pick(idx, prompt)?;
        loop {
            match current {
                MockResponse::Text(text) => return Ok(Completion::text(text)),
                MockResponse::Empty => return Ok(Completion::empty()),
                MockResponse::Error(e) => return Err(e),
                MockResponse::Delay(duration, inner) => {
                    tokio::time::sleep(duration).await;
                    current = *inner;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn text_response() {
        let mock = MockProvider::new(vec![MockResponse::text("hello world")]);
        let result = mock.generate("prompt", &GenerationOptions::default()).await;
        assert_eq!(result.unwrap().text.as_deref(), Some("hello world"));
    }

    #[tokio::test]
    async fn sequential_responses_then_exhausted() {
        let mock = MockProvider::new(vec![MockResponse::text("first"), MockResponse::Empty]);
        let opts = GenerationOptions::default();

        assert!(mock.generate("a", &opts).await.unwrap().text.is_some());
        assert!(mock.generate("b", &opts).await.unwrap().text.is_none());
        assert!(matches!(
            mock.generate("c", &opts).await,
            Err(GatewayError::InvalidRequest(_))
        ));
        assert_eq!(mock.call_count(), 3);
        assert_eq!(mock.prompts(), ["a", "b", "c"]);
    }

    #[tokio::test]
    async fn routed_responses_match_prompt() {
        let mock = MockProvider::routed(
            vec![("Skill Map", MockResponse::server_error())],
            MockResponse::text("ok"),
        );
        let opts = GenerationOptions::default();

        assert!(mock.generate("You are Skill Map", &opts).await.is_err());
        assert_eq!(
            mock.generate("You are Goal Clarifier", &opts).await.unwrap().text.as_deref(),
            Some("ok")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn delayed_response() {
        let mock = MockProvider::always(MockResponse::delayed(
            Duration::from_millis(50),
            MockResponse::text("after delay"),
        ));

        let start = Instant::now();
        let result = mock.generate("p", &GenerationOptions::default()).await;
        assert!(start.elapsed() >= Duration::from_millis(50));
        assert_eq!(result.unwrap().text.as_deref(), Some("after delay"));
    }

    #[test]
    fn provider_properties() {
        let mock = MockProvider::new(vec![]);
        assert_eq!(mock.name(), "mock");
        assert_eq!(mock.model(), "mock-model");
    }
}
