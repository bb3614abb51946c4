use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use dhraviq_core::errors::GatewayError;
use dhraviq_core::provider::{Completion, GenerationOptions, LlmProvider};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MODEL: &str = "gemini-1.5-pro";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const API_KEY_HEADER: &str = "x-goog-api-key";

/// Google Gemini `generateContent` backend.
///
/// No request-level timeout is set on the client; per-attempt deadlines are
/// owned by `ReliableProvider`.
pub struct GeminiProvider {
    client: Client,
    api_key: SecretString,
    model: String,
    base_url: String,
}

impl GeminiProvider {
    pub fn new(api_key: SecretString, model: Option<&str>) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| GatewayError::NetworkError(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            model: model.unwrap_or(DEFAULT_MODEL).to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    /// Point the provider at a different host (local proxies, test servers).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        )
    }
}

// ── Wire format ─────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<TextPart<'a>>,
}

#[derive(Debug, Serialize)]
struct TextPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Default, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

fn build_request_body<'a>(prompt: &'a str, options: &GenerationOptions) -> GenerateRequest<'a> {
    GenerateRequest {
        contents: vec![Content {
            parts: vec![TextPart { text: prompt }],
        }],
        generation_config: GenerationConfig {
            temperature: options.temperature,
            top_p: options.top_p,
            max_output_tokens: options.max_output_tokens,
        },
    }
}

/// Concatenate the text parts of the first candidate. A response with no
/// candidates, or only non-text parts, is an empty completion.
fn parse_response(body: &str) -> Result<Completion, GatewayError> {
    let response: GenerateResponse = serde_json::from_str(body)
        .map_err(|e| GatewayError::MalformedResponse(e.to_string()))?;

    let text: String = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|p| p.text)
                .collect()
        })
        .unwrap_or_default();

    if text.is_empty() {
        Ok(Completion::empty())
    } else {
        Ok(Completion::text(text))
    }
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

// The URL is stripped so error text never carries request details.
fn map_send_error(e: reqwest::Error) -> GatewayError {
    if e.is_timeout() {
        GatewayError::Timeout(CONNECT_TIMEOUT)
    } else {
        GatewayError::NetworkError(e.without_url().to_string())
    }
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.model
    }

    #[instrument(skip(self, prompt, options), fields(model = %self.model))]
    async fn generate(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<Completion, GatewayError> {
        let body = build_request_body(prompt, options);

        let resp = self
            .client
            .post(self.endpoint())
            .header(API_KEY_HEADER, self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(map_send_error)?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let delay = retry_after(resp.headers());
            let body = resp.text().await.unwrap_or_default();
            return Err(match GatewayError::from_status(status, body) {
                GatewayError::RateLimited { .. } => GatewayError::RateLimited { retry_after: delay },
                other => other,
            });
        }

        let text = resp.text().await.map_err(map_send_error)?;
        parse_response(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const KEY: &str = "SUPER_SECRET_KEY_123";

    fn provider(base_url: &str) -> GeminiProvider {
        GeminiProvider::new(SecretString::from(KEY.to_string()), None)
            .unwrap()
            .with_base_url(base_url)
    }

    /// Serves one request with `body` and returns the raw request text.
    async fn serve_once(listener: TcpListener, body: &'static str) -> String {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut raw = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = socket.read(&mut buf).await.unwrap();
            raw.extend_from_slice(&buf[..n]);
            let text = String::from_utf8_lossy(&raw).to_string();
            if let Some(end) = text.find("\r\n\r\n") {
                let length = text[..end]
                    .lines()
                    .find_map(|l| {
                        let (name, value) = l.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if raw.len() >= end + 4 + length {
                    break;
                }
            }
            if n == 0 {
                break;
            }
        }
        let response = format!(
            "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
            body.len(),
            body
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        String::from_utf8_lossy(&raw).to_string()
    }

    #[tokio::test]
    async fn api_key_travels_in_header_not_url() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let server = tokio::spawn(serve_once(
            listener,
            r#"{"candidates":[{"content":{"parts":[{"text":"OK"}]}}]}"#,
        ));

        let completion = provider(&base)
            .generate("ping", &GenerationOptions::probe())
            .await
            .unwrap();
        assert_eq!(completion.text.as_deref(), Some("OK"));

        let request = server.await.unwrap();
        let request_line = request.lines().next().unwrap();
        assert!(!request_line.contains(KEY), "{request_line}");
        assert!(request
            .to_ascii_lowercase()
            .contains(&format!("x-goog-api-key: {}", KEY.to_ascii_lowercase())));
    }

    #[tokio::test]
    async fn network_error_text_omits_key_and_url() {
        // Nothing listens on port 1
        let err = provider("http://127.0.0.1:1")
            .generate("ping", &GenerationOptions::probe())
            .await
            .unwrap_err();
        let text = err.to_string();
        assert!(matches!(err, GatewayError::NetworkError(_)), "{text}");
        assert!(!text.contains(KEY), "{text}");
        assert!(!text.contains("127.0.0.1:1"), "{text}");
    }

    #[test]
    fn request_body_shape() {
        let body = build_request_body("Hello?", &GenerationOptions::default());
        let json = serde_json::to_value(&body).unwrap();

        assert_eq!(json["contents"][0]["parts"][0]["text"], "Hello?");
        let config = &json["generationConfig"];
        assert_eq!(config["maxOutputTokens"], 2048);
        assert!((config["temperature"].as_f64().unwrap() - 0.3).abs() < 1e-6);
        assert!((config["topP"].as_f64().unwrap() - 0.95).abs() < 1e-6);
    }

    #[test]
    fn parse_joins_text_parts_of_first_candidate() {
        let body = r#"{
            "candidates": [
                {"content": {"parts": [{"text": "Hello "}, {"text": "there"}]}},
                {"content": {"parts": [{"text": "ignored"}]}}
            ]
        }"#;
        let completion = parse_response(body).unwrap();
        assert_eq!(completion.text.as_deref(), Some("Hello there"));
    }

    #[test]
    fn parse_without_candidates_is_empty() {
        assert_eq!(parse_response("{}").unwrap(), Completion::empty());
        assert_eq!(
            parse_response(r#"{"candidates": [{"finishReason": "SAFETY"}]}"#).unwrap(),
            Completion::empty()
        );
    }

    #[test]
    fn parse_garbage_is_malformed() {
        assert!(matches!(
            parse_response("not json"),
            Err(GatewayError::MalformedResponse(_))
        ));
    }

    #[test]
    fn retry_after_header_in_seconds() {
        let mut headers = HeaderMap::new();
        assert_eq!(retry_after(&headers), None);

        headers.insert(RETRY_AFTER, HeaderValue::from_static("7"));
        assert_eq!(retry_after(&headers), Some(Duration::from_secs(7)));

        headers.insert(RETRY_AFTER, HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"));
        assert_eq!(retry_after(&headers), None);
    }

    #[test]
    fn endpoint_uses_model_and_base_url() {
        let provider = GeminiProvider::new(SecretString::from("k".to_string()), None)
            .unwrap()
            .with_base_url("http://127.0.0.1:9999/");
        assert_eq!(provider.model(), DEFAULT_MODEL);
        assert_eq!(
            provider.endpoint(),
            "http://127.0.0.1:9999/v1beta/models/gemini-1.5-pro:generateContent"
        );
    }
}
