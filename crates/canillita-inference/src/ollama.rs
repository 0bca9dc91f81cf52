//! Ollama summarization backend.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use canillita_core::{defaults, Error, Result, SummarizationClient, SummaryContext, Transcript};

use crate::prompt::{summary_prompt, system_prompt, DEFAULT_SUMMARY_LANGUAGE};

/// Default Ollama endpoint.
pub const DEFAULT_OLLAMA_URL: &str = defaults::OLLAMA_URL;

/// Default summarization model.
pub const DEFAULT_SUMMARY_MODEL: &str = defaults::SUMMARY_MODEL;

/// Summaries slower than this are logged as slow.
const SLOW_SUMMARY_MS: u64 = 30_000;

/// Summarizer backed by the Ollama chat API.
pub struct OllamaSummarizer {
    client: Client,
    base_url: String,
    model: String,
    timeout: Duration,
}

impl OllamaSummarizer {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let model = model.into();
        info!(
            subsystem = "inference",
            component = "ollama",
            url = %base_url,
            model = %model,
            timeout_secs = timeout.as_secs(),
            "Initializing Ollama summarizer"
        );
        Ok(Self {
            client,
            base_url,
            model,
            timeout,
        })
    }

    /// Create from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `OLLAMA_BASE` | `http://localhost:11434` |
    /// | `OLLAMA_GEN_MODEL` | `llama3.1:8b` |
    /// | `CANILLITA_SUMMARIZE_TIMEOUT_SECS` | `90` |
    pub fn from_env() -> Result<Self> {
        let base_url =
            std::env::var("OLLAMA_BASE").unwrap_or_else(|_| DEFAULT_OLLAMA_URL.to_string());
        let model = std::env::var("OLLAMA_GEN_MODEL")
            .ok()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SUMMARY_MODEL.to_string());
        let timeout = std::env::var("CANILLITA_SUMMARIZE_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults::SUMMARIZE_TIMEOUT_SECS);
        Self::new(base_url, model, Duration::from_secs(timeout))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// Chat API message for `/api/chat`.
#[derive(Serialize, Deserialize, Clone)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    /// Suppress chain-of-thought output on reasoning models.
    think: bool,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ChatMessage,
}

/// The summarizer being down or overloaded is `Unavailable`; anything the
/// model server rejects outright is permanent.
fn map_transport_error(e: reqwest::Error) -> Error {
    if e.is_timeout() || e.is_connect() {
        Error::Unavailable(format!("summarizer unreachable: {}", e))
    } else {
        Error::from(e)
    }
}

fn map_status(status: u16, body: &str) -> Error {
    match status {
        429 | 500..=599 => Error::Unavailable(format!("Ollama returned {}: {}", status, body)),
        _ => Error::Permanent(format!("Ollama returned {}: {}", status, body)),
    }
}

#[async_trait]
impl SummarizationClient for OllamaSummarizer {
    #[instrument(
        skip(self, transcript, context),
        fields(
            subsystem = "inference",
            component = "ollama",
            op = "summarize",
            model = %self.model,
            video_id = %transcript.video_id
        )
    )]
    async fn summarize(&self, transcript: &Transcript, context: &SummaryContext) -> Result<String> {
        let start = Instant::now();
        let language = context
            .language
            .as_deref()
            .unwrap_or(DEFAULT_SUMMARY_LANGUAGE);
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system_prompt(language),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: summary_prompt(transcript, context),
                },
            ],
            stream: false,
            think: false,
        };

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(map_status(status.as_u16(), &body));
        }

        let result: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::Unavailable(format!("failed to parse summarizer response: {}", e)))?;
        let summary = result.message.content.trim().to_string();
        if summary.is_empty() {
            return Err(Error::Unavailable("summarizer returned an empty summary".to_string()));
        }

        let elapsed = start.elapsed().as_millis() as u64;
        debug!(
            summary_len = summary.len(),
            duration_ms = elapsed,
            "Summary complete"
        );
        if elapsed > SLOW_SUMMARY_MS {
            warn!(duration_ms = elapsed, slow = true, "Slow summarization");
        }
        Ok(summary)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canillita_core::ErrorKind;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn transcript() -> Transcript {
        Transcript {
            video_id: "dQw4w9WgXcQ".to_string(),
            text: "Hoy hablamos de la inflación y de las tasas de interés.".to_string(),
            language: Some("es".to_string()),
        }
    }

    fn context() -> SummaryContext {
        SummaryContext {
            title: Some("Economía semanal".to_string()),
            url: "https://youtu.be/dQw4w9WgXcQ".to_string(),
            language: None,
        }
    }

    fn summarizer(server: &MockServer) -> OllamaSummarizer {
        OllamaSummarizer::new(server.uri(), "test-model", Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(map_status(503, "").kind(), ErrorKind::Unavailable);
        assert_eq!(map_status(429, "").kind(), ErrorKind::Unavailable);
        assert_eq!(map_status(404, "model not found").kind(), ErrorKind::Permanent);
    }

    #[test]
    fn test_chat_request_serialization() {
        let request = ChatRequest {
            model: "m".to_string(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: "hola".to_string(),
            }],
            stream: false,
            think: false,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["stream"], false);
        assert_eq!(json["messages"][0]["role"], "user");
    }

    #[tokio::test]
    async fn test_summarize_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_partial_json(serde_json::json!({ "model": "test-model", "stream": false })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "message": { "role": "assistant", "content": "  El video repasa la inflación.  " }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let summary = summarizer(&server)
            .summarize(&transcript(), &context())
            .await
            .unwrap();
        assert_eq!(summary, "El video repasa la inflación.");
    }

    #[tokio::test]
    async fn test_server_error_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("loading model"))
            .mount(&server)
            .await;

        let err = summarizer(&server)
            .summarize(&transcript(), &context())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unavailable);
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_empty_summary_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "message": { "role": "assistant", "content": "   " }
            })))
            .mount(&server)
            .await;

        let err = summarizer(&server)
            .summarize(&transcript(), &context())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unavailable);
    }

    #[tokio::test]
    async fn test_unreachable_server_is_unavailable() {
        // Nothing listens on the discard port.
        let summarizer =
            OllamaSummarizer::new("http://127.0.0.1:9", "m", Duration::from_secs(2)).unwrap();
        let err = summarizer
            .summarize(&transcript(), &context())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unavailable);
    }
}
