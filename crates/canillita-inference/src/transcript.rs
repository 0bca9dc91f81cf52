//! HTTP transcript service client.
//!
//! Talks to a sidecar that serves `GET {base}/transcripts/{video_id}` as JSON
//! (`{ "text": ..., "language": ... }`). A 404 means the video has no
//! transcript.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, instrument};

use canillita_core::{defaults, Error, Result, Transcript, TranscriptClient};

#[derive(Deserialize)]
struct TranscriptResponse {
    text: String,
    #[serde(default)]
    language: Option<String>,
}

pub struct HttpTranscriptClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTranscriptClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Returns `None` if `CANILLITA_TRANSCRIPT_URL` is not set.
    pub fn from_env() -> Result<Option<Self>> {
        match std::env::var("CANILLITA_TRANSCRIPT_URL") {
            Ok(url) if !url.trim().is_empty() => Self::new(
                url.trim(),
                Duration::from_secs(defaults::FETCH_TIMEOUT_SECS),
            )
            .map(Some),
            _ => Ok(None),
        }
    }
}

#[async_trait]
impl TranscriptClient for HttpTranscriptClient {
    #[instrument(skip(self), fields(subsystem = "inference", component = "transcript"))]
    async fn fetch(&self, video_id: &str) -> Result<Transcript> {
        let response = self
            .client
            .get(format!("{}/transcripts/{}", self.base_url, video_id))
            .send()
            .await?;
        let status = response.status();
        if status.as_u16() == 404 {
            return Err(Error::NotFound(format!("no transcript for video {}", video_id)));
        }
        if !status.is_success() {
            return Err(Error::from_status(status.as_u16(), format!("transcript {}", video_id)));
        }
        let body: TranscriptResponse = response.json().await?;
        if body.text.trim().is_empty() {
            return Err(Error::NotFound(format!("empty transcript for video {}", video_id)));
        }
        debug!(video_id, text_length = body.text.len(), "Transcript fetched");
        Ok(Transcript {
            video_id: video_id.to_string(),
            text: body.text,
            language: body.language,
        })
    }
}

/// Transcript client for deployments without a transcript service.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoTranscripts;

#[async_trait]
impl TranscriptClient for NoTranscripts {
    async fn fetch(&self, video_id: &str) -> Result<Transcript> {
        Err(Error::NotFound(format!(
            "no transcript service configured (video {})",
            video_id
        )))
    }
}
