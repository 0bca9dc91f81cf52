//! Mock summarization and transcript backends for deterministic testing.
//!
//! ## Usage
//!
//! ```rust
//! use canillita_inference::mock::{MockSummarizer, MockTranscripts};
//! use canillita_core::ErrorKind;
//!
//! let summarizer = MockSummarizer::new()
//!     .with_response("Resumen fijo.")
//!     .failing_first(1, ErrorKind::Unavailable);
//! let transcripts = MockTranscripts::new().with_transcript("abc123", "Hola.");
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use canillita_core::{
    Error, ErrorKind, Result, SummarizationClient, SummaryContext, Transcript, TranscriptClient,
};

/// Summarizer returning a fixed response.
#[derive(Clone)]
pub struct MockSummarizer {
    response: String,
    latency: Duration,
    fail_first: usize,
    fail_kind: ErrorKind,
    calls: Arc<AtomicUsize>,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl MockSummarizer {
    pub fn new() -> Self {
        Self {
            response: "Resumen de prueba.".to_string(),
            latency: Duration::ZERO,
            fail_first: 0,
            fail_kind: ErrorKind::Unavailable,
            calls: Arc::new(AtomicUsize::new(0)),
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_response(mut self, response: impl Into<String>) -> Self {
        self.response = response.into();
        self
    }

    /// Sleep before answering, for timeout tests.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Fail the first `n` calls with `kind`.
    pub fn failing_first(mut self, n: usize, kind: ErrorKind) -> Self {
        self.fail_first = n;
        self.fail_kind = kind;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Video ids seen, in call order.
    pub fn seen_videos(&self) -> Vec<String> {
        match self.prompts.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl Default for MockSummarizer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SummarizationClient for MockSummarizer {
    async fn summarize(&self, transcript: &Transcript, _context: &SummaryContext) -> Result<String> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut seen) = self.prompts.lock() {
            seen.push(transcript.video_id.clone());
        }
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if call < self.fail_first {
            return Err(Error::from_kind(
                self.fail_kind,
                format!("simulated failure {}", call + 1),
            ));
        }
        Ok(self.response.clone())
    }

    fn model_name(&self) -> &str {
        "mock"
    }
}

/// Transcript client serving fixed transcripts; unknown ids are `NotFound`.
#[derive(Clone, Default)]
pub struct MockTranscripts {
    transcripts: HashMap<String, String>,
}

impl MockTranscripts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_transcript(mut self, video_id: impl Into<String>, text: impl Into<String>) -> Self {
        self.transcripts.insert(video_id.into(), text.into());
        self
    }
}

#[async_trait]
impl TranscriptClient for MockTranscripts {
    async fn fetch(&self, video_id: &str) -> Result<Transcript> {
        self.transcripts
            .get(video_id)
            .map(|text| Transcript {
                video_id: video_id.to_string(),
                text: text.clone(),
                language: Some("es".to_string()),
            })
            .ok_or_else(|| Error::NotFound(format!("no transcript for video {}", video_id)))
    }
}
