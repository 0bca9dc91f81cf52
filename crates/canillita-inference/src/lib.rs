//! # canillita-inference
//!
//! Video summarization backends for canillita.
//!
//! This crate provides:
//! - Ollama summarization backend (default)
//! - HTTP transcript service client
//! - Prompt construction and summary post-processing
//! - Mock backends for tests (feature `mock`)
//!
//! # Feature Flags
//!
//! - `ollama` (default): Enable the Ollama backend
//! - `mock`: Enable mock summarizer and transcript client

pub mod prompt;
pub mod transcript;

#[cfg(feature = "ollama")]
pub mod ollama;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

#[cfg(feature = "ollama")]
pub use ollama::OllamaSummarizer;

pub use prompt::{language_name, summary_paragraphs, summary_prompt, system_prompt, truncate_chars};
pub use transcript::{HttpTranscriptClient, NoTranscripts};
