//! # canillita-extract
//!
//! Content pipeline for canillita.
//!
//! This crate provides:
//! - Provider rule engine (per-domain selectors and quality thresholds)
//! - HTTP document fetcher with a bounded document cache
//! - Content normalizer driven by provider selectors
//! - Readability-style fallback parser and a title + description strategy
//! - Extraction orchestrator running the fixed-order fallback chain
//! - Social post extraction through oEmbed
//! - Comment assembler producing threaded, length-bounded message chunks
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use canillita_extract::{
//!     assemble_result, CommentTemplate, FetchConfig, HttpFetcher, Orchestrator,
//!     ProviderRegistry, ProviderStore,
//! };
//! use canillita_core::{SourceKind, SourceRef};
//!
//! #[tokio::main]
//! async fn main() -> canillita_core::Result<()> {
//!     let fetcher = Arc::new(HttpFetcher::new(FetchConfig::default())?);
//!     let providers = Arc::new(ProviderStore::new(ProviderRegistry::with_defaults()));
//!     let orchestrator = Orchestrator::new(fetcher, providers);
//!
//!     let source = SourceRef::new("t3_abc", "https://example.com/nota", SourceKind::Article);
//!     let result = orchestrator.extract(&source).await;
//!     if result.succeeded {
//!         for chunk in assemble_result(&result, 10_000, &CommentTemplate::article())? {
//!             println!("{}", chunk.body);
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod assembler;
pub mod fetch;
pub mod normalize;
pub mod orchestrator;
pub mod providers;
pub mod readability;
pub mod social;
pub mod strategy;
pub mod text;

pub use assembler::{
    assemble, assemble_result, canonical_message, split_oversized, AssemblyInput, CommentTemplate,
};
pub use fetch::{Document, FetchConfig, Fetcher, HttpFetcher, StaticFetcher};
pub use normalize::{normalize, normalize_html, NormalizedContent};
pub use orchestrator::Orchestrator;
pub use providers::{Provider, ProviderRegistry, ProviderStore};
pub use readability::{extract_readable, ReadableContent};
pub use social::{parse_embed_html, EmbeddedPost, SocialPostExtractor, SOCIAL_PROVIDER};
pub use strategy::{
    default_chain, Extracted, ExtractionStrategy, FallbackParserStrategy, ManualStrategy,
    StructuredStrategy,
};
