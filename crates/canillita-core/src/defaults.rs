//! Centralized default constants for canillita.
//!
//! **This module is the single source of truth** for shared default values.
//! Crates reference these constants instead of defining their own magic
//! numbers. Organized by domain area.

// =============================================================================
// MESSAGE ASSEMBLY
// =============================================================================

/// Maximum characters per delivered message (Reddit comment limit).
pub const MAX_CHUNK_LENGTH: usize = 10_000;

/// Maximum characters of body text kept from one extraction.
pub const MAX_ARTICLE_LENGTH: usize = 50_000;

/// Separator between paragraphs in an assembled message.
pub const PARAGRAPH_SEPARATOR: &str = "\n\n";

/// Marker appended to every chunk except the last in a multi-part reply.
pub const CONTINUED_MARKER: &str = "*(continúa en la respuesta)*";

/// Disclaimer line closing every assembled message.
pub const FOOTER_DISCLAIMER: &str =
    "^(CanillitaBot - Compartiendo noticias para hacerlas más accesibles.)";

// =============================================================================
// EXTRACTION
// =============================================================================

/// Minimum body length (characters) for the default provider rule.
pub const MIN_TEXT_LENGTH: usize = 200;

/// Minimum text-to-markup ratio for the default provider rule.
///
/// Real news pages carry far more markup than text, so the default gate is
/// permissive; per-provider rules tighten it.
pub const MIN_TEXT_TO_MARKUP_RATIO: f64 = 0.02;

/// Name of the rule returned when no provider matches.
pub const DEFAULT_PROVIDER_NAME: &str = "default";

/// Content selectors tried by the default rule, in priority order.
pub const DEFAULT_CONTENT_SELECTORS: &[&str] = &[
    "article",
    "[itemprop='articleBody']",
    "main",
    ".article-body",
    ".entry-content",
    ".post-content",
];

/// Selectors removed by the default rule.
pub const DEFAULT_REMOVE_SELECTORS: &[&str] = &[
    "script",
    "style",
    "nav",
    "aside",
    "figure",
    "iframe",
    "form",
    ".advertisement",
    ".related",
    ".social-share",
];

/// Titles shorter than this are ignored in favour of the next candidate.
pub const MIN_TITLE_LENGTH: usize = 10;

/// Normalized fragments shorter than this are dropped.
pub const MIN_FRAGMENT_LENGTH: usize = 5;

/// Minimum paragraph length used by the fallback parser's last resort.
pub const FALLBACK_MIN_PARAGRAPH_LENGTH: usize = 50;

/// Quality score assigned to title + description results.
pub const MANUAL_QUALITY_SCORE: f32 = 0.2;

/// Scale applied to fallback parser quality scores.
pub const FALLBACK_QUALITY_SCALE: f32 = 0.8;

/// Number of fetched documents kept for fallback re-use.
pub const DOCUMENT_CACHE_CAPACITY: usize = 64;

/// Maximum response body size accepted by the fetcher (bytes).
pub const MAX_DOCUMENT_BYTES: usize = 5 * 1024 * 1024;

/// Browser-like user agent for document fetches.
pub const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// oEmbed endpoint for social posts.
pub const OEMBED_URL: &str = "https://publish.twitter.com/oembed";

// =============================================================================
// TIMEOUTS
// =============================================================================

/// Timeout for a single document fetch (seconds).
pub const FETCH_TIMEOUT_SECS: u64 = 15;

/// Timeout for a summarization request (seconds).
pub const SUMMARIZE_TIMEOUT_SECS: u64 = 90;

/// Timeout for a single message submission (seconds).
pub const DELIVERY_TIMEOUT_SECS: u64 = 30;

/// Timeout for a whole job execution (seconds).
pub const JOB_TIMEOUT_SECS: u64 = 300;

/// Grace period for in-flight jobs after shutdown is signalled (seconds).
pub const SHUTDOWN_GRACE_SECS: u64 = 10;

// =============================================================================
// JOB QUEUE
// =============================================================================

/// Maximum attempts per job before it is dead-lettered.
pub const JOB_MAX_ATTEMPTS: i32 = 3;

/// Number of parallel workers in the pool.
pub const JOB_MAX_CONCURRENT: usize = 4;

/// Polling interval when the queue is empty (milliseconds).
pub const JOB_POLL_INTERVAL_MS: u64 = 500;

/// Base delay for exponential retry backoff (seconds).
pub const BACKOFF_BASE_SECS: u64 = 60;

/// Upper bound on retry backoff (seconds).
pub const BACKOFF_MAX_SECS: u64 = 3600;

/// Maximum random jitter as a fraction of the computed delay. Must stay below 1.0.
pub const BACKOFF_JITTER_RATIO: f64 = 0.25;

/// Leases older than this are returned to pending at startup (seconds).
pub const STALE_LEASE_SECS: i64 = 900;

/// Broadcast channel capacity for worker events.
pub const EVENT_BUS_CAPACITY: usize = 256;

// =============================================================================
// INGESTION & MAINTENANCE
// =============================================================================

/// Interval between submission polls (seconds).
pub const INGEST_INTERVAL_SECS: u64 = 60;

/// Window for processing statistics (days).
pub const STATS_WINDOW_DAYS: i64 = 7;

/// Age after which processed records are removed (days).
pub const CLEANUP_DAYS: i64 = 30;

/// Default number of rows for list queries.
pub const LIST_LIMIT: i64 = 20;

// =============================================================================
// INFERENCE
// =============================================================================

/// Default Ollama endpoint.
pub const OLLAMA_URL: &str = "http://localhost:11434";

/// Default summarization model.
pub const SUMMARY_MODEL: &str = "llama3.1:8b";

/// Maximum transcript characters sent to the summarizer.
pub const MAX_TRANSCRIPT_CHARS: usize = 24_000;
