//! Structured logging schema and field name constants for canillita.
//!
//! All crates use these constants for consistent structured logging fields,
//! so log aggregation can query one field name across every subsystem.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Recoverable issue, automatic fallback or retry applied |
//! | INFO  | Lifecycle events (startup, shutdown), job completions |
//! | DEBUG | Decision points, strategy choices, config choices |
//! | TRACE | Per-item iteration (paragraphs, chunks, candidates) |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Subsystem originating the log event.
/// Values: "db", "extract", "inference", "jobs", "bot"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "pool", "orchestrator", "normalizer", "worker", "ingestor"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "claim_next", "extract", "assemble", "deliver"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Job UUID being processed.
pub const JOB_ID: &str = "job_id";

/// Job kind enum variant.
pub const JOB_KIND: &str = "job_kind";

/// External platform identifier of the submission.
pub const EXTERNAL_ID: &str = "external_id";

/// Source URL being extracted.
pub const URL: &str = "url";

/// Worker slot index within the pool.
pub const WORKER_ID: &str = "worker_id";

// ─── Extraction fields ─────────────────────────────────────────────────────

/// Provider rule name used for extraction.
pub const PROVIDER: &str = "provider";

/// Extraction strategy that produced (or failed to produce) a result.
pub const STRATEGY: &str = "strategy";

/// Quality score of an extraction result.
pub const QUALITY_SCORE: &str = "quality_score";

/// Error kind from the failure taxonomy.
pub const ERROR_KIND: &str = "error_kind";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Retry attempt number (1-based once a failure has been recorded).
pub const ATTEMPT: &str = "attempt";

/// Number of message chunks produced or delivered.
pub const CHUNK_COUNT: &str = "chunk_count";

/// Character length of extracted body text.
pub const TEXT_LENGTH: &str = "text_length";

/// Number of paragraphs in an extraction.
pub const PARAGRAPH_COUNT: &str = "paragraph_count";

/// Number of results returned by a query.
pub const RESULT_COUNT: &str = "result_count";
