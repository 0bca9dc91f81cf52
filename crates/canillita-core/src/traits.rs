//! Storage and collaborator traits.
//!
//! The queue and dedup store are injected into the pipeline through these
//! traits; PostgreSQL and in-memory implementations live in `canillita-db`.
//! Platform, transcript and summarization clients are external
//! collaborators and only their contracts are defined here.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{ErrorKind, Result};
use crate::models::{
    DeadLetter, Job, JobKind, ProcessedPostRecord, ProcessingStats, QueueStats, SourceRef,
    Submission, SummaryContext, Transcript,
};

/// Repository for the job queue and its dead-letter table.
///
/// Every transition that ends a job also writes the processed-post record in
/// the same transaction.
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Queue a job unless the source is already pending, leased or recorded.
    ///
    /// Returns `None` when the call was a no-op.
    async fn enqueue(
        &self,
        source: &SourceRef,
        kind: JobKind,
        max_attempts: i32,
    ) -> Result<Option<Uuid>>;

    /// Lease the oldest eligible pending job.
    async fn claim_next(&self, now: DateTime<Utc>) -> Result<Option<Job>>;

    /// Get a queued job by ID.
    async fn get(&self, job_id: Uuid) -> Result<Option<Job>>;

    /// Persist the message ids delivered so far for a leased job.
    async fn record_delivery(&self, job_id: Uuid, message_ids: &[String]) -> Result<()>;

    /// Remove a leased job and write its processed-post record atomically.
    async fn complete(&self, job_id: Uuid, record: &ProcessedPostRecord) -> Result<()>;

    /// Count a failed attempt and return the job to pending at `next_eligible_at`.
    async fn retry(
        &self,
        job_id: Uuid,
        error: &str,
        next_eligible_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Move a job to the dead-letter table and write a non-success record.
    async fn dead_letter(
        &self,
        job_id: Uuid,
        kind: ErrorKind,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<()>;

    /// Return a lease to pending without consuming an attempt.
    async fn release(&self, job_id: Uuid) -> Result<()>;

    /// Return leases taken before `older_than` to pending.
    async fn release_stale_leases(&self, older_than: DateTime<Utc>) -> Result<u64>;

    /// Get the number of pending jobs.
    async fn pending_count(&self) -> Result<i64>;

    /// Get queue occupancy.
    async fn queue_stats(&self) -> Result<QueueStats>;

    /// Most recent dead letters first.
    async fn list_dead_letters(&self, limit: i64) -> Result<Vec<DeadLetter>>;

    /// Re-queue a dead-lettered job with a fresh budget of `max_attempts`.
    ///
    /// Drops the non-success record so the source can be processed again.
    /// Returns the new job id, or `None` if no such dead letter exists.
    async fn requeue_dead_letter(&self, job_id: Uuid, max_attempts: i32)
        -> Result<Option<Uuid>>;
}

/// Persisted record of processed sources.
#[async_trait]
pub trait DedupStore: Send + Sync {
    async fn is_processed(&self, external_id: &str) -> Result<bool>;

    async fn get(&self, external_id: &str) -> Result<Option<ProcessedPostRecord>>;

    /// Insert a record unless one exists. Returns whether it was inserted.
    async fn record(&self, record: &ProcessedPostRecord) -> Result<bool>;

    /// Outcome counts over the trailing `window_days`.
    async fn processing_stats(&self, window_days: i64) -> Result<ProcessingStats>;

    async fn recent(&self, limit: i64) -> Result<Vec<ProcessedPostRecord>>;

    async fn failed(&self, limit: i64) -> Result<Vec<ProcessedPostRecord>>;

    /// Delete records processed before `cutoff`. Returns rows removed.
    async fn cleanup_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}

/// Social platform the bot reads from and replies to.
#[async_trait]
pub trait PlatformClient: Send + Sync {
    /// New submissions in the given communities. Safe to call repeatedly.
    async fn fetch_new_submissions(&self, communities: &[String]) -> Result<Vec<Submission>>;

    /// Post `body` as a reply to `parent_id` and return the new message id.
    async fn submit(&self, parent_id: &str, body: &str) -> Result<String>;
}

/// Fetches transcripts for videos. Fails with `Error::NotFound` when none exists.
#[async_trait]
pub trait TranscriptClient: Send + Sync {
    async fn fetch(&self, video_id: &str) -> Result<Transcript>;
}

/// Turns a transcript into summary prose. Fails with `Error::Unavailable` when down.
#[async_trait]
pub trait SummarizationClient: Send + Sync {
    async fn summarize(&self, transcript: &Transcript, context: &SummaryContext) -> Result<String>;

    /// Model identifier, for logs.
    fn model_name(&self) -> &str;
}
