//! Job handlers for each job kind.
//!
//! A handler turns a leased job into the chunk sequence to deliver. Delivery
//! and the queue transitions are the worker's business.

use async_trait::async_trait;

use canillita_core::{Job, JobKind, MessageChunk, Result, SourceRef};

/// Context provided to job handlers.
#[derive(Debug, Clone)]
pub struct JobContext {
    /// The job being processed.
    pub job: Job,
    /// Character limit per delivered message.
    pub max_chunk_length: usize,
}

impl JobContext {
    pub fn new(job: Job, max_chunk_length: usize) -> Self {
        Self {
            job,
            max_chunk_length,
        }
    }

    pub fn source(&self) -> &SourceRef {
        &self.job.source
    }

    /// 1-based number of the execution in progress.
    pub fn attempt_number(&self) -> i32 {
        self.job.attempt + 1
    }
}

/// Trait for job handlers.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// The job kind this handler processes.
    fn job_kind(&self) -> JobKind;

    /// Produce the message chunks for the job's source.
    ///
    /// Must be deterministic for a given source so a retried job resumes
    /// delivery on the same chunk sequence.
    async fn prepare(&self, ctx: &JobContext) -> Result<Vec<MessageChunk>>;

    /// Check if this handler can process the given job kind.
    fn can_handle(&self, kind: JobKind) -> bool {
        self.job_kind() == kind
    }
}
