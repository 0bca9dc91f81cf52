//! Pipeline facade: route submissions into the queue and query outcomes.

use chrono::{Duration as ChronoDuration, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use canillita_core::{
    ContentClassifier, DeadLetter, ErrorKind, JobKind, PipelineConfig, ProcessedPostRecord,
    ProcessingStats, QueueStats, Result, SourceRef, Submission,
};
use canillita_db::Stores;

/// What happened to one submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// A new job was queued.
    Enqueued(Uuid),
    /// The source is already queued, in flight or recorded.
    Duplicate,
    /// Content kind not handled; a non-success record was written.
    Unsupported(String),
}

/// Entry point shared by the ingestor and the CLI.
#[derive(Clone)]
pub struct Pipeline {
    stores: Stores,
    classifier: ContentClassifier,
    max_attempts: i32,
}

impl Pipeline {
    pub fn new(stores: Stores, classifier: ContentClassifier, max_attempts: i32) -> Self {
        Self {
            stores,
            classifier,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn from_config(stores: Stores, config: &PipelineConfig) -> Self {
        Self::new(
            stores,
            ContentClassifier::new(config.news_domains.clone(), config.blocked_domains.clone()),
            config.max_attempts,
        )
    }

    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    /// Classify and enqueue one submission.
    ///
    /// Unsupported or malformed links are recorded as failures once, so later
    /// polls see them as processed.
    pub async fn submit(&self, submission: &Submission) -> Result<SubmitOutcome> {
        let source = match self.classifier.source_for(submission) {
            Ok(source) => source,
            Err(e) if e.kind() == ErrorKind::Permanent => {
                let message = e.to_string();
                let source = SourceRef::new(
                    submission.external_id.clone(),
                    submission.url.trim(),
                    canillita_core::SourceKind::Article,
                );
                let inserted = self
                    .stores
                    .dedup
                    .record(&ProcessedPostRecord::failed(source, &message, Utc::now()))
                    .await?;
                debug!(
                    external_id = %submission.external_id,
                    url = %submission.url,
                    inserted,
                    "Skipping unsupported submission"
                );
                return Ok(SubmitOutcome::Unsupported(message));
            }
            Err(e) => return Err(e),
        };
        self.enqueue_source(&source).await
    }

    /// Enqueue an already routed source.
    pub async fn enqueue_source(&self, source: &SourceRef) -> Result<SubmitOutcome> {
        let kind = JobKind::for_source(source.kind);
        match self
            .stores
            .jobs
            .enqueue(source, kind, self.max_attempts)
            .await?
        {
            Some(job_id) => {
                info!(
                    job_id = %job_id,
                    job_kind = %kind,
                    external_id = %source.external_id,
                    url = %source.url,
                    "Job enqueued"
                );
                Ok(SubmitOutcome::Enqueued(job_id))
            }
            None => {
                debug!(external_id = %source.external_id, "Already queued or processed");
                Ok(SubmitOutcome::Duplicate)
            }
        }
    }

    pub async fn processing_stats(&self, window_days: i64) -> Result<ProcessingStats> {
        self.stores.dedup.processing_stats(window_days).await
    }

    pub async fn queue_stats(&self) -> Result<QueueStats> {
        self.stores.jobs.queue_stats().await
    }

    pub async fn dead_letters(&self, limit: i64) -> Result<Vec<DeadLetter>> {
        self.stores.jobs.list_dead_letters(limit).await
    }

    pub async fn requeue(&self, job_id: Uuid) -> Result<Option<Uuid>> {
        let requeued = self
            .stores
            .jobs
            .requeue_dead_letter(job_id, self.max_attempts)
            .await?;
        match requeued {
            Some(new_id) => info!(job_id = %job_id, new_job_id = %new_id, "Dead letter requeued"),
            None => warn!(job_id = %job_id, "Nothing to requeue"),
        }
        Ok(requeued)
    }

    /// Delete processed records older than `days`.
    pub async fn cleanup(&self, days: i64) -> Result<u64> {
        let cutoff = Utc::now() - ChronoDuration::days(days.max(0));
        let removed = self.stores.dedup.cleanup_older_than(cutoff).await?;
        info!(days, removed, "Processed records cleaned up");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canillita_core::SourceKind;

    fn pipeline() -> Pipeline {
        Pipeline::new(
            Stores::memory(),
            ContentClassifier::new(Vec::new(), vec!["spam.example".into()]),
            3,
        )
    }

    fn submission(id: &str, url: &str) -> Submission {
        Submission {
            external_id: id.to_string(),
            url: url.to_string(),
            community: Some("argentina".to_string()),
            title: None,
        }
    }

    #[tokio::test]
    async fn test_submit_routes_by_kind() {
        let p = pipeline();
        let outcome = p
            .submit(&submission("t3_v", "https://youtu.be/abc123"))
            .await
            .unwrap();
        let SubmitOutcome::Enqueued(id) = outcome else {
            panic!("expected enqueue, got {:?}", outcome);
        };
        let job = p.stores().jobs.get(id).await.unwrap().unwrap();
        assert_eq!(job.kind, JobKind::SummarizeVideo);
        assert_eq!(job.source.kind, SourceKind::Video);
        assert_eq!(job.max_attempts, 3);
    }

    #[tokio::test]
    async fn test_duplicate_submission_is_noop() {
        let p = pipeline();
        let s = submission("t3_a", "https://example.com/nota");
        assert!(matches!(p.submit(&s).await.unwrap(), SubmitOutcome::Enqueued(_)));
        assert_eq!(p.submit(&s).await.unwrap(), SubmitOutcome::Duplicate);
        assert_eq!(p.queue_stats().await.unwrap().pending, 1);
    }

    #[tokio::test]
    async fn test_unsupported_is_recorded_once() {
        let p = pipeline();
        let s = submission("t3_spam", "https://spam.example/promo");
        let outcome = p.submit(&s).await.unwrap();
        assert!(matches!(outcome, SubmitOutcome::Unsupported(_)));

        let record = p.stores().dedup.get("t3_spam").await.unwrap().unwrap();
        assert!(!record.success);
        assert_eq!(p.queue_stats().await.unwrap().pending, 0);

        // A second poll neither queues nor records again.
        assert!(matches!(p.submit(&s).await.unwrap(), SubmitOutcome::Unsupported(_)));
        assert_eq!(p.processing_stats(7).await.unwrap().total, 1);
    }

    #[tokio::test]
    async fn test_requeue_keeps_configured_attempt_limit() {
        let p = Pipeline::new(Stores::memory(), ContentClassifier::default(), 5);
        p.submit(&submission("t3_dead", "https://example.com/caida"))
            .await
            .unwrap();
        let jobs = &p.stores().jobs;
        let job = jobs.claim_next(Utc::now()).await.unwrap().unwrap();
        jobs.dead_letter(job.id, ErrorKind::Transient, "timeout", Utc::now())
            .await
            .unwrap();

        let new_id = p.requeue(job.id).await.unwrap().unwrap();
        let requeued = jobs.get(new_id).await.unwrap().unwrap();
        assert_eq!(requeued.max_attempts, 5);
        assert!(p.requeue(job.id).await.unwrap().is_none());
    }
}
