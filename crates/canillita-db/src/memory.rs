//! In-memory job queue and dedup store.
//!
//! One mutex guards jobs, records and dead letters together, which gives the
//! same per-source atomicity the PostgreSQL implementation gets from
//! transactions. Used by tests and by the bot when no database is configured.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::{Mutex, Notify};
use uuid::Uuid;

use canillita_core::{
    DeadLetter, DedupStore, Error, ErrorCount, ErrorKind, Job, JobKind, JobRepository, JobState,
    ProcessedPostRecord, ProcessingStats, QueueStats, Result, SourceRef,
};

#[derive(Default)]
struct MemoryState {
    jobs: HashMap<Uuid, Job>,
    /// In-flight index: external id -> job id.
    in_flight: HashMap<String, Uuid>,
    records: HashMap<String, ProcessedPostRecord>,
    dead_letters: Vec<DeadLetter>,
}

impl MemoryState {
    fn insert_job_if_new(
        &mut self,
        source: &SourceRef,
        kind: JobKind,
        max_attempts: i32,
        now: DateTime<Utc>,
    ) -> Option<Uuid> {
        if self.records.contains_key(&source.external_id)
            || self.in_flight.contains_key(&source.external_id)
        {
            return None;
        }
        let job = Job::new(source.clone(), kind, max_attempts, now);
        let id = job.id;
        self.in_flight.insert(source.external_id.clone(), id);
        self.jobs.insert(id, job);
        Some(id)
    }

    fn leased_job_mut(&mut self, job_id: Uuid, op: &str) -> Result<&mut Job> {
        match self.jobs.get_mut(&job_id) {
            Some(job) if job.state == JobState::Leased => Ok(job),
            Some(_) => Err(Error::InvariantViolation(format!(
                "{} requested for job {} which is not leased",
                op, job_id
            ))),
            None => Err(Error::InvariantViolation(format!(
                "{} requested for unknown job {}",
                op, job_id
            ))),
        }
    }

    fn remove_job(&mut self, job_id: Uuid) -> Option<Job> {
        let job = self.jobs.remove(&job_id)?;
        self.in_flight.remove(&job.source.external_id);
        Some(job)
    }
}

/// Queue and dedup store held in process memory.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    notify: Arc<Notify>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle woken whenever a job becomes claimable.
    pub fn job_notify(&self) -> Arc<Notify> {
        self.notify.clone()
    }

    /// Number of jobs in the queue, pending or leased.
    pub async fn job_count(&self) -> usize {
        self.state.lock().await.jobs.len()
    }

    /// Number of processed-post records.
    pub async fn record_count(&self) -> usize {
        self.state.lock().await.records.len()
    }
}

#[async_trait]
impl JobRepository for MemoryStore {
    async fn enqueue(
        &self,
        source: &SourceRef,
        kind: JobKind,
        max_attempts: i32,
    ) -> Result<Option<Uuid>> {
        let inserted = {
            let mut state = self.state.lock().await;
            state.insert_job_if_new(source, kind, max_attempts, Utc::now())
        };
        if inserted.is_some() {
            self.notify.notify_waiters();
        }
        Ok(inserted)
    }

    async fn claim_next(&self, now: DateTime<Utc>) -> Result<Option<Job>> {
        let mut state = self.state.lock().await;
        let next = state
            .jobs
            .values()
            .filter(|job| job.is_eligible(now))
            .min_by_key(|job| (job.enqueued_at, job.id))
            .map(|job| job.id);

        Ok(next.and_then(|id| {
            state.jobs.get_mut(&id).map(|job| {
                job.state = JobState::Leased;
                job.leased_at = Some(now);
                job.clone()
            })
        }))
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<Job>> {
        Ok(self.state.lock().await.jobs.get(&job_id).cloned())
    }

    async fn record_delivery(&self, job_id: Uuid, message_ids: &[String]) -> Result<()> {
        let mut state = self.state.lock().await;
        let job = state.leased_job_mut(job_id, "delivery record")?;
        job.delivered_message_ids = message_ids.to_vec();
        Ok(())
    }

    async fn complete(&self, job_id: Uuid, record: &ProcessedPostRecord) -> Result<()> {
        let mut state = self.state.lock().await;
        let job = state.leased_job_mut(job_id, "completion")?;
        if job.source.external_id != record.source.external_id {
            return Err(Error::InvariantViolation(format!(
                "job {} belongs to {} but the record is for {}",
                job_id, job.source.external_id, record.source.external_id
            )));
        }
        if state.records.contains_key(&record.source.external_id) {
            return Err(Error::InvariantViolation(format!(
                "processed record already exists for {}",
                record.source.external_id
            )));
        }
        state.remove_job(job_id);
        state
            .records
            .insert(record.source.external_id.clone(), record.clone());
        Ok(())
    }

    async fn retry(
        &self,
        job_id: Uuid,
        error: &str,
        next_eligible_at: DateTime<Utc>,
    ) -> Result<()> {
        {
            let mut state = self.state.lock().await;
            let job = state.leased_job_mut(job_id, "retry")?;
            job.state = JobState::Pending;
            job.attempt += 1;
            job.last_error = Some(error.to_string());
            job.next_eligible_at = next_eligible_at;
            job.leased_at = None;
        }
        self.notify.notify_waiters();
        Ok(())
    }

    async fn dead_letter(
        &self,
        job_id: Uuid,
        kind: ErrorKind,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        state.leased_job_mut(job_id, "dead letter")?;
        let Some(job) = state.remove_job(job_id) else {
            return Err(Error::InvariantViolation(format!("job {} vanished", job_id)));
        };
        state.dead_letters.push(DeadLetter {
            job_id: job.id,
            source: job.source.clone(),
            kind: job.kind,
            attempts: job.attempt + 1,
            error_kind: kind,
            last_error: error.to_string(),
            dead_at: now,
        });
        state
            .records
            .entry(job.source.external_id.clone())
            .or_insert_with(|| ProcessedPostRecord::failed(job.source, error, now));
        Ok(())
    }

    async fn release(&self, job_id: Uuid) -> Result<()> {
        let released = {
            let mut state = self.state.lock().await;
            match state.jobs.get_mut(&job_id) {
                Some(job) if job.state == JobState::Leased => {
                    job.state = JobState::Pending;
                    job.leased_at = None;
                    true
                }
                _ => false,
            }
        };
        if released {
            self.notify.notify_waiters();
        }
        Ok(())
    }

    async fn release_stale_leases(&self, older_than: DateTime<Utc>) -> Result<u64> {
        let mut state = self.state.lock().await;
        let mut released = 0;
        for job in state.jobs.values_mut() {
            if job.state == JobState::Leased && job.leased_at.map_or(true, |at| at < older_than) {
                job.state = JobState::Pending;
                job.leased_at = None;
                released += 1;
            }
        }
        drop(state);
        if released > 0 {
            self.notify.notify_waiters();
        }
        Ok(released)
    }

    async fn pending_count(&self) -> Result<i64> {
        let state = self.state.lock().await;
        Ok(state
            .jobs
            .values()
            .filter(|job| job.state == JobState::Pending)
            .count() as i64)
    }

    async fn queue_stats(&self) -> Result<QueueStats> {
        let state = self.state.lock().await;
        let mut stats = QueueStats {
            dead_lettered: state.dead_letters.len() as i64,
            ..QueueStats::default()
        };
        for job in state.jobs.values() {
            match job.state {
                JobState::Pending => {
                    stats.pending += 1;
                    if job.attempt > 0 {
                        stats.retrying += 1;
                    }
                }
                JobState::Leased => stats.leased += 1,
                _ => {}
            }
        }
        Ok(stats)
    }

    async fn list_dead_letters(&self, limit: i64) -> Result<Vec<DeadLetter>> {
        let state = self.state.lock().await;
        let mut dead = state.dead_letters.clone();
        dead.sort_by(|a, b| b.dead_at.cmp(&a.dead_at));
        dead.truncate(limit.max(0) as usize);
        Ok(dead)
    }

    async fn requeue_dead_letter(
        &self,
        job_id: Uuid,
        max_attempts: i32,
    ) -> Result<Option<Uuid>> {
        let inserted = {
            let mut state = self.state.lock().await;
            let Some(pos) = state.dead_letters.iter().position(|d| d.job_id == job_id) else {
                return Ok(None);
            };
            let dead = state.dead_letters[pos].clone();
            let external_id = dead.source.external_id.clone();

            let removed = match state.records.get(&external_id) {
                Some(record) if !record.success => state.records.remove(&external_id),
                _ => None,
            };
            let inserted = state.insert_job_if_new(
                &dead.source,
                dead.kind,
                max_attempts.max(1),
                Utc::now(),
            );
            match inserted {
                Some(_) => {
                    state.dead_letters.remove(pos);
                }
                None => {
                    if let Some(record) = removed {
                        state.records.insert(external_id, record);
                    }
                }
            }
            inserted
        };
        if inserted.is_some() {
            self.notify.notify_waiters();
        }
        Ok(inserted)
    }
}

#[async_trait]
impl DedupStore for MemoryStore {
    async fn is_processed(&self, external_id: &str) -> Result<bool> {
        Ok(self.state.lock().await.records.contains_key(external_id))
    }

    async fn get(&self, external_id: &str) -> Result<Option<ProcessedPostRecord>> {
        Ok(self.state.lock().await.records.get(external_id).cloned())
    }

    async fn record(&self, record: &ProcessedPostRecord) -> Result<bool> {
        let mut state = self.state.lock().await;
        if state.records.contains_key(&record.source.external_id) {
            return Ok(false);
        }
        state
            .records
            .insert(record.source.external_id.clone(), record.clone());
        Ok(true)
    }

    async fn processing_stats(&self, window_days: i64) -> Result<ProcessingStats> {
        let cutoff = Utc::now() - Duration::days(window_days.max(0));
        let state = self.state.lock().await;

        let mut total = 0;
        let mut succeeded = 0;
        let mut errors: HashMap<String, i64> = HashMap::new();
        for record in state.records.values().filter(|r| r.processed_at >= cutoff) {
            total += 1;
            if record.success {
                succeeded += 1;
            } else {
                let message = record
                    .error_message
                    .clone()
                    .unwrap_or_else(|| "unknown".to_string());
                *errors.entry(message).or_default() += 1;
            }
        }

        let mut common_errors: Vec<ErrorCount> = errors
            .into_iter()
            .map(|(error_message, count)| ErrorCount {
                error_message,
                count,
            })
            .collect();
        common_errors.sort_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then_with(|| a.error_message.cmp(&b.error_message))
        });
        common_errors.truncate(5);

        Ok(ProcessingStats::new(
            window_days,
            total,
            succeeded,
            common_errors,
        ))
    }

    async fn recent(&self, limit: i64) -> Result<Vec<ProcessedPostRecord>> {
        let state = self.state.lock().await;
        let mut records: Vec<_> = state.records.values().cloned().collect();
        records.sort_by(|a, b| b.processed_at.cmp(&a.processed_at));
        records.truncate(limit.max(0) as usize);
        Ok(records)
    }

    async fn failed(&self, limit: i64) -> Result<Vec<ProcessedPostRecord>> {
        let state = self.state.lock().await;
        let mut records: Vec<_> = state
            .records
            .values()
            .filter(|r| !r.success)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.processed_at.cmp(&a.processed_at));
        records.truncate(limit.max(0) as usize);
        Ok(records)
    }

    async fn cleanup_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut state = self.state.lock().await;
        let before = state.records.len();
        state.records.retain(|_, r| r.processed_at >= cutoff);
        Ok((before - state.records.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canillita_core::SourceKind;

    fn source(id: &str) -> SourceRef {
        SourceRef::new(id, format!("https://example.com/{}", id), SourceKind::Article)
    }

    async fn leased(store: &MemoryStore, id: &str) -> Job {
        store
            .enqueue(&source(id), JobKind::ExtractArticle, 3)
            .await
            .unwrap()
            .unwrap();
        store.claim_next(Utc::now()).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_enqueue_is_idempotent_while_pending_and_leased() {
        let store = MemoryStore::new();
        let first = store
            .enqueue(&source("a"), JobKind::ExtractArticle, 3)
            .await
            .unwrap();
        assert!(first.is_some());
        assert!(store
            .enqueue(&source("a"), JobKind::ExtractArticle, 3)
            .await
            .unwrap()
            .is_none());

        let job = store.claim_next(Utc::now()).await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Leased);
        assert!(store
            .enqueue(&source("a"), JobKind::ExtractArticle, 3)
            .await
            .unwrap()
            .is_none());
        assert_eq!(store.job_count().await, 1);
    }

    #[tokio::test]
    async fn test_enqueue_after_success_is_noop() {
        let store = MemoryStore::new();
        let job = leased(&store, "a").await;
        let record = ProcessedPostRecord::succeeded(job.source.clone(), vec!["m1".into()], Utc::now());
        store.complete(job.id, &record).await.unwrap();

        assert_eq!(store.job_count().await, 0);
        assert!(store.is_processed("a").await.unwrap());
        assert!(store
            .enqueue(&source("a"), JobKind::ExtractArticle, 3)
            .await
            .unwrap()
            .is_none());
        assert_eq!(store.record_count().await, 1);
    }

    #[tokio::test]
    async fn test_claim_takes_oldest_eligible() {
        let store = MemoryStore::new();
        store.enqueue(&source("first"), JobKind::ExtractArticle, 3).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        store.enqueue(&source("second"), JobKind::ExtractArticle, 3).await.unwrap();

        let job = store.claim_next(Utc::now()).await.unwrap().unwrap();
        assert_eq!(job.source.external_id, "first");
        let job = store.claim_next(Utc::now()).await.unwrap().unwrap();
        assert_eq!(job.source.external_id, "second");
        assert!(store.claim_next(Utc::now()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_retry_defers_eligibility() {
        let store = MemoryStore::new();
        let job = leased(&store, "a").await;
        let later = Utc::now() + Duration::seconds(60);
        store.retry(job.id, "timeout", later).await.unwrap();

        let stored = JobRepository::get(&store, job.id).await.unwrap().unwrap();
        assert_eq!(stored.attempt, 1);
        assert_eq!(stored.state, JobState::Pending);
        assert_eq!(stored.last_error.as_deref(), Some("timeout"));

        assert!(store.claim_next(Utc::now()).await.unwrap().is_none());
        let claimed = store.claim_next(later).await.unwrap().unwrap();
        assert_eq!(claimed.id, job.id);
    }

    #[tokio::test]
    async fn test_dead_letter_writes_failure_record() {
        let store = MemoryStore::new();
        let job = leased(&store, "a").await;
        store
            .dead_letter(job.id, ErrorKind::Transient, "fetch timed out", Utc::now())
            .await
            .unwrap();

        assert_eq!(store.job_count().await, 0);
        let record = DedupStore::get(&store, "a").await.unwrap().unwrap();
        assert!(!record.success);
        assert_eq!(record.error_message.as_deref(), Some("fetch timed out"));

        let dead = store.list_dead_letters(10).await.unwrap();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].attempts, 1);
        assert_eq!(dead[0].error_kind, ErrorKind::Transient);
    }

    #[tokio::test]
    async fn test_requeue_dead_letter() {
        let store = MemoryStore::new();
        let job = leased(&store, "a").await;
        store
            .dead_letter(job.id, ErrorKind::Permanent, "HTTP 404", Utc::now())
            .await
            .unwrap();

        let new_id = store.requeue_dead_letter(job.id, 5).await.unwrap().unwrap();
        assert_ne!(new_id, job.id);
        assert!(!store.is_processed("a").await.unwrap());
        assert!(store.list_dead_letters(10).await.unwrap().is_empty());
        assert!(store.requeue_dead_letter(job.id, 5).await.unwrap().is_none());

        let requeued = JobRepository::get(&store, new_id).await.unwrap().unwrap();
        assert_eq!(requeued.max_attempts, 5);
        assert_eq!(requeued.attempt, 0);
    }

    #[tokio::test]
    async fn test_complete_requires_lease() {
        let store = MemoryStore::new();
        let id = store
            .enqueue(&source("a"), JobKind::ExtractArticle, 3)
            .await
            .unwrap()
            .unwrap();
        let record = ProcessedPostRecord::succeeded(source("a"), vec![], Utc::now());
        let err = store.complete(id, &record).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvariantViolation);
    }

    #[tokio::test]
    async fn test_complete_rejects_mismatched_record() {
        let store = MemoryStore::new();
        let job = leased(&store, "a").await;
        let record = ProcessedPostRecord::succeeded(source("b"), vec![], Utc::now());
        let err = store.complete(job.id, &record).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvariantViolation);
        assert_eq!(store.job_count().await, 1);
    }

    #[tokio::test]
    async fn test_release_and_stale_leases() {
        let store = MemoryStore::new();
        let job = leased(&store, "a").await;
        store.release(job.id).await.unwrap();
        let again = store.claim_next(Utc::now()).await.unwrap().unwrap();
        assert_eq!(again.id, job.id);
        assert_eq!(again.attempt, 0);

        let released = store
            .release_stale_leases(Utc::now() + Duration::seconds(1))
            .await
            .unwrap();
        assert_eq!(released, 1);
        assert_eq!(store.pending_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_record_delivery_persists_ids() {
        let store = MemoryStore::new();
        let job = leased(&store, "a").await;
        store
            .record_delivery(job.id, &["m1".to_string(), "m2".to_string()])
            .await
            .unwrap();
        let stored = JobRepository::get(&store, job.id).await.unwrap().unwrap();
        assert_eq!(stored.delivered_message_ids, vec!["m1", "m2"]);
    }

    #[tokio::test]
    async fn test_queue_stats() {
        let store = MemoryStore::new();
        let job = leased(&store, "a").await;
        store.enqueue(&source("b"), JobKind::ExtractArticle, 3).await.unwrap();
        store.retry(job.id, "x", Utc::now()).await.unwrap();

        let stats = store.queue_stats().await.unwrap();
        assert_eq!(stats.pending, 2);
        assert_eq!(stats.retrying, 1);
        assert_eq!(stats.leased, 0);
    }

    #[tokio::test]
    async fn test_processing_stats_and_cleanup() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let old = now - Duration::days(40);
        store
            .record(&ProcessedPostRecord::succeeded(source("a"), vec!["m".into()], now))
            .await
            .unwrap();
        store
            .record(&ProcessedPostRecord::failed(source("b"), "Unsupported content type", now))
            .await
            .unwrap();
        store
            .record(&ProcessedPostRecord::failed(source("c"), "Unsupported content type", now))
            .await
            .unwrap();
        store
            .record(&ProcessedPostRecord::failed(source("d"), "HTTP 404", old))
            .await
            .unwrap();

        let stats = store.processing_stats(7).await.unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.succeeded, 1);
        assert_eq!(stats.failed, 2);
        assert_eq!(stats.common_errors[0].error_message, "Unsupported content type");
        assert_eq!(stats.common_errors[0].count, 2);

        assert_eq!(store.failed(10).await.unwrap().len(), 3);
        assert_eq!(store.recent(2).await.unwrap().len(), 2);

        let removed = store
            .cleanup_older_than(now - Duration::days(30))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.record_count().await, 3);
    }

    #[tokio::test]
    async fn test_record_is_insert_if_absent() {
        let store = MemoryStore::new();
        let now = Utc::now();
        assert!(store
            .record(&ProcessedPostRecord::failed(source("a"), "x", now))
            .await
            .unwrap());
        assert!(!store
            .record(&ProcessedPostRecord::succeeded(source("a"), vec![], now))
            .await
            .unwrap());
        assert!(!DedupStore::get(&store, "a").await.unwrap().unwrap().success);
    }
}
