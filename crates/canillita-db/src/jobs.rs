//! PostgreSQL job queue.
//!
//! Claims use `FOR UPDATE SKIP LOCKED`, so any number of workers can poll the
//! same table. Every statement that decides whether a source is in flight or
//! finished first takes a transaction-scoped advisory lock on the source's
//! external id; enqueue and the terminal transitions are therefore serialized
//! per source, and the unique indexes on `job_queue.external_id` and
//! `processed_posts.external_id` back that up at the schema level.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, Pool, Postgres, Row};
use tokio::sync::Notify;
use tracing::{debug, info};
use uuid::Uuid;

use canillita_core::{
    DeadLetter, Error, ErrorKind, Job, JobKind, JobRepository, JobState, ProcessedPostRecord,
    QueueStats, Result, SourceKind, SourceRef,
};

use crate::processed::insert_record;

const JOB_COLUMNS: &str = "id, external_id, url, source_kind, job_kind, state, attempt, \
     max_attempts, enqueued_at, next_eligible_at, leased_at, last_error, delivered_message_ids";

const DEAD_LETTER_COLUMNS: &str =
    "job_id, external_id, url, source_kind, job_kind, attempts, error_kind, last_error, dead_at";

/// PostgreSQL implementation of JobRepository.
#[derive(Clone)]
pub struct PgJobRepository {
    pool: Pool<Postgres>,
    /// Woken whenever a job becomes claimable.
    notify: Arc<Notify>,
}

impl PgJobRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self {
            pool,
            notify: Arc::new(Notify::new()),
        }
    }

    /// Handle woken on enqueue, retry and release.
    pub fn job_notify(&self) -> Arc<Notify> {
        self.notify.clone()
    }

    fn parse_job_row(row: &PgRow) -> Result<Job> {
        let source_kind: String = row.try_get("source_kind")?;
        let job_kind: String = row.try_get("job_kind")?;
        let state: String = row.try_get("state")?;
        Ok(Job {
            id: row.try_get("id")?,
            source: SourceRef {
                external_id: row.try_get("external_id")?,
                url: row.try_get("url")?,
                kind: source_kind.parse::<SourceKind>().map_err(schema_mismatch)?,
            },
            kind: job_kind.parse::<JobKind>().map_err(schema_mismatch)?,
            state: state.parse::<JobState>().map_err(schema_mismatch)?,
            attempt: row.try_get("attempt")?,
            max_attempts: row.try_get("max_attempts")?,
            enqueued_at: row.try_get("enqueued_at")?,
            next_eligible_at: row.try_get("next_eligible_at")?,
            leased_at: row.try_get("leased_at")?,
            last_error: row.try_get("last_error")?,
            delivered_message_ids: row.try_get("delivered_message_ids")?,
        })
    }

    fn parse_dead_letter_row(row: &PgRow) -> Result<DeadLetter> {
        let source_kind: String = row.try_get("source_kind")?;
        let job_kind: String = row.try_get("job_kind")?;
        let error_kind: String = row.try_get("error_kind")?;
        Ok(DeadLetter {
            job_id: row.try_get("job_id")?,
            source: SourceRef {
                external_id: row.try_get("external_id")?,
                url: row.try_get("url")?,
                kind: source_kind.parse::<SourceKind>().map_err(schema_mismatch)?,
            },
            kind: job_kind.parse::<JobKind>().map_err(schema_mismatch)?,
            attempts: row.try_get("attempts")?,
            error_kind: error_kind.parse::<ErrorKind>().map_err(schema_mismatch)?,
            last_error: row.try_get("last_error")?,
            dead_at: row.try_get("dead_at")?,
        })
    }
}

fn schema_mismatch(e: Error) -> Error {
    Error::InvariantViolation(format!("job table schema mismatch: {}", e))
}

/// Serialize queue decisions for one source until the transaction ends.
async fn lock_source(conn: &mut PgConnection, external_id: &str) -> Result<()> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
        .bind(external_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Insert a pending job unless the source is in flight or already recorded.
async fn insert_job_if_new(
    conn: &mut PgConnection,
    source: &SourceRef,
    kind: JobKind,
    max_attempts: i32,
    now: DateTime<Utc>,
) -> Result<Option<Uuid>> {
    let inserted: Option<Uuid> = sqlx::query_scalar(
        "INSERT INTO job_queue (id, external_id, url, source_kind, job_kind, state, attempt,
                                max_attempts, enqueued_at, next_eligible_at)
         SELECT $1, $2, $3, $4, $5, 'pending', 0, $6, $7, $7
         WHERE NOT EXISTS (SELECT 1 FROM processed_posts WHERE external_id = $2)
         ON CONFLICT (external_id) DO NOTHING
         RETURNING id",
    )
    .bind(Uuid::now_v7())
    .bind(&source.external_id)
    .bind(&source.url)
    .bind(source.kind.as_str())
    .bind(kind.as_str())
    .bind(max_attempts.max(1))
    .bind(now)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(inserted)
}

#[async_trait]
impl JobRepository for PgJobRepository {
    async fn enqueue(
        &self,
        source: &SourceRef,
        kind: JobKind,
        max_attempts: i32,
    ) -> Result<Option<Uuid>> {
        let mut tx = self.pool.begin().await?;
        lock_source(&mut tx, &source.external_id).await?;
        let inserted = insert_job_if_new(&mut tx, source, kind, max_attempts, Utc::now()).await?;
        tx.commit().await?;

        match inserted {
            Some(job_id) => {
                debug!(
                    subsystem = "db",
                    component = "jobs",
                    op = "enqueue",
                    %job_id,
                    external_id = %source.external_id,
                    job_kind = %kind,
                    "Job queued"
                );
                self.notify.notify_waiters();
            }
            None => debug!(
                subsystem = "db",
                component = "jobs",
                op = "enqueue",
                external_id = %source.external_id,
                "Source already in flight or processed, enqueue skipped"
            ),
        }
        Ok(inserted)
    }

    async fn claim_next(&self, now: DateTime<Utc>) -> Result<Option<Job>> {
        let query = format!(
            "UPDATE job_queue
             SET state = 'leased', leased_at = $1
             WHERE id = (
                 SELECT id FROM job_queue
                 WHERE state = 'pending' AND next_eligible_at <= $1
                 ORDER BY enqueued_at ASC
                 LIMIT 1
                 FOR UPDATE SKIP LOCKED
             )
             RETURNING {JOB_COLUMNS}"
        );
        let row = sqlx::query(&query)
            .bind(now)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::parse_job_row).transpose()
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<Job>> {
        let query = format!("SELECT {JOB_COLUMNS} FROM job_queue WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::parse_job_row).transpose()
    }

    async fn record_delivery(&self, job_id: Uuid, message_ids: &[String]) -> Result<()> {
        let result = sqlx::query(
            "UPDATE job_queue SET delivered_message_ids = $2
             WHERE id = $1 AND state = 'leased'",
        )
        .bind(job_id)
        .bind(message_ids)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::InvariantViolation(format!(
                "delivery recorded for job {} which is not leased",
                job_id
            )));
        }
        Ok(())
    }

    async fn complete(&self, job_id: Uuid, record: &ProcessedPostRecord) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        lock_source(&mut tx, &record.source.external_id).await?;

        let external_id: Option<String> = sqlx::query_scalar(
            "DELETE FROM job_queue WHERE id = $1 AND state = 'leased' RETURNING external_id",
        )
        .bind(job_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(external_id) = external_id else {
            return Err(Error::InvariantViolation(format!(
                "job {} completed without holding a lease",
                job_id
            )));
        };
        if external_id != record.source.external_id {
            return Err(Error::InvariantViolation(format!(
                "job {} belongs to {} but the record is for {}",
                job_id, external_id, record.source.external_id
            )));
        }

        if !insert_record(&mut tx, record).await? {
            return Err(Error::InvariantViolation(format!(
                "processed record already exists for {}",
                external_id
            )));
        }

        tx.commit().await?;
        Ok(())
    }

    async fn retry(
        &self,
        job_id: Uuid,
        error: &str,
        next_eligible_at: DateTime<Utc>,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE job_queue
             SET state = 'pending', attempt = attempt + 1, last_error = $2,
                 next_eligible_at = $3, leased_at = NULL
             WHERE id = $1 AND state = 'leased'",
        )
        .bind(job_id)
        .bind(error)
        .bind(next_eligible_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::InvariantViolation(format!(
                "retry requested for job {} which is not leased",
                job_id
            )));
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
        let mut tx = self.pool.begin().await?;

        let external_id: Option<String> =
            sqlx::query_scalar("SELECT external_id FROM job_queue WHERE id = $1")
                .bind(job_id)
                .fetch_optional(&mut *tx)
                .await?;
        let Some(external_id) = external_id else {
            return Err(Error::InvariantViolation(format!(
                "dead letter requested for unknown job {}",
                job_id
            )));
        };
        lock_source(&mut tx, &external_id).await?;

        let query = format!(
            "DELETE FROM job_queue WHERE id = $1 AND state = 'leased' RETURNING {JOB_COLUMNS}"
        );
        let row = sqlx::query(&query)
            .bind(job_id)
            .fetch_optional(&mut *tx)
            .await?;
        let Some(row) = row else {
            return Err(Error::InvariantViolation(format!(
                "dead letter requested for job {} which is not leased",
                job_id
            )));
        };
        let job = Self::parse_job_row(&row)?;

        sqlx::query(
            "INSERT INTO dead_letters (job_id, external_id, url, source_kind, job_kind, attempts,
                                       error_kind, last_error, dead_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(job.id)
        .bind(&job.source.external_id)
        .bind(&job.source.url)
        .bind(job.source.kind.as_str())
        .bind(job.kind.as_str())
        .bind(job.attempt + 1)
        .bind(kind.as_str())
        .bind(error)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let record = ProcessedPostRecord::failed(job.source.clone(), error, now);
        insert_record(&mut tx, &record).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn release(&self, job_id: Uuid) -> Result<()> {
        let result = sqlx::query(
            "UPDATE job_queue SET state = 'pending', leased_at = NULL
             WHERE id = $1 AND state = 'leased'",
        )
        .bind(job_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            self.notify.notify_waiters();
        }
        Ok(())
    }

    async fn release_stale_leases(&self, older_than: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE job_queue SET state = 'pending', leased_at = NULL
             WHERE state = 'leased' AND leased_at < $1",
        )
        .bind(older_than)
        .execute(&self.pool)
        .await?;

        let released = result.rows_affected();
        if released > 0 {
            info!(
                subsystem = "db",
                component = "jobs",
                op = "release_stale_leases",
                released,
                "Returned stale leases to pending"
            );
            self.notify.notify_waiters();
        }
        Ok(released)
    }

    async fn pending_count(&self) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM job_queue WHERE state = 'pending'")
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    async fn queue_stats(&self) -> Result<QueueStats> {
        let row = sqlx::query(
            "SELECT
                COUNT(*) FILTER (WHERE state = 'pending') AS pending,
                COUNT(*) FILTER (WHERE state = 'leased') AS leased,
                COUNT(*) FILTER (WHERE state = 'pending' AND attempt > 0) AS retrying,
                (SELECT COUNT(*) FROM dead_letters) AS dead_lettered
             FROM job_queue",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(QueueStats {
            pending: row.try_get("pending")?,
            leased: row.try_get("leased")?,
            retrying: row.try_get("retrying")?,
            dead_lettered: row.try_get("dead_lettered")?,
        })
    }

    async fn list_dead_letters(&self, limit: i64) -> Result<Vec<DeadLetter>> {
        let query = format!(
            "SELECT {DEAD_LETTER_COLUMNS} FROM dead_letters ORDER BY dead_at DESC LIMIT $1"
        );
        let rows = sqlx::query(&query)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::parse_dead_letter_row).collect()
    }

    async fn requeue_dead_letter(
        &self,
        job_id: Uuid,
        max_attempts: i32,
    ) -> Result<Option<Uuid>> {
        let mut tx = self.pool.begin().await?;

        let query =
            format!("SELECT {DEAD_LETTER_COLUMNS} FROM dead_letters WHERE job_id = $1 FOR UPDATE");
        let row = sqlx::query(&query)
            .bind(job_id)
            .fetch_optional(&mut *tx)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let dead = Self::parse_dead_letter_row(&row)?;
        lock_source(&mut tx, &dead.source.external_id).await?;

        sqlx::query("DELETE FROM processed_posts WHERE external_id = $1 AND NOT success")
            .bind(&dead.source.external_id)
            .execute(&mut *tx)
            .await?;

        let inserted = insert_job_if_new(
            &mut tx,
            &dead.source,
            dead.kind,
            max_attempts,
            Utc::now(),
        )
        .await?;
        if inserted.is_none() {
            tx.rollback().await?;
            return Ok(None);
        }

        sqlx::query("DELETE FROM dead_letters WHERE job_id = $1")
            .bind(job_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        info!(
            subsystem = "db",
            component = "jobs",
            op = "requeue_dead_letter",
            %job_id,
            external_id = %dead.source.external_id,
            "Dead letter re-queued"
        );
        self.notify.notify_waiters();
        Ok(inserted)
    }
}
