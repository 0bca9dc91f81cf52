//! PostgreSQL dedup store for processed posts.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, Pool, Postgres, Row};

use canillita_core::{
    DedupStore, Error, ErrorCount, ProcessedPostRecord, ProcessingStats, Result, SourceKind,
    SourceRef,
};

const RECORD_COLUMNS: &str =
    "external_id, url, source_kind, processed_at, success, message_ids, error_message";

/// Number of distinct error messages reported in stats.
const COMMON_ERRORS_LIMIT: i64 = 5;

/// Insert a record unless the source already has one. Returns whether it was inserted.
pub(crate) async fn insert_record(
    conn: &mut PgConnection,
    record: &ProcessedPostRecord,
) -> Result<bool> {
    let result = sqlx::query(
        "INSERT INTO processed_posts (external_id, url, source_kind, processed_at, success,
                                      message_ids, error_message)
         VALUES ($1, $2, $3, $4, $5, $6, $7)
         ON CONFLICT (external_id) DO NOTHING",
    )
    .bind(&record.source.external_id)
    .bind(&record.source.url)
    .bind(record.source.kind.as_str())
    .bind(record.processed_at)
    .bind(record.success)
    .bind(&record.message_ids)
    .bind(&record.error_message)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// PostgreSQL implementation of DedupStore.
#[derive(Clone)]
pub struct PgDedupStore {
    pool: Pool<Postgres>,
}

impl PgDedupStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_record_row(row: &PgRow) -> Result<ProcessedPostRecord> {
        let source_kind: String = row.try_get("source_kind")?;
        let kind = source_kind.parse::<SourceKind>().map_err(|e| {
            Error::InvariantViolation(format!("processed_posts schema mismatch: {}", e))
        })?;
        Ok(ProcessedPostRecord {
            source: SourceRef {
                external_id: row.try_get("external_id")?,
                url: row.try_get("url")?,
                kind,
            },
            processed_at: row.try_get("processed_at")?,
            success: row.try_get("success")?,
            message_ids: row.try_get("message_ids")?,
            error_message: row.try_get("error_message")?,
        })
    }
}

#[async_trait]
impl DedupStore for PgDedupStore {
    async fn is_processed(&self, external_id: &str) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM processed_posts WHERE external_id = $1)",
        )
        .bind(external_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn get(&self, external_id: &str) -> Result<Option<ProcessedPostRecord>> {
        let query = format!("SELECT {RECORD_COLUMNS} FROM processed_posts WHERE external_id = $1");
        let row = sqlx::query(&query)
            .bind(external_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::parse_record_row).transpose()
    }

    async fn record(&self, record: &ProcessedPostRecord) -> Result<bool> {
        let mut conn = self.pool.acquire().await?;
        insert_record(&mut conn, record).await
    }

    async fn processing_stats(&self, window_days: i64) -> Result<ProcessingStats> {
        let days = window_days.clamp(0, i32::MAX as i64) as i32;

        let row = sqlx::query(
            "SELECT COUNT(*) AS total,
                    COUNT(*) FILTER (WHERE success) AS succeeded
             FROM processed_posts
             WHERE processed_at >= NOW() - make_interval(days => $1)",
        )
        .bind(days)
        .fetch_one(&self.pool)
        .await?;
        let total: i64 = row.try_get("total")?;
        let succeeded: i64 = row.try_get("succeeded")?;

        let error_rows = sqlx::query(
            "SELECT COALESCE(error_message, 'unknown') AS error_message, COUNT(*) AS count
             FROM processed_posts
             WHERE NOT success AND processed_at >= NOW() - make_interval(days => $1)
             GROUP BY 1
             ORDER BY count DESC, error_message ASC
             LIMIT $2",
        )
        .bind(days)
        .bind(COMMON_ERRORS_LIMIT)
        .fetch_all(&self.pool)
        .await?;

        let common_errors = error_rows
            .iter()
            .map(|row| {
                Ok(ErrorCount {
                    error_message: row.try_get("error_message")?,
                    count: row.try_get("count")?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(ProcessingStats::new(
            window_days,
            total,
            succeeded,
            common_errors,
        ))
    }

    async fn recent(&self, limit: i64) -> Result<Vec<ProcessedPostRecord>> {
        let query = format!(
            "SELECT {RECORD_COLUMNS} FROM processed_posts ORDER BY processed_at DESC LIMIT $1"
        );
        let rows = sqlx::query(&query)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::parse_record_row).collect()
    }

    async fn failed(&self, limit: i64) -> Result<Vec<ProcessedPostRecord>> {
        let query = format!(
            "SELECT {RECORD_COLUMNS} FROM processed_posts
             WHERE NOT success ORDER BY processed_at DESC LIMIT $1"
        );
        let rows = sqlx::query(&query)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::parse_record_row).collect()
    }

    async fn cleanup_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM processed_posts WHERE processed_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
