//! Threaded delivery of message chunks.

use std::time::Duration;

use tracing::{debug, info, warn};

use canillita_core::{Error, Job, JobRepository, MessageChunk, PlatformClient, Result};

/// Submit `chunks` in order as a reply chain under the job's submission.
///
/// Resumes after the ids already recorded on the job and persists the id of
/// every newly delivered chunk before moving on, so a retried job never posts
/// the same chunk twice. Returns all message ids in chunk order.
pub async fn deliver(
    platform: &dyn PlatformClient,
    jobs: &dyn JobRepository,
    job: &Job,
    chunks: &[MessageChunk],
    submit_timeout: Duration,
) -> Result<Vec<String>> {
    let mut delivered = job.delivered_message_ids.clone();
    if delivered.len() > chunks.len() {
        return Err(Error::InvariantViolation(format!(
            "job {} has {} delivered messages but only {} chunks",
            job.id,
            delivered.len(),
            chunks.len()
        )));
    }
    if !delivered.is_empty() {
        debug!(
            job_id = %job.id,
            resumed_after = delivered.len(),
            "Resuming partial delivery"
        );
    }

    for chunk in &chunks[delivered.len()..] {
        let parent = match chunk.reply_to_sequence {
            None => job.source.external_id.clone(),
            Some(seq) => delivered.get(seq).cloned().ok_or_else(|| {
                Error::InvariantViolation(format!(
                    "chunk {} replies to undelivered chunk {}",
                    chunk.sequence, seq
                ))
            })?,
        };

        let message_id = tokio::time::timeout(submit_timeout, platform.submit(&parent, &chunk.body))
            .await
            .map_err(|_| {
                warn!(job_id = %job.id, sequence = chunk.sequence, "Submit timed out");
                Error::Timeout(format!(
                    "submitting chunk {} exceeded {}s",
                    chunk.sequence,
                    submit_timeout.as_secs()
                ))
            })??;

        delivered.push(message_id);
        jobs.record_delivery(job.id, &delivered).await?;
    }

    info!(
        job_id = %job.id,
        external_id = %job.source.external_id,
        chunk_count = chunks.len(),
        "Delivered reply thread"
    );
    Ok(delivered)
}
