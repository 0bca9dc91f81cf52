//! Concurrency tests for the in-memory queue.
//!
//! Many tasks racing on the same source must produce one job and, after the
//! workers drain the queue, exactly one processed record.

use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use canillita_db::{
    DedupStore, JobKind, JobRepository, MemoryStore, ProcessedPostRecord, SourceKind, SourceRef,
};

fn article(id: &str) -> SourceRef {
    SourceRef::new(id, format!("https://news.example/{}", id), SourceKind::Article)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_enqueue_yields_single_job() {
    let store = Arc::new(MemoryStore::new());

    let tasks = (0..32).map(|_| {
        let store = store.clone();
        tokio::spawn(async move {
            store
                .enqueue(&article("t3_same"), JobKind::ExtractArticle, 3)
                .await
                .unwrap()
        })
    });
    let results = join_all(tasks).await;
    let inserted = results
        .into_iter()
        .map(|r| r.unwrap())
        .filter(Option::is_some)
        .count();

    assert_eq!(inserted, 1);
    assert_eq!(store.job_count().await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_workers_claim_distinct_jobs() {
    let store = Arc::new(MemoryStore::new());
    for i in 0..20 {
        store
            .enqueue(&article(&format!("t3_{}", i)), JobKind::ExtractArticle, 3)
            .await
            .unwrap();
    }

    let workers = (0..4).map(|_| {
        let store = store.clone();
        tokio::spawn(async move {
            let mut done = Vec::new();
            while let Some(job) = store.claim_next(Utc::now()).await.unwrap() {
                let record = ProcessedPostRecord::succeeded(
                    job.source.clone(),
                    vec![format!("msg_{}", job.source.external_id)],
                    Utc::now(),
                );
                store.complete(job.id, &record).await.unwrap();
                done.push(job.source.external_id);
            }
            done
        })
    });

    let mut all: Vec<String> = join_all(workers)
        .await
        .into_iter()
        .flat_map(|r| r.unwrap())
        .collect();
    all.sort();
    all.dedup();

    assert_eq!(all.len(), 20);
    assert_eq!(store.job_count().await, 0);
    assert_eq!(store.record_count().await, 20);
    assert_eq!(store.processing_stats(7).await.unwrap().succeeded, 20);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_enqueue_racing_completion_never_duplicates() {
    let store = Arc::new(MemoryStore::new());
    store
        .enqueue(&article("t3_race"), JobKind::ExtractArticle, 3)
        .await
        .unwrap();
    let job = store.claim_next(Utc::now()).await.unwrap().unwrap();

    let enqueuers = (0..16).map(|_| {
        let store = store.clone();
        tokio::spawn(async move {
            store
                .enqueue(&article("t3_race"), JobKind::ExtractArticle, 3)
                .await
                .unwrap()
        })
    });
    let completer = {
        let store = store.clone();
        let source = job.source.clone();
        tokio::spawn(async move {
            let record = ProcessedPostRecord::succeeded(source, vec!["m1".into()], Utc::now());
            store.complete(job.id, &record).await.unwrap();
        })
    };

    let inserted = join_all(enqueuers)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .filter(Option::is_some)
        .count();
    completer.await.unwrap();

    assert_eq!(inserted, 0);
    assert_eq!(store.job_count().await, 0);
    assert!(store.is_processed("t3_race").await.unwrap());
}
