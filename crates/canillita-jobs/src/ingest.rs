//! Submission poller feeding the queue.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

use canillita_core::{defaults, PlatformClient, Result};
use canillita_extract::ProviderStore;

use crate::pipeline::{Pipeline, SubmitOutcome};
use crate::worker::shutdown_requested;

/// Counts from one poll.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub seen: usize,
    pub enqueued: usize,
    pub duplicates: usize,
    pub unsupported: usize,
}

/// Polls the platform for new submissions and enqueues them.
pub struct Ingestor {
    platform: Arc<dyn PlatformClient>,
    pipeline: Pipeline,
    communities: Vec<String>,
    interval: Duration,
    /// Rule set re-read from disk before every cycle.
    provider_reload: Option<(Arc<ProviderStore>, PathBuf)>,
}

impl Ingestor {
    pub fn new(platform: Arc<dyn PlatformClient>, pipeline: Pipeline, communities: Vec<String>) -> Self {
        Self {
            platform,
            pipeline,
            communities,
            interval: Duration::from_secs(defaults::INGEST_INTERVAL_SECS),
            provider_reload: None,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Reload provider rules from `path` at the start of every cycle.
    pub fn with_provider_reload(mut self, store: Arc<ProviderStore>, path: PathBuf) -> Self {
        self.provider_reload = Some((store, path));
        self
    }

    /// Swap in the rules currently on disk. An invalid rule set keeps the
    /// previous one active.
    pub fn reload_providers(&self) {
        let Some((store, path)) = &self.provider_reload else {
            return;
        };
        match store.reload(path) {
            Ok(count) => debug!(
                path = %path.display(),
                providers = count,
                "Provider rules reloaded"
            ),
            Err(e) => warn!(
                path = %path.display(),
                error = %e,
                "Provider reload failed, keeping previous rules"
            ),
        }
    }

    /// Fetch once and enqueue everything new.
    #[instrument(skip(self), fields(subsystem = "jobs", component = "ingestor"))]
    pub async fn poll_once(&self) -> Result<IngestReport> {
        let submissions = self.platform.fetch_new_submissions(&self.communities).await?;
        let mut report = IngestReport {
            seen: submissions.len(),
            ..Default::default()
        };
        for submission in &submissions {
            match self.pipeline.submit(submission).await? {
                SubmitOutcome::Enqueued(_) => report.enqueued += 1,
                SubmitOutcome::Duplicate => report.duplicates += 1,
                SubmitOutcome::Unsupported(_) => report.unsupported += 1,
            }
        }
        if report.enqueued > 0 {
            info!(
                seen = report.seen,
                enqueued = report.enqueued,
                unsupported = report.unsupported,
                "Submissions ingested"
            );
        } else {
            debug!(seen = report.seen, "No new submissions");
        }
        Ok(report)
    }

    /// Poll on the configured interval until shutdown is signalled.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.interval.as_secs(),
            communities = self.communities.len(),
            "Ingestor started"
        );
        loop {
            if *shutdown.borrow() {
                break;
            }
            self.reload_providers();
            if let Err(e) = self.poll_once().await {
                error!(error = %e, error_kind = %e.kind(), "Submission poll failed");
            }
            tokio::select! {
                _ = shutdown_requested(&mut shutdown) => break,
                _ = sleep(self.interval) => {}
            }
        }
        info!("Ingestor stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use canillita_core::{ContentClassifier, Error, Submission};
    use canillita_db::Stores;
    use canillita_extract::ProviderRegistry;

    struct FixedPlatform {
        submissions: Vec<Submission>,
        polls: AtomicUsize,
    }

    #[async_trait]
    impl PlatformClient for FixedPlatform {
        async fn fetch_new_submissions(&self, communities: &[String]) -> Result<Vec<Submission>> {
            assert_eq!(communities, ["argentina".to_string()]);
            self.polls.fetch_add(1, Ordering::SeqCst);
            Ok(self.submissions.clone())
        }

        async fn submit(&self, _parent_id: &str, _body: &str) -> Result<String> {
            Err(Error::Internal("not used".to_string()))
        }
    }

    fn submission(id: &str, url: &str) -> Submission {
        Submission {
            external_id: id.to_string(),
            url: url.to_string(),
            community: Some("argentina".to_string()),
            title: None,
        }
    }

    fn ingestor(platform: Arc<FixedPlatform>) -> Ingestor {
        let pipeline = Pipeline::new(Stores::memory(), ContentClassifier::default(), 3);
        Ingestor::new(platform, pipeline, vec!["argentina".to_string()])
    }

    fn platform() -> Arc<FixedPlatform> {
        Arc::new(FixedPlatform {
            submissions: vec![
                submission("t3_1", "https://example.com/nota"),
                submission("t3_2", "https://www.youtube.com/watch?v=abc123"),
                submission("t3_3", "https://x.com/usuario"),
            ],
            polls: AtomicUsize::new(0),
        })
    }

    #[tokio::test]
    async fn test_repeated_polls_are_harmless() {
        let ingestor = ingestor(platform());
        let first = ingestor.poll_once().await.unwrap();
        assert_eq!(
            first,
            IngestReport {
                seen: 3,
                enqueued: 2,
                duplicates: 0,
                unsupported: 1
            }
        );
        let second = ingestor.poll_once().await.unwrap();
        assert_eq!(second.enqueued, 0);
        assert_eq!(second.duplicates, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_shutdown() {
        let platform = platform();
        let ingestor = ingestor(platform.clone()).with_interval(Duration::from_secs(30));
        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(async move { ingestor.run(rx).await });

        sleep(Duration::from_secs(65)).await;
        tx.send(true).unwrap();
        task.await.unwrap();
        assert_eq!(platform.polls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_changed_provider_rules_apply_next_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let rules = dir.path().join("pagina12.com.ar.yaml");
        std::fs::write(&rules, "content_selectors: [\".article-main\"]\n").unwrap();

        let providers = Arc::new(ProviderStore::new(ProviderRegistry::with_defaults()));
        let ingestor = ingestor(platform())
            .with_interval(Duration::from_secs(30))
            .with_provider_reload(providers.clone(), dir.path().to_path_buf());
        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(async move { ingestor.run(rx).await });

        let selectors = |store: &ProviderStore| {
            store
                .snapshot()
                .resolve("https://www.pagina12.com.ar/nota")
                .rule()
                .content_selectors
                .clone()
        };

        sleep(Duration::from_secs(1)).await;
        assert_eq!(selectors(&providers), vec![".article-main"]);

        std::fs::write(&rules, "content_selectors: [\"#cuerpo-nota\"]\n").unwrap();
        sleep(Duration::from_secs(30)).await;
        assert_eq!(selectors(&providers), vec!["#cuerpo-nota"]);

        // A broken file keeps the last good rules.
        std::fs::write(&rules, "content_selectors: [\"<<<\"]\n").unwrap();
        sleep(Duration::from_secs(30)).await;
        assert_eq!(selectors(&providers), vec!["#cuerpo-nota"]);

        tx.send(true).unwrap();
        task.await.unwrap();
    }
}
