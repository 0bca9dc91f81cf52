//! Wiring of stores, extraction and handlers from configuration.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{info, warn};

use canillita_core::{
    defaults, JobKind, PipelineConfig, PlatformClient, SummarizationClient, TranscriptClient,
};
use canillita_db::{Database, PoolConfig, Stores};
use canillita_extract::{
    FetchConfig, Fetcher, HttpFetcher, Orchestrator, ProviderRegistry, ProviderStore,
    SocialPostExtractor,
};
use canillita_inference::{HttpTranscriptClient, NoTranscripts, OllamaSummarizer};
use canillita_jobs::{
    ArticleHandler, JobHandler, JobWorker, Pipeline, SocialHandler, VideoHandler, WorkerBuilder,
    WorkerConfig,
};

/// Everything a command needs, built once from the environment.
pub struct App {
    pub config: PipelineConfig,
    pub stores: Stores,
    pub providers: Arc<ProviderStore>,
    pub pipeline: Pipeline,
    fetcher: Arc<dyn Fetcher>,
}

impl App {
    pub async fn build(config: PipelineConfig) -> anyhow::Result<Self> {
        let stores = connect_stores(&config).await?;
        let providers = Arc::new(ProviderStore::new(load_providers(&config)?));
        let fetcher: Arc<dyn Fetcher> = Arc::new(
            HttpFetcher::new(
                FetchConfig::default().with_timeout(Duration::from_secs(config.fetch_timeout_secs)),
            )
            .context("building document fetcher")?,
        );
        let pipeline = Pipeline::from_config(stores.clone(), &config);
        Ok(Self {
            config,
            stores,
            providers,
            pipeline,
            fetcher,
        })
    }

    /// One handler per job kind.
    pub fn handlers(&self) -> anyhow::Result<Vec<Arc<dyn JobHandler>>> {
        let orchestrator = Arc::new(Orchestrator::new(self.fetcher.clone(), self.providers.clone()));

        let transcripts: Arc<dyn TranscriptClient> = match HttpTranscriptClient::from_env()? {
            Some(client) => Arc::new(client),
            None => {
                warn!("CANILLITA_TRANSCRIPT_URL not set, video jobs will fail permanently");
                Arc::new(NoTranscripts)
            }
        };
        let summarizer: Arc<dyn SummarizationClient> = Arc::new(OllamaSummarizer::from_env()?);
        info!(model = summarizer.model_name(), "Summarizer configured");

        let social = SocialPostExtractor::new(
            std::env::var("CANILLITA_OEMBED_URL").unwrap_or_else(|_| defaults::OEMBED_URL.to_string()),
            Duration::from_secs(self.config.fetch_timeout_secs),
        )?;

        let video = VideoHandler::new(transcripts, summarizer)
            .with_title_lookup(self.fetcher.clone(), self.providers.clone());
        Ok(vec![
            Arc::new(ArticleHandler::new(orchestrator)) as Arc<dyn JobHandler>,
            Arc::new(video) as Arc<dyn JobHandler>,
            Arc::new(SocialHandler::new(Arc::new(social))) as Arc<dyn JobHandler>,
        ])
    }

    pub fn handler_for(&self, kind: JobKind) -> anyhow::Result<Arc<dyn JobHandler>> {
        self.handlers()?
            .into_iter()
            .find(|h| h.can_handle(kind))
            .with_context(|| format!("no handler for {}", kind))
    }

    /// Worker pool with every handler registered.
    pub fn worker(&self, platform: Arc<dyn PlatformClient>) -> anyhow::Result<JobWorker> {
        let config = WorkerConfig::from_env().with_max_chunk_length(self.config.max_chunk_length);
        let mut worker = WorkerBuilder::new(self.stores.clone(), platform)
            .with_config(config)
            .build();
        for handler in self.handlers()? {
            worker.register_handler(handler);
        }
        Ok(worker)
    }
}

/// PostgreSQL when `DATABASE_URL` is set, otherwise process memory.
async fn connect_stores(config: &PipelineConfig) -> anyhow::Result<Stores> {
    match &config.database_url {
        Some(url) => {
            info!("Connecting to database...");
            let workers = WorkerConfig::from_env().max_concurrent_jobs;
            let db = Database::connect(url, PoolConfig::from_env(workers))
                .await
                .context("connecting to database")?;
            db.migrate().await.context("running migrations")?;
            info!("Database connected");
            Ok(Stores::postgres(&db))
        }
        None => {
            warn!("DATABASE_URL not set, using in-memory stores");
            Ok(Stores::memory())
        }
    }
}

/// Provider rules from `CANILLITA_PROVIDERS`, or the built-in set.
pub fn load_providers(config: &PipelineConfig) -> anyhow::Result<ProviderRegistry> {
    match &config.providers_path {
        Some(path) => ProviderRegistry::load(path)
            .with_context(|| format!("loading provider rules from {}", path.display())),
        None => Ok(ProviderRegistry::with_defaults()),
    }
}
