//! Handlers for the three job kinds.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use canillita_core::{
    defaults, video_id_of, Error, ErrorKind, JobKind, MessageChunk, Result, SummarizationClient,
    SummaryContext, TranscriptClient,
};
use canillita_extract::{
    assemble, assemble_result, AssemblyInput, CommentTemplate, ExtractionStrategy, Fetcher,
    ManualStrategy, Orchestrator, ProviderStore, SocialPostExtractor,
};
use canillita_inference::summary_paragraphs;

use crate::handler::{JobContext, JobHandler};

/// Title used when a video page offers none.
pub const VIDEO_TITLE_FALLBACK: &str = "Video de YouTube";

/// Extracts an article through the fallback chain and assembles it.
pub struct ArticleHandler {
    orchestrator: Arc<Orchestrator>,
    template: CommentTemplate,
}

impl ArticleHandler {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            orchestrator,
            template: CommentTemplate::article(),
        }
    }

    pub fn with_template(mut self, template: CommentTemplate) -> Self {
        self.template = template;
        self
    }
}

#[async_trait]
impl JobHandler for ArticleHandler {
    fn job_kind(&self) -> JobKind {
        JobKind::ExtractArticle
    }

    #[instrument(
        skip(self, ctx),
        fields(subsystem = "jobs", component = "article", job_id = %ctx.job.id)
    )]
    async fn prepare(&self, ctx: &JobContext) -> Result<Vec<MessageChunk>> {
        let result = self.orchestrator.extract(ctx.source()).await;
        if let Some(err) = result.error() {
            return Err(err);
        }
        debug!(
            provider = %result.provider_used,
            strategy = %result.strategy,
            quality_score = result.quality_score,
            "Article extracted"
        );
        assemble_result(&result, ctx.max_chunk_length, &self.template)
    }
}

/// Summarizes a video transcript.
pub struct VideoHandler {
    transcripts: Arc<dyn TranscriptClient>,
    summarizer: Arc<dyn SummarizationClient>,
    page_fetcher: Option<(Arc<dyn Fetcher>, Arc<ProviderStore>)>,
    summarize_timeout: Duration,
    template: CommentTemplate,
}

impl VideoHandler {
    pub fn new(
        transcripts: Arc<dyn TranscriptClient>,
        summarizer: Arc<dyn SummarizationClient>,
    ) -> Self {
        Self {
            transcripts,
            summarizer,
            page_fetcher: None,
            summarize_timeout: Duration::from_secs(defaults::SUMMARIZE_TIMEOUT_SECS),
            template: CommentTemplate::video_summary(),
        }
    }

    /// Look the video title up on its page before summarizing.
    pub fn with_title_lookup(
        mut self,
        fetcher: Arc<dyn Fetcher>,
        providers: Arc<ProviderStore>,
    ) -> Self {
        self.page_fetcher = Some((fetcher, providers));
        self
    }

    pub fn with_summarize_timeout(mut self, timeout: Duration) -> Self {
        self.summarize_timeout = timeout;
        self
    }

    async fn video_title(&self, url: &str) -> Option<String> {
        let (fetcher, providers) = self.page_fetcher.as_ref()?;
        let document = match fetcher.fetch(url).await {
            Ok(document) => document,
            Err(e) => {
                debug!(error = %e, "Video page unavailable, using fallback title");
                return None;
            }
        };
        let registry = providers.snapshot();
        ManualStrategy
            .extract(&document, registry.resolve(url))
            .ok()
            .and_then(|extracted| extracted.title)
    }
}

#[async_trait]
impl JobHandler for VideoHandler {
    fn job_kind(&self) -> JobKind {
        JobKind::SummarizeVideo
    }

    #[instrument(
        skip(self, ctx),
        fields(subsystem = "jobs", component = "video", job_id = %ctx.job.id)
    )]
    async fn prepare(&self, ctx: &JobContext) -> Result<Vec<MessageChunk>> {
        let source = ctx.source();
        let video_id = video_id_of(&source.url).ok_or_else(|| {
            Error::Permanent(format!("no video id in {}", source.url))
        })?;

        let transcript = match self.transcripts.fetch(&video_id).await {
            Ok(t) => t,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(Error::Permanent(format!(
                    "no transcript available for video {}",
                    video_id
                )));
            }
            Err(e) => return Err(e),
        };

        let title = self
            .video_title(&source.url)
            .await
            .unwrap_or_else(|| VIDEO_TITLE_FALLBACK.to_string());
        let context = SummaryContext {
            title: Some(title.clone()),
            url: source.url.clone(),
            language: None,
        };

        let start = Instant::now();
        let summary = tokio::time::timeout(
            self.summarize_timeout,
            self.summarizer.summarize(&transcript, &context),
        )
        .await
        .map_err(|_| {
            warn!(
                timeout_secs = self.summarize_timeout.as_secs(),
                "Summarization timed out"
            );
            Error::Unavailable(format!(
                "summarization exceeded {}s",
                self.summarize_timeout.as_secs()
            ))
        })??;

        let paragraphs = summary_paragraphs(&summary);
        if paragraphs.is_empty() {
            return Err(Error::Unavailable("summarizer returned no text".to_string()));
        }
        info!(
            video_id = %video_id,
            model = self.summarizer.model_name(),
            paragraph_count = paragraphs.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Video summarized"
        );

        let input = AssemblyInput::new(title, source.url.clone(), paragraphs);
        assemble(&input, ctx.max_chunk_length, &self.template)
    }
}

/// Formats a social post fetched through oEmbed.
pub struct SocialHandler {
    extractor: Arc<SocialPostExtractor>,
    template: CommentTemplate,
}

impl SocialHandler {
    pub fn new(extractor: Arc<SocialPostExtractor>) -> Self {
        Self {
            extractor,
            template: CommentTemplate::social_post(),
        }
    }
}

#[async_trait]
impl JobHandler for SocialHandler {
    fn job_kind(&self) -> JobKind {
        JobKind::FormatSocialPost
    }

    async fn prepare(&self, ctx: &JobContext) -> Result<Vec<MessageChunk>> {
        let result = self.extractor.extract(ctx.source()).await?;
        assemble_result(&result, ctx.max_chunk_length, &self.template)
    }
}
