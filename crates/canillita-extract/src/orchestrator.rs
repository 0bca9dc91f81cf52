//! Extraction orchestrator: the fixed-order fallback chain for one source.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, instrument, warn};

use canillita_core::{ErrorKind, ExtractionResult, SourceRef, Strategy, StrategyAttempt};

use crate::fetch::{Document, Fetcher};
use crate::providers::{Provider, ProviderStore};
use crate::strategy::{default_chain, ExtractionStrategy};

/// Runs strategies in order and stops at the first success.
pub struct Orchestrator {
    fetcher: Arc<dyn Fetcher>,
    providers: Arc<ProviderStore>,
    strategies: Vec<Arc<dyn ExtractionStrategy>>,
}

impl Orchestrator {
    pub fn new(fetcher: Arc<dyn Fetcher>, providers: Arc<ProviderStore>) -> Self {
        Self {
            fetcher,
            providers,
            strategies: default_chain(),
        }
    }

    /// Replace the strategy chain.
    pub fn with_strategies(mut self, strategies: Vec<Arc<dyn ExtractionStrategy>>) -> Self {
        self.strategies = strategies;
        self
    }

    /// Fetch the source and run the chain.
    ///
    /// A failed fetch fails the structured tier; the remaining tiers still
    /// run when the fetcher holds a cached copy of the document. With no
    /// document at all the fetch error is surfaced and stays retryable.
    #[instrument(
        skip(self, source),
        fields(subsystem = "extract", external_id = %source.external_id, url = %source.url)
    )]
    pub async fn extract(&self, source: &SourceRef) -> ExtractionResult {
        let registry = self.providers.snapshot();
        let provider = registry.resolve(&source.url);

        match self.fetcher.fetch(&source.url).await {
            Ok(document) => self.run_chain(source, &document, provider, Vec::new(), 0),
            Err(e) => {
                let first = self
                    .strategies
                    .first()
                    .map(|s| s.strategy())
                    .unwrap_or(Strategy::Structured);
                let attempt = StrategyAttempt {
                    strategy: first,
                    kind: e.kind(),
                    message: e.to_string(),
                };
                match self.fetcher.cached(&source.url) {
                    Some(document) => {
                        warn!(
                            provider = %provider.name(),
                            error = %e,
                            "Fetch failed, continuing with cached document"
                        );
                        self.run_chain(source, &document, provider, vec![attempt], 1)
                    }
                    None => {
                        warn!(
                            provider = %provider.name(),
                            error_kind = %e.kind(),
                            error = %e,
                            "Fetch failed, no document to extract from"
                        );
                        ExtractionResult::failure(source.clone(), provider.name(), vec![attempt])
                    }
                }
            }
        }
    }

    fn run_chain(
        &self,
        source: &SourceRef,
        document: &Document,
        provider: &Provider,
        mut attempts: Vec<StrategyAttempt>,
        skip: usize,
    ) -> ExtractionResult {
        for strategy in self.strategies.iter().skip(skip) {
            let start = Instant::now();
            let kind = strategy.strategy();
            match strategy.extract(document, provider) {
                Ok(extracted) => {
                    let title = extracted
                        .title
                        .filter(|t| !t.trim().is_empty())
                        .or_else(|| source.domain())
                        .unwrap_or_else(|| source.url.clone());
                    let mut paragraphs = extracted.paragraphs;
                    // The title line is rendered by the assembler.
                    if paragraphs
                        .first()
                        .map_or(false, |p| p.trim_start_matches('#').trim() == title)
                    {
                        paragraphs.remove(0);
                    }
                    info!(
                        strategy = %kind,
                        provider = %provider.name(),
                        quality_score = extracted.quality_score,
                        paragraph_count = paragraphs.len(),
                        duration_ms = start.elapsed().as_millis() as u64,
                        "Extraction succeeded"
                    );
                    return ExtractionResult::success(
                        source.clone(),
                        provider.name(),
                        title,
                        paragraphs,
                        kind,
                        extracted.quality_score,
                    )
                    .with_attempts(attempts);
                }
                Err(e) => {
                    debug!(
                        strategy = %kind,
                        provider = %provider.name(),
                        error_kind = %e.kind(),
                        error = %e,
                        "Strategy failed, trying next"
                    );
                    attempts.push(StrategyAttempt {
                        strategy: kind,
                        kind: e.kind(),
                        message: e.to_string(),
                    });
                }
            }
        }

        let result = ExtractionResult::failure(source.clone(), provider.name(), attempts);
        warn!(
            provider = %provider.name(),
            error_kind = %result.failure_reason.unwrap_or(ErrorKind::Permanent),
            "All extraction strategies failed"
        );
        result
    }
}
