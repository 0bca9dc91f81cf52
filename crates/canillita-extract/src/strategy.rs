//! Extraction strategies behind one capability interface.
//!
//! The orchestrator iterates an ordered list of these; each either produces
//! an [`Extracted`] body or says why it could not.

use std::sync::Arc;

use scraper::Html;

use canillita_core::{defaults, Error, Result, Strategy};

use crate::fetch::Document;
use crate::normalize::normalize;
use crate::providers::Provider;
use crate::readability::extract_readable;
use crate::text::{find_title, meta_description};

/// Body produced by one strategy.
#[derive(Debug, Clone, PartialEq)]
pub struct Extracted {
    pub title: Option<String>,
    pub paragraphs: Vec<String>,
    pub quality_score: f32,
}

/// One tier of the fallback chain.
pub trait ExtractionStrategy: Send + Sync {
    fn strategy(&self) -> Strategy;

    fn extract(&self, document: &Document, provider: &Provider) -> Result<Extracted>;
}

/// Provider selectors and the normalizer's quality gate.
pub struct StructuredStrategy;

impl ExtractionStrategy for StructuredStrategy {
    fn strategy(&self) -> Strategy {
        Strategy::Structured
    }

    fn extract(&self, document: &Document, provider: &Provider) -> Result<Extracted> {
        let content = normalize(document, provider)?;
        Ok(Extracted {
            quality_score: content.quality_score(provider),
            title: content.title,
            paragraphs: content.paragraphs,
        })
    }
}

/// Text-density readability parser.
pub struct FallbackParserStrategy;

impl ExtractionStrategy for FallbackParserStrategy {
    fn strategy(&self) -> Strategy {
        Strategy::FallbackParser
    }

    fn extract(&self, document: &Document, provider: &Provider) -> Result<Extracted> {
        let content = extract_readable(&document.html, provider)?;
        Ok(Extracted {
            quality_score: content.quality_score(provider),
            title: content.title,
            paragraphs: content.paragraphs,
        })
    }
}

/// Title plus meta description; always cheap, never complete.
pub struct ManualStrategy;

impl ExtractionStrategy for ManualStrategy {
    fn strategy(&self) -> Strategy {
        Strategy::Manual
    }

    fn extract(&self, document: &Document, provider: &Provider) -> Result<Extracted> {
        let html = Html::parse_document(&document.html);
        let title = find_title(&html, provider)
            .ok_or_else(|| Error::Unparseable("page has no usable title".to_string()))?;
        let paragraphs = meta_description(&html)
            .map(|d| provider.clean_paragraph(&d))
            .filter(|d| !d.is_empty())
            .into_iter()
            .collect();
        Ok(Extracted {
            title: Some(title),
            paragraphs,
            quality_score: defaults::MANUAL_QUALITY_SCORE,
        })
    }
}

/// Structured, then FallbackParser, then Manual.
pub fn default_chain() -> Vec<Arc<dyn ExtractionStrategy>> {
    vec![
        Arc::new(StructuredStrategy),
        Arc::new(FallbackParserStrategy),
        Arc::new(ManualStrategy),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use canillita_core::{ErrorKind, ProviderRule};

    fn provider() -> Provider {
        Provider::compile(ProviderRule::default_rule(), true).unwrap()
    }

    #[test]
    fn test_default_chain_order() {
        let order: Vec<_> = default_chain().iter().map(|s| s.strategy()).collect();
        assert_eq!(
            order,
            vec![Strategy::Structured, Strategy::FallbackParser, Strategy::Manual]
        );
    }

    #[test]
    fn test_manual_uses_title_and_description() {
        let doc = Document::new(
            "https://example.com/x",
            r#"<html><head><title>Una noticia importante</title>
               <meta name="description" content="Resumen de la noticia."></head><body></body></html>"#,
        );
        let out = ManualStrategy.extract(&doc, &provider()).unwrap();
        assert_eq!(out.title.as_deref(), Some("Una noticia importante"));
        assert_eq!(out.paragraphs, vec!["Resumen de la noticia."]);
        assert_eq!(out.quality_score, defaults::MANUAL_QUALITY_SCORE);
    }

    #[test]
    fn test_manual_without_title_fails() {
        let doc = Document::new("https://example.com/x", "<html><body><p>x</p></body></html>");
        let err = ManualStrategy.extract(&doc, &provider()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unparseable);
    }
}
