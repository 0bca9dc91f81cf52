//! Content normalizer: provider selectors to canonical paragraphs.
//!
//! Pure function of the raw document and the provider rule. The first
//! content selector with non-empty matches wins; remove selectors prune
//! subtrees; the result must clear the quality gate or `LowQuality` is
//! returned instead.

use std::collections::HashSet;

use scraper::{ElementRef, Html};
use tracing::trace;

use canillita_core::{Error, Result};

use crate::fetch::Document;
use crate::providers::Provider;
use crate::text::{
    char_len, collapse_whitespace, collect_blocks, element_text, find_title, finish_paragraphs,
    quality_score,
};

/// Canonical prose extracted from a document.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedContent {
    pub title: Option<String>,
    pub paragraphs: Vec<String>,
    /// Body length in characters.
    pub text_length: usize,
    /// Extracted text bytes over raw document bytes.
    pub markup_ratio: f64,
    /// Index of the content selector that matched.
    pub selector_index: usize,
}

impl NormalizedContent {
    pub fn text(&self) -> String {
        self.paragraphs.join("\n\n")
    }
}

pub fn normalize(document: &Document, provider: &Provider) -> Result<NormalizedContent> {
    normalize_html(&document.html, provider)
}

pub fn normalize_html(raw: &str, provider: &Provider) -> Result<NormalizedContent> {
    let html = Html::parse_document(raw);

    let removed: HashSet<_> = provider
        .remove_selectors()
        .iter()
        .flat_map(|sel| html.select(sel).map(|el| el.id()))
        .collect();
    let is_removed = |el: &ElementRef<'_>| removed.contains(&el.id());
    let inside_removed = |el: &ElementRef<'_>| {
        is_removed(el) || el.ancestors().any(|node| removed.contains(&node.id()))
    };

    // First selector whose matches carry any text wins.
    let mut chosen = None;
    for (index, selector) in provider.content_selectors().iter().enumerate() {
        let matches: Vec<ElementRef<'_>> = html
            .select(selector)
            .filter(|el| !inside_removed(el))
            .filter(|el| !collapse_whitespace(&element_text(*el, &is_removed)).is_empty())
            .collect();
        if !matches.is_empty() {
            chosen = Some((index, matches));
            break;
        }
    }
    let Some((selector_index, roots)) = chosen else {
        return Err(Error::Unparseable(format!(
            "no content selector of provider '{}' matched",
            provider.name()
        )));
    };

    // Nested matches would duplicate text.
    let root_ids: HashSet<_> = roots.iter().map(|el| el.id()).collect();
    let mut blocks = Vec::new();
    for root in roots
        .iter()
        .filter(|el| !el.ancestors().any(|node| root_ids.contains(&node.id())))
    {
        let before = blocks.len();
        collect_blocks(*root, &is_removed, &mut blocks);
        if blocks.len() == before {
            let text = collapse_whitespace(&element_text(*root, &is_removed));
            if !text.is_empty() {
                blocks.push(text);
            }
        }
    }

    let paragraphs = finish_paragraphs(blocks, provider);
    let text = paragraphs.join("\n\n");
    let text_length = char_len(&text);
    let markup_ratio = if raw.is_empty() {
        0.0
    } else {
        text.len() as f64 / raw.len() as f64
    };

    trace!(
        subsystem = "extract",
        component = "normalizer",
        provider = %provider.name(),
        selector_index,
        paragraph_count = paragraphs.len(),
        text_length,
        markup_ratio,
        "Normalized content"
    );

    let rule = provider.rule();
    if markup_ratio < rule.min_text_to_markup_ratio {
        return Err(Error::LowQuality(format!(
            "text-to-markup ratio {:.4} below {}",
            markup_ratio, rule.min_text_to_markup_ratio
        )));
    }
    if text_length < rule.min_text_length {
        return Err(Error::LowQuality(format!(
            "extracted text has {} characters, minimum is {}",
            text_length, rule.min_text_length
        )));
    }
    if let Some(pattern) = provider.rejected_by(&text) {
        return Err(Error::LowQuality(format!(
            "content matches reject pattern '{}'",
            pattern
        )));
    }

    Ok(NormalizedContent {
        title: find_title(&html, provider),
        paragraphs,
        text_length,
        markup_ratio,
        selector_index,
    })
}

impl NormalizedContent {
    /// Quality score against the thresholds of the rule that produced it.
    pub fn quality_score(&self, provider: &Provider) -> f32 {
        let rule = provider.rule();
        quality_score(
            self.text_length,
            self.markup_ratio,
            rule.min_text_length,
            rule.min_text_to_markup_ratio,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canillita_core::{ErrorKind, ProviderRule};

    const ARTICLE: &str = r#"<html><head><title>Nuevo récord de exportaciones | Diario</title></head>
<body>
<nav><a href="/">Inicio</a><a href="/politica">Política</a></nav>
<div class="nota">
  <h1>Nuevo récord de exportaciones agrícolas</h1>
  <p>Las exportaciones agrícolas alcanzaron en septiembre el valor más alto de la última década, impulsadas por la cosecha de soja y maíz.</p>
  <div class="related"><p>Te puede interesar: otra nota que no forma parte del cuerpo principal.</p></div>
  <h2>Impacto en las reservas</h2>
  <p>El Banco Central informó que las compras de divisas superaron los mil millones de dólares durante las últimas tres semanas del mes.</p>
  <ul><li>Soja: 40% del total</li><li>Maíz: 25% del total</li></ul>
  <p>Compartir</p>
</div>
</body></html>"#;

    fn provider(min_ratio: f64, min_len: usize) -> Provider {
        let rule = ProviderRule::new("diario.example", vec![".inexistente".into(), ".nota".into()])
            .with_remove_selectors(vec![".related".into()])
            .with_min_ratio(min_ratio)
            .with_min_text_length(min_len);
        Provider::compile(rule, false).unwrap()
    }

    #[test]
    fn test_normalize_structure() {
        let content = normalize_html(ARTICLE, &provider(0.01, 100)).unwrap();
        assert_eq!(content.selector_index, 1);
        assert_eq!(
            content.paragraphs[0],
            "# Nuevo récord de exportaciones agrícolas"
        );
        assert!(content.paragraphs.contains(&"## Impacto en las reservas".to_string()));
        assert!(content
            .paragraphs
            .contains(&"• Soja: 40% del total\n• Maíz: 25% del total".to_string()));
        assert!(!content.text().contains("Te puede interesar"));
        assert!(!content.text().contains("Compartir"));
        assert!(!content.text().contains("Inicio"));
        assert_eq!(
            content.title.as_deref(),
            Some("Nuevo récord de exportaciones agrícolas")
        );
    }

    #[test]
    fn test_low_ratio_is_low_quality() {
        let err = normalize_html(ARTICLE, &provider(0.9, 10)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LowQuality);
    }

    #[test]
    fn test_short_text_is_low_quality() {
        let err = normalize_html(ARTICLE, &provider(0.01, 5_000)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LowQuality);
    }

    #[test]
    fn test_no_selector_match_is_unparseable() {
        let rule = ProviderRule::new("diario.example", vec!["#cuerpo".into()]);
        let provider = Provider::compile(rule, false).unwrap();
        let err = normalize_html(ARTICLE, &provider).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unparseable);
    }

    #[test]
    fn test_reject_pattern_is_low_quality() {
        let mut rule = ProviderRule::new("diario.example", vec![".nota".into()])
            .with_min_ratio(0.01)
            .with_min_text_length(10);
        rule.reject_patterns = vec!["banco central".into()];
        let provider = Provider::compile(rule, false).unwrap();
        let err = normalize_html(ARTICLE, &provider).unwrap_err();
        assert!(err.to_string().contains("reject pattern"));
    }

    #[test]
    fn test_normalize_is_deterministic() {
        let p = provider(0.01, 100);
        assert_eq!(
            normalize_html(ARTICLE, &p).unwrap(),
            normalize_html(ARTICLE, &p).unwrap()
        );
    }
}
