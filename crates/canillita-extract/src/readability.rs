//! Readability-style fallback parser.
//!
//! Not selector driven: paragraphs vote for their parent (full score) and
//! grandparent (half score), scores are damped by link density, and the best
//! container's blocks become the body. When no container qualifies every
//! paragraph longer than the fallback minimum is used.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use tracing::trace;

use canillita_core::{defaults, Error, Result};

use crate::providers::Provider;
use crate::text::{
    char_len, collapse_whitespace, collect_blocks, element_text, find_title, finish_paragraphs,
    quality_score,
};

static NOISE: Lazy<Option<Selector>> = Lazy::new(|| {
    Selector::parse("script, style, nav, header, footer, aside, form, noscript, iframe").ok()
});
static PARAGRAPH: Lazy<Option<Selector>> = Lazy::new(|| Selector::parse("p").ok());
static LINK: Lazy<Option<Selector>> = Lazy::new(|| Selector::parse("a").ok());

/// Paragraphs shorter than this do not vote.
const MIN_VOTING_PARAGRAPH: usize = 25;

/// Containers scoring below this do not qualify.
const MIN_CONTAINER_SCORE: f64 = 5.0;

/// Output of the fallback parser.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadableContent {
    pub title: Option<String>,
    pub paragraphs: Vec<String>,
    pub text_length: usize,
    pub markup_ratio: f64,
    /// False when no container qualified and loose paragraphs were used.
    pub from_container: bool,
}

impl ReadableContent {
    pub fn quality_score(&self, provider: &Provider) -> f32 {
        let rule = provider.rule();
        quality_score(
            self.text_length,
            self.markup_ratio,
            rule.min_text_length,
            rule.min_text_to_markup_ratio,
        ) * defaults::FALLBACK_QUALITY_SCALE
    }
}

fn paragraph_score(text: &str) -> f64 {
    let commas = text.matches(',').count() as f64;
    let length_bonus = (char_len(text) as f64 / 100.0).floor().min(3.0);
    1.0 + commas + length_bonus
}

/// Add `score` to the container's running total.
fn vote<'a>(candidates: &mut Vec<(ElementRef<'a>, f64)>, el: ElementRef<'a>, score: f64) {
    match candidates.iter_mut().find(|(c, _)| c.id() == el.id()) {
        Some((_, total)) => *total += score,
        None => candidates.push((el, score)),
    }
}

fn link_density<F>(el: ElementRef<'_>, skip: &F) -> f64
where
    F: Fn(&ElementRef<'_>) -> bool,
{
    let total = char_len(&collapse_whitespace(&element_text(el, skip)));
    if total == 0 {
        return 1.0;
    }
    let Some(link) = LINK.as_ref() else {
        return 0.0;
    };
    let linked: usize = el
        .select(link)
        .map(|a| char_len(&collapse_whitespace(&a.text().collect::<String>())))
        .sum();
    (linked as f64 / total as f64).min(1.0)
}

pub fn extract_readable(raw: &str, provider: &Provider) -> Result<ReadableContent> {
    let html = Html::parse_document(raw);

    let noise: HashSet<_> = NOISE
        .as_ref()
        .map(|sel| html.select(sel).map(|el| el.id()).collect())
        .unwrap_or_default();
    let is_noise = |el: &ElementRef<'_>| noise.contains(&el.id());
    let in_noise = |el: &ElementRef<'_>| {
        is_noise(el) || el.ancestors().any(|node| noise.contains(&node.id()))
    };

    let paragraphs: Vec<ElementRef<'_>> = PARAGRAPH
        .as_ref()
        .map(|sel| html.select(sel).filter(|p| !in_noise(p)).collect())
        .unwrap_or_default();

    // Candidates in document order of first vote, for deterministic ties.
    let mut candidates: Vec<(ElementRef<'_>, f64)> = Vec::new();

    for p in &paragraphs {
        let text = collapse_whitespace(&element_text(*p, &is_noise));
        if char_len(&text) < MIN_VOTING_PARAGRAPH {
            continue;
        }
        let score = paragraph_score(&text);
        let Some(parent) = p.parent().and_then(ElementRef::wrap) else {
            continue;
        };
        vote(&mut candidates, parent, score);
        if let Some(grandparent) = parent.parent().and_then(ElementRef::wrap) {
            vote(&mut candidates, grandparent, score / 2.0);
        }
    }

    let mut best: Option<(ElementRef<'_>, f64)> = None;
    for (el, score) in &candidates {
        let adjusted = score * (1.0 - link_density(*el, &is_noise));
        if adjusted >= MIN_CONTAINER_SCORE && best.map_or(true, |(_, b)| adjusted > b) {
            best = Some((*el, adjusted));
        }
    }

    let (blocks, from_container) = match best {
        Some((container, score)) => {
            trace!(
                subsystem = "extract",
                component = "readability",
                container = container.value().name(),
                score,
                "Selected content container"
            );
            let mut blocks = Vec::new();
            collect_blocks(container, &is_noise, &mut blocks);
            (blocks, true)
        }
        None => {
            let loose = paragraphs
                .iter()
                .map(|p| collapse_whitespace(&element_text(*p, &is_noise)))
                .filter(|t| char_len(t) > defaults::FALLBACK_MIN_PARAGRAPH_LENGTH)
                .collect::<Vec<_>>();
            (loose, false)
        }
    };

    let paragraphs = finish_paragraphs(blocks, provider);
    if paragraphs.is_empty() {
        return Err(Error::Unparseable(
            "no readable paragraphs found".to_string(),
        ));
    }

    let text = paragraphs.join("\n\n");
    let text_length = char_len(&text);
    let markup_ratio = if raw.is_empty() {
        0.0
    } else {
        text.len() as f64 / raw.len() as f64
    };

    let rule = provider.rule();
    if text_length < rule.min_text_length {
        return Err(Error::LowQuality(format!(
            "readable text has {} characters, minimum is {}",
            text_length, rule.min_text_length
        )));
    }
    if let Some(pattern) = provider.rejected_by(&text) {
        return Err(Error::LowQuality(format!(
            "content matches reject pattern '{}'",
            pattern
        )));
    }

    Ok(ReadableContent {
        title: find_title(&html, provider),
        paragraphs,
        text_length,
        markup_ratio,
        from_container,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use canillita_core::{ErrorKind, ProviderRule};

    fn provider(min_len: usize) -> Provider {
        Provider::compile(
            ProviderRule::default_rule().with_min_text_length(min_len),
            true,
        )
        .unwrap()
    }

    const BLOG: &str = r#"<html><head><title>Crónica de la feria del libro</title></head><body>
<header><a href="/">Portada</a></header>
<div id="layout">
  <div id="menu"><p><a href="/a">Sección uno del sitio</a>, <a href="/b">sección dos del sitio</a></p></div>
  <div id="cuerpo">
    <p>La feria del libro cerró su edición con más de un millón de visitantes, según informaron los organizadores, que destacaron la presencia de autores jóvenes.</p>
    <p>Entre las actividades más concurridas estuvieron los talleres de escritura, las charlas con editoriales independientes y las presentaciones de novelas gráficas.</p>
    <p>Para el año próximo, la organización planea sumar un pabellón dedicado a la literatura infantil, con espacios de lectura y narración oral.</p>
  </div>
</div>
<footer><p>Todos los derechos reservados por la editorial que publica este sitio de noticias.</p></footer>
</body></html>"#;

    #[test]
    fn test_picks_dense_container() {
        let content = extract_readable(BLOG, &provider(100)).unwrap();
        assert!(content.from_container);
        assert_eq!(content.paragraphs.len(), 3);
        assert!(content.paragraphs[0].starts_with("La feria del libro"));
        assert!(!content.paragraphs.iter().any(|p| p.contains("derechos reservados")));
        assert!(!content.paragraphs.iter().any(|p| p.contains("Sección uno")));
        assert_eq!(content.title.as_deref(), Some("Crónica de la feria del libro"));
    }

    #[test]
    fn test_loose_paragraphs_when_no_container_qualifies() {
        let html = "<html><body>\
            <div><p>Un párrafo suelto que supera los cincuenta caracteres de largo.</p></div>\
            <section><p>Otro párrafo suelto, también bastante largo para ser tenido en cuenta.</p></section>\
            </body></html>";
        let content = extract_readable(html, &provider(50)).unwrap();
        assert!(!content.from_container);
        assert_eq!(content.paragraphs.len(), 2);
    }

    #[test]
    fn test_short_text_is_low_quality() {
        let err = extract_readable(BLOG, &provider(10_000)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LowQuality);
    }

    #[test]
    fn test_empty_document_is_unparseable() {
        let err = extract_readable("<html><body><nav>menú</nav></body></html>", &provider(10))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unparseable);
    }

    #[test]
    fn test_score_is_scaled() {
        let content = extract_readable(BLOG, &provider(100)).unwrap();
        assert!(content.quality_score(&provider(100)) <= defaults::FALLBACK_QUALITY_SCALE);
    }
}
