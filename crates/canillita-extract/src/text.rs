//! Markup-to-prose helpers shared by the structured normalizer and the
//! fallback parser.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use canillita_core::defaults;

use crate::providers::Provider;

/// Fragments that carry no article content on their own.
static BOILERPLATE: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)^\s*compartir\s*$",
        r"(?i)^\s*seguir\s*$",
        r"(?i)^\s*(share|follow)( (this|us))?\s*$",
        r"(?i)^\s*tags?[:.]",
        r"(?i)^\s*autor[:.]",
        r"(?i)^\s*fecha[:.]",
        r"(?i)^\s*fuente[:.]",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

static SELECTOR_H1: Lazy<Option<Selector>> = Lazy::new(|| Selector::parse("h1").ok());
static SELECTOR_OG_TITLE: Lazy<Option<Selector>> =
    Lazy::new(|| Selector::parse(r#"meta[property="og:title"]"#).ok());
static SELECTOR_TITLE: Lazy<Option<Selector>> = Lazy::new(|| Selector::parse("title").ok());
static SELECTOR_DESCRIPTION: Lazy<Option<Selector>> = Lazy::new(|| {
    Selector::parse(r#"meta[name="description"], meta[property="og:description"]"#).ok()
});

pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Long enough and not a share/follow/byline fragment.
pub fn is_meaningful(text: &str) -> bool {
    char_len(text.trim()) >= defaults::MIN_FRAGMENT_LENGTH
        && !BOILERPLATE.iter().any(|p| p.is_match(text))
}

/// Concatenated text below `el`, skipping pruned subtrees.
pub fn element_text<F>(el: ElementRef<'_>, skip: &F) -> String
where
    F: Fn(&ElementRef<'_>) -> bool,
{
    let mut buf = String::new();
    push_text(el, skip, &mut buf);
    buf
}

fn push_text<F>(el: ElementRef<'_>, skip: &F, buf: &mut String)
where
    F: Fn(&ElementRef<'_>) -> bool,
{
    for child in el.children() {
        if let Some(text) = child.value().as_text() {
            buf.push_str(text);
        } else if let Some(child_el) = ElementRef::wrap(child) {
            if skip(&child_el) {
                continue;
            }
            match child_el.value().name() {
                "script" | "style" | "noscript" | "template" => {}
                "br" => buf.push('\n'),
                _ => {
                    push_text(child_el, skip, buf);
                    if is_block(child_el.value().name()) {
                        buf.push(' ');
                    }
                }
            }
        }
    }
}

fn is_block(name: &str) -> bool {
    matches!(
        name,
        "p" | "div" | "li" | "section" | "article" | "header" | "footer" | "blockquote"
            | "h1" | "h2" | "h3" | "h4" | "h5" | "h6" | "ul" | "ol" | "table" | "tr" | "td"
    )
}

/// Collapse the structure below `root` into canonical paragraphs.
///
/// Headings get markdown prefixes (`#`, `##`, `###`, bold for h4-h6), lists
/// become one paragraph of `• ` or `N. ` lines, blockquotes get `> `.
pub fn collect_blocks<F>(root: ElementRef<'_>, skip: &F, out: &mut Vec<String>)
where
    F: Fn(&ElementRef<'_>) -> bool,
{
    for child in root.children() {
        if let Some(text) = child.value().as_text() {
            // Loose text directly inside a container counts only when substantial.
            let text = collapse_whitespace(text);
            if char_len(&text) >= defaults::FALLBACK_MIN_PARAGRAPH_LENGTH {
                out.push(text);
            }
            continue;
        }
        let Some(el) = ElementRef::wrap(child) else {
            continue;
        };
        if skip(&el) {
            continue;
        }
        let name = el.value().name();
        let text = || collapse_whitespace(&element_text(el, skip));
        match name {
            "script" | "style" | "noscript" | "template" | "svg" => {}
            "h1" => push_prefixed(out, "# ", text()),
            "h2" => push_prefixed(out, "## ", text()),
            "h3" => push_prefixed(out, "### ", text()),
            "h4" | "h5" | "h6" => {
                let t = text();
                if !t.is_empty() {
                    out.push(format!("**{}**", t));
                }
            }
            "p" => {
                let t = text();
                if !t.is_empty() {
                    out.push(t);
                }
            }
            "ul" | "ol" => {
                let ordered = name == "ol";
                let mut lines = Vec::new();
                for item in el.children().filter_map(ElementRef::wrap) {
                    if item.value().name() != "li" || skip(&item) {
                        continue;
                    }
                    let t = collapse_whitespace(&element_text(item, skip));
                    if t.is_empty() {
                        continue;
                    }
                    if ordered {
                        lines.push(format!("{}. {}", lines.len() + 1, t));
                    } else {
                        lines.push(format!("• {}", t));
                    }
                }
                if !lines.is_empty() {
                    out.push(lines.join("\n"));
                }
            }
            "blockquote" => push_prefixed(out, "> ", text()),
            "pre" => {
                let raw = element_text(el, skip);
                let kept = raw
                    .lines()
                    .map(str::trim_end)
                    .filter(|l| !l.trim().is_empty())
                    .collect::<Vec<_>>()
                    .join("\n");
                if !kept.is_empty() {
                    out.push(kept);
                }
            }
            _ => collect_blocks(el, skip, out),
        }
    }
}

fn push_prefixed(out: &mut Vec<String>, prefix: &str, text: String) {
    if !text.is_empty() {
        out.push(format!("{}{}", prefix, text));
    }
}

/// Apply provider cleanup, drop boilerplate and repeated blocks, and cap the
/// body at the provider's `max_length` characters.
pub fn finish_paragraphs(blocks: Vec<String>, provider: &Provider) -> Vec<String> {
    let max_length = provider.rule().max_length;
    let mut out: Vec<String> = Vec::new();
    let mut total = 0usize;

    for block in blocks {
        let cleaned = provider.clean_paragraph(&block);
        if !is_meaningful(&cleaned) || out.last() == Some(&cleaned) {
            continue;
        }
        let len = char_len(&cleaned);
        let sep = if out.is_empty() { 0 } else { 2 };
        if total + sep + len <= max_length {
            total += sep + len;
            out.push(cleaned);
            continue;
        }
        let remaining = max_length.saturating_sub(total + sep);
        if let Some(cut) = truncate_at_sentence(&cleaned, remaining) {
            out.push(cut);
        }
        break;
    }
    out
}

/// Cut `text` to at most `limit` characters, preferring a sentence end that
/// keeps at least 80% of the allowance.
fn truncate_at_sentence(text: &str, limit: usize) -> Option<String> {
    let byte_end = text
        .char_indices()
        .nth(limit)
        .map(|(i, _)| i)
        .unwrap_or(text.len());
    let window = &text[..byte_end];
    let cut = match window.rfind(". ") {
        Some(dot) if char_len(&window[..dot]) * 5 >= limit * 4 => &window[..=dot],
        _ => window,
    };
    let cut = cut.trim();
    is_meaningful(cut).then(|| cut.to_string())
}

/// Page title: provider selector, then `h1`, `og:title`, `<title>`.
///
/// Each candidate is cleaned with the provider's title patterns; candidates
/// shorter than the minimum title length are skipped.
pub fn find_title(html: &Html, provider: &Provider) -> Option<String> {
    let accept = |raw: String| {
        let title = provider.clean_title(&raw);
        (char_len(&title) >= defaults::MIN_TITLE_LENGTH).then_some(title)
    };

    if let Some(sel) = provider.title_selector() {
        if let Some(t) = html
            .select(sel)
            .map(|el| el.text().collect::<String>())
            .find_map(accept)
        {
            return Some(t);
        }
    }
    if let Some(sel) = SELECTOR_H1.as_ref() {
        if let Some(t) = html
            .select(sel)
            .map(|el| el.text().collect::<String>())
            .find_map(accept)
        {
            return Some(t);
        }
    }
    if let Some(sel) = SELECTOR_OG_TITLE.as_ref() {
        if let Some(t) = html
            .select(sel)
            .filter_map(|el| el.value().attr("content").map(str::to_string))
            .find_map(accept)
        {
            return Some(t);
        }
    }
    SELECTOR_TITLE.as_ref().and_then(|sel| {
        html.select(sel)
            .map(|el| el.text().collect::<String>())
            .find_map(accept)
    })
}

/// `meta name="description"` or `og:description` content.
pub fn meta_description(html: &Html) -> Option<String> {
    let sel = SELECTOR_DESCRIPTION.as_ref()?;
    html.select(sel)
        .filter_map(|el| el.value().attr("content"))
        .map(collapse_whitespace)
        .find(|d| !d.is_empty())
}

/// Score in [0, 1] from body length and text-to-markup ratio relative to the
/// thresholds they had to clear.
pub fn quality_score(text_length: usize, ratio: f64, min_length: usize, min_ratio: f64) -> f32 {
    let length_factor = (text_length as f64 / (min_length.max(1) as f64 * 4.0)).min(1.0);
    let ratio_factor = (ratio / (min_ratio.max(f64::EPSILON) * 5.0)).min(1.0);
    (0.6 * length_factor + 0.4 * ratio_factor).clamp(0.0, 1.0) as f32
}
