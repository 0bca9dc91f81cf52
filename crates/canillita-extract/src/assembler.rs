//! Comment assembler.
//!
//! Builds the canonical message (title line, optional body heading,
//! paragraphs, footer block with attribution and disclaimer) and splits it
//! into a linear reply chain of bounded-length chunks. Lengths are counted in
//! characters. Output is a pure function of the input, so a retried job
//! produces byte-identical chunks.

use serde::{Deserialize, Serialize};

use canillita_core::{defaults, Error, ExtractionResult, MessageChunk, Result};

const SEPARATOR: &str = defaults::PARAGRAPH_SEPARATOR;

/// Presentation of a message: title line, heading, footer and marker.
///
/// `{title}`, `{url}` and `{domain}` are substituted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentTemplate {
    pub title_line: String,
    pub body_heading: Option<String>,
    pub footer_lines: Vec<String>,
    pub continued_marker: String,
}

impl CommentTemplate {
    pub fn article() -> Self {
        Self {
            title_line: "# {title}".to_string(),
            body_heading: None,
            footer_lines: vec![
                "---".to_string(),
                "*[Link a la noticia]({url})* ({domain})".to_string(),
                defaults::FOOTER_DISCLAIMER.to_string(),
            ],
            continued_marker: defaults::CONTINUED_MARKER.to_string(),
        }
    }

    pub fn video_summary() -> Self {
        Self {
            title_line: "# 🎥 {title}".to_string(),
            body_heading: Some("**Resumen del video:**".to_string()),
            footer_lines: vec![
                "---".to_string(),
                "*[Ver video original]({url})*".to_string(),
                defaults::FOOTER_DISCLAIMER.to_string(),
            ],
            continued_marker: defaults::CONTINUED_MARKER.to_string(),
        }
    }

    pub fn social_post() -> Self {
        Self {
            title_line: "# 🐦 {title}".to_string(),
            body_heading: None,
            footer_lines: vec![
                "---".to_string(),
                "*[Ver publicación original]({url})* ({domain})".to_string(),
                defaults::FOOTER_DISCLAIMER.to_string(),
            ],
            continued_marker: defaults::CONTINUED_MARKER.to_string(),
        }
    }

    fn render(&self, pattern: &str, input: &AssemblyInput) -> String {
        pattern
            .replace("{title}", input.title.trim())
            .replace("{url}", &input.url)
            .replace("{domain}", &input.domain)
    }

    fn footer(&self, input: &AssemblyInput) -> String {
        self.footer_lines
            .iter()
            .map(|line| self.render(line, input))
            .collect::<Vec<_>>()
            .join(SEPARATOR)
    }

    /// Title line, heading and paragraphs, in order.
    fn content_units(&self, input: &AssemblyInput) -> Vec<String> {
        let mut units = Vec::with_capacity(input.paragraphs.len() + 2);
        units.push(self.render(&self.title_line, input));
        if let Some(heading) = &self.body_heading {
            units.push(heading.clone());
        }
        units.extend(
            input
                .paragraphs
                .iter()
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty()),
        );
        units
    }
}

impl Default for CommentTemplate {
    fn default() -> Self {
        Self::article()
    }
}

/// What gets assembled: a title, a link and body paragraphs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblyInput {
    pub title: String,
    pub url: String,
    pub domain: String,
    pub paragraphs: Vec<String>,
}

impl AssemblyInput {
    pub fn new(title: impl Into<String>, url: impl Into<String>, paragraphs: Vec<String>) -> Self {
        let url = url.into();
        let domain = canillita_core::domain_of(&url).unwrap_or_default();
        Self {
            title: title.into(),
            url,
            domain,
            paragraphs,
        }
    }

    pub fn from_result(result: &ExtractionResult) -> Self {
        Self::new(
            result.title.clone(),
            result.source.url.clone(),
            result.body_paragraphs.clone(),
        )
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// The full unchunked message.
pub fn canonical_message(input: &AssemblyInput, template: &CommentTemplate) -> String {
    let mut units = template.content_units(input);
    units.push(template.footer(input));
    units.join(SEPARATOR)
}

/// Split `text` into pieces of at most `limit` characters, cutting at the
/// last sentence end in range, or hard at `limit` when there is none.
pub fn split_oversized(text: &str, limit: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut rest = text.trim();
    while char_len(rest) > limit {
        let window_end = rest
            .char_indices()
            .nth(limit)
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        let window = &rest[..window_end];
        let boundary = window
            .char_indices()
            .filter(|(i, c)| {
                matches!(c, '.' | '!' | '?' | '…')
                    && rest[i + c.len_utf8()..]
                        .chars()
                        .next()
                        .map_or(false, char::is_whitespace)
            })
            .map(|(i, c)| i + c.len_utf8())
            .last();
        let cut = match boundary {
            Some(b) if b > 0 => b,
            _ => window_end,
        };
        pieces.push(rest[..cut].trim_end().to_string());
        rest = rest[cut..].trim_start();
    }
    if !rest.is_empty() {
        pieces.push(rest.to_string());
    }
    pieces
}

/// Split the canonical message into a threaded chunk sequence.
///
/// A message that fits is returned whole as one chunk. Otherwise whole
/// paragraphs are packed greedily, non-last chunks end with the continued
/// marker, and the footer rides on the last chunk (or gets its own chunk when
/// it does not fit there).
pub fn assemble(
    input: &AssemblyInput,
    max_chunk_length: usize,
    template: &CommentTemplate,
) -> Result<Vec<MessageChunk>> {
    let canonical = canonical_message(input, template);
    if char_len(&canonical) <= max_chunk_length {
        return Ok(thread(vec![canonical]));
    }

    let footer = template.footer(input);
    let marker_suffix = format!("{}{}", SEPARATOR, template.continued_marker);
    let capacity = max_chunk_length.saturating_sub(char_len(&marker_suffix));
    if capacity == 0 || char_len(&footer) > max_chunk_length {
        return Err(Error::InvalidInput(format!(
            "max chunk length {} cannot hold the footer and continued marker",
            max_chunk_length
        )));
    }

    let units = template
        .content_units(input)
        .into_iter()
        .flat_map(|unit| {
            if char_len(&unit) > capacity {
                split_oversized(&unit, capacity)
            } else {
                vec![unit]
            }
        });

    let mut bodies: Vec<String> = Vec::new();
    let mut current = String::new();
    for unit in units {
        if current.is_empty() {
            current = unit;
        } else if char_len(&current) + char_len(SEPARATOR) + char_len(&unit) <= capacity {
            current.push_str(SEPARATOR);
            current.push_str(&unit);
        } else {
            bodies.push(std::mem::take(&mut current));
            current = unit;
        }
    }

    if char_len(&current) + char_len(SEPARATOR) + char_len(&footer) <= max_chunk_length {
        current.push_str(SEPARATOR);
        current.push_str(&footer);
        bodies.push(current);
    } else {
        bodies.push(current);
        bodies.push(footer);
    }

    let last = bodies.len() - 1;
    for body in bodies.iter_mut().take(last) {
        body.push_str(&marker_suffix);
    }
    Ok(thread(bodies))
}

/// Assemble an extraction result with its own title, link and paragraphs.
pub fn assemble_result(
    result: &ExtractionResult,
    max_chunk_length: usize,
    template: &CommentTemplate,
) -> Result<Vec<MessageChunk>> {
    assemble(&AssemblyInput::from_result(result), max_chunk_length, template)
}

fn thread(bodies: Vec<String>) -> Vec<MessageChunk> {
    let count = bodies.len();
    bodies
        .into_iter()
        .enumerate()
        .map(|(sequence, body)| MessageChunk {
            sequence,
            body,
            is_first: sequence == 0,
            is_last: sequence + 1 == count,
            reply_to_sequence: sequence.checked_sub(1),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(paragraphs: Vec<String>) -> AssemblyInput {
        AssemblyInput::new(
            "Título de prueba",
            "https://example.com/nota",
            paragraphs,
        )
    }

    fn squash(text: &str) -> String {
        text.chars().filter(|c| !c.is_whitespace()).collect()
    }

    /// Chunks joined in order with markers removed.
    fn reconstruct(chunks: &[MessageChunk], template: &CommentTemplate) -> String {
        let suffix = format!("{}{}", SEPARATOR, template.continued_marker);
        chunks
            .iter()
            .map(|c| c.body.strip_suffix(&suffix).unwrap_or(&c.body).to_string())
            .collect::<Vec<_>>()
            .join(SEPARATOR)
    }

    #[test]
    fn test_short_message_is_single_chunk_with_footer() {
        let template = CommentTemplate::article();
        let chunks = assemble(
            &input(vec!["Un párrafo corto.".into()]),
            10_000,
            &template,
        )
        .unwrap();
        assert_eq!(chunks.len(), 1);
        let only = &chunks[0];
        assert!(only.is_first && only.is_last);
        assert_eq!(only.reply_to_sequence, None);
        assert!(only.body.starts_with("# Título de prueba"));
        assert!(only.body.contains("[Link a la noticia](https://example.com/nota)"));
        assert!(only.body.contains("(example.com)"));
        assert!(!only.body.contains(defaults::CONTINUED_MARKER));
    }

    #[test]
    fn test_fifty_thousand_characters_make_five_chunks() {
        let paragraphs: Vec<String> = (0..50)
            .map(|i| format!("{:03} {}", i, "a".repeat(976)))
            .collect();
        assert!(paragraphs.iter().all(|p| char_len(p) == 980));

        let template = CommentTemplate::article();
        let chunks = assemble(&input(paragraphs), 10_000, &template).unwrap();

        assert_eq!(chunks.len(), 5);
        for chunk in &chunks {
            assert!(char_len(&chunk.body) <= 10_000);
        }
        for chunk in &chunks[..4] {
            assert!(chunk.body.ends_with(defaults::CONTINUED_MARKER));
            assert!(!chunk.body.contains("Link a la noticia"));
        }
        assert!(chunks[4].body.contains("Link a la noticia"));
        assert!(chunks[4].body.ends_with(defaults::FOOTER_DISCLAIMER));
        assert!(!chunks[4].body.contains(defaults::CONTINUED_MARKER));
    }

    #[test]
    fn test_reply_chain_is_linear() {
        let paragraphs: Vec<String> = (0..30).map(|i| format!("{} {}", i, "b".repeat(300))).collect();
        let chunks = assemble(&input(paragraphs), 2_000, &CommentTemplate::article()).unwrap();
        assert!(chunks.len() > 3);
        for (k, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.sequence, k);
            assert_eq!(chunk.is_first, k == 0);
            assert_eq!(chunk.is_last, k == chunks.len() - 1);
            assert_eq!(chunk.reply_to_sequence, k.checked_sub(1));
        }
    }

    #[test]
    fn test_chunks_reconstruct_canonical_message() {
        let paragraphs: Vec<String> = (0..25)
            .map(|i| format!("Párrafo {} con contenido variado y acentos: ñandú, café.", i).repeat(5))
            .collect();
        let template = CommentTemplate::article();
        let message = input(paragraphs);
        let chunks = assemble(&message, 1_500, &template).unwrap();
        assert!(chunks.len() > 1);
        assert_eq!(
            squash(&reconstruct(&chunks, &template)),
            squash(&canonical_message(&message, &template))
        );
    }

    #[test]
    fn test_oversized_paragraph_splits_at_sentence() {
        let sentence = "Esta es una oración de prueba bastante larga. ";
        let long = sentence.repeat(100);
        let template = CommentTemplate::article();
        let message = input(vec![long]);
        let chunks = assemble(&message, 1_000, &template).unwrap();

        assert!(chunks.len() > 2);
        for chunk in &chunks {
            assert!(char_len(&chunk.body) <= 1_000);
        }
        let first_body = chunks[1]
            .body
            .strip_suffix(&format!("{}{}", SEPARATOR, defaults::CONTINUED_MARKER))
            .unwrap();
        assert!(first_body.ends_with("larga."));
        assert_eq!(
            squash(&reconstruct(&chunks, &template)),
            squash(&canonical_message(&message, &template))
        );
    }

    #[test]
    fn test_hard_cut_without_sentence_boundary() {
        let pieces = split_oversized(&"x".repeat(250), 100);
        assert_eq!(pieces.len(), 3);
        assert_eq!(char_len(&pieces[0]), 100);
        assert_eq!(char_len(&pieces[2]), 50);

        let accented = split_oversized(&"é".repeat(30), 10);
        assert_eq!(accented, vec!["é".repeat(10); 3]);
    }

    #[test]
    fn test_sentence_split_prefers_last_boundary() {
        let pieces = split_oversized("Uno. Dos dos. Tres tres tres tres.", 20);
        assert_eq!(pieces[0], "Uno. Dos dos.");
        assert_eq!(pieces[1], "Tres tres tres tres.");
    }

    #[test]
    fn test_footer_gets_own_chunk_when_last_is_full() {
        let template = CommentTemplate::article();
        let capacity = 1_000 - char_len(SEPARATOR) - char_len(defaults::CONTINUED_MARKER);
        // Title plus one paragraph fill the first chunk to capacity.
        let title_len = char_len("# Título de prueba") + char_len(SEPARATOR);
        let filler = "c".repeat(capacity - title_len);
        let chunks = assemble(&input(vec![filler]), 1_000, &template).unwrap();
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].body.ends_with(defaults::CONTINUED_MARKER));
        assert!(chunks[1].body.starts_with("---"));
    }

    #[test]
    fn test_assembly_is_deterministic() {
        let paragraphs: Vec<String> = (0..40).map(|i| format!("{} {}", i, "d".repeat(200))).collect();
        let template = CommentTemplate::video_summary();
        let a = assemble(&input(paragraphs.clone()), 1_200, &template).unwrap();
        let b = assemble(&input(paragraphs), 1_200, &template).unwrap();
        assert_eq!(a, b);
        assert!(a[0].body.starts_with("# 🎥 Título de prueba\n\n**Resumen del video:**"));
    }

    #[test]
    fn test_too_small_limit_is_rejected() {
        let err = assemble(
            &input(vec!["x".repeat(100)]),
            20,
            &CommentTemplate::article(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }
}
