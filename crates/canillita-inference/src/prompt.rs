//! Prompt construction for video summaries.

use canillita_core::{defaults, SummaryContext, Transcript};

/// Language used when the context does not name one.
pub const DEFAULT_SUMMARY_LANGUAGE: &str = "español";

/// Spanish name for a language code; unknown values pass through.
pub fn language_name(code: &str) -> &str {
    match code.split(['-', '_']).next().unwrap_or(code) {
        "es" => "español",
        "en" => "inglés",
        "pt" => "portugués",
        "it" => "italiano",
        "fr" => "francés",
        _ => code,
    }
}

/// System instructions for the summarizer.
pub fn system_prompt(language: &str) -> String {
    format!(
        "Sos un asistente que resume videos para lectores de un foro de noticias. \
         Escribí en {} un resumen fiel y neutral del contenido, en párrafos cortos \
         separados por una línea en blanco. No inventes datos que no estén en la \
         transcripción, no uses viñetas ni títulos y no agregues opiniones propias.",
        language_name(language)
    )
}

/// Cut `text` to at most `max_chars` characters, preferring a word boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    let Some((cut, _)) = text.char_indices().nth(max_chars) else {
        return text;
    };
    let head = &text[..cut];
    match head.rfind(char::is_whitespace) {
        Some(space) if space > 0 => head[..space].trim_end(),
        _ => head,
    }
}

/// User prompt carrying the (possibly truncated) transcript.
pub fn summary_prompt(transcript: &Transcript, context: &SummaryContext) -> String {
    let body = truncate_chars(transcript.text.trim(), defaults::MAX_TRANSCRIPT_CHARS);
    let mut prompt = String::new();
    if let Some(title) = context.title.as_deref().filter(|t| !t.trim().is_empty()) {
        prompt.push_str(&format!("Título del video: {}\n", title.trim()));
    }
    prompt.push_str(&format!("Enlace: {}\n\n", context.url));
    prompt.push_str("Transcripción:\n");
    prompt.push_str(body);
    if body.len() < transcript.text.trim().len() {
        prompt.push_str("\n[transcripción truncada]");
    }
    prompt.push_str("\n\nResumen:");
    prompt
}

/// Split model output into clean paragraphs.
pub fn summary_paragraphs(summary: &str) -> Vec<String> {
    summary
        .split("\n\n")
        .map(|p| {
            p.lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .collect::<Vec<_>>()
                .join(" ")
        })
        .filter(|p| !p.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transcript(text: &str) -> Transcript {
        Transcript {
            video_id: "abc123".to_string(),
            text: text.to_string(),
            language: Some("es".to_string()),
        }
    }

    #[test]
    fn test_language_names() {
        assert_eq!(language_name("es-AR"), "español");
        assert_eq!(language_name("en"), "inglés");
        assert_eq!(language_name("español"), "español");
        assert!(system_prompt("pt").contains("portugués"));
    }

    #[test]
    fn test_truncate_prefers_word_boundary() {
        assert_eq!(truncate_chars("hola mundo cruel", 12), "hola mundo");
        assert_eq!(truncate_chars("corto", 100), "corto");
        assert_eq!(truncate_chars("ñññññ", 3), "ñññ");
    }

    #[test]
    fn test_prompt_includes_title_and_url() {
        let context = SummaryContext {
            title: Some("Entrevista al ministro".to_string()),
            url: "https://youtu.be/abc123".to_string(),
            language: None,
        };
        let prompt = summary_prompt(&transcript("Buenas tardes a todos."), &context);
        assert!(prompt.contains("Título del video: Entrevista al ministro"));
        assert!(prompt.contains("Enlace: https://youtu.be/abc123"));
        assert!(prompt.contains("Buenas tardes a todos."));
        assert!(!prompt.contains("truncada"));
    }

    #[test]
    fn test_long_transcript_is_truncated() {
        let long = "palabra ".repeat(defaults::MAX_TRANSCRIPT_CHARS);
        let prompt = summary_prompt(&transcript(&long), &SummaryContext::default());
        assert!(prompt.contains("[transcripción truncada]"));
        assert!(prompt.chars().count() < defaults::MAX_TRANSCRIPT_CHARS + 200);
    }

    #[test]
    fn test_summary_paragraphs() {
        let out = summary_paragraphs("Primer párrafo\ncontinúa aquí.\n\n\n  Segundo párrafo.  \n\n");
        assert_eq!(out, vec!["Primer párrafo continúa aquí.", "Segundo párrafo."]);
    }
}
