//! Content-kind routing for submitted links.

use url::Url;

use crate::domain::{domain_matches, parse_http_url, registrable_domain};
use crate::models::{SourceKind, SourceRef, Submission};
use crate::{Error, Result};

const YOUTUBE_HOSTS: &[&str] = &["youtube.com", "m.youtube.com", "music.youtube.com", "youtu.be"];
const SOCIAL_HOSTS: &[&str] = &["twitter.com", "x.com", "mobile.twitter.com"];

/// Decides which pipeline a submitted URL belongs to.
#[derive(Debug, Clone, Default)]
pub struct ContentClassifier {
    /// Allow-list for articles. Empty means any domain is an article candidate.
    news_domains: Vec<String>,
    blocked_domains: Vec<String>,
}

impl ContentClassifier {
    pub fn new(news_domains: Vec<String>, blocked_domains: Vec<String>) -> Self {
        Self {
            news_domains,
            blocked_domains,
        }
    }

    /// Classify a URL, or fail with a Permanent error for unsupported links.
    pub fn classify(&self, raw_url: &str) -> Result<SourceKind> {
        let url = parse_http_url(raw_url)?;
        let host = registrable_domain(&url)
            .ok_or_else(|| Error::InvalidInput(format!("URL has no host: {}", raw_url)))?;

        if self
            .blocked_domains
            .iter()
            .any(|blocked| domain_matches(&host, blocked))
        {
            return Err(Error::Unsupported(format!(
                "Unsupported content type: blocked domain {}",
                host
            )));
        }

        if YOUTUBE_HOSTS.iter().any(|h| host == *h) && youtube_video_id(&url).is_some() {
            return Ok(SourceKind::Video);
        }

        if SOCIAL_HOSTS.iter().any(|h| host == *h) {
            if url.path().contains("/status/") {
                return Ok(SourceKind::SocialPost);
            }
            return Err(Error::Unsupported(format!(
                "Unsupported content type: not a post link {}",
                raw_url
            )));
        }

        if self.news_domains.is_empty()
            || self
                .news_domains
                .iter()
                .any(|news| domain_matches(&host, news))
        {
            return Ok(SourceKind::Article);
        }

        Err(Error::Unsupported(format!("Unsupported content type: {}", host)))
    }

    /// Turn a platform submission into a routed source.
    pub fn source_for(&self, submission: &Submission) -> Result<SourceRef> {
        let kind = self.classify(&submission.url)?;
        Ok(SourceRef::new(
            submission.external_id.clone(),
            submission.url.trim(),
            kind,
        ))
    }
}

/// Extract the YouTube video id from watch, short and embed links.
pub fn youtube_video_id(url: &Url) -> Option<String> {
    let host = registrable_domain(url)?;
    let candidate = if host == "youtu.be" {
        url.path_segments()?.next().map(str::to_string)
    } else if url.path() == "/watch" {
        url.query_pairs()
            .find(|(k, _)| k == "v")
            .map(|(_, v)| v.into_owned())
    } else {
        let mut segments = url.path_segments()?;
        match segments.next() {
            Some("shorts") | Some("embed") | Some("live") => segments.next().map(str::to_string),
            _ => None,
        }
    };
    candidate.filter(|id| {
        !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    })
}

/// Convenience wrapper for [`youtube_video_id`] on a raw string.
pub fn video_id_of(raw: &str) -> Option<String> {
    parse_http_url(raw).ok().and_then(|u| youtube_video_id(&u))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    fn classifier() -> ContentClassifier {
        ContentClassifier::new(
            vec!["infobae.com".into(), "clarin.com".into()],
            vec!["spam.example".into()],
        )
    }

    #[test]
    fn test_classify_news_domain() {
        let kind = classifier()
            .classify("https://www.infobae.com/politica/2024/01/01/nota/")
            .unwrap();
        assert_eq!(kind, SourceKind::Article);
    }

    #[test]
    fn test_classify_news_subdomain() {
        let kind = classifier()
            .classify("https://deportes.clarin.com/futbol/nota.html")
            .unwrap();
        assert_eq!(kind, SourceKind::Article);
    }

    #[test]
    fn test_classify_youtube_variants() {
        let c = classifier();
        for url in [
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
            "https://youtu.be/dQw4w9WgXcQ",
            "https://m.youtube.com/watch?v=dQw4w9WgXcQ&t=42",
            "https://www.youtube.com/shorts/dQw4w9WgXcQ",
        ] {
            assert_eq!(c.classify(url).unwrap(), SourceKind::Video, "{}", url);
        }
    }

    #[test]
    fn test_classify_youtube_channel_is_unsupported() {
        let err = classifier()
            .classify("https://www.youtube.com/@somechannel")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Permanent);
    }

    #[test]
    fn test_classify_social_post() {
        let c = classifier();
        assert_eq!(
            c.classify("https://x.com/someone/status/1234567890").unwrap(),
            SourceKind::SocialPost
        );
        assert_eq!(
            c.classify("https://twitter.com/someone/status/1234567890").unwrap(),
            SourceKind::SocialPost
        );
        assert!(c.classify("https://x.com/someone").is_err());
    }

    #[test]
    fn test_classify_blocked_and_unknown() {
        let c = classifier();
        let err = c.classify("https://spam.example/offer").unwrap_err();
        assert!(matches!(err, Error::Unsupported(_)));
        let err = c.classify("https://unknown-site.org/a").unwrap_err();
        assert!(err.to_string().contains("Unsupported content type"));
    }

    #[test]
    fn test_empty_allow_list_accepts_any_article() {
        let c = ContentClassifier::default();
        assert_eq!(
            c.classify("https://unknown-site.org/a").unwrap(),
            SourceKind::Article
        );
    }

    #[test]
    fn test_malformed_url_is_permanent() {
        let err = classifier().classify("htp:/broken").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Permanent);
    }

    #[test]
    fn test_video_id_extraction() {
        assert_eq!(
            video_id_of("https://www.youtube.com/watch?v=abc_DEF-123").as_deref(),
            Some("abc_DEF-123")
        );
        assert_eq!(video_id_of("https://youtu.be/xyz987?t=5").as_deref(), Some("xyz987"));
        assert_eq!(video_id_of("https://www.youtube.com/watch"), None);
        assert_eq!(video_id_of("https://www.youtube.com/embed/"), None);
    }

    #[test]
    fn test_source_for_submission() {
        let submission = Submission {
            external_id: "t3_1".into(),
            url: " https://www.infobae.com/a ".into(),
            community: Some("argentina".into()),
            title: None,
        };
        let source = classifier().source_for(&submission).unwrap();
        assert_eq!(source.external_id, "t3_1");
        assert_eq!(source.url, "https://www.infobae.com/a");
        assert_eq!(source.kind, SourceKind::Article);
    }
}
