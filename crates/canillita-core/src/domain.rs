//! URL and domain helpers shared by content routing and provider lookup.

use url::Url;

use crate::{Error, Result};

/// Parse an absolute http(s) URL.
pub fn parse_http_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim())?;
    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(Error::InvalidInput(format!(
                "unsupported URL scheme '{}': {}",
                other, raw
            )))
        }
    }
    if url.host_str().is_none() {
        return Err(Error::InvalidInput(format!("URL has no host: {}", raw)));
    }
    Ok(url)
}

/// Lower-cased host with a leading `www.` removed.
pub fn registrable_domain(url: &Url) -> Option<String> {
    let host = url.host_str()?.trim_end_matches('.').to_ascii_lowercase();
    Some(host.strip_prefix("www.").map(str::to_string).unwrap_or(host))
}

/// Convenience wrapper for [`registrable_domain`] on a raw string.
pub fn domain_of(raw: &str) -> Option<String> {
    parse_http_url(raw).ok().as_ref().and_then(registrable_domain)
}

/// Whether `host` equals `pattern` or is a subdomain of it.
///
/// Matching is on label boundaries: `example.com` matches
/// `news.example.com` but not `badexample.com`.
pub fn domain_matches(host: &str, pattern: &str) -> bool {
    let pattern = pattern.trim().trim_start_matches("*.").to_ascii_lowercase();
    let pattern = pattern.strip_prefix("www.").unwrap_or(&pattern);
    if pattern.is_empty() {
        return false;
    }
    let host = host.to_ascii_lowercase();
    host == pattern
        || (host.len() > pattern.len()
            && host.ends_with(pattern)
            && host.as_bytes()[host.len() - pattern.len() - 1] == b'.')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registrable_domain_strips_www() {
        let url = Url::parse("https://www.Infobae.com/politica/nota").unwrap();
        assert_eq!(registrable_domain(&url).as_deref(), Some("infobae.com"));
    }

    #[test]
    fn test_registrable_domain_keeps_subdomain() {
        let url = Url::parse("https://tn.com.ar/sociedad/").unwrap();
        assert_eq!(registrable_domain(&url).as_deref(), Some("tn.com.ar"));
        let url = Url::parse("https://deportes.clarin.com/x").unwrap();
        assert_eq!(registrable_domain(&url).as_deref(), Some("deportes.clarin.com"));
    }

    #[test]
    fn test_domain_matches_label_boundary() {
        assert!(domain_matches("example.com", "example.com"));
        assert!(domain_matches("news.example.com", "example.com"));
        assert!(!domain_matches("badexample.com", "example.com"));
        assert!(!domain_matches("example.com", "news.example.com"));
    }

    #[test]
    fn test_domain_matches_wildcard_and_www_pattern() {
        assert!(domain_matches("a.example.com", "*.example.com"));
        assert!(domain_matches("example.com", "www.example.com"));
        assert!(!domain_matches("example.com", ""));
    }

    #[test]
    fn test_parse_http_url_rejects_other_schemes() {
        assert!(parse_http_url("ftp://example.com/file").is_err());
        assert!(parse_http_url("mailto:someone@example.com").is_err());
        assert!(parse_http_url("not a url").is_err());
        assert!(parse_http_url(" https://example.com/a ").is_ok());
    }

    #[test]
    fn test_domain_of() {
        assert_eq!(domain_of("https://www.lanacion.com.ar/x").as_deref(), Some("lanacion.com.ar"));
        assert_eq!(domain_of("garbage"), None);
    }
}
