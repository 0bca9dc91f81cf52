//! Document fetching.
//!
//! `HttpFetcher` enforces a per-request timeout, a body size cap and an HTML
//! content type. Successful documents are kept in a bounded LRU cache so the
//! fallback strategies can still run when a later re-fetch fails.

use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use lru::LruCache;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE};
use tracing::{debug, warn};

use canillita_core::{defaults, parse_http_url, Error, Result};

/// A fetched raw document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// URL that was requested.
    pub url: String,
    /// URL after redirects.
    pub final_url: String,
    pub html: String,
}

impl Document {
    pub fn new(url: impl Into<String>, html: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            final_url: url.clone(),
            url,
            html: html.into(),
        }
    }

    /// Raw document length in bytes; the denominator of the markup ratio.
    pub fn raw_len(&self) -> usize {
        self.html.len()
    }
}

/// Source of raw documents.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Document>;

    /// A previously fetched copy of `url`, if one is still held.
    fn cached(&self, _url: &str) -> Option<Document> {
        None
    }
}

/// Fetcher settings.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub timeout: Duration,
    pub user_agent: String,
    pub max_bytes: usize,
    pub cache_capacity: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(defaults::FETCH_TIMEOUT_SECS),
            user_agent: defaults::USER_AGENT.to_string(),
            max_bytes: defaults::MAX_DOCUMENT_BYTES,
            cache_capacity: defaults::DOCUMENT_CACHE_CAPACITY,
        }
    }
}

impl FetchConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }
}

/// reqwest-backed fetcher with an LRU document cache.
pub struct HttpFetcher {
    client: reqwest::Client,
    config: FetchConfig,
    cache: Mutex<LruCache<String, Document>>,
}

impl HttpFetcher {
    pub fn new(config: FetchConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))?;
        let capacity = NonZeroUsize::new(config.cache_capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Ok(Self {
            client,
            cache: Mutex::new(LruCache::new(capacity)),
            config,
        })
    }

    fn remember(&self, document: &Document) {
        let mut cache = match self.cache.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        cache.put(document.url.clone(), document.clone());
    }
}

fn is_html(content_type: &str) -> bool {
    let ct = content_type.to_ascii_lowercase();
    ct.contains("text/html") || ct.contains("application/xhtml")
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Document> {
        parse_http_url(url)?;
        let start = Instant::now();

        let response = self
            .client
            .get(url)
            .header(ACCEPT, "text/html,application/xhtml+xml;q=0.9,*/*;q=0.5")
            .header(ACCEPT_LANGUAGE, "es-AR,es;q=0.9,en;q=0.5")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::from_status(status.as_u16(), url));
        }

        if let Some(ct) = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
        {
            if !is_html(ct) {
                return Err(Error::Permanent(format!(
                    "non-HTML document ({}) at {}",
                    ct, url
                )));
            }
        }
        if let Some(len) = response.content_length() {
            if len as usize > self.config.max_bytes {
                return Err(Error::Permanent(format!(
                    "document too large ({} bytes) at {}",
                    len, url
                )));
            }
        }

        let final_url = response.url().to_string();
        let body = response.bytes().await?;
        if body.len() > self.config.max_bytes {
            return Err(Error::Permanent(format!(
                "document too large ({} bytes) at {}",
                body.len(),
                url
            )));
        }

        let document = Document {
            url: url.to_string(),
            final_url,
            html: String::from_utf8_lossy(&body).into_owned(),
        };
        self.remember(&document);

        debug!(
            subsystem = "extract",
            component = "fetcher",
            url = %url,
            bytes = document.raw_len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Document fetched"
        );
        Ok(document)
    }

    fn cached(&self, url: &str) -> Option<Document> {
        let mut cache = match self.cache.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let hit = cache.get(url).cloned();
        if hit.is_some() {
            warn!(
                subsystem = "extract",
                component = "fetcher",
                url = %url,
                "Using cached document after fetch failure"
            );
        }
        hit
    }
}

/// Fetcher serving fixed documents; unknown URLs fail as unreachable.
#[derive(Debug, Default)]
pub struct StaticFetcher {
    documents: std::collections::HashMap<String, Document>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(mut self, url: impl Into<String>, html: impl Into<String>) -> Self {
        let url = url.into();
        self.documents
            .insert(url.clone(), Document::new(url, html));
        self
    }
}

#[async_trait]
impl Fetcher for StaticFetcher {
    async fn fetch(&self, url: &str) -> Result<Document> {
        self.documents
            .get(url)
            .cloned()
            .ok_or_else(|| Error::Fetch(format!("unreachable: {}", url)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canillita_core::ErrorKind;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher() -> HttpFetcher {
        HttpFetcher::new(FetchConfig::default().with_timeout(Duration::from_millis(500))).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_html_and_cache() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/nota"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(
                    "<html><body><p>Hola</p></body></html>",
                    "text/html; charset=utf-8",
                ),
            )
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = fetcher();
        let url = format!("{}/nota", server.uri());
        let doc = fetcher.fetch(&url).await.unwrap();
        assert!(doc.html.contains("Hola"));
        assert_eq!(fetcher.cached(&url), Some(doc));
    }

    #[tokio::test]
    async fn test_not_found_is_permanent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = fetcher()
            .fetch(&format!("{}/missing", server.uri()))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Permanent);
    }

    #[tokio::test]
    async fn test_server_error_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = fetcher()
            .fetch(&format!("{}/down", server.uri()))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transient);
    }

    #[tokio::test]
    async fn test_timeout_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw("<p>tarde</p>", "text/html")
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let err = fetcher()
            .fetch(&format!("{}/slow", server.uri()))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transient);
    }

    #[tokio::test]
    async fn test_non_html_is_permanent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(vec![0x25u8, 0x50, 0x44, 0x46], "application/pdf"),
            )
            .mount(&server)
            .await;

        let err = fetcher()
            .fetch(&format!("{}/doc.pdf", server.uri()))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Permanent);
        assert!(err.to_string().contains("non-HTML"));
    }

    #[tokio::test]
    async fn test_oversized_body_is_permanent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw("x".repeat(2048), "text/html"),
            )
            .mount(&server)
            .await;

        let fetcher =
            HttpFetcher::new(FetchConfig::default().with_max_bytes(1024)).unwrap();
        let err = fetcher
            .fetch(&format!("{}/big", server.uri()))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("too large"));
    }

    #[tokio::test]
    async fn test_invalid_url_rejected() {
        let err = fetcher().fetch("ftp://example.com/file").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Permanent);
    }
}
