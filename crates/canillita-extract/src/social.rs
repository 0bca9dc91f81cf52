//! Social post extraction through an oEmbed endpoint.
//!
//! The endpoint returns an embeddable blockquote; the post text, author
//! citation and date link are read out of it.

use std::time::{Duration, Instant};

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::Deserialize;
use tracing::{info, instrument, warn};

use canillita_core::{
    defaults, parse_http_url, Error, ExtractionResult, Result, SourceRef, Strategy,
};

use crate::text::{collapse_whitespace, element_text};

/// Provider name recorded on social post results.
pub const SOCIAL_PROVIDER: &str = "x.com";

const SOCIAL_QUALITY_SCORE: f32 = 0.9;

const MEDIA_NOTE: &str = "*(La publicación incluye imágenes o video)*";

static PARAGRAPH: Lazy<Option<Selector>> = Lazy::new(|| Selector::parse("p").ok());
static LINK: Lazy<Option<Selector>> = Lazy::new(|| Selector::parse("a").ok());
static MEDIA_HREF: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(pic\.twitter\.com|//t\.co/)").ok());
static CITATION: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"([^(]+?)\s*\((@\w+)\)").ok());
static STATUS_HREF: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"/status/\d+").ok());

#[derive(Debug, Deserialize)]
struct OEmbedResponse {
    #[serde(default)]
    html: String,
    #[serde(default)]
    author_name: Option<String>,
    #[serde(default)]
    author_url: Option<String>,
}

/// Fields read from an embed blockquote.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmbeddedPost {
    pub text: String,
    pub author: Option<String>,
    pub handle: Option<String>,
    pub date: Option<String>,
    pub has_media: bool,
}

impl EmbeddedPost {
    /// `Author (@handle)`, or whichever half is known.
    pub fn byline(&self) -> Option<String> {
        match (&self.author, &self.handle) {
            (Some(author), Some(handle)) => Some(format!("{} ({})", author, handle)),
            (Some(author), None) => Some(author.clone()),
            (None, Some(handle)) => Some(handle.clone()),
            (None, None) => None,
        }
    }

    pub fn paragraphs(&self) -> Vec<String> {
        let mut out = vec![self.text.clone()];
        if self.has_media {
            out.push(MEDIA_NOTE.to_string());
        }
        if let Some(date) = &self.date {
            out.push(format!("*{}*", date));
        }
        out
    }
}

fn is_media_link(el: &ElementRef<'_>) -> bool {
    el.value().name() == "a"
        && el
            .value()
            .attr("href")
            .zip(MEDIA_HREF.as_ref())
            .map_or(false, |(href, re)| re.is_match(href))
}

/// Parse the blockquote markup of an embed.
pub fn parse_embed_html(markup: &str) -> Result<EmbeddedPost> {
    let html = Html::parse_fragment(markup);
    let mut post = EmbeddedPost::default();

    if let Some(p) = PARAGRAPH.as_ref().and_then(|sel| html.select(sel).next()) {
        post.has_media = LINK
            .as_ref()
            .map_or(false, |sel| p.select(sel).any(|a| is_media_link(&a)));
        post.text = collapse_whitespace(&element_text(p, &is_media_link));
    }
    if post.text.is_empty() {
        return Err(Error::Unparseable("embed has no post text".to_string()));
    }

    let full_text = html.root_element().text().collect::<String>();
    if let (Some((_, citation)), Some(re)) = (full_text.split_once('—'), CITATION.as_ref()) {
        if let Some(caps) = re.captures(citation) {
            post.author = caps
                .get(1)
                .map(|m| collapse_whitespace(m.as_str()))
                .filter(|a| !a.is_empty());
            post.handle = caps.get(2).map(|m| m.as_str().to_string());
        }
    }

    if let (Some(link), Some(status)) = (LINK.as_ref(), STATUS_HREF.as_ref()) {
        post.date = html
            .select(link)
            .find(|a| a.value().attr("href").map_or(false, |h| status.is_match(h)))
            .map(|a| collapse_whitespace(&a.text().collect::<String>()))
            .filter(|d| !d.is_empty());
    }

    Ok(post)
}

/// Handle from an author profile URL, e.g. `https://twitter.com/nasa` → `@nasa`.
fn handle_from_url(author_url: &str) -> Option<String> {
    let url = url::Url::parse(author_url).ok()?;
    let segment = url.path_segments()?.find(|s| !s.is_empty())?;
    Some(format!("@{}", segment))
}

/// Formats social posts via oEmbed.
pub struct SocialPostExtractor {
    client: reqwest::Client,
    endpoint: String,
}

impl SocialPostExtractor {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(defaults::USER_AGENT)
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    /// Extractor against the public endpoint.
    pub fn with_defaults() -> Result<Self> {
        Self::new(
            defaults::OEMBED_URL,
            Duration::from_secs(defaults::FETCH_TIMEOUT_SECS),
        )
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    #[instrument(
        skip(self, source),
        fields(subsystem = "extract", component = "social", external_id = %source.external_id)
    )]
    pub async fn extract(&self, source: &SourceRef) -> Result<ExtractionResult> {
        parse_http_url(&source.url)?;
        let start = Instant::now();

        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("url", source.url.as_str()), ("omit_script", "true")])
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), url = %source.url, "oEmbed request failed");
            return Err(Error::from_status(status.as_u16(), &source.url));
        }
        let body: OEmbedResponse = response.json().await?;
        if body.html.trim().is_empty() {
            return Err(Error::Unparseable(format!(
                "oEmbed response for {} has no markup",
                source.url
            )));
        }

        let mut post = parse_embed_html(&body.html)?;
        if post.author.is_none() {
            post.author = body.author_name.filter(|a| !a.trim().is_empty());
        }
        if post.handle.is_none() {
            post.handle = body.author_url.as_deref().and_then(handle_from_url);
        }

        let title = post
            .byline()
            .unwrap_or_else(|| SOCIAL_PROVIDER.to_string());
        info!(
            text_length = post.text.chars().count(),
            has_media = post.has_media,
            duration_ms = start.elapsed().as_millis() as u64,
            "Social post extracted"
        );
        Ok(ExtractionResult::success(
            source.clone(),
            SOCIAL_PROVIDER,
            title,
            post.paragraphs(),
            Strategy::Structured,
            SOCIAL_QUALITY_SCORE,
        ))
    }
}
