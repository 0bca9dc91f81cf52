//! Core data models for canillita.
//!
//! These types are shared across all canillita crates and represent the
//! pipeline's domain entities.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::defaults;
use crate::error::{Error, ErrorKind, Result};

// =============================================================================
// SOURCE TYPES
// =============================================================================

/// What kind of content a submitted link points to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Article,
    Video,
    SocialPost,
}

impl SourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceKind::Article => "article",
            SourceKind::Video => "video",
            SourceKind::SocialPost => "social_post",
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SourceKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "article" => Ok(SourceKind::Article),
            "video" => Ok(SourceKind::Video),
            "social_post" => Ok(SourceKind::SocialPost),
            other => Err(Error::InvalidInput(format!("unknown source kind: {}", other))),
        }
    }
}

/// One external submission to process. Identity key for dedup.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceRef {
    /// Platform post identifier (unique per submission).
    pub external_id: String,
    pub url: String,
    pub kind: SourceKind,
}

impl SourceRef {
    pub fn new(external_id: impl Into<String>, url: impl Into<String>, kind: SourceKind) -> Self {
        Self {
            external_id: external_id.into(),
            url: url.into(),
            kind,
        }
    }

    /// Source domain without `www.`, if the URL parses.
    pub fn domain(&self) -> Option<String> {
        crate::domain::domain_of(&self.url)
    }
}

/// A submission as reported by the platform, before content routing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub external_id: String,
    pub url: String,
    #[serde(default)]
    pub community: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

// =============================================================================
// PROVIDER RULES
// =============================================================================

fn default_min_text_length() -> usize {
    defaults::MIN_TEXT_LENGTH
}

fn default_min_ratio() -> f64 {
    defaults::MIN_TEXT_TO_MARKUP_RATIO
}

fn default_max_length() -> usize {
    defaults::MAX_ARTICLE_LENGTH
}

/// Per-domain extraction configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderRule {
    /// Display name (defaults to the domain pattern).
    #[serde(default)]
    pub name: String,
    /// Domain suffix this rule applies to, e.g. `infobae.com`.
    #[serde(default)]
    pub domain_pattern: String,
    /// Candidate content selectors in priority order; first non-empty match wins.
    #[serde(default)]
    pub content_selectors: Vec<String>,
    /// Nodes removed before text collection.
    #[serde(default)]
    pub remove_selectors: Vec<String>,
    #[serde(default = "default_min_text_length")]
    pub min_text_length: usize,
    #[serde(default = "default_min_ratio")]
    pub min_text_to_markup_ratio: f64,
    #[serde(default)]
    pub title_selector: Option<String>,
    /// Regexes stripped from the title (site suffixes and the like).
    #[serde(default)]
    pub title_cleanup_patterns: Vec<String>,
    /// Regexes stripped from each paragraph.
    #[serde(default)]
    pub cleanup_patterns: Vec<String>,
    /// Any match in the body text fails the quality gate.
    #[serde(default)]
    pub reject_patterns: Vec<String>,
    /// Body characters kept; later paragraphs are dropped.
    #[serde(default = "default_max_length")]
    pub max_length: usize,
}

impl ProviderRule {
    /// Rule with the given domain and selectors, other fields defaulted.
    pub fn new(domain_pattern: impl Into<String>, content_selectors: Vec<String>) -> Self {
        let domain_pattern = domain_pattern.into();
        Self {
            name: domain_pattern.clone(),
            domain_pattern,
            content_selectors,
            remove_selectors: Vec::new(),
            min_text_length: defaults::MIN_TEXT_LENGTH,
            min_text_to_markup_ratio: defaults::MIN_TEXT_TO_MARKUP_RATIO,
            title_selector: None,
            title_cleanup_patterns: Vec::new(),
            cleanup_patterns: Vec::new(),
            reject_patterns: Vec::new(),
            max_length: defaults::MAX_ARTICLE_LENGTH,
        }
    }

    /// The rule used when no provider matches a domain.
    pub fn default_rule() -> Self {
        let mut rule = Self::new(
            "",
            defaults::DEFAULT_CONTENT_SELECTORS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        );
        rule.name = defaults::DEFAULT_PROVIDER_NAME.to_string();
        rule.remove_selectors = defaults::DEFAULT_REMOVE_SELECTORS
            .iter()
            .map(|s| s.to_string())
            .collect();
        rule
    }

    pub fn with_remove_selectors(mut self, selectors: Vec<String>) -> Self {
        self.remove_selectors = selectors;
        self
    }

    pub fn with_min_text_length(mut self, len: usize) -> Self {
        self.min_text_length = len;
        self
    }

    pub fn with_min_ratio(mut self, ratio: f64) -> Self {
        self.min_text_to_markup_ratio = ratio;
        self
    }

    pub fn with_title_selector(mut self, selector: impl Into<String>) -> Self {
        self.title_selector = Some(selector.into());
        self
    }

    /// Validate thresholds and selectors.
    ///
    /// `is_default` relaxes the non-empty selector requirement.
    pub fn validate(&self, is_default: bool) -> Result<()> {
        let ratio = self.min_text_to_markup_ratio;
        if !(ratio > 0.0 && ratio <= 1.0) {
            return Err(Error::Config(format!(
                "provider '{}': min_text_to_markup_ratio must be in (0, 1], got {}",
                self.display_name(),
                ratio
            )));
        }
        if !is_default {
            if self.domain_pattern.trim().is_empty() {
                return Err(Error::Config(format!(
                    "provider '{}': domain_pattern is required",
                    self.display_name()
                )));
            }
            if self.content_selectors.iter().all(|s| s.trim().is_empty()) {
                return Err(Error::Config(format!(
                    "provider '{}': content_selectors must not be empty",
                    self.display_name()
                )));
            }
        }
        if self.max_length == 0 {
            return Err(Error::Config(format!(
                "provider '{}': max_length must be positive",
                self.display_name()
            )));
        }
        Ok(())
    }

    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.domain_pattern
        } else {
            &self.name
        }
    }
}

// =============================================================================
// EXTRACTION TYPES
// =============================================================================

/// Extraction strategy, in fallback order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Provider selectors + normalizer.
    Structured,
    /// Text-density readability parser.
    FallbackParser,
    /// Title and meta description only.
    Manual,
}

impl Strategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Strategy::Structured => "structured",
            Strategy::FallbackParser => "fallback_parser",
            Strategy::Manual => "manual",
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Strategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "structured" => Ok(Strategy::Structured),
            "fallback_parser" => Ok(Strategy::FallbackParser),
            "manual" => Ok(Strategy::Manual),
            other => Err(Error::InvalidInput(format!("unknown strategy: {}", other))),
        }
    }
}

/// Why one strategy did not produce a result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyAttempt {
    pub strategy: Strategy,
    pub kind: ErrorKind,
    pub message: String,
}

/// Outcome of running the fallback chain for one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub source: SourceRef,
    pub provider_used: String,
    pub title: String,
    pub body_paragraphs: Vec<String>,
    pub strategy: Strategy,
    pub quality_score: f32,
    pub succeeded: bool,
    pub failure_reason: Option<ErrorKind>,
    pub failure_message: Option<String>,
    /// Failures of the strategies tried before the final one.
    #[serde(default)]
    pub attempts: Vec<StrategyAttempt>,
}

impl ExtractionResult {
    /// Result produced by a strategy that cleared its gate.
    pub fn success(
        source: SourceRef,
        provider_used: impl Into<String>,
        title: impl Into<String>,
        body_paragraphs: Vec<String>,
        strategy: Strategy,
        quality_score: f32,
    ) -> Self {
        Self {
            source,
            provider_used: provider_used.into(),
            title: title.into(),
            body_paragraphs,
            strategy,
            quality_score: quality_score.clamp(0.0, 1.0),
            succeeded: true,
            failure_reason: None,
            failure_message: None,
            attempts: Vec::new(),
        }
    }

    /// Result for a source where every strategy failed.
    ///
    /// The last attempt decides the surfaced failure reason.
    pub fn failure(
        source: SourceRef,
        provider_used: impl Into<String>,
        attempts: Vec<StrategyAttempt>,
    ) -> Self {
        let (strategy, reason, message) = match attempts.last() {
            Some(last) => (last.strategy, last.kind, last.message.clone()),
            None => (
                Strategy::Structured,
                ErrorKind::Permanent,
                "no extraction strategy configured".to_string(),
            ),
        };
        Self {
            source,
            provider_used: provider_used.into(),
            title: String::new(),
            body_paragraphs: Vec::new(),
            strategy,
            quality_score: 0.0,
            succeeded: false,
            failure_reason: Some(reason),
            failure_message: Some(message),
            attempts,
        }
    }

    pub fn with_attempts(mut self, attempts: Vec<StrategyAttempt>) -> Self {
        self.attempts = attempts;
        self
    }

    /// The failure as an error for the job state machine.
    ///
    /// When every strategy failed on content grounds (quality gate or
    /// unparseable markup) the source is permanently unprocessable.
    pub fn error(&self) -> Option<Error> {
        if self.succeeded {
            return None;
        }
        let message = self
            .failure_message
            .clone()
            .unwrap_or_else(|| "extraction failed".to_string());
        let kind = match self.failure_reason.unwrap_or(ErrorKind::Permanent) {
            ErrorKind::LowQuality | ErrorKind::Unparseable => ErrorKind::Permanent,
            other => other,
        };
        Some(Error::from_kind(
            kind,
            format!("all extraction strategies failed: {}", message),
        ))
    }

    /// Total characters across body paragraphs.
    pub fn text_length(&self) -> usize {
        self.body_paragraphs.iter().map(|p| p.chars().count()).sum()
    }
}

/// A video transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub video_id: String,
    pub text: String,
    #[serde(default)]
    pub language: Option<String>,
}

/// Context handed to the summarizer alongside a transcript.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryContext {
    pub title: Option<String>,
    pub url: String,
    /// Language the summary should be written in.
    pub language: Option<String>,
}

// =============================================================================
// JOB TYPES
// =============================================================================

/// What a job does with its source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    ExtractArticle,
    SummarizeVideo,
    FormatSocialPost,
}

impl JobKind {
    pub fn for_source(kind: SourceKind) -> Self {
        match kind {
            SourceKind::Article => JobKind::ExtractArticle,
            SourceKind::Video => JobKind::SummarizeVideo,
            SourceKind::SocialPost => JobKind::FormatSocialPost,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobKind::ExtractArticle => "extract_article",
            JobKind::SummarizeVideo => "summarize_video",
            JobKind::FormatSocialPost => "format_social_post",
        }
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "extract_article" => Ok(JobKind::ExtractArticle),
            "summarize_video" => Ok(JobKind::SummarizeVideo),
            "format_social_post" => Ok(JobKind::FormatSocialPost),
            other => Err(Error::InvalidInput(format!("unknown job kind: {}", other))),
        }
    }
}

/// Job lifecycle state.
///
/// Only `Pending` and `Leased` jobs live in the queue. `Retrying` is the
/// transient state between a failed lease and re-queueing; `Succeeded` and
/// `Exhausted` jobs leave the queue for the processed-post and dead-letter
/// tables respectively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Leased,
    Succeeded,
    Retrying,
    Exhausted,
}

impl JobState {
    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Leased => "leased",
            JobState::Succeeded => "succeeded",
            JobState::Retrying => "retrying",
            JobState::Exhausted => "exhausted",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Exhausted)
    }
}

impl std::str::FromStr for JobState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(JobState::Pending),
            "leased" => Ok(JobState::Leased),
            "succeeded" => Ok(JobState::Succeeded),
            "retrying" => Ok(JobState::Retrying),
            "exhausted" => Ok(JobState::Exhausted),
            other => Err(Error::InvalidInput(format!("unknown job state: {}", other))),
        }
    }
}

/// A queued unit of work for one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub source: SourceRef,
    pub kind: JobKind,
    pub state: JobState,
    /// Failed executions so far.
    pub attempt: i32,
    pub max_attempts: i32,
    pub enqueued_at: DateTime<Utc>,
    pub next_eligible_at: DateTime<Utc>,
    pub leased_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    /// Message ids of chunks already delivered, in chunk order.
    #[serde(default)]
    pub delivered_message_ids: Vec<String>,
}

impl Job {
    /// A fresh pending job, eligible immediately.
    pub fn new(source: SourceRef, kind: JobKind, max_attempts: i32, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(),
            source,
            kind,
            state: JobState::Pending,
            attempt: 0,
            max_attempts: max_attempts.max(1),
            enqueued_at: now,
            next_eligible_at: now,
            leased_at: None,
            last_error: None,
            delivered_message_ids: Vec::new(),
        }
    }

    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        self.state == JobState::Pending && self.next_eligible_at <= now
    }
}

/// A job that will not be retried automatically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetter {
    pub job_id: Uuid,
    pub source: SourceRef,
    pub kind: JobKind,
    pub attempts: i32,
    pub error_kind: ErrorKind,
    pub last_error: String,
    pub dead_at: DateTime<Utc>,
}

// =============================================================================
// RECORDS & DELIVERY
// =============================================================================

/// Terminal outcome for one source. At most one exists per external id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedPostRecord {
    pub source: SourceRef,
    pub processed_at: DateTime<Utc>,
    pub success: bool,
    pub message_ids: Vec<String>,
    pub error_message: Option<String>,
}

impl ProcessedPostRecord {
    pub fn succeeded(source: SourceRef, message_ids: Vec<String>, now: DateTime<Utc>) -> Self {
        Self {
            source,
            processed_at: now,
            success: true,
            message_ids,
            error_message: None,
        }
    }

    pub fn failed(source: SourceRef, error_message: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            source,
            processed_at: now,
            success: false,
            message_ids: Vec::new(),
            error_message: Some(error_message.into()),
        }
    }
}

/// One bounded-length message in a threaded reply sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageChunk {
    /// 0-based position in the thread.
    pub sequence: usize,
    pub body: String,
    pub is_first: bool,
    pub is_last: bool,
    /// Sequence of the chunk this one replies to; `None` for the first chunk.
    pub reply_to_sequence: Option<usize>,
}

// =============================================================================
// STATISTICS
// =============================================================================

/// Aggregate outcome counts over a time window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingStats {
    pub window_days: i64,
    pub total: i64,
    pub succeeded: i64,
    pub failed: i64,
    /// Percentage of successful records, 0.0 when empty.
    pub success_rate: f64,
    /// Most frequent error messages, descending by count.
    pub common_errors: Vec<ErrorCount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorCount {
    pub error_message: String,
    pub count: i64,
}

impl ProcessingStats {
    pub fn new(window_days: i64, total: i64, succeeded: i64, common_errors: Vec<ErrorCount>) -> Self {
        let success_rate = if total > 0 {
            succeeded as f64 / total as f64 * 100.0
        } else {
            0.0
        };
        Self {
            window_days,
            total,
            succeeded,
            failed: total - succeeded,
            success_rate,
            common_errors,
        }
    }
}

/// Queue occupancy snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: i64,
    pub leased: i64,
    /// Pending jobs that have failed at least once.
    pub retrying: i64,
    pub dead_lettered: i64,
}
