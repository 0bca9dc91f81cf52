//! Pipeline configuration from environment variables.

use std::path::PathBuf;

use crate::defaults;

/// Settings shared by the bot binary and the pipeline crates.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// PostgreSQL URL. `None` selects the in-memory store.
    pub database_url: Option<String>,
    /// YAML file or directory with provider rules. `None` uses built-in defaults.
    pub providers_path: Option<PathBuf>,
    /// Communities polled for new submissions.
    pub communities: Vec<String>,
    pub max_chunk_length: usize,
    pub fetch_timeout_secs: u64,
    pub max_attempts: i32,
    pub ingest_interval_secs: u64,
    pub stats_window_days: i64,
    pub cleanup_days: i64,
    pub news_domains: Vec<String>,
    pub blocked_domains: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            providers_path: None,
            communities: Vec::new(),
            max_chunk_length: defaults::MAX_CHUNK_LENGTH,
            fetch_timeout_secs: defaults::FETCH_TIMEOUT_SECS,
            max_attempts: defaults::JOB_MAX_ATTEMPTS,
            ingest_interval_secs: defaults::INGEST_INTERVAL_SECS,
            stats_window_days: defaults::STATS_WINDOW_DAYS,
            cleanup_days: defaults::CLEANUP_DAYS,
            news_domains: Vec::new(),
            blocked_domains: Vec::new(),
        }
    }
}

impl PipelineConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `DATABASE_URL` | unset | PostgreSQL URL; unset uses the in-memory store |
    /// | `CANILLITA_PROVIDERS` | unset | Provider rules file or directory |
    /// | `CANILLITA_COMMUNITIES` | empty | Comma-separated communities to poll |
    /// | `CANILLITA_MAX_CHUNK_LENGTH` | `10000` | Characters per delivered message |
    /// | `CANILLITA_FETCH_TIMEOUT_SECS` | `15` | Per-request fetch timeout |
    /// | `CANILLITA_MAX_ATTEMPTS` | `3` | Attempts before dead-lettering |
    /// | `CANILLITA_INGEST_INTERVAL_SECS` | `60` | Submission poll interval |
    /// | `CANILLITA_STATS_WINDOW_DAYS` | `7` | Window for `stats` |
    /// | `CANILLITA_CLEANUP_DAYS` | `30` | Age of records removed by `cleanup` |
    /// | `CANILLITA_NEWS_DOMAINS` | empty | Article allow-list (empty = any) |
    /// | `CANILLITA_BLOCKED_DOMAINS` | empty | Domains never processed |
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            database_url: env_string("DATABASE_URL"),
            providers_path: env_string("CANILLITA_PROVIDERS").map(PathBuf::from),
            communities: env_list("CANILLITA_COMMUNITIES"),
            max_chunk_length: env_parse("CANILLITA_MAX_CHUNK_LENGTH")
                .unwrap_or(defaults.max_chunk_length),
            fetch_timeout_secs: env_parse("CANILLITA_FETCH_TIMEOUT_SECS")
                .unwrap_or(defaults.fetch_timeout_secs),
            max_attempts: env_parse::<i32>("CANILLITA_MAX_ATTEMPTS")
                .unwrap_or(defaults.max_attempts)
                .max(1),
            ingest_interval_secs: env_parse("CANILLITA_INGEST_INTERVAL_SECS")
                .unwrap_or(defaults.ingest_interval_secs),
            stats_window_days: env_parse("CANILLITA_STATS_WINDOW_DAYS")
                .unwrap_or(defaults.stats_window_days),
            cleanup_days: env_parse("CANILLITA_CLEANUP_DAYS").unwrap_or(defaults.cleanup_days),
            news_domains: env_list("CANILLITA_NEWS_DOMAINS"),
            blocked_domains: env_list("CANILLITA_BLOCKED_DOMAINS"),
        }
    }

    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = Some(url.into());
        self
    }

    pub fn with_providers_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.providers_path = Some(path.into());
        self
    }

    pub fn with_max_chunk_length(mut self, len: usize) -> Self {
        self.max_chunk_length = len;
        self
    }

    pub fn with_max_attempts(mut self, attempts: i32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_communities(mut self, communities: Vec<String>) -> Self {
        self.communities = communities;
        self
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env_string(key).and_then(|v| v.parse().ok())
}

/// Split a comma-separated value into trimmed, non-empty items.
pub fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn env_list(key: &str) -> Vec<String> {
    env_string(key).map(|v| parse_list(&v)).unwrap_or_default()
}
