//! Provider rule engine.
//!
//! Rules are compiled once at load time: selectors are parsed, regexes are
//! built, thresholds are validated. An invalid rule set fails the whole load.
//! Lookups are longest-suffix matches on the URL's host, falling back to the
//! default rule.

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::{Arc, RwLock};

use regex::{Regex, RegexBuilder};
use scraper::Selector;
use serde::Deserialize;
use tracing::{debug, info};

use canillita_core::{domain_matches, domain_of, Error, ProviderRule, Result};

/// A validated provider rule with its selectors and patterns compiled.
#[derive(Debug)]
pub struct Provider {
    rule: ProviderRule,
    content_selectors: Vec<Selector>,
    remove_selectors: Vec<Selector>,
    title_selector: Option<Selector>,
    title_cleanup: Vec<Regex>,
    cleanup: Vec<Regex>,
    reject: Vec<Regex>,
}

fn parse_selector(provider: &str, raw: &str) -> Result<Selector> {
    Selector::parse(raw).map_err(|e| {
        Error::Config(format!(
            "provider '{}': invalid selector '{}': {:?}",
            provider, raw, e
        ))
    })
}

fn compile_pattern(provider: &str, raw: &str) -> Result<Regex> {
    RegexBuilder::new(raw)
        .case_insensitive(true)
        .multi_line(true)
        .build()
        .map_err(|e| {
            Error::Config(format!(
                "provider '{}': invalid pattern '{}': {}",
                provider, raw, e
            ))
        })
}

impl Provider {
    /// Validate and compile a rule.
    pub fn compile(rule: ProviderRule, is_default: bool) -> Result<Self> {
        rule.validate(is_default)?;
        let name = rule.display_name().to_string();

        let content_selectors = rule
            .content_selectors
            .iter()
            .filter(|s| !s.trim().is_empty())
            .map(|s| parse_selector(&name, s))
            .collect::<Result<Vec<_>>>()?;
        let remove_selectors = rule
            .remove_selectors
            .iter()
            .map(|s| parse_selector(&name, s))
            .collect::<Result<Vec<_>>>()?;
        let title_selector = rule
            .title_selector
            .as_deref()
            .map(|s| parse_selector(&name, s))
            .transpose()?;
        let compile_all = |patterns: &[String]| {
            patterns
                .iter()
                .map(|p| compile_pattern(&name, p))
                .collect::<Result<Vec<_>>>()
        };

        Ok(Self {
            title_cleanup: compile_all(&rule.title_cleanup_patterns)?,
            cleanup: compile_all(&rule.cleanup_patterns)?,
            reject: compile_all(&rule.reject_patterns)?,
            content_selectors,
            remove_selectors,
            title_selector,
            rule,
        })
    }

    pub fn rule(&self) -> &ProviderRule {
        &self.rule
    }

    pub fn name(&self) -> &str {
        self.rule.display_name()
    }

    pub fn content_selectors(&self) -> &[Selector] {
        &self.content_selectors
    }

    pub fn remove_selectors(&self) -> &[Selector] {
        &self.remove_selectors
    }

    pub fn title_selector(&self) -> Option<&Selector> {
        self.title_selector.as_ref()
    }

    /// Strip title cleanup patterns and surrounding whitespace.
    pub fn clean_title(&self, title: &str) -> String {
        let mut title = title.to_string();
        for pattern in &self.title_cleanup {
            title = pattern.replace_all(&title, "").into_owned();
        }
        title.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// Strip paragraph cleanup patterns.
    pub fn clean_paragraph(&self, paragraph: &str) -> String {
        let mut text = paragraph.to_string();
        for pattern in &self.cleanup {
            text = pattern.replace_all(&text, "").into_owned();
        }
        text.trim().to_string()
    }

    /// The first reject pattern found in `text`, if any.
    pub fn rejected_by(&self, text: &str) -> Option<&str> {
        self.reject
            .iter()
            .find(|p| p.is_match(text))
            .map(|p| p.as_str())
    }

    fn pattern_len(&self) -> usize {
        self.rule
            .domain_pattern
            .trim()
            .trim_start_matches("*.")
            .trim_start_matches("www.")
            .len()
    }
}

/// On-disk shape of a single provider file.
#[derive(Debug, Default, Deserialize)]
struct ProviderFile {
    #[serde(default)]
    default: Option<ProviderRule>,
    #[serde(default)]
    providers: Vec<ProviderRule>,
}

/// An immutable, validated rule set.
#[derive(Debug)]
pub struct ProviderRegistry {
    default: Provider,
    providers: Vec<Provider>,
}

impl ProviderRegistry {
    /// Build a registry, validating every rule.
    ///
    /// Duplicate domain patterns are rejected.
    pub fn new(default: ProviderRule, rules: Vec<ProviderRule>) -> Result<Self> {
        let default = Provider::compile(default, true)?;
        let mut seen = HashSet::new();
        let mut providers = Vec::with_capacity(rules.len());
        for rule in rules {
            let key = rule.domain_pattern.trim().to_ascii_lowercase();
            if !seen.insert(key.clone()) {
                return Err(Error::Config(format!(
                    "duplicate provider for domain '{}'",
                    key
                )));
            }
            providers.push(Provider::compile(rule, false)?);
        }
        Ok(Self { default, providers })
    }

    /// Registry with only the built-in default rule.
    pub fn with_defaults() -> Self {
        Self {
            default: default_provider(),
            providers: Vec::new(),
        }
    }

    /// Load from a YAML file (`default:` + `providers:`) or a directory of
    /// one-rule YAML files where `default.yaml` is the default rule.
    pub fn load(path: &Path) -> Result<Self> {
        let registry = if path.is_dir() {
            Self::load_dir(path)?
        } else {
            Self::load_file(path)?
        };
        info!(
            subsystem = "extract",
            component = "providers",
            op = "load",
            path = %path.display(),
            provider_count = registry.len(),
            "Provider rules loaded"
        );
        Ok(registry)
    }

    pub fn load_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_yaml(&text)
    }

    /// Parse the single-file layout.
    pub fn from_yaml(text: &str) -> Result<Self> {
        let file: ProviderFile = serde_yaml::from_str(text)?;
        let default = file.default.unwrap_or_else(ProviderRule::default_rule);
        Self::new(default, file.providers)
    }

    pub fn load_dir(dir: &Path) -> Result<Self> {
        let mut paths = fs::read_dir(dir)?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<std::io::Result<Vec<_>>>()?;
        paths.retain(|p| {
            p.is_file()
                && matches!(
                    p.extension().and_then(|e| e.to_str()),
                    Some("yaml") | Some("yml")
                )
        });
        paths.sort();

        let mut default = None;
        let mut rules = Vec::new();
        for path in paths {
            let stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default()
                .to_string();
            let text = fs::read_to_string(&path)?;
            let mut rule: ProviderRule = serde_yaml::from_str(&text).map_err(|e| {
                Error::Config(format!("{}: {}", path.display(), e))
            })?;
            if stem == canillita_core::defaults::DEFAULT_PROVIDER_NAME {
                if rule.name.is_empty() {
                    rule.name = stem;
                }
                default = Some(rule);
                continue;
            }
            if rule.domain_pattern.trim().is_empty() {
                rule.domain_pattern = stem.clone();
            }
            if rule.name.is_empty() {
                rule.name = stem;
            }
            debug!(
                subsystem = "extract",
                component = "providers",
                provider = %rule.display_name(),
                "Read provider rule"
            );
            rules.push(rule);
        }

        Self::new(default.unwrap_or_else(ProviderRule::default_rule), rules)
    }

    /// Best rule for a URL: longest matching domain pattern, else the default.
    pub fn resolve(&self, url: &str) -> &Provider {
        match domain_of(url) {
            Some(host) => self.resolve_host(&host),
            None => &self.default,
        }
    }

    pub fn resolve_host(&self, host: &str) -> &Provider {
        let mut best: Option<&Provider> = None;
        for provider in &self.providers {
            if domain_matches(host, &provider.rule.domain_pattern)
                && best.map_or(true, |b| provider.pattern_len() > b.pattern_len())
            {
                best = Some(provider);
            }
        }
        best.unwrap_or(&self.default)
    }

    pub fn default_provider(&self) -> &Provider {
        &self.default
    }

    pub fn providers(&self) -> impl Iterator<Item = &Provider> {
        self.providers.iter()
    }

    /// Number of domain-specific providers.
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

fn default_provider() -> Provider {
    let rule = ProviderRule::default_rule();
    let parse = |list: &[String]| {
        list.iter()
            .filter_map(|s| Selector::parse(s).ok())
            .collect::<Vec<_>>()
    };
    Provider {
        content_selectors: parse(&rule.content_selectors),
        remove_selectors: parse(&rule.remove_selectors),
        title_selector: None,
        title_cleanup: Vec::new(),
        cleanup: Vec::new(),
        reject: Vec::new(),
        rule,
    }
}

/// Shared holder for the active rule set.
///
/// Readers take an `Arc` snapshot, so a reload never changes the rules an
/// in-flight extraction is using.
#[derive(Debug, Default)]
pub struct ProviderStore {
    current: RwLock<Arc<ProviderRegistry>>,
}

impl ProviderStore {
    pub fn new(registry: ProviderRegistry) -> Self {
        Self {
            current: RwLock::new(Arc::new(registry)),
        }
    }

    pub fn snapshot(&self) -> Arc<ProviderRegistry> {
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn replace(&self, registry: ProviderRegistry) {
        let registry = Arc::new(registry);
        match self.current.write() {
            Ok(mut guard) => *guard = registry,
            Err(poisoned) => *poisoned.into_inner() = registry,
        }
    }

    /// Load and swap in a new rule set; the old one stays active on error.
    pub fn reload(&self, path: &Path) -> Result<usize> {
        let registry = ProviderRegistry::load(path)?;
        let count = registry.len();
        self.replace(registry);
        Ok(count)
    }
}
