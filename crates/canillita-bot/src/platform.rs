//! Local platform client: submissions from a JSON file, replies to stdout.

use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::{debug, warn};

use canillita_core::{Error, PlatformClient, Result, Submission};

/// One reply written by [`FilePlatform::submit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalReply {
    pub id: String,
    pub parent_id: String,
    pub body: String,
}

/// Reads a JSON array of submissions on every poll and prints replies.
pub struct FilePlatform {
    submissions: Option<PathBuf>,
    echo: bool,
    replies: Mutex<Vec<LocalReply>>,
}

impl FilePlatform {
    pub fn new(submissions: Option<PathBuf>) -> Self {
        Self {
            submissions,
            echo: true,
            replies: Mutex::new(Vec::new()),
        }
    }

    /// Keep replies in memory only.
    pub fn quiet(mut self) -> Self {
        self.echo = false;
        self
    }

    pub fn replies(&self) -> Vec<LocalReply> {
        match self.replies.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl PlatformClient for FilePlatform {
    async fn fetch_new_submissions(&self, communities: &[String]) -> Result<Vec<Submission>> {
        let Some(path) = &self.submissions else {
            return Ok(Vec::new());
        };
        let text = tokio::fs::read_to_string(path).await?;
        let all: Vec<Submission> = serde_json::from_str(&text)?;
        let total = all.len();
        let selected: Vec<Submission> = all
            .into_iter()
            .filter(|s| match (&s.community, communities.is_empty()) {
                (_, true) | (None, _) => true,
                (Some(c), false) => communities.iter().any(|wanted| wanted.eq_ignore_ascii_case(c)),
            })
            .collect();
        debug!(
            path = %path.display(),
            total,
            selected = selected.len(),
            "Submissions file read"
        );
        Ok(selected)
    }

    async fn submit(&self, parent_id: &str, body: &str) -> Result<String> {
        let mut replies = self
            .replies
            .lock()
            .map_err(|_| Error::Internal("reply log poisoned".to_string()))?;
        let id = format!("local_{}", replies.len() + 1);
        if self.echo {
            println!("=== {} (en respuesta a {}) ===\n{}\n", id, parent_id, body);
        }
        if body.trim().is_empty() {
            warn!(parent_id, "Empty reply body submitted");
        }
        replies.push(LocalReply {
            id: id.clone(),
            parent_id: parent_id.to_string(),
            body: body.to_string(),
        });
        Ok(id)
    }
}
