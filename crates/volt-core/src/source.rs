use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use volt_schema::{Conversation, ConversationId, ConversationSummary, Message, Role};

use crate::decode::decode;
use crate::normalize::Normalizer;

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Where conversation data for the read endpoints comes from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConversationSource {
    #[default]
    None,
    File(PathBuf),
    Url(String),
}

impl ConversationSource {
    /// `http(s)://` values are URLs; anything else is a path relative to `root`.
    pub fn from_setting(raw: Option<&str>, root: &Path) -> Self {
        match raw.map(str::trim).filter(|s| !s.is_empty()) {
            None => Self::None,
            Some(s) if s.starts_with("http://") || s.starts_with("https://") => {
                Self::Url(s.to_string())
            }
            Some(s) => Self::File(root.join(s)),
        }
    }

    /// Load and normalize, degrading to the sample library on any failure.
    pub async fn load(&self) -> ConversationLibrary {
        match self.try_load().await {
            Ok(Some(library)) => library,
            Ok(None) => ConversationLibrary::sample(),
            Err(e) => {
                tracing::warn!("conversation source unavailable, serving sample: {e:#}");
                ConversationLibrary::sample()
            }
        }
    }

    pub async fn try_load(&self) -> Result<Option<ConversationLibrary>> {
        let text = match self {
            Self::None => return Ok(None),
            Self::File(path) => tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("failed to read {}", path.display()))?,
            Self::Url(url) => fetch_text(url).await?,
        };

        let decoded = decode(&text)?;
        let normalized = Normalizer::new().normalize_decoded(&decoded);
        tracing::debug!(
            shape = normalized.shape.as_str(),
            count = normalized.conversations.len(),
            "loaded conversations"
        );
        Ok(Some(ConversationLibrary::new(normalized.conversations)))
    }
}

async fn fetch_text(url: &str) -> Result<String> {
    let client = reqwest::Client::builder().timeout(FETCH_TIMEOUT).build()?;
    let resp = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("failed to fetch {url}"))?
        .error_for_status()?;
    Ok(resp.text().await?)
}

/// Normalized conversations served by the read endpoints.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationLibrary {
    conversations: Vec<Conversation>,
    sample: bool,
}

impl ConversationLibrary {
    pub fn new(conversations: Vec<Conversation>) -> Self {
        Self {
            conversations,
            sample: false,
        }
    }

    /// Placeholder shown when no source data is available.
    pub fn sample() -> Self {
        let now = Utc::now().timestamp_millis();
        Self {
            conversations: vec![Conversation {
                id: ConversationId::from("sample"),
                title: "Welcome to Volt".to_string(),
                created: now,
                messages: vec![Message {
                    role: Role::Assistant,
                    content: "Hey! I'm Volt. Import a chat export to see your conversations here."
                        .to_string(),
                    ts: now,
                }],
            }],
            sample: true,
        }
    }

    pub fn is_sample(&self) -> bool {
        self.sample
    }

    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn find(&self, id: &str) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.id.matches(id))
    }

    /// Case-insensitive substring search; an empty query matches everything.
    pub fn search(&self, query: &str) -> Vec<&Conversation> {
        let needle = query.trim().to_lowercase();
        self.conversations
            .iter()
            .filter(|c| c.mentions(&needle))
            .collect()
    }

    pub fn summaries(&self, query: &str) -> Vec<ConversationSummary> {
        self.search(query).into_iter().map(Conversation::summary).collect()
    }
}
