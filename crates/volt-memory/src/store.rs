use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use volt_schema::{
    iso_timestamp, KvEntry, MemoryRecord, SaveConversationRequest, DEFAULT_CATEGORY,
    DEFAULT_IMPORTANCE,
};

use crate::backend::KvBackend;
use crate::error::MemoryError;

pub const LATEST_CONTEXT_KEY: &str = "context/latest.json";
const CONVERSATION_PREFIX: &str = "conversations/";
const SLUG_MAX_CHARS: usize = 60;
const RECENT_CONVERSATIONS: usize = 3;
const PREVIEW_CHARS: usize = 150;

/// Last millisecond stamp handed out for a versioned key in this process.
static LAST_KEY_MILLIS: AtomicI64 = AtomicI64::new(0);

/// Result of a successful save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ack {
    /// The versioned key that was written.
    pub key: String,
}

/// Key layout and write pattern over an injected key-value backend.
#[derive(Clone)]
pub struct MemoryStore {
    backend: Arc<dyn KvBackend>,
}

impl MemoryStore {
    pub fn new(backend: Arc<dyn KvBackend>) -> Self {
        Self { backend }
    }

    pub async fn save_context(&self, content: &str) -> Result<Ack, MemoryError> {
        if content.trim().is_empty() {
            return Err(MemoryError::Validation("Content is required".into()));
        }

        let now = Utc::now();
        let record = MemoryRecord::Context {
            saved_at: iso_timestamp(now),
            content: content.to_string(),
        };
        let payload = encode(&record)?;
        let key = self
            .reserve_key(now.timestamp_millis(), |millis| {
                format!("context/{millis}.json")
            })
            .await?;
        let metadata = Some(serde_json::json!({ "type": "context" }));

        self.backend
            .set(&key, &payload, metadata.clone())
            .await
            .map_err(MemoryError::store)?;
        self.backend
            .set(LATEST_CONTEXT_KEY, &payload, metadata)
            .await
            .map_err(MemoryError::store)?;

        tracing::info!(key = %key, "saved context");
        Ok(Ack { key })
    }

    pub async fn fetch_latest_context(&self) -> Result<Option<MemoryRecord>, MemoryError> {
        self.read_record(LATEST_CONTEXT_KEY).await
    }

    pub async fn save_conversation(
        &self,
        request: SaveConversationRequest,
    ) -> Result<Ack, MemoryError> {
        if request.title.trim().is_empty() {
            return Err(MemoryError::Validation("Title is required".into()));
        }
        if request.content.trim().is_empty() {
            return Err(MemoryError::Validation("Content is required".into()));
        }

        let now = Utc::now();
        let slug = slugify(&request.title);
        let key = self
            .reserve_key(now.timestamp_millis(), |millis| {
                conversation_key(millis, &slug)
            })
            .await?;
        let record = MemoryRecord::Conversation {
            saved_at: iso_timestamp(now),
            title: request.title,
            content: request.content,
            category: non_blank_or(request.category, DEFAULT_CATEGORY),
            importance: non_blank_or(request.importance, DEFAULT_IMPORTANCE),
            tags: request.tags.unwrap_or_default(),
        };
        let payload = encode(&record)?;

        self.backend
            .set(
                &key,
                &payload,
                Some(serde_json::json!({ "type": "conversation" })),
            )
            .await
            .map_err(MemoryError::store)?;

        tracing::info!(key = %key, "saved conversation");
        Ok(Ack { key })
    }

    pub async fn list_entries(&self) -> Result<Vec<KvEntry>, MemoryError> {
        self.backend.list().await.map_err(MemoryError::store)
    }

    /// Build a context-restoration prompt from the latest context and the
    /// most recent saved conversations.
    pub async fn generate_context(&self) -> Result<String, MemoryError> {
        let latest = self.fetch_latest_context().await?;

        let mut keys: Vec<String> = self
            .list_entries()
            .await?
            .into_iter()
            .map(|e| e.key)
            .filter(|k| k.starts_with(CONVERSATION_PREFIX))
            .collect();
        keys.sort();
        let start = keys.len().saturating_sub(RECENT_CONVERSATIONS);

        let mut recent = Vec::new();
        for key in &keys[start..] {
            let Some(raw) = self.backend.get(key).await.map_err(MemoryError::store)? else {
                continue;
            };
            match serde_json::from_str::<MemoryRecord>(&raw) {
                Ok(record) => recent.push(record),
                Err(e) => tracing::warn!(key = %key, "skipping unreadable conversation record: {e}"),
            }
        }

        Ok(render_context_prompt(latest.as_ref(), &recent))
    }

    /// Pick the first free versioned key at or after `millis`. Stamps are
    /// strictly increasing within the process, and a key already present in
    /// the backend (another writer) pushes the stamp forward.
    async fn reserve_key(
        &self,
        millis: i64,
        key_for: impl Fn(i64) -> String,
    ) -> Result<String, MemoryError> {
        let mut stamp = next_key_millis(millis);
        loop {
            let key = key_for(stamp);
            let taken = self
                .backend
                .get(&key)
                .await
                .map_err(MemoryError::store)?
                .is_some();
            if !taken {
                return Ok(key);
            }
            tracing::debug!(key = %key, "versioned key taken, bumping stamp");
            stamp = next_key_millis(stamp + 1);
        }
    }

    async fn read_record(&self, key: &str) -> Result<Option<MemoryRecord>, MemoryError> {
        let Some(raw) = self.backend.get(key).await.map_err(MemoryError::store)? else {
            return Ok(None);
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| MemoryError::Store(format!("invalid record at {key}: {e}")))
    }
}

fn encode(record: &MemoryRecord) -> Result<String, MemoryError> {
    serde_json::to_string(record).map_err(MemoryError::store)
}

fn non_blank_or(value: Option<String>, default: &str) -> String {
    value
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn next_key_millis(now_millis: i64) -> i64 {
    let previous = match LAST_KEY_MILLIS.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
        Some(now_millis.max(last + 1))
    }) {
        Ok(last) | Err(last) => last,
    };
    now_millis.max(previous + 1)
}

fn conversation_key(millis: i64, slug: &str) -> String {
    format!("{CONVERSATION_PREFIX}{millis}-{slug}.json")
}

/// Key-safe form of a title: lower-case ASCII alphanumerics separated by
/// single hyphens, at most 60 characters, `untitled` when nothing remains.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_hyphen = false;
    for c in title.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(c);
        } else {
            pending_hyphen = true;
        }
    }

    let slug: String = slug.chars().take(SLUG_MAX_CHARS).collect();
    if slug.is_empty() {
        "untitled".to_string()
    } else {
        slug
    }
}

fn render_context_prompt(latest: Option<&MemoryRecord>, recent: &[MemoryRecord]) -> String {
    let mut prompt = String::from("=== CONTEXT RESTORATION ===\n\n");

    if let Some(record) = latest {
        prompt.push_str("CONTEXT SUMMARY:\n");
        prompt.push_str(record.content());
        prompt.push_str("\n\n");
    }

    if !recent.is_empty() {
        prompt.push_str("RECENT CONVERSATIONS:\n");
        for (index, record) in recent.iter().enumerate() {
            let title = match record {
                MemoryRecord::Conversation { title, .. } => title.as_str(),
                MemoryRecord::Context { .. } => "Context",
            };
            let date = record.saved_at().split('T').next().unwrap_or_default();
            let preview: String = record.content().chars().take(PREVIEW_CHARS).collect();
            prompt.push_str(&format!("{}. [{date}] {title}\n", index + 1));
            prompt.push_str(&format!("   {preview}...\n\n"));
        }
    }

    prompt.push_str(
        "Please acknowledge this context and continue our conversation as if no reset occurred.",
    );
    prompt
}
