use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

// ============================================================
// Canonical conversation model
// ============================================================

/// Conversation identifier as found in the source data.
///
/// Exports use either numeric or string ids; both are kept as-is so the
/// value round-trips to the client unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConversationId {
    Int(i64),
    Text(String),
}

impl ConversationId {
    /// Match against an id coming from a query string.
    pub fn matches(&self, raw: &str) -> bool {
        match self {
            Self::Int(n) => raw.trim().parse::<i64>().map(|v| v == *n).unwrap_or(false),
            Self::Text(s) => s == raw,
        }
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for ConversationId {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<usize> for ConversationId {
    fn from(value: usize) -> Self {
        Self::Int(value as i64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    /// Lenient role parsing: anything unrecognized is attributed to the user.
    pub fn parse_lenient(raw: &str) -> Self {
        Self::parse_strict(raw).unwrap_or(Self::User)
    }

    pub fn parse_strict(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            "system" => Some(Self::System),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// Epoch milliseconds.
    pub ts: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub title: String,
    /// Epoch milliseconds.
    pub created: i64,
    pub messages: Vec<Message>,
}

impl Conversation {
    pub fn summary(&self) -> ConversationSummary {
        ConversationSummary {
            id: self.id.clone(),
            title: self.title.clone(),
            created: self.created,
            count: self.messages.len(),
        }
    }

    /// Case-insensitive substring match on the title or any message body.
    /// `needle` must already be lower-cased.
    pub fn mentions(&self, needle: &str) -> bool {
        if needle.is_empty() {
            return true;
        }
        self.title.to_lowercase().contains(needle)
            || self
                .messages
                .iter()
                .any(|m| m.content.to_lowercase().contains(needle))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: ConversationId,
    pub title: String,
    pub created: i64,
    pub count: usize,
}

// ============================================================
// Persisted memory records
// ============================================================

pub const DEFAULT_CATEGORY: &str = "general";
pub const DEFAULT_IMPORTANCE: &str = "medium";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MemoryRecord {
    Context {
        #[serde(rename = "savedAt")]
        saved_at: String,
        content: String,
    },
    Conversation {
        #[serde(rename = "savedAt")]
        saved_at: String,
        title: String,
        content: String,
        category: String,
        importance: String,
        #[serde(default)]
        tags: Vec<String>,
    },
}

impl MemoryRecord {
    pub fn saved_at(&self) -> &str {
        match self {
            Self::Context { saved_at, .. } | Self::Conversation { saved_at, .. } => saved_at,
        }
    }

    pub fn content(&self) -> &str {
        match self {
            Self::Context { content, .. } | Self::Conversation { content, .. } => content,
        }
    }
}

/// One row of a key-value listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KvEntry {
    pub key: String,
    pub size: u64,
}

/// Body of `POST /api/memory` with `type: "conversation"`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SaveConversationRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub importance: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

// ============================================================
// Chat wire types
// ============================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub conversation_history: Vec<ChatTurn>,
    #[serde(default)]
    pub messages: Vec<ChatTurn>,
    #[serde(default)]
    pub conversation_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatStatus {
    Success,
    Echo,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatReply {
    pub status: ChatStatus,
    pub response: String,
    pub model: String,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// ISO-8601 with millisecond precision, `Z` suffix.
pub fn iso_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}
