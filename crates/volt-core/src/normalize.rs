//! Conversion of heterogeneous chat-export JSON into [`Conversation`]s.
//!
//! Shape detection walks [`MATCHERS`] in order and the first guard that
//! accepts the input decides how it is read. The last matcher accepts
//! everything, so normalization never fails once the text has decoded.

use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value};
use volt_schema::{Conversation, ConversationId, Message, Role};

use crate::decode::Decoded;
use crate::timestamp::to_epoch;

pub const RAW_IMPORT_ID: &str = "raw-import";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum InputShape {
    /// Array of pre-shaped `{id?, title?, messages}` objects.
    ConversationList,
    /// `{conversations: [...]}` archive, entries with a `mapping` graph or `messages`.
    ExportArchive,
    /// One archive entry on its own.
    SingleConversation,
    /// Newline-delimited JSON, one archive entry per line.
    Ndjson,
    Unrecognized,
}

impl InputShape {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConversationList => "conversation-list",
            Self::ExportArchive => "export-archive",
            Self::SingleConversation => "single-conversation",
            Self::Ndjson => "ndjson",
            Self::Unrecognized => "unrecognized",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Normalized {
    pub shape: InputShape,
    pub conversations: Vec<Conversation>,
}

struct Matcher {
    shape: InputShape,
    guard: fn(&Value) -> bool,
    read: fn(&Normalizer, &Value) -> Vec<Conversation>,
}

const MATCHERS: &[Matcher] = &[
    Matcher {
        shape: InputShape::ConversationList,
        guard: is_conversation_list,
        read: Normalizer::read_conversation_list,
    },
    Matcher {
        shape: InputShape::ExportArchive,
        guard: is_export_archive,
        read: Normalizer::read_export_archive,
    },
    Matcher {
        shape: InputShape::SingleConversation,
        guard: is_single_conversation,
        read: Normalizer::read_single_conversation,
    },
    Matcher {
        shape: InputShape::Unrecognized,
        guard: accepts_anything,
        read: Normalizer::read_unrecognized,
    },
];

fn accepts_anything(_: &Value) -> bool {
    true
}

fn is_conversation_list(input: &Value) -> bool {
    input
        .as_array()
        .and_then(|items| items.first())
        .and_then(Value::as_object)
        .is_some_and(|first| first.contains_key("messages"))
}

fn is_export_archive(input: &Value) -> bool {
    input.get("conversations").is_some_and(Value::is_array)
}

fn is_single_conversation(input: &Value) -> bool {
    input.get("mapping").is_some_and(Value::is_object)
        || input.get("messages").is_some_and(Value::is_array)
}

/// Normalization with a captured clock.
///
/// Output depends only on the input and `now_ms`, apart from the ids
/// generated for archive entries that carry none.
#[derive(Debug, Clone, Copy)]
pub struct Normalizer {
    now_ms: i64,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Normalizer {
    pub fn new() -> Self {
        Self::at(Utc::now().timestamp_millis())
    }

    pub fn at(now_ms: i64) -> Self {
        Self { now_ms }
    }

    pub fn normalize(&self, input: &Value) -> Normalized {
        for matcher in MATCHERS {
            if (matcher.guard)(input) {
                let conversations = (matcher.read)(self, input);
                tracing::debug!(
                    shape = matcher.shape.as_str(),
                    count = conversations.len(),
                    "normalized input"
                );
                return Normalized {
                    shape: matcher.shape,
                    conversations,
                };
            }
        }
        // The last matcher accepts everything.
        Normalized {
            shape: InputShape::Unrecognized,
            conversations: self.read_unrecognized(input),
        }
    }

    pub fn normalize_decoded(&self, decoded: &Decoded) -> Normalized {
        match decoded {
            Decoded::Document(value) => self.normalize(value),
            Decoded::Lines(lines) => Normalized {
                shape: InputShape::Ndjson,
                conversations: lines
                    .iter()
                    .enumerate()
                    .map(|(index, line)| self.read_archive_entry(index, line))
                    .collect(),
            },
        }
    }

    fn read_conversation_list(&self, input: &Value) -> Vec<Conversation> {
        let Some(items) = input.as_array() else {
            return Vec::new();
        };
        items
            .iter()
            .enumerate()
            .filter_map(|(index, item)| {
                let obj = item.as_object()?;
                let created = first_epoch(obj, &["created", "create_time"]);
                Some(Conversation {
                    id: read_id(obj, &["id"]).unwrap_or_else(|| ConversationId::from(index)),
                    title: read_title(obj, index),
                    created: created.unwrap_or(self.now_ms),
                    messages: self.read_messages(obj.get("messages"), created),
                })
            })
            .collect()
    }

    fn read_export_archive(&self, input: &Value) -> Vec<Conversation> {
        input
            .get("conversations")
            .and_then(Value::as_array)
            .map(|entries| {
                entries
                    .iter()
                    .enumerate()
                    .map(|(index, entry)| self.read_archive_entry(index, entry))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn read_single_conversation(&self, input: &Value) -> Vec<Conversation> {
        vec![self.read_archive_entry(0, input)]
    }

    fn read_unrecognized(&self, input: &Value) -> Vec<Conversation> {
        let messages = match input {
            Value::Array(_) => self.read_messages(Some(input), None),
            other => vec![Message {
                role: Role::System,
                content: format!("Raw import of unrecognized {} input", kind_of(other)),
                ts: self.now_ms,
            }],
        };
        vec![Conversation {
            id: ConversationId::from(RAW_IMPORT_ID),
            title: "Raw import".to_string(),
            created: self.now_ms,
            messages,
        }]
    }

    /// One archive entry. The `mapping` graph takes precedence over a
    /// direct `messages` list when both are present.
    fn read_archive_entry(&self, index: usize, entry: &Value) -> Conversation {
        let empty = Map::new();
        let obj = entry.as_object().unwrap_or(&empty);
        let created = first_epoch(obj, &["create_time", "created", "created_at"]);

        let messages = match obj.get("mapping").and_then(Value::as_object) {
            Some(mapping) => self.read_mapping(mapping, created),
            None => self.read_messages(obj.get("messages"), created),
        };

        Conversation {
            id: read_id(obj, &["id", "conversation_id"])
                .unwrap_or_else(|| ConversationId::Text(uuid::Uuid::new_v4().to_string())),
            title: read_title(obj, index),
            created: created.unwrap_or(self.now_ms),
            messages,
        }
    }

    fn read_mapping(&self, mapping: &Map<String, Value>, created: Option<i64>) -> Vec<Message> {
        let mut messages: Vec<Message> = mapping
            .values()
            .filter_map(|node| {
                let message = node.get("message")?.as_object()?;
                let role = message
                    .get("author")
                    .and_then(|a| a.get("role"))
                    .or_else(|| message.get("role"))
                    .and_then(Value::as_str)
                    .and_then(Role::parse_strict)
                    .filter(|r| matches!(r, Role::User | Role::Assistant))?;
                let content = extract_text(message.get("content")?, "\n")?;
                let ts = first_epoch(message, &["create_time", "update_time"])
                    .or_else(|| node.get("create_time").and_then(to_epoch))
                    .or(created)
                    .unwrap_or(self.now_ms);
                Some(Message { role, content, ts })
            })
            .collect();
        messages.sort_by_key(|m| m.ts);
        messages
    }

    /// A flat message list. Malformed items are skipped.
    fn read_messages(&self, raw: Option<&Value>, created: Option<i64>) -> Vec<Message> {
        let Some(items) = raw.and_then(Value::as_array) else {
            return Vec::new();
        };
        let fallback_ts = created.unwrap_or(self.now_ms);

        let mut messages: Vec<Message> = items
            .iter()
            .filter_map(|item| match item {
                Value::String(text) => Some(Message {
                    role: Role::User,
                    content: text.clone(),
                    ts: fallback_ts,
                }),
                Value::Object(obj) => {
                    let role = obj
                        .get("role")
                        .or_else(|| obj.get("author").and_then(|a| a.get("role")))
                        .and_then(Value::as_str)
                        .map(Role::parse_lenient)
                        .unwrap_or(Role::User);
                    let content = obj
                        .get("content")
                        .or_else(|| obj.get("text"))
                        .and_then(|c| extract_text(c, ""))?;
                    let ts = first_epoch(obj, &["ts", "timestamp", "create_time", "created_at"])
                        .unwrap_or(fallback_ts);
                    Some(Message { role, content, ts })
                }
                _ => None,
            })
            .collect();
        messages.sort_by_key(|m| m.ts);
        messages
    }
}

/// Normalize with the current wall clock.
pub fn normalize(input: &Value) -> Normalized {
    Normalizer::new().normalize(input)
}

/// Text from one of the content shapes found in exports: a raw string, a
/// `{parts: [...]}` object (newline-joined), a `{text}` object, or a list of
/// fragments joined with `array_sep`.
fn extract_text(content: &Value, array_sep: &str) -> Option<String> {
    match content {
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => Some(join_fragments(items, array_sep)),
        Value::Object(obj) => {
            if let Some(parts) = obj.get("parts").and_then(Value::as_array) {
                Some(join_fragments(parts, "\n"))
            } else {
                obj.get("text").and_then(Value::as_str).map(str::to_string)
            }
        }
        _ => None,
    }
}

fn join_fragments(items: &[Value], sep: &str) -> String {
    items
        .iter()
        .filter_map(|item| match item {
            Value::String(s) => Some(s.as_str()),
            Value::Object(obj) => obj.get("text").and_then(Value::as_str),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join(sep)
}

fn first_epoch(obj: &Map<String, Value>, fields: &[&str]) -> Option<i64> {
    fields.iter().find_map(|f| obj.get(*f).and_then(to_epoch))
}

fn read_id(obj: &Map<String, Value>, fields: &[&str]) -> Option<ConversationId> {
    fields.iter().find_map(|f| match obj.get(*f)? {
        Value::String(s) if !s.trim().is_empty() => Some(ConversationId::Text(s.clone())),
        Value::Number(n) => n.as_i64().map(ConversationId::Int),
        _ => None,
    })
}

fn read_title(obj: &Map<String, Value>, index: usize) -> String {
    obj.get("title")
        .and_then(Value::as_str)
        .filter(|t| !t.trim().is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("Conversation {}", index + 1))
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
