use std::sync::Arc;

use chrono::Utc;
use rand::seq::SliceRandom;
use volt_provider::{LlmMessage, LlmProvider, LlmRequest};
use volt_schema::{iso_timestamp, ChatReply, ChatRequest, ChatStatus, ChatTurn};

pub const ECHO_MODEL: &str = "echo-mode";
pub const DEFAULT_MODEL: &str = "claude-3-sonnet-20240229";
pub const DEFAULT_MAX_TOKENS: u32 = 1000;

const ECHO_REPLIES: &[&str] = &[
    "Hey! I'm in echo mode right now. Add an API key to the chat config to unlock full Volt! ⚡",
    "I hear you! Working in limited mode until a provider is connected. Still here for you though!",
    "Got your message! (Echo mode active: set chat.api_key for full features)",
    "Message received! I'm ready to be your full Volt assistant once a provider is connected ⚡",
];

const FALLBACK_REPLY: &str = "Hey! I'm having a connection hiccup right now. Try again in a moment, \
     or check that my API key is set up correctly. I'm still here for you! - Volt ⚡";

/// A chat request without anything to send.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ValidationError(pub String);

/// Turns a chat request into one provider call and always produces a reply.
#[derive(Clone)]
pub struct ChatRelay {
    provider: Option<Arc<dyn LlmProvider>>,
    model: String,
    system_prompt: Option<String>,
    max_tokens: u32,
}

impl ChatRelay {
    pub fn new(provider: Option<Arc<dyn LlmProvider>>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            system_prompt: None,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    /// Relay without a provider; every reply is an echo.
    pub fn echo() -> Self {
        Self::new(None, DEFAULT_MODEL)
    }

    pub fn with_system_prompt(mut self, prompt: Option<String>) -> Self {
        self.system_prompt = prompt.filter(|p| !p.trim().is_empty());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn is_echo(&self) -> bool {
        self.provider.is_none()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Build the provider request.
    ///
    /// `message` plus `conversationHistory` takes precedence over `messages`.
    /// System turns in `messages` are folded into the system prompt.
    pub fn build_request(&self, request: &ChatRequest) -> Result<LlmRequest, ValidationError> {
        let mut system = self.system_prompt.clone();

        let messages = match request.message.as_deref().filter(|m| !m.trim().is_empty()) {
            Some(message) => {
                let mut turns: Vec<LlmMessage> =
                    request.conversation_history.iter().map(history_turn).collect();
                turns.push(LlmMessage::user(message));
                turns
            }
            None => {
                let mut turns = Vec::new();
                for turn in &request.messages {
                    if turn.role == "system" {
                        if !turn.content.trim().is_empty() {
                            system = Some(match system {
                                Some(existing) => format!("{existing}\n\n{}", turn.content),
                                None => turn.content.clone(),
                            });
                        }
                    } else {
                        turns.push(history_turn(turn));
                    }
                }
                if turns.iter().all(|t| t.content.trim().is_empty()) {
                    turns.clear();
                }
                turns
            }
        };

        if messages.is_empty() {
            return Err(ValidationError("Message is required".to_string()));
        }

        Ok(LlmRequest {
            model: self.model.clone(),
            system,
            messages,
            max_tokens: self.max_tokens,
        })
    }

    pub async fn reply(&self, request: ChatRequest) -> Result<ChatReply, ValidationError> {
        let llm_request = self.build_request(&request)?;
        let conversation_id = request.conversation_id.filter(|id| !id.is_empty());

        let Some(provider) = &self.provider else {
            let text = ECHO_REPLIES
                .choose(&mut rand::thread_rng())
                .copied()
                .unwrap_or(ECHO_REPLIES[0]);
            tracing::info!("chat relay answered in echo mode");
            return Ok(ChatReply {
                status: ChatStatus::Echo,
                response: text.to_string(),
                model: ECHO_MODEL.to_string(),
                timestamp: iso_timestamp(Utc::now()),
                conversation_id,
                error: None,
            });
        };

        let outcome = match provider.chat(llm_request).await {
            Ok(resp) if !resp.text.trim().is_empty() => Ok(resp.text),
            Ok(_) => Err("empty reply from provider".to_string()),
            Err(e) => Err(format!("{e:#}")),
        };

        let reply = match outcome {
            Ok(text) => ChatReply {
                status: ChatStatus::Success,
                response: text,
                model: self.model.clone(),
                timestamp: iso_timestamp(Utc::now()),
                conversation_id,
                error: None,
            },
            Err(error) => {
                tracing::warn!("chat provider failed, sending fallback reply: {error}");
                ChatReply {
                    status: ChatStatus::Fallback,
                    response: FALLBACK_REPLY.to_string(),
                    model: self.model.clone(),
                    timestamp: iso_timestamp(Utc::now()),
                    conversation_id,
                    error: Some(error),
                }
            }
        };
        Ok(reply)
    }
}

fn history_turn(turn: &ChatTurn) -> LlmMessage {
    if turn.role == "user" {
        LlmMessage::user(turn.content.clone())
    } else {
        LlmMessage::assistant(turn.content.clone())
    }
}
