pub mod anthropic;
pub mod openai;
pub mod types;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

pub use anthropic::AnthropicProvider;
pub use openai::OpenAiProvider;
pub use types::*;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn chat(&self, request: LlmRequest) -> Result<LlmResponse>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProviderErrorKind {
    RateLimit,
    ServerError,
    Timeout,
    AuthError,
    InvalidRequest,
    Unknown,
}

impl ProviderErrorKind {
    pub fn from_status(status: StatusCode) -> Self {
        match status.as_u16() {
            429 => Self::RateLimit,
            401 | 403 => Self::AuthError,
            400 | 422 => Self::InvalidRequest,
            500..=599 => Self::ServerError,
            _ => Self::Unknown,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimit | Self::ServerError | Self::Timeout)
    }
}

/// Shared error text for non-200 provider replies.
pub(crate) fn format_api_error(
    provider: &str,
    status: StatusCode,
    detail: Option<(String, String)>,
) -> anyhow::Error {
    let kind = ProviderErrorKind::from_status(status);
    let retryable = if kind.is_retryable() {
        " [retryable]"
    } else {
        ""
    };
    match detail {
        Some((message, kind)) => {
            anyhow!("{provider} api error ({status}){retryable}: {message} ({kind})")
        }
        None => anyhow!("{provider} api error ({status}){retryable}"),
    }
}

/// Map transport failures the same way for every provider.
pub(crate) fn map_send_error(provider: &str, timeout: Duration, err: reqwest::Error) -> anyhow::Error {
    if err.is_timeout() {
        anyhow!(
            "{provider} api error (timeout) [retryable]: request timed out after {}s",
            timeout.as_secs()
        )
    } else if err.is_connect() {
        anyhow!("{provider} api error (connect) [retryable]: {err}")
    } else {
        err.into()
    }
}

pub(crate) fn build_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_default()
}

// ============================================================
// Provider Configuration
// ============================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    #[default]
    Anthropic,
    OpenAI,
}

impl ProviderType {
    pub fn default_base_url(&self) -> &'static str {
        match self {
            Self::Anthropic => "https://api.anthropic.com",
            Self::OpenAI => "https://api.openai.com/v1",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(rename = "type")]
    pub provider_type: ProviderType,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Uses the provider default when unset.
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl ProviderConfig {
    pub fn new(provider_type: ProviderType) -> Self {
        Self {
            provider_type,
            api_key: None,
            base_url: None,
            timeout_secs: None,
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// A blank or missing key means the relay runs in echo mode.
    pub fn has_credential(&self) -> bool {
        self.api_key
            .as_deref()
            .map(|k| !k.trim().is_empty())
            .unwrap_or(false)
    }
}

pub fn create_provider(config: &ProviderConfig) -> Result<Arc<dyn LlmProvider>> {
    let key = config
        .api_key
        .as_deref()
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| anyhow!("{:?} provider requires api_key", config.provider_type))?;
    let base_url = config
        .base_url
        .as_deref()
        .unwrap_or_else(|| config.provider_type.default_base_url());
    let timeout = config
        .timeout_secs
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_TIMEOUT);

    let provider: Arc<dyn LlmProvider> = match config.provider_type {
        ProviderType::Anthropic => {
            Arc::new(AnthropicProvider::new(key, base_url).with_timeout(timeout))
        }
        ProviderType::OpenAI => Arc::new(OpenAiProvider::new(key, base_url).with_timeout(timeout)),
    };
    tracing::info!("configured chat provider: {:?} ({base_url})", config.provider_type);
    Ok(provider)
}

/// Deterministic provider for local runs and tests.
pub struct StubProvider;

#[async_trait]
impl LlmProvider for StubProvider {
    async fn chat(&self, request: LlmRequest) -> Result<LlmResponse> {
        let user_text = request
            .messages
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default();
        Ok(LlmResponse {
            text: format!("[stub:{}] {}", request.model, user_text),
            input_tokens: None,
            output_tokens: None,
            stop_reason: Some("end_turn".into()),
        })
    }
}
