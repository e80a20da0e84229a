use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::{
    build_client, format_api_error, map_send_error, LlmMessage, LlmProvider, LlmRequest,
    LlmResponse, DEFAULT_TIMEOUT,
};

/// Client for `/chat/completions` style endpoints.
#[derive(Debug, Clone)]
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    api_base: String,
    timeout: Duration,
}

impl OpenAiProvider {
    pub fn new(api_key: impl Into<String>, api_base: impl Into<String>) -> Self {
        Self {
            client: build_client(DEFAULT_TIMEOUT),
            api_key: api_key.into(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = build_client(timeout);
        self.timeout = timeout;
        self
    }

    pub(crate) fn to_api_request(request: LlmRequest) -> ApiRequest {
        ApiRequest {
            model: request.model,
            messages: to_api_messages(request.system, request.messages),
            max_tokens: Some(request.max_tokens),
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    async fn chat(&self, request: LlmRequest) -> Result<LlmResponse> {
        let url = format!("{}/chat/completions", self.api_base);
        let payload = Self::to_api_request(request);

        let resp = self
            .client
            .post(url)
            .header("authorization", format!("Bearer {}", self.api_key))
            .header("content-type", "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(|e| map_send_error("openai", self.timeout, e))?;

        let status = resp.status();
        if status != StatusCode::OK {
            let text = resp.text().await?;
            let detail = serde_json::from_str::<ApiErrorEnvelope>(&text)
                .ok()
                .map(|e| (e.error.message, e.error.r#type));
            return Err(format_api_error("openai", status, detail));
        }

        let body: ApiResponse = resp.json().await?;
        to_llm_response(body)
    }
}

fn to_api_messages(system: Option<String>, messages: Vec<LlmMessage>) -> Vec<ApiMessage> {
    let mut result = Vec::with_capacity(messages.len() + 1);

    if let Some(system_text) = system {
        result.push(ApiMessage {
            role: "system".to_string(),
            content: Some(system_text),
        });
    }

    result.extend(
        messages
            .into_iter()
            .filter(|m| !m.content.is_empty())
            .map(|m| ApiMessage {
                role: m.role,
                content: Some(m.content),
            }),
    );

    result
}

fn to_llm_response(body: ApiResponse) -> Result<LlmResponse> {
    let choice = body
        .choices
        .first()
        .ok_or_else(|| anyhow!("openai api error: empty choices"))?;

    Ok(LlmResponse {
        text: choice.message.content.clone().unwrap_or_default(),
        input_tokens: body.usage.as_ref().map(|u| u.prompt_tokens),
        output_tokens: body.usage.as_ref().map(|u| u.completion_tokens),
        stop_reason: normalize_finish_reason(choice.finish_reason.clone()),
    })
}

fn normalize_finish_reason(reason: Option<String>) -> Option<String> {
    match reason.as_deref() {
        Some("stop") => Some("end_turn".to_string()),
        Some("length") => Some("max_tokens".to_string()),
        _ => reason,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ApiRequest {
    pub model: String,
    pub messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ApiMessage {
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ApiResponse {
    pub choices: Vec<ApiChoice>,
    pub usage: Option<ApiUsage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ApiChoice {
    pub message: ApiMessage,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ApiUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ApiErrorEnvelope {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ApiErrorDetail {
    #[serde(rename = "type", default)]
    pub r#type: String,
    pub message: String,
}
