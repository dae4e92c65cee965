//! OpenAI chat-completions provider (api.openai.com or an Azure OpenAI deployment)

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::types::{ChatMessage, ChatResponse, ChatRole, ChatUsage, LlmProvider, StopReason};

/// How requests are addressed and authenticated
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// `{base_url}/v1/chat/completions` with a bearer token
    OpenAi,
    /// `{base_url}/openai/deployments/{model}/chat/completions` with an `api-key` header
    Azure { api_version: String },
}

/// OpenAI provider
pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    endpoint: Endpoint,
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

impl OpenAiProvider {
    pub fn new(
        api_key: String,
        model: String,
        base_url: String,
        max_tokens: u32,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            max_tokens,
            endpoint: Endpoint::OpenAi,
        })
    }

    /// Address an Azure OpenAI deployment instead; `model` is the deployment name
    pub fn with_azure(mut self, api_version: impl Into<String>) -> Self {
        self.endpoint = Endpoint::Azure {
            api_version: api_version.into(),
        };
        self
    }

    fn url(&self) -> String {
        match &self.endpoint {
            Endpoint::OpenAi => format!("{}/v1/chat/completions", self.base_url),
            Endpoint::Azure { api_version } => format!(
                "{}/openai/deployments/{}/chat/completions?api-version={}",
                self.base_url, self.model, api_version
            ),
        }
    }

    /// Convert provider-agnostic messages to OpenAI wire format
    fn to_openai_messages(messages: &[ChatMessage], system: &str) -> Vec<OpenAiMessage> {
        let mut result = vec![OpenAiMessage {
            role: "system".to_string(),
            content: system.to_string(),
        }];

        result.extend(
            messages
                .iter()
                .filter(|m| m.role != ChatRole::System)
                .map(|m| OpenAiMessage {
                    role: m.role.to_string(),
                    content: m.content.clone(),
                }),
        );

        result
    }

    /// Convert OpenAI response to provider-agnostic format
    fn from_openai_response(resp: OpenAiApiResponse) -> Result<ChatResponse> {
        let choice = resp
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("OpenAI response had no choices"))?;

        let stop_reason = match choice.finish_reason.as_deref() {
            Some("stop") => StopReason::EndTurn,
            Some("length") => StopReason::MaxTokens,
            Some("content_filter") => StopReason::ContentFilter,
            _ => StopReason::Unknown,
        };

        let usage = resp.usage.map_or(ChatUsage::default(), |u| ChatUsage {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
        });

        Ok(ChatResponse {
            text: choice.message.content.unwrap_or_default(),
            stop_reason,
            usage,
        })
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn provider_name(&self) -> &str {
        match self.endpoint {
            Endpoint::OpenAi => "openai",
            Endpoint::Azure { .. } => "azure-openai",
        }
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn chat(&self, messages: &[ChatMessage], system: &str) -> Result<ChatResponse> {
        let url = self.url();
        let openai_messages = Self::to_openai_messages(messages, system);

        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "messages": openai_messages,
        });

        debug!(
            "{} request: model={}, messages={}",
            self.provider_name(),
            self.model,
            openai_messages.len()
        );

        let request = self.client.post(&url).json(&body);
        let request = match self.endpoint {
            Endpoint::OpenAi => request.header("Authorization", format!("Bearer {}", self.api_key)),
            Endpoint::Azure { .. } => request.header("api-key", &self.api_key),
        };

        let response = request
            .send()
            .await
            .with_context(|| format!("Failed to send request to {}", self.provider_name()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(anyhow!(
                "{} request failed with status {}: {}",
                self.provider_name(),
                status,
                error_text
            ));
        }

        let api_response: OpenAiApiResponse = response
            .json()
            .await
            .context("Failed to parse chat completion response")?;

        debug!(
            "{} response: choices={}, finish_reason={:?}",
            self.provider_name(),
            api_response.choices.len(),
            api_response.choices.first().map(|c| &c.finish_reason)
        );

        Self::from_openai_response(api_response)
    }
}

// ── OpenAI wire types ──

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OpenAiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Clone, Deserialize)]
struct OpenAiApiResponse {
    choices: Vec<OpenAiChoice>,
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Clone, Deserialize)]
struct OpenAiChoice {
    message: OpenAiChoiceMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct OpenAiChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct OpenAiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}
