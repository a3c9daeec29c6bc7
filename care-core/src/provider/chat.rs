//! OpenAI-compatible `/chat/completions` provider

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ProviderEntryConfig;

use super::{ProviderClient, ProviderContext, ProviderError, ProviderReply, ProviderResult};

/// Provider speaking the chat-completions wire format
pub struct ChatCompletionsProvider {
    id: String,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    temperature: f32,
    timeout: Duration,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

impl ChatCompletionsProvider {
    /// Build a provider from its config entry.
    ///
    /// `timeout_cap` bounds the provider's own timeout so it never outlives
    /// the consensus deadline.
    pub fn from_config(entry: &ProviderEntryConfig, timeout_cap: Duration) -> ProviderResult<Self> {
        let api_key = match &entry.api_key_env {
            Some(var) => Some(
                std::env::var(var).map_err(|_| ProviderError::MissingApiKey(var.clone()))?,
            ),
            None => None,
        };

        let timeout = Duration::from_secs(entry.timeout_secs).min(timeout_cap);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::RequestFailed(e.to_string()))?;

        Ok(Self {
            id: entry.id.clone(),
            endpoint: format!("{}/chat/completions", entry.base_url.trim_end_matches('/')),
            model: entry.model.clone(),
            api_key,
            temperature: entry.temperature,
            timeout,
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ProviderClient for ChatCompletionsProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn generate(
        &self,
        prompt: &str,
        context: &ProviderContext,
    ) -> ProviderResult<ProviderReply> {
        let mut system = context.system.clone();
        if !context.attributes.is_empty() {
            system.push_str("\n\n## Context\n");
            for (key, value) in &context.attributes {
                system.push_str(&format!("- {}: {}\n", key, value));
            }
        }

        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &system,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            max_tokens: context.max_tokens,
            temperature: self.temperature,
        };

        let mut builder = self.client.post(&self.endpoint).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout(self.timeout)
            } else {
                ProviderError::RequestFailed(e.to_string())
            }
        })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Http { status, body });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::ParseError(e.to_string()))?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(ProviderError::EmptyResponse);
        }

        debug!(provider = %self.id, chars = text.len(), "Completion received");

        Ok(ProviderReply {
            provider_id: self.id.clone(),
            text,
        })
    }
}
