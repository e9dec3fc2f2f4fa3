
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ChatMessage, ChatModel};
use crate::config::ProviderConfig;
use crate::http::HttpClient;

#[derive(Debug, Clone)]
pub struct OpenAiChatModel {
    client: HttpClient,
    model: String,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

impl OpenAiChatModel {
    #[inline]
    pub fn new(provider: &ProviderConfig) -> Result<Self> {
        let client = HttpClient::new(provider).context("Failed to create chat client")?;
        Ok(Self::with_client(
            client,
            provider.chat_model.clone(),
            provider.temperature,
        ))
    }

    #[inline]
    pub fn with_client(client: HttpClient, model: String, temperature: f32) -> Self {
        Self {
            client,
            model,
            temperature,
        }
    }
}

impl ChatModel for OpenAiChatModel {
    #[inline]
    fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        debug!(
            "Requesting completion from {} with {} messages",
            self.model,
            messages.len()
        );

        let request = CompletionRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
        };

        let response: CompletionResponse = self
            .client
            .post_json("chat/completions", &request)
            .context("Failed to generate completion")?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| anyhow::anyhow!("Completion response contained no message"))
    }
}
