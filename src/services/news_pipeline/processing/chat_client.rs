//! Thin client over an OpenAI-compatible chat-completion endpoint, shared
//! by web discovery (query → candidate URLs) and the rewriter (title
//! rewriting).

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::ChatServiceConfig;
use crate::error::{AppError, Result};

const CHAT_TIMEOUT_SECS: u64 = 15;

#[derive(Clone)]
pub struct ChatClient {
    config: ChatServiceConfig,
    http: Client,
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
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

impl ChatClient {
    pub fn new(config: ChatServiceConfig) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(CHAT_TIMEOUT_SECS))
            .build()
            .expect("failed to build chat HTTP client");
        Self { config, http }
    }

    pub fn model_id(&self) -> &str {
        &self.config.model_id
    }

    /// Single-turn completion: a system prompt plus a user message, returns
    /// the model's raw text content.
    pub async fn complete(&self, system_prompt: &str, user_message: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.config.model_id,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: user_message,
                },
            ],
            temperature: 0.2,
        };

        let response = self
            .http
            .post(&self.config.endpoint)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(AppError::from)?;

        if response.status().is_server_error() || response.status() == 429 {
            return Err(AppError::transient(
                "chat_completion",
                format!("http {}", response.status()),
            ));
        }
        if !response.status().is_success() {
            return Err(AppError::permanent(
                "chat_completion",
                format!("http {}", response.status()),
            ));
        }

        let parsed: ChatResponse = response.json().await.map_err(AppError::from)?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| AppError::permanent("chat_completion", "empty choices array"))
    }
}
