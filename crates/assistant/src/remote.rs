use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use shared::domain::{Turn, TurnRole};
use thiserror::Error;
use tracing::{error, info};

use crate::{AssistantResponder, APOLOGY_REPLY};

const DEFAULT_SYSTEM_PROMPT: &str = "You are Neura, an assistant helping medical students reason \
through neurology cases. Guide their clinical reasoning with questions and concise explanations \
rather than handing over final answers.";

#[derive(Debug, Clone)]
pub struct RemoteModelConfig {
    pub endpoint: String,
    pub model: String,
    pub api_key: String,
    pub system_prompt: Option<String>,
    pub timeout: Duration,
}

#[derive(Debug, Error)]
pub enum AssistantError {
    #[error("failed to build http client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("request timed out")]
    Timeout,
    #[error("transport error: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("model endpoint returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed model response: {0}")]
    Decode(#[source] reqwest::Error),
    #[error("model returned no content")]
    EmptyReply,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Assistant backed by an OpenAI-compatible chat-completions endpoint.
pub struct RemoteModelResponder {
    http: Client,
    config: RemoteModelConfig,
}

impl RemoteModelResponder {
    pub fn new(config: RemoteModelConfig) -> Result<Self, AssistantError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(AssistantError::Client)?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &RemoteModelConfig {
        &self.config
    }

    pub async fn try_respond(
        &self,
        message: &str,
        history: &[Turn],
    ) -> Result<String, AssistantError> {
        let system_prompt = self
            .config
            .system_prompt
            .as_deref()
            .unwrap_or(DEFAULT_SYSTEM_PROMPT);

        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage {
            role: "system",
            content: system_prompt,
        });
        messages.extend(history.iter().map(|turn| ChatMessage {
            role: match turn.role {
                TurnRole::User => "user",
                TurnRole::Assistant => "assistant",
            },
            content: &turn.content,
        }));
        messages.push(ChatMessage {
            role: "user",
            content: message,
        });

        let response = self
            .http
            .post(&self.config.endpoint)
            .bearer_auth(&self.config.api_key)
            .json(&ChatRequest {
                model: &self.config.model,
                messages,
            })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AssistantError::Timeout
                } else {
                    AssistantError::Transport(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AssistantError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: ChatResponse = response.json().await.map_err(AssistantError::Decode)?;
        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(AssistantError::EmptyReply)
    }
}

#[async_trait]
impl AssistantResponder for RemoteModelResponder {
    async fn respond(&self, message: &str, history: &[Turn]) -> String {
        match self.try_respond(message, history).await {
            Ok(reply) => {
                info!(model = %self.config.model, history = history.len(), "assistant replied");
                reply
            }
            Err(error) => {
                error!(endpoint = %self.config.endpoint, %error, "assistant call failed");
                APOLOGY_REPLY.to_string()
            }
        }
    }

    fn name(&self) -> &'static str {
        "remote"
    }
}

#[cfg(test)]
#[path = "tests/remote_tests.rs"]
mod tests;
