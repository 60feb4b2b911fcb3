//! Chat backend seam and its HTTP implementation
//!
//! The orchestrator only needs "send the conversation, get reply text back".
//! Every failure (transport, non-2xx status, malformed payload) comes back as
//! `CoachError::Llm` so the caller can substitute a fallback reply.

use crate::llm::config::LlmConfig;
use crate::messages::ConversationTurn;
use crate::{CoachError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Language-model collaborator
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Send the ordered conversation (system prompt first) and return the reply text
    async fn send_message(&self, context: &[ConversationTurn]) -> Result<String>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatReply {
    text: String,
}

impl<'a> ChatRequest<'a> {
    fn from_turns(turns: &'a [ConversationTurn]) -> Self {
        Self {
            messages: turns
                .iter()
                .map(|t| ChatMessage {
                    role: t.role.as_str(),
                    content: &t.content,
                })
                .collect(),
        }
    }
}

/// Parse a `{ "text": ... }` reply body
pub fn parse_reply(body: &str) -> Result<String> {
    let reply: ChatReply = serde_json::from_str(body)
        .map_err(|e| CoachError::Llm(format!("Malformed reply payload: {}", e)))?;
    let text = reply.text.trim();
    if text.is_empty() {
        return Err(CoachError::Llm("Reply text is empty".into()));
    }
    Ok(text.to_string())
}

/// Talks to a JSON chat endpoint over HTTP
pub struct HttpChatClient {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpChatClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| CoachError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            endpoint: config.endpoint.clone(),
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ChatBackend for HttpChatClient {
    async fn send_message(&self, context: &[ConversationTurn]) -> Result<String> {
        debug!("Sending {} messages to {}", context.len(), self.endpoint);

        let res = self
            .client
            .post(&self.endpoint)
            .json(&ChatRequest::from_turns(context))
            .send()
            .await
            .map_err(|e| CoachError::Llm(format!("Request failed: {}", e)))?;

        let status = res.status();
        let body = res
            .text()
            .await
            .map_err(|e| CoachError::Llm(format!("Failed to read reply body: {}", e)))?;

        if !status.is_success() {
            return Err(CoachError::Llm(format!("Backend returned {}: {}", status, body)));
        }

        parse_reply(&body)
    }
}
