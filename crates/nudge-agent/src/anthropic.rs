use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::provider::{check_status, ChatRequest, ChatResponse, GenerationProvider, Message, ProviderError};

const API_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";

/// Claude via the Anthropic Messages API (x-api-key auth).
pub struct AnthropicProvider {
    http: reqwest::Client,
    key: String,
    endpoint: String,
}

impl AnthropicProvider {
    pub fn new(api_key: String, base_url: Option<String>) -> Self {
        let base = base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Self {
            http: reqwest::Client::new(),
            key: api_key,
            endpoint: format!("{}/v1/messages", base.trim_end_matches('/')),
        }
    }
}

#[async_trait]
impl GenerationProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "claude"
    }

    async fn send(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        debug!(model = %req.model, "claude messages request");
        let resp = self
            .http
            .post(&self.endpoint)
            .header("x-api-key", &self.key)
            .header("anthropic-version", API_VERSION)
            .json(&MessagesBody::from(req))
            .send()
            .await?;
        let resp = check_status(resp, self.name()).await?;

        let reply: MessagesReply = resp
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;
        Ok(reply.into_response())
    }
}

/// System text is a top-level field, not a message.
#[derive(Serialize)]
struct MessagesBody<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "str::is_empty")]
    system: &'a str,
    messages: &'a [Message],
}

impl<'a> From<&'a ChatRequest> for MessagesBody<'a> {
    fn from(req: &'a ChatRequest) -> Self {
        Self {
            model: &req.model,
            max_tokens: req.max_tokens,
            system: &req.system,
            messages: &req.messages,
        }
    }
}

#[derive(Deserialize)]
struct MessagesReply {
    model: String,
    #[serde(default)]
    content: Vec<Block>,
    #[serde(default)]
    stop_reason: Option<String>,
    usage: TokenUsage,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Block {
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct TokenUsage {
    input_tokens: u32,
    output_tokens: u32,
}

impl MessagesReply {
    fn into_response(self) -> ChatResponse {
        let mut content = String::new();
        for block in self.content {
            if let Block::Text { text } = block {
                content.push_str(&text);
            }
        }
        ChatResponse {
            content,
            model: self.model,
            tokens_in: self.usage.input_tokens,
            tokens_out: self.usage.output_tokens,
            stop_reason: self.stop_reason.unwrap_or_default(),
        }
    }
}
