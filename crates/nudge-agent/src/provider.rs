use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// A single message in the prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Request to a text generation provider.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub system: String,
    pub messages: Vec<Message>,
    pub max_tokens: u32,
}

impl ChatRequest {
    /// One-shot request: a system prompt and a single user turn.
    pub fn single(model: impl Into<String>, system: impl Into<String>, user: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            model: model.into(),
            system: system.into(),
            messages: vec![Message {
                role: Role::User,
                content: user.into(),
            }],
            max_tokens,
        }
    }
}

/// Response from a provider.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub content: String,
    pub model: String,
    pub tokens_in: u32,
    pub tokens_out: u32,
    pub stop_reason: String,
}

/// Common interface for the generation backends (Anthropic, OpenAI, Gemini).
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Provider name for logging and error messages.
    fn name(&self) -> &str;

    /// Send a chat request and wait for the full response.
    async fn send(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("{provider} API key is not set")]
    MissingCredential { provider: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("Request timed out after {ms}ms")]
    Timeout { ms: u64 },

    #[error("Provider unavailable: {0}")]
    Unavailable(String),
}

/// Turn a non-success HTTP response into a [`ProviderError`].
///
/// 429 bodies that mention quota or billing are kept as `Api` errors so
/// they classify as quota exhaustion rather than rate limiting.
pub(crate) async fn check_status(
    resp: reqwest::Response,
    provider: &str,
) -> Result<reqwest::Response, ProviderError> {
    let status = resp.status().as_u16();
    if resp.status().is_success() {
        return Ok(resp);
    }

    if status == 429 {
        let retry = resp
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .map(|s| s * 1000)
            .unwrap_or(5000);
        let text = resp.text().await.unwrap_or_default();
        let lower = text.to_lowercase();
        if lower.contains("quota") || lower.contains("billing") || lower.contains("insufficient") {
            warn!(provider, status, body = %text, "quota exhausted");
            return Err(ProviderError::Api { status, message: text });
        }
        return Err(ProviderError::RateLimited {
            retry_after_ms: retry,
        });
    }

    let text = resp.text().await.unwrap_or_default();
    warn!(provider, status, body = %text, "provider API error");
    Err(ProviderError::Api { status, message: text })
}
