use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::provider::{check_status, ChatRequest, ChatResponse, GenerationProvider, ProviderError, Role};

const DEFAULT_BASE_URL: &str = "https://api.openai.com";

/// OpenAI chat completions (bearer-token auth).
pub struct OpenAiProvider {
    http: reqwest::Client,
    token: String,
    endpoint: String,
}

impl OpenAiProvider {
    pub fn new(api_key: String, base_url: Option<String>) -> Self {
        let base = base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Self {
            http: reqwest::Client::new(),
            token: api_key,
            endpoint: format!("{}/v1/chat/completions", base.trim_end_matches('/')),
        }
    }
}

#[async_trait]
impl GenerationProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn send(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        debug!(model = %req.model, "openai completion request");
        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.token)
            .json(&CompletionBody::from(req))
            .send()
            .await?;
        let resp = check_status(resp, self.name()).await?;

        let completion: Completion = resp
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;
        Ok(completion.into_response())
    }
}

#[derive(Serialize)]
struct CompletionBody<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    max_tokens: u32,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

impl<'a> From<&'a ChatRequest> for CompletionBody<'a> {
    fn from(req: &'a ChatRequest) -> Self {
        let system = (!req.system.is_empty()).then(|| WireMessage {
            role: "system",
            content: &req.system,
        });
        let turns = req.messages.iter().map(|m| WireMessage {
            role: match m.role {
                Role::User => "user",
                Role::Assistant => "assistant",
            },
            content: &m.content,
        });
        Self {
            model: &req.model,
            messages: system.into_iter().chain(turns).collect(),
            max_tokens: req.max_tokens,
        }
    }
}

#[derive(Deserialize)]
struct Completion {
    model: String,
    #[serde(default)]
    choices: Vec<CompletionChoice>,
    #[serde(default)]
    usage: Option<CompletionUsage>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: ChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize, Default)]
struct CompletionUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

impl Completion {
    fn into_response(self) -> ChatResponse {
        let usage = self.usage.unwrap_or_default();
        let (content, stop_reason) = match self.choices.into_iter().next() {
            Some(choice) => (
                choice.message.content.unwrap_or_default(),
                choice.finish_reason.unwrap_or_default(),
            ),
            None => (String::new(), String::new()),
        };
        ChatResponse {
            content,
            model: self.model,
            tokens_in: usage.prompt_tokens,
            tokens_out: usage.completion_tokens,
            stop_reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_prompt_is_first_message() {
        let req = ChatRequest::single("gpt-4.1-mini", "be brief", "hello", 200);
        let body = serde_json::to_value(CompletionBody::from(&req)).unwrap();
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][0]["content"], "be brief");
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["max_tokens"], 200);
    }

    #[test]
    fn empty_system_prompt_is_omitted() {
        let req = ChatRequest::single("gpt-4.1-mini", "", "hello", 50);
        let body = serde_json::to_value(CompletionBody::from(&req)).unwrap();
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn parses_first_choice() {
        let raw = r#"{
            "model": "gpt-4.1-mini",
            "choices": [{"message": {"content": "Time to file it."}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 5}
        }"#;
        let resp = serde_json::from_str::<Completion>(raw).unwrap().into_response();
        assert_eq!(resp.content, "Time to file it.");
        assert_eq!(resp.tokens_out, 5);
        assert_eq!(resp.stop_reason, "stop");
    }

    #[test]
    fn missing_choices_yield_empty_content() {
        let raw = r#"{"model": "gpt-4.1-mini", "choices": []}"#;
        let resp = serde_json::from_str::<Completion>(raw).unwrap().into_response();
        assert!(resp.content.is_empty());
        assert_eq!(resp.tokens_in, 0);
    }

    #[test]
    fn trailing_slash_in_base_url_is_ignored() {
        let p = OpenAiProvider::new("k".into(), Some("http://localhost:8080/".into()));
        assert_eq!(p.endpoint, "http://localhost:8080/v1/chat/completions");
    }
}
