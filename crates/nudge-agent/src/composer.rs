use std::iter;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use nudge_core::config::{NudgeConfig, ProviderEntry, ProviderSelection, ProvidersConfig};
use nudge_core::reminder::{EventKind, GreetingSlot};
use nudge_core::types::TaskSnapshot;

use crate::anthropic::AnthropicProvider;
use crate::chain::{AttemptFailure, ProviderChain, ProviderSlot};
use crate::classify::FailureKind;
use crate::gemini::GeminiProvider;
use crate::memory::MemorySource;
use crate::openai::OpenAiProvider;
use crate::persona::{Persona, PersonaRegistry, PromptVariant, TaskContext};
use crate::provider::GenerationProvider;

const MAX_TOKENS: u32 = 300;

/// A composed notification, ready for any channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    /// Short headline (desktop notification title, DM header).
    pub title: String,
    /// Never empty.
    pub body: String,
    /// Provider that produced `body`, `None` for fallback text.
    pub provider: Option<String>,
    /// Why generation failed, when `body` is fallback text.
    pub failure: Option<FailureKind>,
}

impl Message {
    pub fn is_fallback(&self) -> bool {
        self.failure.is_some()
    }
}

/// Generation backends, in auto-selection priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Claude,
    Gemini,
    Openai,
}

impl ProviderKind {
    pub const PRIORITY: [ProviderKind; 3] = [ProviderKind::Claude, ProviderKind::Gemini, ProviderKind::Openai];

    pub fn name(&self) -> &'static str {
        match self {
            ProviderKind::Claude => "claude",
            ProviderKind::Gemini => "gemini",
            ProviderKind::Openai => "openai",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            ProviderKind::Claude => "claude-sonnet-4-20250514",
            ProviderKind::Gemini => "gemini-2.0-flash",
            ProviderKind::Openai => "gpt-4.1-mini",
        }
    }

    fn entry<'a>(&self, cfg: &'a ProvidersConfig) -> &'a ProviderEntry {
        match self {
            ProviderKind::Claude => &cfg.claude,
            ProviderKind::Gemini => &cfg.gemini,
            ProviderKind::Openai => &cfg.openai,
        }
    }

    fn build(&self, api_key: String, base_url: Option<String>) -> Box<dyn GenerationProvider> {
        match self {
            ProviderKind::Claude => Box::new(AnthropicProvider::new(api_key, base_url)),
            ProviderKind::Gemini => Box::new(GeminiProvider::new(api_key, base_url)),
            ProviderKind::Openai => Box::new(OpenAiProvider::new(api_key, base_url)),
        }
    }
}

/// Explicit selection wins; `auto` takes the first provider with a
/// credential and defaults to Claude when none has one.
pub fn resolve_provider(cfg: &ProvidersConfig) -> ProviderKind {
    match cfg.selection {
        ProviderSelection::Claude => ProviderKind::Claude,
        ProviderSelection::Gemini => ProviderKind::Gemini,
        ProviderSelection::Openai => ProviderKind::Openai,
        ProviderSelection::Auto => ProviderKind::PRIORITY
            .into_iter()
            .find(|k| k.entry(cfg).credential().is_some())
            .unwrap_or(ProviderKind::Claude),
    }
}

/// Resolved provider first, then every other credentialed provider.
pub fn build_chain(cfg: &ProvidersConfig) -> ProviderChain {
    let primary = resolve_provider(cfg);
    let order = iter::once(primary).chain(ProviderKind::PRIORITY.into_iter().filter(|k| *k != primary));

    let slots: Vec<ProviderSlot> = order
        .filter_map(|kind| {
            let entry = kind.entry(cfg);
            let key = entry.credential()?;
            let model = if entry.model.trim().is_empty() {
                kind.default_model().to_string()
            } else {
                entry.model.clone()
            };
            Some(ProviderSlot::new(kind.build(key.to_string(), entry.base_url.clone()), model))
        })
        .collect();

    info!(
        primary = primary.name(),
        providers = slots.len(),
        "generation chain configured"
    );
    ProviderChain::new(primary.name(), slots, Duration::from_secs(cfg.timeout_secs.max(1)))
}

/// Turns task events and greeting slots into persona-voiced messages.
///
/// Composition never fails: when no provider answers, the message falls
/// back to a remediation hint or a canned persona line.
pub struct MessageComposer {
    chain: ProviderChain,
    persona: Persona,
    memory: MemorySource,
    prefer_canned_fallback: bool,
}

impl MessageComposer {
    pub fn new(chain: ProviderChain, persona: Persona, memory: MemorySource, prefer_canned_fallback: bool) -> Self {
        Self {
            chain,
            persona,
            memory,
            prefer_canned_fallback,
        }
    }

    pub fn from_config(cfg: &NudgeConfig) -> Self {
        let registry = PersonaRegistry::new(cfg.persona.custom.clone());
        let persona = registry.resolve(&cfg.persona.active);
        info!(persona = %persona.id(), "persona selected");
        Self::new(
            build_chain(&cfg.providers),
            persona,
            MemorySource::new(cfg.persona.memory_file.as_ref().map(PathBuf::from)),
            cfg.persona.prefer_canned_fallback,
        )
    }

    /// Message for `event` on `task`. Follow-up titles escalate with the
    /// task's current follow-up count.
    pub async fn compose(&self, task: &TaskSnapshot, event: EventKind, now: DateTime<Utc>) -> Message {
        let ctx = TaskContext {
            title: &task.title,
            due: task.due,
            event,
            follow_up_count: task.notification.as_ref().map(|n| n.follow_up_count).unwrap_or(0),
            recurrence: task.recurrence.as_ref().map(|r| r.describe()),
            now,
        };
        let (title, line) = self.persona.notification_title(&ctx);

        let memory = self.memory.load_context().await;
        let system = self.persona.system_prompt(ctx.variant(), &memory);
        let user = self.persona.task_prompt(&ctx, !memory.is_empty());

        match self.chain.generate(&system, &user, MAX_TOKENS).await {
            Ok(gen) => {
                debug!(task_id = %task.id, provider = %gen.provider, "message generated");
                Message {
                    title,
                    body: gen.text,
                    provider: Some(gen.provider),
                    failure: None,
                }
            }
            Err(failure) => Message {
                title,
                body: self.fallback_body(&ctx, &line, &failure),
                provider: None,
                failure: Some(failure.kind),
            },
        }
    }

    /// Greeting for one of the daily slots. Failures fall back to a canned line.
    pub async fn compose_greeting(&self, slot: GreetingSlot) -> Message {
        let title = self.persona.greeting_title(slot);
        let memory = self.memory.load_context().await;
        let system = self.persona.system_prompt(PromptVariant::Greeting(slot), &memory);
        let user = self.persona.greeting_prompt(slot, !memory.is_empty());

        match self.chain.generate(&system, &user, MAX_TOKENS).await {
            Ok(gen) => Message {
                title,
                body: gen.text,
                provider: Some(gen.provider),
                failure: None,
            },
            Err(failure) => Message {
                title,
                body: self.persona.canned_greeting(slot),
                provider: None,
                failure: Some(failure.kind),
            },
        }
    }

    fn fallback_body(&self, ctx: &TaskContext<'_>, line: &str, failure: &AttemptFailure) -> String {
        let canned = failure.kind == FailureKind::Unknown
            || (self.prefer_canned_fallback && failure.kind != FailureKind::Network);
        if canned {
            return self.persona.canned_line(ctx);
        }
        let (problem, hint) = failure.kind.remediation(&failure.provider);
        format!("⚠️ {problem}\n{hint}\n\n{line}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;
    use nudge_core::types::{NotificationState, TaskId};

    use crate::provider::{ChatRequest, ChatResponse, ProviderError};

    struct Fixed(&'static str);

    #[async_trait]
    impl GenerationProvider for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }
        async fn send(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
            Ok(ChatResponse {
                content: self.0.to_string(),
                model: req.model.clone(),
                tokens_in: 0,
                tokens_out: 0,
                stop_reason: "stop".to_string(),
            })
        }
    }

    struct Broken(u16);

    #[async_trait]
    impl GenerationProvider for Broken {
        fn name(&self) -> &str {
            "broken"
        }
        async fn send(&self, _req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
            Err(ProviderError::Api {
                status: self.0,
                message: "server error".to_string(),
            })
        }
    }

    fn task() -> TaskSnapshot {
        TaskSnapshot {
            id: TaskId::from("t1"),
            title: "Renew passport".to_string(),
            completed: false,
            archived: false,
            parent_id: None,
            due: Some(Utc::now() + ChronoDuration::minutes(30)),
            recurrence: None,
            notification: Some(NotificationState::default()),
        }
    }

    fn composer(chain: ProviderChain, prefer_canned: bool) -> MessageComposer {
        MessageComposer::new(
            chain,
            Persona::preset("secretary").unwrap(),
            MemorySource::default(),
            prefer_canned,
        )
    }

    fn chain_of(p: impl GenerationProvider + 'static) -> ProviderChain {
        ProviderChain::new("test", vec![ProviderSlot::new(Box::new(p), "m")], std::time::Duration::from_secs(5))
    }

    #[tokio::test]
    async fn no_credentials_still_produces_text() {
        let c = composer(ProviderChain::empty("claude"), false);
        let msg = c.compose(&task(), EventKind::Reminder, Utc::now()).await;
        assert!(!msg.body.is_empty());
        assert!(msg.body.contains("Renew passport"));
        assert!(msg.body.contains("[providers.claude]"));
        assert_eq!(msg.failure, Some(FailureKind::CredentialMissing));
        assert!(msg.provider.is_none());
    }

    #[tokio::test]
    async fn prefer_canned_uses_persona_line() {
        let c = composer(ProviderChain::empty("claude"), true);
        let msg = c.compose(&task(), EventKind::Reminder, Utc::now()).await;
        assert!(msg.body.contains("Renew passport"));
        assert!(!msg.body.contains("API key"));
    }

    #[tokio::test]
    async fn unknown_failure_uses_canned_line() {
        let c = composer(chain_of(Broken(500)), false);
        let msg = c.compose(&task(), EventKind::Overdue, Utc::now()).await;
        assert_eq!(msg.failure, Some(FailureKind::Unknown));
        assert!(msg.body.contains("Renew passport"));
        assert!(!msg.body.starts_with("⚠️"));
    }

    #[tokio::test]
    async fn invalid_key_gets_remediation() {
        let c = composer(chain_of(Broken(401)), false);
        let msg = c.compose(&task(), EventKind::Overdue, Utc::now()).await;
        assert_eq!(msg.failure, Some(FailureKind::CredentialInvalid));
        assert!(msg.body.starts_with("⚠️"));
        assert!(msg.body.ends_with("\"Renew passport\" is past its due time. Please attend to it."));
    }

    #[tokio::test]
    async fn success_is_returned_verbatim() {
        let c = composer(chain_of(Fixed(" Passport time. You've got this. ")), false);
        let msg = c.compose(&task(), EventKind::Reminder, Utc::now()).await;
        assert_eq!(msg.body, "Passport time. You've got this.");
        assert_eq!(msg.provider.as_deref(), Some("fixed"));
        assert!(!msg.is_fallback());
        assert_eq!(msg.title, "Notice");
    }

    #[tokio::test]
    async fn greeting_falls_back_to_canned() {
        let c = composer(ProviderChain::empty("claude"), false);
        for slot in GreetingSlot::ALL {
            let msg = c.compose_greeting(slot).await;
            assert!(!msg.body.is_empty());
            assert!(msg.is_fallback());
        }
    }

    #[test]
    fn auto_resolution_follows_priority() {
        let mut cfg = ProvidersConfig::default();
        assert_eq!(resolve_provider(&cfg), ProviderKind::Claude);

        cfg.openai.api_key = Some("sk-test".into());
        assert_eq!(resolve_provider(&cfg), ProviderKind::Openai);

        cfg.gemini.api_key = Some("g-test".into());
        assert_eq!(resolve_provider(&cfg), ProviderKind::Gemini);

        cfg.selection = ProviderSelection::Openai;
        assert_eq!(resolve_provider(&cfg), ProviderKind::Openai);
    }

    #[test]
    fn chain_holds_only_credentialed_providers() {
        let mut cfg = ProvidersConfig::default();
        assert!(build_chain(&cfg).is_empty());
        cfg.selection = ProviderSelection::Gemini;
        cfg.openai.api_key = Some("sk-test".into());
        let chain = build_chain(&cfg);
        assert_eq!(chain.primary(), "gemini");
        assert!(!chain.is_empty());
    }
}
