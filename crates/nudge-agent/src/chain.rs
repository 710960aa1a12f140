use std::time::Duration;

use tracing::{info, warn};

use crate::classify::{classify, FailureKind};
use crate::provider::{ChatRequest, GenerationProvider, ProviderError};

/// One provider in the chain, paired with the model it should use.
pub struct ProviderSlot {
    pub provider: Box<dyn GenerationProvider>,
    pub model: String,
}

impl ProviderSlot {
    pub fn new(provider: Box<dyn GenerationProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }
}

/// Successful generation.
#[derive(Debug, Clone)]
pub struct Generation {
    pub provider: String,
    pub text: String,
}

/// Failed attempt, as reported to the composer.
#[derive(Debug, Clone)]
pub struct AttemptFailure {
    pub provider: String,
    pub kind: FailureKind,
    pub detail: String,
}

/// Ordered list of providers tried one after another.
///
/// The first slot is the configured (or auto-resolved) provider. Each
/// attempt is bounded by the chain's timeout and the first non-empty
/// answer wins. When every slot fails, the first slot's failure is
/// reported since that is the provider the user chose.
pub struct ProviderChain {
    slots: Vec<ProviderSlot>,
    /// Name reported when the chain has no slots at all.
    primary: String,
    timeout: Duration,
}

impl ProviderChain {
    pub fn new(primary: impl Into<String>, slots: Vec<ProviderSlot>, timeout: Duration) -> Self {
        Self {
            slots,
            primary: primary.into(),
            timeout,
        }
    }

    /// Chain with no usable provider; every call fails with a missing credential.
    pub fn empty(primary: impl Into<String>) -> Self {
        Self::new(primary, Vec::new(), Duration::from_secs(30))
    }

    pub fn primary(&self) -> &str {
        &self.primary
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub async fn generate(&self, system: &str, user: &str, max_tokens: u32) -> Result<Generation, AttemptFailure> {
        let mut first_failure: Option<AttemptFailure> = None;

        for slot in &self.slots {
            let name = slot.provider.name().to_string();
            let req = ChatRequest::single(&slot.model, system, user, max_tokens);

            let outcome = match tokio::time::timeout(self.timeout, slot.provider.send(&req)).await {
                Ok(result) => result,
                Err(_) => Err(ProviderError::Timeout {
                    ms: self.timeout.as_millis() as u64,
                }),
            };

            let failure = match outcome {
                Ok(resp) => {
                    let text = resp.content.trim();
                    if !text.is_empty() {
                        if first_failure.is_some() {
                            info!(provider = %name, "generation succeeded on fallback provider");
                        }
                        return Ok(Generation {
                            provider: name,
                            text: text.to_string(),
                        });
                    }
                    AttemptFailure {
                        provider: name.clone(),
                        kind: FailureKind::Unknown,
                        detail: "empty generation".to_string(),
                    }
                }
                Err(e) => AttemptFailure {
                    provider: name.clone(),
                    kind: classify(&e),
                    detail: e.to_string(),
                },
            };

            warn!(
                provider = %failure.provider,
                kind = %failure.kind,
                err = %failure.detail,
                "generation attempt failed"
            );
            first_failure.get_or_insert(failure);
        }

        Err(first_failure.unwrap_or_else(|| AttemptFailure {
            provider: self.primary.clone(),
            kind: FailureKind::CredentialMissing,
            detail: ProviderError::MissingCredential {
                provider: self.primary.clone(),
            }
            .to_string(),
        }))
    }
}
