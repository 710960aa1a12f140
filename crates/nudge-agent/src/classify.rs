//! Failure classification for generation attempts.
//!
//! Status codes decide first; the error text is inspected only when the
//! status alone is not conclusive.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::provider::ProviderError;

/// Why message generation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    CredentialMissing,
    CredentialInvalid,
    QuotaExceeded,
    RateLimited,
    Network,
    Unknown,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::CredentialMissing => "credential_missing",
            Self::CredentialInvalid => "credential_invalid",
            Self::QuotaExceeded => "quota_exceeded",
            Self::RateLimited => "rate_limited",
            Self::Network => "network",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

impl FailureKind {
    /// Short problem statement and the action that fixes it.
    pub fn remediation(&self, provider: &str) -> (String, String) {
        match self {
            Self::CredentialMissing => (
                format!("No API key is configured for {provider}."),
                format!("Add one under [providers.{provider}] in nudge.toml."),
            ),
            Self::CredentialInvalid => (
                format!("The {provider} API key was rejected."),
                "Check that the key is correct and has not been revoked.".to_string(),
            ),
            Self::QuotaExceeded => (
                format!("The {provider} account is out of quota."),
                "Check the plan and billing settings for that account.".to_string(),
            ),
            Self::RateLimited => (
                format!("{provider} is rate limiting requests."),
                "Wait a little; the next notification will try again.".to_string(),
            ),
            Self::Network => (
                format!("Could not reach {provider}."),
                "Check the network connection.".to_string(),
            ),
            Self::Unknown => (
                format!("{provider} returned an unexpected error."),
                "See the daemon log for details.".to_string(),
            ),
        }
    }
}

/// Map a provider error onto a [`FailureKind`].
pub fn classify(err: &ProviderError) -> FailureKind {
    match err {
        ProviderError::MissingCredential { .. } => FailureKind::CredentialMissing,
        ProviderError::RateLimited { .. } => FailureKind::RateLimited,
        ProviderError::Timeout { .. } => FailureKind::Network,
        ProviderError::Http(e) if e.is_decode() => FailureKind::Unknown,
        ProviderError::Http(_) => FailureKind::Network,
        ProviderError::Api { status, .. } if *status == 401 || *status == 403 => {
            FailureKind::CredentialInvalid
        }
        ProviderError::Api { status: 402, .. } => FailureKind::QuotaExceeded,
        ProviderError::Api { status, message } => match classify_message(message) {
            FailureKind::Unknown if *status == 429 => FailureKind::RateLimited,
            kind => kind,
        },
        ProviderError::Unavailable(message) => classify_message(message),
        ProviderError::Parse(_) => FailureKind::Unknown,
    }
}

/// Keyword classification of free-form error text.
pub fn classify_message(message: &str) -> FailureKind {
    let m = message.to_lowercase();
    let has = |words: &[&str]| words.iter().any(|w| m.contains(w));

    if has(&["not set", "missing"]) {
        FailureKind::CredentialMissing
    } else if has(&["401", "403", "unauthorized", "invalid", "incorrect"]) {
        FailureKind::CredentialInvalid
    } else if has(&["quota", "exceeded", "billing", "insufficient"]) {
        FailureKind::QuotaExceeded
    } else if has(&["rate limit", "429", "too many"]) {
        FailureKind::RateLimited
    } else if has(&["network", "fetch", "timeout", "connection"]) {
        FailureKind::Network
    } else {
        FailureKind::Unknown
    }
}
