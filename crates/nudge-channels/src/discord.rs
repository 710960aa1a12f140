//! Discord direct messages over the REST API.
//!
//! A DM is two calls: open (or fetch) the DM channel with the recipient,
//! then post the message into it. The channel id is cached after the
//! first successful open.

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use nudge_core::config::DiscordConfig;
use nudge_core::reminder::{DmMetadata, DmPurpose, EventKind, GreetingSlot};

use crate::dispatcher::DirectMessenger;
use crate::error::ChannelError;

const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";
/// Discord rejects messages above 2000 characters.
const CHUNK_MAX: usize = 1950;

pub struct DiscordDm {
    client: Client,
    token: String,
    user_id: String,
    api_base: String,
    dm_channel: OnceCell<String>,
}

#[derive(Deserialize)]
struct DmChannel {
    id: String,
}

impl DiscordDm {
    pub fn new(token: impl Into<String>, user_id: impl Into<String>, api_base: Option<String>) -> Self {
        Self {
            client: Client::new(),
            token: token.into(),
            user_id: user_id.into(),
            api_base: api_base.unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            dm_channel: OnceCell::new(),
        }
    }

    /// Build from config; `None` when disabled or missing the token or recipient.
    pub fn from_config(cfg: &DiscordConfig) -> Option<Self> {
        let token = cfg.bot_token.trim();
        let user = cfg.user_id.trim();
        if !cfg.enabled || token.is_empty() || user.is_empty() {
            return None;
        }
        Some(Self::new(token, user, None))
    }

    async fn channel_id(&self) -> Result<&str, ChannelError> {
        let id = self
            .dm_channel
            .get_or_try_init(|| async {
                let resp = self
                    .client
                    .post(format!("{}/users/@me/channels", self.api_base))
                    .header("Authorization", format!("Bot {}", self.token))
                    .json(&json!({ "recipient_id": self.user_id }))
                    .send()
                    .await?;
                let channel: DmChannel = check(resp).await?.json().await?;
                info!(channel_id = %channel.id, "discord DM channel opened");
                Ok::<_, ChannelError>(channel.id)
            })
            .await?;
        Ok(id.as_str())
    }

    async fn post(&self, channel_id: &str, content: &str) -> Result<(), ChannelError> {
        let resp = self
            .client
            .post(format!("{}/channels/{channel_id}/messages", self.api_base))
            .header("Authorization", format!("Bot {}", self.token))
            .json(&json!({ "content": content }))
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }
}

#[async_trait]
impl DirectMessenger for DiscordDm {
    fn name(&self) -> &str {
        "discord"
    }

    async fn send(&self, text: &str, meta: &DmMetadata) -> Result<(), ChannelError> {
        let channel_id = self.channel_id().await?;
        let content = format_dm(text, meta);
        for chunk in split_chunks(&content) {
            self.post(channel_id, &chunk).await?;
        }
        debug!(recipient = %self.user_id, "discord DM sent");
        Ok(())
    }
}

async fn check(resp: Response) -> Result<Response, ChannelError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Err(ChannelError::AuthFailed(format!("{status}: {body}")))
        }
        _ => Err(ChannelError::SendFailed(format!("{status}: {body}"))),
    }
}

/// Bold headline with an icon for the purpose, then the text.
pub fn format_dm(text: &str, meta: &DmMetadata) -> String {
    let icon = match &meta.purpose {
        DmPurpose::Task { event, .. } => match event {
            EventKind::Reminder => "🔔",
            EventKind::Overdue => "⏰",
            EventKind::FollowUp => "🔁",
        },
        DmPurpose::Greeting { slot } => match slot {
            GreetingSlot::Morning => "🌅",
            GreetingSlot::Noon => "🍱",
            GreetingSlot::Evening => "🌙",
        },
    };
    if meta.title.is_empty() {
        format!("{icon} {text}")
    } else {
        format!("{icon} **{}**\n{text}", meta.title)
    }
}

/// Split into chunks of at most [`CHUNK_MAX`] characters, preferring
/// newline then space boundaries.
pub fn split_chunks(text: &str) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut remaining = text;

    while remaining.chars().count() > CHUNK_MAX {
        let limit = remaining
            .char_indices()
            .nth(CHUNK_MAX)
            .map(|(i, _)| i)
            .unwrap_or(remaining.len());
        let window = &remaining[..limit];
        let separator = window
            .rfind('\n')
            .or_else(|| window.rfind(' '))
            .filter(|i| *i > 0);

        match separator {
            // Both separators are one byte; only that byte is dropped.
            Some(at) => {
                chunks.push(remaining[..at].to_string());
                remaining = &remaining[at + 1..];
            }
            None => {
                chunks.push(remaining[..limit].to_string());
                remaining = &remaining[limit..];
            }
        }
    }

    if !remaining.is_empty() || chunks.is_empty() {
        chunks.push(remaining.to_string());
    }
    chunks
}
