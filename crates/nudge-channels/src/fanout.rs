use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use nudge_core::config::ChannelsConfig;
use nudge_core::reminder::{ChannelKind, DmMetadata};

use crate::desktop::DesktopNotifier;
use crate::discord::DiscordDm;
use crate::dispatcher::{ChannelDispatcher, DirectMessenger, LocalNotifier};
use crate::error::ChannelError;

/// Combines an optional DM transport with an optional local notifier.
///
/// Each adapter is enabled independently; a missing adapter simply drops
/// out of [`ChannelDispatcher::enabled_channels`].
#[derive(Default, Clone)]
pub struct FanoutDispatcher {
    dm: Option<Arc<dyn DirectMessenger>>,
    local: Option<Arc<dyn LocalNotifier>>,
}

impl FanoutDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_direct_messenger(mut self, dm: Arc<dyn DirectMessenger>) -> Self {
        info!(channel = %dm.name(), "registering DM adapter");
        self.dm = Some(dm);
        self
    }

    pub fn with_local_notifier(mut self, local: Arc<dyn LocalNotifier>) -> Self {
        info!(channel = %local.name(), "registering local notifier");
        self.local = Some(local);
        self
    }

    pub fn from_config(cfg: &ChannelsConfig) -> Self {
        let mut out = Self::new();

        match cfg.discord.as_ref() {
            Some(discord) => match DiscordDm::from_config(discord) {
                Some(dm) => out = out.with_direct_messenger(Arc::new(dm)),
                None => warn!("discord is configured but disabled or incomplete, skipping"),
            },
            None => info!("no DM channel configured"),
        }

        if cfg.desktop.enabled {
            match DesktopNotifier::detect() {
                Some(n) => out = out.with_local_notifier(Arc::new(n)),
                None => warn!("no desktop notifier available on this platform"),
            }
        }

        out
    }
}

#[async_trait]
impl ChannelDispatcher for FanoutDispatcher {
    fn enabled_channels(&self) -> Vec<ChannelKind> {
        let mut out = Vec::with_capacity(2);
        if self.dm.is_some() {
            out.push(ChannelKind::DirectMessage);
        }
        if self.local.is_some() {
            out.push(ChannelKind::Desktop);
        }
        out
    }

    async fn send_direct_message(&self, text: &str, meta: &DmMetadata) -> Result<(), ChannelError> {
        match &self.dm {
            Some(dm) => dm.send(text, meta).await,
            None => Err(ChannelError::ConfigError("no DM channel configured".into())),
        }
    }

    async fn show_local_notification(&self, title: &str, body: &str) -> Result<(), ChannelError> {
        match &self.local {
            Some(local) => local.notify(title, body).await,
            None => Err(ChannelError::ConfigError("desktop notifications disabled".into())),
        }
    }
}
