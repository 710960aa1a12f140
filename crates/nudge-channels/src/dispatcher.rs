use async_trait::async_trait;

use nudge_core::reminder::{ChannelKind, DmMetadata};

use crate::error::ChannelError;

/// Delivery surface the scheduler talks to.
///
/// The scheduler calls one method per enabled channel and treats every
/// call independently: a failure on one channel never affects another.
#[async_trait]
pub trait ChannelDispatcher: Send + Sync {
    /// Channels that should receive task notifications, in send order.
    fn enabled_channels(&self) -> Vec<ChannelKind>;

    async fn send_direct_message(&self, text: &str, meta: &DmMetadata) -> Result<(), ChannelError>;

    async fn show_local_notification(&self, title: &str, body: &str) -> Result<(), ChannelError>;
}

/// A direct-message transport (one recipient, configured up front).
#[async_trait]
pub trait DirectMessenger: Send + Sync {
    /// Stable lowercase identifier used in logs (e.g. `"discord"`).
    fn name(&self) -> &str;

    async fn send(&self, text: &str, meta: &DmMetadata) -> Result<(), ChannelError>;
}

/// A notifier that pops up on the local machine.
#[async_trait]
pub trait LocalNotifier: Send + Sync {
    fn name(&self) -> &str;

    async fn notify(&self, title: &str, body: &str) -> Result<(), ChannelError>;
}
