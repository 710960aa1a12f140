//! Desktop notifications through the platform notifier command.

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::dispatcher::LocalNotifier;
use crate::error::ChannelError;

const APP_NAME: &str = "nudge";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifierBackend {
    /// freedesktop `notify-send`.
    NotifySend,
    /// macOS `osascript -e 'display notification …'`.
    Osascript,
}

impl NotifierBackend {
    pub fn detect() -> Option<Self> {
        if cfg!(target_os = "macos") {
            Some(Self::Osascript)
        } else if cfg!(unix) {
            Some(Self::NotifySend)
        } else {
            None
        }
    }

    /// Program and arguments that display `title`/`body`.
    pub fn command(&self, title: &str, body: &str) -> (&'static str, Vec<String>) {
        match self {
            Self::NotifySend => (
                "notify-send",
                vec![
                    format!("--app-name={APP_NAME}"),
                    title.to_string(),
                    body.to_string(),
                ],
            ),
            Self::Osascript => (
                "osascript",
                vec![
                    "-e".to_string(),
                    format!(
                        r#"display notification "{}" with title "{}""#,
                        escape_applescript(body),
                        escape_applescript(title)
                    ),
                ],
            ),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DesktopNotifier {
    backend: NotifierBackend,
}

impl DesktopNotifier {
    pub fn new(backend: NotifierBackend) -> Self {
        Self { backend }
    }

    /// Notifier for the current platform, if it has one.
    pub fn detect() -> Option<Self> {
        NotifierBackend::detect().map(Self::new)
    }
}

#[async_trait]
impl LocalNotifier for DesktopNotifier {
    fn name(&self) -> &str {
        "desktop"
    }

    async fn notify(&self, title: &str, body: &str) -> Result<(), ChannelError> {
        let (program, args) = self.backend.command(title, body);
        let output = Command::new(program)
            .args(&args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ChannelError::ConnectionFailed(format!("{program}: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ChannelError::SendFailed(format!("{program}: {}", stderr.trim())));
        }
        debug!(program, "desktop notification shown");
        Ok(())
    }
}

fn escape_applescript(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}
