//! Notification vocabulary shared between the policy engine, the composer
//! and every channel adapter.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::TaskId;

/// What kind of notification a task is due for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// First heads-up inside the lead window before the due time.
    Reminder,
    /// The due time has passed.
    Overdue,
    /// Escalating repeat for a task that was already notified.
    FollowUp,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Reminder => "reminder",
            EventKind::Overdue => "overdue",
            EventKind::FollowUp => "followup",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delivery channel a notification can go out on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    /// Chat direct message (Discord DM).
    DirectMessage,
    /// Local desktop notification.
    Desktop,
}

impl ChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::DirectMessage => "dm",
            ChannelKind::Desktop => "desktop",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The three daily greeting timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GreetingSlot {
    Morning,
    Noon,
    Evening,
}

impl GreetingSlot {
    pub const ALL: [GreetingSlot; 3] = [GreetingSlot::Morning, GreetingSlot::Noon, GreetingSlot::Evening];

    pub fn as_str(&self) -> &'static str {
        match self {
            GreetingSlot::Morning => "morning",
            GreetingSlot::Noon => "noon",
            GreetingSlot::Evening => "evening",
        }
    }
}

impl fmt::Display for GreetingSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a direct message is being sent. Adapters may use it to pick a
/// colour, an icon or a subject line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DmPurpose {
    Task {
        task_id: TaskId,
        event: EventKind,
    },
    Greeting {
        slot: GreetingSlot,
    },
}

/// Context passed alongside the text of a direct message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DmMetadata {
    pub purpose: DmPurpose,
    /// Short headline (same text the desktop notification uses as title).
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due: Option<DateTime<Utc>>,
}

impl DmMetadata {
    pub fn greeting(slot: GreetingSlot, title: impl Into<String>) -> Self {
        Self {
            purpose: DmPurpose::Greeting { slot },
            title: title.into(),
            task_title: None,
            due: None,
        }
    }

    pub fn is_overdue(&self) -> bool {
        matches!(
            self.purpose,
            DmPurpose::Task {
                event: EventKind::Overdue,
                ..
            }
        )
    }
}
