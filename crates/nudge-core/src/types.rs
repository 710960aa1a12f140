use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// Stable identifier of a task in the owning store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Per-task due-date notification state, owned by the task store and
/// advanced by the scheduler through [`TaskUpdate`]s.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationState {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Lead time before `due` at which the first reminder becomes eligible.
    #[serde(default = "default_notify_before")]
    pub notify_before_minutes: u32,
    /// When the task was last notified. Never moves backwards.
    #[serde(default)]
    pub notified_at: Option<DateTime<Utc>>,
    /// Follow-ups sent since the first notification.
    #[serde(default)]
    pub follow_up_count: u32,
}

fn default_enabled() -> bool {
    true
}

fn default_notify_before() -> u32 {
    60
}

impl Default for NotificationState {
    fn default() -> Self {
        Self {
            enabled: true,
            notify_before_minutes: default_notify_before(),
            notified_at: None,
            follow_up_count: 0,
        }
    }
}

/// Read-only view of a task handed to the engine once per tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub id: TaskId,
    pub title: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub archived: bool,
    /// Sub-tasks carry their parent's id and are never notified directly.
    #[serde(default)]
    pub parent_id: Option<TaskId>,
    #[serde(default)]
    pub due: Option<DateTime<Utc>>,
    #[serde(default)]
    pub recurrence: Option<RecurrencePattern>,
    #[serde(default)]
    pub notification: Option<NotificationState>,
}

impl TaskSnapshot {
    pub fn is_top_level(&self) -> bool {
        self.parent_id.is_none()
    }

    pub fn is_recurring(&self) -> bool {
        self.recurrence.is_some()
    }
}

/// Partial update returned to the owning store after a tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskUpdate {
    pub task_id: TaskId,
    pub notification: NotificationState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecurrenceKind {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl fmt::Display for RecurrenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RecurrenceKind::Daily => "daily",
            RecurrenceKind::Weekly => "weekly",
            RecurrenceKind::Monthly => "monthly",
            RecurrenceKind::Yearly => "yearly",
        };
        write!(f, "{s}")
    }
}

/// Rule describing when a task recurs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurrencePattern {
    pub kind: RecurrenceKind,
    /// Every N days/weeks/months/years. Zero is treated as one and values
    /// above [`MAX_INTERVAL`] are capped.
    #[serde(default = "default_interval", deserialize_with = "capped_interval")]
    pub interval: u32,
    /// Weekly only: 0 = Sunday … 6 = Saturday.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub days_of_week: Option<BTreeSet<u8>>,
    /// Monthly and yearly: 1–31, clamped to the length of the target month.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day_of_month: Option<u8>,
    /// Yearly only: 1–12.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub month: Option<u8>,
    /// Time of day occurrences land on. `None` means end of day.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_of_day: Option<NaiveTime>,
}

/// Largest recurrence interval honoured.
pub const MAX_INTERVAL: u32 = 1000;

fn default_interval() -> u32 {
    1
}

fn capped_interval<'de, D>(deserializer: D) -> std::result::Result<u32, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = u64::deserialize(deserializer)?;
    Ok(raw.clamp(1, MAX_INTERVAL as u64) as u32)
}

impl RecurrencePattern {
    pub fn new(kind: RecurrenceKind, interval: u32) -> Self {
        Self {
            kind,
            interval,
            days_of_week: None,
            day_of_month: None,
            month: None,
            time_of_day: None,
        }
    }

    pub fn weekly_on(days: impl IntoIterator<Item = u8>) -> Self {
        Self {
            days_of_week: Some(days.into_iter().collect()),
            ..Self::new(RecurrenceKind::Weekly, 1)
        }
    }

    pub fn monthly_on(day: u8) -> Self {
        Self {
            day_of_month: Some(day),
            ..Self::new(RecurrenceKind::Monthly, 1)
        }
    }

    pub fn yearly_on(month: u8, day: u8) -> Self {
        Self {
            month: Some(month),
            day_of_month: Some(day),
            ..Self::new(RecurrenceKind::Yearly, 1)
        }
    }

    pub fn at(mut self, time: NaiveTime) -> Self {
        self.time_of_day = Some(time);
        self
    }

    /// Interval in `1..=MAX_INTERVAL`.
    pub fn effective_interval(&self) -> u32 {
        self.interval.clamp(1, MAX_INTERVAL)
    }

    /// Short English description, e.g. "every 2 weeks on Mon, Wed".
    pub fn describe(&self) -> String {
        const DAYS: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];
        let n = self.effective_interval();
        let unit = match self.kind {
            RecurrenceKind::Daily => "day",
            RecurrenceKind::Weekly => "week",
            RecurrenceKind::Monthly => "month",
            RecurrenceKind::Yearly => "year",
        };
        let mut s = if n == 1 {
            format!("every {unit}")
        } else {
            format!("every {n} {unit}s")
        };
        match self.kind {
            RecurrenceKind::Weekly => {
                let days: Vec<&str> = self
                    .days_of_week
                    .iter()
                    .flatten()
                    .filter_map(|d| DAYS.get(*d as usize).copied())
                    .collect();
                if !days.is_empty() {
                    s.push_str(" on ");
                    s.push_str(&days.join(", "));
                }
            }
            RecurrenceKind::Monthly => {
                if let Some(d) = self.day_of_month {
                    s.push_str(&format!(" on day {d}"));
                }
            }
            RecurrenceKind::Yearly => {
                if let (Some(m), Some(d)) = (self.month, self.day_of_month) {
                    s.push_str(&format!(" on {m:02}-{d:02}"));
                }
            }
            RecurrenceKind::Daily => {}
        }
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_deserialises_with_defaults() {
        let json = r#"{"id":"t1","title":"Pay rent"}"#;
        let task: TaskSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(task.id.as_str(), "t1");
        assert!(!task.completed);
        assert!(task.is_top_level());
        assert!(task.notification.is_none());
    }

    #[test]
    fn notification_state_defaults_lead_time() {
        let json = r#"{"enabled":true}"#;
        let state: NotificationState = serde_json::from_str(json).unwrap();
        assert_eq!(state.notify_before_minutes, 60);
        assert_eq!(state.follow_up_count, 0);
        assert!(state.notified_at.is_none());
    }

    #[test]
    fn describes_patterns() {
        assert_eq!(RecurrencePattern::new(RecurrenceKind::Daily, 1).describe(), "every day");
        let mut weekly = RecurrencePattern::weekly_on([3, 1]);
        weekly.interval = 2;
        assert_eq!(weekly.describe(), "every 2 weeks on Mon, Wed");
        assert_eq!(RecurrencePattern::monthly_on(15).describe(), "every month on day 15");
    }

    #[test]
    fn zero_interval_is_one() {
        let p = RecurrencePattern::new(RecurrenceKind::Daily, 0);
        assert_eq!(p.effective_interval(), 1);
    }

    #[test]
    fn oversized_interval_is_capped() {
        let p: RecurrencePattern = serde_json::from_str(r#"{"kind": "yearly", "interval": 9000000000}"#).unwrap();
        assert_eq!(p.interval, MAX_INTERVAL);
        assert_eq!(RecurrencePattern::new(RecurrenceKind::Daily, u32::MAX).effective_interval(), MAX_INTERVAL);
    }
}
