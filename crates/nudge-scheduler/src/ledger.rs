use std::fmt;
use std::path::Path;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use nudge_core::reminder::ChannelKind;
use nudge_core::types::TaskId;

use crate::db::init_db;
use crate::error::Result;

/// Identity of one delivered notification.
///
/// `event` is the ledger label for the dispatch window (see
/// [`NotificationPolicyEngine::ledger_label`](crate::policy::NotificationPolicyEngine::ledger_label)),
/// `day` is a `YYYY-MM-DD` key in the reference offset.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LedgerKey {
    pub task_id: TaskId,
    pub event: String,
    pub channel: ChannelKind,
    pub day: String,
}

impl LedgerKey {
    pub fn new(task_id: &TaskId, event: impl Into<String>, channel: ChannelKind, day: impl Into<String>) -> Self {
        Self {
            task_id: task_id.clone(),
            event: event.into(),
            channel,
            day: day.into(),
        }
    }
}

impl fmt::Display for LedgerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}-{}", self.task_id, self.event, self.channel, self.day)
    }
}

/// Persistent record of sent notifications and per-day send counters.
///
/// Owned by the scheduler run-loop; a single writer per database file.
pub struct NotificationLedger {
    conn: Connection,
}

impl NotificationLedger {
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self { conn })
    }

    /// Open (or create) the ledger database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        info!(path = %path.display(), "notification ledger opened");
        Self::new(conn)
    }

    pub fn in_memory() -> Result<Self> {
        Self::new(Connection::open_in_memory()?)
    }

    pub fn has_sent(&self, key: &LedgerKey) -> Result<bool> {
        let hit = self
            .conn
            .query_row(
                "SELECT 1 FROM notification_ledger WHERE key = ?1",
                [key.to_string()],
                |_| Ok(()),
            )
            .optional()?;
        Ok(hit.is_some())
    }

    /// Record `key`. Returns `true` when it was newly inserted and `false`
    /// when an identical entry already existed.
    pub fn mark_sent(&self, key: &LedgerKey) -> Result<bool> {
        let n = self.conn.execute(
            "INSERT OR IGNORE INTO notification_ledger
             (key, task_id, event, channel, day, sent_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                key.to_string(),
                key.task_id.as_str(),
                key.event,
                key.channel.as_str(),
                key.day,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(n == 1)
    }

    /// Whether `event` was recorded for `task_id` on `day` on any channel.
    pub fn sent_on_any_channel(&self, task_id: &TaskId, event: &str, day: &str) -> Result<bool> {
        let hit = self
            .conn
            .query_row(
                "SELECT 1 FROM notification_ledger
                 WHERE task_id = ?1 AND event = ?2 AND day = ?3 LIMIT 1",
                params![task_id.as_str(), event, day],
                |_| Ok(()),
            )
            .optional()?;
        Ok(hit.is_some())
    }

    /// Notifications counted for `task_id` on `day`.
    pub fn count_today(&self, task_id: &TaskId, day: &str) -> Result<u32> {
        self.roll_over(day)?;
        let count = self
            .conn
            .query_row(
                "SELECT count FROM daily_counts WHERE day = ?1 AND task_id = ?2",
                params![day, task_id.as_str()],
                |row| row.get::<_, u32>(0),
            )
            .optional()?;
        Ok(count.unwrap_or(0))
    }

    /// Notifications counted across all tasks on `day`.
    pub fn total_today(&self, day: &str) -> Result<u32> {
        self.roll_over(day)?;
        let total: u32 = self.conn.query_row(
            "SELECT COALESCE(SUM(count), 0) FROM daily_counts WHERE day = ?1",
            [day],
            |row| row.get(0),
        )?;
        Ok(total)
    }

    /// Add one to `task_id`'s counter for `day` and return the new value.
    pub fn increment(&self, task_id: &TaskId, day: &str) -> Result<u32> {
        self.roll_over(day)?;
        let count = self.conn.query_row(
            "INSERT INTO daily_counts (day, task_id, count) VALUES (?1, ?2, 1)
             ON CONFLICT (day, task_id) DO UPDATE SET count = count + 1
             RETURNING count",
            params![day, task_id.as_str()],
            |row| row.get::<_, u32>(0),
        )?;
        Ok(count)
    }

    /// Drop ledger entries for days strictly before `day`.
    pub fn prune_before(&self, day: &str) -> Result<usize> {
        let n = self
            .conn
            .execute("DELETE FROM notification_ledger WHERE day < ?1", [day])?;
        Ok(n)
    }

    /// Counters only ever describe the current day.
    fn roll_over(&self, day: &str) -> Result<()> {
        let n = self
            .conn
            .execute("DELETE FROM daily_counts WHERE day <> ?1", [day])?;
        if n > 0 {
            debug!(day = %day, cleared = n, "daily counters reset");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(task: &str, event: &str, channel: ChannelKind, day: &str) -> LedgerKey {
        LedgerKey::new(&TaskId::from(task), event, channel, day)
    }

    #[test]
    fn key_string_format() {
        let k = key("t1", "reminder", ChannelKind::DirectMessage, "2026-03-03");
        assert_eq!(k.to_string(), "t1-reminder-dm-2026-03-03");
    }

    #[test]
    fn mark_sent_reports_first_insert_only() {
        let ledger = NotificationLedger::in_memory().unwrap();
        let k = key("t1", "reminder", ChannelKind::Desktop, "2026-03-03");
        assert!(!ledger.has_sent(&k).unwrap());
        assert!(ledger.mark_sent(&k).unwrap());
        assert!(!ledger.mark_sent(&k).unwrap());
        assert!(ledger.has_sent(&k).unwrap());
    }

    #[test]
    fn channels_and_days_are_independent() {
        let ledger = NotificationLedger::in_memory().unwrap();
        ledger
            .mark_sent(&key("t1", "reminder", ChannelKind::Desktop, "2026-03-03"))
            .unwrap();
        assert!(!ledger
            .has_sent(&key("t1", "reminder", ChannelKind::DirectMessage, "2026-03-03"))
            .unwrap());
        assert!(!ledger
            .has_sent(&key("t1", "reminder", ChannelKind::Desktop, "2026-03-04"))
            .unwrap());
        assert!(ledger
            .sent_on_any_channel(&TaskId::from("t1"), "reminder", "2026-03-03")
            .unwrap());
    }

    #[test]
    fn counters_reset_on_new_day() {
        let ledger = NotificationLedger::in_memory().unwrap();
        let t1 = TaskId::from("t1");
        let t2 = TaskId::from("t2");
        assert_eq!(ledger.increment(&t1, "2026-03-03").unwrap(), 1);
        assert_eq!(ledger.increment(&t1, "2026-03-03").unwrap(), 2);
        ledger.increment(&t2, "2026-03-03").unwrap();
        assert_eq!(ledger.count_today(&t1, "2026-03-03").unwrap(), 2);
        assert_eq!(ledger.total_today("2026-03-03").unwrap(), 3);

        assert_eq!(ledger.count_today(&t1, "2026-03-04").unwrap(), 0);
        assert_eq!(ledger.total_today("2026-03-04").unwrap(), 0);
        // Yesterday's rows are gone for good.
        assert_eq!(ledger.count_today(&t1, "2026-03-03").unwrap(), 0);
    }

    #[test]
    fn prune_removes_only_older_days() {
        let ledger = NotificationLedger::in_memory().unwrap();
        let old = key("t1", "reminder", ChannelKind::Desktop, "2026-01-01");
        let recent = key("t1", "reminder", ChannelKind::Desktop, "2026-03-03");
        ledger.mark_sent(&old).unwrap();
        ledger.mark_sent(&recent).unwrap();
        assert_eq!(ledger.prune_before("2026-02-01").unwrap(), 1);
        assert!(!ledger.has_sent(&old).unwrap());
        assert!(ledger.has_sent(&recent).unwrap());
    }

    #[test]
    fn entries_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("ledger.db");
        let k = key("t1", "reminder", ChannelKind::DirectMessage, "2026-03-03");
        {
            let ledger = NotificationLedger::open(&path).unwrap();
            assert!(ledger.mark_sent(&k).unwrap());
            ledger.increment(&TaskId::from("t1"), "2026-03-03").unwrap();
        }
        let ledger = NotificationLedger::open(&path).unwrap();
        assert!(ledger.has_sent(&k).unwrap());
        assert!(!ledger.mark_sent(&k).unwrap());
        assert_eq!(ledger.count_today(&TaskId::from("t1"), "2026-03-03").unwrap(), 1);
    }
}
