use rusqlite::Connection;

use crate::error::Result;

/// Initialise the ledger schema in `conn`.
///
/// Creates the `notification_ledger` and `daily_counts` tables (idempotent).
/// `day` columns hold `YYYY-MM-DD` keys in the reference offset, so plain
/// string comparison orders them chronologically.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS notification_ledger (
            key         TEXT    NOT NULL PRIMARY KEY,   -- {task}-{event}-{channel}-{day}
            task_id     TEXT    NOT NULL,
            event       TEXT    NOT NULL,               -- reminder | followupN | overdue[@slot]
            channel     TEXT    NOT NULL,
            day         TEXT    NOT NULL,
            sent_at     TEXT    NOT NULL                -- ISO-8601
        ) STRICT;

        CREATE INDEX IF NOT EXISTS idx_ledger_day ON notification_ledger (day);
        CREATE INDEX IF NOT EXISTS idx_ledger_task_day ON notification_ledger (task_id, day);

        CREATE TABLE IF NOT EXISTS daily_counts (
            day         TEXT    NOT NULL,
            task_id     TEXT    NOT NULL,
            count       INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (day, task_id)
        ) STRICT;
        ",
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        init_db(&conn).unwrap();
        let n: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'
                 AND name IN ('notification_ledger', 'daily_counts')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(n, 2);
    }
}
